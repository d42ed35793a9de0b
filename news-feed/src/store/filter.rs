use serde_json::Value;
use std::cmp::Ordering;

/// Query predicate over top-level document fields.
///
/// Semantics follow the usual document-store conventions: a missing field
/// satisfies `Ne` and `NotIn` but never `Eq`, `In` or a range bound.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Filter::Ne(field.to_string(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::NotIn(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Filter::Gt(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(field.to_string(), value.into())
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lt(field.to_string(), value.into())
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lte(field.to_string(), value.into())
    }

    /// Conjunction; nested `And`s and `All`s are flattened away.
    pub fn and(self, other: Filter) -> Self {
        let mut clauses = Vec::new();
        for filter in [self, other] {
            match filter {
                Filter::All => {}
                Filter::And(inner) => clauses.extend(inner),
                single => clauses.push(single),
            }
        }
        match clauses.len() {
            0 => Filter::All,
            1 => clauses.pop().unwrap_or(Filter::All),
            _ => Filter::And(clauses),
        }
    }

    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => field_of(document, field).is_some_and(|found| values_equal(found, value)),
            Filter::Ne(field, value) => !field_of(document, field).is_some_and(|found| values_equal(found, value)),
            Filter::In(field, values) => field_of(document, field)
                .is_some_and(|found| values.iter().any(|value| values_equal(found, value))),
            Filter::NotIn(field, values) => !field_of(document, field)
                .is_some_and(|found| values.iter().any(|value| values_equal(found, value))),
            Filter::Gt(field, bound) => compare_field(document, field, bound) == Some(Ordering::Greater),
            Filter::Gte(field, bound) => matches!(
                compare_field(document, field, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::Lt(field, bound) => compare_field(document, field, bound) == Some(Ordering::Less),
            Filter::Lte(field, bound) => matches!(
                compare_field(document, field, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::And(clauses) => clauses.iter().all(|clause| clause.matches(document)),
        }
    }

    /// Every field name the filter references.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Filter::All => Vec::new(),
            Filter::Eq(field, _)
            | Filter::Ne(field, _)
            | Filter::In(field, _)
            | Filter::NotIn(field, _)
            | Filter::Gt(field, _)
            | Filter::Gte(field, _)
            | Filter::Lt(field, _)
            | Filter::Lte(field, _) => vec![field.as_str()],
            Filter::And(clauses) => clauses.iter().flat_map(Filter::fields).collect(),
        }
    }
}

/// Explicit null counts as missing.
pub fn field_of<'a>(document: &'a Value, field: &str) -> Option<&'a Value> {
    document.get(field).filter(|value| !value.is_null())
}

fn compare_field(document: &Value, field: &str, bound: &Value) -> Option<Ordering> {
    field_of(document, field).and_then(|found| compare_values(found, bound))
}

/// Ordering between two scalars of the same JSON type; `None` across types.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    left == right || compare_values(left, right) == Some(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_satisfy_only_negative_clauses() {
        let document = json!({"language": "en"});

        assert!(Filter::ne("story_id", "a").matches(&document));
        assert!(Filter::not_in("story_id", ["a", "b"]).matches(&document));
        assert!(!Filter::eq("story_id", "a").matches(&document));
        assert!(!Filter::is_in("story_id", ["a"]).matches(&document));
        assert!(!Filter::gte("published_at", "2025").matches(&document));
    }

    #[test]
    fn test_numbers_compare_across_representations() {
        let document = json!({"relevancy_rate": 1.0, "count": 3});

        assert!(Filter::eq("relevancy_rate", 1).matches(&document));
        assert!(Filter::gt("count", 2.5).matches(&document));
        assert!(Filter::lte("count", 3).matches(&document));
    }

    #[test]
    fn test_and_flattens() {
        let filter = Filter::All
            .and(Filter::eq("a", 1))
            .and(Filter::eq("b", 2).and(Filter::eq("c", 3)));

        assert_eq!(
            filter,
            Filter::And(vec![Filter::eq("a", 1), Filter::eq("b", 2), Filter::eq("c", 3)])
        );
        assert_eq!(Filter::All.and(Filter::eq("a", 1)), Filter::eq("a", 1));
        assert_eq!(filter.fields(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_sets() {
        let document = json!({"story_id": "a"});
        let nothing: Vec<Value> = Vec::new();

        assert!(!Filter::is_in("story_id", nothing.clone()).matches(&document));
        assert!(Filter::not_in("story_id", nothing).matches(&document));
    }
}
