use super::filter::{compare_values, field_of};
use super::{DocumentStore, Filter, Sort, ID_FIELD};
use crate::types::{NewsError, Result};
use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process document store. Collections keep insertion order, which is
/// also the order unsorted queries return.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_sorted(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let collections = self.collections.read().await;
        let mut found = matching(collections.get(collection), filter);
        if let Some(sort) = sort {
            sort_documents(&mut found, sort);
        }
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn get_grouped(
        &self,
        collection: &str,
        filter: &Filter,
        group_key: &str,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let collections = self.collections.read().await;
        let mut found = matching(collections.get(collection), filter);
        if let Some(sort) = sort {
            sort_documents(&mut found, sort);
        }

        let mut seen = HashSet::new();
        let mut grouped: Vec<Value> = found
            .into_iter()
            .filter(|document| {
                let group = field_of(document, group_key).cloned().unwrap_or(Value::Null);
                seen.insert(group.to_string())
            })
            .collect();
        if let Some(limit) = limit {
            grouped.truncate(limit);
        }
        Ok(grouped)
    }

    async fn get_distinct(&self, collection: &str, filter: &Filter, field: &str) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        for document in matching(collections.get(collection), filter) {
            if let Some(value) = field_of(&document, field) {
                let text = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                if seen.insert(text.clone()) {
                    values.push(text);
                }
            }
        }
        Ok(values)
    }

    async fn upsert_one(&self, collection: &str, identity: Option<String>, document: Value) -> Result<String> {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();
        upsert(documents, identity, document)
    }

    async fn upsert_many(&self, collection: &str, documents: Vec<(Option<String>, Value)>) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();
        let mut written = 0;
        for (identity, document) in documents {
            upsert(stored, identity, document)?;
            written += 1;
        }
        Ok(written)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|document| !filter.matches(document));
        Ok((before - documents.len()) as u64)
    }

    async fn increment(&self, collection: &str, filter: &Filter, field: &str, delta: f64) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut matched = 0;
        for document in documents.iter_mut().filter(|document| filter.matches(document)) {
            let current = field_of(document, field).and_then(Value::as_f64).unwrap_or(0.0);
            if let Value::Object(fields) = document {
                fields.insert(field.to_string(), number_value(current + delta)?);
            }
            matched += 1;
        }
        Ok(matched)
    }
}

fn matching(documents: Option<&Vec<Value>>, filter: &Filter) -> Vec<Value> {
    documents
        .map(|documents| {
            documents
                .iter()
                .filter(|document| filter.matches(document))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

// Missing values sort last in either direction.
fn sort_documents(documents: &mut [Value], sort: &Sort) {
    documents.sort_by(|left, right| {
        match (field_of(left, &sort.key), field_of(right, &sort.key)) {
            (Some(left), Some(right)) => {
                let ordering = compare_values(left, right).unwrap_or(Ordering::Equal);
                if sort.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

fn upsert(documents: &mut Vec<Value>, identity: Option<String>, document: Value) -> Result<String> {
    let Value::Object(mut fields) = document else {
        return Err(NewsError::Validation("documents must be JSON objects".to_string()));
    };

    let id = identity.unwrap_or_else(|| Uuid::new_v4().to_string());
    fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));

    let existing = documents
        .iter_mut()
        .find(|stored| stored.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str()));
    match existing {
        Some(Value::Object(stored)) => merge(stored, fields),
        _ => documents.push(Value::Object(fields)),
    }
    Ok(id)
}

fn merge(stored: &mut Map<String, Value>, update: Map<String, Value>) {
    for (key, value) in update {
        stored.insert(key, value);
    }
}

// Whole results stay integers so integer fields keep decoding as integers.
fn number_value(value: f64) -> Result<Value> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return Ok(Value::from(value as i64));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| NewsError::Store(format!("cannot store non-finite number {value}")))
}
