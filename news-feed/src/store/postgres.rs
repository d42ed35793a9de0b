use super::{validate_field, DocumentStore, Filter, Sort, ID_FIELD};
use crate::types::{NewsError, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

/// Document store backed by a single PostgreSQL `documents` table with a
/// JSONB body per row.
pub struct PgDocumentStore {
    db: PgPool,
}

impl PgDocumentStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        info!("Connected to document database");
        Ok(Self { db })
    }

    pub fn with_pool(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        info!("Document schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_sorted(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let mut builder = select_where(collection, filter)?;
        push_order(&mut builder, sort)?;
        push_limit(&mut builder, limit);

        let rows = builder
            .build_query_scalar::<Json<Value>>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    async fn get_grouped(
        &self,
        collection: &str,
        filter: &Filter,
        group_key: &str,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        validate_field(group_key)?;

        // DISTINCT ON keeps the first row per group under the inner ORDER BY.
        let mut builder = QueryBuilder::<Postgres>::new("SELECT body FROM (SELECT DISTINCT ON (");
        builder.push(json_path(group_key));
        builder.push(") body FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        builder.push(" AND ");
        push_filter(&mut builder, filter)?;
        builder.push(" ORDER BY ");
        builder.push(json_path(group_key));
        if let Some(sort) = sort {
            validate_field(&sort.key)?;
            builder.push(", ");
            builder.push(order_term(sort));
        }
        builder.push(") grouped");
        push_order(&mut builder, sort)?;
        push_limit(&mut builder, limit);

        let rows = builder
            .build_query_scalar::<Json<Value>>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    async fn get_distinct(&self, collection: &str, filter: &Filter, field: &str) -> Result<Vec<String>> {
        validate_field(field)?;

        let mut builder = QueryBuilder::<Postgres>::new("SELECT DISTINCT ");
        builder.push(text_path(field));
        builder.push(" FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        builder.push(" AND ");
        builder.push(text_path(field));
        builder.push(" IS NOT NULL AND ");
        push_filter(&mut builder, filter)?;

        Ok(builder.build_query_scalar::<String>().fetch_all(&self.db).await?)
    }

    async fn upsert_one(&self, collection: &str, identity: Option<String>, document: Value) -> Result<String> {
        let (id, body) = prepare(identity, document)?;
        upsert_query(collection, &id, body).execute(&self.db).await?;
        Ok(id)
    }

    async fn upsert_many(&self, collection: &str, documents: Vec<(Option<String>, Value)>) -> Result<u64> {
        let mut tx = self.db.begin().await?;
        let mut written = 0;
        for (identity, document) in documents {
            let (id, body) = prepare(identity, document)?;
            upsert_query(collection, &id, body).execute(&mut *tx).await?;
            written += 1;
        }
        tx.commit().await?;

        debug!("Upserted {} documents into {}", written, collection);
        Ok(written)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("DELETE FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        builder.push(" AND ");
        push_filter(&mut builder, filter)?;

        let result = builder.build().execute(&self.db).await?;
        Ok(result.rows_affected())
    }

    async fn increment(&self, collection: &str, filter: &Filter, field: &str, delta: f64) -> Result<u64> {
        validate_field(field)?;

        // Single UPDATE statement, so concurrent increments never lose an update.
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE documents SET body = jsonb_set(body, '{");
        builder.push(field);
        builder.push("}', to_jsonb(COALESCE(");
        builder.push(numeric_path(field));
        builder.push(", 0) + ");
        builder.push_bind(delta);
        builder.push(")) WHERE collection = ");
        builder.push_bind(collection.to_string());
        builder.push(" AND ");
        push_filter(&mut builder, filter)?;

        let result = builder.build().execute(&self.db).await?;
        Ok(result.rows_affected())
    }
}

fn prepare(identity: Option<String>, document: Value) -> Result<(String, Value)> {
    let Value::Object(mut fields) = document else {
        return Err(NewsError::Validation("documents must be JSON objects".to_string()));
    };
    let id = identity.unwrap_or_else(|| Uuid::new_v4().to_string());
    fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    Ok((id, Value::Object(fields)))
}

fn upsert_query<'q>(
    collection: &str,
    id: &str,
    body: Value,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO documents (collection, id, body)
        VALUES ($1, $2, $3)
        ON CONFLICT (collection, id) DO UPDATE SET body = documents.body || EXCLUDED.body
        "#,
    )
    .bind(collection.to_string())
    .bind(id.to_string())
    .bind(Json(body))
}

fn select_where<'a>(collection: &str, filter: &Filter) -> Result<QueryBuilder<'a, Postgres>> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT body FROM documents WHERE collection = ");
    builder.push_bind(collection.to_string());
    builder.push(" AND ");
    push_filter(&mut builder, filter)?;
    Ok(builder)
}

fn json_path(field: &str) -> String {
    format!("(body -> '{field}')")
}

fn text_path(field: &str) -> String {
    format!("(body ->> '{field}')")
}

fn numeric_path(field: &str) -> String {
    format!("(body ->> '{field}')::double precision")
}

fn order_term(sort: &Sort) -> String {
    let direction = if sort.descending { "DESC" } else { "ASC" };
    format!("{} {direction} NULLS LAST", json_path(&sort.key))
}

fn push_order(builder: &mut QueryBuilder<'_, Postgres>, sort: Option<&Sort>) -> Result<()> {
    if let Some(sort) = sort {
        validate_field(&sort.key)?;
        builder.push(" ORDER BY ");
        builder.push(order_term(sort));
    }
    Ok(())
}

fn push_limit(builder: &mut QueryBuilder<'_, Postgres>, limit: Option<usize>) {
    if let Some(limit) = limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) -> Result<()> {
    for field in filter.fields() {
        validate_field(field)?;
    }
    push_clause(builder, filter)
}

fn push_clause(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) -> Result<()> {
    match filter {
        Filter::All => {
            builder.push("TRUE");
        }
        Filter::Eq(field, value) => {
            builder.push(json_path(field));
            builder.push(" = ");
            builder.push_bind(Json(value.clone()));
        }
        Filter::Ne(field, value) => {
            builder.push("(");
            builder.push(json_path(field));
            builder.push(" IS NULL OR ");
            builder.push(json_path(field));
            builder.push(" <> ");
            builder.push_bind(Json(value.clone()));
            builder.push(")");
        }
        Filter::In(field, values) => {
            builder.push_bind(Json(Value::Array(values.clone())));
            builder.push(" @> jsonb_build_array");
            builder.push(json_path(field));
        }
        Filter::NotIn(field, values) => {
            builder.push("NOT (");
            builder.push_bind(Json(Value::Array(values.clone())));
            builder.push(" @> jsonb_build_array");
            builder.push(json_path(field));
            builder.push(")");
        }
        Filter::Gt(field, bound) => push_range(builder, field, ">", bound)?,
        Filter::Gte(field, bound) => push_range(builder, field, ">=", bound)?,
        Filter::Lt(field, bound) => push_range(builder, field, "<", bound)?,
        Filter::Lte(field, bound) => push_range(builder, field, "<=", bound)?,
        Filter::And(clauses) => {
            builder.push("(");
            for (index, clause) in clauses.iter().enumerate() {
                if index > 0 {
                    builder.push(" AND ");
                }
                push_clause(builder, clause)?;
            }
            builder.push(")");
        }
    }
    Ok(())
}

fn push_range(builder: &mut QueryBuilder<'_, Postgres>, field: &str, operator: &str, bound: &Value) -> Result<()> {
    match bound {
        Value::Number(number) => {
            let bound = number
                .as_f64()
                .ok_or_else(|| NewsError::Validation(format!("unsupported bound for {field}")))?;
            builder.push(numeric_path(field));
            builder.push(format!(" {operator} "));
            builder.push_bind(bound);
        }
        // Byte order, so fixed-width timestamps compare chronologically.
        Value::String(text) => {
            builder.push(text_path(field));
            builder.push(format!(" COLLATE \"C\" {operator} "));
            builder.push_bind(text.clone());
        }
        _ => {
            return Err(NewsError::Validation(format!(
                "range bound on {field} must be a number or string"
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(filter: &Filter) -> Result<String> {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(&mut builder, filter)?;
        Ok(builder.sql().to_string())
    }

    #[test]
    fn test_filter_rendering() -> Result<()> {
        let filter = Filter::eq("language", "en")
            .and(Filter::gte("published_at", "2025-08-01T00:00:00.000000Z"))
            .and(Filter::not_in("story_id", ["a"]));

        assert_eq!(
            render(&filter)?,
            "((body -> 'language') = $1 AND (body ->> 'published_at') COLLATE \"C\" >= $2 \
             AND NOT ($3 @> jsonb_build_array(body -> 'story_id')))"
        );
        assert_eq!(render(&Filter::All)?, "TRUE");
        assert_eq!(render(&Filter::gt("relevancy_rate", 0))?, "(body ->> 'relevancy_rate')::double precision > $1");
        Ok(())
    }

    #[test]
    fn test_injection_is_rejected() {
        let error = render(&Filter::eq("x') OR TRUE --", 1)).unwrap_err();
        assert!(error.is_validation());
        assert!(render(&Filter::gt("flag", true)).is_err());
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_postgres_round_trip() -> Result<()> {
        let database_url = std::env::var("DATABASE_URL").map_err(|e| NewsError::Store(e.to_string()))?;
        let store = PgDocumentStore::new(&database_url).await?;
        store.migrate().await?;

        let collection = format!("Test{}", Uuid::new_v4().simple());
        store
            .upsert_one(&collection, Some("s1".to_string()), serde_json::json!({"source_id": "s1"}))
            .await?;
        store
            .increment(&collection, &Filter::eq("source_id", "s1"), "reputation", 0.1)
            .await?;
        store
            .increment(&collection, &Filter::eq("source_id", "s1"), "reputation", -0.1)
            .await?;

        let stored = store.get_one(&collection, &Filter::eq(ID_FIELD, "s1")).await?;
        assert!(stored["reputation"].as_f64().unwrap_or(1.0).abs() < 1e-9);

        store.delete_many(&collection, &Filter::All).await?;
        Ok(())
    }
}
