//! Document store seam.
//!
//! Components never talk to a database directly: they receive a
//! [`SharedStore`] at construction and wrap it in typed [`Collection`]s.
//! Two backends implement [`DocumentStore`]: [`MemoryStore`] for tests and
//! local runs, [`PgDocumentStore`] for PostgreSQL.

pub mod filter;
pub mod memory;
pub mod postgres;

pub use filter::Filter;
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

use crate::types::{
    Author, Entity, Favorite, Keyword, NewsError, ReadStory, Result, ScrapedUrl, Source,
    StoryRecord, UserFeedback,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

pub const ID_FIELD: &str = "_id";

pub mod collections {
    pub const STORY: &str = "Story";
    pub const AUTHOR: &str = "Author";
    pub const SOURCE: &str = "Source";
    pub const KEYWORD: &str = "Keyword";
    pub const ENTITY: &str = "Entity";
    pub const USER_FEEDBACK: &str = "UserFeedback";
    pub const READ_STORY: &str = "ReadStory";
    pub const SCRAPED_URL: &str = "ScrapedUrl";
    pub const FAVORITE_SOURCE: &str = "FavoriteSource";
    pub const FAVORITE_AUTHOR: &str = "FavoriteAuthor";
    pub const FAVORITE_KEYWORD: &str = "FavoriteKeyword";
    pub const FAVORITE_ENTITY: &str = "FavoriteEntity";
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub key: String,
    pub descending: bool,
}

impl Sort {
    pub fn asc(key: &str) -> Self {
        Self { key: key.to_string(), descending: false }
    }

    pub fn desc(key: &str) -> Self {
        Self { key: key.to_string(), descending: true }
    }
}

/// Generic CRUD/query operations over JSON documents in named collections.
///
/// Documents passed to `upsert_*` with an identity are merged into the
/// stored document carrying that identity (top-level keys overwrite), or
/// inserted under it. Documents without an identity are inserted under a
/// generated id. Stored documents always carry their id in `_id`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_one(&self, collection: &str, filter: &Filter) -> Result<Value> {
        self.get_sorted(collection, filter, None, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NewsError::not_found(collection))
    }

    async fn get_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        self.get_sorted(collection, filter, None, None).await
    }

    async fn get_sorted(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>>;

    /// One representative per distinct `group_key` value: the first document
    /// of the group under `sort`. Groups are returned in `sort` order.
    async fn get_grouped(
        &self,
        collection: &str,
        filter: &Filter,
        group_key: &str,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>>;

    async fn get_distinct(&self, collection: &str, filter: &Filter, field: &str) -> Result<Vec<String>>;

    async fn upsert_one(&self, collection: &str, identity: Option<String>, document: Value) -> Result<String>;

    async fn upsert_many(&self, collection: &str, documents: Vec<(Option<String>, Value)>) -> Result<u64>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Atomically adds `delta` to a numeric field of every matching document.
    /// A missing or null field counts as zero. Returns the number matched.
    async fn increment(&self, collection: &str, filter: &Filter, field: &str, delta: f64) -> Result<u64>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// A model type that can be stored. `identity` decides update-vs-insert.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn identity(&self) -> Option<String>;
}

impl Document for StoryRecord {
    fn identity(&self) -> Option<String> {
        Some(self.story_id.to_string())
    }
}

impl Document for Author {
    fn identity(&self) -> Option<String> {
        Some(self.author_id.to_string())
    }
}

impl Document for Source {
    fn identity(&self) -> Option<String> {
        Some(self.source_id.clone())
    }
}

impl Document for Keyword {
    fn identity(&self) -> Option<String> {
        Some(format!("{}:{}", self.language.as_deref().unwrap_or_default(), self.text))
    }
}

impl Document for Entity {
    fn identity(&self) -> Option<String> {
        Some(self.links.clone())
    }
}

impl Document for Favorite {
    fn identity(&self) -> Option<String> {
        self.id.clone()
    }
}

impl Document for UserFeedback {
    fn identity(&self) -> Option<String> {
        None
    }
}

impl Document for ReadStory {
    fn identity(&self) -> Option<String> {
        None
    }
}

impl Document for ScrapedUrl {
    fn identity(&self) -> Option<String> {
        None
    }
}

/// Typed view of one named collection.
pub struct Collection<T> {
    store: SharedStore,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name,
            _marker: PhantomData,
        }
    }
}

impl<T: Document> Collection<T> {
    pub fn new(store: SharedStore, name: &'static str) -> Self {
        Self {
            store,
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn find_one(&self, filter: &Filter) -> Result<T> {
        let document = self.store.get_one(self.name, filter).await?;
        Ok(serde_json::from_value(document)?)
    }

    pub async fn find_many(&self, filter: &Filter) -> Result<Vec<T>> {
        decode_all(self.store.get_many(self.name, filter).await?)
    }

    pub async fn find_sorted(&self, filter: &Filter, sort: Option<Sort>, limit: Option<usize>) -> Result<Vec<T>> {
        decode_all(self.store.get_sorted(self.name, filter, sort.as_ref(), limit).await?)
    }

    pub async fn find_grouped(
        &self,
        filter: &Filter,
        group_key: &str,
        sort: Option<Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        decode_all(
            self.store
                .get_grouped(self.name, filter, group_key, sort.as_ref(), limit)
                .await?,
        )
    }

    pub async fn distinct(&self, filter: &Filter, field: &str) -> Result<Vec<String>> {
        self.store.get_distinct(self.name, filter, field).await
    }

    pub async fn save(&self, document: &T) -> Result<String> {
        let value = serde_json::to_value(document)?;
        self.store.upsert_one(self.name, document.identity(), value).await
    }

    pub async fn save_many(&self, documents: &[T]) -> Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let mut encoded = Vec::with_capacity(documents.len());
        for document in documents {
            encoded.push((document.identity(), serde_json::to_value(document)?));
        }
        self.store.upsert_many(self.name, encoded).await
    }

    /// Like `save_many`, but the `omit` keys are left out of the written
    /// documents so a merge keeps whatever the store holds for them.
    pub async fn save_many_omitting(&self, documents: &[T], omit: &[&str]) -> Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let mut encoded = Vec::with_capacity(documents.len());
        for document in documents {
            let mut value = serde_json::to_value(document)?;
            if let Value::Object(fields) = &mut value {
                for key in omit {
                    fields.remove(*key);
                }
            }
            encoded.push((document.identity(), value));
        }
        self.store.upsert_many(self.name, encoded).await
    }

    pub async fn delete_many(&self, filter: &Filter) -> Result<u64> {
        self.store.delete_many(self.name, filter).await
    }

    pub async fn increment(&self, filter: &Filter, field: &str, delta: f64) -> Result<u64> {
        self.store.increment(self.name, filter, field, delta).await
    }
}

fn decode_all<T: Document>(documents: Vec<Value>) -> Result<Vec<T>> {
    documents
        .into_iter()
        .map(|document| serde_json::from_value(document).map_err(NewsError::from))
        .collect()
}

/// Field names are spliced into SQL, so only plain identifiers are accepted.
pub fn validate_field(field: &str) -> Result<()> {
    let mut chars = field.chars();
    let valid_start = chars
        .next()
        .is_some_and(|first| first.is_ascii_lowercase() || first == '_');
    if valid_start && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        Ok(())
    } else {
        Err(NewsError::Validation(format!("invalid field name: {field:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_field() {
        assert!(validate_field("published_at").is_ok());
        assert!(validate_field("_id").is_ok());
        assert!(validate_field("read_count2").is_ok());
        assert!(validate_field("").is_err());
        assert!(validate_field("a'b").is_err());
        assert!(validate_field("Title").is_err());
        assert!(validate_field("1st").is_err());
    }

    #[test]
    fn test_keyword_identity_is_language_scoped() {
        let english = Keyword { text: "apple".to_string(), language: Some("en".to_string()) };
        let french = Keyword { text: "apple".to_string(), language: Some("fr".to_string()) };
        assert_ne!(english.identity(), french.identity());
    }
}
