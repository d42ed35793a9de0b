use crate::store::{collections, Collection, Filter, SharedStore};
use crate::types::{Author, Entity, Keyword, ResolveMode, Result, Source, StoryRecord, DEFAULT_LANGUAGE};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

/// Keywords are scoped by language: `(language, text)`.
pub type KeywordKey = (String, String);

/// Everything a batch of story records references, indexed for joining.
#[derive(Debug, Default, Clone)]
pub struct ResolvedEntities {
    pub authors: HashMap<Uuid, Author>,
    pub sources: HashMap<String, Source>,
    pub keywords: HashMap<KeywordKey, Keyword>,
    pub entities: HashMap<String, Entity>,
}

impl ResolvedEntities {
    pub fn keyword(&self, language: &str, text: &str) -> Option<&Keyword> {
        self.keywords.get(&(language.to_string(), text.to_string()))
    }
}

/// Distinct references of a batch, one set per entity type.
#[derive(Debug, Default)]
struct ReferenceSets {
    authors: HashSet<Uuid>,
    sources: HashSet<String>,
    keywords: HashSet<KeywordKey>,
    entities: HashSet<String>,
}

impl ReferenceSets {
    fn collect(records: &[StoryRecord]) -> Self {
        let mut sets = Self::default();
        for record in records {
            if let Some(author_id) = record.author_id {
                sets.authors.insert(author_id);
            }
            if let Some(source_id) = &record.source_id {
                sets.sources.insert(source_id.clone());
            }
            let language = record.language.as_deref().unwrap_or(DEFAULT_LANGUAGE);
            for keyword in &record.keywords {
                sets.keywords.insert((language.to_string(), keyword.text.clone()));
            }
            for entity in &record.entities {
                sets.entities.insert(entity.links.clone());
            }
        }
        sets
    }
}

/// Fetches the authors, sources, keywords and entities a batch refers to,
/// with the four lookups in flight at once.
#[derive(Clone)]
pub struct EntityResolver {
    authors: Collection<Author>,
    sources: Collection<Source>,
    keywords: Collection<Keyword>,
    entities: Collection<Entity>,
    mode: ResolveMode,
}

impl EntityResolver {
    pub fn new(store: SharedStore, mode: ResolveMode) -> Self {
        Self {
            authors: Collection::new(store.clone(), collections::AUTHOR),
            sources: Collection::new(store.clone(), collections::SOURCE),
            keywords: Collection::new(store.clone(), collections::KEYWORD),
            entities: Collection::new(store, collections::ENTITY),
            mode,
        }
    }

    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// In strict mode the first failed lookup fails the batch and the other
    /// lookups are dropped. In lenient mode a failed lookup leaves its
    /// category empty and the records that needed it are filtered out later.
    pub async fn resolve(&self, records: &[StoryRecord]) -> Result<ResolvedEntities> {
        let sets = ReferenceSets::collect(records);
        debug!(
            "Resolving {} authors, {} sources, {} keywords, {} entities for {} records",
            sets.authors.len(),
            sets.sources.len(),
            sets.keywords.len(),
            sets.entities.len(),
            records.len()
        );

        let resolved = match self.mode {
            ResolveMode::Strict => {
                let (authors, sources, keywords, entities) = tokio::try_join!(
                    self.lookup_authors(&sets.authors),
                    self.lookup_sources(&sets.sources),
                    self.lookup_keywords(&sets.keywords),
                    self.lookup_entities(&sets.entities),
                )?;
                ResolvedEntities { authors, sources, keywords, entities }
            }
            ResolveMode::Lenient => {
                let (authors, sources, keywords, entities) = tokio::join!(
                    self.lookup_authors(&sets.authors),
                    self.lookup_sources(&sets.sources),
                    self.lookup_keywords(&sets.keywords),
                    self.lookup_entities(&sets.entities),
                );
                ResolvedEntities {
                    authors: or_empty("authors", authors),
                    sources: or_empty("sources", sources),
                    keywords: or_empty("keywords", keywords),
                    entities: or_empty("entities", entities),
                }
            }
        };
        Ok(resolved)
    }

    async fn lookup_authors(&self, ids: &HashSet<Uuid>) -> Result<HashMap<Uuid, Author>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let filter = Filter::is_in("author_id", ids.iter().map(ToString::to_string));
        let authors = self.authors.find_many(&filter).await?;
        Ok(authors.into_iter().map(|author| (author.author_id, author)).collect())
    }

    async fn lookup_sources(&self, ids: &HashSet<String>) -> Result<HashMap<String, Source>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sources = self.sources.find_many(&Filter::is_in("source_id", ids.iter().cloned())).await?;
        Ok(sources
            .into_iter()
            .map(|source| (source.source_id.clone(), source))
            .collect())
    }

    async fn lookup_keywords(&self, keys: &HashSet<KeywordKey>) -> Result<HashMap<KeywordKey, Keyword>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let languages: HashSet<&str> = keys.iter().map(|(language, _)| language.as_str()).collect();
        let texts: HashSet<&str> = keys.iter().map(|(_, text)| text.as_str()).collect();
        let filter = Filter::is_in("text", texts).and(Filter::is_in("language", languages));

        let keywords = self.keywords.find_many(&filter).await?;
        Ok(keywords
            .into_iter()
            .filter_map(|keyword| {
                let language = keyword.language.clone().unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
                let key = (language, keyword.text.clone());
                keys.contains(&key).then_some((key, keyword))
            })
            .collect())
    }

    async fn lookup_entities(&self, links: &HashSet<String>) -> Result<HashMap<String, Entity>> {
        if links.is_empty() {
            return Ok(HashMap::new());
        }
        let entities = self.entities.find_many(&Filter::is_in("links", links.iter().cloned())).await?;
        Ok(entities
            .into_iter()
            .map(|entity| (entity.links.clone(), entity))
            .collect())
    }
}

fn or_empty<K, V>(category: &str, lookup: Result<HashMap<K, V>>) -> HashMap<K, V> {
    lookup.unwrap_or_else(|e| {
        warn!("Lookup of {} failed, continuing without them: {}", category, e);
        HashMap::new()
    })
}
