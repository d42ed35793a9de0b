use crate::resolver::{EntityResolver, ResolvedEntities};
use crate::types::{EntityInStory, KeywordInStory, Result, ShortStory, Story, StoryRecord, DEFAULT_LANGUAGE};
use tracing::debug;

/// Joins resolved entities back onto story records.
///
/// Both views come from a single resolve per batch followed by one pass over
/// the records. A record whose author or source did not resolve is left out;
/// that is a filtering rule, never an error.
#[derive(Clone)]
pub struct StoryAssembler {
    resolver: EntityResolver,
}

impl StoryAssembler {
    pub fn new(resolver: EntityResolver) -> Self {
        Self { resolver }
    }

    pub async fn assemble_full(&self, records: Vec<StoryRecord>) -> Result<Vec<Story>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let resolved = self.resolver.resolve(&records).await?;
        let total = records.len();
        let stories: Vec<Story> = records
            .into_iter()
            .filter_map(|record| join_full(record, &resolved))
            .collect();

        if stories.len() < total {
            debug!("Dropped {} of {} records without author or source", total - stories.len(), total);
        }
        Ok(stories)
    }

    pub async fn assemble_short(&self, records: Vec<StoryRecord>) -> Result<Vec<ShortStory>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let resolved = self.resolver.resolve(&records).await?;
        let stories: Vec<ShortStory> = records
            .iter()
            .filter_map(|record| join_short(record, &resolved))
            .collect();

        if stories.len() < records.len() {
            debug!(
                "Dropped {} of {} records from the short view",
                records.len() - stories.len(),
                records.len()
            );
        }
        Ok(stories)
    }
}

pub fn join_full(record: StoryRecord, resolved: &ResolvedEntities) -> Option<Story> {
    let author = resolved.authors.get(&record.author_id?)?.clone();
    let source = resolved.sources.get(record.source_id.as_ref()?)?.clone();
    let language = record.language.as_deref().unwrap_or(DEFAULT_LANGUAGE);

    let keywords = record
        .keywords
        .iter()
        .filter_map(|reference| {
            resolved.keyword(language, &reference.text).map(|keyword| KeywordInStory {
                keyword: keyword.clone(),
                frequency: reference.frequency,
            })
        })
        .collect();
    let entities = record
        .entities
        .iter()
        .filter_map(|reference| {
            resolved.entities.get(&reference.links).map(|entity| EntityInStory {
                entity: entity.clone(),
                frequency: reference.frequency,
            })
        })
        .collect();

    Some(Story {
        story_id: record.story_id,
        title: record.title,
        body: record.body,
        summary: record.summary,
        url: record.url,
        images: record.images,
        language: record.language,
        published_at: record.published_at,
        source,
        author,
        keywords,
        entities,
        counters: record.counters,
    })
}

/// `None` for records with an unresolved author or source, or with no
/// title, url, author id or source id.
pub fn join_short(record: &StoryRecord, resolved: &ResolvedEntities) -> Option<ShortStory> {
    let title = record.title.clone()?;
    let url = record.url.clone()?;
    let author = resolved.authors.get(&record.author_id?)?;
    let source = resolved.sources.get(record.source_id.as_ref()?)?;
    let language = record.language.as_deref().unwrap_or(DEFAULT_LANGUAGE);

    let keywords = record
        .keywords
        .iter()
        .filter_map(|reference| resolved.keyword(language, &reference.text))
        .map(|keyword| keyword.text.clone())
        .collect();
    let (entities, entity_links) = record
        .entities
        .iter()
        .filter_map(|reference| resolved.entities.get(&reference.links))
        .map(|entity| (entity.text.clone(), entity.links.clone()))
        .unzip();

    Some(ShortStory {
        story_id: record.story_id.to_string(),
        title,
        url,
        summary: record.summary.clone(),
        source: source.name.clone(),
        source_id: source.source_id.clone(),
        author: author.name.clone(),
        author_id: author.author_id.to_string(),
        image: record.images.first().cloned().unwrap_or_default(),
        keywords,
        entities,
        entity_links,
        language: record.language.clone(),
        published_at: record.published_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Author, Entity, EntityRef, Keyword, KeywordRef, Source, StoryCounters};
    use uuid::Uuid;

    fn resolved_with(author: &Author, source: &Source) -> ResolvedEntities {
        let mut resolved = ResolvedEntities::default();
        resolved.authors.insert(author.author_id, author.clone());
        resolved.sources.insert(source.source_id.clone(), source.clone());
        resolved.keywords.insert(
            ("en".to_string(), "apple".to_string()),
            Keyword { text: "apple".to_string(), language: Some("en".to_string()) },
        );
        resolved.entities.insert(
            "https://wiki/apple".to_string(),
            Entity {
                text: "Apple Inc.".to_string(),
                kind: Some("ORG".to_string()),
                links: "https://wiki/apple".to_string(),
            },
        );
        resolved
    }

    fn fixtures() -> (Author, Source, StoryRecord) {
        let author = Author { author_id: Uuid::new_v4(), name: Some("Tom Lundy".to_string()), reputation: None };
        let source = Source {
            source_id: "EN-1".to_string(),
            name: Some("BBC".to_string()),
            home_page_url: None,
            rank_in_alexa: Some(100),
            language: Some("en".to_string()),
            rss_feed: None,
            reputation: None,
        };
        let record = StoryRecord {
            story_id: Uuid::new_v4(),
            title: Some("Apple ships".to_string()),
            body: None,
            summary: Some("summary".to_string()),
            url: Some("https://example.com/apple".to_string()),
            images: vec!["a.jpg".to_string(), "b.jpg".to_string()],
            language: Some("en".to_string()),
            published_at: None,
            source_id: Some(source.source_id.clone()),
            author_id: Some(author.author_id),
            keywords: vec![
                KeywordRef { text: "apple".to_string(), frequency: 4 },
                KeywordRef { text: "unknown".to_string(), frequency: 9 },
            ],
            entities: vec![EntityRef { links: "https://wiki/apple".to_string(), frequency: 2 }],
            counters: StoryCounters::default(),
        };
        (author, source, record)
    }

    #[test]
    fn test_join_full_keeps_resolved_references_only() {
        let (author, source, record) = fixtures();
        let resolved = resolved_with(&author, &source);

        let story = join_full(record, &resolved).unwrap();
        assert_eq!(story.author, author);
        assert_eq!(story.source, source);
        assert_eq!(story.keywords.len(), 1);
        assert_eq!(story.keywords[0].frequency, 4);
        assert_eq!(story.entities[0].entity.text, "Apple Inc.");
    }

    #[test]
    fn test_first_reference_is_not_skipped() {
        let (author, source, mut record) = fixtures();
        record.keywords.reverse();
        let resolved = resolved_with(&author, &source);

        let short = join_short(&record, &resolved).unwrap();
        assert_eq!(short.keywords, vec!["apple".to_string()]);
    }

    #[test]
    fn test_join_short_flattens() {
        let (author, source, record) = fixtures();
        let resolved = resolved_with(&author, &source);

        let short = join_short(&record, &resolved).unwrap();
        assert_eq!(short.image, "a.jpg");
        assert_eq!(short.author_id, author.author_id.to_string());
        assert_eq!(short.source.as_deref(), Some("BBC"));
        assert_eq!(short.entities, vec!["Apple Inc.".to_string()]);
        assert_eq!(short.entity_links, vec!["https://wiki/apple".to_string()]);
    }

    #[test]
    fn test_unresolved_or_malformed_records_are_dropped() {
        let (author, source, record) = fixtures();
        let resolved = resolved_with(&author, &source);

        let mut no_source = record.clone();
        no_source.source_id = Some("EN-404".to_string());
        assert!(join_full(no_source.clone(), &resolved).is_none());
        assert!(join_short(&no_source, &resolved).is_none());

        let mut no_title = record.clone();
        no_title.title = None;
        assert!(join_short(&no_title, &resolved).is_none());
        assert!(join_full(no_title, &resolved).is_some());

        let mut no_image = record;
        no_image.images.clear();
        assert_eq!(join_short(&no_image, &resolved).unwrap().image, "");
    }
}
