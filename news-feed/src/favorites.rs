use crate::store::{collections, Collection, Filter, SharedStore, Sort};
use crate::types::{Favorite, NewsError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Which ledger a favorite lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Source,
    Author,
    Keyword,
    Entity,
}

impl EntityClass {
    pub const ALL: [EntityClass; 4] = [
        EntityClass::Source,
        EntityClass::Author,
        EntityClass::Keyword,
        EntityClass::Entity,
    ];

    pub fn collection_name(self) -> &'static str {
        match self {
            EntityClass::Source => collections::FAVORITE_SOURCE,
            EntityClass::Author => collections::FAVORITE_AUTHOR,
            EntityClass::Keyword => collections::FAVORITE_KEYWORD,
            EntityClass::Entity => collections::FAVORITE_ENTITY,
        }
    }
}

impl FromStr for EntityClass {
    type Err = NewsError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "source" => Ok(EntityClass::Source),
            "author" => Ok(EntityClass::Author),
            "keyword" => Ok(EntityClass::Keyword),
            "entity" => Ok(EntityClass::Entity),
            other => Err(NewsError::Validation(format!("no favorite ledger named {other:?}"))),
        }
    }
}

/// Which slice of a ledger to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteView {
    /// Flagged favorite and not deleted, by relevancy.
    Favorites,
    /// Deleted and not favorite, by relevancy.
    Hated,
    /// Other users' top entries per identifier, offered to this user.
    Recommended,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteItems {
    pub favorite_sources: Vec<Favorite>,
    pub favorite_authors: Vec<Favorite>,
    pub favorite_keywords: Vec<Favorite>,
    pub favorite_entities: Vec<Favorite>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personalization {
    pub recommended_items: FavoriteItems,
    pub favorite_items: FavoriteItems,
    pub hated_items: FavoriteItems,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerUpdate {
    Incremented,
    Created,
}

/// The four per-class favorite ledgers behind one interface.
#[derive(Clone)]
pub struct FavoriteLedgers {
    sources: Collection<Favorite>,
    authors: Collection<Favorite>,
    keywords: Collection<Favorite>,
    entities: Collection<Favorite>,
    item_count: usize,
}

impl FavoriteLedgers {
    pub fn new(store: SharedStore, item_count: usize) -> Self {
        let ledger = |class: EntityClass| Collection::new(store.clone(), class.collection_name());
        Self {
            sources: ledger(EntityClass::Source),
            authors: ledger(EntityClass::Author),
            keywords: ledger(EntityClass::Keyword),
            entities: ledger(EntityClass::Entity),
            item_count,
        }
    }

    pub fn ledger(&self, class: EntityClass) -> &Collection<Favorite> {
        match class {
            EntityClass::Source => &self.sources,
            EntityClass::Author => &self.authors,
            EntityClass::Keyword => &self.keywords,
            EntityClass::Entity => &self.entities,
        }
    }

    pub async fn favorites(&self, user_id: &str, class: EntityClass, count: usize, language: &str) -> Result<Vec<Favorite>> {
        let filter = Filter::eq("user_id", user_id)
            .and(Filter::eq("is_favorite", true))
            .and(Filter::eq("is_deleted", false))
            .and(language_filter(language));
        self.ledger(class)
            .find_sorted(&filter, Some(Sort::desc("relevancy_rate")), Some(count))
            .await
    }

    pub async fn hated(&self, user_id: &str, class: EntityClass, count: usize, language: &str) -> Result<Vec<Favorite>> {
        let filter = Filter::eq("user_id", user_id)
            .and(Filter::eq("is_favorite", false))
            .and(Filter::eq("is_deleted", true))
            .and(language_filter(language));
        self.ledger(class)
            .find_sorted(&filter, Some(Sort::desc("relevancy_rate")), Some(count))
            .await
    }

    /// The best-rated entry per identifier among other users, rewritten as a
    /// fresh recommendation for `user_id`.
    pub async fn recommended(&self, user_id: &str, class: EntityClass, count: usize, language: &str) -> Result<Vec<Favorite>> {
        let filter = Filter::ne("user_id", user_id).and(language_filter(language));
        let grouped = self
            .ledger(class)
            .find_grouped(&filter, "identifier", Some(Sort::desc("relevancy_rate")), Some(count))
            .await?;

        Ok(grouped
            .into_iter()
            .map(|favorite| Favorite {
                id: None,
                user_id: user_id.to_string(),
                is_recommended: true,
                is_favorite: false,
                is_added: false,
                ..favorite
            })
            .collect())
    }

    pub async fn view(&self, view: FavoriteView, user_id: &str, class: EntityClass, count: usize, language: &str) -> Result<Vec<Favorite>> {
        match view {
            FavoriteView::Favorites => self.favorites(user_id, class, count, language).await,
            FavoriteView::Hated => self.hated(user_id, class, count, language).await,
            FavoriteView::Recommended => self.recommended(user_id, class, count, language).await,
        }
    }

    /// One view across all four ledgers; any failed ledger fails the call.
    pub async fn items(&self, user_id: &str, count: usize, language: &str, view: FavoriteView) -> Result<FavoriteItems> {
        let (favorite_sources, favorite_authors, favorite_keywords, favorite_entities) = tokio::try_join!(
            self.view(view, user_id, EntityClass::Source, count, language),
            self.view(view, user_id, EntityClass::Author, count, language),
            self.view(view, user_id, EntityClass::Keyword, count, language),
            self.view(view, user_id, EntityClass::Entity, count, language),
        )?;
        Ok(FavoriteItems {
            favorite_sources,
            favorite_authors,
            favorite_keywords,
            favorite_entities,
        })
    }

    pub async fn personalization(&self, user_id: &str, language: &str) -> Result<Personalization> {
        let count = self.item_count;
        let (recommended_items, favorite_items, hated_items) = tokio::try_join!(
            self.items(user_id, count, language, FavoriteView::Recommended),
            self.items(user_id, count, language, FavoriteView::Favorites),
            self.items(user_id, count, language, FavoriteView::Hated),
        )?;
        Ok(Personalization {
            recommended_items,
            favorite_items,
            hated_items,
        })
    }

    /// Apply the user's explicit flag edits, creating the entry if needed.
    pub async fn update_from_user(&self, favorite: &Favorite, class: EntityClass) -> Result<()> {
        let ledger = self.ledger(class);
        let filter = entry_filter(&favorite.user_id, &favorite.identifier, &favorite.language);

        let updated = match ledger.find_one(&filter).await {
            Ok(stored) => Favorite {
                is_added: favorite.is_added,
                is_deleted: favorite.is_deleted,
                is_favorite: favorite.is_favorite,
                is_recommended: favorite.is_recommended,
                relevancy_rate: favorite.relevancy_rate,
                ..stored
            },
            Err(e) if e.is_not_found() => Favorite { id: None, ..favorite.clone() },
            Err(e) => return Err(e),
        };
        ledger.save(&updated).await?;
        Ok(())
    }

    /// Add `reward` to the user's entry for `identifier`, or create it as a
    /// recommendation worth `reward`.
    pub async fn update_from_story(
        &self,
        user_id: &str,
        identifier: &str,
        value: &str,
        reward: f64,
        class: EntityClass,
        language: &str,
    ) -> Result<LedgerUpdate> {
        let ledger = self.ledger(class);
        let matched = ledger
            .increment(&entry_filter(user_id, identifier, language), "relevancy_rate", reward)
            .await?;
        if matched > 0 {
            return Ok(LedgerUpdate::Incremented);
        }

        // Two first-time events racing here can both create an entry.
        ledger
            .save(&Favorite::recommended(user_id, identifier, value, reward, language))
            .await?;
        debug!("Created {:?} favorite {} for {}", class, identifier, user_id);
        Ok(LedgerUpdate::Created)
    }
}

fn entry_filter(user_id: &str, identifier: &str, language: &str) -> Filter {
    Filter::eq("user_id", user_id)
        .and(Filter::eq("identifier", identifier))
        .and(Filter::eq("language", language))
}

fn language_filter(language: &str) -> Filter {
    if language.is_empty() {
        Filter::All
    } else {
        Filter::eq("language", language)
    }
}
