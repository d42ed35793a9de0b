use crate::assembler::StoryAssembler;
use crate::broadcaster::FeedBroadcaster;
use crate::favorites::FavoriteLedgers;
use crate::feedback::{FeedbackLog, FeedbackPropagator};
use crate::hub::HubHandle;
use crate::ranking::RankingExport;
use crate::read_history::ReadHistory;
use crate::recommender::RecommendationSource;
use crate::resolver::EntityResolver;
use crate::selector::RecommendationSelector;
use crate::stories::StoryCatalog;
use crate::store::SharedStore;
use crate::tasks::NewsJobs;
use crate::types::FeedConfig;
use std::sync::Arc;
use tracing::info;

/// Every component wired over one store. Cheap to clone.
#[derive(Clone)]
pub struct NewsService {
    pub catalog: StoryCatalog,
    pub favorites: FavoriteLedgers,
    pub read_history: ReadHistory,
    pub selector: RecommendationSelector,
    pub feedback: FeedbackPropagator,
    pub ranking: RankingExport,
    pub hub: HubHandle,
    pub broadcaster: FeedBroadcaster,
    pub jobs: NewsJobs,
}

impl NewsService {
    pub fn new(
        store: SharedStore,
        config: &FeedConfig,
        recommender: Arc<dyn RecommendationSource>,
        hub: HubHandle,
    ) -> Self {
        let resolver = EntityResolver::new(store.clone(), config.resolve_mode);
        let assembler = StoryAssembler::new(resolver);
        let catalog = StoryCatalog::new(store.clone(), assembler.clone(), config);
        let read_history = ReadHistory::new(store.clone(), config.read_window_days);
        let favorites = FavoriteLedgers::new(store.clone(), config.favorite_item_count);
        let log = FeedbackLog::new(store.clone(), config.feedback_list_limit);

        let selector = RecommendationSelector::new(store, assembler, read_history.clone(), recommender, config);
        let feedback = FeedbackPropagator::new(catalog.clone(), favorites.clone(), read_history.clone(), log.clone());
        let ranking = RankingExport::new(catalog.clone(), log, config.freshness_days);
        let broadcaster = FeedBroadcaster::new(
            selector.clone(),
            hub.clone(),
            config.feed_language.clone(),
            config.broadcast_interval,
        );
        let jobs = NewsJobs::new(catalog.clone(), feedback.clone()).with_broadcaster(broadcaster.clone());

        info!("News service ready ({:?} entity resolution)", config.resolve_mode);
        Self {
            catalog,
            favorites,
            read_history,
            selector,
            feedback,
            ranking,
            hub,
            broadcaster,
            jobs,
        }
    }
}
