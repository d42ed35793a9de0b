pub mod types;
pub mod store;
pub mod resolver;
pub mod assembler;
pub mod stories;
pub mod read_history;
pub mod favorites;
pub mod recommender;
pub mod selector;
pub mod feedback;
pub mod ranking;
pub mod hub;
pub mod socket;
pub mod broadcaster;
pub mod tasks;
pub mod service;
pub mod server;
pub mod config;

pub use types::*;
pub use store::{DocumentStore, Filter, MemoryStore, PgDocumentStore, SharedStore};
pub use resolver::{EntityResolver, ResolvedEntities};
pub use assembler::StoryAssembler;
pub use stories::{InsertSummary, StoryCatalog};
pub use read_history::ReadHistory;
pub use favorites::{EntityClass, FavoriteLedgers, FavoriteView};
pub use recommender::{RecommendationSource, RecommenderClient};
pub use selector::RecommendationSelector;
pub use feedback::{FeedbackLog, FeedbackOutcome, FeedbackPropagator};
pub use ranking::{RankingData, RankingExport};
pub use hub::HubHandle;
pub use broadcaster::FeedBroadcaster;
pub use tasks::NewsJobs;
pub use service::NewsService;
