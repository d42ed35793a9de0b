pub mod defs;
pub mod jobs;
pub mod timestamp;

// Object style note:
// Types here are the contract between the ingestion boundary, the queue
// layer and the news-feed service. They carry data only; behavior lives in
// the service crate, which re-exports them.
