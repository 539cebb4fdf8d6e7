//! Oracle Health library crate.
//!
//! Holds every core subsystem from SPEC_FULL.md: LLM orchestration, the conversational
//! context manager, the deep-dive and quick-scan engines, the photo pipeline, the email
//! send queue, the follow-up chain engine, the report orchestrator, and the tracking
//! engine. `handlers` is thin glue that deserializes requests and forwards to these.

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::{
    ChatEngine, ContextManager, DeepDiveEngine, EmailQueue, FollowUpEngine, HttpClient, LlmOrchestrator,
    ModelSelector, PhotoPipeline, QuickScanEngine, ReportOrchestrator, TierResolver, TrackingEngine,
};

/// Application shared state, threaded into every handler via axum's `State` extractor.
/// Every engine is wrapped in `Arc` for cheap cloning; the pool itself is already a
/// cheaply-cloneable connection pool handle.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<Config>,

    pub http_client: Arc<HttpClient>,
    pub tier_resolver: Arc<TierResolver>,
    pub orchestrator: Arc<LlmOrchestrator>,
    pub context_manager: Arc<ContextManager>,
    pub object_store: Arc<dyn db::ObjectStore>,

    pub chat_engine: Arc<ChatEngine>,
    pub quick_scan_engine: Arc<QuickScanEngine>,
    pub deep_dive_engine: Arc<DeepDiveEngine>,
    pub photo_pipeline: Arc<PhotoPipeline>,
    pub email_queue: Arc<EmailQueue>,
    pub follow_up_engine: Arc<FollowUpEngine>,
    pub report_orchestrator: Arc<ReportOrchestrator>,
    pub tracking_engine: Arc<TrackingEngine>,
}
