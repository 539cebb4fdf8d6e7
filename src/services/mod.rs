pub mod chat;
pub mod context_manager;
pub mod deep_dive_engine;
pub mod email_queue;
pub mod follow_up_engine;
pub mod http_client;
pub mod json_extractor;
pub mod llm_orchestrator;
pub mod model_selector;
pub mod photo_pipeline;
pub mod progression_analyzer;
pub mod quick_scan_engine;
pub mod report_orchestrator;
pub mod smart_batcher;
pub mod tier_resolver;
pub mod token_counter;
pub mod tracking_engine;

pub use chat::ChatEngine;
pub use context_manager::{ContextManager, ContextStatus};
pub use deep_dive_engine::DeepDiveEngine;
pub use email_queue::{EmailQueue, EmailRetryTask};
pub use follow_up_engine::FollowUpEngine;
pub use http_client::{with_retry, HttpClient, HttpError};
pub use llm_orchestrator::{CallResult, LlmError, LlmOrchestrator, Usage};
pub use model_selector::{Endpoint, ModelSelector};
pub use photo_pipeline::{CategorizationResult, PhotoPipeline, UploadOutcome};
pub use quick_scan_engine::QuickScanEngine;
pub use report_orchestrator::ReportOrchestrator;
pub use tier_resolver::TierResolver;
pub use tracking_engine::TrackingEngine;
