use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use oracle_health::config::Config;
use oracle_health::db::{self, LocalObjectStore, ObjectStore};
use oracle_health::services::{
    ChatEngine, ContextManager, DeepDiveEngine, EmailQueue, EmailRetryTask, FollowUpEngine, HttpClient, LlmOrchestrator,
    ModelSelector, PhotoPipeline, QuickScanEngine, ReportOrchestrator, TierResolver, TrackingEngine,
};
use oracle_health::utils::ScheduledExecutor;
use oracle_health::{handlers, AppState};

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = "chat", description = "Conversational chat and narrative health stories"),
        (name = "quick-scan", description = "Single-shot symptom scans"),
        (name = "deep-dive", description = "Multi-turn diagnostic sessions"),
        (name = "photo-analysis", description = "Photo upload, categorization, and progression tracking"),
        (name = "tracking", description = "Symptom tracking suggestions and charts"),
        (name = "followup", description = "Temporal follow-up chains"),
        (name = "report", description = "Report analysis and generation"),
        (name = "email", description = "Report email delivery and provider webhooks"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("oracle-health.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("oracle-health starting up");
    tracing::info!("configuration loaded successfully");

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("database pool created successfully");

    let config = Arc::new(config);

    let http_client = Arc::new(HttpClient::new());
    let tier_resolver = Arc::new(TierResolver::new(pool.clone(), Duration::from_secs(config.tier_cache.ttl_secs)));
    let context_manager = Arc::new(ContextManager::new(pool.clone()));

    let model_selector = ModelSelector::load(config.llm.model_config_path.as_deref());
    let orchestrator = Arc::new(LlmOrchestrator::new(
        model_selector,
        config.llm.openrouter_api_key.clone(),
        config.llm.openai_api_key.clone(),
        config.llm.anthropic_api_key.clone(),
    ));

    let object_store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(&config.storage.local_root));

    let chat_engine = Arc::new(ChatEngine::new(pool.clone(), Arc::clone(&orchestrator), Arc::clone(&tier_resolver), Arc::clone(&context_manager)));
    let quick_scan_engine =
        Arc::new(QuickScanEngine::new(pool.clone(), Arc::clone(&orchestrator), Arc::clone(&tier_resolver), Arc::clone(&context_manager)));
    let deep_dive_engine = Arc::new(DeepDiveEngine::new(pool.clone(), Arc::clone(&orchestrator)));
    let tracking_engine = Arc::new(TrackingEngine::new(pool.clone()));
    let photo_pipeline = Arc::new(PhotoPipeline::new(
        pool.clone(),
        Arc::clone(&orchestrator),
        Arc::clone(&tier_resolver),
        Arc::clone(&object_store),
        Arc::clone(&tracking_engine),
    ));
    let email_queue = Arc::new(EmailQueue::new(pool.clone(), Arc::clone(&http_client), config.email.clone()));
    let follow_up_engine = Arc::new(FollowUpEngine::new(pool.clone(), Arc::clone(&orchestrator), Arc::clone(&tier_resolver)));
    let report_orchestrator = Arc::new(ReportOrchestrator::new(pool.clone(), Arc::clone(&orchestrator), Arc::clone(&tier_resolver)));

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        config: Arc::clone(&config),
        http_client: Arc::clone(&http_client),
        tier_resolver: Arc::clone(&tier_resolver),
        orchestrator: Arc::clone(&orchestrator),
        context_manager: Arc::clone(&context_manager),
        object_store: Arc::clone(&object_store),
        chat_engine: Arc::clone(&chat_engine),
        quick_scan_engine: Arc::clone(&quick_scan_engine),
        deep_dive_engine: Arc::clone(&deep_dive_engine),
        photo_pipeline: Arc::clone(&photo_pipeline),
        email_queue: Arc::clone(&email_queue),
        follow_up_engine: Arc::clone(&follow_up_engine),
        report_orchestrator: Arc::clone(&report_orchestrator),
        tracking_engine: Arc::clone(&tracking_engine),
    });

    let retry_task = EmailRetryTask::new(Arc::clone(&email_queue));
    let retry_executor = ScheduledExecutor::new("email-retry-sweep", Duration::from_secs(60));
    tokio::spawn(async move {
        retry_executor.start(retry_task).await;
    });
    tracing::info!("email retry sweep started (interval: 60s)");

    let chat_routes = Router::new()
        .route("/api/chat", post(handlers::chat::chat))
        .route("/api/health-story", post(handlers::chat::health_story));

    let quick_scan_routes = Router::new()
        .route("/api/quick-scan", post(handlers::quick_scan::scan))
        .route("/api/quick-scan/:scan_id/think-harder", post(handlers::quick_scan::think_harder))
        .route("/api/quick-scan/:scan_id/o4-mini", post(handlers::quick_scan::o4_mini))
        .route("/api/quick-scan/:scan_id/ultra-think", post(handlers::quick_scan::ultra_think))
        .route("/api/quick-scan/:scan_id/ask-more", post(handlers::quick_scan::ask_more));

    let deep_dive_routes = Router::new()
        .route("/api/deep-dive/start", post(handlers::deep_dive::start))
        .route("/api/deep-dive/continue", post(handlers::deep_dive::continue_session))
        .route("/api/deep-dive/complete", post(handlers::deep_dive::complete))
        .route("/api/deep-dive/ask-more", post(handlers::deep_dive::ask_more))
        .route("/api/deep-dive/:session_id/think-harder", post(handlers::deep_dive::think_harder))
        .route("/api/deep-dive/:session_id/ultra-think", post(handlers::deep_dive::ultra_think))
        .route("/api/debug/session/:session_id", get(handlers::deep_dive::debug_session));

    let photo_routes = Router::new()
        .route("/api/photo-analysis/session", post(handlers::photo::create_session))
        .route("/api/photo-analysis/sessions/:user_id", get(handlers::photo::list_sessions))
        .route("/api/photo-analysis/session/:session_id", axum::routing::delete(handlers::photo::delete_session))
        .route("/api/photo-analysis/session/:session_id/photos", get(handlers::photo::session_photos))
        .route("/api/photo-analysis/upload", post(handlers::photo::upload))
        .route("/api/photo-analysis/analyze", post(handlers::photo::analyze))
        .route("/api/photo-analysis/session/:session_id/analyses", get(handlers::photo::session_analyses))
        .route("/api/photo-analysis/session/:session_id/batch", get(handlers::photo::batch_for_comparison))
        .route("/api/photo-analysis/session/:session_id/progression", get(handlers::photo::progression))
        .route("/api/photo-analysis/session/:session_id/reminder", post(handlers::photo::configure_reminder))
        .route("/api/photo-analysis/session/:session_id/monitoring-suggestion", get(handlers::photo::suggest_monitoring));

    let tracking_routes = Router::new()
        .route("/api/tracking/suggest", post(handlers::tracking::suggest))
        .route("/api/tracking/configure", post(handlers::tracking::configure))
        .route("/api/tracking/approve/:suggestion_id", post(handlers::tracking::approve))
        .route("/api/tracking/data-point", post(handlers::tracking::add_data_point))
        .route("/api/tracking/dashboard/:user_id", get(handlers::tracking::dashboard))
        .route("/api/tracking/chart/:config_id", get(handlers::tracking::chart))
        .route("/api/tracking/configurations/:user_id", get(handlers::tracking::configurations))
        .route("/api/tracking/data-points/:config_id", get(handlers::tracking::data_points))
        .route("/api/tracking/past-scans/:user_id", get(handlers::tracking::past_scans))
        .route("/api/tracking/past-dives/:user_id", get(handlers::tracking::past_dives));

    let follow_up_routes = Router::new()
        .route("/api/followup/questions/:assessment_id", get(handlers::follow_up::questions))
        .route("/api/followup/submit", post(handlers::follow_up::submit))
        .route("/api/followup/chain/:chain_id", get(handlers::follow_up::chain))
        .route("/api/followup/explain-visit", post(handlers::follow_up::explain_medical_visit));

    let report_routes = Router::new()
        .route("/api/report/analyze", post(handlers::report::analyze))
        .route("/api/report/comprehensive", post(handlers::report::generate_comprehensive))
        .route("/api/report/symptom-timeline", post(handlers::report::generate_symptom_timeline))
        .route("/api/report/photo-progression", post(handlers::report::generate_photo_progression))
        .route("/api/report/30-day", post(handlers::report::generate_30_day))
        .route("/api/report/annual", post(handlers::report::generate_annual))
        .route("/api/report/annual-summary", post(handlers::report::generate_annual_summary))
        .route("/api/report/specialty/:specialty", post(handlers::report::generate_specialty))
        .route("/api/report/:report_id", get(handlers::report::get))
        .route("/api/reports/:user_id", get(handlers::report::list))
        .route("/api/report/:report_id/doctor-notes", put(handlers::report::doctor_notes))
        .route("/api/report/:report_id/share", post(handlers::report::share))
        .route("/api/report/:report_id/rate", post(handlers::report::rate));

    let email_routes = Router::new()
        .route("/api/email/send-report", post(handlers::email::send_report))
        .route("/api/email/send-scan", post(handlers::email::send_scan))
        .route("/api/email/webhook", post(handlers::email::webhook));

    let health_routes = Router::new().route("/api/health", get(handlers::health::liveness));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(chat_routes)
        .merge(quick_scan_routes)
        .merge(deep_dive_routes)
        .merge(photo_routes)
        .merge(tracking_routes)
        .merge(follow_up_routes)
        .merge(report_routes)
        .merge(email_routes)
        .merge(health_routes)
        .with_state(app_state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);
    tracing::info!("oracle-health is ready to serve requests");

    axum::serve(listener, app).await?;

    Ok(())
}
