use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use lora_chat_api::config::Settings;
use lora_chat_api::database::{DbPool, SessionStore};
use lora_chat_api::handlers;
use lora_chat_api::services::intent::{AnswerRouter, GenerateAnswer, QuestionPolicy};
use lora_chat_api::services::resolver::{CacheLookup, VerifyAnswer};
use lora_chat_api::services::{
    CacheResolver, EmbeddingService, KnowledgeBox, LlmService, RagService, RelevanceVerifier,
};
use lora_chat_api::state::AppState;
use lora_chat_api::utils::logger;

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger()?;

    info!("🚀 Starting Lora Chat API...");

    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    let db_pool = DbPool::new(&settings.database).await?;
    let session_store = SessionStore::new(db_pool.clone());
    session_store.init_schema().await?;
    info!("✅ Session store ready");

    let embedding_service = Arc::new(EmbeddingService::new(settings.embedding.clone()));
    let llm_service = Arc::new(LlmService::new(settings.llm.clone()));

    let knowledge_box = Arc::new(
        KnowledgeBox::load(&settings.knowledge, embedding_service.clone()).await?,
    );
    info!("✅ Knowledge box loaded");

    let rag_service = Arc::new(
        RagService::build(
            embedding_service.clone(),
            llm_service.clone(),
            settings.rag.clone(),
        )
        .await?,
    );
    info!("✅ Document index built");

    let policy = Arc::new(QuestionPolicy::new(settings.chat.vague_tokens.clone()));
    let verifier = Arc::new(RelevanceVerifier::new(llm_service.clone()));

    let resolver = CacheResolver::new(
        knowledge_box as Arc<dyn CacheLookup>,
        verifier as Arc<dyn VerifyAnswer>,
        policy.clone(),
        settings.knowledge.similarity_threshold,
    );

    let answer_router = Arc::new(AnswerRouter::new(
        session_store.clone(),
        resolver,
        rag_service as Arc<dyn GenerateAnswer>,
        policy,
        settings.chat.clone(),
        settings.prompts.system_prompt.clone(),
    ));

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = AppState {
        settings: Arc::new(settings),
        db_pool,
        session_store,
        answer_router,
    };

    let app = build_router(state);

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/api/chat", post(handlers::chat::chat_handler))
        .route("/api/session/clear", post(handlers::session::clear_session_handler))
        .route("/api/session/new", post(handlers::session::new_session_handler))
        .with_state(state)
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(DefaultBodyLimit::max(1024 * 1024))
}
