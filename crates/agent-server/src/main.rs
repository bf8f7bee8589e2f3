//! docs-qa HTTP Server
//!
//! Axum-based server exposing the documentation Q&A agent:
//! `/chat`, `/reset` and `/health`, with cookie-keyed sessions.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::provider::LlmProvider;
use agent_core::reasoning::AgentLoop;
use agent_core::tool::{PassThrough, Summarizer, ToolBox};
use agent_core::{MemorySessionStore, SessionStore};
use agent_runtime::{GeminiConfig, GeminiProvider, OllamaConfig, OllamaProvider};
use docs_qa::tools::{HttpScraper, LlmSummarizer, PlaywrightRenderer, TavilySearch};
use docs_qa::{DocsQaAgent, LlmOracle, ProviderKind, QaConfig, SiteRegistry};

use crate::handlers::{chat_handler, health_check, reset_handler};
use crate::state::AppState;

/// All routes, with CORS and request tracing
fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat_handler))
        .route("/reset", post(reset_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_provider(config: &QaConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.llm_provider {
        ProviderKind::Gemini => {
            let key = config.google_api_key.clone().unwrap_or_default();
            Arc::new(GeminiProvider::new(
                GeminiConfig::new(key)
                    .model(&config.llm_model)
                    .base_url(&config.gemini_base_url)
                    .timeout_secs(config.llm_timeout),
            )?)
        }
        ProviderKind::Ollama => Arc::new(OllamaProvider::from_config(
            OllamaConfig::from_env().timeout_secs(config.llm_timeout),
        )),
    };
    Ok(provider)
}

fn build_state(config: &QaConfig, registry: Arc<SiteRegistry>, provider: Arc<dyn LlmProvider>) -> anyhow::Result<AppState> {
    let settings = config.tool_settings();

    let search = Arc::new(TavilySearch::new(
        &config.tavily_api_key,
        &config.tavily_endpoint,
        settings.timeout,
    )?);
    let mut scraper = HttpScraper::new(&config.user_agent, settings.timeout, config.max_scrape_length)?;
    if config.render_fallback {
        scraper = scraper.with_renderer(Arc::new(PlaywrightRenderer::new(
            &config.node_bin,
            &config.user_agent,
            settings.timeout,
        )));
    }
    let scraper = Arc::new(scraper);
    let summarizer: Arc<dyn Summarizer> = if config.enable_search_summarization {
        Arc::new(
            LlmSummarizer::new(
                provider.clone(),
                config.generation().with_model(&config.summary_model),
            )
            .max_input(config.max_content_size)
            .timeout(std::time::Duration::from_secs(config.llm_timeout)),
        )
    } else {
        Arc::new(PassThrough)
    };
    let tools = Arc::new(ToolBox::new(search, scraper, summarizer, settings));

    let oracle = Arc::new(
        LlmOracle::new(provider, config.generation(), registry.clone()).memory_window(config.memory_window),
    );
    let agent_loop = AgentLoop::new(oracle, tools, config.loop_config(registry.rejection_message()));
    let agent = DocsQaAgent::new(registry, agent_loop, config.turn_budget());

    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::with_max_age(config.session_max_age));

    Ok(AppState {
        agent: Arc::new(agent),
        sessions,
        session_max_age: config.session_max_age,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = QaConfig::from_env()?;
    config.log();

    let registry = Arc::new(SiteRegistry::load(&config.sites_file)?);
    tracing::info!("Approved topics: {}", registry.topics().join(", "));
    for entry in registry.entries() {
        tracing::info!("  • {} ({})", entry.site, entry.domain);
    }

    let provider = build_provider(&config)?;
    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ Connected to {}", provider.name()),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} not reachable - answers will fail until it is", provider.name());
        }
    }

    let state = build_state(&config, registry, provider)?;
    if !state.agent.search_reachable().await {
        tracing::warn!("⚠ Search API not reachable at {}", config.tavily_endpoint);
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 docs-qa server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health - Health check");
    tracing::info!("  POST /chat   - Ask a question");
    tracing::info!("  POST /reset  - Clear conversation memory");

    axum::serve(listener, app).await?;

    Ok(())
}
