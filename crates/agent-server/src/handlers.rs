//! HTTP Handlers

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};

use agent_core::{AgentError, SessionId};

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_id";

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
    pub search_reachable: bool,
    pub llm_reachable: bool,
    pub active_sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub reset_memory: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub status: &'static str,
    pub response: String,
    pub sources: Vec<String>,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error: String,
    pub code: &'static str,
}

/// Error reply with a natural-language message
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    code: &'static str,
}

impl ApiError {
    fn bad_request(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            code,
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        let (status, code) = match &e {
            AgentError::Exhausted { .. } => (StatusCode::BAD_GATEWAY, "EXHAUSTED"),
            AgentError::TurnTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TURN_TIMEOUT"),
            AgentError::Parse(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AgentError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "AGENT_ERROR"),
        };
        if status.is_server_error() {
            tracing::error!("Agent error: {}", e);
        } else {
            tracing::warn!("Agent error: {}", e);
        }
        Self {
            status,
            error: e.user_message(),
            code,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!("Rejected request body: {}", rejection.body_text());
        Self {
            status: rejection.status(),
            error: rejection.body_text(),
            code: "INVALID_REQUEST",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                status: "error",
                error: self.error,
                code: self.code,
            }),
        )
            .into_response()
    }
}

fn session_cookie(id: &SessionId, max_age: i64) -> Option<Cookie<'static>> {
    let raw = format!(
        "{SESSION_COOKIE}={id}; Path=/; Max-Age={max_age}; HttpOnly; Secure; SameSite=Lax"
    );
    match Cookie::parse(raw) {
        Ok(cookie) => Some(cookie),
        Err(e) => {
            tracing::error!("Failed to build session cookie: {}", e);
            None
        }
    }
}

fn cookie_session(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().trim())
        .filter(|v| !v.is_empty())
        .map(SessionId::from_string)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (search_reachable, llm_reachable) =
        tokio::join!(state.agent.search_reachable(), state.agent.llm_reachable());

    Json(HealthResponse {
        status: "healthy",
        message: "Documentation Q&A agent is running",
        version: env!("CARGO_PKG_VERSION"),
        search_reachable,
        llm_reachable,
        active_sessions: state.sessions.len(),
    })
}

/// Answer one message within the cookie's session
pub async fn chat_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    if payload.message.trim().is_empty() {
        return ApiError::bad_request("Message cannot be empty", "EMPTY_MESSAGE").into_response();
    }

    let requested = cookie_session(&jar);
    let (id, session, created) = state.sessions.get_or_create(requested.as_ref());
    let jar = match created.then(|| session_cookie(&id, state.session_max_age)).flatten() {
        Some(cookie) => jar.add(cookie),
        None => jar,
    };

    if payload.reset_memory {
        state.agent.reset(&session).await;
    }

    match state.agent.chat(&session, &payload.message).await {
        Ok(reply) => (
            jar,
            Json(ChatResponse {
                status: reply.status(),
                response: reply.response,
                sources: reply.sources,
                session_id: id.to_string(),
            }),
        )
            .into_response(),
        Err(e) => (jar, ApiError::from(e)).into_response(),
    }
}

/// Clear the cookie session's memory
pub async fn reset_handler(State(state): State<AppState>, jar: CookieJar) -> Result<Json<ResetResponse>, ApiError> {
    let session = cookie_session(&jar)
        .and_then(|id| state.sessions.get(&id))
        .ok_or_else(|| ApiError::bad_request("No active session", "NO_SESSION"))?;

    state.agent.reset(&session).await;

    Ok(Json(ResetResponse {
        status: "success",
        message: "Conversation memory cleared",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use agent_core::provider::GenerationOptions;
    use agent_core::reasoning::{AgentLoop, LoopConfig, Oracle};
    use agent_core::tool::{PassThrough, ToolBox, ToolSettings};
    use agent_core::{MemorySessionStore, SessionStore};
    use axum::{Router, body::Body, http::Request};
    use docs_qa::mock::{MockProvider, MockScraper, MockSearch, RuleOracle, hit};
    use docs_qa::{DocsQaAgent, LlmOracle, SiteRegistry};
    use tower::ServiceExt;

    const TABLE: &str = "domain,site,description\n\
        LangChain,docs.langchain.com,LangChain framework docs\n";
    const AGENTS: &str = "https://docs.langchain.com/oss/python/langchain/agents";

    struct TestApp {
        router: Router,
        sessions: Arc<MemorySessionStore>,
    }

    fn app_with(oracle: Option<Arc<dyn Oracle>>, turn_timeout: Duration) -> TestApp {
        let registry = Arc::new(SiteRegistry::from_reader(TABLE.as_bytes()).unwrap());
        let oracle: Arc<dyn Oracle> = match oracle {
            Some(oracle) => oracle,
            None => Arc::new(RuleOracle::new()),
        };
        let search = Arc::new(MockSearch::new(vec![hit(
            AGENTS,
            "Agents combine a language model with tools; pass custom tools to create_agent.",
            0.9,
        )]));
        let tools = ToolBox::new(
            search,
            Arc::new(MockScraper::default()),
            Arc::new(PassThrough),
            ToolSettings::default(),
        );
        let config = LoopConfig {
            rejection_message: registry.rejection_message(),
            ..LoopConfig::default()
        };
        let agent = DocsQaAgent::new(registry, AgentLoop::new(oracle, Arc::new(tools), config), turn_timeout);
        let sessions = Arc::new(MemorySessionStore::new());
        let state = AppState {
            agent: Arc::new(agent),
            sessions: sessions.clone(),
            session_max_age: 3600,
        };
        TestApp {
            router: crate::router(state),
            sessions,
        }
    }

    fn app() -> TestApp {
        app_with(None, Duration::from_secs(10))
    }

    fn post(uri: &str, body: serde_json::Value, cookie: Option<&str>) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(id) = cookie {
            req = req.header("cookie", format!("{SESSION_COOKIE}={id}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Option<String>, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let set_cookie = resp
            .headers()
            .get("set-cookie")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, set_cookie, json)
    }

    #[tokio::test]
    async fn test_health_is_idempotent() {
        let app = app();
        let get = || Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (s1, _, first) = send(&app.router, get()).await;
        let (s2, _, second) = send(&app.router, get()).await;
        assert_eq!(s1, StatusCode::OK);
        assert_eq!(s2, StatusCode::OK);
        assert_eq!(first, second);
        assert_eq!(first["active_sessions"], 0);
        assert_eq!(first["search_reachable"], true);
    }

    #[tokio::test]
    async fn test_chat_sets_cookie_and_reuses_session() {
        let app = app();
        let body = serde_json::json!({"message": "How do I create a LangChain agent with custom tools?"});
        let (status, cookie, json) = send(&app.router, post("/chat", body, None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["sources"][0], AGENTS);
        let cookie = cookie.unwrap();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=3600"));
        let id = json["session_id"].as_str().unwrap().to_string();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}={id}")));

        let body = serde_json::json!({"message": "And LangChain memory?"});
        let (status, cookie, json) = send(&app.router, post("/chat", body, Some(&id))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(cookie.is_none());
        assert_eq!(json["session_id"], id.as_str());

        let session = app.sessions.get(&SessionId::from_string(&id)).unwrap();
        assert_eq!(session.lock().await.turn_count(), 2);
        assert_eq!(app.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let app = app();
        let (status, _, json) =
            send(&app.router, post("/chat", serde_json::json!({"message": "  "}), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert_eq!(app.sessions.len(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_gets_error_shape() {
        let app = app();
        let raw = |content_type: &str, body: &'static str| {
            Request::builder()
                .method("POST")
                .uri("/chat")
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap()
        };

        let (status, _, json) = send(&app.router, raw("application/json", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "INVALID_REQUEST");
        assert!(!json["error"].as_str().unwrap().is_empty());

        let (status, _, json) = send(&app.router, raw("application/json", r#"{"reset_memory": true}"#)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["code"], "INVALID_REQUEST");

        let (status, _, json) = send(&app.router, raw("text/plain", "hello")).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json["status"], "error");
        assert_eq!(app.sessions.len(), 0);
    }

    #[tokio::test]
    async fn test_out_of_scope_question_is_rejected() {
        let app = app();
        let body = serde_json::json!({"message": "What is the capital of France?"});
        let (status, _, json) = send(&app.router, post("/chat", body, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "rejected");
        assert!(json["response"].as_str().unwrap().contains("LangChain"));
        assert_eq!(json["sources"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_reset_requires_session_and_clears_memory() {
        let app = app();
        let (status, _, json) = send(&app.router, post("/reset", serde_json::json!({}), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No active session");

        let body = serde_json::json!({"message": "LangChain agents?"});
        let (_, _, json) = send(&app.router, post("/chat", body, None)).await;
        let id = json["session_id"].as_str().unwrap().to_string();

        let (status, _, json) = send(&app.router, post("/reset", serde_json::json!({}), Some(&id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        let session = app.sessions.get(&SessionId::from_string(&id)).unwrap();
        assert!(session.lock().await.memory.is_empty());
    }

    #[tokio::test]
    async fn test_reset_memory_flag_starts_fresh() {
        let app = app();
        let (_, _, json) = send(
            &app.router,
            post("/chat", serde_json::json!({"message": "LangChain agents?"}), None),
        )
        .await;
        let id = json["session_id"].as_str().unwrap().to_string();

        let body = serde_json::json!({"message": "LangChain tools?", "reset_memory": true});
        send(&app.router, post("/chat", body, Some(&id))).await;

        let session = app.sessions.get(&SessionId::from_string(&id)).unwrap();
        let session = session.lock().await;
        assert_eq!(session.turn_count(), 1);
        assert_eq!(session.memory.turns()[0].question, "LangChain tools?");
    }

    #[tokio::test]
    async fn test_turn_timeout_is_504_and_memory_unchanged() {
        let slow: Arc<dyn Oracle> = Arc::new(RuleOracle::with_delay(Duration::from_millis(200)));
        let app = app_with(Some(slow), Duration::from_millis(50));
        let body = serde_json::json!({"message": "LangChain agents?"});
        let (status, cookie, json) = send(&app.router, post("/chat", body, None)).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json["code"], "TURN_TIMEOUT");
        assert!(cookie.is_some());
        assert_eq!(app.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_is_502() {
        let registry = Arc::new(SiteRegistry::from_reader(TABLE.as_bytes()).unwrap());
        let broken: Arc<dyn Oracle> = Arc::new(LlmOracle::new(
            Arc::new(MockProvider::failing()),
            GenerationOptions::default(),
            registry,
        ));
        let app = app_with(Some(broken), Duration::from_secs(10));
        let body = serde_json::json!({"message": "LangChain agents?"});
        let (status, _, json) = send(&app.router, post("/chat", body, None)).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "EXHAUSTED");
    }
}
