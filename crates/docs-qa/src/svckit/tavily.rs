//! Tavily Search
//!
//! Hosted web search restricted with `include_domains`.

use std::time::Duration;

use agent_core::tool::{SearchQuery, SearchResult, SearchTool};
use agent_core::{AgentError, Result};
use async_trait::async_trait;
use serde::Deserialize;

pub const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";

/// Search backend over the Tavily API
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for TavilySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilySearch").field("endpoint", &self.endpoint).finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    title: Option<String>,
    content: Option<String>,
    score: Option<f64>,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AgentError::Config("Tavily API key is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.into(),
        })
    }

    fn request_body(query: &SearchQuery) -> serde_json::Value {
        serde_json::json!({
            "query": query.query,
            "max_results": query.max_results.clamp(1, 20),
            "search_depth": query.depth.as_str(),
            "include_domains": query.allowed.to_vec(),
            "include_answer": false,
            "include_raw_content": false,
        })
    }

    /// Drop off-list hits and rank the rest
    fn convert(response: TavilyResponse, query: &SearchQuery) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = response
            .results
            .into_iter()
            .filter(|r| {
                let ok = query.allowed.permits_url(&r.url);
                if !ok {
                    tracing::warn!(url = %r.url, "search returned a URL outside the allow-list, dropping");
                }
                ok
            })
            .map(|r| SearchResult {
                title: r.title.unwrap_or_default(),
                url: r.url,
                snippet: r.content.unwrap_or_default(),
                score: r.score.unwrap_or_default(),
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(query.max_results.max(1));
        results
    }
}

#[async_trait]
impl SearchTool for TavilySearch {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        if query.allowed.is_empty() {
            return Err(AgentError::Config("search requires a non-empty allow-list".into()));
        }

        tracing::debug!(query = %query.query, sites = query.allowed.len(), "tavily search");

        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&Self::request_body(query))
            .send()
            .await
            .map_err(|e| AgentError::RemoteService(format!("Tavily request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AgentError::RemoteService(format!("Tavily search HTTP {status}")));
        }

        let body: TavilyResponse = resp
            .json()
            .await
            .map_err(|e| AgentError::RemoteService(format!("Tavily returned bad JSON: {e}")))?;

        Ok(Self::convert(body, query))
    }

    /// Any HTTP answer counts as reachable
    async fn health_check(&self) -> bool {
        match self.client.get(&self.endpoint).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Tavily health check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::tool::{AllowList, SearchDepth};
    use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn spawn(status: StatusCode, reply: serde_json::Value) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/search",
                post(
                    move |State(seen): State<Captured>, headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                        let reply = reply.clone();
                        async move {
                            let auth = headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            seen.lock().unwrap().push((auth, body));
                            (status, Json(reply))
                        }
                    },
                ),
            )
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}/search"), captured)
    }

    fn query(allowed: &[&str]) -> SearchQuery {
        SearchQuery {
            query: "custom tools".into(),
            allowed: AllowList::new(allowed.iter().copied()),
            max_results: 5,
            depth: SearchDepth::Advanced,
        }
    }

    #[tokio::test]
    async fn test_search_sends_domains_and_filters_results() {
        let reply = serde_json::json!({
            "results": [
                {"url": "https://docs.langchain.com/low", "title": "Low", "content": "a", "score": 0.1},
                {"url": "https://attacker.example/x", "title": "Bad", "content": "b", "score": 0.99},
                {"url": "https://python.langchain.com/high", "title": "High", "content": "c", "score": 0.8}
            ]
        });
        let (endpoint, captured) = spawn(StatusCode::OK, reply).await;
        let tavily = TavilySearch::new("tvly-key", endpoint, Duration::from_secs(5)).unwrap();

        let results = tavily
            .search(&query(&["docs.langchain.com", "python.langchain.com"]))
            .await
            .unwrap();

        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://python.langchain.com/high", "https://docs.langchain.com/low"]);

        let seen = captured.lock().unwrap();
        let (auth, body) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Bearer tvly-key"));
        assert_eq!(
            body["include_domains"],
            serde_json::json!(["docs.langchain.com", "python.langchain.com"])
        );
        assert_eq!(body["search_depth"], "advanced");
        assert_eq!(body["max_results"], 5);
    }

    #[tokio::test]
    async fn test_http_error_is_remote_service() {
        let (endpoint, _) = spawn(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({})).await;
        let tavily = TavilySearch::new("k", endpoint, Duration::from_secs(5)).unwrap();
        let err = tavily.search(&query(&["docs.rs"])).await.unwrap_err();
        assert!(matches!(err, AgentError::RemoteService(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_allow_list_refused_without_request() {
        let (endpoint, captured) = spawn(StatusCode::OK, serde_json::json!({"results": []})).await;
        let tavily = TavilySearch::new("k", endpoint, Duration::from_secs(5)).unwrap();
        let err = tavily.search(&query(&[])).await.unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert!(captured.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(TavilySearch::new(" ", DEFAULT_ENDPOINT, Duration::from_secs(1)).is_err());
    }
}
