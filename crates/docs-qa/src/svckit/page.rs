//! Page Scraper
//!
//! Fetches a single allow-listed page and reduces it to readable text.
//! Redirects are followed by hand so every hop is checked against the
//! allow-list before it is requested. Pages that come back without any
//! text can be handed to a `PageRenderer`.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use agent_core::tool::{AllowList, ScrapeTool, truncate_chars};
use agent_core::{AgentError, Result};
use async_trait::async_trait;

use super::render::PageRenderer;

const MAX_REDIRECTS: usize = 5;
const TEXT_WIDTH: usize = 100;

/// Blocks that never carry documentation content
const NOISE_TAGS: &[&str] = &["script", "style", "noscript", "svg", "nav", "footer", "header"];

/// Fetches pages over HTTP(S)
pub struct HttpScraper {
    client: reqwest::Client,
    max_length: usize,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl std::fmt::Debug for HttpScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpScraper")
            .field("max_length", &self.max_length)
            .field("render_fallback", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpScraper {
    pub fn new(user_agent: &str, timeout: Duration, max_length: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_length,
            renderer: None,
        })
    }

    /// Render pages whose static HTML has no text
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    async fn render(&self, renderer: &dyn PageRenderer, url: &str, allowed: &AllowList) -> Result<String> {
        tracing::debug!(%url, "no static text, rendering");
        let page = renderer.render(url, allowed).await?;
        if !allowed.permits_url(&page.final_url) {
            return Err(AgentError::PolicyViolation(format!(
                "{} is outside the approved sites",
                page.final_url
            )));
        }
        Ok(extract_text(&page.html))
    }

    async fn fetch(&self, url: &str, allowed: &AllowList) -> Result<String> {
        let mut current = url.to_string();
        for _ in 0..=MAX_REDIRECTS {
            if !allowed.permits_url(&current) {
                return Err(AgentError::PolicyViolation(format!(
                    "{current} is outside the approved sites"
                )));
            }

            let resp = self
                .client
                .get(&current)
                .send()
                .await
                .map_err(|e| AgentError::RemoteService(format!("fetch failed: {e}")))?;
            let status = resp.status();

            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| AgentError::RemoteService(format!("HTTP {status} without a location")))?;
                let next = resp
                    .url()
                    .join(location)
                    .map_err(|e| AgentError::RemoteService(format!("bad redirect target: {e}")))?;
                tracing::debug!(from = %current, to = %next, "following redirect");
                current = next.to_string();
                continue;
            }

            if !status.is_success() {
                return Err(AgentError::RemoteService(format!("HTTP {status} for {current}")));
            }

            return resp
                .text()
                .await
                .map_err(|e| AgentError::RemoteService(format!("unreadable body: {e}")));
        }
        Err(AgentError::RemoteService(format!("too many redirects from {url}")))
    }
}

#[async_trait]
impl ScrapeTool for HttpScraper {
    async fn scrape(&self, url: &str, allowed: &AllowList) -> Result<String> {
        let html = self.fetch(url, allowed).await?;
        let mut text = extract_text(&html);
        if text.is_empty() {
            if let Some(renderer) = &self.renderer {
                text = self.render(renderer.as_ref(), url, allowed).await?;
            }
        }
        tracing::debug!(%url, chars = text.chars().count(), "scraped page");
        Ok(truncate_chars(&text, self.max_length))
    }
}

/// Readable text of an HTML document, main content first
pub fn extract_text(html: &str) -> String {
    let mut cleaned = html.to_string();
    for tag in NOISE_TAGS {
        cleaned = strip_tag_blocks(&cleaned, tag);
    }

    let fragment = main_fragment(&cleaned).unwrap_or(cleaned);
    let text = html2text::from_read(Cursor::new(fragment.as_bytes()), TEXT_WIDTH)
        .unwrap_or_else(|_| fragment.clone());
    collapse_blank_lines(&text)
}

/// Inner HTML of the first `main`/`article` element, if any
fn main_fragment(html: &str) -> Option<String> {
    let doc = scraper::Html::parse_document(html);
    ["main", "article", "[role=main]"].iter().find_map(|css| {
        let sel = scraper::Selector::parse(css).ok()?;
        doc.select(&sel)
            .find(|el| el.text().any(|t| !t.trim().is_empty()))
            .map(|el| el.html())
    })
}

/// Remove `<tag ...>...</tag>` blocks, ASCII case-insensitive
fn strip_tag_blocks(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut out = String::with_capacity(html.len());
    let mut i = 0;
    while let Some(rel) = lower[i..].find(&open) {
        let start = i + rel;
        let after = start + open.len();
        // `<header` must not match `<head`
        let boundary = lower[after..]
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c == '/' || c.is_ascii_whitespace());
        if !boundary {
            out.push_str(&html[i..after]);
            i = after;
            continue;
        }
        match lower[after..].find(&close) {
            Some(rel_end) => {
                out.push_str(&html[i..start]);
                i = after + rel_end + close.len();
            }
            None => break,
        }
    }
    out.push_str(&html[i..]);
    out
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
