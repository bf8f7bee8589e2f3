//! Headless Render
//!
//! Fallback for documentation pages that build their content with
//! JavaScript. A headless Chromium driven by Playwright under Node loads
//! the page and hands back the final DOM. Navigations to hosts outside the
//! allow-list are aborted inside the browser, and the final URL is checked
//! again here.

use std::process::Stdio;
use std::time::Duration;

use agent_core::tool::AllowList;
use agent_core::{AgentError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

/// DOM of a rendered page
#[derive(Clone, Debug)]
pub struct RenderedPage {
    pub final_url: String,
    pub html: String,
}

/// Something that can run a page's scripts and return the result
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, allowed: &AllowList) -> Result<RenderedPage>;
}

/// Reads the request from stdin, prints one JSON object on stdout.
const RENDER_JS: &str = r"
const fs = require('fs');
const out = (obj) => process.stdout.write(JSON.stringify(obj));

async function main() {
  const req = JSON.parse(fs.readFileSync(0, 'utf8'));
  let pw;
  try { pw = require('playwright'); } catch (e) {
    return out({ ok: false, code: 'not_configured', message: 'playwright is not installed for node' });
  }
  const allowed = (host) => {
    host = host.toLowerCase().replace(/^www\./, '');
    return req.sites.some((s) => host === s || host.endsWith('.' + s));
  };
  let browser;
  try {
    browser = await pw.chromium.launch({ headless: true });
    const context = await browser.newContext({ userAgent: req.user_agent, serviceWorkers: 'block' });
    const page = await context.newPage();
    await page.route('**/*', (route) => {
      const r = route.request();
      const type = r.resourceType();
      if (type === 'image' || type === 'media' || type === 'font') return route.abort();
      if (r.isNavigationRequest() && !allowed(new URL(r.url()).hostname)) return route.abort('blockedbyclient');
      return route.continue();
    });
    await page.goto(req.url, { waitUntil: 'domcontentloaded', timeout: req.timeout_ms });
    try { await page.waitForLoadState('networkidle', { timeout: Math.min(5000, req.timeout_ms) }); } catch (_) {}
    out({ ok: true, final_url: page.url(), html: await page.content() });
  } catch (e) {
    out({ ok: false, code: 'fetch_failed', message: String(e && e.message ? e.message : e) });
  } finally {
    try { if (browser) await browser.close(); } catch (_) {}
  }
}

main().catch((e) => out({ ok: false, code: 'fetch_failed', message: String(e) }));
";

#[derive(Debug, Deserialize)]
struct RenderReply {
    ok: bool,
    #[serde(default)]
    final_url: String,
    #[serde(default)]
    html: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Renders through `node` and the `playwright` npm package.
///
/// Needs Node.js on the host with `playwright` resolvable (for example
/// `npm i -g playwright && npx playwright install chromium`).
#[derive(Clone, Debug)]
pub struct PlaywrightRenderer {
    node: String,
    user_agent: String,
    timeout: Duration,
}

impl PlaywrightRenderer {
    pub fn new(node: impl Into<String>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            node: node.into(),
            user_agent: user_agent.into(),
            timeout,
        }
    }

    fn request(&self, url: &str, allowed: &AllowList) -> String {
        serde_json::json!({
            "url": url,
            "sites": allowed.to_vec(),
            "user_agent": self.user_agent,
            "timeout_ms": u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        })
        .to_string()
    }
}

#[async_trait]
impl PageRenderer for PlaywrightRenderer {
    async fn render(&self, url: &str, allowed: &AllowList) -> Result<RenderedPage> {
        let mut child = tokio::process::Command::new(&self.node)
            .arg("-e")
            .arg(RENDER_JS)
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                AgentError::Config(format!("headless render needs Node.js ({}): {e}", self.node))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(self.request(url, allowed).as_bytes())
                .await
                .map_err(|e| AgentError::RemoteService(format!("render request failed: {e}")))?;
        }

        // browser start-up on top of the page budget
        let budget = self.timeout + Duration::from_secs(10);
        let output = tokio::time::timeout(budget, child.wait_with_output())
            .await
            .map_err(|_| AgentError::RemoteService(format!("render timed out after {}s", budget.as_secs())))?
            .map_err(|e| AgentError::RemoteService(format!("render process failed: {e}")))?;

        let reply: RenderReply = serde_json::from_slice(&output.stdout)
            .map_err(|e| AgentError::RemoteService(format!("unreadable render output: {e}")))?;
        if !reply.ok {
            return Err(match reply.code.as_str() {
                "not_configured" => AgentError::Config(reply.message),
                _ => AgentError::RemoteService(format!("render failed: {}", reply.message)),
            });
        }

        Ok(RenderedPage {
            final_url: reply.final_url,
            html: reply.html,
        })
    }
}
