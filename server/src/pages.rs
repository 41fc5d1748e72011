//! Server-rendered marketing pages and the OKC Pulse feed page.

use crate::auth::MaybeSession;
use crate::error::ApiResult;
use crate::paywall::{load_feed, plan_for, FeedPage};
use crate::state::AppState;
use axum::{extract::State, response::Html, routing::get, Router};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

pub const PULSE_PATH: &str = "/okc-pulse";

/// Rendered HTML for anonymous visitors, keyed by path.
pub struct PageCache {
    entries: DashMap<String, (Instant, String)>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, path: &str) -> Option<String> {
        let fresh = self
            .entries
            .get(path)
            .filter(|entry| entry.0.elapsed() < self.ttl)
            .map(|entry| entry.1.clone());
        if fresh.is_none() {
            self.entries.remove(path);
        }
        fresh
    }

    pub fn insert(&self, path: &str, html: String) {
        self.entries.insert(path.to_string(), (Instant::now(), html));
    }

    /// Drop one path, or every page when `path` is `None`. Returns how many
    /// entries were removed.
    pub fn invalidate(&self, path: Option<&str>) -> usize {
        match path {
            Some(path) => usize::from(self.entries.remove(path).is_some()),
            None => {
                let count = self.entries.len();
                self.entries.clear();
                count
            }
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/pricing", get(pricing))
        .route("/assessment", get(assessment))
        .route(PULSE_PATH, get(okc_pulse))
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | DealSprints</title>
</head>
<body>
<header><nav><a href="/">DealSprints</a> <a href="/okc-pulse">OKC Pulse</a> <a href="/assessment">Free assessment</a> <a href="/pricing">Pricing</a></nav></header>
<main>
{body}
</main>
<footer><p>DealSprints, Oklahoma City</p></footer>
</body>
</html>"#,
        title = escape_html(title),
        body = body,
    )
}

async fn home() -> Html<String> {
    Html(layout(
        "Sell your business with confidence",
        r#"<section>
<h1>Sell your Oklahoma business on your terms</h1>
<p>Get a free valuation-focused assessment and a clear plan to reach qualified buyers.</p>
<p><a href="/assessment">Start your free assessment</a></p>
</section>
<section>
<h2>OKC Pulse</h2>
<p>Openings, permits, expansions and deals across the metro, summarized daily.</p>
<p><a href="/okc-pulse">Read the latest</a></p>
</section>"#,
    ))
}

async fn pricing(State(state): State<AppState>) -> Html<String> {
    let settings = &state.settings;
    let body = format!(
        r#"<h1>Pricing</h1>
<section><h2>Free</h2><p>The {free} latest OKC Pulse stories.</p></section>
<section><h2>Member</h2><p>Up to {member} stories from the last {days} days, filtered by category.</p>
<p><a href="/okc-pulse">Sign in to upgrade</a></p></section>
<section><h2>Realtor</h2><p>Scored leads from permits, licenses and zoning cases with CSV export.</p></section>"#,
        free = settings.free_post_limit,
        member = settings.member_post_limit,
        days = settings.feed_window_days,
    );
    Html(layout("Pricing", &body))
}

async fn assessment() -> Html<String> {
    Html(layout(
        "Free business assessment",
        r#"<h1>Free business assessment</h1>
<p>Tell us about your business. We reply within one business day.</p>
<form id="assessment" method="post" action="/api/assessment">
<label>Your name <input name="contact_name" required></label>
<label>Email <input name="email" type="email" required></label>
<label>Phone <input name="phone"></label>
<label>Business name <input name="business_name" required></label>
<label>Industry <input name="industry" required></label>
<label>Annual revenue <input name="annual_revenue" type="number"></label>
<label>Cash flow <input name="cash_flow" type="number"></label>
<label>Years in business <input name="years_in_business" type="number"></label>
<label>Employees <input name="employees" type="number"></label>
<label>Why are you selling? <textarea name="reason_for_selling"></textarea></label>
<label>Timeline <input name="timeline"></label>
<button type="submit">Request assessment</button>
</form>
<p id="result"></p>
<script>
document.getElementById('assessment').addEventListener('submit', async (event) => {
  event.preventDefault();
  const data = Object.fromEntries(new FormData(event.target));
  for (const key of ['annual_revenue', 'cash_flow']) data[key] = data[key] ? Number(data[key]) : null;
  for (const key of ['years_in_business', 'employees']) data[key] = data[key] ? parseInt(data[key], 10) : null;
  const res = await fetch('/api/assessment', {
    method: 'POST',
    headers: { 'content-type': 'application/json' },
    body: JSON.stringify(data),
  });
  document.getElementById('result').textContent = res.ok
    ? 'Thanks! We will be in touch within one business day.'
    : 'Please check the form and try again.';
});
</script>"#,
    ))
}

pub fn render_feed(page: &FeedPage) -> String {
    let mut body = String::from("<h1>OKC Pulse</h1>\n");

    if page.posts.is_empty() {
        body.push_str("<p>No stories yet. Check back soon.</p>\n");
    }

    for post in &page.posts {
        body.push_str("<article>\n");
        if let Some(photo) = &post.photo_url {
            body.push_str(&format!(
                "<img src=\"{}\" alt=\"{}\">\n",
                escape_html(photo),
                escape_html(&post.title)
            ));
        }
        body.push_str(&format!("<h2>{}</h2>\n", escape_html(&post.title)));
        if let Some(category) = &post.category {
            body.push_str(&format!("<p class=\"category\">{}</p>\n", escape_html(category)));
        }
        if let Some(summary) = &post.summary {
            body.push_str(&format!("<p>{}</p>\n", escape_html(summary)));
        }
        body.push_str(&format!(
            "<p class=\"source\">Source: <a href=\"{}\" rel=\"nofollow\">{}</a></p>\n</article>\n",
            escape_html(&post.source_url),
            escape_html(&post.source_name)
        ));
    }

    if page.has_more {
        body.push_str(&format!(
            "<aside class=\"upsell\"><p>You are seeing {} of {} recent stories.</p><p><a href=\"/pricing\">Upgrade to see them all</a></p></aside>\n",
            page.posts.len(),
            page.total_available
        ));
    }

    layout("OKC Pulse", &body)
}

async fn okc_pulse(State(state): State<AppState>, MaybeSession(user): MaybeSession) -> ApiResult<Html<String>> {
    if user.is_none() {
        if let Some(html) = state.pages.get(PULSE_PATH) {
            debug!("Serving cached {}", PULSE_PATH);
            return Ok(Html(html));
        }
    }

    let plan = plan_for(&state, user.as_ref()).await?;
    let page = load_feed(&state, plan, None).await?;
    let html = render_feed(&page);

    if user.is_none() {
        state.pages.insert(PULSE_PATH, html.clone());
    }
    Ok(Html(html))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_escaped() {
        assert_eq!(
            escape_html(r#"<script>alert("x") & 'y'</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;) &amp; &#39;y&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn cache_expires_and_invalidates() {
        let cache = PageCache::new(Duration::from_secs(60));
        cache.insert("/okc-pulse", "a".to_string());
        cache.insert("/pricing", "b".to_string());
        assert_eq!(cache.get("/okc-pulse").as_deref(), Some("a"));

        assert_eq!(cache.invalidate(Some("/okc-pulse")), 1);
        assert_eq!(cache.get("/okc-pulse"), None);
        assert_eq!(cache.invalidate(None), 1);

        let expired = PageCache::new(Duration::ZERO);
        expired.insert("/okc-pulse", "stale".to_string());
        assert_eq!(expired.get("/okc-pulse"), None);
    }
}
