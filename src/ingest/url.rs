//! Importing remote pages as sources.

use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::models::{CreateSourceInput, SourceKind, SourceRole};

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>")
        .expect("script pattern is valid")
});
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(br|/p|/div|/li|/h[1-6]|/tr)\b[^>]*>").expect("block pattern is valid")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));
static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\f]+").expect("space pattern is valid"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("blank line pattern is valid"));

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Strip markup down to readable text, keeping paragraph breaks.
pub fn html_to_text(html: &str) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(html, " ");
    let with_breaks = BLOCK_BREAK.replace_all(&without_code, "\n");
    let without_tags = TAG.replace_all(&with_breaks, " ");
    let decoded = decode_entities(&without_tags);
    let collapsed = INLINE_SPACE.replace_all(&decoded, " ");
    let lines: Vec<&str> = collapsed.lines().map(str::trim).collect();
    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// The last non-empty path segment, or `imported`.
pub fn label_for_url(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .unwrap_or(url)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .filter(|segment| !segment.contains(':'))
        .unwrap_or("imported")
        .to_string()
}

/// Fetch a URL and turn it into a source. HTML is reduced to text; other
/// textual bodies are stored as-is.
pub async fn fetch_url_source(
    client: &reqwest::Client,
    url: &str,
    role: SourceRole,
) -> Result<CreateSourceInput> {
    let parsed = reqwest::Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    let response = client
        .get(parsed.clone())
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("Failed to fetch {}: {}", url, status);
    }

    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("html"))
        .unwrap_or(false);
    let body = response.text().await.context("Failed to read response body")?;
    let content = if is_html { html_to_text(&body) } else { body };

    tracing::info!(url, bytes = content.len(), "Imported URL source");
    Ok(CreateSourceInput {
        label: label_for_url(url),
        kind: SourceKind::Url,
        role,
        href: Some(parsed.to_string()),
        content,
    })
}
