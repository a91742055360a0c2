use crate::config::EnrichmentConfig;
use crate::types::{Discovery, Enrichment, NormalizedDocument};
use crate::utils::files;
use crate::utils::text::{is_blank, truncate_chars};
use crate::{ReconError, Result};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::{Position, Url};

lazy_static! {
    static ref ACTION_RE: Regex = Regex::new(r#"(?i)action\s*=\s*["']([^"'>\s]+)"#)
        .expect("action attribute pattern");
    static ref HREF_RE: Regex = Regex::new(r#"(?i)href\s*=\s*["']([^"'>\s]+)"#)
        .expect("href attribute pattern");
}

/// Result of a single best-effort network probe.
///
/// Failures never abort enrichment; they only mean the field stays empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T> {
    Success(T),
    /// Connected, but nothing usable came back.
    Silent,
    Timeout,
    ConnectionError(String),
    ParseError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProbeKind {
    Success,
    Silent,
    Timeout,
    ConnectionError,
    ParseError,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Success => "success",
            ProbeKind::Silent => "silent",
            ProbeKind::Timeout => "timeout",
            ProbeKind::ConnectionError => "connection_error",
            ProbeKind::ParseError => "parse_error",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T> ProbeOutcome<T> {
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeOutcome::Success(_) => ProbeKind::Success,
            ProbeOutcome::Silent => ProbeKind::Silent,
            ProbeOutcome::Timeout => ProbeKind::Timeout,
            ProbeOutcome::ConnectionError(_) => ProbeKind::ConnectionError,
            ProbeOutcome::ParseError(_) => ProbeKind::ParseError,
        }
    }

    /// Short status stored in a discovery's `probes` map.
    pub fn label(&self) -> String {
        match self {
            ProbeOutcome::ConnectionError(detail) | ProbeOutcome::ParseError(detail) => {
                format!("{}: {}", self.kind(), detail)
            }
            _ => self.kind().to_string(),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            ProbeOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeOutcome::Timeout
        } else if err.is_decode() || err.is_body() {
            ProbeOutcome::ParseError(err.to_string())
        } else {
            ProbeOutcome::ConnectionError(err.to_string())
        }
    }
}

/// Per-run probe statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub records: usize,
    pub updated: usize,
    pub outcomes: BTreeMap<ProbeKind, usize>,
}

impl EnrichmentSummary {
    fn count(&mut self, kind: ProbeKind) {
        *self.outcomes.entry(kind).or_insert(0) += 1;
    }

    pub fn probes_run(&self) -> usize {
        self.outcomes.values().sum()
    }

    pub fn describe(&self) -> String {
        if self.outcomes.is_empty() {
            return "no probes run".to_string();
        }
        self.outcomes
            .iter()
            .map(|(kind, count)| format!("{} {}", count, kind))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// First `<title>` of a page, trimmed. Empty titles count as missing.
///
/// A title is only trusted when a closing `</title>` follows the opening tag.
/// html5ever reads an unclosed title up to the end of the input, which would
/// turn the whole page into the title.
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    if !lower[open..].contains("</title") {
        return None;
    }

    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

fn endpoint_path(value: &str) -> Option<String> {
    if !value.to_lowercase().starts_with("http") {
        return Some(value.to_string());
    }
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            // a bare origin like "https://example.com" names no endpoint
            if !has_raw_path(value) {
                return None;
            }
            let path = &url[Position::BeforePath..];
            (!path.is_empty()).then(|| path.to_string())
        }
        // not really absolute, e.g. "http-docs/index.html"
        _ => Some(value.to_string()),
    }
}

fn has_raw_path(value: &str) -> bool {
    let Some((_, rest)) = value.split_once("://") else {
        return false;
    };
    rest.find(&['/', '?', '#'][..])
        .map_or(false, |i| rest[i..].starts_with('/'))
}

/// Collect `action=` then `href=` attribute values as endpoint paths.
///
/// Absolute http(s) URLs are reduced to their path and query. Order of first
/// appearance is kept, duplicates dropped, at most `limit` entries.
pub fn extract_endpoints(html: &str, limit: usize) -> Vec<String> {
    let values = ACTION_RE
        .captures_iter(html)
        .chain(HREF_RE.captures_iter(html))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .filter(|v| !v.is_empty());

    let mut seen = HashSet::new();
    let mut endpoints = Vec::new();

    for value in values {
        if endpoints.len() >= limit {
            break;
        }
        if let Some(path) = endpoint_path(value) {
            if seen.insert(path.clone()) {
                endpoints.push(path);
            }
        }
    }

    endpoints
}

pub struct NetworkEnricher {
    config: EnrichmentConfig,
    client: Client,
}

impl NetworkEnricher {
    pub fn new(config: EnrichmentConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(ReconError::Http)?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Connect, optionally send a minimal HTTP request, read one chunk.
    pub async fn grab_banner(&self, host: &str, port: u16) -> ProbeOutcome<String> {
        let wait = self.config.connect_timeout();

        let mut stream = match timeout(wait, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return ProbeOutcome::ConnectionError(e.to_string()),
            Err(_) => return ProbeOutcome::Timeout,
        };

        if self.config.wants_http_probe(port) {
            let request = format!("GET / HTTP/1.0\r\nHost: {}\r\n\r\n", host);
            if let Err(e) = stream.write_all(request.as_bytes()).await {
                debug!("HTTP probe write to {}:{} failed: {}", host, port, e);
            }
        }

        let mut buffer = vec![0; self.config.banner_read_bytes];
        match timeout(wait, stream.read(&mut buffer)).await {
            Ok(Ok(n)) => {
                let banner = String::from_utf8_lossy(&buffer[..n])
                    .replace('\u{FFFD}', "")
                    .trim()
                    .to_string();
                if banner.is_empty() {
                    ProbeOutcome::Silent
                } else {
                    debug!("Banner from {}:{}: {}", host, port, banner);
                    ProbeOutcome::Success(truncate_chars(&banner, self.config.banner_max_chars))
                }
            }
            Ok(Err(e)) => ProbeOutcome::ConnectionError(e.to_string()),
            Err(_) => ProbeOutcome::Timeout,
        }
    }

    /// GET `/` and scrape headers, title, body snippet and endpoints.
    pub async fn fetch_page(&self, host: &str, port: u16) -> ProbeOutcome<Enrichment> {
        let url = format!("http://{}:{}/", host, port);

        let response = match self
            .client
            .get(&url)
            .timeout(self.config.http_timeout())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::from_reqwest(&e),
        };

        // names arrive lower-cased from `http`; repeated headers are joined
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return ProbeOutcome::from_reqwest(&e),
        };

        let body_snippet = (!text.is_empty())
            .then(|| truncate_chars(&text, self.config.body_snippet_chars));

        ProbeOutcome::Success(Enrichment {
            headers,
            title: extract_title(&text),
            body_snippet,
            endpoints: extract_endpoints(&text, self.config.max_endpoints),
            robots: None,
            notes: None,
        })
    }

    /// Best-effort `/robots.txt`; anything but 200 is treated as silent.
    pub async fn fetch_robots(&self, host: &str, port: u16) -> ProbeOutcome<String> {
        let url = format!("http://{}:{}/robots.txt", host, port);

        let response = match self
            .client
            .get(&url)
            .timeout(self.config.robots_timeout())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::from_reqwest(&e),
        };

        if response.status() != StatusCode::OK {
            debug!("robots.txt on {}:{} returned {}", host, port, response.status());
            return ProbeOutcome::Silent;
        }

        match response.text().await {
            Ok(text) => ProbeOutcome::Success(truncate_chars(&text, self.config.robots_max_chars)),
            Err(e) => ProbeOutcome::from_reqwest(&e),
        }
    }

    /// Enrich one discovery in place. Returns whether any field changed.
    pub async fn enrich_discovery(
        &self,
        host: &str,
        discovery: &mut Discovery,
        summary: &mut EnrichmentSummary,
    ) -> bool {
        let port = discovery.port;
        let mut changed = false;

        if is_blank(&discovery.banner) {
            let outcome = self.grab_banner(host, port).await;
            note_probe(discovery, summary, "banner", &outcome);
            if let Some(banner) = outcome.into_option() {
                changed |= discovery.fill_banner(Some(banner.as_str()));
            }
        }

        if self.config.is_web_port(port) {
            let page = self.fetch_page(host, port).await;
            note_probe(discovery, summary, "http", &page);
            let mut found = page.into_option().unwrap_or_default();

            let robots = self.fetch_robots(host, port).await;
            note_probe(discovery, summary, "robots", &robots);
            if let Some(robots) = robots.into_option() {
                if is_blank(&found.robots) && !robots.is_empty() {
                    found.robots = Some(robots);
                }
            }

            changed |= discovery.merge_enrichment(found);
        }

        changed
    }

    /// Enrich every discovery of `doc` in document order, one at a time.
    pub async fn enrich_document(&self, doc: &mut NormalizedDocument, host: &str) -> EnrichmentSummary {
        let mut summary = EnrichmentSummary::default();

        for discovery in &mut doc.discoveries {
            summary.records += 1;
            if self.enrich_discovery(host, discovery, &mut summary).await {
                summary.updated += 1;
            }
        }

        info!(
            "Enriched {} of {} discoveries on {} ({})",
            summary.updated,
            summary.records,
            host,
            summary.describe()
        );
        summary
    }
}

fn note_probe<T>(
    discovery: &mut Discovery,
    summary: &mut EnrichmentSummary,
    probe: &str,
    outcome: &ProbeOutcome<T>,
) {
    let kind = outcome.kind();
    summary.count(kind);
    match kind {
        ProbeKind::Success | ProbeKind::Silent => {
            debug!("{} probe on port {}: {}", probe, discovery.port, kind)
        }
        _ => warn!("{} probe on port {}: {}", probe, discovery.port, outcome.label()),
    }
    discovery.record_probe(probe, outcome.label());
}

/// Enrich a normalized file against `host`, writing `<stem>_http_enriched.json`.
pub async fn enrich_file(
    normalized: &Path,
    host: &str,
    config: &EnrichmentConfig,
) -> Result<(PathBuf, EnrichmentSummary)> {
    let mut doc = files::read_document(normalized).await?;
    let enricher = NetworkEnricher::new(config.clone())?;

    let summary = enricher.enrich_document(&mut doc, host).await;

    let output = files::derive_output_path(normalized, "http_enriched");
    files::write_document(&output, &doc).await?;

    Ok((output, summary))
}
