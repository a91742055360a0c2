//! Pattern based vulnerability candidate mapping.
//!
//! The search text of a discovery is its banner followed by a projection of
//! its enrichment (headers as `key:value`, the page title, robots.txt or
//! notes), lower-cased. Every rule whose lower-cased pattern occurs in that
//! text yields one candidate, in table order, at most once per pattern.

use crate::types::{Candidate, Confidence, Enrichment, NormalizedDocument};
use crate::utils::files;
use crate::{ReconError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub pattern: String,
    #[serde(default)]
    pub cve: Vec<String>,
    pub reason: String,
    pub confidence: Confidence,
}

impl Rule {
    pub fn new(pattern: &str, cve: &[&str], reason: &str, confidence: Confidence) -> Self {
        Self {
            pattern: pattern.to_string(),
            cve: cve.iter().map(|c| c.to_string()).collect(),
            reason: reason.to_string(),
            confidence,
        }
    }

    fn to_candidate(&self) -> Candidate {
        Candidate {
            pattern: self.pattern.clone(),
            cve: self.cve.clone(),
            reason: self.reason.clone(),
            confidence: self.confidence,
        }
    }
}

/// Ordered rule list. Order decides which candidate a reader sees first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    pub rules: Vec<Rule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            rules: vec![
                // Struts / Java web
                Rule::new(
                    "upload.action",
                    &["CVE-2024-53677"],
                    "Detected upload.action endpoint, the usual Struts file upload handler.",
                    Confidence::High,
                ),
                Rule::new(
                    "struts",
                    &["CVE-2024-53677"],
                    "Apache Struts framework indicated; check Struts CVEs including CVE-2024-53677.",
                    Confidence::High,
                ),
                Rule::new(
                    "apache-coyote",
                    &[],
                    "Apache-Coyote (Tomcat connector) identified; Java web application behind it.",
                    Confidence::Medium,
                ),
                Rule::new(
                    "apache",
                    &[],
                    "Apache HTTP server detected; review HTTP configuration issues.",
                    Confidence::Medium,
                ),
                // Microsoft / Windows
                Rule::new(
                    "msrpc",
                    &[],
                    "Microsoft RPC service present; enumerate MSRPC endpoints and SMB shares.",
                    Confidence::High,
                ),
                Rule::new(
                    "microsoft windows rpc",
                    &[],
                    "MSRPC banner; may allow information leaks or RPC specific CVEs.",
                    Confidence::High,
                ),
                Rule::new(
                    "rdp",
                    &[],
                    "RDP service detected; check encryption level and known RDP vulnerabilities.",
                    Confidence::Medium,
                ),
                Rule::new(
                    "smb",
                    &[],
                    "SMB related service; enumerate shares and SMB CVEs (signing, SMBv1).",
                    Confidence::High,
                ),
                Rule::new(
                    "tcpwrapped",
                    &[],
                    "Port reported as tcpwrapped; filtered or needs a specific probe, run targeted scripts.",
                    Confidence::Low,
                ),
            ],
        }
    }
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Load a rule table from a `.json` file or a TOML file with `[[rules]]`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReconError::RuleTable(format!(
                "rule file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ReconError::RuleTable(format!("{}: {}", path.display(), e)))?;

        let table: RuleTable = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ReconError::RuleTable(format!("{}: {}", path.display(), e)))?,
            _ => toml::from_str(&content)?,
        };

        info!("Loaded {} rules from {}", table.len(), path.display());
        Ok(table)
    }
}

/// Flatten the enrichment fields the mapper looks at into one string.
pub fn enrichment_text(enrichment: Option<&Enrichment>) -> String {
    let Some(enrichment) = enrichment else {
        return String::new();
    };

    let mut parts = Vec::new();

    let headers = enrichment
        .headers
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join(" ");
    if !headers.is_empty() {
        parts.push(headers);
    }

    if let Some(title) = enrichment.title.as_deref().filter(|t| !t.is_empty()) {
        parts.push(title.to_string());
    }

    let robots = enrichment
        .robots
        .as_deref()
        .filter(|r| !r.is_empty())
        .or_else(|| enrichment.notes.as_deref().filter(|n| !n.is_empty()));
    if let Some(robots) = robots {
        parts.push(robots.to_string());
    }

    parts.join(" ")
}

/// Lower-cased banner + enrichment projection.
pub fn search_text(banner: &str, enrichment: Option<&Enrichment>) -> String {
    let projection = enrichment_text(enrichment);
    [banner, projection.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Return one candidate per rule whose pattern occurs in the search text.
pub fn map_vulns(banner: &str, enrichment: Option<&Enrichment>, rules: &RuleTable) -> Vec<Candidate> {
    let text = search_text(banner, enrichment);
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for rule in &rules.rules {
        let pattern = rule.pattern.to_lowercase();
        if !text.contains(&pattern) || !seen.insert(pattern) {
            continue;
        }
        candidates.push(rule.to_candidate());
    }

    candidates
}

/// Replace `vuln_candidates` on every discovery. Returns the total count.
pub fn map_document(doc: &mut NormalizedDocument, rules: &RuleTable) -> usize {
    let mut total = 0;

    for discovery in &mut doc.discoveries {
        let banner = discovery.banner.as_deref().unwrap_or("");
        discovery.vuln_candidates = map_vulns(banner, discovery.enrichment.as_ref(), rules);
        debug!(
            "Port {}: {} candidates",
            discovery.port,
            discovery.vuln_candidates.len()
        );
        total += discovery.vuln_candidates.len();
    }

    total
}

/// Map an http-enriched file, writing `<stem>_mapped.json`.
pub async fn map_file(source: &Path, rules: &RuleTable) -> Result<(PathBuf, usize)> {
    let mut doc = files::read_document(source).await?;
    let total = map_document(&mut doc, rules);

    let output = files::derive_output_path(source, "mapped");
    files::write_document(&output, &doc).await?;
    info!("Mapped {} candidates into {}", total, output.display());

    Ok((output, total))
}
