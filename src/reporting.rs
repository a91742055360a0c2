use crate::config::Config;
use crate::types::{Discovery, Enrichment, NormalizedDocument};
use crate::utils::files::sanitize_component;
use crate::utils::time::now_utc;
use crate::{ReconError, Result};
use html_escape::encode_text;
use log::{debug, info};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// A file found under one of the evidence directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Every regular file below `dirs`, sorted by path. Missing dirs are skipped.
pub fn collect_evidence(dirs: &[PathBuf]) -> Vec<EvidenceFile> {
    let mut evidence = Vec::new();

    for dir in dirs {
        if !dir.is_dir() {
            debug!("Evidence directory {} does not exist", dir.display());
            continue;
        }
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            evidence.push(EvidenceFile {
                path: entry.into_path(),
                size,
            });
        }
    }

    evidence.sort_by(|a, b| a.path.cmp(&b.path));
    evidence
}

fn escape(value: &str) -> String {
    encode_text(value).into_owned()
}

/// Escaped value or the literal `None`.
fn or_none(value: Option<&str>) -> String {
    match value {
        Some(v) => escape(v),
        None => "None".to_string(),
    }
}

fn push_pre_field(html: &mut String, label: &str, value: Option<&str>) {
    html.push_str(&format!("<p><strong>{}:</strong></p>\n", label));
    match value {
        Some(v) => html.push_str(&format!("<pre>{}</pre>\n", escape(v))),
        None => html.push_str("<p>None</p>\n"),
    }
}

fn push_enrichment(html: &mut String, enrichment: Option<&Enrichment>) {
    let Some(enrichment) = enrichment else {
        html.push_str("<p><strong>Enrichment:</strong> None</p>\n");
        return;
    };

    html.push_str("<h4>Enrichment</h4>\n");

    html.push_str("<p><strong>Headers:</strong></p>\n");
    if enrichment.headers.is_empty() {
        html.push_str("<p>None</p>\n");
    } else {
        html.push_str("<p class='note'>Header names are lower-cased and listed alphabetically.</p>\n");
        html.push_str("<table class='headers'>\n<tr><th>Header</th><th>Value</th></tr>\n");
        for (name, value) in &enrichment.headers {
            html.push_str(&format!("<tr><td>{}</td><td>{}</td></tr>\n", escape(name), escape(value)));
        }
        html.push_str("</table>\n");
    }

    html.push_str(&format!(
        "<p><strong>Title:</strong> {}</p>\n",
        or_none(enrichment.title.as_deref())
    ));
    push_pre_field(html, "Body snippet", enrichment.body_snippet.as_deref());

    html.push_str("<p><strong>Endpoints:</strong></p>\n");
    if enrichment.endpoints.is_empty() {
        html.push_str("<p>None</p>\n");
    } else {
        html.push_str("<ul class='endpoints'>\n");
        for endpoint in &enrichment.endpoints {
            html.push_str(&format!("<li>{}</li>\n", escape(endpoint)));
        }
        html.push_str("</ul>\n");
    }

    push_pre_field(html, "robots.txt", enrichment.robots.as_deref());
    if let Some(notes) = enrichment.notes.as_deref() {
        push_pre_field(html, "Notes", Some(notes));
    }
}

fn push_discovery(html: &mut String, discovery: &Discovery) {
    html.push_str("<div class='discovery'>\n");
    html.push_str(&format!(
        "<h3>Port {}/{} ({})</h3>\n",
        discovery.port,
        escape(&discovery.proto),
        escape(&discovery.state)
    ));
    html.push_str(&format!(
        "<p><strong>Service:</strong> {}</p>\n",
        or_none(discovery.service.as_deref())
    ));
    push_pre_field(html, "Banner", discovery.banner.as_deref());
    push_enrichment(html, discovery.enrichment.as_ref());

    if !discovery.probes.is_empty() {
        html.push_str("<p><strong>Probes:</strong></p>\n<ul class='probes'>\n");
        for (probe, outcome) in &discovery.probes {
            html.push_str(&format!("<li>{}: {}</li>\n", escape(probe), escape(outcome)));
        }
        html.push_str("</ul>\n");
    }

    html.push_str("<h4>Vulnerability Candidates</h4>\n");
    if discovery.vuln_candidates.is_empty() {
        html.push_str("<p>None</p>\n");
    } else {
        html.push_str("<table class='candidates'>\n");
        html.push_str("<tr><th>Pattern</th><th>CVE</th><th>Reason</th><th>Confidence</th></tr>\n");
        for candidate in &discovery.vuln_candidates {
            let cve = if candidate.cve.is_empty() {
                "None".to_string()
            } else {
                escape(&candidate.cve.join(", "))
            };
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td class='{}'>{}</td></tr>\n",
                escape(&candidate.pattern),
                cve,
                escape(&candidate.reason),
                candidate.confidence.as_str(),
                candidate.confidence
            ));
        }
        html.push_str("</table>\n");
    }

    html.push_str("</div>\n");
}

/// Render a mapped document and its evidence index as a static HTML page.
pub fn create_html_report(doc: &NormalizedDocument, title: &str, evidence: Option<&[EvidenceFile]>) -> String {
    let heading = format!("{} - {}", title, doc.target);
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset='utf-8'>\n");
    html.push_str(&format!("<title>{}</title>\n", escape(&heading)));
    html.push_str("<style>\n");
    html.push_str(include_str!("../assets/report.css"));
    html.push_str("</style>\n</head>\n<body>\n");

    // Header
    html.push_str("<div class='header'>\n");
    html.push_str(&format!("<h1>{}</h1>\n", escape(&heading)));
    if let Some(run_id) = doc.run_id {
        html.push_str(&format!("<p>Run ID: {}</p>\n", run_id));
    }
    html.push_str(&format!(
        "<p>Generated: {}</p>\n",
        now_utc().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</div>\n");

    // Summary
    html.push_str("<div class='section'>\n<h2>Summary</h2>\n<ul class='summary'>\n");
    for discovery in &doc.discoveries {
        html.push_str(&format!(
            "<li>Port {}/{}: {} candidate(s)</li>\n",
            discovery.port,
            escape(&discovery.proto),
            discovery.vuln_candidates.len()
        ));
    }
    html.push_str("</ul>\n</div>\n");

    // Details
    html.push_str("<div class='section'>\n<h2>Details</h2>\n");
    for discovery in &doc.discoveries {
        push_discovery(&mut html, discovery);
    }
    html.push_str("</div>\n");

    // Evidence index
    if let Some(evidence) = evidence {
        html.push_str("<div class='section'>\n<h2>Evidence Files</h2>\n");
        html.push_str("<table class='evidence'>\n<tr><th>File</th><th>Size (bytes)</th></tr>\n");
        for file in evidence {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                escape(&file.path.to_string_lossy()),
                file.size
            ));
        }
        html.push_str("</table>\n</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

pub struct ReportGenerator {
    config: Config,
}

impl ReportGenerator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// `<final>/report_<target>.html`
    pub fn default_report_path(&self, target: &str) -> PathBuf {
        self.config
            .paths
            .final_dir
            .join(format!("report_{}.html", sanitize_component(target)))
    }

    pub async fn generate_report(&self, doc: &NormalizedDocument) -> Result<PathBuf> {
        let path = self.default_report_path(&doc.target);
        self.write_report(doc, &path).await?;
        Ok(path)
    }

    pub async fn write_report(&self, doc: &NormalizedDocument, path: &Path) -> Result<()> {
        debug!("Generating HTML report: {}", path.display());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await
                .map_err(|e| ReconError::Reporting(format!("Failed to create output directory: {}", e)))?;
        }

        let evidence = self
            .config
            .reporting
            .include_evidence
            .then(|| collect_evidence(&self.config.paths.evidence_dirs()));

        let html_content = create_html_report(doc, &self.config.reporting.title, evidence.as_deref());

        fs::write(path, html_content).await
            .map_err(|e| ReconError::Reporting(format!("Failed to write HTML report: {}", e)))?;

        info!("Wrote report for {} to {}", doc.target, path.display());
        Ok(())
    }
}
