//! Reconflow - Reconnaissance Pipeline
//!
//! Turns the output of external port and service scanners into a single
//! per-target document, enriches every discovered port with banner and HTTP
//! evidence, tags vulnerability candidates by substring rules and renders a
//! static HTML report.
//!
//! # Warning
//! This tool is designed for ethical penetration testing and security assessment
//! purposes only. Users are responsible for ensuring they have proper authorization
//! before scanning any networks or systems.

pub mod cli;
pub mod config;
pub mod normalizer;
pub mod service_xml;
pub mod enrichment;
pub mod mapper;
pub mod reporting;
pub mod pipeline;
pub mod display;
pub mod utils;
pub mod error;

pub use error::{ReconError, Result};

/// Common types and traits used throughout the application
pub mod types {
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::fmt;
    use uuid::Uuid;

    use crate::utils::text::{fill_if_blank, is_blank};

    /// Canonical per-target document every stage reads and writes.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct NormalizedDocument {
        pub target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub run_id: Option<Uuid>,
        #[serde(default)]
        pub discoveries: Vec<Discovery>,
    }

    /// One scanned port and the evidence accumulated for it.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Discovery {
        pub port: u16,
        #[serde(default = "default_proto")]
        pub proto: String,
        #[serde(default = "default_state")]
        pub state: String,
        #[serde(default)]
        pub service: Option<String>,
        #[serde(default)]
        pub banner: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub nmap_xml: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub enrichment: Option<Enrichment>,
        /// Outcome of every probe the enricher ran, keyed by probe name.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        pub probes: BTreeMap<String, String>,
        #[serde(default)]
        pub vuln_candidates: Vec<Candidate>,
    }

    fn default_proto() -> String {
        "tcp".to_string()
    }

    fn default_state() -> String {
        "open".to_string()
    }

    impl Discovery {
        pub fn new(port: u16, proto: &str, state: &str) -> Self {
            Self {
                port,
                proto: proto.to_string(),
                state: state.to_string(),
                service: None,
                banner: None,
                nmap_xml: None,
                enrichment: None,
                probes: BTreeMap::new(),
                vuln_candidates: Vec::new(),
            }
        }

        /// Fill `service` only when it is still empty.
        pub fn fill_service(&mut self, service: Option<&str>) -> bool {
            fill_if_blank(&mut self.service, service)
        }

        /// Fill `banner` only when it is still empty.
        pub fn fill_banner(&mut self, banner: Option<&str>) -> bool {
            fill_if_blank(&mut self.banner, banner)
        }

        /// Merge enrichment fields without touching the ones already set.
        pub fn merge_enrichment(&mut self, found: Enrichment) -> bool {
            if found.is_empty() {
                return false;
            }
            self.enrichment
                .get_or_insert_with(Enrichment::default)
                .merge_absent(found)
        }

        pub fn record_probe(&mut self, probe: &str, outcome: String) -> bool {
            if self.probes.contains_key(probe) {
                return false;
            }
            self.probes.insert(probe.to_string(), outcome);
            true
        }
    }

    /// Supplementary HTTP evidence gathered for a port.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Enrichment {
        #[serde(default, alias = "http_headers", skip_serializing_if = "BTreeMap::is_empty")]
        pub headers: BTreeMap<String, String>,
        #[serde(default, alias = "html_title", skip_serializing_if = "Option::is_none")]
        pub title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub body_snippet: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub endpoints: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub robots: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub notes: Option<String>,
    }

    impl Enrichment {
        pub fn is_empty(&self) -> bool {
            self.headers.is_empty()
                && is_blank(&self.title)
                && is_blank(&self.body_snippet)
                && self.endpoints.is_empty()
                && is_blank(&self.robots)
                && is_blank(&self.notes)
        }

        /// Merge-if-absent: copy each non-empty field of `other` into a field of
        /// `self` that is still empty. Returns whether anything changed.
        pub fn merge_absent(&mut self, other: Enrichment) -> bool {
            let mut changed = false;

            if self.headers.is_empty() && !other.headers.is_empty() {
                self.headers = other.headers;
                changed = true;
            }
            changed |= fill_if_blank(&mut self.title, other.title.as_deref());
            changed |= fill_if_blank(&mut self.body_snippet, other.body_snippet.as_deref());
            if self.endpoints.is_empty() && !other.endpoints.is_empty() {
                self.endpoints = other.endpoints;
                changed = true;
            }
            changed |= fill_if_blank(&mut self.robots, other.robots.as_deref());
            changed |= fill_if_blank(&mut self.notes, other.notes.as_deref());

            changed
        }
    }

    /// A tentative vulnerability association produced by a pattern match.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Candidate {
        pub pattern: String,
        #[serde(default)]
        pub cve: Vec<String>,
        pub reason: String,
        pub confidence: Confidence,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Confidence {
        Low,
        Medium,
        High,
    }

    impl Confidence {
        pub fn as_str(&self) -> &'static str {
            match self {
                Confidence::Low => "low",
                Confidence::Medium => "medium",
                Confidence::High => "high",
            }
        }
    }

    impl fmt::Display for Confidence {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }
}
