use crate::config::NormalizerConfig;
use crate::types::{Discovery, NormalizedDocument};
use crate::utils::files;
use crate::Result;
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// One host entry of the discovery scanner's JSON output.
#[derive(Debug, Clone, Deserialize)]
pub struct RawScanEntry {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub ports: Vec<RawPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPort {
    #[serde(default)]
    pub port: Value,
    #[serde(default)]
    pub proto: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub services: Value,
}

/// Coerce a JSON port value (number or numeric string) to a port number.
pub fn coerce_port(value: &Value) -> Option<u16> {
    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    u16::try_from(number).ok()
}

/// Build a normalized document with one empty discovery per raw port entry.
///
/// Entries whose port cannot be read as an integer are skipped.
pub fn normalize(
    raw: &[RawScanEntry],
    target: &str,
    nmap_xml: Option<&Path>,
    config: &NormalizerConfig,
) -> NormalizedDocument {
    let nmap_xml = nmap_xml.map(|p| p.to_string_lossy().into_owned());
    let mut discoveries = Vec::new();

    for entry in raw {
        for raw_port in &entry.ports {
            let Some(port) = coerce_port(&raw_port.port) else {
                debug!("Skipping malformed port entry: {}", raw_port.port);
                continue;
            };

            let proto = raw_port
                .proto
                .as_deref()
                .filter(|p| !p.is_empty())
                .unwrap_or(config.default_proto.as_str());

            let state = if config.trust_scanner_state {
                raw_port.status.as_deref().filter(|s| !s.is_empty()).unwrap_or("open")
            } else {
                "open"
            };

            let mut discovery = Discovery::new(port, proto, state);
            discovery.nmap_xml = nmap_xml.clone();
            discoveries.push(discovery);
        }
    }

    NormalizedDocument {
        target: target.to_string(),
        run_id: None,
        discoveries,
    }
}

/// Distinct discovered ports as `22,80,443`, ready for the service scanner.
pub fn open_port_list(raw: &[RawScanEntry]) -> String {
    let ports: BTreeSet<u16> = raw
        .iter()
        .flat_map(|entry| entry.ports.iter())
        .filter_map(|p| coerce_port(&p.port))
        .collect();

    ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub async fn load_raw(path: &Path) -> Result<Vec<RawScanEntry>> {
    files::read_json("raw discovery JSON", path).await
}

/// Normalize a raw discovery file and write the result to `output`.
pub async fn normalize_file(
    raw_path: &Path,
    target: &str,
    nmap_xml: Option<&Path>,
    output: &Path,
    config: &NormalizerConfig,
) -> Result<(PathBuf, NormalizedDocument)> {
    let raw = load_raw(raw_path).await?;
    let doc = normalize(&raw, target, nmap_xml, config);

    files::write_document(output, &doc).await?;
    info!(
        "Normalized {} discoveries for {} into {}",
        doc.discoveries.len(),
        target,
        output.display()
    );

    Ok((output.to_path_buf(), doc))
}
