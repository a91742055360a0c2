use crate::types::NormalizedDocument;
use crate::utils::files;
use crate::Result;
use log::{debug, info};
use roxmltree::{Document, Node};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// What the service scanner reported for one port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    pub state: Option<String>,
    pub service: Option<String>,
    /// `product` and `version` joined by a space.
    pub banner: Option<String>,
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.tag_name().name() == name)
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| n.tag_name().name() == name)
}

fn compose_banner(product: Option<&str>, version: Option<&str>) -> Option<String> {
    let product = product.unwrap_or("");
    let banner = match version.filter(|v| !v.is_empty()) {
        Some(version) => format!("{} {}", product, version),
        None => product.to_string(),
    };
    let banner = banner.trim();
    (!banner.is_empty()).then(|| banner.to_string())
}

/// Parse scanner XML into a port -> service map by walking
/// `host -> ports -> port`. Ports with a non-numeric id are skipped.
pub fn parse_service_xml(xml: &str) -> Result<BTreeMap<u16, ServiceInfo>> {
    // nmap emits a DOCTYPE that the parser refuses by default
    let cleaned = xml
        .lines()
        .filter(|line| !line.contains("<!DOCTYPE"))
        .collect::<Vec<_>>()
        .join("\n");

    let doc = Document::parse(&cleaned)?;
    let mut services = BTreeMap::new();

    for host in children(doc.root_element(), "host") {
        for ports in children(host, "ports") {
            for port in children(ports, "port") {
                let Some(port_id) = port
                    .attribute("portid")
                    .and_then(|id| id.trim().parse::<u16>().ok())
                else {
                    continue;
                };

                let state = child(port, "state")
                    .and_then(|s| s.attribute("state"))
                    .map(str::to_string);

                let (service, banner) = match child(port, "service") {
                    Some(svc) => (
                        svc.attribute("name").map(str::to_string),
                        compose_banner(svc.attribute("product"), svc.attribute("version")),
                    ),
                    None => (None, None),
                };

                services.insert(port_id, ServiceInfo { state, service, banner });
            }
        }
    }

    debug!("Parsed {} ports from service XML", services.len());
    Ok(services)
}

pub async fn load_service_xml(path: &Path) -> Result<BTreeMap<u16, ServiceInfo>> {
    files::require_file("service detection XML", path)?;
    let xml = fs::read_to_string(path).await?;
    parse_service_xml(&xml)
}

/// Fill empty `service` / `banner` fields from the scanner map.
///
/// Populated fields are left alone and ports that only exist in the XML are
/// ignored. Returns whether any record changed.
pub fn merge_service_info(
    doc: &mut NormalizedDocument,
    services: &BTreeMap<u16, ServiceInfo>,
) -> bool {
    let mut changed = false;

    for discovery in &mut doc.discoveries {
        if let Some(info) = services.get(&discovery.port) {
            changed |= discovery.fill_service(info.service.as_deref());
            changed |= discovery.fill_banner(info.banner.as_deref());
        }
    }

    changed
}

/// Merge a service XML file into a normalized file, writing `<stem>_enriched.json`.
pub async fn merge_file(normalized: &Path, xml: &Path) -> Result<(PathBuf, bool)> {
    let mut doc = files::read_document(normalized).await?;
    let services = load_service_xml(xml).await?;

    let changed = merge_service_info(&mut doc, &services);

    let output = files::derive_output_path(normalized, "enriched");
    files::write_document(&output, &doc).await?;
    info!(
        "Merged service XML {} into {} ({})",
        xml.display(),
        output.display(),
        if changed { "updated" } else { "no changes" }
    );

    Ok((output, changed))
}
