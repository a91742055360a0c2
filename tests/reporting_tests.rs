use reconflow::{
    config::Config,
    reporting::{collect_evidence, create_html_report, EvidenceFile, ReportGenerator},
    types::{Candidate, Confidence, Discovery, Enrichment, NormalizedDocument},
    Result,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tempfile::TempDir;

fn empty_doc() -> NormalizedDocument {
    NormalizedDocument {
        target: "10.0.0.5".to_string(),
        run_id: None,
        discoveries: vec![],
    }
}

#[test]
fn test_empty_document_is_valid_html() {
    let html = create_html_report(&empty_doc(), "Scan Report", None);

    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.trim_end().ends_with("</html>"));
    assert!(html.contains("<h2>Summary</h2>"));
    assert!(html.contains("<ul class='summary'>\n</ul>"));
    assert!(html.contains("<h2>Details</h2>"));
    assert!(!html.contains("<script"));
    assert!(!html.contains("Evidence Files"));
}

#[test]
fn test_fields_are_escaped() {
    let mut headers = BTreeMap::new();
    headers.insert("server".to_string(), "<b>evil</b>".to_string());

    let mut discovery = Discovery::new(80, "tcp", "open");
    discovery.banner = Some("<script>alert(1)</script>".to_string());
    discovery.enrichment = Some(Enrichment {
        headers,
        title: Some("Tom & Jerry".to_string()),
        endpoints: vec!["/search?q=\"x\"".to_string()],
        ..Default::default()
    });

    let doc = NormalizedDocument {
        target: "<host>".to_string(),
        run_id: None,
        discoveries: vec![discovery],
    };
    let html = create_html_report(&doc, "Scan Report", None);

    assert!(!html.contains("<script>alert(1)</script>"));
    assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    assert!(html.contains("&lt;b&gt;evil&lt;/b&gt;"));
    assert!(html.contains("Tom &amp; Jerry"));
    assert!(html.contains("Scan Report - &lt;host&gt;"));
    assert!(html.contains("Header names are lower-cased and listed alphabetically."));
}

#[test]
fn test_missing_fields_render_none() {
    let doc = NormalizedDocument {
        target: "10.0.0.5".to_string(),
        run_id: None,
        discoveries: vec![Discovery::new(22, "tcp", "open")],
    };
    let html = create_html_report(&doc, "Scan Report", None);

    assert!(html.contains("<h3>Port 22/tcp (open)</h3>"));
    assert!(html.contains("<p><strong>Service:</strong> None</p>"));
    assert!(html.contains("<p><strong>Enrichment:</strong> None</p>"));
    assert!(html.contains("<li>Port 22/tcp: 0 candidate(s)</li>"));
}

#[test]
fn test_candidates_and_probes_rendered() {
    let mut discovery = Discovery::new(8080, "tcp", "open");
    discovery.record_probe("http", "timeout".to_string());
    discovery.vuln_candidates = vec![Candidate {
        pattern: "struts".to_string(),
        cve: vec!["CVE-2024-53677".to_string()],
        reason: "Apache Struts framework indicated".to_string(),
        confidence: Confidence::High,
    }];

    let doc = NormalizedDocument {
        target: "10.0.0.5".to_string(),
        run_id: Some(uuid::Uuid::new_v4()),
        discoveries: vec![discovery],
    };
    let html = create_html_report(&doc, "Scan Report", None);

    assert!(html.contains("<li>Port 8080/tcp: 1 candidate(s)</li>"));
    assert!(html.contains("<td>CVE-2024-53677</td>"));
    assert!(html.contains("<td class='high'>high</td>"));
    assert!(html.contains("<li>http: timeout</li>"));
    assert!(html.contains("Run ID:"));
}

#[test]
fn test_evidence_index() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let raw = temp_dir.path().join("raw");
    let nested = temp_dir.path().join("final").join("runs");
    std::fs::create_dir_all(&raw)?;
    std::fs::create_dir_all(&nested)?;
    std::fs::write(raw.join("masscan.json"), "[]")?;
    std::fs::write(nested.join("run.json"), "{}\n")?;

    let dirs = vec![raw.clone(), temp_dir.path().join("nmap"), temp_dir.path().join("final")];
    let evidence = collect_evidence(&dirs);

    assert_eq!(
        evidence,
        vec![
            EvidenceFile {
                path: nested.join("run.json"),
                size: 3
            },
            EvidenceFile {
                path: raw.join("masscan.json"),
                size: 2
            },
        ]
    );

    let html = create_html_report(&empty_doc(), "Scan Report", Some(evidence.as_slice()));
    assert!(html.contains("Evidence Files"));
    assert!(html.contains("masscan.json</td><td>2</td>"));
    Ok(())
}

#[tokio::test]
async fn test_generate_report_writes_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = Config::default().with_data_dir(temp_dir.path());

    let generator = ReportGenerator::new(config);
    let path = generator.generate_report(&empty_doc()).await?;

    assert_eq!(
        path,
        temp_dir.path().join("final").join("report_10.0.0.5.html")
    );
    let html = std::fs::read_to_string(&path)?;
    assert!(html.contains("Evidence Files"));
    Ok(())
}

#[test]
fn test_default_report_path_sanitizes_target() {
    let mut config = Config::default();
    config.paths.final_dir = PathBuf::from("out");
    let generator = ReportGenerator::new(config);
    assert_eq!(
        generator.default_report_path("10.0.0.0/24"),
        PathBuf::from("out/report_10.0.0.0_24.html")
    );
}
