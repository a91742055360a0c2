use reconflow::{
    mapper::{enrichment_text, map_document, map_file, map_vulns, search_text, Rule, RuleTable},
    types::{Confidence, Discovery, Enrichment, NormalizedDocument},
    utils::files,
    ReconError, Result,
};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn patterns(banner: &str, enrichment: Option<&Enrichment>, rules: &RuleTable) -> Vec<String> {
    map_vulns(banner, enrichment, rules)
        .into_iter()
        .map(|c| c.pattern)
        .collect()
}

#[test]
fn test_default_table_order() {
    let rules = RuleTable::default();
    let order: Vec<&str> = rules.rules.iter().map(|r| r.pattern.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "upload.action",
            "struts",
            "apache-coyote",
            "apache",
            "msrpc",
            "microsoft windows rpc",
            "rdp",
            "smb",
            "tcpwrapped"
        ]
    );
}

#[test]
fn test_case_insensitive_containment() {
    let rules = RuleTable::default();
    assert_eq!(
        patterns("Apache-Coyote/1.1", None, &rules),
        vec!["apache-coyote", "apache"]
    );
}

#[test]
fn test_windows_rpc_banner() {
    let rules = RuleTable::default();
    let candidates = map_vulns("Microsoft Windows RPC", None, &rules);

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].pattern, "microsoft windows rpc");
    assert_eq!(candidates[0].confidence, Confidence::High);
}

#[test]
fn test_struts_upload_endpoint_in_robots() {
    let rules = RuleTable::default();
    let enrichment = Enrichment {
        robots: Some("Disallow: /struts/upload.action".to_string()),
        ..Default::default()
    };

    let candidates = map_vulns("", Some(&enrichment), &rules);
    let found: Vec<&str> = candidates.iter().map(|c| c.pattern.as_str()).collect();
    assert_eq!(found, vec!["upload.action", "struts"]);
    assert!(candidates.iter().all(|c| c.cve == vec!["CVE-2024-53677".to_string()]));
}

#[test]
fn test_no_match_yields_nothing() {
    let rules = RuleTable::default();
    assert!(map_vulns("OpenSSH_8.9p1 Ubuntu", None, &rules).is_empty());
    assert!(map_vulns("", None, &rules).is_empty());
}

#[test]
fn test_enrichment_projection() {
    let mut headers = BTreeMap::new();
    headers.insert("server".to_string(), "Apache/2.4.57".to_string());
    headers.insert("x-empty".to_string(), String::new());

    let enrichment = Enrichment {
        headers,
        title: Some("Intranet".to_string()),
        robots: None,
        notes: Some("behind proxy".to_string()),
        ..Default::default()
    };

    assert_eq!(
        enrichment_text(Some(&enrichment)),
        "server:Apache/2.4.57 Intranet behind proxy"
    );
    assert_eq!(enrichment_text(None), "");
    assert_eq!(
        search_text("nginx", Some(&enrichment)),
        "nginx server:apache/2.4.57 intranet behind proxy"
    );
}

#[test]
fn test_robots_takes_precedence_over_notes() {
    let enrichment = Enrichment {
        robots: Some("Disallow: /admin".to_string()),
        notes: Some("smb signing disabled".to_string()),
        ..Default::default()
    };

    // notes are only consulted when robots is absent
    let rules = RuleTable::default();
    assert!(patterns("", Some(&enrichment), &rules).is_empty());
}

#[test]
fn test_duplicate_patterns_collapse() {
    let rules = RuleTable::new(vec![
        Rule::new("apache", &[], "first", Confidence::Medium),
        Rule::new("APACHE", &[], "second", Confidence::High),
    ]);

    let candidates = map_vulns("Apache httpd", None, &rules);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].reason, "first");
}

#[test]
fn test_map_document_is_idempotent() {
    let mut rdp = Discovery::new(3389, "tcp", "open");
    rdp.banner = Some("Microsoft Terminal Services rdp".to_string());
    let mut ssh = Discovery::new(22, "tcp", "open");
    ssh.banner = Some("OpenSSH".to_string());

    let mut doc = NormalizedDocument {
        target: "10.0.0.5".to_string(),
        run_id: None,
        discoveries: vec![rdp, ssh],
    };

    let rules = RuleTable::default();
    let first = map_document(&mut doc, &rules);
    let snapshot = doc.clone();
    let second = map_document(&mut doc, &rules);

    assert_eq!(first, 1);
    assert_eq!(first, second);
    assert_eq!(doc, snapshot);
    assert!(doc.discoveries[1].vuln_candidates.is_empty());
}

#[tokio::test]
async fn test_map_file_writes_mapped_document() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = temp_dir.path().join("normalized_x_enriched_http_enriched.json");

    let mut discovery = Discovery::new(445, "tcp", "open");
    discovery.service = Some("microsoft-ds".to_string());
    discovery.banner = Some("Samba smbd 4.6".to_string());
    let doc = NormalizedDocument {
        target: "x".to_string(),
        run_id: None,
        discoveries: vec![discovery],
    };
    files::write_document(&source, &doc).await?;

    let (output, total) = map_file(&source, &RuleTable::default()).await?;
    assert_eq!(
        output,
        temp_dir.path().join("normalized_x_enriched_http_enriched_mapped.json")
    );
    assert_eq!(total, 1);

    let mapped = files::read_document(&output).await?;
    assert_eq!(mapped.discoveries[0].vuln_candidates[0].pattern, "smb");
    Ok(())
}

#[test]
fn test_load_toml_rule_table() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("rules.toml");
    std::fs::write(
        &path,
        r#"
[[rules]]
pattern = "jenkins"
cve = ["CVE-2024-23897"]
reason = "Jenkins CLI arbitrary file read"
confidence = "high"

[[rules]]
pattern = "iis"
reason = "Microsoft IIS detected"
confidence = "low"
"#,
    )?;

    let rules = RuleTable::load_from_file(&path)?;
    assert_eq!(rules.len(), 2);
    assert_eq!(rules.rules[1].cve, Vec::<String>::new());
    assert_eq!(patterns("Jetty (Jenkins 2.440)", None, &rules), vec!["jenkins"]);
    Ok(())
}

#[test]
fn test_load_json_rule_table() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("rules.json");
    std::fs::write(
        &path,
        r#"{"rules": [{"pattern": "weblogic", "cve": [], "reason": "Oracle WebLogic", "confidence": "medium"}]}"#,
    )?;

    let rules = RuleTable::load_from_file(&path)?;
    assert_eq!(rules.rules[0].confidence, Confidence::Medium);
    Ok(())
}

#[test]
fn test_bad_rule_table_fails_with_exit_code_4() {
    let temp_dir = TempDir::new().unwrap();

    let missing = RuleTable::load_from_file(&temp_dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(missing, ReconError::RuleTable(_)));
    assert_eq!(missing.exit_code(), 4);

    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[[rules]]\npattern = 5\n").unwrap();
    let broken = RuleTable::load_from_file(&path).unwrap_err();
    assert_eq!(broken.exit_code(), 4);
}
