use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reconflow::enrichment::{extract_endpoints, extract_title};
use reconflow::mapper::{map_document, map_vulns, RuleTable};
use reconflow::reporting::create_html_report;
use reconflow::types::{Discovery, Enrichment, NormalizedDocument};
use std::collections::BTreeMap;

fn sample_enrichment() -> Enrichment {
    let mut headers = BTreeMap::new();
    headers.insert("server".to_string(), "Apache-Coyote/1.1".to_string());
    headers.insert("content-type".to_string(), "text/html;charset=UTF-8".to_string());
    headers.insert("x-powered-by".to_string(), "Servlet/3.0 JSP/2.2".to_string());

    Enrichment {
        headers,
        title: Some("Struts2 Showcase".to_string()),
        robots: Some("User-agent: *\nDisallow: /upload.action\nDisallow: /admin/".to_string()),
        ..Default::default()
    }
}

fn sample_page() -> String {
    let mut html = String::from("<html><head><title>Portal</title></head><body>");
    for i in 0..200 {
        html.push_str(&format!(
            "<form action=\"/submit/{}.action\"></form><a href=\"http://portal.local/page/{}?id={}\">p</a>",
            i % 40,
            i,
            i
        ));
    }
    html.push_str("</body></html>");
    html
}

fn mapper_benchmark(c: &mut Criterion) {
    let rules = RuleTable::default();
    let enrichment = sample_enrichment();

    c.bench_function("map_vulns_banner_only", |b| {
        b.iter(|| map_vulns(black_box("Microsoft Windows RPC"), None, &rules))
    });

    c.bench_function("map_vulns_with_enrichment", |b| {
        b.iter(|| map_vulns(black_box("Apache Tomcat/Coyote JSP engine 1.1"), Some(&enrichment), &rules))
    });

    let mut doc = NormalizedDocument {
        target: "10.0.0.5".to_string(),
        run_id: None,
        discoveries: (0..256)
            .map(|port| {
                let mut discovery = Discovery::new(8000 + port, "tcp", "open");
                discovery.banner = Some(format!("service-{} smb rdp", port));
                discovery.enrichment = Some(enrichment.clone());
                discovery
            })
            .collect(),
    };

    c.bench_function("map_document_256_ports", |b| {
        b.iter(|| map_document(black_box(&mut doc), &rules))
    });
}

fn extraction_benchmark(c: &mut Criterion) {
    let page = sample_page();

    c.bench_function("extract_endpoints", |b| {
        b.iter(|| extract_endpoints(black_box(&page), 50))
    });

    c.bench_function("extract_title", |b| {
        b.iter(|| extract_title(black_box(&page)))
    });
}

fn report_benchmark(c: &mut Criterion) {
    let doc = NormalizedDocument {
        target: "10.0.0.5".to_string(),
        run_id: None,
        discoveries: (0..64)
            .map(|port| {
                let mut discovery = Discovery::new(1000 + port, "tcp", "open");
                discovery.enrichment = Some(sample_enrichment());
                discovery
            })
            .collect(),
    };

    c.bench_function("create_html_report_64_ports", |b| {
        b.iter(|| create_html_report(black_box(&doc), "Scan Report", None))
    });
}

criterion_group!(
    benches,
    mapper_benchmark,
    extraction_benchmark,
    report_benchmark
);
criterion_main!(benches);
