//! Thin driver composing the stages for one target, plus the run manifest
//! that records which file every stage produced.

use crate::config::{Config, ToolCommand};
use crate::enrichment::{EnrichmentSummary, NetworkEnricher};
use crate::mapper::{self, RuleTable};
use crate::normalizer;
use crate::reporting::ReportGenerator;
use crate::service_xml;
use crate::utils::files::{self, sanitize_component};
use crate::utils::time::now_utc;
use crate::{ReconError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    ServiceDetection,
    Normalize,
    XmlMerge,
    Enrich,
    Map,
    Report,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::ServiceDetection => "service_detection",
            Stage::Normalize => "normalize",
            Stage::XmlMerge => "xml_merge",
            Stage::Enrich => "enrich",
            Stage::Map => "map",
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArtifact {
    pub stage: Stage,
    pub path: PathBuf,
    pub written_at: DateTime<Utc>,
}

/// Record of one pipeline run, stored as `<final>/runs/<run_id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub target: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub artifacts: Vec<StageArtifact>,
}

impl RunManifest {
    pub fn new(target: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target: target.to_string(),
            created_at: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// First eight hex digits of the run id, used in file names.
    pub fn short_id(&self) -> String {
        self.run_id.simple().to_string()[..8].to_string()
    }

    pub fn record(&mut self, stage: Stage, path: &Path) {
        self.artifacts.push(StageArtifact {
            stage,
            path: path.to_path_buf(),
            written_at: now_utc(),
        });
    }

    /// Most recent artifact written by `stage`.
    pub fn artifact(&self, stage: Stage) -> Option<&Path> {
        self.artifacts
            .iter()
            .rev()
            .find(|a| a.stage == stage)
            .map(|a| a.path.as_path())
    }

    pub fn runs_dir(final_dir: &Path) -> PathBuf {
        final_dir.join("runs")
    }

    pub fn manifest_path(&self, final_dir: &Path) -> PathBuf {
        Self::runs_dir(final_dir).join(format!("{}.json", self.run_id))
    }

    pub async fn save(&self, final_dir: &Path) -> Result<PathBuf> {
        let path = self.manifest_path(final_dir);
        files::write_json(&path, self).await?;
        Ok(path)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        files::read_json("run manifest", path).await
    }

    pub async fn load_run(final_dir: &Path, run_id: &str) -> Result<Self> {
        let path = Self::runs_dir(final_dir).join(format!("{}.json", run_id));
        if !path.is_file() {
            return Err(ReconError::NoSource(format!("no manifest for run {}", run_id)));
        }
        Self::load(&path).await
    }

    /// The manifest with the newest recorded `created_at`, if any.
    pub async fn latest(final_dir: &Path) -> Result<Option<Self>> {
        let dir = Self::runs_dir(final_dir);
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut latest: Option<Self> = None;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load(&path).await {
                Ok(manifest) => {
                    if latest.as_ref().map_or(true, |l| manifest.created_at > l.created_at) {
                        latest = Some(manifest);
                    }
                }
                Err(e) => warn!("Ignoring unreadable manifest {}: {}", path.display(), e),
            }
        }

        Ok(latest)
    }

    /// A named run, or the latest one when `run_id` is `None`.
    pub async fn resolve(final_dir: &Path, run_id: Option<&str>) -> Result<Self> {
        match run_id {
            Some(id) => Self::load_run(final_dir, id).await,
            None => Self::latest(final_dir).await?.ok_or_else(|| {
                ReconError::NoSource(format!(
                    "no run manifest found in {}",
                    Self::runs_dir(final_dir).display()
                ))
            }),
        }
    }

    /// The artifact a stage reads, or `NoSource` when the run never produced it.
    pub fn input_for(&self, stage: Stage) -> Result<PathBuf> {
        self.artifact(stage)
            .map(Path::to_path_buf)
            .ok_or_else(|| ReconError::NoSource(format!("run {} has no {} output", self.run_id, stage)))
    }
}

/// Runs an external scanner to completion.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, tool: &ToolCommand, args: &[String]) -> Result<()>;
}

/// Spawns the configured executable and fails on a non-zero exit status.
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, tool: &ToolCommand, args: &[String]) -> Result<()> {
        info!("Running {} {}", tool.program, args.join(" "));

        let status = Command::new(&tool.program)
            .args(args)
            .status()
            .await
            .map_err(|e| ReconError::ExternalTool {
                tool: tool.program.clone(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ReconError::ExternalTool {
                tool: tool.program.clone(),
                reason: format!("exited with {}", status),
            })
        }
    }
}

/// Result of a full run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub manifest: RunManifest,
    pub manifest_path: PathBuf,
    pub enrichment: EnrichmentSummary,
    pub candidates: usize,
}

pub struct Pipeline<R: ToolRunner = ProcessRunner> {
    config: Config,
    rules: RuleTable,
    runner: R,
}

impl Pipeline<ProcessRunner> {
    pub fn new(config: Config, rules: RuleTable) -> Self {
        Self::with_runner(config, rules, ProcessRunner)
    }
}

impl<R: ToolRunner> Pipeline<R> {
    pub fn with_runner(config: Config, rules: RuleTable, runner: R) -> Self {
        Self { config, rules, runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn prepare_dirs(&self) -> Result<()> {
        let paths = &self.config.paths;
        for dir in [&paths.raw_dir, &paths.nmap_dir, &paths.final_dir] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    async fn run_tool(&self, tool: &ToolCommand, vars: &[(&str, &str)], output: &Path) -> Result<()> {
        let args = tool.render_args(vars);
        self.runner.run(tool, &args).await?;

        if !output.exists() {
            return Err(ReconError::ExternalTool {
                tool: tool.program.clone(),
                reason: format!("expected output {} was not written", output.display()),
            });
        }
        Ok(())
    }

    /// Discovery -> service detection -> normalize -> merge -> enrich -> map -> report.
    pub async fn run(&self, target: &str) -> Result<PipelineOutcome> {
        self.prepare_dirs().await?;

        let mut manifest = RunManifest::new(target);
        let final_dir = self.config.paths.final_dir.clone();
        let name = format!("{}_{}", sanitize_component(target), manifest.short_id());
        info!("Starting run {} against {}", manifest.run_id, target);

        // Discovery
        let raw_path = self.config.paths.raw_dir.join(format!("masscan_{}.json", name));
        let raw_str = raw_path.to_string_lossy().into_owned();
        self.run_tool(
            &self.config.scanners.discovery,
            &[("target", target), ("output", raw_str.as_str())],
            &raw_path,
        )
        .await?;
        manifest.record(Stage::Discovery, &raw_path);
        manifest.save(&final_dir).await?;

        let raw = normalizer::load_raw(&raw_path).await?;
        let ports = normalizer::open_port_list(&raw);

        // Service detection, skipped when discovery found nothing to look at
        let xml_path = self.config.paths.nmap_dir.join(format!("nmap_{}.xml", name));
        let nmap_xml = if ports.is_empty() {
            warn!("No open ports discovered on {}; skipping service detection", target);
            None
        } else {
            let xml_str = xml_path.to_string_lossy().into_owned();
            self.run_tool(
                &self.config.scanners.service_detection,
                &[("target", target), ("output", xml_str.as_str()), ("ports", ports.as_str())],
                &xml_path,
            )
            .await?;
            manifest.record(Stage::ServiceDetection, &xml_path);
            Some(xml_path.as_path())
        };

        // Normalize
        let mut doc = normalizer::normalize(&raw, target, nmap_xml, &self.config.normalizer);
        doc.run_id = Some(manifest.run_id);
        let normalized_path = final_dir.join(format!("normalized_{}.json", name));
        files::write_document(&normalized_path, &doc).await?;
        manifest.record(Stage::Normalize, &normalized_path);

        // XML merge
        let mut current = normalized_path;
        if let Some(xml) = nmap_xml {
            let services = service_xml::load_service_xml(xml).await?;
            let changed = service_xml::merge_service_info(&mut doc, &services);
            debug!("Service merge {}", if changed { "updated" } else { "made no changes" });
            current = files::derive_output_path(&current, "enriched");
            files::write_document(&current, &doc).await?;
            manifest.record(Stage::XmlMerge, &current);
        }
        manifest.save(&final_dir).await?;

        // Enrich
        let enricher = NetworkEnricher::new(self.config.enrichment.clone())?;
        let summary = enricher.enrich_document(&mut doc, target).await;
        current = files::derive_output_path(&current, "http_enriched");
        files::write_document(&current, &doc).await?;
        manifest.record(Stage::Enrich, &current);

        // Map
        let candidates = mapper::map_document(&mut doc, &self.rules);
        current = files::derive_output_path(&current, "mapped");
        files::write_document(&current, &doc).await?;
        manifest.record(Stage::Map, &current);
        manifest.save(&final_dir).await?;

        // Report
        let report_path = final_dir.join(format!("report_{}.html", name));
        ReportGenerator::new(self.config.clone())
            .write_report(&doc, &report_path)
            .await?;
        manifest.record(Stage::Report, &report_path);

        let manifest_path = manifest.save(&final_dir).await?;
        info!("Run {} finished, manifest at {}", manifest.run_id, manifest_path.display());

        Ok(PipelineOutcome {
            manifest,
            manifest_path,
            enrichment: summary,
            candidates,
        })
    }
}
