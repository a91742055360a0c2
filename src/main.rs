use clap::Parser;
use env_logger::Env;
use reconflow::{
    cli::{Cli, Commands},
    config::Config,
    display::DisplayManager,
    enrichment, mapper,
    mapper::RuleTable,
    normalizer,
    pipeline::{Pipeline, RunManifest, Stage},
    reporting::ReportGenerator,
    service_xml,
    utils::files,
    ReconError, Result,
};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    let display = DisplayManager::with_quiet(cli.quiet);

    let mut config = if let Some(config_path) = &cli.config {
        match Config::load_from_file(&config_path.to_string_lossy()) {
            Ok(config) => {
                display.print_info(&format!("loaded configuration from {}", config_path.display()));
                config
            }
            Err(e) => {
                display.print_warning(&format!("failed to load configuration: {}, using defaults", e));
                Config::default()
            }
        }
    } else {
        Config::default()
    };

    if let Some(data_dir) = &cli.data_dir {
        config = config.with_data_dir(data_dir);
    }

    let rules = match &config.mapper.rules_file {
        Some(path) => match RuleTable::load_from_file(path) {
            Ok(rules) => rules,
            Err(e) => {
                display.print_error(&e.to_string());
                process::exit(e.exit_code());
            }
        },
        None => RuleTable::default(),
    };

    let start_time = Instant::now();

    let result = match cli.command {
        Commands::Normalize { raw, target, nmap_xml, output } => {
            execute_normalize(&config, &display, &raw, &target, nmap_xml.as_deref(), output).await
        }
        Commands::MergeXml { normalized, xml } => execute_merge(&display, &normalized, &xml).await,
        Commands::Enrich { normalized, target } => {
            execute_enrich(&config, &display, &normalized, &target).await
        }
        Commands::Map { source, run } => {
            execute_map(&config, &display, &rules, source, run.as_deref()).await
        }
        Commands::Report { source, run } => {
            execute_report(&config, &display, source, run.as_deref()).await
        }
        Commands::Run { target } => execute_run(&config, &display, rules, &target).await,
        Commands::Rules => {
            display.print_section_header(&format!("Rule table ({} rules)", rules.len()));
            display.print_rule_table(&rules);
            Ok(())
        }
        Commands::InitConfig { path } => execute_init_config(&config, &display, &path),
    };

    match result {
        Ok(()) => {
            log::info!(
                "Finished in {}",
                reconflow::utils::time::format_duration(start_time.elapsed())
            );
        }
        Err(e) => {
            display.print_error(&e.to_string());
            process::exit(e.exit_code());
        }
    }
}

fn execute_init_config(config: &Config, display: &DisplayManager, path: &Path) -> Result<()> {
    if path.exists() {
        return Err(ReconError::Usage(format!(
            "{} already exists, refusing to overwrite",
            path.display()
        )));
    }
    config.save_to_file(&path.to_string_lossy())?;
    display.print_info(&format!("wrote {}", path.display()));
    Ok(())
}

async fn execute_normalize(
    config: &Config,
    display: &DisplayManager,
    raw: &Path,
    target: &str,
    nmap_xml: Option<&Path>,
    output: Option<PathBuf>,
) -> Result<()> {
    let output = output.unwrap_or_else(|| {
        config
            .paths
            .final_dir
            .join(format!("normalized_{}.json", files::sanitize_component(target)))
    });

    let (path, doc) =
        normalizer::normalize_file(raw, target, nmap_xml, &output, &config.normalizer).await?;
    display.print_info(&format!(
        "wrote {} ({} discoveries)",
        path.display(),
        doc.discoveries.len()
    ));
    Ok(())
}

async fn execute_merge(display: &DisplayManager, normalized: &Path, xml: &Path) -> Result<()> {
    let (path, changed) = service_xml::merge_file(normalized, xml).await?;
    if !changed {
        display.print_warning("service XML added nothing new");
    }
    display.print_info(&format!("wrote {}", path.display()));
    Ok(())
}

async fn execute_enrich(
    config: &Config,
    display: &DisplayManager,
    normalized: &Path,
    target: &str,
) -> Result<()> {
    let (path, summary) = enrichment::enrich_file(normalized, target, &config.enrichment).await?;
    display.print_enrichment_summary(&summary);
    display.print_info(&format!("wrote {}", path.display()));
    Ok(())
}

/// The explicit source, or the artifact `stage` wrote in the resolved run.
async fn resolve_source(
    config: &Config,
    display: &DisplayManager,
    source: Option<PathBuf>,
    run: Option<&str>,
    stage: Stage,
) -> Result<(PathBuf, Option<RunManifest>)> {
    if let Some(source) = source {
        return Ok((source, None));
    }

    let manifest = RunManifest::resolve(&config.paths.final_dir, run).await?;
    let input = manifest.input_for(stage)?;
    display.print_info(&format!("using {} from run {}", input.display(), manifest.run_id));
    Ok((input, Some(manifest)))
}

async fn execute_map(
    config: &Config,
    display: &DisplayManager,
    rules: &RuleTable,
    source: Option<PathBuf>,
    run: Option<&str>,
) -> Result<()> {
    let (input, manifest) = resolve_source(config, display, source, run, Stage::Enrich).await?;

    let (path, total) = mapper::map_file(&input, rules).await?;
    if let Some(mut manifest) = manifest {
        manifest.record(Stage::Map, &path);
        manifest.save(&config.paths.final_dir).await?;
    }

    display.print_info(&format!("wrote {} ({} candidates)", path.display(), total));
    Ok(())
}

async fn execute_report(
    config: &Config,
    display: &DisplayManager,
    source: Option<PathBuf>,
    run: Option<&str>,
) -> Result<()> {
    let (input, manifest) = resolve_source(config, display, source, run, Stage::Map).await?;

    let doc = files::read_document(&input).await?;
    let path = ReportGenerator::new(config.clone()).generate_report(&doc).await?;
    if let Some(mut manifest) = manifest {
        manifest.record(Stage::Report, &path);
        manifest.save(&config.paths.final_dir).await?;
    }

    display.print_info(&format!("wrote {}", path.display()));
    Ok(())
}

async fn execute_run(
    config: &Config,
    display: &DisplayManager,
    rules: RuleTable,
    target: &str,
) -> Result<()> {
    display.print_banner("RECONFLOW", Some("Authorized Testing Only"));
    display.print_section_header(&format!("Pipeline: {}", target));

    let outcome = Pipeline::new(config.clone(), rules).run(target).await?;

    display.print_enrichment_summary(&outcome.enrichment);
    if let Some(mapped) = outcome.manifest.artifact(Stage::Map) {
        let doc = files::read_document(mapped).await?;
        display.print_candidates(&doc);
    }
    if let Some(report) = outcome.manifest.artifact(Stage::Report) {
        display.print_success(&format!("wrote {}", report.display()));
    }
    display.print_info(&format!(
        "run {} complete, {} candidates, manifest {}",
        outcome.manifest.run_id,
        outcome.candidates,
        outcome.manifest_path.display()
    ));
    Ok(())
}
