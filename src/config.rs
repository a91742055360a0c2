use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub scanners: ScannersConfig,
    pub normalizer: NormalizerConfig,
    pub enrichment: EnrichmentConfig,
    pub mapper: MapperConfig,
    pub reporting: ReportingConfig,
}

/// Directory layout shared by all stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub nmap_dir: PathBuf,
    pub final_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannersConfig {
    pub discovery: ToolCommand,
    pub service_detection: ToolCommand,
}

/// An external executable and its argument template.
///
/// `{target}`, `{output}` and `{ports}` placeholders are substituted per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Use the scanner's own port status instead of always writing "open".
    pub trust_scanner_state: bool,
    pub default_proto: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub connect_timeout: u64, // milliseconds
    pub http_timeout: u64, // milliseconds
    pub robots_timeout: u64, // milliseconds
    pub banner_probe_ports: Vec<u16>,
    pub web_ports: Vec<u16>,
    pub banner_read_bytes: usize,
    pub banner_max_chars: usize,
    pub body_snippet_chars: usize,
    pub robots_max_chars: usize,
    pub max_endpoints: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MapperConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub title: String,
    pub include_evidence: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::under(Path::new("./data"))
    }
}

impl PathsConfig {
    /// Conventional `raw` / `nmap` / `final` layout below `data_dir`.
    pub fn under(data_dir: &Path) -> Self {
        Self {
            raw_dir: data_dir.join("raw"),
            nmap_dir: data_dir.join("nmap"),
            final_dir: data_dir.join("final"),
        }
    }

    pub fn evidence_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.raw_dir.clone(),
            self.nmap_dir.clone(),
            self.final_dir.clone(),
        ]
    }
}

impl Default for ScannersConfig {
    fn default() -> Self {
        Self {
            discovery: ToolCommand {
                program: "masscan".to_string(),
                args: vec![
                    "{target}".to_string(),
                    "-p1-65535".to_string(),
                    "--rate".to_string(),
                    "1000".to_string(),
                    "-oJ".to_string(),
                    "{output}".to_string(),
                ],
            },
            service_detection: ToolCommand {
                program: "nmap".to_string(),
                args: vec![
                    "-sV".to_string(),
                    "-Pn".to_string(),
                    "-p".to_string(),
                    "{ports}".to_string(),
                    "-oX".to_string(),
                    "{output}".to_string(),
                    "{target}".to_string(),
                ],
            },
        }
    }
}

impl ToolCommand {
    /// Substitute `{name}` placeholders in every argument.
    pub fn render_args(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{}}}", name), value)
                })
            })
            .collect()
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            trust_scanner_state: false,
            default_proto: "tcp".to_string(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 2000,
            http_timeout: 4000,
            robots_timeout: 3000,
            banner_probe_ports: vec![80, 8080, 8000, 443],
            web_ports: vec![80, 8080, 8000],
            banner_read_bytes: 4096,
            banner_max_chars: 1000,
            body_snippet_chars: 2000,
            robots_max_chars: 2000,
            max_endpoints: 50,
            user_agent: "Reconflow/0.1".to_string(),
        }
    }
}

impl EnrichmentConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout)
    }

    pub fn robots_timeout(&self) -> Duration {
        Duration::from_millis(self.robots_timeout)
    }

    pub fn is_web_port(&self, port: u16) -> bool {
        self.web_ports.contains(&port)
    }

    pub fn wants_http_probe(&self, port: u16) -> bool {
        self.banner_probe_ports.contains(&port)
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            title: "Scan Report".to_string(),
            include_evidence: true,
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn save_to_file(&self, path: &str) -> crate::Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| config::ConfigError::Message(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Rebase the raw / nmap / final directories below `data_dir`.
    pub fn with_data_dir(mut self, data_dir: &Path) -> Self {
        self.paths = PathsConfig::under(data_dir);
        self
    }
}
