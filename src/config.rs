use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::{Cli, CliCommand};
use crate::error::{Error, Result};
use crate::filter::DEFAULT_BOILERPLATE;

pub const DEFAULT_CONFIG_PATH: &str = "pr-digest.toml";
pub const TOKEN_ENV: &str = "ADO_PAT";
pub const PORT_ENV: &str = "PORT";
pub const HOSTED_ENV: &str = "PR_DIGEST_HOSTED";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClassifierFile {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub base_url: Option<String>,
    pub project: Option<String>,
    pub repository: Option<String>,
    pub ado_pat: Option<String>,
    pub days_back: Option<u32>,
    pub max_prs: Option<u32>,
    pub chunk_size: Option<usize>,
    pub batch_delay_secs: Option<u64>,
    pub max_concurrent_classifications: Option<usize>,
    pub min_comment_length: Option<usize>,
    pub boilerplate: Option<Vec<String>>,
    pub output_path: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    pub thread_log_dir: Option<PathBuf>,
    pub prompt_dir: Option<PathBuf>,
    pub refresh_window_secs: Option<u64>,
    pub refresh_timeout_secs: Option<u64>,
    pub classifier: Option<ClassifierFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub base_url: String,
    pub project: String,
    pub repository: String,
    pub ado_pat: Option<String>,
    pub days_back: u32,
    pub max_prs: u32,
    pub chunk_size: usize,
    pub batch_delay_secs: u64,
    pub max_concurrent_classifications: usize,
    pub min_comment_length: usize,
    pub boilerplate: Vec<String>,
    pub output_path: PathBuf,
    pub index_path: PathBuf,
    pub thread_log_dir: Option<PathBuf>,
    pub prompt_dir: Option<PathBuf>,
    pub refresh_window_secs: u64,
    pub refresh_timeout_secs: u64,
    pub classifier: ClassifierConfig,
    pub port: u16,
    pub hosted: bool,
}

impl Config {
    /// Load the config file (if any), apply CLI overrides and the environment.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match cli.config {
            Some(ref path) => {
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.clone()));
                }
                read_config(path)?
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    read_config(path)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        let mut config = merge(file_config, cli);
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `PORT` and `PR_DIGEST_HOSTED` unless the CLI already set them.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.port == 0 {
            self.port = lookup(PORT_ENV)
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(DEFAULT_PORT);
        }
        if !self.hosted {
            self.hosted = lookup(HOSTED_ENV).is_some_and(|v| is_truthy(&v));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(Error::ConfigValidation("base_url is required".to_string()));
        }
        if self.project.is_empty() {
            return Err(Error::ConfigValidation("project is required".to_string()));
        }
        if self.repository.is_empty() {
            return Err(Error::ConfigValidation("repository is required".to_string()));
        }
        if self.classifier.endpoint.is_empty() {
            return Err(Error::ConfigValidation(
                "classifier.endpoint is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if config.chunk_size == Some(0) {
        return Err(Error::ConfigValidation("chunk_size must be > 0".to_string()));
    }
    if config.max_concurrent_classifications == Some(0) {
        return Err(Error::ConfigValidation(
            "max_concurrent_classifications must be > 0".to_string(),
        ));
    }
    if config.days_back == Some(0) {
        return Err(Error::ConfigValidation("days_back must be > 0".to_string()));
    }
    if config.max_prs == Some(0) {
        return Err(Error::ConfigValidation("max_prs must be > 0".to_string()));
    }
    if let Some(ref base_url) = config.base_url
        && !(base_url.starts_with("https://") || base_url.starts_with("http://"))
    {
        return Err(Error::ConfigValidation(format!(
            "base_url must be an http(s) URL: {base_url}"
        )));
    }
    if let Some(ref classifier) = config.classifier
        && let Some(t) = classifier.temperature
        && !(0.0..=2.0).contains(&t)
    {
        return Err(Error::ConfigValidation(format!(
            "classifier.temperature must be within 0.0..=2.0, got {t}"
        )));
    }
    Ok(())
}

pub fn merge(file: ConfigFile, cli: &Cli) -> Config {
    let classifier = file.classifier.unwrap_or_default();
    let (port, hosted) = match cli.command {
        CliCommand::Serve { port, hosted } => (port.unwrap_or(0), hosted),
        CliCommand::Run => (0, false),
    };

    Config {
        base_url: file
            .base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_default(),
        project: file.project.unwrap_or_default(),
        repository: file.repository.unwrap_or_default(),
        ado_pat: file.ado_pat.filter(|t| !t.is_empty()),
        days_back: cli.days_back.or(file.days_back).unwrap_or(7),
        max_prs: cli.max_prs.or(file.max_prs).unwrap_or(15),
        chunk_size: file.chunk_size.unwrap_or(10),
        batch_delay_secs: file.batch_delay_secs.unwrap_or(5),
        max_concurrent_classifications: file.max_concurrent_classifications.unwrap_or(8),
        min_comment_length: file.min_comment_length.unwrap_or(20),
        boilerplate: file.boilerplate.unwrap_or_else(|| {
            DEFAULT_BOILERPLATE.iter().map(|s| s.to_string()).collect()
        }),
        output_path: cli
            .output
            .clone()
            .or(file.output_path)
            .unwrap_or_else(|| PathBuf::from("important_comments.md")),
        index_path: file
            .index_path
            .unwrap_or_else(|| PathBuf::from("index.html")),
        thread_log_dir: file.thread_log_dir,
        prompt_dir: file.prompt_dir,
        refresh_window_secs: file.refresh_window_secs.unwrap_or(300),
        refresh_timeout_secs: file.refresh_timeout_secs.unwrap_or(120),
        classifier: ClassifierConfig {
            endpoint: classifier
                .endpoint
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            deployment: classifier
                .deployment
                .unwrap_or_else(|| "gpt-5-nano".to_string()),
            api_version: classifier
                .api_version
                .unwrap_or_else(|| "2024-10-21".to_string()),
            api_key_env: classifier
                .api_key_env
                .unwrap_or_else(|| "AZURE_OPENAI_API_KEY".to_string()),
            temperature: classifier.temperature.unwrap_or(1.0),
            timeout_secs: classifier.timeout_secs.unwrap_or(60),
        },
        port,
        hosted,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
