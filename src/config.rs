//! Run settings
//!
//! Loaded from an optional config file, then `REPOMINE__*` environment
//! variables; the binary applies command-line overrides on top.

use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{MineError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding all inputs and outputs of a run
    pub target: PathBuf,
    /// Repository list; defaults to `<target>/projects.csv`
    pub input: Option<PathBuf>,
    /// Resume from the previous run instead of starting fresh
    pub incremental: bool,
    pub threads: usize,
    /// Fan-out of the sharded directory trees
    pub files_per_folder: u64,
    /// Skip this many input records before scheduling anything
    pub debug_skip: u64,
    /// Schedule at most this many input records
    pub debug_limit: Option<u64>,
    pub filter: FilterSettings,
    pub compression: CompressionSettings,
    /// Keep cloned working copies after mining
    pub keep_repos: bool,
    /// Credentials for the metadata API, used round-robin
    pub api_tokens: Vec<String>,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub allow_prefix: Vec<String>,
    pub allow_suffix: Vec<String>,
    pub allow_contents: Vec<String>,
    pub deny_prefix: Vec<String>,
    pub deny_suffix: Vec<String>,
    pub deny_contents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub enabled: bool,
    /// Archive full shards on background threads
    pub background: bool,
    pub max_compressor_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub git_base: String,
    pub api_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        let target = dirs::data_dir()
            .map(|d| d.join("repomine"))
            .unwrap_or_else(|| PathBuf::from("repomine"));
        Self {
            target,
            input: None,
            incremental: true,
            threads: 1,
            files_per_folder: 1000,
            debug_skip: 0,
            debug_limit: None,
            filter: FilterSettings::default(),
            compression: CompressionSettings::default(),
            keep_repos: false,
            api_tokens: Vec::new(),
            remote: RemoteSettings::default(),
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            allow_prefix: Vec::new(),
            allow_suffix: vec![".js".to_string()],
            allow_contents: vec!["package.json".to_string()],
            deny_prefix: vec!["node_modules/".to_string()],
            deny_suffix: Vec::new(),
            deny_contents: vec!["/node_modules/".to_string()],
        }
    }
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            background: true,
            max_compressor_threads: 4,
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            git_base: "https://github.com".to_string(),
            api_base: "https://api.github.com/repos".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(ConfigFile::from(path).required(true));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("REPOMINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.files_per_folder < 2 {
            return Err(MineError::InvalidInput(format!(
                "files_per_folder must be at least 2, got {}",
                self.files_per_folder
            )));
        }
        if self.threads == 0 {
            return Err(MineError::InvalidInput("threads must be at least 1".into()));
        }
        if self.compression.enabled
            && self.compression.background
            && self.compression.max_compressor_threads == 0
        {
            return Err(MineError::InvalidInput(
                "max_compressor_threads must be at least 1 for background compression".into(),
            ));
        }
        Ok(())
    }

    pub fn input_file(&self) -> PathBuf {
        self.input
            .clone()
            .unwrap_or_else(|| self.target.join("projects.csv"))
    }

    pub fn content_hashes_file(&self) -> PathBuf {
        self.target.join("content_hashes.csv")
    }

    pub fn failed_projects_file(&self) -> PathBuf {
        self.target.join("failed_projects.csv")
    }

    pub fn run_stamp_file(&self) -> PathBuf {
        self.target.join("runs_downloader.csv")
    }

    pub fn api_tokens_file(&self) -> PathBuf {
        self.target.join("apitokens.csv")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.target.join("files")
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.target.join("projects")
    }
}
