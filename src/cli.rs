use clap::Parser;
use std::path::PathBuf;

use crate::config::Settings;

#[derive(Parser, Debug)]
#[command(name = "repomine", about = "Mine the file history of many git repositories")]
pub struct Cli {
    /// Settings file (toml, yaml, json or ini)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding all inputs and outputs
    #[arg(short, long)]
    pub target: Option<PathBuf>,

    /// Repository list, one `url` or `url,id` per line
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short = 'n', long)]
    pub threads: Option<usize>,

    /// Start over instead of resuming the previous run
    #[arg(long)]
    pub fresh: bool,

    /// Keep cloned working copies
    #[arg(long)]
    pub keep_repos: bool,

    /// Leave full shards uncompressed
    #[arg(long)]
    pub no_compress: bool,

    /// Hide the progress line
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(target) = &self.target {
            settings.target = target.clone();
        }
        if let Some(input) = &self.input {
            settings.input = Some(input.clone());
        }
        if let Some(threads) = self.threads {
            settings.threads = threads;
        }
        if self.fresh {
            settings.incremental = false;
        }
        if self.keep_repos {
            settings.keep_repos = true;
        }
        if self.no_compress {
            settings.compression.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from(["repomine", "--target", "/data", "-n", "8", "--fresh", "--no-compress"]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.target, PathBuf::from("/data"));
        assert_eq!(settings.threads, 8);
        assert!(!settings.incremental);
        assert!(!settings.compression.enabled);
        assert!(!settings.keep_repos);
    }
}
