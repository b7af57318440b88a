use std::{path::{Path, PathBuf}, time::Duration};

use clap::Args;
use error_stack::ResultExt;
use serde::{Deserialize, Serialize};

use crate::existence::{ExistenceChecker, QueryTokenModifier, DEFAULT_HTTP_TIMEOUT_SECS};
use crate::hrefs::is_remote;
use crate::indices::{DayRange, MonthRange};
use crate::path_relative_to_config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Error converting value: {0}")]
    CannotConvert(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Could not set up the HTTP client for existence checks")]
    HttpClient,
}

/// Settings for a COG/Item creation run that are typically fixed per deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory or URL prefix holding already published COGs. A COG found there is reused
    /// instead of being created again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cog_check_href: Option<String>,

    /// Query-string token (e.g. a SAS token) added to remote HREFs before they are read
    /// or checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_token: Option<String>,

    /// Timeout for each HTTP request made to check whether a COG exists.
    pub http_timeout_secs: u64,

    /// Whether Items should include assets for the source netCDF files.
    pub nc_assets: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cog_check_href: None,
            read_token: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            nc_assets: false,
        }
    }
}

impl PipelineConfig {
    /// Read a TOML configuration file. A relative local `cog_check_href` is taken to be
    /// relative to the directory containing the file.
    pub fn read_from_path<P: AsRef<Path>>(p: P) -> error_stack::Result<Self, ConfigError> {
        let p = p.as_ref();
        let text = std::fs::read_to_string(p)
            .map_err(|e| ConfigError::IoError(
                format!("could not read configuration file {}: {e}", p.display())
            ))?;

        let mut value: PipelineConfig = toml::from_str(&text)
            .map_err(|e| ConfigError::IoError(
                format!("the TOML file {} is not correct: {e}", p.display())
            ))?;

        if let Some(href) = value.cog_check_href.take() {
            let href = if is_remote(&href) {
                href
            } else {
                path_relative_to_config(p, PathBuf::from(href)).to_string_lossy().to_string()
            };
            value.cog_check_href = Some(href);
        }

        Ok(value)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn existence_checker(&self) -> error_stack::Result<ExistenceChecker, ConfigError> {
        ExistenceChecker::new(self.http_timeout())
            .change_context(ConfigError::HttpClient)
    }

    pub fn read_href_modifier(&self) -> Option<QueryTokenModifier> {
        self.read_token.as_deref().map(QueryTokenModifier::new)
    }
}

/// Options shared by the subcommands that create COGs and Items.
#[derive(Debug, Args)]
pub struct PipelineArgs {
    /// A TOML configuration file (optional). Options given on the
    /// command line take precedence over values in the file. Use
    /// the write-config subcommand to create an example.
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Include assets for the source netCDF files in the Items.
    #[clap(short = 'n', long)]
    pub nc_assets: bool,

    /// Directory or URL prefix to check for already published COGs.
    /// COGs found there are referenced instead of being recreated.
    #[clap(long)]
    pub cog_check_href: Option<String>,

    /// Token to append as a query string to remote netCDF and check HREFs.
    #[clap(long)]
    pub read_token: Option<String>,

    /// Timeout in seconds for HTTP existence checks (default 30).
    #[clap(long)]
    pub http_timeout_secs: Option<u64>,
}

impl PipelineArgs {
    /// Combine the configuration file (if any) with the command line options.
    pub fn resolve(&self) -> error_stack::Result<PipelineConfig, ConfigError> {
        let mut cfg = match &self.config {
            Some(p) => PipelineConfig::read_from_path(p)?,
            None => PipelineConfig::default(),
        };

        if self.nc_assets {
            cfg.nc_assets = true;
        }
        if let Some(href) = &self.cog_check_href {
            cfg.cog_check_href = Some(href.clone());
        }
        if let Some(token) = &self.read_token {
            cfg.read_token = Some(token.clone());
        }
        if let Some(secs) = self.http_timeout_secs {
            cfg.http_timeout_secs = secs;
        }
        log::debug!("Resolved configuration: {cfg:?}");
        Ok(cfg)
    }
}

/// Restrict which days or months are processed.
#[derive(Debug, Args)]
pub struct RangeArgs {
    /// First day (daily files, 1-31) or month (monthly files, YYYYMM) to process.
    #[clap(long)]
    pub start: Option<String>,

    /// Last day (daily files, 1-31) or month (monthly files, YYYYMM) to process.
    #[clap(long)]
    pub end: Option<String>,
}

impl RangeArgs {
    pub fn is_set(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    pub fn day_range(&self) -> Result<Option<DayRange>, ConfigError> {
        if !self.is_set() {
            return Ok(None);
        }
        let parse = |s: &str| s.parse::<u32>()
            .map_err(|e| ConfigError::CannotConvert(format!("'{s}' is not a day of the month: {e}")));
        let start = self.start.as_deref().map(parse).transpose()?.unwrap_or(1);
        let end = self.end.as_deref().map(parse).transpose()?.unwrap_or(31);
        Ok(Some(DayRange { start, end }))
    }

    pub fn month_range(&self) -> Result<Option<MonthRange>, ConfigError> {
        if !self.is_set() {
            return Ok(None);
        }
        let start = self.start.as_deref().unwrap_or("000001");
        let end = self.end.as_deref().unwrap_or("999912");
        let range = MonthRange::new(start, end)
            .map_err(|e| ConfigError::CannotConvert(format!("{}", e.current_context())))?;
        Ok(Some(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_config_relative_check_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg_path = tmp.path().join("nclimgrid.toml");
        std::fs::write(&cfg_path, "cog_check_href = \"published\"\nnc_assets = true\n").unwrap();

        let cfg = PipelineConfig::read_from_path(&cfg_path).unwrap();
        assert_eq!(cfg.cog_check_href, Some(tmp.path().join("published").to_string_lossy().to_string()));
        assert!(cfg.nc_assets);
        assert_eq!(cfg.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS);
        assert!(cfg.read_href_modifier().is_none());
    }

    #[test]
    fn test_read_config_bad_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg_path = tmp.path().join("bad.toml");
        std::fs::write(&cfg_path, "http_timeout_secs = \"soon\"\n").unwrap();
        let e = PipelineConfig::read_from_path(&cfg_path).unwrap_err();
        assert!(matches!(e.current_context(), ConfigError::IoError(_)));
    }

    #[test]
    fn test_args_override_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg_path = tmp.path().join("nclimgrid.toml");
        std::fs::write(&cfg_path, "cog_check_href = \"https://host/cogs\"\nhttp_timeout_secs = 5\n").unwrap();

        let args = PipelineArgs {
            config: Some(cfg_path),
            nc_assets: false,
            cog_check_href: None,
            read_token: Some("sig=abc".to_string()),
            http_timeout_secs: Some(10),
        };
        let cfg = args.resolve().unwrap();
        assert_eq!(cfg.cog_check_href.as_deref(), Some("https://host/cogs"));
        assert_eq!(cfg.http_timeout_secs, 10);
        assert_eq!(cfg.read_token.as_deref(), Some("sig=abc"));
    }

    #[test]
    fn test_range_args() {
        let args = RangeArgs { start: Some("3".to_string()), end: None };
        assert_eq!(args.day_range().unwrap(), Some(DayRange { start: 3, end: 31 }));

        let args = RangeArgs { start: None, end: Some("189512".to_string()) };
        let range = args.month_range().unwrap().unwrap();
        assert_eq!(range.end, "189512");

        let args = RangeArgs { start: Some("x".to_string()), end: None };
        assert!(args.day_range().is_err());

        let args = RangeArgs { start: None, end: None };
        assert_eq!(args.day_range().unwrap(), None);
    }
}
