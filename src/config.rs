use crate::datastore::{postfilters::PostFilters, tables::Tables};
use anyhow::Context;
use chrono::{Duration, FixedOffset};
use serde::Deserialize;

/// Config, read from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// By default, output JSON logs. Only if this flag is set to true, output colourful human-friendly logs
    #[serde(default)]
    pub human_logs: bool,

    /// Offset from UTC, in seconds, of the timezone post timestamps are displayed in.
    #[serde(default)]
    pub display_utc_offset_secs: i32,

    /// Prefix prepended to every table name.
    #[serde(default)]
    pub table_prefix: String,

    /// Profiles, tag searches and so on are linked relative to this URL.
    #[serde(default = "profile_base_url")]
    pub profile_base_url: String,

    /// Posts verified longer ago than this get their existence rechecked before display.
    #[serde(default = "recheck_after_minutes")]
    pub recheck_after_minutes: i64,

    /// What the post stream shows.
    #[serde(default)]
    pub stream: PostFilters,
}

impl Config {
    pub fn from_file(filepath: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(filepath)
            .with_context(|| format!("couldn't read config file {}", filepath))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("couldn't parse config file")
    }

    /// The timezone post timestamps are converted to.
    pub fn display_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.display_utc_offset_secs).with_context(|| {
            format!(
                "display_utc_offset_secs {} is out of range",
                self.display_utc_offset_secs
            )
        })
    }

    pub fn tables(&self) -> Tables {
        Tables::with_prefix(&self.table_prefix)
    }

    pub fn recheck_after(&self) -> Duration {
        Duration::minutes(self.recheck_after_minutes)
    }
}

fn profile_base_url() -> String {
    "https://twitter.com/".to_owned()
}

fn recheck_after_minutes() -> i64 {
    30
}
