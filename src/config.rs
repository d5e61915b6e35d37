use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::parser::{HeadingRules, SectionName};
use crate::summarizer::SummarizerConfig;

pub const DEFAULT_DB_PATH: &str = "data/papers.sqlite";

/// Azure variable names honoured on top of the `PAPER_` prefixed ones.
const AZURE_OVERRIDES: &[(&str, &str)] = &[
    ("summarizer.endpoint", "AZURE_OPENAI_ENDPOINT"),
    ("summarizer.credential", "AZURE_OPENAI_KEY"),
    ("summarizer.deployment_name", "AZURE_OPENAI_DEPLOYMENT"),
    ("summarizer.api_version", "AZURE_OPENAI_API_VERSION"),
];

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub segmentation: SegmentationSettings,
    pub summarizer: SummarizerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SegmentationSettings {
    /// Emit the `other` bucket in processed documents.
    pub keep_other: bool,
    /// Replacement pattern bodies, keyed by section name.
    pub patterns: HashMap<SectionName, String>,
}

impl SegmentationSettings {
    pub fn heading_rules(&self) -> Result<HeadingRules> {
        HeadingRules::with_overrides(&self.patterns).context("Invalid segmentation.patterns")
    }
}

/// Layered settings: optional file, then `PAPER_*` environment, then the Azure names.
pub fn load(file: Option<&Path>) -> Result<Settings> {
    let mut builder = Config::builder();
    if let Some(path) = file {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        builder = builder.add_source(File::with_name("paper_digest").required(false));
    }
    builder = builder.add_source(
        Environment::with_prefix("PAPER")
            .prefix_separator("_")
            .separator("__"),
    );
    for (key, var) in AZURE_OVERRIDES {
        builder = builder.set_override_option(*key, std::env::var(var).ok())?;
    }

    let settings: Settings = builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.database.path, PathBuf::from(DEFAULT_DB_PATH));
        assert!(!s.segmentation.keep_other);
        assert!(s.segmentation.heading_rules().is_ok());
    }

    #[test]
    fn file_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digest.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[database]
path = "/tmp/papers.sqlite"

[segmentation]
keep_other = true

[segmentation.patterns]
introduction = '(?:\d+\.?\s+)?introduction'

[summarizer]
deployment_name = "gpt-4o"
temperature = 0.2
"#
        )
        .unwrap();

        let s = load(Some(&path)).unwrap();
        assert_eq!(s.database.path, PathBuf::from("/tmp/papers.sqlite"));
        assert!(s.segmentation.keep_other);
        assert_eq!(s.summarizer.deployment_name, "gpt-4o");
        assert_eq!(s.summarizer.temperature, 0.2);

        let rules = s.segmentation.heading_rules().unwrap();
        assert_eq!(rules.detect("2. Introduction"), Some(SectionName::Introduction));
    }

    #[test]
    fn missing_explicit_file_fails() {
        assert!(load(Some(Path::new("/nonexistent/digest.toml"))).is_err());
    }
}
