//! Serializable fetch configuration.
//!
//! Every section has a default, so an empty TOML document yields the
//! standard two-group factor set over 2010-01-01..2020-12-31.

use crate::fields::{FieldGroup, FieldName};
use crate::retry::RetryPolicy;
use crate::roster::DEFAULT_CODE_COLUMN;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What to do when a provider call still fails after all retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationPolicy {
    /// Stop the whole batch.
    #[default]
    Halt,
    /// Log, abandon the current code, continue with the next.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub window: WindowConfig,
    pub output: OutputConfig,
    pub roster: RosterConfig,
    pub retry: RetryConfig,
    pub provider: ProviderConfig,
    pub groups: Vec<FieldGroup>,
}

/// Request date range, inclusive on both ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub begin: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RosterConfig {
    pub path: PathBuf,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay_secs: u64,
    pub pace_secs: u64,
    pub on_exhausted: EscalationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            output: OutputConfig::default(),
            roster: RosterConfig::default(),
            retry: RetryConfig::default(),
            provider: ProviderConfig::default(),
            groups: default_groups(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            begin: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap_or_default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/factor"),
        }
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/样本股票.xlsx"),
            column: DEFAULT_CODE_COLUMN.to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            attempts: policy.attempts,
            delay_secs: policy.delay.as_secs(),
            pace_secs: policy.pace.as_secs(),
            on_exhausted: EscalationPolicy::Halt,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7071".to_string(),
            timeout_secs: 60,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            delay: Duration::from_secs(self.delay_secs),
            pace: Duration::from_secs(self.pace_secs),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FetchConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groups.is_empty() {
            return Err(ConfigError::Invalid("at least one field group is required".into()));
        }
        if self.window.begin > self.window.end {
            return Err(ConfigError::Invalid(format!(
                "window begin {} is after end {}",
                self.window.begin, self.window.end
            )));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid("retry.attempts must be at least 1".into()));
        }

        let mut owner: HashMap<&FieldName, &str> = HashMap::new();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(ConfigError::Invalid("field group without a name".into()));
            }
            if group.fields.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "field group '{}' has no fields",
                    group.name
                )));
            }
            for field in &group.fields {
                if field.as_str().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "field group '{}' has an empty field name",
                        group.name
                    )));
                }
                if let Some(other) = owner.insert(field, &group.name) {
                    return Err(ConfigError::Invalid(format!(
                        "field '{field}' appears in both '{other}' and '{}'",
                        group.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every configured field, group by group.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldName> {
        self.groups.iter().flat_map(|g| g.fields.iter())
    }
}

/// Group 1 needs quarterly report-period options; group 2 needs the
/// growth-rate and forecast options on top of those.
pub fn default_groups() -> Vec<FieldGroup> {
    vec![
        FieldGroup::new(
            "part1",
            "ruleType=2;Period=Q;Days=Alldays",
            &["qfa_yoysales", "pe_ttm"],
        ),
        FieldGroup::new(
            "part2",
            "ruleType=3;N=3;unit=1;rptType=1;currencyType=;westPeriod=180;Period=Q;Days=Alldays",
            &[
                "pb_mrq",
                "ps_lyr",
                "fa_orgr_ttm",
                "growth_or",
                "deductedprofit_yoy",
                "fa_npgr_ttm",
                "growth_profit",
                "qfa_yoyocf",
                "fa_cfogr_ttm",
                "wgsd_growth_ocf",
                "qfa_roe",
                "fa_roenp_ttm",
                "qfa_roa",
                "fa_netprofittoassets_ttm",
                "fa_grossprofitmargin_ttm",
                "turnover_ttm",
                "operatecashflowtoop_ttm2",
                "fa_mlev",
                "fa_blev",
                "cashtocurrentdebt",
                "current",
                "longdebttoequity",
                "mkt_cap_ard",
                "wrating_avg_data",
                "wgsd_assets",
                "wgsd_com_eq_paholder",
                "wgsd_liabs_lt",
                "fcfe",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = FetchConfig::from_toml("").unwrap();
        assert_eq!(config, FetchConfig::default());
        assert_eq!(config.groups.len(), 2);
        assert_eq!(config.groups[0].fields.len(), 2);
        assert_eq!(config.all_fields().count(), 30);
        assert_eq!(config.retry.on_exhausted, EscalationPolicy::Halt);
    }

    #[test]
    fn default_groups_are_valid() {
        FetchConfig::default().validate().unwrap();
    }

    #[test]
    fn toml_roundtrip() {
        let config = FetchConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = FetchConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = FetchConfig::from_toml(
            r#"
            [retry]
            on_exhausted = "skip"
            pace_secs = 0

            [output]
            dir = "/tmp/factors"
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.on_exhausted, EscalationPolicy::Skip);
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.retry.policy().pace, Duration::ZERO);
        assert_eq!(config.output.dir, PathBuf::from("/tmp/factors"));
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn custom_groups_replace_defaults() {
        let config = FetchConfig::from_toml(
            r#"
            [[groups]]
            name = "valuation"
            options = "Period=Q"
            fields = ["PE_TTM", "pb_mrq"]
            "#,
        )
        .unwrap();
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.groups[0].fields[0], FieldName::new("pe_ttm"));
    }

    #[test]
    fn overlapping_groups_are_rejected() {
        let err = FetchConfig::from_toml(
            r#"
            [[groups]]
            name = "a"
            fields = ["pe_ttm"]

            [[groups]]
            name = "b"
            fields = ["PE_TTM"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("pe_ttm")));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = FetchConfig::from_toml(
            r#"
            [window]
            begin = "2021-01-01"
            end = "2020-12-31"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn empty_group_is_rejected() {
        let err = FetchConfig::from_toml(
            r#"
            [[groups]]
            name = "a"
            fields = []
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
