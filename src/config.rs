use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::models::{PolicyVerdict, Severity};

/// Root configuration structure, deserialized from `.vuln-checkr/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Yarn audit analyzer settings.
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    /// Severity policy rules.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Settings consumed by the yarn audit analyzer.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Whether the analyzer runs at all. Defaults to enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path override for the yarn executable; falls back to `yarn` on the
    /// PATH when absent or invalid.
    #[serde(default)]
    pub yarn_path: Option<PathBuf>,
    /// Exclude development-only dependencies from the audit.
    #[serde(default)]
    pub skip_dev_dependencies: bool,
    /// Override for the npm audit API endpoint.
    #[serde(default)]
    pub audit_endpoint: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            enabled: true,
            yarn_path: None,
            skip_dev_dependencies: false,
            audit_endpoint: None,
        }
    }
}

/// Defines how advisory severities are evaluated.
#[derive(Debug, Deserialize)]
pub struct PolicyConfig {
    /// Verdict applied to any severity not explicitly listed in `severities`.
    /// Defaults to `warn`.
    #[serde(default = "default_policy_action")]
    pub default: PolicyAction,
    /// Per-severity overrides keyed by lowercase name (e.g. `"critical"`,
    /// `"moderate"`).
    #[serde(default)]
    pub severities: HashMap<String, PolicyAction>,
}

fn default_policy_action() -> PolicyAction {
    PolicyAction::Warn
}

/// The action to take when an advisory's severity matches a policy rule.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    /// Advisory is tolerated; no action needed.
    Pass,
    /// Advisory warrants review but does not fail the scan.
    Warn,
    /// Advisory violates policy; the CLI exits with code 1.
    Error,
}

impl PolicyAction {
    /// Convert to the corresponding [`PolicyVerdict`].
    pub fn to_verdict(&self) -> PolicyVerdict {
        match self {
            PolicyAction::Pass => PolicyVerdict::Pass,
            PolicyAction::Warn => PolicyVerdict::Warn,
            PolicyAction::Error => PolicyVerdict::Error,
        }
    }
}

impl Default for PolicyConfig {
    /// Built-in default policy used when no config file is found.
    ///
    /// Critical and high severities fail the scan, moderate warns, and low or
    /// informational advisories pass.
    fn default() -> Self {
        let mut severities = HashMap::new();
        severities.insert("critical".to_string(), PolicyAction::Error);
        severities.insert("high".to_string(), PolicyAction::Error);
        severities.insert("moderate".to_string(), PolicyAction::Warn);
        severities.insert("low".to_string(), PolicyAction::Pass);
        severities.insert("info".to_string(), PolicyAction::Pass);
        severities.insert("unknown".to_string(), PolicyAction::Warn);

        PolicyConfig {
            default: PolicyAction::Warn,
            severities,
        }
    }
}

/// Load the configuration, searching in order:
///
/// 1. `config_override` — path passed via `--config`
/// 2. `<project_path>/.vuln-checkr/config.toml`
/// 3. `~/.config/vuln-checkr/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        let content = std::fs::read_to_string(path)?;
        return Ok(toml::from_str(&content)?);
    }

    let project_config = project_path.join(".vuln-checkr").join("config.toml");
    if project_config.exists() {
        let content = std::fs::read_to_string(&project_config)?;
        return Ok(toml::from_str(&content)?);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home
            .join(".config")
            .join("vuln-checkr")
            .join("config.toml");
        if home_config.exists() {
            let content = std::fs::read_to_string(&home_config)?;
            return Ok(toml::from_str(&content)?);
        }
    }

    Ok(Config::default())
}

/// Determine the policy verdict for a classified severity.
pub fn apply_policy(config: &Config, severity: &Severity) -> PolicyVerdict {
    if let Some(action) = config.policy.severities.get(severity.key()) {
        return action.to_verdict();
    }
    config.policy.default.to_verdict()
}
