use std::path::{Path, PathBuf};

use serde::Serialize;

/// A located yarn lockfile together with its directory and manifest.
///
/// Supplied by the detector; the analyzer treats it as read-only apart from
/// the one allowed mutation of removing it from the engine's dependency set.
#[derive(Debug, Clone, Serialize)]
pub struct Dependency {
    /// Path to the `yarn.lock` file.
    pub lockfile: PathBuf,
    /// Directory containing the lockfile; working directory for yarn calls.
    pub directory: PathBuf,
    /// Path to the sibling `package.json`.
    pub manifest: PathBuf,
    /// Raw file name, always `yarn.lock`.
    pub file_name: String,
    /// Display alias, relative to the scan root.
    pub display_name: String,
}

impl Dependency {
    /// Build a dependency from a located lockfile path.
    pub fn from_lockfile(lockfile: PathBuf, scan_root: &Path) -> Self {
        let directory = lockfile
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let manifest = directory.join("package.json");
        let file_name = lockfile
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let display_name = lockfile
            .strip_prefix(scan_root)
            .unwrap_or(&lockfile)
            .display()
            .to_string();
        Dependency {
            lockfile,
            directory,
            manifest,
            file_name,
            display_name,
        }
    }
}

/// A single normalized security advisory.
///
/// One logical advisory affecting N concrete tree versions expands into N
/// records, one per version; a `version` of `None` marks a version-agnostic
/// record. The field is always explicitly present, never omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    pub ghsa_id: Option<String>,
    pub title: Option<String>,
    /// Free text combining the source URL and advisory identifier.
    pub overview: String,
    pub severity: Option<String>,
    /// Affected range, passed through verbatim from the audit source.
    pub vulnerable_versions: Option<String>,
    pub module_name: Option<String>,
    /// Concrete affected version, or `None` when none were reported.
    pub version: Option<String>,
    pub cwes: Vec<String>,
}

/// An advisory with its classified severity and policy verdict, attributed to
/// the lockfile it was found in.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub lockfile: PathBuf,
    pub severity: Severity,
    pub verdict: PolicyVerdict,
    pub advisory: Advisory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Severity {
    Critical,
    High,
    Moderate,
    Low,
    Info,
    Unknown,
}

impl Severity {
    /// Classify the free-text severity reported by an audit source.
    pub fn parse(raw: Option<&str>) -> Severity {
        match raw.map(str::trim).map(str::to_lowercase).as_deref() {
            Some("critical") => Severity::Critical,
            Some("high") => Severity::High,
            Some("moderate") | Some("medium") => Severity::Moderate,
            Some("low") => Severity::Low,
            Some("info") => Severity::Info,
            _ => Severity::Unknown,
        }
    }

    /// Lowercase key used in the policy config table.
    pub fn key(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Moderate => "moderate",
            Severity::Low => "low",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::High => write!(f, "High"),
            Severity::Moderate => write!(f, "Moderate"),
            Severity::Low => write!(f, "Low"),
            Severity::Info => write!(f, "Info"),
            Severity::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PolicyVerdict {
    Pass,
    Warn,
    Error,
}

impl std::fmt::Display for PolicyVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyVerdict::Pass => write!(f, "pass"),
            PolicyVerdict::Warn => write!(f, "warn"),
            PolicyVerdict::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse(Some("critical")), Severity::Critical);
        assert_eq!(Severity::parse(Some("HIGH")), Severity::High);
        assert_eq!(Severity::parse(Some("medium")), Severity::Moderate);
        assert_eq!(Severity::parse(Some("moderate")), Severity::Moderate);
        assert_eq!(Severity::parse(Some("garbage")), Severity::Unknown);
        assert_eq!(Severity::parse(None), Severity::Unknown);
    }

    #[test]
    fn test_dependency_from_lockfile() {
        let root = Path::new("/project");
        let dep = Dependency::from_lockfile(PathBuf::from("/project/packages/app/yarn.lock"), root);
        assert_eq!(dep.directory, PathBuf::from("/project/packages/app"));
        assert_eq!(dep.manifest, PathBuf::from("/project/packages/app/package.json"));
        assert_eq!(dep.file_name, "yarn.lock");
        assert_eq!(dep.display_name, "packages/app/yarn.lock");
    }

    #[test]
    fn test_root_lockfile_display_equals_file_name() {
        let root = Path::new("/project");
        let dep = Dependency::from_lockfile(PathBuf::from("/project/yarn.lock"), root);
        assert_eq!(dep.display_name, dep.file_name);
    }
}
