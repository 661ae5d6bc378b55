//! The yarn audit analyzer: probes the executable, detects the installed
//! major version per dependency, and dispatches to the matching pipeline.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::analyzer::{berry, classic, process, AuditProtocol};
use crate::config::AnalyzerConfig;
use crate::engine::Engine;
use crate::error::AuditError;
use crate::models::{Advisory, Dependency};
use crate::registry::npm::NpmAuditClient;

const ANALYZER_NAME: &str = "yarn audit analyzer";

pub struct YarnAuditAnalyzer {
    /// Enabled → Disabled is terminal for the run; there is no re-enablement.
    enabled: AtomicBool,
    /// Resolved executable path, computed at most once per run.
    yarn_path: Mutex<Option<String>>,
    settings: AnalyzerConfig,
    client: NpmAuditClient,
}

impl YarnAuditAnalyzer {
    pub fn new(settings: AnalyzerConfig, client: NpmAuditClient) -> Self {
        YarnAuditAnalyzer {
            enabled: AtomicBool::new(settings.enabled),
            yarn_path: Mutex::new(None),
            settings,
            client,
        }
    }

    pub fn name(&self) -> &'static str {
        ANALYZER_NAME
    }

    /// Callers must check this before dispatching a dependency.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Capability probe, run once before any analysis.
    ///
    /// `yarn --help` must exit 0; exit 127 (executable not found) or any
    /// other non-zero value disables the analyzer for the run, as does a
    /// spawn failure. A disabled analyzer is not an error for the overall
    /// scan.
    pub fn prepare(&self) -> Result<(), AuditError> {
        if !self.is_enabled() {
            debug!("{} is disabled, skipping yarn executable check", self.name());
            return Ok(());
        }
        let yarn = self.yarn();
        match process::run_captured(&yarn, &["--help".to_string()], Path::new(".")) {
            Ok(output) => {
                match output.exit_code {
                    Some(0) => debug!("{} is enabled", self.name()),
                    code => {
                        self.disable();
                        warn!(
                            "the {} has been disabled after receiving exit value {:?}; the yarn \
                             executable was not found or returned a non-zero exit value",
                            self.name(),
                            code
                        );
                    }
                }
                Ok(())
            }
            Err(err) => {
                self.disable();
                warn!(
                    "the {} has been disabled after a probe failure; this can occur when the \
                     yarn executable is not found",
                    self.name()
                );
                Err(AuditError::Initialization(err.to_string()))
            }
        }
    }

    /// Resolve the yarn executable, honoring the configured override when it
    /// points at a real file. The resolution is cached under a lock so
    /// concurrent analyses compute it at most once.
    fn yarn(&self) -> String {
        let mut cached = self
            .yarn_path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if cached.is_none() {
            let resolved = match &self.settings.yarn_path {
                Some(path) if path.is_file() => path.to_string_lossy().into_owned(),
                Some(_) => {
                    warn!("provided path to the yarn executable is invalid");
                    "yarn".to_string()
                }
                None => "yarn".to_string(),
            };
            *cached = Some(resolved);
        }
        cached.clone().unwrap_or_else(|| "yarn".to_string())
    }

    /// Analyze one yarn lockfile, returning its normalized advisories.
    ///
    /// The detected major version selects the pipeline. A lockfile whose
    /// display alias equals its raw file name is removed from the engine's
    /// dependency set so it is not reported twice.
    pub async fn analyze(
        &self,
        dependency: &Dependency,
        engine: &Engine,
    ) -> Result<Vec<Advisory>, AuditError> {
        if dependency.display_name == dependency.file_name {
            engine.remove_dependency(dependency);
        }
        if !is_analyzable(&dependency.lockfile) {
            return Ok(Vec::new());
        }

        let major = self.yarn_major_version(dependency)?;
        match AuditProtocol::for_major_version(major) {
            AuditProtocol::Berry => {
                info!("analyzing {} with the berry audit", dependency.display_name);
                berry::analyze(
                    &self.yarn(),
                    dependency,
                    self.settings.skip_dev_dependencies,
                )
            }
            AuditProtocol::Classic => {
                info!("analyzing {} with the classic audit", dependency.display_name);
                // populated during payload construction, discarded afterwards
                let mut dependency_map = HashMap::new();
                let result = classic::analyze(
                    &self.yarn(),
                    dependency,
                    &mut dependency_map,
                    self.settings.skip_dev_dependencies,
                    &self.client,
                )
                .await;
                if let Err(err) = &result {
                    if err.disables_analyzer() {
                        self.disable();
                        warn!(
                            "the {} has been disabled and may produce false negatives: {}",
                            self.name(),
                            err
                        );
                    }
                    if matches!(err, AuditError::Search(_)) {
                        error!(
                            "{} failed on {}",
                            self.name(),
                            dependency.lockfile.display()
                        );
                    }
                }
                result
            }
        }
    }

    /// Extract the major component of the installed yarn version.
    ///
    /// Re-running for the same directory without executable changes returns
    /// the same value.
    fn yarn_major_version(&self, dependency: &Dependency) -> Result<u64, AuditError> {
        let version = self.yarn_version(dependency)?;
        major_version(&version)
    }

    fn yarn_version(&self, dependency: &Dependency) -> Result<String, AuditError> {
        let yarn = self.yarn();
        let output = process::run_captured(
            &yarn,
            &["--version".to_string()],
            &dependency.directory,
        )
        .map_err(|err| AuditError::InvalidState {
            reason: err.to_string(),
        })?;

        if output.exit_code != Some(0) {
            return Err(AuditError::InvalidState {
                reason: "unexpected response from yarn --version".to_string(),
            });
        }
        let version = output.stdout.trim();
        if version.is_empty() {
            return Err(AuditError::InvalidState {
                reason: "blank output from yarn --version".to_string(),
            });
        }
        Ok(version.to_string())
    }
}

/// A lockfile is worth auditing only if it exists and is non-empty.
fn is_analyzable(lockfile: &Path) -> bool {
    lockfile
        .metadata()
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Coerce a version string to its major component, tolerating prefixes like
/// `v4.2.1` the way lenient semver coercion does.
fn major_version(version: &str) -> Result<u64, AuditError> {
    let pattern = Regex::new(r"^\D*(\d+)").map_err(|err| AuditError::InvalidState {
        reason: err.to_string(),
    })?;
    let captures = pattern
        .captures(version.trim())
        .ok_or_else(|| AuditError::InvalidState {
            reason: format!("invalid version string format: {version:?}"),
        })?;
    captures[1]
        .parse()
        .map_err(|err| AuditError::InvalidState {
            reason: format!("invalid version string format: {err}"),
        })
}
