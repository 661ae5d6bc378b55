//! `vuln-checkr` — scan yarn projects, audit their lockfiles, and enforce a
//! severity policy.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]).
//! 2. Load config ([`config::load_config`]).
//! 3. Locate yarn lockfiles ([`detector::find_lockfiles`]).
//! 4. Probe the yarn executable and audit each lockfile
//!    ([`analyzer::yarn::YarnAuditAnalyzer`]) — classic installs route
//!    through the npm audit endpoint ([`registry`]), berry installs are
//!    parsed directly.
//! 5. Classify severities and apply policy ([`config::apply_policy`]).
//! 6. Render the requested report ([`report`]).
//! 7. Exit `0` (clean) or `1` (at least one [`models::PolicyVerdict::Error`]).

mod analyzer;
mod cli;
mod config;
mod detector;
mod engine;
mod error;
mod models;
mod registry;
mod report;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use analyzer::yarn::YarnAuditAnalyzer;
use cli::{Cli, ReportFormat};
use config::{apply_policy, load_config, Config};
use engine::Engine;
use error::AuditError;
use models::{Finding, PolicyVerdict, Severity};
use registry::npm::NpmAuditClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Resolve project path
    let path = cli
        .path
        .canonicalize()
        .unwrap_or_else(|_| cli.path.clone());

    let mut config = load_config(&path, cli.config.as_deref())?;
    if cli.skip_dev {
        config.analyzer.skip_dev_dependencies = true;
    }

    let dependencies = detector::find_lockfiles(&path);
    if dependencies.is_empty() {
        eprintln!("No yarn lockfiles found in {}", path.display());
        std::process::exit(1);
    }

    if !cli.quiet {
        eprintln!(
            "  {} {} yarn {}",
            "→".cyan(),
            dependencies.len(),
            if dependencies.len() == 1 {
                "lockfile"
            } else {
                "lockfiles"
            }
        );
    }

    let engine = Engine::new(dependencies);
    let client = NpmAuditClient::new(config.analyzer.audit_endpoint.clone())?;
    let analyzer = YarnAuditAnalyzer::new(config.analyzer.clone(), client);

    if let Err(err) = analyzer.prepare() {
        warn!("{err}");
    }
    if !analyzer.is_enabled() {
        eprintln!(
            "{} is disabled; install yarn or set analyzer.yarn_path",
            analyzer.name()
        );
        return Ok(());
    }

    let findings = analyze_all(&analyzer, &engine, &config, cli.quiet).await?;

    match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render(&findings, &path, cli.verbose, cli.quiet)?;
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&findings)?);
        }
    }

    let has_errors = findings
        .iter()
        .any(|f| f.verdict == PolicyVerdict::Error);

    if has_errors {
        std::process::exit(1);
    }

    Ok(())
}

/// Audit every dependency, a small batch at a time so a disabling failure in
/// one batch stops later batches from dispatching.
async fn analyze_all(
    analyzer: &YarnAuditAnalyzer,
    engine: &Engine,
    config: &Config,
    quiet: bool,
) -> Result<Vec<Finding>> {
    use futures::future::join_all;

    const BATCH_SIZE: usize = 4;

    let dependencies = engine.dependencies();

    let pb = if !quiet {
        let pb = ProgressBar::new(dependencies.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut findings = Vec::new();

    for batch in dependencies.chunks(BATCH_SIZE) {
        if !analyzer.is_enabled() {
            warn!(
                "{} was disabled mid-run; remaining lockfiles were not audited",
                analyzer.name()
            );
            break;
        }

        let futures: Vec<_> = batch
            .iter()
            .map(|dependency| analyzer.analyze(dependency, engine))
            .collect();

        let results = join_all(futures).await;

        for (dependency, result) in batch.iter().zip(results) {
            match result {
                Ok(advisories) => {
                    for advisory in advisories {
                        let severity = Severity::parse(advisory.severity.as_deref());
                        let verdict = apply_policy(config, &severity);
                        findings.push(Finding {
                            lockfile: dependency.lockfile.clone(),
                            severity,
                            verdict,
                            advisory,
                        });
                    }
                }
                Err(err @ AuditError::Search(_)) => {
                    // backend search failures propagate to the caller
                    return Err(err.into());
                }
                Err(err) => {
                    warn!("skipping {}: {}", dependency.display_name, err);
                }
            }
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
    }

    if let Some(pb) = pb {
        pb.finish_with_message("Done");
    }

    Ok(findings)
}
