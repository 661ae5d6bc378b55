//! Berry (yarn v2+) audit pipeline.
//!
//! `yarn npm audit --json` performs the audit itself and prints one JSON
//! object per line, each a labeled tree node describing one advisory and the
//! resolved versions it affects. No backend round-trip is needed.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::analyzer::process;
use crate::error::AuditError;
use crate::models::{Advisory, Dependency};

pub(crate) const PIPELINE: &str = "berry";

/// Run `yarn npm audit` for the dependency and flatten its output.
pub fn analyze(
    yarn: &str,
    dependency: &Dependency,
    skip_dev_dependencies: bool,
) -> Result<Vec<Advisory>, AuditError> {
    let mut args: Vec<String> = vec!["npm".into(), "audit".into()];
    if skip_dev_dependencies {
        args.push("--environment".into());
        args.push("production".into());
    }
    args.push("--all".into());
    args.push("--recursive".into());
    args.push("--json".into());

    let output = process::run_captured(yarn, &args, &dependency.directory)?;
    debug!("advisories json: {}", output.stdout);

    parse_advisories(&output.stdout, &dependency.lockfile)
}

/// Parse newline-delimited advisory records, ignoring blank lines.
pub(crate) fn parse_advisories(
    ndjson: &str,
    lockfile: &Path,
) -> Result<Vec<Advisory>, AuditError> {
    let mut advisories = Vec::new();
    for line in ndjson.lines().filter(|line| !line.trim().is_empty()) {
        let node: Value = serde_json::from_str(line)
            .map_err(|err| parse_error(lockfile, err.to_string()))?;
        advisories.extend(flatten_tree_node(&node, lockfile)?);
    }
    Ok(advisories)
}

/// Expand one advisory tree node into per-version records.
///
/// A node with k tree versions yields k records sharing every other field; a
/// node with none yields a single version-agnostic record. Each record is a
/// fresh value.
fn flatten_tree_node(node: &Value, lockfile: &Path) -> Result<Vec<Advisory>, AuditError> {
    let children = node
        .get("children")
        .and_then(Value::as_object)
        .ok_or_else(|| parse_error(lockfile, "advisory entry has no children object"))?;

    let module_name = node.get("value").and_then(Value::as_str).map(str::to_string);
    // berry emits numeric IDs; older builds quoted them
    let id = children
        .get("ID")
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .ok_or_else(|| parse_error(lockfile, "advisory entry has no ID"))?;
    let url = children.get("URL").and_then(Value::as_str);
    let ghsa_id = url.and_then(extract_identifier);
    let issue = children.get("Issue").and_then(Value::as_str).map(str::to_string);
    let severity = children
        .get("Severity")
        .and_then(Value::as_str)
        .map(str::to_string);
    let vulnerable_versions = children
        .get("Vulnerable Versions")
        .and_then(Value::as_str)
        .map(str::to_string);

    let overview = match url {
        Some(url) => format!("URL: {url} ID: {id}"),
        None => format!("ID: {id}"),
    };

    let versions: Vec<Option<String>> = match children.get("Tree Versions").and_then(Value::as_array)
    {
        Some(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => vec![None],
    };

    Ok(versions
        .into_iter()
        .map(|version| Advisory {
            ghsa_id: ghsa_id.clone(),
            title: issue.clone(),
            overview: overview.clone(),
            severity: severity.clone(),
            vulnerable_versions: vulnerable_versions.clone(),
            module_name: module_name.clone(),
            version,
            cwes: Vec::new(),
        })
        .collect())
}

/// Short advisory identifier: the substring after the final `/` of the URL.
///
/// Empty, slash-less, and trailing-slash URLs carry no identifier.
pub(crate) fn extract_identifier(url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    let last_slash = url.rfind('/')?;
    if last_slash == url.len() - 1 {
        return None;
    }
    Some(url[last_slash + 1..].to_string())
}

fn parse_error(lockfile: &Path, message: impl Into<String>) -> AuditError {
    AuditError::Parse {
        pipeline: PIPELINE,
        path: lockfile.to_path_buf(),
        message: message.into(),
    }
}
