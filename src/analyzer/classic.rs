//! Classic (yarn v1) audit pipeline.
//!
//! The classic CLI cannot audit offline, but `yarn audit --offline --verbose`
//! still *builds* the audit request and logs it. We fish that request out of
//! the verbose output, merge it with the project manifest, and submit the
//! result to the npm audit endpoint ourselves.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::analyzer::process;
use crate::error::AuditError;
use crate::models::{Advisory, Dependency};
use crate::registry::npm::NpmAuditClient;
use crate::registry::payload;

pub(crate) const PIPELINE: &str = "classic";

/// Substring marking the verbose log line that embeds the audit request.
const AUDIT_REQUEST_MARKER: &str = "Audit Request";

/// Length of the `"Audit Request: "` label preceding the JSON body inside the
/// marker line's data field.
const AUDIT_REQUEST_LABEL_LEN: usize = 15;

/// Run the offline audit, extract the embedded request, merge it with the
/// manifest, and submit the payload to the npm audit endpoint.
///
/// `dependency_map` is populated with module/version pairs as a side effect
/// of payload construction.
pub async fn analyze(
    yarn: &str,
    dependency: &Dependency,
    dependency_map: &mut HashMap<String, HashSet<String>>,
    skip_dev_dependencies: bool,
    client: &NpmAuditClient,
) -> Result<Vec<Advisory>, AuditError> {
    let audit_request = fetch_audit_request(yarn, dependency, skip_dev_dependencies)?;
    let manifest = read_manifest(dependency)?;

    let payload = payload::build(
        &audit_request,
        &manifest,
        dependency_map,
        skip_dev_dependencies,
    );

    client.submit(&payload).await
}

fn fetch_audit_request(
    yarn: &str,
    dependency: &Dependency,
    skip_dev_dependencies: bool,
) -> Result<Value, AuditError> {
    // offline audit is not supported upstream, but the audit request is
    // still generated in the verbose output
    let mut args: Vec<String> = vec!["audit".into(), "--offline".into()];
    if skip_dev_dependencies {
        args.push("--groups".into());
        args.push("dependencies".into());
    }
    args.push("--json".into());
    args.push("--verbose".into());

    let output = process::run_captured(yarn, &args, &dependency.directory)?;
    extract_audit_request(&output.stdout, &dependency.lockfile)
}

/// Locate the marker line in verbose output and recover the embedded request.
///
/// The line is itself JSON; its `data` string carries the fixed label
/// followed by the request body.
pub(crate) fn extract_audit_request(
    verbose_output: &str,
    lockfile: &Path,
) -> Result<Value, AuditError> {
    let line = verbose_output
        .lines()
        .find(|line| line.contains(AUDIT_REQUEST_MARKER))
        .ok_or_else(|| parse_error(lockfile, "verbose output contains no Audit Request line"))?;

    let wrapper: Value = serde_json::from_str(line)
        .map_err(|err| parse_error(lockfile, format!("Audit Request line: {err}")))?;
    let data = wrapper
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_error(lockfile, "Audit Request line has no data field"))?;

    let body = data
        .get(AUDIT_REQUEST_LABEL_LEN..)
        .ok_or_else(|| parse_error(lockfile, "Audit Request data is shorter than its label"))?;
    debug!("audit request: {}", body);

    serde_json::from_str(body)
        .map_err(|err| parse_error(lockfile, format!("audit request body: {err}")))
}

fn read_manifest(dependency: &Dependency) -> Result<Value, AuditError> {
    let content = std::fs::read_to_string(&dependency.manifest).map_err(AuditError::Io)?;
    serde_json::from_str(&content)
        .map_err(|err| parse_error(&dependency.manifest, format!("package.json: {err}")))
}

fn parse_error(path: &Path, message: impl Into<String>) -> AuditError {
    AuditError::Parse {
        pipeline: PIPELINE,
        path: path.to_path_buf(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lockfile() -> PathBuf {
        PathBuf::from("yarn.lock")
    }

    #[test]
    fn test_extracts_request_from_marker_line() {
        let verbose = concat!(
            r#"{"type":"verbose","data":"Performing \"GET\" request"}"#,
            "\n",
            r#"{"type":"verbose","data":"Audit Request: {\"foo\":1}"}"#,
            "\n",
            r#"{"type":"error","data":"Can't make a request in offline mode"}"#,
            "\n",
        );

        let request = extract_audit_request(verbose, &lockfile()).unwrap();
        assert_eq!(request, serde_json::json!({"foo": 1}));
    }

    #[test]
    fn test_first_marker_line_wins() {
        let verbose = concat!(
            r#"{"type":"verbose","data":"Audit Request: {\"first\":true}"}"#,
            "\n",
            r#"{"type":"verbose","data":"Audit Request: {\"first\":false}"}"#,
            "\n",
        );

        let request = extract_audit_request(verbose, &lockfile()).unwrap();
        assert_eq!(request["first"], serde_json::json!(true));
    }

    #[test]
    fn test_missing_marker_line_is_a_parse_error() {
        let err = extract_audit_request("{\"type\":\"info\",\"data\":\"ok\"}\n", &lockfile())
            .unwrap_err();
        match err {
            AuditError::Parse { pipeline, .. } => assert_eq!(pipeline, "classic"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_marker_line_with_garbage_body_is_a_parse_error() {
        let verbose = r#"{"type":"verbose","data":"Audit Request: {not json"}"#;
        let err = extract_audit_request(verbose, &lockfile()).unwrap_err();
        assert!(matches!(err, AuditError::Parse { .. }));
    }

    #[test]
    fn test_truncated_data_field_is_a_parse_error() {
        let verbose = r#"{"type":"verbose","data":"Audit Reques"}"#;
        // line matching happens before the label strip, so force the marker in
        let verbose_with_marker =
            format!("{verbose}\n{}", r#"{"data":"Audit Request"}"#);
        let err = extract_audit_request(&verbose_with_marker, &lockfile()).unwrap_err();
        assert!(matches!(err, AuditError::Parse { .. }));
    }
}
