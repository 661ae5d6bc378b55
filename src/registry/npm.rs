use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::analyzer::berry::extract_identifier;
use crate::error::AuditError;
use crate::models::Advisory;

const DEFAULT_AUDIT_ENDPOINT: &str = "https://registry.npmjs.org/-/npm/v1/security/audits";

/// Client for the npm audit API used by the classic pipeline.
pub struct NpmAuditClient {
    client: Client,
    endpoint: String,
}

impl NpmAuditClient {
    pub fn new(endpoint: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(NpmAuditClient {
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_AUDIT_ENDPOINT.to_string()),
        })
    }

    /// Submit an audit payload and return the normalized advisories.
    ///
    /// Connectivity failures (including failure to read the response body)
    /// surface as [`AuditError::Backend`], which disables the analyzer; an
    /// HTTP-level rejection is a search failure re-raised to the caller.
    pub async fn submit(&self, payload: &Value) -> Result<Vec<Advisory>, AuditError> {
        debug!("submitting audit payload to {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("User-Agent", concat!("vuln-checkr/", env!("CARGO_PKG_VERSION")))
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(AuditError::Backend)?;

        if !response.status().is_success() {
            return Err(AuditError::Search(format!(
                "audit endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(AuditError::Backend)?;
        Ok(parse_advisories(&body))
    }
}

/// Flatten the `advisories` object of an npm audit response.
///
/// Each advisory fans out into one record per finding version, matching the
/// berry pipeline's shape; an advisory without findings still yields a single
/// version-agnostic record.
pub(crate) fn parse_advisories(body: &Value) -> Vec<Advisory> {
    let mut advisories = Vec::new();
    let entries = match body.get("advisories").and_then(Value::as_object) {
        Some(entries) => entries,
        None => return advisories,
    };

    for (id, entry) in entries {
        let url = entry.get("url").and_then(Value::as_str);
        let ghsa_id = entry
            .get("github_advisory_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| url.and_then(extract_identifier));
        let title = entry.get("title").and_then(Value::as_str).map(str::to_string);
        let overview = entry
            .get("overview")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| match url {
                Some(url) => format!("URL: {url} ID: {id}"),
                None => format!("ID: {id}"),
            });
        let severity = entry
            .get("severity")
            .and_then(Value::as_str)
            .map(str::to_string);
        let vulnerable_versions = entry
            .get("vulnerable_versions")
            .and_then(Value::as_str)
            .map(str::to_string);
        let module_name = entry
            .get("module_name")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut versions: Vec<Option<String>> = entry
            .get("findings")
            .and_then(Value::as_array)
            .map(|findings| {
                findings
                    .iter()
                    .filter_map(|finding| finding.get("version").and_then(Value::as_str))
                    .map(|version| Some(version.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        if versions.is_empty() {
            versions.push(None);
        }

        for version in versions {
            advisories.push(Advisory {
                ghsa_id: ghsa_id.clone(),
                title: title.clone(),
                overview: overview.clone(),
                severity: severity.clone(),
                vulnerable_versions: vulnerable_versions.clone(),
                module_name: module_name.clone(),
                version,
                cwes: Vec::new(),
            });
        }
    }

    advisories
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_advisories_fans_out_per_finding_version() {
        let body = json!({
            "advisories": {
                "118": {
                    "module_name": "minimatch",
                    "severity": "high",
                    "title": "Regular Expression Denial of Service",
                    "url": "https://npmjs.com/advisories/118",
                    "vulnerable_versions": "<=3.0.1",
                    "findings": [
                        {"version": "3.0.0", "paths": ["a>minimatch"]},
                        {"version": "2.0.10", "paths": ["b>minimatch"]}
                    ]
                }
            }
        });

        let advisories = parse_advisories(&body);

        assert_eq!(advisories.len(), 2);
        assert_eq!(advisories[0].module_name.as_deref(), Some("minimatch"));
        assert_eq!(advisories[0].ghsa_id.as_deref(), Some("118"));
        assert_eq!(advisories[0].version.as_deref(), Some("3.0.0"));
        assert_eq!(advisories[1].version.as_deref(), Some("2.0.10"));
    }

    #[test]
    fn test_ghsa_field_preferred_over_url_suffix() {
        let body = json!({
            "advisories": {
                "1005154": {
                    "module_name": "lodash",
                    "severity": "critical",
                    "github_advisory_id": "GHSA-jf85-cpcp-j695",
                    "url": "https://github.com/advisories/GHSA-jf85-cpcp-j695",
                    "findings": [{"version": "4.17.11"}]
                }
            }
        });

        let advisories = parse_advisories(&body);
        assert_eq!(
            advisories[0].ghsa_id.as_deref(),
            Some("GHSA-jf85-cpcp-j695")
        );
    }

    #[test]
    fn test_advisory_without_findings_yields_versionless_record() {
        let body = json!({
            "advisories": {
                "42": {"module_name": "left-pad", "severity": "low"}
            }
        });

        let advisories = parse_advisories(&body);
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].version, None);
        assert_eq!(advisories[0].overview, "ID: 42");
    }

    #[test]
    fn test_empty_response_parses_to_no_advisories() {
        assert!(parse_advisories(&json!({})).is_empty());
        assert!(parse_advisories(&json!({"advisories": {}})).is_empty());
    }
}
