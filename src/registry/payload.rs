//! Builds the npm audit API submission.
//!
//! Inputs are the audit request recovered from yarn's verbose output (the
//! resolved dependency tree), the project manifest (authoritative for name,
//! version, and declared ranges), and the per-analysis dependency map that
//! gets populated with every module/version pair seen in the tree.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Map, Value};

/// Merge the lock-derived audit request with the manifest into the payload
/// shape the npm audit endpoint expects.
pub fn build(
    audit_request: &Value,
    manifest: &Value,
    dependency_map: &mut HashMap<String, HashSet<String>>,
    skip_dev_dependencies: bool,
) -> Value {
    let mut payload = Map::new();

    // manifest metadata wins over whatever the lock-derived request carries
    let name = manifest
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| audit_request.get("name").and_then(Value::as_str));
    if let Some(name) = name {
        payload.insert("name".to_string(), json!(name));
    }
    let version = manifest
        .get("version")
        .and_then(Value::as_str)
        .or_else(|| audit_request.get("version").and_then(Value::as_str));
    if let Some(version) = version {
        payload.insert("version".to_string(), json!(version));
    }

    payload.insert(
        "requires".to_string(),
        Value::Object(build_requires(audit_request, manifest, skip_dev_dependencies)),
    );

    let mut dependencies = audit_request
        .get("dependencies")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    record_versions(&dependencies, dependency_map);
    if skip_dev_dependencies {
        dependencies.retain(|_, entry| {
            !entry.get("dev").and_then(Value::as_bool).unwrap_or(false)
        });
    }
    payload.insert("dependencies".to_string(), Value::Object(dependencies));

    Value::Object(payload)
}

/// Declared install targets: the request's `requires` object widened with the
/// manifest's declared ranges.
fn build_requires(
    audit_request: &Value,
    manifest: &Value,
    skip_dev_dependencies: bool,
) -> Map<String, Value> {
    let mut requires = audit_request
        .get("requires")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut sections = vec!["dependencies"];
    if !skip_dev_dependencies {
        sections.push("devDependencies");
    }
    for section in sections {
        if let Some(declared) = manifest.get(section).and_then(Value::as_object) {
            for (name, range) in declared {
                requires
                    .entry(name.clone())
                    .or_insert_with(|| range.clone());
            }
        }
    }

    requires
}

/// Record every module/version pair in the resolved tree, including nested
/// transitive entries, so later advisory matching can disambiguate versions.
fn record_versions(
    dependencies: &Map<String, Value>,
    dependency_map: &mut HashMap<String, HashSet<String>>,
) {
    for (name, entry) in dependencies {
        if let Some(version) = entry.get("version").and_then(Value::as_str) {
            dependency_map
                .entry(name.clone())
                .or_default()
                .insert(version.to_string());
        }
        if let Some(nested) = entry.get("dependencies").and_then(Value::as_object) {
            record_versions(nested, dependency_map);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_manifest_metadata_wins() {
        let request = json!({"name": "from-lock", "version": "0.0.0", "dependencies": {}});
        let manifest = json!({"name": "my-app", "version": "1.2.3"});
        let mut map = HashMap::new();

        let payload = build(&request, &manifest, &mut map, false);

        assert_eq!(payload["name"], json!("my-app"));
        assert_eq!(payload["version"], json!("1.2.3"));
    }

    #[test]
    fn test_requires_merges_manifest_ranges() {
        let request = json!({"requires": {"lodash": "^4.17.0"}, "dependencies": {}});
        let manifest = json!({
            "name": "my-app",
            "dependencies": {"express": "^4.18.2"},
            "devDependencies": {"jest": "^29.0.0"}
        });
        let mut map = HashMap::new();

        let payload = build(&request, &manifest, &mut map, false);
        let requires = payload["requires"].as_object().unwrap();

        assert_eq!(requires["lodash"], json!("^4.17.0"));
        assert_eq!(requires["express"], json!("^4.18.2"));
        assert_eq!(requires["jest"], json!("^29.0.0"));
    }

    #[test]
    fn test_skip_dev_drops_dev_entries() {
        let request = json!({
            "dependencies": {
                "express": {"version": "4.18.2"},
                "jest": {"version": "29.0.0", "dev": true}
            }
        });
        let manifest = json!({
            "name": "my-app",
            "dependencies": {"express": "^4.18.2"},
            "devDependencies": {"jest": "^29.0.0"}
        });
        let mut map = HashMap::new();

        let payload = build(&request, &manifest, &mut map, true);

        let dependencies = payload["dependencies"].as_object().unwrap();
        assert!(dependencies.contains_key("express"));
        assert!(!dependencies.contains_key("jest"));
        let requires = payload["requires"].as_object().unwrap();
        assert!(!requires.contains_key("jest"));
    }

    #[test]
    fn test_dependency_map_collects_transitive_versions() {
        let request = json!({
            "dependencies": {
                "express": {
                    "version": "4.18.2",
                    "dependencies": {
                        "qs": {"version": "6.5.2"}
                    }
                },
                "qs": {"version": "6.11.0"}
            }
        });
        let manifest = json!({"name": "my-app"});
        let mut map = HashMap::new();

        build(&request, &manifest, &mut map, false);

        assert_eq!(map["express"], HashSet::from(["4.18.2".to_string()]));
        assert_eq!(
            map["qs"],
            HashSet::from(["6.5.2".to_string(), "6.11.0".to_string()])
        );
    }
}
