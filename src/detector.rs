use std::path::Path;

use crate::models::Dependency;

/// Directories never descended into while looking for lockfiles.
const SKIPPED_DIRS: &[&str] = &["node_modules", "bower_components"];

/// Depth cap for the lockfile walk; deeper trees are almost certainly not
/// hand-authored workspaces.
const MAX_DEPTH: usize = 24;

/// Locate `yarn.lock` files under `path`, one [`Dependency`] per lockfile.
///
/// Skips `node_modules` and hidden directories. Results are sorted by path so
/// scans are deterministic across runs.
pub fn find_lockfiles(path: &Path) -> Vec<Dependency> {
    let mut found = Vec::new();
    walk(path, path, 0, &mut found);
    found.sort_by(|a, b| a.lockfile.cmp(&b.lockfile));
    found
}

fn walk(scan_root: &Path, dir: &Path, depth: usize, found: &mut Vec<Dependency>) {
    if depth > MAX_DEPTH {
        return;
    }

    let lockfile = dir.join("yarn.lock");
    if lockfile.is_file() {
        found.push(Dependency::from_lockfile(lockfile, scan_root));
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let child = entry.path();
        if !child.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()) {
            continue;
        }
        walk(scan_root, &child, depth + 1, found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_finds_nested_lockfiles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("yarn.lock"), "# yarn lockfile v1\n").unwrap();
        fs::create_dir_all(dir.path().join("packages/app")).unwrap();
        fs::write(
            dir.path().join("packages/app/yarn.lock"),
            "# yarn lockfile v1\n",
        )
        .unwrap();

        let deps = find_lockfiles(dir.path());
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].display_name, "yarn.lock");
        assert_eq!(deps[1].display_name, "packages/app/yarn.lock");
    }

    #[test]
    fn test_skips_node_modules_and_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/left-pad")).unwrap();
        fs::write(
            dir.path().join("node_modules/left-pad/yarn.lock"),
            "# yarn lockfile v1\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/yarn.lock"), "").unwrap();

        let deps = find_lockfiles(dir.path());
        assert!(deps.is_empty());
    }
}
