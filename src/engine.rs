use std::sync::Mutex;

use crate::models::Dependency;

/// Holds the dependency set for one scanning run.
///
/// The set is shared across concurrent analyses; the only mutation the
/// analyzer performs is removing a lockfile entry whose display alias equals
/// its raw file name, which would otherwise be reported twice.
pub struct Engine {
    dependencies: Mutex<Vec<Dependency>>,
}

impl Engine {
    pub fn new(dependencies: Vec<Dependency>) -> Self {
        Engine {
            dependencies: Mutex::new(dependencies),
        }
    }

    /// Snapshot of the current dependency set.
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.lock().clone()
    }

    pub fn dependency_count(&self) -> usize {
        self.lock().len()
    }

    /// Remove a dependency from the set, keyed by lockfile path.
    pub fn remove_dependency(&self, dependency: &Dependency) {
        self.lock()
            .retain(|d| d.lockfile != dependency.lockfile);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Dependency>> {
        self.dependencies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn dep(path: &str) -> Dependency {
        Dependency::from_lockfile(PathBuf::from(path), Path::new("/project"))
    }

    #[test]
    fn test_remove_dependency() {
        let engine = Engine::new(vec![dep("/project/yarn.lock"), dep("/project/a/yarn.lock")]);
        assert_eq!(engine.dependency_count(), 2);

        let root = dep("/project/yarn.lock");
        engine.remove_dependency(&root);

        assert_eq!(engine.dependency_count(), 1);
        assert_eq!(
            engine.dependencies()[0].lockfile,
            PathBuf::from("/project/a/yarn.lock")
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let engine = Engine::new(vec![dep("/project/yarn.lock")]);
        let root = dep("/project/yarn.lock");
        engine.remove_dependency(&root);
        engine.remove_dependency(&root);
        assert_eq!(engine.dependency_count(), 0);
    }
}
