use badi_sdk::errors::EngineError;
use std::path::{Component, Path, PathBuf};

use crate::config::expand_path;

/// RootGuard confines filesystem capabilities to a set of allowed roots.
///
/// It keeps a deny list of sensitive names and checks paths twice, before
/// and after canonicalization, so a symlink cannot smuggle a denied target
/// past the first check.
///
/// # Validation gates
///
/// 1. `~` expansion and deny list check on the path as written
/// 2. Resolution: canonicalize the path, or its nearest existing ancestor
///    when the path does not exist yet (an archive folder about to be created)
/// 3. Deny list check on the resolved path
/// 4. The resolved path must lie under at least one allowed root
#[derive(Debug, Clone)]
pub struct RootGuard {
    roots: Vec<PathBuf>,
    deny_list: Vec<PathBuf>,
}

impl RootGuard {
    /// Creates a guard over `roots`.
    ///
    /// Roots are expanded and canonicalized when they exist; a root that does
    /// not exist is kept as written so it can still match once created.
    pub fn new(roots: &[PathBuf]) -> Result<Self, EngineError> {
        let roots = roots
            .iter()
            .map(|root| {
                let expanded = expand_path(root)?;
                Ok(expanded.canonicalize().unwrap_or(expanded))
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        let deny_list = vec![
            PathBuf::from(".ssh"),
            PathBuf::from(".env"),
            PathBuf::from(".aws/credentials"),
            PathBuf::from(".config/gcloud"),
            PathBuf::from("id_rsa"),
            PathBuf::from("id_ed25519"),
            PathBuf::from(".gnupg"),
            PathBuf::from(".kube/config"),
            PathBuf::from(".badi"),
        ];

        Ok(Self { roots, deny_list })
    }

    /// Validates `path` and returns its resolved absolute form.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::PathDenied` if the path matches the deny list.
    /// Returns `EngineError::PathCanonicalization` if the path cannot be resolved.
    /// Returns `EngineError::PathOutsideRoots` if no allowed root contains it.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, EngineError> {
        let expanded = expand_path(path)?;

        // Gate 1
        if self.is_denied(&expanded) {
            return Err(EngineError::PathDenied(expanded));
        }

        // Gate 2
        let resolved = resolve(&expanded)?;

        // Gate 3
        if self.is_denied(&resolved) {
            return Err(EngineError::PathDenied(resolved));
        }

        // Gate 4
        if !self.roots.iter().any(|root| resolved.starts_with(root)) {
            return Err(EngineError::PathOutsideRoots(resolved));
        }

        Ok(resolved)
    }

    /// Checks if any component sequence of `path` matches the deny list.
    fn is_denied(&self, path: &Path) -> bool {
        self.deny_list.iter().any(|denied| {
            path.ends_with(denied)
                || path
                    .components()
                    .any(|c| c.as_os_str() == denied.as_os_str())
        })
    }

    /// Returns the resolved allowed roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

/// Canonicalize `path`, falling back to its nearest existing ancestor.
///
/// The non-existent tail is appended as written and may not contain `..`.
fn resolve(path: &Path) -> Result<PathBuf, EngineError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| EngineError::PathCanonicalization(path.to_path_buf(), e.to_string()))?
            .join(path)
    };

    if let Ok(canonical) = absolute.canonicalize() {
        return Ok(canonical);
    }

    let mut tail = Vec::new();
    let mut cursor = absolute.as_path();
    loop {
        if let Ok(base) = cursor.canonicalize() {
            let mut resolved = base;
            for component in tail.iter().rev() {
                resolved.push(component);
            }
            return Ok(resolved);
        }

        if matches!(cursor.components().next_back(), Some(Component::ParentDir)) {
            return Err(EngineError::PathCanonicalization(
                path.to_path_buf(),
                "'..' in a path that does not exist".to_string(),
            ));
        }
        let Some(name) = cursor.file_name() else {
            return Err(EngineError::PathCanonicalization(
                path.to_path_buf(),
                "no existing ancestor".to_string(),
            ));
        };
        tail.push(name.to_os_string());

        cursor = match cursor.parent() {
            Some(parent) => parent,
            None => {
                return Err(EngineError::PathCanonicalization(
                    path.to_path_buf(),
                    "no existing ancestor".to_string(),
                ))
            }
        };
    }
}
