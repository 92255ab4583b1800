//! Project identity.
//!
//! A project is identified by hashing the location of its root: the nearest
//! enclosing version-control root, else the nearest directory holding a manifest
//! file, else the starting directory itself.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Files whose presence marks a directory as a project root when no `.git` is found.
const MANIFEST_FILES: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "composer.json",
    "Gemfile",
    "setup.py",
    "requirements.txt",
];

/// Number of hex characters kept from the SHA-256 digest.
pub const PROJECT_ID_LEN: usize = 16;

/// Walk upward from `start` and return the project root.
pub fn resolve_project_root(start: &Path) -> PathBuf {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());

    if let Some(root) = start.ancestors().find(|dir| dir.join(".git").exists()) {
        return root.to_path_buf();
    }

    if let Some(root) = start
        .ancestors()
        .find(|dir| MANIFEST_FILES.iter().any(|m| dir.join(m).is_file()))
    {
        return root.to_path_buf();
    }

    start
}

/// Hash a project root path into a fixed-width hex identifier.
pub fn hash_path(root: &Path) -> String {
    let digest = Sha256::digest(root.to_string_lossy().as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(PROJECT_ID_LEN);
    id
}

/// Project identifier for the project containing `dir`.
pub fn project_id(dir: &Path) -> String {
    let root = resolve_project_root(dir);
    let id = hash_path(&root);
    tracing::debug!(root = %root.display(), project = %id, "resolved project");
    id
}

/// Project identifier for the current working directory.
pub fn current_project_id() -> std::io::Result<String> {
    Ok(project_id(&std::env::current_dir()?))
}
