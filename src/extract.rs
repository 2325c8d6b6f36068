//! Flatten code files from several repositories into one directory.
//!
//! Every kept file lands directly in the target directory. Name collisions
//! get a numeric suffix: `main.py`, `main_1.py`, `main_2.py`, ...

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::corpus::walk_files;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractStats {
    pub repositories: usize,
    pub files_copied: usize,
    pub repositories_missing: usize,
}

/// Copy files with a matching extension from each repository under
/// `repos_dir` into `target_dir`.
///
/// `repos` names sub-directories of `repos_dir`; an empty list means every
/// sub-directory. `extensions` are compared case-insensitively and may be
/// given with or without the leading dot.
pub fn flatten_repositories(
    repos_dir: &Path,
    repos: &[String],
    extensions: &[String],
    target_dir: &Path,
) -> Result<ExtractStats> {
    if !repos_dir.is_dir() {
        bail!("Repository directory does not exist: {}", repos_dir.display());
    }
    std::fs::create_dir_all(target_dir)
        .with_context(|| format!("Failed to create {}", target_dir.display()))?;

    let extensions: HashSet<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let repo_names: Vec<String> = if repos.is_empty() {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(repos_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        names
    } else {
        repos.to_vec()
    };

    let mut stats = ExtractStats::default();
    let mut used = HashSet::new();

    for name in &repo_names {
        let repo_path = repos_dir.join(name);
        if !repo_path.is_dir() {
            tracing::warn!(repo = %name, "repository not found, skipping");
            stats.repositories_missing += 1;
            continue;
        }

        let mut copied = 0;
        for (path, _) in walk_files(&repo_path)? {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !extensions.contains(&ext) {
                continue;
            }

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let unique = unique_name(&file_name, target_dir, &mut used);
            std::fs::copy(&path, target_dir.join(&unique))
                .with_context(|| format!("Failed to copy {}", path.display()))?;
            copied += 1;
        }

        tracing::info!(repo = %name, files = copied, "repository flattened");
        stats.files_copied += copied;
        stats.repositories += 1;
    }

    Ok(stats)
}

/// First of `name`, `stem_1.ext`, `stem_2.ext`, ... not yet taken in this run
/// or on disk. Records the choice in `used`.
fn unique_name(name: &str, target_dir: &Path, used: &mut HashSet<String>) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };

    let mut candidate = name.to_string();
    let mut counter = 1;
    while used.contains(&candidate) || target_dir.join(&candidate).exists() {
        candidate = format!("{}_{}{}", stem, counter, ext);
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, rel).unwrap();
    }

    fn exts() -> Vec<String> {
        vec![".py".to_string(), "java".to_string()]
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let tmp = TempDir::new().unwrap();
        let repos = tmp.path().join("repos");
        let out = tmp.path().join("out");
        write(&repos, "one/main.py");
        write(&repos, "one/pkg/main.py");
        write(&repos, "two/main.py");

        let stats = flatten_repositories(&repos, &[], &exts(), &out).unwrap();
        assert_eq!(stats.files_copied, 3);
        assert_eq!(stats.repositories, 2);
        assert!(out.join("main.py").exists());
        assert!(out.join("main_1.py").exists());
        assert!(out.join("main_2.py").exists());
    }

    #[test]
    fn filters_by_extension_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        let repos = tmp.path().join("repos");
        let out = tmp.path().join("out");
        write(&repos, "r/App.JAVA");
        write(&repos, "r/notes.txt");
        write(&repos, "r/.git/hooks/x.py");

        let stats = flatten_repositories(&repos, &[], &exts(), &out).unwrap();
        assert_eq!(stats.files_copied, 1);
        assert!(out.join("App.JAVA").exists());
    }

    #[test]
    fn missing_repository_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let repos = tmp.path().join("repos");
        write(&repos, "real/a.py");

        let stats = flatten_repositories(
            &repos,
            &["real".to_string(), "ghost".to_string()],
            &exts(),
            &tmp.path().join("out"),
        )
        .unwrap();
        assert_eq!(stats.repositories, 1);
        assert_eq!(stats.repositories_missing, 1);
    }

    #[test]
    fn existing_files_are_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        let repos = tmp.path().join("repos");
        let out = tmp.path().join("out");
        write(&repos, "r/a.py");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("a.py"), "already here").unwrap();

        flatten_repositories(&repos, &[], &exts(), &out).unwrap();
        assert_eq!(std::fs::read_to_string(out.join("a.py")).unwrap(), "already here");
        assert!(out.join("a_1.py").exists());
    }

    #[test]
    fn missing_repos_dir_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(flatten_repositories(&tmp.path().join("nope"), &[], &exts(), tmp.path()).is_err());
    }
}
