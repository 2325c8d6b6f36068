//! Corpus files on disk: batch normalization, loading, and content lookup.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::CodeFile;
use crate::normalize::normalize;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

pub(crate) fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Every regular file under `root` as `(absolute path, relative path)`,
/// relative paths using `/`, sorted, VCS and build directories skipped.
pub(crate) fn walk_files(root: &Path) -> Result<Vec<(PathBuf, String)>> {
    let excludes = build_globset(DEFAULT_EXCLUDES)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if excludes.is_match(&rel_str) {
            continue;
        }

        files.push((path.to_path_buf(), rel_str));
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Counters reported by [`process_corpus`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessStats {
    pub processed: usize,
    pub empty: usize,
    pub unreadable: usize,
}

/// Normalize every file under `input_dir` into the same relative path
/// under `output_dir`. Files that normalize to nothing are not written.
pub fn process_corpus(input_dir: &Path, output_dir: &Path) -> Result<ProcessStats> {
    if !input_dir.is_dir() {
        bail!("Input directory does not exist: {}", input_dir.display());
    }

    let mut stats = ProcessStats::default();

    for (path, relative) in walk_files(input_dir)? {
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(file = %relative, error = %e, "skipping unreadable file");
                stats.unreadable += 1;
                continue;
            }
        };

        let normalized = normalize(&content);
        if normalized.is_empty() {
            tracing::debug!(file = %relative, "empty after normalization");
            stats.empty += 1;
            continue;
        }

        let target = output_dir.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&target, normalized)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        stats.processed += 1;
    }

    Ok(stats)
}

/// Load every file under `dir` whose normalized text is non-empty, sorted by
/// relative path.
///
/// Unreadable files are logged and skipped.
pub fn load_code_files(dir: &Path) -> Result<Vec<CodeFile>> {
    if !dir.is_dir() {
        bail!("Corpus directory does not exist: {}", dir.display());
    }

    let mut files = Vec::new();
    for (path, relative) in walk_files(dir)? {
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let file = CodeFile::new(relative, content);
                if !file.normalized.is_empty() {
                    files.push(file);
                }
            }
            Err(e) => tracing::warn!(file = %relative, error = %e, "skipping unreadable file"),
        }
    }
    Ok(files)
}

/// One way of turning an indexed path into a file on disk.
#[derive(Debug, Clone)]
pub enum Resolver {
    /// The path as given, relative to the working directory or absolute.
    Exact,
    /// `root.join(path)`.
    UnderRoot(PathBuf),
    /// First file under `root` with the same file name.
    Basename(PathBuf),
    /// As [`Resolver::Basename`], ignoring ASCII case.
    BasenameIgnoreCase(PathBuf),
}

impl Resolver {
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        match self {
            Resolver::Exact => Some(PathBuf::from(path)).filter(|p| p.is_file()),
            Resolver::UnderRoot(root) => Some(root.join(path)).filter(|p| p.is_file()),
            Resolver::Basename(root) => {
                let name = file_name(path)?;
                find_by_name(root, |candidate| candidate == name)
            }
            Resolver::BasenameIgnoreCase(root) => {
                let name = file_name(path)?;
                find_by_name(root, |candidate| candidate.eq_ignore_ascii_case(name))
            }
        }
    }
}

fn file_name(path: &str) -> Option<&str> {
    path.rsplit(['/', '\\']).next().filter(|n| !n.is_empty())
}

fn find_by_name(root: &Path, matches: impl Fn(&str) -> bool) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .find(|e| matches(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
}

/// Looks up reference-file content for search hits.
#[derive(Debug, Clone)]
pub struct ContentStore {
    resolvers: Vec<Resolver>,
}

impl ContentStore {
    pub fn new(resolvers: Vec<Resolver>) -> Self {
        Self { resolvers }
    }

    /// Exact path, then each extra root, then a file-name search of the
    /// processed corpus (case-sensitive first).
    pub fn for_corpus(processed_dir: &Path, extra_roots: &[PathBuf]) -> Self {
        let mut resolvers = vec![Resolver::Exact];
        resolvers.extend(extra_roots.iter().cloned().map(Resolver::UnderRoot));
        resolvers.push(Resolver::UnderRoot(processed_dir.to_path_buf()));
        resolvers.push(Resolver::Basename(processed_dir.to_path_buf()));
        resolvers.push(Resolver::BasenameIgnoreCase(processed_dir.to_path_buf()));
        Self { resolvers }
    }

    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        self.resolvers.iter().find_map(|r| r.resolve(path))
    }

    /// The file's content, or `[Error: File not found: <path>]`.
    pub fn read(&self, path: &str) -> String {
        match self.resolve(path) {
            Some(found) => std::fs::read_to_string(&found).unwrap_or_else(|e| {
                tracing::warn!(file = %found.display(), error = %e, "failed to read reference file");
                format!("[Error: Could not read file: {}]", path)
            }),
            None => {
                tracing::warn!(file = %path, "reference file not found");
                format!("[Error: File not found: {}]", path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn process_writes_normalized_and_skips_empty() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("raw");
        let output = tmp.path().join("processed");
        write(&input, "a.py", "import os\n# hi\nprint(1)\n");
        write(&input, "sub/b.c", "/* only a comment */\n");
        write(&input, ".git/config", "ignored");

        let stats = process_corpus(&input, &output).unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.empty, 1);
        assert_eq!(
            std::fs::read_to_string(output.join("a.py")).unwrap(),
            "print(1)"
        );
        assert!(!output.join("sub/b.c").exists());
        assert!(!output.join(".git").exists());
    }

    #[test]
    fn process_counts_non_utf8_files() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("raw");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("bin.dat"), [0xff, 0xfe, 0x00]).unwrap();
        let stats = process_corpus(&input, &tmp.path().join("out")).unwrap();
        assert_eq!(stats.unreadable, 1);
    }

    #[test]
    fn load_is_sorted_and_skips_empty() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "z.py", "z = 1");
        write(tmp.path(), "a/b.py", "b = 1");
        write(tmp.path(), "empty.py", "  \n");

        let files = load_code_files(tmp.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a/b.py", "z.py"]);
    }

    #[test]
    fn resolution_order() {
        let tmp = TempDir::new().unwrap();
        let processed = tmp.path().join("processed");
        let extra = tmp.path().join("extra");
        write(&processed, "deep/Found.py", "by basename");
        write(&processed, "nested/lower.py", "by case");
        write(&extra, "x/y.py", "under root");

        let store = ContentStore::for_corpus(&processed, &[extra.clone()]);
        assert_eq!(store.read("x/y.py"), "under root");
        assert_eq!(store.read("old/location/Found.py"), "by basename");
        assert_eq!(store.read("LOWER.PY"), "by case");
        assert_eq!(
            store.read("missing.py"),
            "[Error: File not found: missing.py]"
        );

        let exact = extra.join("x/y.py");
        assert_eq!(store.resolve(exact.to_str().unwrap()), Some(exact));
    }

    #[test]
    fn exact_match_wins_over_basename() {
        let tmp = TempDir::new().unwrap();
        let processed = tmp.path().join("processed");
        write(&processed, "a.py", "processed copy");
        write(tmp.path(), "elsewhere/a.py", "exact copy");

        let store = ContentStore::for_corpus(&processed, &[]);
        let exact = tmp.path().join("elsewhere/a.py");
        assert_eq!(store.read(exact.to_str().unwrap()), "exact copy");
    }
}
