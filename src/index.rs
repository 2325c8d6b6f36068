//! Exact nearest-neighbour index over corpus embeddings.
//!
//! A [`CorpusIndex`] binds the ordered path list to the embedding matrix in
//! one immutable value: row `i` always belongs to `paths[i]`. There is no
//! way to insert, remove or reorder rows; rebuilding yields a new index.
//!
//! # On-disk layout
//!
//! | File | Contents |
//! |------|----------|
//! | `file_paths.json` | JSON array of paths, row order |
//! | `embeddings.f32` | row-major little-endian `f32` matrix |
//! | `index.json` | [`IndexManifest`]: dims, count, model, checksums |
//!
//! [`CorpusIndex::load`] refuses to start from a partial or mismatched set.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

pub const PATHS_FILE: &str = "file_paths.json";
pub const MATRIX_FILE: &str = "embeddings.f32";
pub const MANIFEST_FILE: &str = "index.json";

/// Metadata written next to the matrix; ties the three files together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub dims: usize,
    pub count: usize,
    pub model: String,
    pub metric: String,
    pub created_at: DateTime<Utc>,
    pub paths_sha256: String,
    pub matrix_sha256: String,
}

#[derive(Debug, Clone)]
pub struct CorpusIndex {
    paths: Vec<String>,
    matrix: Vec<f32>,
    dims: usize,
}

impl CorpusIndex {
    /// Build from parallel path and embedding lists.
    ///
    /// # Errors
    ///
    /// Fails on differing lengths, an empty or inconsistent dimension, or a
    /// repeated path.
    pub fn build(paths: Vec<String>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if paths.len() != embeddings.len() {
            bail!(
                "{} paths but {} embeddings; every path needs exactly one vector",
                paths.len(),
                embeddings.len()
            );
        }

        let mut seen = HashSet::with_capacity(paths.len());
        for path in &paths {
            if !seen.insert(path.as_str()) {
                bail!("duplicate path in index: {}", path);
            }
        }

        let dims = embeddings.first().map(|e| e.len()).unwrap_or(0);
        if dims == 0 && !embeddings.is_empty() {
            bail!("embeddings must have at least one dimension");
        }

        let mut matrix = Vec::with_capacity(dims * embeddings.len());
        for (path, vector) in paths.iter().zip(&embeddings) {
            if vector.len() != dims {
                bail!(
                    "embedding for {} has {} dimensions, expected {}",
                    path,
                    vector.len(),
                    dims
                );
            }
            matrix.extend_from_slice(vector);
        }

        Ok(Self {
            paths,
            matrix,
            dims,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.len() {
            return None;
        }
        Some(&self.matrix[i * self.dims..(i + 1) * self.dims])
    }

    /// The `k` nearest rows by squared L2 distance, closest first.
    ///
    /// Equal distances keep row order. `k` larger than the index returns
    /// every row; `k == 0` or an empty index returns nothing.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        if vector.len() != self.dims {
            bail!(
                "query has {} dimensions but the index has {}",
                vector.len(),
                self.dims
            );
        }

        let mut scored: Vec<(usize, f32)> = self
            .matrix
            .chunks_exact(self.dims)
            .map(|row| squared_l2(vector, row))
            .enumerate()
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, d)| (self.paths[i].clone(), d))
            .collect())
    }

    /// Write the three index files into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path, model: &str) -> Result<IndexManifest> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

        let paths_json = serde_json::to_vec_pretty(&self.paths)?;
        let matrix_bytes = vec_to_blob(&self.matrix);

        let manifest = IndexManifest {
            dims: self.dims,
            count: self.len(),
            model: model.to_string(),
            metric: "l2".to_string(),
            created_at: Utc::now(),
            paths_sha256: sha256_hex(&paths_json),
            matrix_sha256: sha256_hex(&matrix_bytes),
        };

        write_file(&dir.join(PATHS_FILE), &paths_json)?;
        write_file(&dir.join(MATRIX_FILE), &matrix_bytes)?;
        write_file(
            &dir.join(MANIFEST_FILE),
            &serde_json::to_vec_pretty(&manifest)?,
        )?;

        Ok(manifest)
    }

    /// Read and verify an index saved by [`CorpusIndex::save`].
    pub fn load(dir: &Path) -> Result<(Self, IndexManifest)> {
        let manifest_bytes = read_file(&dir.join(MANIFEST_FILE))?;
        let paths_bytes = read_file(&dir.join(PATHS_FILE))?;
        let matrix_bytes = read_file(&dir.join(MATRIX_FILE))?;

        let manifest: IndexManifest = serde_json::from_slice(&manifest_bytes)
            .with_context(|| format!("Invalid {}", MANIFEST_FILE))?;
        let paths: Vec<String> = serde_json::from_slice(&paths_bytes)
            .with_context(|| format!("Invalid {}", PATHS_FILE))?;

        if sha256_hex(&paths_bytes) != manifest.paths_sha256 {
            bail!("{} does not match the checksum in {}", PATHS_FILE, MANIFEST_FILE);
        }
        if sha256_hex(&matrix_bytes) != manifest.matrix_sha256 {
            bail!("{} does not match the checksum in {}", MATRIX_FILE, MANIFEST_FILE);
        }
        if paths.len() != manifest.count {
            bail!(
                "{} lists {} paths but {} records {}",
                PATHS_FILE,
                paths.len(),
                MANIFEST_FILE,
                manifest.count
            );
        }
        if matrix_bytes.len() % 4 != 0 || matrix_bytes.len() / 4 != manifest.count * manifest.dims {
            bail!(
                "{} holds {} bytes, expected {} rows of {} dimensions",
                MATRIX_FILE,
                matrix_bytes.len(),
                manifest.count,
                manifest.dims
            );
        }

        let matrix = blob_to_vec(&matrix_bytes);
        let embeddings = if manifest.dims == 0 {
            Vec::new()
        } else {
            matrix
                .chunks_exact(manifest.dims)
                .map(|row| row.to_vec())
                .collect()
        };

        let index = Self::build(paths, embeddings)
            .with_context(|| format!("Corrupt index in {}", dir.display()))?;
        Ok((index, manifest))
    }
}

/// Squared Euclidean distance. Slices must have equal length.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Encode a float vector as little-endian bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`]. Trailing bytes that do not form a full `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        bail!("Index artifact missing: {}", path.display());
    }
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> CorpusIndex {
        CorpusIndex::build(
            vec!["a.py".into(), "b.py".into(), "c.py".into()],
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![3.0, 4.0]],
        )
        .unwrap()
    }

    #[test]
    fn query_orders_by_distance() {
        let hits = sample().query(&[0.9, 0.0], 3).unwrap();
        let paths: Vec<&str> = hits.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["b.py", "a.py", "c.py"]);
        assert!((hits[0].1 - 0.01).abs() < 1e-5);
    }

    #[test]
    fn every_row_finds_itself_first() {
        let index = sample();
        for (i, path) in index.paths().iter().enumerate() {
            let hits = index.query(index.row(i).unwrap(), 1).unwrap();
            assert_eq!(&hits[0].0, path);
            assert_eq!(hits[0].1, 0.0);
        }
    }

    #[test]
    fn query_truncates_to_index_size() {
        assert_eq!(sample().query(&[0.0, 0.0], 10).unwrap().len(), 3);
        assert!(sample().query(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn ties_keep_row_order() {
        let index = CorpusIndex::build(
            vec!["z.py".into(), "y.py".into(), "x.py".into()],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0]],
        )
        .unwrap();
        let hits = index.query(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].0, "z.py");
        assert_eq!(hits[1].0, "y.py");
    }

    #[test]
    fn query_rejects_wrong_dimension() {
        assert!(sample().query(&[1.0, 2.0, 3.0], 1).is_err());
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = CorpusIndex::build(Vec::new(), Vec::new()).unwrap();
        assert!(index.query(&[1.0], 3).unwrap().is_empty());
    }

    #[test]
    fn build_rejects_mismatches() {
        assert!(CorpusIndex::build(vec!["a".into()], vec![]).is_err());
        assert!(CorpusIndex::build(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 2.0], vec![1.0]]
        )
        .is_err());
        assert!(CorpusIndex::build(
            vec!["a".into(), "a".into()],
            vec![vec![1.0], vec![2.0]]
        )
        .is_err());
        assert!(CorpusIndex::build(vec!["a".into()], vec![vec![]]).is_err());
    }

    #[test]
    fn save_and_load_preserve_rows() {
        let tmp = TempDir::new().unwrap();
        let index = sample();
        let manifest = index.save(tmp.path(), "test-model").unwrap();
        assert_eq!(manifest.count, 3);
        assert_eq!(manifest.metric, "l2");

        let (loaded, manifest) = CorpusIndex::load(tmp.path()).unwrap();
        assert_eq!(manifest.model, "test-model");
        assert_eq!(loaded.paths(), index.paths());
        assert_eq!(loaded.row(2).unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn load_fails_when_an_artifact_is_missing() {
        for file in [PATHS_FILE, MATRIX_FILE, MANIFEST_FILE] {
            let tmp = TempDir::new().unwrap();
            sample().save(tmp.path(), "m").unwrap();
            std::fs::remove_file(tmp.path().join(file)).unwrap();
            let err = CorpusIndex::load(tmp.path()).unwrap_err();
            assert!(err.to_string().contains(file), "{}", err);
        }
    }

    #[test]
    fn load_detects_edited_path_list() {
        let tmp = TempDir::new().unwrap();
        sample().save(tmp.path(), "m").unwrap();
        std::fs::write(
            tmp.path().join(PATHS_FILE),
            r#"["c.py", "b.py", "a.py"]"#,
        )
        .unwrap();
        let err = CorpusIndex::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains(PATHS_FILE));
    }

    #[test]
    fn blob_round_trip() {
        let v = vec![0.5, -1.25, 3.0e-7];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }
}
