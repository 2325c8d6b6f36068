//! Index build progress reporting.
//!
//! Reports observable progress during `copyscan index build` so users see how
//! many files were found, how many are embedded, and when the index is
//! written. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts.

use std::io::Write;

/// A single progress event for an index build.
#[derive(Clone, Debug, PartialEq)]
pub enum BuildProgressEvent {
    /// Corpus files loaded from the processed directory.
    Loaded { files: u64 },
    /// n files embedded out of total (zero-filled ones included).
    Embedding { n: u64, total: u64 },
    /// Index artifacts written.
    Saved { rows: u64 },
}

/// Reports build progress. Implementations write to stderr (human or JSON).
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "index  embedding  1,234 / 5,000 files".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Loaded { files } => {
                format!("index  loaded  {} files\n", format_number(*files))
            }
            BuildProgressEvent::Embedding { n, total } => format!(
                "index  embedding  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
            BuildProgressEvent::Saved { rows } => {
                format!("index  saved  {} rows\n", format_number(*rows))
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        let obj = match &event {
            BuildProgressEvent::Loaded { files } => serde_json::json!({
                "event": "progress",
                "phase": "loaded",
                "files": files
            }),
            BuildProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total
            }),
            BuildProgressEvent::Saved { rows } => serde_json::json!({
                "event": "progress",
                "phase": "saved",
                "rows": rows
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(123456), "123,456");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
