//! Decision recorder: append-only audit log plus a "latest" record per request.
//!
//! Filesystem layout of [`JsonlRecorder`]:
//! - `{dir}/audit.jsonl`: one JSON `Decision` per line, never rewritten
//! - `{dir}/latest/{fingerprint}.json`: most recent decision for a request
//!
//! A run lands whole or not at all. The latest record is staged in a temp file
//! first, the audit line is appended in a single write, and only then is the
//! temp file renamed into place. If the append fails the temp file is removed;
//! if the rename fails the audit log is truncated back to its previous length.
//! A torn last line left by an interrupted writer is terminated before the next
//! entry so it cannot swallow it.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use reconcile_core::domain::{Decision, RequestFingerprint, RequestIdentity};

/// Errors from persisting or reading decisions.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialize decision: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt decision record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("recorder state poisoned by a panicked writer")]
    Poisoned,
}

/// Non-fatal persistence failure attached to an otherwise valid outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceWarning {
    pub fingerprint: RequestFingerprint,
    pub message: String,
}

impl PersistenceWarning {
    pub fn new(fingerprint: RequestFingerprint, error: &PersistenceError) -> Self {
        Self {
            fingerprint,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for PersistenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "decision {} not persisted: {}", self.fingerprint, self.message)
    }
}

/// Storage for reconciliation decisions.
pub trait DecisionRecorder: Send + Sync {
    /// Persist one run: an audit entry and the latest record for its request.
    fn record(&self, decision: &Decision) -> Result<(), PersistenceError>;

    /// Most recent decision recorded for `request`.
    fn latest(&self, request: &RequestIdentity) -> Result<Option<Decision>, PersistenceError>;

    /// Every audit entry, oldest first.
    fn read_audit(&self) -> Result<Vec<Decision>, PersistenceError>;
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// JSONL audit log and per-request JSON files under one directory.
///
/// Clones share one write lock, so audit rollback never cuts into another
/// writer's entry from the same process.
#[derive(Debug, Clone)]
pub struct JsonlRecorder {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonlRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn audit_path(&self) -> PathBuf {
        self.dir.join("audit.jsonl")
    }

    pub fn latest_dir(&self) -> PathBuf {
        self.dir.join("latest")
    }

    pub fn latest_path(&self, fingerprint: &RequestFingerprint) -> PathBuf {
        self.latest_dir().join(format!("{fingerprint}.json"))
    }

    /// Append one line in a single write and return the log length before it.
    fn append_audit(&self, line: &str) -> Result<u64, PersistenceError> {
        let path = self.audit_path();
        let append = || -> io::Result<u64> {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&path)?;
            let prev_len = file.metadata()?.len();

            let mut buf = Vec::with_capacity(line.len() + 1);
            if prev_len > 0 {
                let mut last = [0u8; 1];
                file.seek(SeekFrom::End(-1))?;
                file.read_exact(&mut last)?;
                if last[0] != b'\n' {
                    tracing::warn!(path = %path.display(), "audit log ends mid-line, terminating it");
                    buf.push(b'\n');
                }
            }
            buf.extend_from_slice(line.as_bytes());
            file.write_all(&buf)?;
            file.flush()?;
            Ok(prev_len)
        };
        append().map_err(|source| PersistenceError::Write {
            path: path.clone(),
            source,
        })
    }

    fn truncate_audit(&self, len: u64) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .open(self.audit_path())?
            .set_len(len)
    }
}

impl DecisionRecorder for JsonlRecorder {
    fn record(&self, decision: &Decision) -> Result<(), PersistenceError> {
        let latest_dir = self.latest_dir();
        fs::create_dir_all(&latest_dir).map_err(|source| PersistenceError::CreateDir {
            path: latest_dir.clone(),
            source,
        })?;

        let mut line = serde_json::to_string(decision)?;
        line.push('\n');
        let body = serde_json::to_string_pretty(decision)?;

        let final_path = self.latest_path(&decision.fingerprint);
        let tmp_path = latest_dir.join(format!(
            "{}.{}-{}.tmp",
            decision.fingerprint,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp_path, body).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            PersistenceError::Write {
                path: tmp_path.clone(),
                source,
            }
        })?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| PersistenceError::Poisoned)?;

        let prev_len = match self.append_audit(&line) {
            Ok(len) => len,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        // Atomic rename
        if let Err(source) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            if let Err(e) = self.truncate_audit(prev_len) {
                tracing::error!(error = %e, "failed to roll back audit entry");
            }
            return Err(PersistenceError::Write {
                path: final_path,
                source,
            });
        }

        tracing::debug!(
            fingerprint = %decision.fingerprint,
            path = %final_path.display(),
            "decision recorded"
        );
        Ok(())
    }

    fn latest(&self, request: &RequestIdentity) -> Result<Option<Decision>, PersistenceError> {
        let path = self.latest_path(&request.fingerprint());
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistenceError::Read { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| PersistenceError::Corrupt { path, source })
    }

    /// Skips malformed lines (logged, not fatal).
    fn read_audit(&self) -> Result<Vec<Decision>, PersistenceError> {
        let path = self.audit_path();
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(PersistenceError::Read { path, source }),
        };

        let mut entries = Vec::new();
        for (n, line) in io::BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| PersistenceError::Read {
                path: path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Decision>(&line) {
                Ok(decision) => entries.push(decision),
                Err(e) => {
                    tracing::warn!(line = n + 1, error = %e, "skipping malformed audit entry");
                }
            }
        }
        Ok(entries)
    }
}

/// In-process recorder for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    audit: Mutex<Vec<Decision>>,
    latest: Mutex<BTreeMap<RequestFingerprint, Decision>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audit entries recorded so far.
    pub fn len(&self) -> usize {
        self.audit.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecisionRecorder for MemoryRecorder {
    fn record(&self, decision: &Decision) -> Result<(), PersistenceError> {
        let mut audit = self.audit.lock().map_err(|_| PersistenceError::Poisoned)?;
        let mut latest = self.latest.lock().map_err(|_| PersistenceError::Poisoned)?;
        audit.push(decision.clone());
        latest.insert(decision.fingerprint.clone(), decision.clone());
        Ok(())
    }

    fn latest(&self, request: &RequestIdentity) -> Result<Option<Decision>, PersistenceError> {
        let latest = self.latest.lock().map_err(|_| PersistenceError::Poisoned)?;
        Ok(latest.get(&request.fingerprint()).cloned())
    }

    fn read_audit(&self) -> Result<Vec<Decision>, PersistenceError> {
        let audit = self.audit.lock().map_err(|_| PersistenceError::Poisoned)?;
        Ok(audit.clone())
    }
}
