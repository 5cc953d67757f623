//! Append-only security audit trail.
//!
//! Every access decision and lifecycle event lands here. Entries are kept in
//! memory (bounded), mirrored to `tracing` under the `audit` target, and
//! optionally appended as JSON lines to an audit file that survives restarts
//! and storage resets.

use crate::error::{PipelineError, Result, ResultExt as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufRead as _, BufReader, ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Entries kept in memory; the audit file keeps everything.
pub const MAX_ENTRIES: usize = 1000;

/// Subsystem that produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Access,
    Source,
    Ingestion,
    Processing,
    Archive,
    Resilience,
    Attack,
    Retrieval,
    System,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "ACCESS",
            Self::Source => "SOURCE",
            Self::Ingestion => "INGESTION",
            Self::Processing => "PROCESSING",
            Self::Archive => "ARCHIVE",
            Self::Resilience => "RESILIENCE",
            Self::Attack => "ATTACK",
            Self::Retrieval => "RETRIEVAL",
            Self::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Result of the audited decision or operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Access decision allowed the action
    Granted,
    /// Identity authenticated but lacks the permission
    Denied,
    /// Identity unknown or carries the deny-all role
    Unauthenticated,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub component: Component,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl AuditEntry {
    pub fn new(component: Component, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            component,
            severity,
            message: message.into(),
            identity: None,
            action: None,
            outcome: None,
        }
    }

    #[must_use]
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    #[must_use]
    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.component.as_str(),
            self.severity.as_str(),
            self.message
        )
    }
}

#[derive(Debug, Default)]
struct AuditState {
    entries: VecDeque<AuditEntry>,
    file: Option<PathBuf>,
}

/// Shared handle to the audit trail. Clones write to the same trail.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    state: Arc<Mutex<AuditState>>,
}

impl AuditLog {
    /// In-memory trail only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trail that also appends every entry to `path` as a JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn with_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit directory {}", parent.display()))?;
        }

        Ok(Self {
            state: Arc::new(Mutex::new(AuditState {
                entries: VecDeque::new(),
                file: Some(path),
            })),
        })
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.state.lock().ok().and_then(|state| state.file.clone())
    }

    /// Append an entry. Recording never fails the caller: a broken audit
    /// file is reported through `tracing` and the in-memory trail still grows.
    pub fn record(&self, entry: AuditEntry) {
        emit(&entry);

        let Ok(mut state) = self.state.lock() else {
            tracing::error!("Audit trail lock poisoned; dropping entry: {entry}");
            return;
        };

        if let Some(path) = &state.file
            && let Err(e) = append_line(path, &entry)
        {
            tracing::error!("Failed to append to audit file {}: {e}", path.display());
        }

        state.entries.push_back(entry);
        while state.entries.len() > MAX_ENTRIES {
            state.entries.pop_front();
        }
    }

    pub fn info(&self, component: Component, message: impl Into<String>) {
        self.record(AuditEntry::new(component, Severity::Info, message));
    }

    pub fn warning(&self, component: Component, message: impl Into<String>) {
        self.record(AuditEntry::new(component, Severity::Warning, message));
    }

    pub fn error(&self, component: Component, message: impl Into<String>) {
        self.record(AuditEntry::new(component, Severity::Error, message));
    }

    pub fn critical(&self, component: Component, message: impl Into<String>) {
        self.record(AuditEntry::new(component, Severity::Critical, message));
    }

    /// Snapshot of the in-memory trail, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.state
            .lock()
            .map(|state| state.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn emit(entry: &AuditEntry) {
    let component = entry.component.as_str();
    let identity = entry.identity.as_deref().unwrap_or("-");
    match entry.severity {
        Severity::Info => tracing::info!(target: "audit", component, identity, "{}", entry.message),
        Severity::Warning => tracing::warn!(target: "audit", component, identity, "{}", entry.message),
        Severity::Error | Severity::Critical => {
            tracing::error!(target: "audit", component, identity, severity = entry.severity.as_str(), "{}", entry.message);
        }
    }
}

fn append_line(path: &Path, entry: &AuditEntry) -> Result<()> {
    let line = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Read a persisted audit file. Unparseable lines are skipped with a warning.
///
/// # Errors
///
/// [`PipelineError::ResourceMissing`] if the file does not exist.
pub fn load_jsonl(path: &Path) -> Result<Vec<AuditEntry>> {
    let file = fs::File::open(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            PipelineError::ResourceMissing(format!("Audit file not found at {}", path.display()))
        } else {
            PipelineError::Io(e)
        }
    })?;

    let mut entries = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!("Skipping malformed audit line {}: {e}", number + 1),
        }
    }
    Ok(entries)
}
