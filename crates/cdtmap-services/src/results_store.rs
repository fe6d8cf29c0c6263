use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use cdtmap_core::{
    AccuracyVerdict, CdtMapError, ConsistencyVerdict, Result, ResultsSnapshot, StoreSummary,
    TestCaseStatus,
};
use chrono::{DateTime, Utc};

/// How the persisted file looked when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded(usize),
    Missing,
    /// Unreadable or unparseable; the store started empty.
    Corrupt(String),
}

/// File-backed memo of which test cases last passed accuracy and consistency.
///
/// Mutations stay in memory until [`save`](Self::save), which replaces the
/// whole file atomically.
pub struct ResultStore {
    path: PathBuf,
    snapshot: ResultsSnapshot,
}

impl ResultStore {
    /// Open the store at `path`. Never fails: a missing or corrupt file
    /// yields an empty snapshot and is reported through [`LoadStatus`].
    pub fn open(path: impl Into<PathBuf>) -> (Self, LoadStatus) {
        let mut store = Self {
            path: path.into(),
            snapshot: ResultsSnapshot::default(),
        };
        let status = store.load();
        (store, status)
    }

    /// Re-read the file, discarding unsaved changes.
    pub fn load(&mut self) -> LoadStatus {
        let (snapshot, status) = read_snapshot(&self.path);
        self.snapshot = snapshot;
        status
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &ResultsSnapshot {
        &self.snapshot
    }

    pub fn summary(&self) -> &StoreSummary {
        &self.snapshot.summary
    }

    pub fn statuses(&self) -> &BTreeMap<String, TestCaseStatus> {
        &self.snapshot.test_cases
    }

    pub fn status(&self, test_name: &str) -> Option<&TestCaseStatus> {
        self.snapshot.test_cases.get(test_name)
    }

    /// Record the latest verdicts for a case, stamped with the current time.
    pub fn update(
        &mut self,
        test_name: &str,
        accuracy: &AccuracyVerdict,
        consistency: &ConsistencyVerdict,
    ) {
        self.update_at(test_name, accuracy, consistency, Utc::now());
    }

    pub fn update_at(
        &mut self,
        test_name: &str,
        accuracy: &AccuracyVerdict,
        consistency: &ConsistencyVerdict,
        tested_at: DateTime<Utc>,
    ) {
        let status = TestCaseStatus::from_verdicts(accuracy, consistency, tested_at);
        tracing::debug!(
            test = %test_name,
            accuracy = status.accuracy_passed,
            consistency = status.consistency_passed,
            "Status updated"
        );
        self.snapshot.test_cases.insert(test_name.to_string(), status);
    }

    pub fn recompute_summary(&mut self) -> &StoreSummary {
        self.snapshot.summary = StoreSummary::from_statuses(self.snapshot.test_cases.values());
        &self.snapshot.summary
    }

    /// Names that passed both checks on their last run.
    pub fn passed_names(&self) -> Vec<String> {
        self.names_where(|s| s.is_passing())
    }

    /// Names recorded in the store that still fail at least one check.
    pub fn needs_work_names(&self) -> Vec<String> {
        self.names_where(|s| s.needs_work())
    }

    fn names_where(&self, predicate: impl Fn(&TestCaseStatus) -> bool) -> Vec<String> {
        self.snapshot
            .test_cases
            .iter()
            .filter(|(_, status)| predicate(status))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Stamp the snapshot and write it to disk, replacing the old file in one step.
    pub fn save(&mut self, model: &str) -> Result<()> {
        self.snapshot.model = model.to_string();
        self.snapshot.last_updated = Some(Utc::now());
        self.recompute_summary();

        let json = serde_json::to_string_pretty(&self.snapshot)?;
        write_atomic(&self.path, json.as_bytes())?;

        tracing::info!(
            path = %self.path.display(),
            cases = self.snapshot.summary.total_cases,
            "Results saved"
        );
        Ok(())
    }

    /// Drop every recorded status and persist the empty snapshot.
    pub fn reset(&mut self, model: &str) -> Result<()> {
        self.snapshot.test_cases.clear();
        tracing::info!(path = %self.path.display(), "Results reset");
        self.save(model)
    }
}

fn read_snapshot(path: &Path) -> (ResultsSnapshot, LoadStatus) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No results file yet");
            return (ResultsSnapshot::default(), LoadStatus::Missing);
        }
        Err(e) => return corrupt(path, e.to_string()),
    };

    match serde_json::from_str::<ResultsSnapshot>(&content) {
        Ok(mut snapshot) => {
            snapshot.summary = StoreSummary::from_statuses(snapshot.test_cases.values());
            let count = snapshot.test_cases.len();
            (snapshot, LoadStatus::Loaded(count))
        }
        Err(e) => corrupt(path, e.to_string()),
    }
}

fn corrupt(path: &Path, reason: String) -> (ResultsSnapshot, LoadStatus) {
    tracing::warn!(
        path = %path.display(),
        "Could not load results file, starting empty: {}",
        reason
    );
    (ResultsSnapshot::default(), LoadStatus::Corrupt(reason))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let persistence = |e: std::io::Error| {
        CdtMapError::Persistence(format!("{}: {}", path.display(), e))
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(persistence)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persistence)?;
    tmp.write_all(bytes).map_err(persistence)?;
    tmp.as_file().sync_all().map_err(persistence)?;
    tmp.persist(path).map_err(|e| persistence(e.error))?;
    Ok(())
}
