use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccuracyVerdict, ConsistencyVerdict};

// =============================================================================
// Per-case status
// =============================================================================

/// Last known accuracy/consistency status of one test case.
///
/// `needs_work` is derived from the two pass flags and is recomputed on
/// construction and on deserialization; it is never an input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredStatus")]
pub struct TestCaseStatus {
    pub accuracy_passed: bool,
    pub consistency_passed: bool,
    pub accuracy_score: f64,
    pub consistency_rate: f64,
    pub last_accuracy_test: Option<DateTime<Utc>>,
    pub last_consistency_test: Option<DateTime<Utc>>,
    needs_work: bool,
}

impl TestCaseStatus {
    pub fn new(
        accuracy_passed: bool,
        consistency_passed: bool,
        accuracy_score: f64,
        consistency_rate: f64,
        tested_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            accuracy_passed,
            consistency_passed,
            accuracy_score,
            consistency_rate,
            last_accuracy_test: tested_at,
            last_consistency_test: tested_at,
            needs_work: !(accuracy_passed && consistency_passed),
        }
    }

    pub fn from_verdicts(
        accuracy: &AccuracyVerdict,
        consistency: &ConsistencyVerdict,
        tested_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            accuracy.passed,
            consistency.consistent,
            accuracy.score,
            consistency.consistency_rate,
            Some(tested_at),
        )
    }

    pub fn needs_work(&self) -> bool {
        self.needs_work
    }

    pub fn is_passing(&self) -> bool {
        self.accuracy_passed && self.consistency_passed
    }

    /// Names of the failing checks, for reports.
    pub fn issues(&self) -> Vec<&'static str> {
        let mut issues = Vec::new();
        if !self.accuracy_passed {
            issues.push("accuracy");
        }
        if !self.consistency_passed {
            issues.push("consistency");
        }
        issues
    }
}

#[derive(Deserialize)]
struct StoredStatus {
    #[serde(default)]
    accuracy_passed: bool,
    #[serde(default)]
    consistency_passed: bool,
    #[serde(default)]
    accuracy_score: f64,
    #[serde(default)]
    consistency_rate: f64,
    #[serde(default, deserialize_with = "lenient_timestamp::deserialize")]
    last_accuracy_test: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp::deserialize")]
    last_consistency_test: Option<DateTime<Utc>>,
}

impl From<StoredStatus> for TestCaseStatus {
    fn from(s: StoredStatus) -> Self {
        let mut status = TestCaseStatus::new(
            s.accuracy_passed,
            s.consistency_passed,
            s.accuracy_score,
            s.consistency_rate,
            None,
        );
        status.last_accuracy_test = s.last_accuracy_test;
        status.last_consistency_test = s.last_consistency_test;
        status
    }
}

// =============================================================================
// Whole-file snapshot
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSummary {
    pub total_cases: u32,
    pub accuracy_passed: u32,
    pub consistency_passed: u32,
    pub both_passed: u32,
    pub needs_work: u32,
}

impl StoreSummary {
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a TestCaseStatus>) -> Self {
        statuses.into_iter().fold(Self::default(), |mut s, status| {
            s.total_cases += 1;
            s.accuracy_passed += status.accuracy_passed as u32;
            s.consistency_passed += status.consistency_passed as u32;
            s.both_passed += status.is_passing() as u32;
            s.needs_work += status.needs_work() as u32;
            s
        })
    }

    /// Percentage of `count` over the total, 0 when empty.
    pub fn percent(&self, count: u32) -> f64 {
        match self.total_cases {
            0 => 0.0,
            total => count as f64 / total as f64 * 100.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsSnapshot {
    #[serde(default, deserialize_with = "lenient_timestamp::deserialize")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub test_cases: BTreeMap<String, TestCaseStatus>,
    #[serde(default)]
    pub summary: StoreSummary,
}

/// Accepts RFC 3339, naive ISO-8601 (read as UTC), an empty string or null.
mod lenient_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(ts.with_timezone(&Utc)));
        }

        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(|e| de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
    }
}
