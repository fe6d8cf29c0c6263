use serde::{Deserialize, Serialize};

/// Minimum fraction of expected codes a response must contain to pass.
pub const ACCURACY_PASS_THRESHOLD: f64 = 0.5;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyVerdict {
    pub test_name: String,
    pub passed: bool,
    /// Fraction of expected codes recovered, in [0, 1].
    pub score: f64,
    pub found_codes: Vec<String>,
    pub missing_codes: Vec<String>,
    #[serde(default)]
    pub extracted_codes: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// What a single repetition returned, kept for diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunObservation {
    pub run_index: u32,
    pub codes: Option<Vec<String>>,
    pub error: Option<String>,
    pub elapsed_seconds: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyVerdict {
    pub test_name: String,
    pub consistent: bool,
    /// Distinct order-independent code sets among successful runs.
    /// 0 when every run failed, since no code set was produced.
    pub distinct_code_sets: usize,
    pub successful_run_count: usize,
    pub failed_run_count: usize,
    /// 1.0 when consistent, otherwise 0.0. This is the value persisted per case.
    pub consistency_rate: f64,
    /// Largest group of agreeing successful runs divided by all runs.
    #[serde(default)]
    pub agreement_rate: f64,
    /// Sorted by run_index.
    pub runs: Vec<RunObservation>,
}

impl ConsistencyVerdict {
    pub fn total_runs(&self) -> usize {
        self.successful_run_count + self.failed_run_count
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub passed: u32,
    pub total: u32,
    /// Mean score across cases.
    pub overall_score: f64,
}

impl AccuracySummary {
    pub fn from_verdicts<'a>(verdicts: impl IntoIterator<Item = &'a AccuracyVerdict>) -> Self {
        let (passed, total, score_sum) =
            verdicts
                .into_iter()
                .fold((0u32, 0u32, 0.0f64), |(passed, total, sum), v| {
                    (passed + v.passed as u32, total + 1, sum + v.score)
                });

        let overall_score = match total {
            0 => 0.0,
            n => score_sum / n as f64,
        };

        Self {
            passed,
            total,
            overall_score,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencySummary {
    pub total: u32,
    pub consistent: u32,
    pub inconsistent: u32,
    pub consistency_rate: f64,
    pub total_runs: u32,
    pub failed_runs: u32,
}

impl ConsistencySummary {
    pub fn from_verdicts<'a>(verdicts: impl IntoIterator<Item = &'a ConsistencyVerdict>) -> Self {
        let mut summary = Self::default();
        for v in verdicts {
            summary.total += 1;
            match v.consistent {
                true => summary.consistent += 1,
                false => summary.inconsistent += 1,
            }
            summary.total_runs += v.total_runs() as u32;
            summary.failed_runs += v.failed_run_count as u32;
        }
        summary.consistency_rate = match summary.total {
            0 => 0.0,
            n => summary.consistent as f64 / n as f64,
        };
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accuracy(name: &str, score: f64) -> AccuracyVerdict {
        AccuracyVerdict {
            test_name: name.into(),
            passed: score >= ACCURACY_PASS_THRESHOLD,
            score,
            ..Default::default()
        }
    }

    #[test]
    fn test_accuracy_summary_mean() {
        let verdicts = [accuracy("a", 1.0), accuracy("b", 0.5), accuracy("c", 0.0)];
        let summary = AccuracySummary::from_verdicts(&verdicts);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert!((summary.overall_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summaries_are_zero() {
        assert_eq!(AccuracySummary::from_verdicts(&[]), AccuracySummary::default());
        let consistency = ConsistencySummary::from_verdicts(&[]);
        assert_eq!(consistency.total, 0);
        assert_eq!(consistency.consistency_rate, 0.0);
    }

    #[test]
    fn test_consistency_summary_counts_runs() {
        let verdict = |name: &str, consistent: bool, ok: usize, failed: usize| ConsistencyVerdict {
            test_name: name.into(),
            consistent,
            distinct_code_sets: 1,
            successful_run_count: ok,
            failed_run_count: failed,
            consistency_rate: if consistent { 1.0 } else { 0.0 },
            agreement_rate: if consistent { 1.0 } else { 0.5 },
            runs: Vec::new(),
        };
        let verdicts = [verdict("a", true, 3, 0), verdict("b", false, 2, 1)];
        let summary = ConsistencySummary::from_verdicts(&verdicts);
        assert_eq!(summary.consistent, 1);
        assert_eq!(summary.inconsistent, 1);
        assert_eq!(summary.total_runs, 6);
        assert_eq!(summary.failed_runs, 1);
        assert!((summary.consistency_rate - 0.5).abs() < 1e-9);
    }
}
