use std::sync::Arc;

use crate::TestCase;

/// Terminal state of one dispatch: extracted codes or the error that prevented them.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Codes(Vec<String>),
    Error(String),
}

/// Result of a single model call, carrying the identity needed to re-correlate it.
#[derive(Clone, Debug)]
pub struct ResultRecord {
    pub test_case: Arc<TestCase>,
    pub run_index: u32,
    pub outcome: RunOutcome,
    pub elapsed_seconds: f64,
}

impl ResultRecord {
    pub fn success(
        test_case: Arc<TestCase>,
        run_index: u32,
        codes: Vec<String>,
        elapsed_seconds: f64,
    ) -> Self {
        Self {
            test_case,
            run_index,
            outcome: RunOutcome::Codes(codes),
            elapsed_seconds,
        }
    }

    pub fn failure(
        test_case: Arc<TestCase>,
        run_index: u32,
        error: impl ToString,
        elapsed_seconds: f64,
    ) -> Self {
        Self {
            test_case,
            run_index,
            outcome: RunOutcome::Error(error.to_string()),
            elapsed_seconds,
        }
    }

    pub fn test_name(&self) -> &str {
        &self.test_case.name
    }

    pub fn extracted_codes(&self) -> Option<&[String]> {
        match &self.outcome {
            RunOutcome::Codes(codes) => Some(codes),
            RunOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Codes(_) => None,
            RunOutcome::Error(e) => Some(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Codes(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_side_present() {
        let tc = Arc::new(TestCase::new("a", "input", ["D0120"]));

        let ok = ResultRecord::success(tc.clone(), 1, vec!["D0120".into()], 0.4);
        assert!(ok.is_success());
        assert_eq!(ok.extracted_codes(), Some(&["D0120".to_string()][..]));
        assert!(ok.error().is_none());

        let failed = ResultRecord::failure(tc, 2, "connection refused", 0.1);
        assert!(!failed.is_success());
        assert!(failed.extracted_codes().is_none());
        assert_eq!(failed.error(), Some("connection refused"));
        assert_eq!(failed.test_name(), "a");
    }
}
