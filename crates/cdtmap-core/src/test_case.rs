use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One entry of the billing code catalog handed to the prompt provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdtCode {
    pub code: String,
    pub description: String,
}

/// A procedure narrative with the codes a correct answer must contain.
///
/// `name` is unique within a catalog; results are correlated by it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub expected_codes: Vec<String>,
    #[serde(default)]
    pub expected_descriptions: Vec<String>,
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        input: impl Into<String>,
        expected_codes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            expected_codes: expected_codes.into_iter().map(Into::into).collect(),
            expected_descriptions: Vec::new(),
        }
    }
}

/// One (test case, repetition) pair dispatched as an independent unit of work.
#[derive(Clone, Debug)]
pub struct TaskUnit {
    pub test_case: Arc<TestCase>,
    /// 1-based repetition number.
    pub run_index: u32,
}

impl TaskUnit {
    pub fn new(test_case: Arc<TestCase>, run_index: u32) -> Self {
        Self {
            test_case,
            run_index,
        }
    }

    /// Full cartesian set: every case repeated `runs_per_test` times.
    pub fn expand(test_cases: &[Arc<TestCase>], runs_per_test: u32) -> Vec<TaskUnit> {
        test_cases
            .iter()
            .flat_map(|tc| (1..=runs_per_test).map(move |run| TaskUnit::new(tc.clone(), run)))
            .collect()
    }

    pub fn test_name(&self) -> &str {
        &self.test_case.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_builds_every_pair() {
        let cases = vec![
            Arc::new(TestCase::new("a", "first", ["D0120"])),
            Arc::new(TestCase::new("b", "second", ["D1110"])),
        ];
        let tasks = TaskUnit::expand(&cases, 3);
        assert_eq!(tasks.len(), 6);

        let pairs: Vec<(&str, u32)> = tasks.iter().map(|t| (t.test_name(), t.run_index)).collect();
        assert!(pairs.contains(&("a", 1)));
        assert!(pairs.contains(&("a", 3)));
        assert!(pairs.contains(&("b", 2)));
        assert!(!pairs.iter().any(|(_, run)| *run == 0));
    }

    #[test]
    fn test_expand_zero_runs_is_empty() {
        let cases = vec![Arc::new(TestCase::new("a", "first", ["D0120"]))];
        assert!(TaskUnit::expand(&cases, 0).is_empty());
    }

    #[test]
    fn test_descriptions_optional_in_json() {
        let tc: TestCase = serde_json::from_str(
            r#"{"name": "Extraction", "input": "Extracted a tooth.", "expected_codes": ["D7140"]}"#,
        )
        .unwrap();
        assert!(tc.expected_descriptions.is_empty());
        assert_eq!(tc.expected_codes, vec!["D7140"]);
    }
}
