use cdtmap_core::{AccuracyVerdict, ResultRecord, RunOutcome, TestCase, ACCURACY_PASS_THRESHOLD};

/// Score one response against the codes a test case expects.
///
/// `found` and `missing` follow the order of `expected`. A case with no
/// expected codes is a data defect: it scores 0 and is logged.
pub fn evaluate(test_case: &TestCase, extracted: &[String]) -> AccuracyVerdict {
    let expected = &test_case.expected_codes;

    let (found_codes, missing_codes): (Vec<String>, Vec<String>) = expected
        .iter()
        .cloned()
        .partition(|code| extracted.contains(code));

    let score = match expected.len() {
        0 => {
            tracing::warn!(
                test = %test_case.name,
                "Test case has no expected codes; scoring 0"
            );
            0.0
        }
        n => found_codes.len() as f64 / n as f64,
    };

    AccuracyVerdict {
        test_name: test_case.name.clone(),
        passed: score >= ACCURACY_PASS_THRESHOLD,
        score,
        found_codes,
        missing_codes,
        extracted_codes: extracted.to_vec(),
        error: None,
    }
}

/// Score a dispatch result; an errored call fails with score 0 and keeps its message.
pub fn evaluate_record(record: &ResultRecord) -> AccuracyVerdict {
    match &record.outcome {
        RunOutcome::Codes(codes) => evaluate(&record.test_case, codes),
        RunOutcome::Error(error) => AccuracyVerdict {
            test_name: record.test_case.name.clone(),
            passed: false,
            score: 0.0,
            found_codes: Vec::new(),
            missing_codes: record.test_case.expected_codes.clone(),
            extracted_codes: Vec::new(),
            error: Some(error.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_all_found_scores_one() {
        let tc = TestCase::new("Checkup", "exam and cleaning", ["D0120", "D1110"]);
        let v = evaluate(&tc, &codes(&["D1110", "D0120", "D0272"]));
        assert!(v.passed);
        assert_eq!(v.score, 1.0);
        assert_eq!(v.found_codes, codes(&["D0120", "D1110"]));
        assert!(v.missing_codes.is_empty());
    }

    #[test]
    fn test_half_found_passes() {
        let tc = TestCase::new("Sealants", "fluoride and sealants", ["D1206", "D1351"]);
        let v = evaluate(&tc, &codes(&["D1351"]));
        assert!(v.passed);
        assert_eq!(v.score, 0.5);
        assert_eq!(v.found_codes, codes(&["D1351"]));
        assert_eq!(v.missing_codes, codes(&["D1206"]));
    }

    #[test]
    fn test_below_half_fails() {
        let tc = TestCase::new("Three", "three codes", ["D0120", "D1110", "D0272"]);
        let v = evaluate(&tc, &codes(&["D0272"]));
        assert!(!v.passed);
        assert!((v.score - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_or_disjoint_scores_zero() {
        let tc = TestCase::new("Extraction", "forceps", ["D7140"]);
        assert_eq!(evaluate(&tc, &[]).score, 0.0);
        let v = evaluate(&tc, &codes(&["D7210"]));
        assert_eq!(v.score, 0.0);
        assert!(!v.passed);
        assert_eq!(v.missing_codes, codes(&["D7140"]));
    }

    #[test]
    fn test_no_expected_codes_scores_zero() {
        let tc = TestCase::new("Broken", "no expectations", Vec::<String>::new());
        let v = evaluate(&tc, &codes(&["D0120"]));
        assert_eq!(v.score, 0.0);
        assert!(!v.passed);
    }

    #[test]
    fn test_error_record_short_circuits() {
        let tc = Arc::new(TestCase::new("Extraction", "forceps", ["D7140"]));
        let record = ResultRecord::failure(tc, 1, "Request timed out after 30s", 30.0);
        let v = evaluate_record(&record);
        assert!(!v.passed);
        assert_eq!(v.score, 0.0);
        assert_eq!(v.error.as_deref(), Some("Request timed out after 30s"));
        assert!(v.extracted_codes.is_empty());
    }

    #[test]
    fn test_success_record_scored() {
        let tc = Arc::new(TestCase::new("Extraction", "forceps", ["D7140"]));
        let record = ResultRecord::success(tc, 1, codes(&["D7140"]), 1.2);
        let v = evaluate_record(&record);
        assert!(v.passed);
        assert_eq!(v.score, 1.0);
        assert!(v.error.is_none());
    }
}
