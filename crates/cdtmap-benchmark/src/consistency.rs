use std::collections::{BTreeMap, HashMap};

use cdtmap_core::{ConsistencyVerdict, ResultRecord, RunObservation, RunOutcome};

/// Group records by test name and judge whether the repetitions agree.
///
/// Order of `results` is irrelevant; runs are correlated by name and run index.
/// Any failed run marks its case inconsistent. Code sets compare without regard
/// to order.
pub fn analyze(results: &[ResultRecord]) -> BTreeMap<String, ConsistencyVerdict> {
    let mut groups: BTreeMap<&str, Vec<&ResultRecord>> = BTreeMap::new();
    for record in results {
        groups.entry(record.test_name()).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(name, records)| (name.to_string(), verdict_for(name, records)))
        .collect()
}

fn verdict_for(name: &str, mut records: Vec<&ResultRecord>) -> ConsistencyVerdict {
    records.sort_by_key(|r| r.run_index);

    let mut groups: HashMap<Vec<&str>, usize> = HashMap::new();
    let mut failed_run_count = 0;

    for record in &records {
        match &record.outcome {
            RunOutcome::Codes(codes) => {
                let mut key: Vec<&str> = codes.iter().map(String::as_str).collect();
                key.sort_unstable();
                *groups.entry(key).or_default() += 1;
            }
            RunOutcome::Error(_) => failed_run_count += 1,
        }
    }

    let successful_run_count = records.len() - failed_run_count;
    let distinct_code_sets = groups.len();
    let largest_group = groups.values().copied().max().unwrap_or(0);

    let consistent = failed_run_count == 0 && distinct_code_sets == 1;
    let consistency_rate = if consistent { 1.0 } else { 0.0 };
    let agreement_rate = match records.len() {
        0 => 0.0,
        n => largest_group as f64 / n as f64,
    };

    if !consistent {
        tracing::debug!(
            test = %name,
            distinct = distinct_code_sets,
            failed = failed_run_count,
            "Inconsistent across runs"
        );
    }

    ConsistencyVerdict {
        test_name: name.to_string(),
        consistent,
        distinct_code_sets,
        successful_run_count,
        failed_run_count,
        consistency_rate,
        agreement_rate,
        runs: records.iter().map(|r| observe(r)).collect(),
    }
}

fn observe(record: &ResultRecord) -> RunObservation {
    RunObservation {
        run_index: record.run_index,
        codes: record.extracted_codes().map(<[String]>::to_vec),
        error: record.error().map(str::to_string),
        elapsed_seconds: record.elapsed_seconds,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use cdtmap_core::TestCase;

    fn case(name: &str) -> Arc<TestCase> {
        Arc::new(TestCase::new(name, "narrative", ["D1110", "D0120"]))
    }

    fn ok(tc: &Arc<TestCase>, run: u32, codes: &[&str]) -> ResultRecord {
        let codes = codes.iter().map(|c| c.to_string()).collect();
        ResultRecord::success(tc.clone(), run, codes, 0.5)
    }

    fn err(tc: &Arc<TestCase>, run: u32) -> ResultRecord {
        ResultRecord::failure(tc.clone(), run, "Error connecting to Ollama: refused", 0.1)
    }

    #[test]
    fn test_same_codes_any_order_consistent() {
        let tc = case("Checkup");
        let results = vec![
            ok(&tc, 1, &["D1110", "D0120"]),
            ok(&tc, 2, &["D0120", "D1110"]),
            ok(&tc, 3, &["D1110", "D0120"]),
        ];
        let verdicts = analyze(&results);
        let v = &verdicts["Checkup"];
        assert!(v.consistent);
        assert_eq!(v.distinct_code_sets, 1);
        assert_eq!(v.successful_run_count, 3);
        assert_eq!(v.consistency_rate, 1.0);
        assert_eq!(v.agreement_rate, 1.0);
    }

    #[test]
    fn test_three_different_sets_inconsistent() {
        let tc = case("Checkup");
        let results = vec![
            ok(&tc, 1, &["D1110"]),
            ok(&tc, 2, &["D1110", "D0120"]),
            ok(&tc, 3, &["D0120"]),
        ];
        let v = &analyze(&results)["Checkup"];
        assert!(!v.consistent);
        assert_eq!(v.distinct_code_sets, 3);
        assert_eq!(v.consistency_rate, 0.0);
        assert!((v.agreement_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_majority_agreement_is_still_inconsistent() {
        let tc = case("Checkup");
        let results = vec![
            ok(&tc, 1, &["D1110"]),
            ok(&tc, 2, &["D1110"]),
            ok(&tc, 3, &["D0120"]),
        ];
        let v = &analyze(&results)["Checkup"];
        assert!(!v.consistent);
        assert_eq!(v.distinct_code_sets, 2);
        assert_eq!(v.consistency_rate, 0.0);
        assert!((v.agreement_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_failure_breaks_consistency() {
        let tc = case("Checkup");
        let results = vec![
            ok(&tc, 1, &["D1110"]),
            err(&tc, 2),
            ok(&tc, 3, &["D1110"]),
        ];
        let v = &analyze(&results)["Checkup"];
        assert!(!v.consistent);
        assert_eq!(v.distinct_code_sets, 1);
        assert_eq!(v.successful_run_count, 2);
        assert_eq!(v.failed_run_count, 1);
        assert_eq!(v.consistency_rate, 0.0);
        assert!((v.agreement_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_failed_is_not_vacuously_consistent() {
        let tc = case("Down");
        let results = vec![err(&tc, 1), err(&tc, 2)];
        let v = &analyze(&results)["Down"];
        assert!(!v.consistent);
        assert_eq!(v.distinct_code_sets, 0);
        assert_eq!(v.successful_run_count, 0);
        assert_eq!(v.consistency_rate, 0.0);
        assert_eq!(v.agreement_rate, 0.0);
    }

    #[test]
    fn test_empty_sets_agree() {
        let tc = case("Nothing");
        let results = vec![ok(&tc, 1, &[]), ok(&tc, 2, &[])];
        let v = &analyze(&results)["Nothing"];
        assert!(v.consistent);
        assert_eq!(v.distinct_code_sets, 1);
    }

    #[test]
    fn test_interleaved_cases_keyed_by_name() {
        let a = case("A");
        let b = case("B");
        let results = vec![
            ok(&b, 3, &["D0120"]),
            ok(&a, 2, &["D1110"]),
            ok(&b, 1, &["D0120"]),
            ok(&a, 1, &["D1110"]),
            ok(&b, 2, &["D0272"]),
        ];
        let verdicts = analyze(&results);
        assert_eq!(verdicts.len(), 2);
        assert!(verdicts["A"].consistent);
        assert!(!verdicts["B"].consistent);

        let runs: Vec<u32> = verdicts["B"].runs.iter().map(|r| r.run_index).collect();
        assert_eq!(runs, vec![1, 2, 3]);
        assert_eq!(verdicts["B"].runs[1].codes.as_deref(), Some(&["D0272".to_string()][..]));
    }
}
