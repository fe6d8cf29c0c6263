use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cdtmap_core::{CdtCode, TestCase};
use thiserror::Error;

const BUILTIN_TEST_CASES: &str = include_str!("../data/test_cases.json");
const BUILTIN_CODES: &str = include_str!("../data/cdt_codes.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        source: serde_json::Error,
    },
    #[error("Duplicate test case name: {0}")]
    DuplicateName(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Load test cases from `path`, or the built-in set when `None`.
pub fn load_test_cases(path: Option<&Path>) -> Result<Vec<Arc<TestCase>>> {
    match path {
        Some(path) => parse_test_cases(&read(path)?, &path.display().to_string()),
        None => parse_test_cases(BUILTIN_TEST_CASES, "built-in test cases"),
    }
}

/// Parse a JSON array of test cases. Names must be unique.
pub fn parse_test_cases(json: &str, origin: &str) -> Result<Vec<Arc<TestCase>>> {
    let cases: Vec<TestCase> = serde_json::from_str(json).map_err(|source| CatalogError::Parse {
        origin: origin.to_string(),
        source,
    })?;

    let mut seen = HashSet::new();
    for case in &cases {
        if !seen.insert(case.name.as_str()) {
            return Err(CatalogError::DuplicateName(case.name.clone()));
        }
        if case.expected_codes.is_empty() {
            tracing::warn!(test = %case.name, "Test case has no expected codes");
        }
    }

    tracing::debug!("Loaded {} test cases from {}", cases.len(), origin);
    Ok(cases.into_iter().map(Arc::new).collect())
}

/// Load the code catalog from `path`, or the built-in one when `None`.
pub fn load_code_catalog(path: Option<&Path>) -> Result<Vec<CdtCode>> {
    let (json, origin) = match path {
        Some(path) => (read(path)?, path.display().to_string()),
        None => (BUILTIN_CODES.to_string(), "built-in code catalog".to_string()),
    };

    let codes: Vec<CdtCode> = serde_json::from_str(&json).map_err(|source| CatalogError::Parse {
        origin: origin.clone(),
        source,
    })?;

    tracing::debug!("Loaded {} CDT codes from {}", codes.len(), origin);
    Ok(codes)
}

/// Expected codes that the catalog does not list, sorted and distinct.
pub fn missing_codes(test_cases: &[Arc<TestCase>], catalog: &[CdtCode]) -> Vec<String> {
    let known: HashSet<&str> = catalog.iter().map(|c| c.code.as_str()).collect();

    test_cases
        .iter()
        .flat_map(|tc| tc.expected_codes.iter())
        .filter(|code| !known.contains(code.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })
}
