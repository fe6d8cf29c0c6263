mod catalog;
mod results_store;
mod validation;

pub use catalog::{load_code_catalog, load_test_cases, missing_codes, parse_test_cases, CatalogError};
pub use results_store::{LoadStatus, ResultStore};
pub use validation::{Selection, ValidationReport, ValidationService, CANONICAL_RUN};

// Re-export the harness types callers need alongside the services
pub use cdtmap_benchmark::{ChatClient, ModelSummary, OllamaClient, RequestDispatcher, RunnerEvent, TemplatePrompts};
pub use cdtmap_core::{CdtCode, CdtMapConfig, CdtMapError, StoreSummary, TestCase, TestCaseStatus};
