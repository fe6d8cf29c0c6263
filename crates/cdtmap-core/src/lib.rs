pub mod config;
pub mod error;
pub mod result;
pub mod status;
pub mod test_case;
pub mod verdict;

pub use config::{
    CdtMapConfig, HarnessConfig, OllamaConfig, ResultsConfig, SamplingOptions,
    DEFAULT_MODEL, DEFAULT_OLLAMA_HOST, DEFAULT_RESULTS_FILE,
};
pub use error::{CdtMapError, Result};
pub use result::{ResultRecord, RunOutcome};
pub use status::{ResultsSnapshot, StoreSummary, TestCaseStatus};
pub use test_case::{CdtCode, TaskUnit, TestCase};
pub use verdict::{
    AccuracySummary, AccuracyVerdict, ConsistencySummary, ConsistencyVerdict, RunObservation,
    ACCURACY_PASS_THRESHOLD,
};
