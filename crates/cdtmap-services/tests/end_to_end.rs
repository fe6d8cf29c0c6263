use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cdtmap_benchmark::{ChatRequest, ChatResponse};
use cdtmap_core::Result;
use cdtmap_services::{
    CdtMapConfig, ChatClient, RequestDispatcher, ResultStore, TemplatePrompts, TestCase,
    ValidationService,
};

struct ExtractionModel {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatClient for ExtractionModel {
    async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatResponse::with_content(
            r#"{"cdt_codes": [{"code": "D7140", "description": "Extraction, erupted tooth", "confidence": "high"}], "explanation": "Simple extraction."}"#,
        ))
    }
}

#[tokio::test]
async fn extraction_case_passes_and_is_remembered() {
    let dir = tempfile::tempdir().unwrap();
    let results_path = dir.path().join("test_results.json");

    let model = Arc::new(ExtractionModel {
        calls: AtomicUsize::new(0),
    });
    let config = CdtMapConfig::default();
    let catalog = cdtmap_services::load_code_catalog(None).unwrap();
    let dispatcher = RequestDispatcher::new(model.clone(), &config, &TemplatePrompts, &catalog);
    let (store, _) = ResultStore::open(&results_path);
    let mut service = ValidationService::new(Arc::new(dispatcher), store, config.harness.clone());

    let cases = vec![Arc::new(TestCase::new(
        "Extraction",
        "Extracted an erupted tooth with forceps.",
        ["D7140"],
    ))];

    let selection = service.select_cases(&cases, false);
    let report = service.validate(&selection).await.unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    let accuracy = &report.accuracy[0];
    assert!(accuracy.passed);
    assert_eq!(accuracy.score, 1.0);
    let consistency = &report.consistency[0];
    assert!(consistency.consistent);
    assert_eq!(consistency.distinct_code_sets, 1);

    let (reopened, _) = ResultStore::open(&results_path);
    let status = reopened.status("Extraction").unwrap();
    assert!(!status.needs_work());
    assert_eq!(reopened.snapshot().model, "llama3:8b");

    let again = service.select_cases(&cases, false);
    assert!(again.cases.is_empty());
    let report = service.validate(&again).await.unwrap();
    assert!(report.all_passing());
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);
}
