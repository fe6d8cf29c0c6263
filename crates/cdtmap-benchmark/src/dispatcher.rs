use std::sync::Arc;
use std::time::{Duration, Instant};

use cdtmap_core::{CdtCode, CdtMapConfig, CdtMapError, ResultRecord, SamplingOptions, TaskUnit};

use crate::extractor::extract_codes;
use crate::ollama::{ChatClient, ChatRequest};
use crate::prompts::{user_prompt, PromptProvider};

/// Issues one model call per task and turns every outcome into a [`ResultRecord`].
///
/// Holds only read-only state, so one instance is shared by every worker.
pub struct RequestDispatcher {
    client: Arc<dyn ChatClient>,
    model: String,
    system_prompt: String,
    sampling: SamplingOptions,
    timeout: Duration,
    json_mode: bool,
}

impl RequestDispatcher {
    pub fn new(
        client: Arc<dyn ChatClient>,
        config: &CdtMapConfig,
        prompts: &dyn PromptProvider,
        catalog: &[CdtCode],
    ) -> Self {
        Self {
            client,
            model: config.ollama.model.clone(),
            system_prompt: prompts.system_prompt(&config.ollama.model, catalog),
            sampling: config.sampling.clone(),
            timeout: config.ollama.timeout(),
            json_mode: config.ollama.json_mode,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    pub fn build_request(&self, procedure_summary: &str) -> ChatRequest {
        let request = ChatRequest::new(
            &self.model,
            &self.system_prompt,
            &user_prompt(procedure_summary),
        )
        .with_options(&self.sampling);

        match self.json_mode {
            true => request.json_format(),
            false => request,
        }
    }

    pub async fn dispatch(&self, task: &TaskUnit) -> ResultRecord {
        let request = self.build_request(&task.test_case.input);

        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.client.chat(&request)).await {
            Ok(response) => response.map(|r| extract_codes(r.content())),
            Err(_) => Err(CdtMapError::Timeout(self.timeout.as_secs())),
        };
        let elapsed_seconds = start.elapsed().as_secs_f64();

        match outcome {
            Ok(codes) => {
                tracing::debug!(
                    test = %task.test_name(),
                    run = task.run_index,
                    elapsed = elapsed_seconds,
                    "Extracted {:?}",
                    codes
                );
                ResultRecord::success(task.test_case.clone(), task.run_index, codes, elapsed_seconds)
            }
            Err(e) => {
                tracing::debug!(
                    test = %task.test_name(),
                    run = task.run_index,
                    "Dispatch failed: {}",
                    e
                );
                ResultRecord::failure(task.test_case.clone(), task.run_index, e, elapsed_seconds)
            }
        }
    }
}
