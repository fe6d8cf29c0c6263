pub mod consistency;
pub mod dispatcher;
pub mod evaluator;
pub mod extractor;
pub mod ollama;
pub mod prompts;
pub mod runner;

pub use consistency::analyze;
pub use dispatcher::RequestDispatcher;
pub use evaluator::{evaluate, evaluate_record};
pub use extractor::extract_codes;
pub use ollama::{ChatClient, ChatMessage, ChatOptions, ChatRequest, ChatResponse, ModelSummary, OllamaClient};
pub use prompts::{user_prompt, PromptProvider, TemplatePrompts};
pub use runner::{ConcurrentRunner, RunnerEvent};
