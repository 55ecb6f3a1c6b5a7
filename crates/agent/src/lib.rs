//! Agent runtime - LLM-backed steps and the flow runner
//!
//! This crate is the "hands" of the dealforge system. It owns:
//! - The `LlmClient` trait and the OpenRouter implementation
//! - The `Retriever` trait for proposal context lookup
//! - Prompt rendering for every model call
//! - The twelve step implementations behind the three pipelines
//! - `FlowRunner`, which drives runs step by step, persists after each
//!   step, and streams progress events to subscribers
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It NEVER decides match rankings,
//! go/no-go recommendations, health scores, alert firing, or compliance
//! coverage. Those are deterministic decisions made by the core crate; the
//! model extracts structure from text and writes prose around the numbers.

pub mod llm;
pub mod prompts;
pub mod retriever;
pub mod runner;
pub mod steps;

pub use llm::{CompletionOptions, LlmClient, LlmError, OpenRouterClient, ScriptedLlm};
pub use retriever::{InMemoryRetriever, RetrievalError, Retriever};
pub use runner::{FlowRunner, RunnerConfig};
pub use steps::StepContext;
