//! Inference Client: OpenAI-compatible API client for the model endpoint.
//!
//! This module handles all communication with the model:
//! - Non-streaming chat completions, optionally constrained to JSON
//! - Endpoint configuration (`ModelConfig`)
//!
//! The client speaks the OpenAI Chat Completions API, so any compatible
//! backend (Ollama, llama.cpp, vLLM, hosted APIs) is a config change.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use config::ModelConfig;
pub use errors::InferenceError;
pub use types::{ChatMessage, Role};
