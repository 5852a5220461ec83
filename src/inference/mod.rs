//! Inference Module
//!
//! Streaming client for the OpenAI-compatible chat-completions API the
//! gateway drives, including assembly of streamed tool-call fragments.

pub mod client;

pub use client::OpenAiInferenceClient;
