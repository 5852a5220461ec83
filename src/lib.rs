//! Ventanilla -- Support-Chat Gateway
//!
//! A conversational gateway over a customer-management backend: chat
//! messages in, model-driven tool calls against the backend, streamed
//! answer out.

pub mod types;
pub mod config;
pub mod backend;
pub mod inference;
pub mod chat;
pub mod server;
