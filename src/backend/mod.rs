//! Backend Module
//!
//! HTTP client for the customer-management backend: client search,
//! balance lookup, ticket creation, and payment registration.

pub mod client;

pub use client::HttpSupportBackend;
