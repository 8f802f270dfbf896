//! Policy-enforcing, provider-agnostic proxy for LLM back-ends.
//!
//! `gatehouse` sits between an orchestrating application and any of several
//! LLM providers. Each call runs a fixed chain of inbound guards (injection
//! scan, PII masking, policy alignment), dispatches through a pluggable
//! provider adapter, then runs a fixed chain of outbound guards (schema
//! enforcement, tool-call grounding, hallucinated-import scraping). The
//! caller always receives the same canonical response shape -- on a guarded
//! path together with structured [`types::Violation`] records, never a raw
//! transport error or a provider-native payload.
//!
//! The entry point is [`pipeline::Pipeline::run`]; adapters are resolved
//! through [`adapters::registry::AdapterRegistry`] against the allow-list in
//! [`config::PolicyConfig`].

pub mod adapters;
pub mod audit;
pub mod config;
pub mod interceptors;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod skills;
pub mod types;
