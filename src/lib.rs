// src/lib.rs
// Library interface for cert-patrol
pub mod cert_parser;
pub mod classify;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod license;
pub mod metrics;
pub mod output;
pub mod plan;
pub mod probe;
pub mod recipients;
pub mod registration;
pub mod scanner;
pub mod schedule;
pub mod store;
pub mod types;
