pub mod account;
pub mod auth;
pub mod commands;
pub mod error;
pub mod gap_analysis;
pub mod http;
pub mod job;
pub mod runtime;
pub mod session;
pub mod websearch;
