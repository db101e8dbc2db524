//! Code Inbox: extracts verification codes from forwarded emails.

pub mod app;
pub mod config;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod routes;
pub mod store;
