//! handlers/mod.rs
pub mod outreach_handler;
