//! Shared code for the costflow binaries

pub mod common;
pub mod script;
