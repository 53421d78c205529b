//! Command implementations

pub mod capacity;
pub mod completions;
pub mod config;
pub mod fetch;
pub mod form;
pub mod init;
pub mod schedule;
pub mod session;
pub mod trace;
