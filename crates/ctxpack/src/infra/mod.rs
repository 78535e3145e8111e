//! Infrastructure adapters for config, processes, naming, HTTP, and logging.

pub mod config;
pub mod llm;
pub mod logging;
pub mod naming;
pub mod process;
