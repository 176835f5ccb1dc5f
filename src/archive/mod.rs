pub mod config;
pub mod dump;
pub mod orchestrator;
pub mod processor;
pub mod selector;
pub mod transform;
pub mod writer;
