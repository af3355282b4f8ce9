pub mod artifact;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod insight;
pub mod orchestrator;
pub mod pr_processor;
pub mod progress;
pub mod prompts;
pub mod server;
pub mod sources;

#[cfg(test)]
mod test_helpers;
