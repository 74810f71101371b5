//! Shared utilities

pub mod helpers;

pub use helpers::{backoff_delay, load_keypair, load_keypair_from_env_or_file, retry_with_backoff};
