//! webrecon-recon: two-phase reconnaissance pipeline.
//!
//! Builds the in-scope target set from configured address ranges, runs
//! target identification tools concurrently, correlates the hostnames they
//! discover back into scope, then runs flyover tools one at a time.

pub mod callbacks;
pub mod config;
pub mod error;
pub mod project;
pub mod summary;
pub mod vars;
