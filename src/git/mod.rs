//! Git access for collectors and the CLI.

pub mod patch;
pub mod provider;

pub use patch::{detect_language, split_patch};
pub use provider::{GitProvider, SystemGit};

#[cfg(test)]
pub use provider::MockGitProvider;
