//! cfai installer library.
//!
//! This crate installs and updates the `cfai` command-line tool from its
//! GitHub Releases. It is used by the `cfai-installer` CLI binary and can
//! be driven programmatically with substitute collaborators for testing.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`command`] - External command execution with a timeout
//! - [`config`] - Run configuration derived from the command line
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Error taxonomy naming the failing stage
//! - [`extraction`] - Archive extraction for tar and zip assets
//! - [`fetch`] - Download route decision and mirror failover
//! - [`install_dir`] - Install directory resolution and write strategy
//! - [`installer`] - Final placement and post-install verification
//! - [`interrupt`] - Cooperative interruption on SIGINT and SIGTERM
//! - [`output`] - User-facing progress and result lines
//! - [`pipeline`] - Install and update orchestration
//! - [`platform`] - Host OS and architecture normalization
//! - [`release`] - Release registry queries
//! - [`resolver`] - Asset selection for the host platform
//! - [`transport`] - Blocking HTTP access
//! - [`unpack`] - Payload location inside downloaded assets
//! - [`version_gate`] - Installed-version comparison for updates

pub mod cli;
pub mod command;
pub mod config;
pub mod dirs;
pub mod error;
pub mod extraction;
pub mod fetch;
pub mod install_dir;
pub mod installer;
pub mod interrupt;
pub mod output;
pub mod pipeline;
pub mod platform;
pub mod release;
pub mod resolver;
pub mod transport;
pub mod unpack;
pub mod version_gate;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
