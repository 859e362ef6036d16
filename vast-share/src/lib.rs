//! vast-share: NFS shares on VAST storage
//!
//! This library reconciles share lifecycle requests onto the VAST management
//! API: one view, one view policy and one quota per share, all named after
//! the share id.

pub mod access;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod mount;
pub mod reconciler;
pub mod share;
pub mod stats;

pub use access::{Resolver, SystemResolver};
pub use config::Config;
pub use error::{ResourceKind, Result, ShareError};
pub use mount::{CommandRunner, ShellRunner};
pub use reconciler::Reconciler;
pub use share::{AccessRule, ExportLocation, Share, SnapshotRequest};
pub use stats::ShareStats;
