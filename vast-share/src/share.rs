//! Records exchanged with the orchestration layer.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShareError};

/// The only protocol the backend exports.
pub const NFS: &str = "NFS";

/// Bytes per GiB; share sizes are requested in GiB.
pub const GIB: u64 = 1 << 30;

/// Convert a size in GiB to bytes.
pub fn gib_to_bytes(size: u64) -> Result<u64> {
    size.checked_mul(GIB).ok_or(ShareError::InvalidSize(size))
}

/// A share as requested by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    /// Requested capacity in GiB.
    pub size: u64,
    pub share_proto: String,
}

impl Share {
    pub fn new(id: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            size,
            share_proto: NFS.to_string(),
        }
    }

    pub fn size_bytes(&self) -> Result<u64> {
        gib_to_bytes(self.size)
    }

    pub fn is_nfs(&self) -> bool {
        self.share_proto == NFS
    }
}

/// A snapshot request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRequest {
    pub name: String,
    /// Id of the share instance the snapshot is taken of.
    pub share_instance_id: String,
}

/// One access rule as supplied by the orchestrator, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub access_type: String,
    pub access_level: String,
    pub access_to: String,
}

impl AccessRule {
    pub fn ip(level: &str, to: &str) -> Self {
        Self {
            access_type: "ip".to_string(),
            access_level: level.to_string(),
            access_to: to.to_string(),
        }
    }
}

/// Mount target returned for a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportLocation {
    /// `<vip>:<path>`
    pub path: String,
    pub metadata: ExportMetadata,
    pub is_admin_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub quota_id: String,
}
