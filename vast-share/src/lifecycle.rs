//! Share lifecycle operations.
//!
//! Every operation re-reads backend state and is safe to re-run after a
//! partial failure. Nothing is rolled back; a retried call converges instead.

use rand::seq::SliceRandom;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{ResourceKind, Result, ShareError};
use crate::mount;
use crate::reconciler::Reconciler;
use crate::share::{ExportLocation, ExportMetadata, NFS, Share, SnapshotRequest, gib_to_bytes};

impl Reconciler {
    /// Make sure the policy, quota and view of `share` exist and agree.
    ///
    /// Returns one export location per VIP of the configured pool.
    pub async fn ensure_share(&self, share: &Share) -> Result<Vec<ExportLocation>> {
        if !share.is_nfs() {
            return Err(ShareError::InvalidProtocol(share.share_proto.clone()));
        }

        let requested_capacity = share.size_bytes()?;
        let vips = self.get_vips().await?;

        let share_id = share.id.as_str();
        let path = self.share_path(share_id);

        let policy = match self.get_policy(share_id).await? {
            Some(policy) => policy,
            None => {
                let policy = self
                    .create(ResourceKind::ViewPolicy, json!({ "name": share_id }))
                    .await?;
                debug!(share_id = %share_id, "Policy created");
                policy
            }
        };

        let quota = match self.get_quota(share_id).await? {
            Some(quota) => {
                let existing = quota.u64("hard_limit")?;
                if existing != requested_capacity {
                    return Err(ShareError::CapacityMismatch {
                        requested: requested_capacity,
                        existing,
                    });
                }
                quota
            }
            None => {
                let quota = self
                    .create(
                        ResourceKind::Quota,
                        json!({
                            "name": share_id,
                            "path": path,
                            "create_dir": true,
                            "hard_limit": requested_capacity,
                        }),
                    )
                    .await?;
                let quota_id = quota.id()?;
                debug!(quota_id = %quota_id, path = %path, "Quota created");
                quota
            }
        };

        match self.get_view(share_id).await? {
            None => {
                self.create(
                    ResourceKind::View,
                    json!({
                        "name": share_id,
                        "path": path,
                        "create_dir": true,
                        "policy_id": policy.get("id")?,
                        "protocols": [NFS],
                    }),
                )
                .await?;
                debug!(share_id = %share_id, path = %path, "View created");
            }
            Some(view) if view.str("policy")? != share_id => {
                let view_id = view.id()?;
                info!(view_id = %view_id, share_id = %share_id, "Rebinding view to share policy");
                self.update(
                    ResourceKind::View,
                    &view_id,
                    json!({ "policy_id": policy.get("id")? }),
                )
                .await?;
            }
            Some(_) => {}
        }

        let quota_id = quota.id()?;
        Ok(vips
            .iter()
            .map(|vip| ExportLocation {
                path: format!("{vip}:{path}"),
                metadata: ExportMetadata {
                    quota_id: quota_id.clone(),
                },
                is_admin_only: false,
            })
            .collect())
    }

    /// Create a share and return its first export location.
    pub async fn create_share(&self, share: &Share) -> Result<ExportLocation> {
        let mut locations = self.ensure_share(share).await?;
        // get_vips never returns an empty pool
        Ok(locations.swap_remove(0))
    }

    /// Remove the view, quota and policy of a share, then move its data into
    /// the `deleted` directory of the root export.
    pub async fn delete_share(&self, share: &Share) -> Result<()> {
        let share_id = share.id.as_str();

        for kind in [ResourceKind::View, ResourceKind::Quota, ResourceKind::ViewPolicy] {
            match self.lookup(kind, share_id).await? {
                Some(record) => {
                    self.remove(kind, &record.id()?).await?;
                    info!(kind = %kind, share_id = %share_id, "Deleted");
                }
                None => {
                    warn!("{} {} not found on VAST, skipping delete", kind, share_id);
                }
            }
        }

        let vips = self.get_vips().await?;
        let vip = vips
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default();
        // one mount point per share so concurrent deletes never share a mount
        let mount_point = self
            .mount_dir
            .join(format!("{vip}-{share_id}"))
            .to_string_lossy()
            .into_owned();
        let source = format!("{vip}:{root}", root = self.root_export);

        mount::soft_delete(
            self.runner.as_ref(),
            &source,
            &mount_point,
            &Self::share_dir(share_id),
            share_id,
        )
        .await
    }

    /// Set the quota hard limit of a share to `new_size` GiB.
    ///
    /// Used for both growing and shrinking; the array decides whether a
    /// shrink below current usage is allowed.
    pub async fn resize_share(&self, share: &Share, new_size: u64) -> Result<()> {
        let requested_capacity = gib_to_bytes(new_size)?;
        let quota = self
            .get_quota(&share.id)
            .await?
            .ok_or_else(|| ShareError::NotFound(share.id.clone()))?;

        let quota_id = quota.id()?;
        info!(share_id = %share.id, quota_id = %quota_id, hard_limit = requested_capacity, "Resizing share");
        self.update(
            ResourceKind::Quota,
            &quota_id,
            json!({ "hard_limit": requested_capacity }),
        )
        .await
    }

    pub async fn extend_share(&self, share: &Share, new_size: u64) -> Result<()> {
        self.resize_share(share, new_size).await
    }

    pub async fn shrink_share(&self, share: &Share, new_size: u64) -> Result<()> {
        self.resize_share(share, new_size).await
    }

    /// Take a snapshot of the share instance's path.
    pub async fn create_snapshot(&self, snapshot: &SnapshotRequest) -> Result<()> {
        let path = self.share_path(&snapshot.share_instance_id);
        info!(path = %path, name = %snapshot.name, "Creating snapshot");
        self.create(
            ResourceKind::Snapshot,
            json!({ "path": path, "name": snapshot.name }),
        )
        .await?;
        Ok(())
    }

    /// Delete the one snapshot named like `snapshot`.
    pub async fn delete_snapshot(&self, snapshot: &SnapshotRequest) -> Result<()> {
        let found = self.get_snapshot(&snapshot.name).await?;
        let snapshot_id = found.id()?;
        info!(snapshot_id = %snapshot_id, name = %snapshot.name, "Deleting snapshot");
        self.remove(ResourceKind::Snapshot, &snapshot_id).await
    }

    /// Number of network allocations the backend needs per share server.
    pub fn network_allocations_number(&self) -> u32 {
        0
    }
}
