//! Share reconciler: maps shares onto VAST views, policies and quotas.
//!
//! All three resources of a share are named after the share id. The backend
//! does not enforce that join, so every lookup checks multiplicity and treats
//! duplicates as a consistency failure instead of picking one.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, error, info};
use vast_rest::{Backend, Record, Verb};

use crate::access::{Resolver, SystemResolver};
use crate::config::Config;
use crate::error::{ResourceKind, Result, ShareError};
use crate::mount::{CommandRunner, ShellRunner};

/// Collection names used by the reconciler.
pub mod collection {
    pub const VIEWS: &str = "views";
    pub const VIEW_POLICIES: &str = "viewpolicies";
    pub const QUOTAS: &str = "quotas";
    pub const SNAPSHOTS: &str = "snapshots";
    pub const VIPS: &str = "vips";
    pub const METRICS: &str = "metrics";
    pub const AD_HOC_QUERY: &str = "monitors/ad_hoc_query";
}

/// Name of the view exporting the root of all shares.
pub const ROOT_VIEW: &str = "manila";

/// View policy the root view is bound to.
pub const DEFAULT_POLICY: &str = "default";

impl ResourceKind {
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::View => collection::VIEWS,
            ResourceKind::ViewPolicy => collection::VIEW_POLICIES,
            ResourceKind::Quota => collection::QUOTAS,
            ResourceKind::Snapshot => collection::SNAPSHOTS,
        }
    }
}

/// Reconciles share lifecycle requests against one VAST cluster.
///
/// Holds configuration and shared collaborators only, so one instance can
/// serve concurrent operations on different shares.
pub struct Reconciler {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) resolver: Arc<dyn Resolver>,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) vippool_name: String,
    pub(crate) root_export: String,
    pub(crate) mount_dir: PathBuf,
    pub(crate) backend_name: String,
}

impl Reconciler {
    pub fn new(config: &Config, backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            resolver: Arc::new(SystemResolver),
            runner: Arc::new(ShellRunner::new(&config.root_helper)),
            vippool_name: config.vippool_name.clone(),
            root_export: config.root_export.trim_end_matches('/').to_string(),
            mount_dir: config.mount_dir.clone(),
            backend_name: config
                .backend_name
                .clone()
                .unwrap_or_else(|| "VASTShareDriver".to_string()),
        }
    }

    /// Replace the DNS resolver used for access rules.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the runner used for mount/move commands.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Directory name of a share below the root export.
    pub fn share_dir(share_id: &str) -> String {
        format!("manila-{share_id}")
    }

    /// Backend path of a share below `root`.
    pub fn volume_path(root: &str, share_id: &str) -> String {
        format!("{root}/{dir}", dir = Self::share_dir(share_id))
    }

    /// Backend path of a share below the configured root export.
    pub fn share_path(&self, share_id: &str) -> String {
        Self::volume_path(&self.root_export, share_id)
    }

    // === Lookups ===

    /// Find the single record named `name`, if any.
    pub async fn lookup(&self, kind: ResourceKind, name: &str) -> Result<Option<Record>> {
        let mut found = self
            .backend
            .query(kind.collection(), &[("name", json!(name))])
            .await?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            n => {
                error!(kind = %kind, name = %name, found = n, "Too many records with the same name");
                Err(ShareError::Consistency {
                    kind,
                    name: name.to_string(),
                    found: n,
                })
            }
        }
    }

    pub async fn get_view(&self, share_id: &str) -> Result<Option<Record>> {
        self.lookup(ResourceKind::View, share_id).await
    }

    pub async fn get_policy(&self, share_id: &str) -> Result<Option<Record>> {
        self.lookup(ResourceKind::ViewPolicy, share_id).await
    }

    pub async fn get_quota(&self, share_id: &str) -> Result<Option<Record>> {
        self.lookup(ResourceKind::Quota, share_id).await
    }

    /// Find the snapshot named `name`; exactly one must exist.
    pub async fn get_snapshot(&self, name: &str) -> Result<Record> {
        self.lookup(ResourceKind::Snapshot, name)
            .await?
            .ok_or_else(|| ShareError::Consistency {
                kind: ResourceKind::Snapshot,
                name: name.to_string(),
                found: 0,
            })
    }

    /// Virtual IPs of the configured pool. An empty pool is a configuration
    /// error since nothing could mount the share.
    pub async fn get_vips(&self) -> Result<Vec<String>> {
        let vips = self.backend.query(collection::VIPS, &[]).await?;
        let mut addresses = Vec::new();
        for vip in &vips {
            if vip.str("vippool")? == self.vippool_name {
                addresses.push(vip.str("ip")?.to_string());
            }
        }
        if addresses.is_empty() {
            return Err(ShareError::Config(format!(
                "VIP pool '{}' does not exist, or has no IPs",
                self.vippool_name
            )));
        }
        Ok(addresses)
    }

    // === Mutations ===

    pub(crate) async fn create(&self, kind: ResourceKind, body: Value) -> Result<Record> {
        let created = self
            .backend
            .mutate(Verb::Post, kind.collection(), Some(body))
            .await?;
        created.ok_or_else(|| {
            ShareError::Api(vast_rest::Error::Api(format!(
                "creating {kind} returned no record"
            )))
        })
    }

    pub(crate) async fn update(&self, kind: ResourceKind, id: &str, body: Value) -> Result<()> {
        let target = format!("{collection}/{id}", collection = kind.collection());
        self.backend.mutate(Verb::Patch, &target, Some(body)).await?;
        Ok(())
    }

    pub(crate) async fn remove(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let target = format!("{collection}/{id}", collection = kind.collection());
        self.backend.mutate(Verb::Delete, &target, None).await?;
        Ok(())
    }

    // === Setup ===

    /// Verify the array is reachable and make sure the root export exists.
    pub async fn setup(&self) -> Result<()> {
        let metrics = self
            .backend
            .query(collection::METRICS, &[])
            .await
            .map_err(|e| {
                let msg = format!("Exception when logging into the array: {e}");
                error!("{}", msg);
                ShareError::Api(vast_rest::Error::Api(msg))
            })?;
        debug!(count = metrics.len(), "Loaded metrics catalog");

        if self.get_view(ROOT_VIEW).await?.is_none() {
            let policy = self.get_policy(DEFAULT_POLICY).await?.ok_or_else(|| {
                ShareError::Config(format!("view policy '{DEFAULT_POLICY}' not found"))
            })?;
            self.create(
                ResourceKind::View,
                json!({
                    "name": ROOT_VIEW,
                    "path": self.root_export,
                    "policy_id": policy.get("id")?,
                    "create_dir": true,
                    "protocols": ["NFS"],
                }),
            )
            .await?;
            info!(path = %self.root_export, "Created root export");
        }

        info!(pool = %self.vippool_name, "Setup complete");
        Ok(())
    }
}
