//! Capacity reporting.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;
use tracing::debug;
use vast_rest::{Error as RestError, Record};

use crate::error::Result;
use crate::reconciler::{Reconciler, collection};
use crate::share::{GIB, NFS};

pub const VENDOR_NAME: &str = "VAST STORAGE";
pub const DRIVER_VERSION: &str = "1.0";

/// Cluster metrics requested from the ad-hoc monitor.
const CAPACITY_METRICS: [&str; 5] = [
    "Capacity,drr",
    "Capacity,logical_space",
    "Capacity,logical_space_in_use",
    "Capacity,physical_space",
    "Capacity,physical_space_in_use",
];

/// Latest capacity sample of the cluster, keyed by metric name without the
/// `Capacity,` prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityMetrics(HashMap<String, f64>);

impl CapacityMetrics {
    /// Pair the last data row of a monitor response with its `prop_list`.
    pub fn from_record(record: &Record) -> vast_rest::Result<Self> {
        let names = record.array("prop_list")?;
        let rows = record.array("data")?;
        let last = rows
            .last()
            .and_then(|row| row.as_array())
            .ok_or_else(|| RestError::FieldType {
                field: "data".to_string(),
                expected: "a non-empty list of samples",
            })?;

        let mut values = HashMap::new();
        for (name, value) in names.iter().zip(last) {
            let (Some(name), Some(value)) = (name.as_str(), value.as_f64()) else {
                continue;
            };
            let key = name.split_once(',').map_or(name, |(_, metric)| metric);
            values.insert(key.to_string(), value);
        }
        Ok(Self(values))
    }

    pub fn get(&self, metric: &str) -> vast_rest::Result<f64> {
        self.0
            .get(metric)
            .copied()
            .ok_or_else(|| RestError::MissingField(metric.to_string()))
    }
}

/// Capacity and feature report for the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareStats {
    pub share_backend_name: String,
    pub vendor_name: String,
    pub driver_version: String,
    pub storage_protocol: String,
    pub data_reduction: f64,
    pub total_capacity_gb: f64,
    pub free_capacity_gb: f64,
    pub provisioned_capacity_gb: f64,
    pub snapshot_support: bool,
    pub create_share_from_snapshot_support: bool,
    pub mount_snapshot_support: bool,
    pub revert_to_snapshot_support: bool,
}

impl ShareStats {
    pub fn new(backend_name: &str, metrics: &CapacityMetrics) -> vast_rest::Result<Self> {
        let logical_space = metrics.get("logical_space")?;
        let logical_space_in_use = metrics.get("logical_space_in_use")?;
        let gib = GIB as f64;

        Ok(Self {
            share_backend_name: backend_name.to_string(),
            vendor_name: VENDOR_NAME.to_string(),
            driver_version: DRIVER_VERSION.to_string(),
            storage_protocol: NFS.to_string(),
            data_reduction: metrics.get("drr")?,
            total_capacity_gb: logical_space / gib,
            free_capacity_gb: (logical_space - logical_space_in_use) / gib,
            provisioned_capacity_gb: logical_space_in_use / gib,
            snapshot_support: true,
            create_share_from_snapshot_support: false,
            mount_snapshot_support: false,
            revert_to_snapshot_support: false,
        })
    }
}

impl Reconciler {
    pub async fn capacity_metrics(&self) -> Result<CapacityMetrics> {
        let response = self
            .backend
            .query(
                collection::AD_HOC_QUERY,
                &[
                    ("prop_list", json!(CAPACITY_METRICS)),
                    ("object_type", json!("cluster")),
                    ("time_frame", json!("1m")),
                ],
            )
            .await?;
        let record = response
            .first()
            .ok_or_else(|| RestError::Api("empty response from monitor query".to_string()))?;
        let metrics = CapacityMetrics::from_record(record)?;
        debug!(metrics = ?metrics, "Capacity metrics");
        Ok(metrics)
    }

    /// Capacity report for this backend.
    pub async fn share_stats(&self) -> Result<ShareStats> {
        let metrics = self.capacity_metrics().await?;
        Ok(ShareStats::new(&self.backend_name, &metrics)?)
    }
}
