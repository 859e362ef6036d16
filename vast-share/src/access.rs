//! NFS access rules: validation, grantee resolution and policy updates.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::error::{ResourceKind, Result, ShareError};
use crate::reconciler::Reconciler;
use crate::share::{AccessRule, Share};

/// Access levels the backend can express in a view policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    ReadWrite,
    ReadOnly,
}

impl AccessLevel {
    pub fn parse(level: &str) -> Result<Self> {
        match level {
            "rw" => Ok(AccessLevel::ReadWrite),
            "ro" => Ok(AccessLevel::ReadOnly),
            other => Err(ShareError::InvalidAccessLevel(other.to_string())),
        }
    }

    /// View policy field holding the hosts granted this level.
    pub fn policy_field(self) -> &'static str {
        match self {
            AccessLevel::ReadWrite => "nfs_read_write",
            AccessLevel::ReadOnly => "nfs_read_only",
        }
    }
}

/// A rule that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant<'a> {
    pub level: AccessLevel,
    pub to: &'a str,
}

/// Check every rule before anything is sent to the backend. The first bad
/// rule rejects the whole batch.
pub fn validate_access_rules(rules: &[AccessRule]) -> Result<Vec<Grant<'_>>> {
    rules
        .iter()
        .map(|rule| {
            if rule.access_type != "ip" {
                return Err(ShareError::InvalidAccessType(rule.access_type.clone()));
            }
            Ok(Grant {
                level: AccessLevel::parse(&rule.access_level)?,
                to: rule.access_to.as_str(),
            })
        })
        .collect()
}

/// Whether `host` is a literal IPv4 address or network (`10.0.0.0/24`) that
/// can go into a policy without a DNS lookup.
pub fn is_literal_address(host: &str) -> bool {
    let (addr, prefix) = match host.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (host, None),
    };
    addr.parse::<Ipv4Addr>().is_ok()
        && prefix.is_none_or(|p| p.parse::<u8>().is_ok_and(|len| len <= 32))
}

/// Forward DNS resolution for access rule grantees.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>>;
}

/// Resolves through the operating system.
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>> {
        let mut addresses = Vec::new();
        for addr in tokio::net::lookup_host((host, 0)).await? {
            if let IpAddr::V4(v4) = addr.ip()
                && !addresses.contains(&v4)
            {
                addresses.push(v4);
            }
        }
        Ok(addresses)
    }
}

impl Reconciler {
    /// Addresses to put into a policy for one grantee. Lookup failures drop
    /// the grantee instead of failing the update.
    async fn resolve_grantee(&self, host: &str) -> Vec<String> {
        if is_literal_address(host) {
            return vec![host.to_string()];
        }
        match self.resolver.resolve(host).await {
            Ok(addresses) => {
                let addresses: Vec<String> = addresses.iter().map(Ipv4Addr::to_string).collect();
                info!(host = %host, addresses = ?addresses, "Resolved grantee");
                addresses
            }
            Err(e) => {
                error!("Failed to resolve host '{}': {} (ignoring)", host, e);
                Vec::new()
            }
        }
    }

    /// Replace the access configuration of `share` with `rules`.
    ///
    /// Both host lists are always written, so a later call with a different
    /// rule set supersedes the earlier one instead of adding to it. An empty
    /// rule set leaves the policy untouched.
    pub async fn update_access(&self, share: &Share, rules: &[AccessRule]) -> Result<()> {
        if !share.is_nfs() {
            warn!(share_id = %share.id, proto = %share.share_proto, "Ignoring access update for non-NFS share");
            return Ok(());
        }

        let grants = validate_access_rules(rules)?;
        if grants.is_empty() {
            return Ok(());
        }

        let mut read_write: Vec<String> = Vec::new();
        let mut read_only: Vec<String> = Vec::new();
        for grant in &grants {
            let hosts = match grant.level {
                AccessLevel::ReadWrite => &mut read_write,
                AccessLevel::ReadOnly => &mut read_only,
            };
            for address in self.resolve_grantee(grant.to).await {
                if !hosts.contains(&address) {
                    hosts.push(address);
                }
            }
        }

        let share_id = share.id.as_str();
        info!(
            path = %self.share_path(share_id),
            read_write = ?read_write,
            read_only = ?read_only,
            "Changing access"
        );

        let mut data = serde_json::Map::new();
        data.insert("name".to_string(), json!(share_id));
        data.insert(AccessLevel::ReadWrite.policy_field().to_string(), json!(read_write));
        data.insert(AccessLevel::ReadOnly.policy_field().to_string(), json!(read_only));
        data.insert("nfs_no_squash".to_string(), json!(["*"]));
        data.insert("nfs_root_squash".to_string(), json!(["*"]));
        let data = Value::Object(data);

        match self.get_policy(share_id).await? {
            Some(policy) => {
                self.update(ResourceKind::ViewPolicy, &policy.id()?, data)
                    .await
            }
            None => {
                self.create(ResourceKind::ViewPolicy, data).await?;
                Ok(())
            }
        }
    }
}
