//! Backend configuration.
//!
//! Read once at startup and passed by reference to the REST client and the
//! reconciler. Nothing here changes after construction.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use vast_rest::RestConfig;

/// Connection and layout settings for one VAST cluster.
#[derive(Args, Clone)]
pub struct Config {
    /// Hostname or IP address of the VAST management VIP
    #[arg(long, env = "VAST_MGMT_HOST")]
    pub mgmt_host: String,

    /// Username for VAST management
    #[arg(long, env = "VAST_MGMT_USER", default_value = "admin")]
    pub mgmt_user: String,

    /// Password for VAST management
    #[arg(long, env = "VAST_MGMT_PASSWORD", hide_env_values = true, default_value = "")]
    pub mgmt_password: String,

    /// Name of the virtual IP pool used for mounts
    #[arg(long, env = "VAST_VIPPOOL_NAME", default_value = "manila")]
    pub vippool_name: String,

    /// Path of the root export all shares live under
    #[arg(long, env = "VAST_ROOT_EXPORT", default_value = "/manila")]
    pub root_export: String,

    /// Verify the management API certificate
    #[arg(long, env = "VAST_SSL_VERIFY", default_value_t = false)]
    pub ssl_verify: bool,

    /// Backend name reported in capacity stats
    #[arg(long, env = "VAST_BACKEND_NAME")]
    pub backend_name: Option<String>,

    /// Local directory under which the root export is mounted
    #[arg(long, default_value = "/tmp/manila")]
    pub mount_dir: PathBuf,

    /// Command prefix for privileged operations (empty to run directly)
    #[arg(long, default_value = "sudo")]
    pub root_helper: String,

    /// HTTP connect timeout in seconds
    #[arg(long, default_value = "10")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "60")]
    pub timeout: u64,
}

impl Config {
    /// Minimal configuration with the usual defaults.
    pub fn new(mgmt_host: impl Into<String>) -> Self {
        Self {
            mgmt_host: mgmt_host.into(),
            mgmt_user: "admin".to_string(),
            mgmt_password: String::new(),
            vippool_name: "manila".to_string(),
            root_export: "/manila".to_string(),
            ssl_verify: false,
            backend_name: None,
            mount_dir: PathBuf::from("/tmp/manila"),
            root_helper: "sudo".to_string(),
            connect_timeout: 10,
            timeout: 60,
        }
    }

    /// Management API root URL.
    pub fn base_url(&self) -> String {
        format!("https://{host}/api", host = self.mgmt_host)
    }

    pub fn rest_config(&self) -> RestConfig {
        RestConfig {
            base_url: self.base_url(),
            username: self.mgmt_user.clone(),
            password: self.mgmt_password.clone(),
            ssl_verify: self.ssl_verify,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mgmt_host", &self.mgmt_host)
            .field("mgmt_user", &self.mgmt_user)
            .field("mgmt_password", &"***")
            .field("vippool_name", &self.vippool_name)
            .field("root_export", &self.root_export)
            .field("ssl_verify", &self.ssl_verify)
            .field("backend_name", &self.backend_name)
            .field("mount_dir", &self.mount_dir)
            .field("root_helper", &self.root_helper)
            .finish()
    }
}
