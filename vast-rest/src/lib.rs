//! vast-rest: generic REST client for the VAST management API
//!
//! Collections are addressed by name rather than through one method per
//! resource type. Any collection (`views`, `quotas`, `monitors/ad_hoc_query`,
//! ...) can be queried with filters or mutated with an explicit verb.

pub mod client;
pub mod error;
pub mod record;

pub use client::{Backend, RestClient, RestConfig, Verb};
pub use error::{Error, Result};
pub use record::{Payload, Record};
