//! Request and response models of the control-plane API.
//!
//! Field names follow the wire format; objects are keyed by a
//! system-assigned UUID string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of a paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsPage<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// Error body returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    pub message: String,
}

// =============================================================================
// Disks
// =============================================================================

/// Where a new disk's contents come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiskSource {
    /// Empty disk with the given block size.
    Blank { block_size: u64 },
    /// Copy of a snapshot.
    Snapshot { snapshot_id: String },
    /// Copy of an image.
    Image { image_id: String },
}

/// Request to create a disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskCreate {
    pub name: String,
    pub description: String,
    pub size: u64,
    pub disk_source: DiskSource,
}

/// Disk lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskState {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// A disk as held by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub id: String,
    pub name: String,
    pub description: String,
    pub project_id: String,
    pub size: u64,
    pub block_size: u64,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    pub device_path: String,
    pub state: DiskState,
    pub time_created: DateTime<Utc>,
    pub time_modified: DateTime<Utc>,
}

// =============================================================================
// Images
// =============================================================================

/// Where a new image's contents come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Fetched from a URL; the block size must be given.
    Url { url: String, block_size: u64 },
    /// Copy of a snapshot.
    Snapshot { id: String },
}

/// Request to create an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageCreate {
    pub name: String,
    pub description: String,
    pub os: String,
    pub version: String,
    pub source: ImageSource,
}

/// Hash of an image's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// An image as held by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Absent for silo-visible images.
    #[serde(default)]
    pub project_id: Option<String>,
    pub os: String,
    pub version: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub digest: Option<Digest>,
    pub block_size: u64,
    pub size: u64,
    pub time_created: DateTime<Utc>,
    pub time_modified: DateTime<Utc>,
}

// =============================================================================
// Instances
// =============================================================================

/// Run state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Creating,
    Starting,
    Running,
    Stopping,
    Stopped,
    Rebooting,
    Migrating,
    Repairing,
    Failed,
    Destroyed,
    #[serde(other)]
    Unknown,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Creating => "creating",
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Rebooting => "rebooting",
            InstanceState::Migrating => "migrating",
            InstanceState::Repairing => "repairing",
            InstanceState::Failed => "failed",
            InstanceState::Destroyed => "destroyed",
            InstanceState::Unknown => "unknown",
        }
    }

    /// Whether the instance may be deleted in this state.
    pub fn is_deletable(&self) -> bool {
        matches!(self, InstanceState::Stopped | InstanceState::Failed)
    }
}

/// Network interface selection for a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstanceNetworkInterfaces {
    Default,
    None,
}

/// Request to create an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceCreate {
    pub name: String,
    pub description: String,
    pub hostname: String,
    pub memory: u64,
    pub ncpus: u16,
    #[serde(default)]
    pub disks: Vec<serde_json::Value>,
    #[serde(default)]
    pub external_ips: Vec<serde_json::Value>,
    pub network_interfaces: InstanceNetworkInterfaces,
    pub start: bool,
}

/// An instance as held by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub description: String,
    pub project_id: String,
    pub hostname: String,
    pub memory: u64,
    pub ncpus: u16,
    pub run_state: InstanceState,
    pub time_created: DateTime<Utc>,
    pub time_modified: DateTime<Utc>,
    pub time_run_state_updated: DateTime<Utc>,
}

// =============================================================================
// IP pools
// =============================================================================

/// Request to create an IP pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpPoolCreate {
    pub name: String,
    pub description: String,
}

/// Request to update an IP pool. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpPoolUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An IP pool as held by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpPool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub time_created: DateTime<Utc>,
    pub time_modified: DateTime<Utc>,
}
