//! ControlPlane trait definition.
//!
//! This trait hides the transport so the provider works with domain objects
//! instead of requests. Selectors accept either a name or an ID; names are
//! only unique within a project, so callers should pass IDs where they have
//! them.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    Disk, DiskCreate, Image, ImageCreate, Instance, InstanceCreate, IpPool, IpPoolCreate,
    IpPoolUpdate,
};

/// Remote operations used by the provider.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // === Disks ===

    /// Create a disk in a project.
    async fn disk_create(&self, project: &str, body: &DiskCreate) -> Result<Disk>;

    /// Get a disk by ID.
    async fn disk_view(&self, disk: &str) -> Result<Disk>;

    /// List all disks in a project.
    async fn disk_list(&self, project: &str) -> Result<Vec<Disk>>;

    /// Delete a disk.
    async fn disk_delete(&self, disk: &str) -> Result<()>;

    // === Images ===

    /// Create an image in a project.
    async fn image_create(&self, project: &str, body: &ImageCreate) -> Result<Image>;

    /// Get an image by ID.
    async fn image_view(&self, image: &str) -> Result<Image>;

    /// List all images in a project.
    async fn image_list(&self, project: &str) -> Result<Vec<Image>>;

    /// Delete an image.
    async fn image_delete(&self, image: &str) -> Result<()>;

    // === Instances ===

    /// Create an instance in a project.
    async fn instance_create(&self, project: &str, body: &InstanceCreate) -> Result<Instance>;

    /// Get an instance by ID.
    async fn instance_view(&self, instance: &str) -> Result<Instance>;

    /// List all instances in a project.
    async fn instance_list(&self, project: &str) -> Result<Vec<Instance>>;

    /// Request an instance stop. Returns once the request is accepted.
    async fn instance_stop(&self, instance: &str) -> Result<Instance>;

    /// Delete a stopped instance.
    async fn instance_delete(&self, instance: &str) -> Result<()>;

    // === IP pools ===

    /// Create an IP pool.
    async fn ip_pool_create(&self, body: &IpPoolCreate) -> Result<IpPool>;

    /// Get an IP pool by ID.
    async fn ip_pool_view(&self, pool: &str) -> Result<IpPool>;

    /// List all IP pools.
    async fn ip_pool_list(&self) -> Result<Vec<IpPool>>;

    /// Update an IP pool's identity fields.
    async fn ip_pool_update(&self, pool: &str, body: &IpPoolUpdate) -> Result<IpPool>;

    /// Delete an IP pool.
    async fn ip_pool_delete(&self, pool: &str) -> Result<()>;
}
