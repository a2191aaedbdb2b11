//! In-memory control plane.
//!
//! Holds objects in process and mimics the API's observable behaviour:
//! name uniqueness, not-found on missing IDs and asynchronous instance stop.
//! Every call is counted, failures can be injected one call at a time, and a
//! fixed latency can be added to exercise timeouts.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::client::ControlPlane;
use crate::error::{ApiError, Result};
use crate::types::{
    Disk, DiskCreate, DiskSource, DiskState, Image, ImageCreate, ImageSource, Instance,
    InstanceCreate, InstanceState, IpPool, IpPoolCreate, IpPoolUpdate,
};

/// Size reported for images fetched from a URL.
const URL_IMAGE_SIZE: u64 = 1 << 30;

#[derive(Default)]
struct Inner {
    disks: HashMap<String, Disk>,
    images: HashMap<String, Image>,
    instances: HashMap<String, Instance>,
    ip_pools: HashMap<String, IpPool>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, ApiError>,
    hide_image_project: bool,
}

impl Inner {
    /// Count the call and hand out an injected failure, if any.
    fn enter(&mut self, op: &'static str) -> Result<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Find an object by ID, falling back to name.
fn lookup<'a, T>(
    map: &'a HashMap<String, T>,
    key: &str,
    name_of: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    map.get(key)
        .or_else(|| map.values().find(|v| name_of(v) == key))
}

fn not_found(what: &str, key: &str) -> ApiError {
    ApiError::NotFound(format!("{} with id or name \"{}\"", what, key))
}

/// Control plane backed by in-process maps.
#[derive(Default)]
pub struct MemoryControlPlane {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next call to `op` fail with `err`.
    pub async fn fail_next(&self, op: &'static str, err: ApiError) {
        self.inner.lock().await.failures.insert(op, err);
    }

    /// Number of calls made to `op` so far.
    pub async fn calls(&self, op: &str) -> usize {
        self.inner.lock().await.calls.get(op).copied().unwrap_or(0)
    }

    /// Number of calls made to any operation so far.
    pub async fn total_calls(&self) -> usize {
        self.inner.lock().await.calls.values().sum()
    }

    /// Drop an object behind the caller's back, as another client would.
    /// Returns whether anything was removed.
    pub async fn forget(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        inner.disks.remove(id).is_some()
            || inner.images.remove(id).is_some()
            || inner.instances.remove(id).is_some()
            || inner.ip_pools.remove(id).is_some()
    }

    /// Serve image views without a project association, as happens for
    /// silo-visible images.
    pub async fn hide_image_project(&self, hide: bool) {
        self.inner.lock().await.hide_image_project = hide;
    }

    async fn enter(&self, op: &'static str) -> Result<tokio::sync::MutexGuard<'_, Inner>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut inner = self.inner.lock().await;
        inner.enter(op)?;
        Ok(inner)
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn disk_create(&self, project: &str, body: &DiskCreate) -> Result<Disk> {
        let mut inner = self.enter("disk_create").await?;

        if inner
            .disks
            .values()
            .any(|d| d.project_id == project && d.name == body.name)
        {
            return Err(ApiError::already_exists("disk", &body.name));
        }

        let (block_size, image_id, snapshot_id) = match &body.disk_source {
            DiskSource::Blank { block_size } => (*block_size, None, None),
            DiskSource::Image { image_id } => {
                let image = lookup(&inner.images, image_id, |i| i.name.as_str())
                    .ok_or_else(|| not_found("image", image_id))?;
                (image.block_size, Some(image.id.clone()), None)
            }
            DiskSource::Snapshot { snapshot_id } => (512, None, Some(snapshot_id.clone())),
        };

        if block_size == 0 || body.size % block_size != 0 {
            return Err(ApiError::Status {
                status: 400,
                error_code: Some("InvalidValue".to_string()),
                message: format!(
                    "disk size {} must be a multiple of block size {}",
                    body.size, block_size
                ),
            });
        }

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let disk = Disk {
            id: id.clone(),
            name: body.name.clone(),
            description: body.description.clone(),
            project_id: project.to_string(),
            size: body.size,
            block_size,
            image_id,
            snapshot_id,
            device_path: format!("/mnt/{}", body.name),
            state: DiskState {
                state: "detached".to_string(),
                instance: None,
            },
            time_created: now,
            time_modified: now,
        };
        inner.disks.insert(id, disk.clone());
        Ok(disk)
    }

    async fn disk_view(&self, disk: &str) -> Result<Disk> {
        let inner = self.enter("disk_view").await?;
        lookup(&inner.disks, disk, |d| d.name.as_str())
            .cloned()
            .ok_or_else(|| not_found("disk", disk))
    }

    async fn disk_list(&self, project: &str) -> Result<Vec<Disk>> {
        let inner = self.enter("disk_list").await?;
        Ok(inner
            .disks
            .values()
            .filter(|d| d.project_id == project)
            .cloned()
            .collect())
    }

    async fn disk_delete(&self, disk: &str) -> Result<()> {
        let mut inner = self.enter("disk_delete").await?;
        let id = lookup(&inner.disks, disk, |d| d.name.as_str())
            .map(|d| d.id.clone())
            .ok_or_else(|| not_found("disk", disk))?;
        inner.disks.remove(&id);
        Ok(())
    }

    async fn image_create(&self, project: &str, body: &ImageCreate) -> Result<Image> {
        let mut inner = self.enter("image_create").await?;

        if inner
            .images
            .values()
            .any(|i| i.project_id.as_deref() == Some(project) && i.name == body.name)
        {
            return Err(ApiError::already_exists("image", &body.name));
        }

        let (url, block_size, size) = match &body.source {
            ImageSource::Url { url, block_size } => {
                (Some(url.clone()), *block_size, URL_IMAGE_SIZE)
            }
            ImageSource::Snapshot { .. } => (None, 512, URL_IMAGE_SIZE),
        };

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let image = Image {
            id: id.clone(),
            name: body.name.clone(),
            description: body.description.clone(),
            project_id: Some(project.to_string()),
            os: body.os.clone(),
            version: body.version.clone(),
            url,
            digest: None,
            block_size,
            size,
            time_created: now,
            time_modified: now,
        };
        inner.images.insert(id, image.clone());
        Ok(image)
    }

    async fn image_view(&self, image: &str) -> Result<Image> {
        let inner = self.enter("image_view").await?;
        let mut found = lookup(&inner.images, image, |i| i.name.as_str())
            .cloned()
            .ok_or_else(|| not_found("image", image))?;
        if inner.hide_image_project {
            found.project_id = None;
        }
        Ok(found)
    }

    async fn image_list(&self, project: &str) -> Result<Vec<Image>> {
        let inner = self.enter("image_list").await?;
        Ok(inner
            .images
            .values()
            .filter(|i| i.project_id.as_deref() == Some(project))
            .cloned()
            .collect())
    }

    async fn image_delete(&self, image: &str) -> Result<()> {
        let mut inner = self.enter("image_delete").await?;
        let id = lookup(&inner.images, image, |i| i.name.as_str())
            .map(|i| i.id.clone())
            .ok_or_else(|| not_found("image", image))?;
        inner.images.remove(&id);
        Ok(())
    }

    async fn instance_create(&self, project: &str, body: &InstanceCreate) -> Result<Instance> {
        let mut inner = self.enter("instance_create").await?;

        if inner
            .instances
            .values()
            .any(|i| i.project_id == project && i.name == body.name)
        {
            return Err(ApiError::already_exists("instance", &body.name));
        }

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let instance = Instance {
            id: id.clone(),
            name: body.name.clone(),
            description: body.description.clone(),
            project_id: project.to_string(),
            hostname: body.hostname.clone(),
            memory: body.memory,
            ncpus: body.ncpus,
            run_state: if body.start {
                InstanceState::Running
            } else {
                InstanceState::Stopped
            },
            time_created: now,
            time_modified: now,
            time_run_state_updated: now,
        };
        inner.instances.insert(id, instance.clone());
        Ok(instance)
    }

    async fn instance_view(&self, instance: &str) -> Result<Instance> {
        let mut inner = self.enter("instance_view").await?;
        let id = lookup(&inner.instances, instance, |i| i.name.as_str())
            .map(|i| i.id.clone())
            .ok_or_else(|| not_found("instance", instance))?;

        let Some(found) = inner.instances.get_mut(&id) else {
            return Err(not_found("instance", instance));
        };
        // A stop finishes by the time anyone looks again.
        if found.run_state == InstanceState::Stopping {
            found.run_state = InstanceState::Stopped;
            found.time_run_state_updated = Utc::now();
        }
        Ok(found.clone())
    }

    async fn instance_list(&self, project: &str) -> Result<Vec<Instance>> {
        let inner = self.enter("instance_list").await?;
        Ok(inner
            .instances
            .values()
            .filter(|i| i.project_id == project)
            .cloned()
            .collect())
    }

    async fn instance_stop(&self, instance: &str) -> Result<Instance> {
        let mut inner = self.enter("instance_stop").await?;
        let id = lookup(&inner.instances, instance, |i| i.name.as_str())
            .map(|i| i.id.clone())
            .ok_or_else(|| not_found("instance", instance))?;

        let Some(found) = inner.instances.get_mut(&id) else {
            return Err(not_found("instance", instance));
        };
        if !found.run_state.is_deletable() {
            found.run_state = InstanceState::Stopping;
            found.time_run_state_updated = Utc::now();
        }
        Ok(found.clone())
    }

    async fn instance_delete(&self, instance: &str) -> Result<()> {
        let mut inner = self.enter("instance_delete").await?;
        let (id, state) = lookup(&inner.instances, instance, |i| i.name.as_str())
            .map(|i| (i.id.clone(), i.run_state))
            .ok_or_else(|| not_found("instance", instance))?;

        if !state.is_deletable() {
            return Err(ApiError::invalid_state(format!(
                "instance must be stopped to be deleted, it is {}",
                state.as_str()
            )));
        }
        inner.instances.remove(&id);
        Ok(())
    }

    async fn ip_pool_create(&self, body: &IpPoolCreate) -> Result<IpPool> {
        let mut inner = self.enter("ip_pool_create").await?;

        if inner.ip_pools.values().any(|p| p.name == body.name) {
            return Err(ApiError::already_exists("ip-pool", &body.name));
        }

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let pool = IpPool {
            id: id.clone(),
            name: body.name.clone(),
            description: body.description.clone(),
            time_created: now,
            time_modified: now,
        };
        inner.ip_pools.insert(id, pool.clone());
        Ok(pool)
    }

    async fn ip_pool_view(&self, pool: &str) -> Result<IpPool> {
        let inner = self.enter("ip_pool_view").await?;
        lookup(&inner.ip_pools, pool, |p| p.name.as_str())
            .cloned()
            .ok_or_else(|| not_found("ip-pool", pool))
    }

    async fn ip_pool_list(&self) -> Result<Vec<IpPool>> {
        let inner = self.enter("ip_pool_list").await?;
        Ok(inner.ip_pools.values().cloned().collect())
    }

    async fn ip_pool_update(&self, pool: &str, body: &IpPoolUpdate) -> Result<IpPool> {
        let mut inner = self.enter("ip_pool_update").await?;
        let id = lookup(&inner.ip_pools, pool, |p| p.name.as_str())
            .map(|p| p.id.clone())
            .ok_or_else(|| not_found("ip-pool", pool))?;

        if let Some(name) = &body.name
            && inner.ip_pools.values().any(|p| p.id != id && &p.name == name)
        {
            return Err(ApiError::already_exists("ip-pool", name));
        }

        let Some(found) = inner.ip_pools.get_mut(&id) else {
            return Err(not_found("ip-pool", pool));
        };
        if let Some(name) = &body.name {
            found.name = name.clone();
        }
        if let Some(description) = &body.description {
            found.description = description.clone();
        }
        found.time_modified = Utc::now();
        Ok(found.clone())
    }

    async fn ip_pool_delete(&self, pool: &str) -> Result<()> {
        let mut inner = self.enter("ip_pool_delete").await?;
        let id = lookup(&inner.ip_pools, pool, |p| p.name.as_str())
            .map(|p| p.id.clone())
            .ok_or_else(|| not_found("ip-pool", pool))?;
        inner.ip_pools.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstanceNetworkInterfaces;

    fn blank_disk(name: &str) -> DiskCreate {
        DiskCreate {
            name: name.to_string(),
            description: "scratch".to_string(),
            size: 1 << 30,
            disk_source: DiskSource::Blank { block_size: 512 },
        }
    }

    #[tokio::test]
    async fn test_disk_lifecycle() {
        let api = MemoryControlPlane::new();

        let disk = api.disk_create("proj", &blank_disk("data")).await.unwrap();
        assert_eq!(disk.block_size, 512);
        assert_eq!(api.disk_view(&disk.id).await.unwrap(), disk);
        assert_eq!(api.disk_view("data").await.unwrap().id, disk.id);
        assert_eq!(api.disk_list("proj").await.unwrap().len(), 1);
        assert!(api.disk_list("other").await.unwrap().is_empty());

        api.disk_delete(&disk.id).await.unwrap();
        assert!(api.disk_view(&disk.id).await.unwrap_err().is_not_found());
        assert!(api.disk_delete(&disk.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let api = MemoryControlPlane::new();
        api.disk_create("proj", &blank_disk("data")).await.unwrap();

        let err = api
            .disk_create("proj", &blank_disk("data"))
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("already exists"));

        // Names are scoped per project.
        api.disk_create("other", &blank_disk("data")).await.unwrap();
    }

    #[tokio::test]
    async fn test_size_must_align_with_block_size() {
        let api = MemoryControlPlane::new();
        let mut body = blank_disk("odd");
        body.size = 1000;
        let err = api.disk_create("proj", &body).await.unwrap_err();
        assert!(err.to_string().contains("multiple of block size"));
    }

    #[tokio::test]
    async fn test_call_counting_and_fault_injection() {
        let api = MemoryControlPlane::new();
        api.fail_next("ip_pool_list", ApiError::Transport("connection reset".into()))
            .await;

        let err = api.ip_pool_list().await.unwrap_err();
        assert_eq!(err, ApiError::Transport("connection reset".into()));
        assert!(api.ip_pool_list().await.is_ok());

        assert_eq!(api.calls("ip_pool_list").await, 2);
        assert_eq!(api.calls("ip_pool_view").await, 0);
        assert_eq!(api.total_calls().await, 2);
    }

    #[tokio::test]
    async fn test_instance_stop_then_delete() {
        let api = MemoryControlPlane::new();
        let instance = api
            .instance_create(
                "proj",
                &InstanceCreate {
                    name: "web".into(),
                    description: "web server".into(),
                    hostname: "web".into(),
                    memory: 1 << 30,
                    ncpus: 2,
                    disks: vec![],
                    external_ips: vec![],
                    network_interfaces: InstanceNetworkInterfaces::Default,
                    start: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(instance.run_state, InstanceState::Running);

        let err = api.instance_delete(&instance.id).await.unwrap_err();
        assert!(err.to_string().contains("must be stopped"));

        let stopping = api.instance_stop(&instance.id).await.unwrap();
        assert_eq!(stopping.run_state, InstanceState::Stopping);
        let stopped = api.instance_view(&instance.id).await.unwrap();
        assert_eq!(stopped.run_state, InstanceState::Stopped);

        api.instance_delete(&instance.id).await.unwrap();
        assert!(!api.forget(&instance.id).await);
    }

    #[tokio::test]
    async fn test_ip_pool_update() {
        let api = MemoryControlPlane::new();
        let pool = api
            .ip_pool_create(&IpPoolCreate {
                name: "public".into(),
                description: "public addresses".into(),
            })
            .await
            .unwrap();

        let updated = api
            .ip_pool_update(
                &pool.id,
                &IpPoolUpdate {
                    name: None,
                    description: Some("internet facing".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "public");
        assert_eq!(updated.description, "internet facing");
        assert_eq!(updated.time_created, pool.time_created);
    }

    #[tokio::test]
    async fn test_hidden_image_project() {
        let api = MemoryControlPlane::new();
        let image = api
            .image_create(
                "proj",
                &ImageCreate {
                    name: "alpine".into(),
                    description: "alpine".into(),
                    os: "alpine".into(),
                    version: "3.16".into(),
                    source: ImageSource::Url {
                        url: "https://example.com/alpine.raw".into(),
                        block_size: 512,
                    },
                },
            )
            .await
            .unwrap();
        assert_eq!(image.project_id.as_deref(), Some("proj"));

        api.hide_image_project(true).await;
        assert!(api.image_view(&image.id).await.unwrap().project_id.is_none());
    }
}
