//! `oxide_disk`: block storage created blank, from an image or from a snapshot.

use async_trait::async_trait;
use oxide_api::ControlPlane;
use oxide_api::types::{self, DiskCreate, DiskSource};

use super::timestamp;
use crate::resource::{BindingError, RemoteResource};
use crate::schema::{Attribute, AttributeType, Constraint, ResourceSchema};
use crate::timeouts::Operation;
use crate::value::{Attributes, ID, ValueError};

const BLOCK_SIZE: &str = "block_size";
const SOURCE_IMAGE_ID: &str = "source_image_id";
const SOURCE_SNAPSHOT_ID: &str = "source_snapshot_id";

pub struct Disk;

/// Resolve the creation source from validated attributes.
fn source(config: &Attributes) -> Result<DiskSource, ValueError> {
    if let Some(image_id) = config.string(SOURCE_IMAGE_ID)? {
        return Ok(DiskSource::Image {
            image_id: image_id.to_string(),
        });
    }
    if let Some(snapshot_id) = config.string(SOURCE_SNAPSHOT_ID)? {
        return Ok(DiskSource::Snapshot {
            snapshot_id: snapshot_id.to_string(),
        });
    }
    if let Some(block_size) = config.unsigned(BLOCK_SIZE)? {
        return Ok(DiskSource::Blank { block_size });
    }
    Err(ValueError::Source(format!(
        "{}, {}, {}",
        BLOCK_SIZE, SOURCE_IMAGE_ID, SOURCE_SNAPSHOT_ID
    )))
}

/// Copy a remote disk into `state`.
///
/// Source attributes are only written when the remote reports them, so a
/// configured source never shows up as drift.
fn apply(state: &mut Attributes, disk: &types::Disk) {
    state.set(ID, disk.id.as_str());
    state.set("project_id", disk.project_id.as_str());
    state.set("name", disk.name.as_str());
    state.set("description", disk.description.as_str());
    state.set("size", disk.size);
    state.set("device_path", disk.device_path.as_str());
    state.set("state", disk.state.state.as_str());
    state.set("time_created", timestamp(&disk.time_created));
    state.set("time_modified", timestamp(&disk.time_modified));

    match (&disk.image_id, &disk.snapshot_id) {
        (Some(image_id), _) => state.set(SOURCE_IMAGE_ID, image_id.as_str()),
        (None, Some(snapshot_id)) => state.set(SOURCE_SNAPSHOT_ID, snapshot_id.as_str()),
        (None, None) => state.set(BLOCK_SIZE, disk.block_size),
    }
}

#[async_trait]
impl RemoteResource for Disk {
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("oxide_disk", "disk")
            .attribute(
                Attribute::required("project_id", AttributeType::String)
                    .describe("ID of the project that will contain the disk."),
            )
            .attribute(
                Attribute::required("name", AttributeType::String).describe("Name of the disk."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .describe("Description for the disk."),
            )
            .attribute(
                Attribute::required("size", AttributeType::Int64)
                    .describe("Size of the disk in bytes."),
            )
            .attribute(
                Attribute::optional(BLOCK_SIZE, AttributeType::Int64)
                    .describe("Block size of a blank disk, in bytes."),
            )
            .attribute(
                Attribute::optional(SOURCE_IMAGE_ID, AttributeType::String)
                    .describe("ID of the image to copy into the disk."),
            )
            .attribute(
                Attribute::optional(SOURCE_SNAPSHOT_ID, AttributeType::String)
                    .describe("ID of the snapshot to copy into the disk."),
            )
            .attribute(
                Attribute::computed(ID, AttributeType::String)
                    .describe("Unique, immutable, system-controlled identifier of the disk."),
            )
            .attribute(Attribute::computed("device_path", AttributeType::String))
            .attribute(Attribute::computed("state", AttributeType::String))
            .attribute(Attribute::computed("time_created", AttributeType::String))
            .attribute(Attribute::computed("time_modified", AttributeType::String))
            .constraint(Constraint::ExactlyOneOf(vec![
                BLOCK_SIZE,
                SOURCE_IMAGE_ID,
                SOURCE_SNAPSHOT_ID,
            ]))
            .without_update()
            .timeouts(&[Operation::Create, Operation::Read, Operation::Delete])
    }

    async fn create(
        &self,
        api: &dyn ControlPlane,
        config: &Attributes,
    ) -> Result<Attributes, BindingError> {
        let project = config.require_string("project_id")?;
        let body = DiskCreate {
            name: config.require_string("name")?.to_string(),
            description: config.require_string("description")?.to_string(),
            size: config.require_unsigned("size")?,
            disk_source: source(config)?,
        };

        let disk = api.disk_create(project, &body).await?;

        let mut state = config.clone();
        apply(&mut state, &disk);
        Ok(state)
    }

    async fn read(
        &self,
        api: &dyn ControlPlane,
        id: &str,
        mut state: Attributes,
    ) -> Result<Attributes, BindingError> {
        let disk = api.disk_view(id).await?;
        apply(&mut state, &disk);
        Ok(state)
    }

    async fn delete(&self, api: &dyn ControlPlane, id: &str) -> Result<(), BindingError> {
        api.disk_delete(id).await?;
        Ok(())
    }
}
