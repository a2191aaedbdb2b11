//! `oxide_image`: bootable images fetched from a URL or copied from a snapshot.
//!
//! The API offers neither update nor delete for images.

use async_trait::async_trait;
use oxide_api::ControlPlane;
use oxide_api::types::{self, ImageCreate, ImageSource};
use serde_json::json;

use super::timestamp;
use crate::resource::{BindingError, RemoteResource};
use crate::schema::{Attribute, AttributeType, Constraint, ResourceSchema};
use crate::timeouts::Operation;
use crate::value::{Attributes, ID, ValueError};

const BLOCK_SIZE: &str = "block_size";
const SOURCE_URL: &str = "source_url";
const SOURCE_SNAPSHOT_ID: &str = "source_snapshot_id";

pub struct Image;

fn source(config: &Attributes) -> Result<ImageSource, ValueError> {
    if let Some(id) = config.string(SOURCE_SNAPSHOT_ID)? {
        return Ok(ImageSource::Snapshot { id: id.to_string() });
    }
    if let Some(url) = config.string(SOURCE_URL)? {
        return Ok(ImageSource::Url {
            url: url.to_string(),
            block_size: config.require_unsigned(BLOCK_SIZE)?,
        });
    }
    Err(ValueError::Source(format!(
        "{}, {}",
        SOURCE_URL, SOURCE_SNAPSHOT_ID
    )))
}

/// Copy a remote image into `state`.
///
/// Silo-visible images carry no project and snapshot-sourced images no URL;
/// in both cases the recorded value is kept. The block size is only
/// configurable for URL sources and is left alone otherwise.
fn apply(state: &mut Attributes, image: &types::Image) {
    state.set(ID, image.id.as_str());
    state.set("name", image.name.as_str());
    state.set("description", image.description.as_str());
    state.set("os", image.os.as_str());
    state.set("version", image.version.as_str());
    state.set("size", image.size);
    state.set("time_created", timestamp(&image.time_created));
    state.set("time_modified", timestamp(&image.time_modified));
    state.set_opt(
        "digest",
        image
            .digest
            .as_ref()
            .map(|d| json!({"type": d.kind, "value": d.value})),
    );

    if let Some(project_id) = image.project_id.as_deref().filter(|p| !p.is_empty()) {
        state.set("project_id", project_id);
    }
    if let Some(url) = image.url.as_deref().filter(|u| !u.is_empty()) {
        state.set(SOURCE_URL, url);
        state.set(BLOCK_SIZE, image.block_size);
    }
}

#[async_trait]
impl RemoteResource for Image {
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("oxide_image", "image")
            .attribute(
                Attribute::required("project_id", AttributeType::String)
                    .describe("ID of the project that will contain the image."),
            )
            .attribute(
                Attribute::required("name", AttributeType::String).describe("Name of the image."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .describe("Description for the image."),
            )
            .attribute(
                Attribute::required("os", AttributeType::String)
                    .describe("OS image distribution. Example: alpine"),
            )
            .attribute(
                Attribute::required("version", AttributeType::String)
                    .describe("OS image version. Example: 3.16"),
            )
            .attribute(
                Attribute::optional(BLOCK_SIZE, AttributeType::Int64)
                    .describe("Size of blocks in bytes. Required with source_url."),
            )
            .attribute(
                Attribute::optional(SOURCE_URL, AttributeType::String)
                    .describe("URL to fetch the image contents from."),
            )
            .attribute(
                Attribute::optional(SOURCE_SNAPSHOT_ID, AttributeType::String)
                    .describe("Snapshot ID of the image source."),
            )
            .attribute(
                Attribute::computed(
                    "digest",
                    AttributeType::Object(vec![
                        ("type", AttributeType::String),
                        ("value", AttributeType::String),
                    ]),
                )
                .describe("Hash of the image contents, if applicable."),
            )
            .attribute(
                Attribute::computed(ID, AttributeType::String)
                    .describe("Unique, immutable, system-controlled identifier of the image."),
            )
            .attribute(
                Attribute::computed("size", AttributeType::Int64)
                    .describe("Total size in bytes."),
            )
            .attribute(Attribute::computed("time_created", AttributeType::String))
            .attribute(Attribute::computed("time_modified", AttributeType::String))
            .constraint(Constraint::ExactlyOneOf(vec![
                SOURCE_URL,
                SOURCE_SNAPSHOT_ID,
            ]))
            .constraint(Constraint::AlsoRequires {
                attribute: SOURCE_URL,
                requires: vec![BLOCK_SIZE],
            })
            .constraint(Constraint::ConflictsWith {
                attribute: SOURCE_SNAPSHOT_ID,
                conflicts: vec![BLOCK_SIZE],
            })
            .without_update()
            .without_delete()
            .timeouts(&[Operation::Create, Operation::Read])
    }

    async fn create(
        &self,
        api: &dyn ControlPlane,
        config: &Attributes,
    ) -> Result<Attributes, BindingError> {
        let project = config.require_string("project_id")?;
        let body = ImageCreate {
            name: config.require_string("name")?.to_string(),
            description: config.require_string("description")?.to_string(),
            os: config.require_string("os")?.to_string(),
            version: config.require_string("version")?.to_string(),
            source: source(config)?,
        };

        let image = api.image_create(project, &body).await?;

        let mut state = config.clone();
        apply(&mut state, &image);
        Ok(state)
    }

    async fn read(
        &self,
        api: &dyn ControlPlane,
        id: &str,
        mut state: Attributes,
    ) -> Result<Attributes, BindingError> {
        let image = api.image_view(id).await?;
        apply(&mut state, &image);
        Ok(state)
    }
}
