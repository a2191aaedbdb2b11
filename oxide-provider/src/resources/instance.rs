//! `oxide_instance`: virtual machines.

use std::time::Duration;

use async_trait::async_trait;
use oxide_api::ControlPlane;
use oxide_api::types::{self, InstanceCreate, InstanceNetworkInterfaces};
use tracing::{debug, info};

use super::timestamp;
use crate::resource::{BindingError, RemoteResource};
use crate::schema::{Attribute, AttributeType, ResourceSchema};
use crate::timeouts::Operation;
use crate::value::{Attributes, ID, ValueError};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct Instance {
    poll_interval: Duration,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Instance {
    /// How often to check a stopping instance before deleting it.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

fn apply(state: &mut Attributes, instance: &types::Instance) {
    state.set(ID, instance.id.as_str());
    state.set("project_id", instance.project_id.as_str());
    state.set("name", instance.name.as_str());
    state.set("description", instance.description.as_str());
    state.set("host_name", instance.hostname.as_str());
    state.set("memory", instance.memory);
    state.set("ncpus", instance.ncpus);
    state.set("run_state", instance.run_state.as_str());
    state.set("time_created", timestamp(&instance.time_created));
    state.set("time_modified", timestamp(&instance.time_modified));
    state.set(
        "time_run_state_updated",
        timestamp(&instance.time_run_state_updated),
    );
}

fn ncpus(config: &Attributes) -> Result<u16, ValueError> {
    let value = config.require_int64("ncpus")?;
    u16::try_from(value).map_err(|_| ValueError::OutOfRange {
        name: "ncpus".to_string(),
        value,
    })
}

#[async_trait]
impl RemoteResource for Instance {
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("oxide_instance", "instance")
            .attribute(
                Attribute::required("project_id", AttributeType::String)
                    .describe("ID of the project that will contain the instance."),
            )
            .attribute(Attribute::required("name", AttributeType::String))
            .attribute(Attribute::required("description", AttributeType::String))
            .attribute(
                Attribute::required("host_name", AttributeType::String)
                    .describe("Host name of the instance."),
            )
            .attribute(
                Attribute::required("memory", AttributeType::Int64)
                    .describe("Instance memory in bytes."),
            )
            .attribute(
                Attribute::required("ncpus", AttributeType::Int64)
                    .describe("Number of CPUs allocated for this instance."),
            )
            .attribute(
                Attribute::optional("start_on_create", AttributeType::Bool)
                    .describe("Start the instance after creating it. Defaults to true."),
            )
            .attribute(Attribute::computed(ID, AttributeType::String))
            .attribute(Attribute::computed("run_state", AttributeType::String))
            .attribute(Attribute::computed("time_created", AttributeType::String))
            .attribute(Attribute::computed("time_modified", AttributeType::String))
            .attribute(Attribute::computed(
                "time_run_state_updated",
                AttributeType::String,
            ))
            .without_update()
            .timeouts(&[Operation::Create, Operation::Read, Operation::Delete])
    }

    async fn create(
        &self,
        api: &dyn ControlPlane,
        config: &Attributes,
    ) -> Result<Attributes, BindingError> {
        let project = config.require_string("project_id")?;
        let body = InstanceCreate {
            name: config.require_string("name")?.to_string(),
            description: config.require_string("description")?.to_string(),
            hostname: config.require_string("host_name")?.to_string(),
            memory: config.require_unsigned("memory")?,
            ncpus: ncpus(config)?,
            disks: Vec::new(),
            external_ips: Vec::new(),
            network_interfaces: InstanceNetworkInterfaces::Default,
            start: config.bool("start_on_create")?.unwrap_or(true),
        };

        let instance = api.instance_create(project, &body).await?;

        let mut state = config.clone();
        apply(&mut state, &instance);
        Ok(state)
    }

    async fn read(
        &self,
        api: &dyn ControlPlane,
        id: &str,
        mut state: Attributes,
    ) -> Result<Attributes, BindingError> {
        let instance = api.instance_view(id).await?;
        apply(&mut state, &instance);
        Ok(state)
    }

    /// Instances must be stopped before they can be deleted.
    async fn delete(&self, api: &dyn ControlPlane, id: &str) -> Result<(), BindingError> {
        let mut instance = api.instance_view(id).await?;

        if !instance.run_state.is_deletable() {
            info!(
                "Stopping instance {} ({}) before deletion",
                id,
                instance.run_state.as_str()
            );
            api.instance_stop(id).await?;

            loop {
                instance = api.instance_view(id).await?;
                if instance.run_state.is_deletable() {
                    break;
                }
                debug!(
                    "Instance {} is {}, waiting",
                    id,
                    instance.run_state.as_str()
                );
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        api.instance_delete(id).await?;
        Ok(())
    }
}
