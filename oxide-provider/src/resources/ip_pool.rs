//! `oxide_ip_pool`: silo-level IP address pools. Name and description can be
//! changed in place.

use async_trait::async_trait;
use oxide_api::ControlPlane;
use oxide_api::types::{self, IpPoolCreate, IpPoolUpdate};

use super::timestamp;
use crate::resource::{BindingError, RemoteResource};
use crate::schema::{Attribute, AttributeType, ResourceSchema};
use crate::timeouts::Operation;
use crate::value::{Attributes, ID};

pub struct IpPool;

fn apply(state: &mut Attributes, pool: &types::IpPool) {
    state.set(ID, pool.id.as_str());
    state.set("name", pool.name.as_str());
    state.set("description", pool.description.as_str());
    state.set("time_created", timestamp(&pool.time_created));
    state.set("time_modified", timestamp(&pool.time_modified));
}

#[async_trait]
impl RemoteResource for IpPool {
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("oxide_ip_pool", "IP pool")
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .mutable()
                    .describe("Name of the IP pool."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .mutable()
                    .describe("Description for the IP pool."),
            )
            .attribute(Attribute::computed(ID, AttributeType::String))
            .attribute(Attribute::computed("time_created", AttributeType::String))
            .attribute(Attribute::computed("time_modified", AttributeType::String))
            .timeouts(&Operation::ALL)
    }

    async fn create(
        &self,
        api: &dyn ControlPlane,
        config: &Attributes,
    ) -> Result<Attributes, BindingError> {
        let body = IpPoolCreate {
            name: config.require_string("name")?.to_string(),
            description: config.require_string("description")?.to_string(),
        };

        let pool = api.ip_pool_create(&body).await?;

        let mut state = config.clone();
        apply(&mut state, &pool);
        Ok(state)
    }

    async fn read(
        &self,
        api: &dyn ControlPlane,
        id: &str,
        mut state: Attributes,
    ) -> Result<Attributes, BindingError> {
        let pool = api.ip_pool_view(id).await?;
        apply(&mut state, &pool);
        Ok(state)
    }

    async fn update(
        &self,
        api: &dyn ControlPlane,
        id: &str,
        changes: &Attributes,
        mut prior: Attributes,
    ) -> Result<Attributes, BindingError> {
        let body = IpPoolUpdate {
            name: changes.string("name")?.map(String::from),
            description: changes.string("description")?.map(String::from),
        };

        let pool = api.ip_pool_update(id, &body).await?;
        apply(&mut prior, &pool);
        Ok(prior)
    }

    async fn delete(&self, api: &dyn ControlPlane, id: &str) -> Result<(), BindingError> {
        api.ip_pool_delete(id).await?;
        Ok(())
    }
}
