//! HTTP implementation of [`ControlPlane`].

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::client::ControlPlane;
use crate::error::{ApiError, Result};
use crate::types::{
    Disk, DiskCreate, ErrorBody, Image, ImageCreate, Instance, InstanceCreate, IpPool,
    IpPoolCreate, IpPoolUpdate, ResultsPage,
};

const USER_AGENT: &str = concat!("oxide-provider/", env!("CARGO_PKG_VERSION"));

/// Page size used when walking listings.
const PAGE_LIMIT: u32 = 100;

/// Client for the control-plane REST API.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client for `host` authenticating with `token`.
    pub fn new(host: &str, token: &str) -> Result<Self> {
        let base = Url::parse(host)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid host {}: {}", host, e)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidRequest(format!(
                "host {} cannot be used as a base URL",
                host
            )));
        }

        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            http,
            base,
            token: token.to_string(),
        })
    }

    /// Base address requests are sent to.
    pub fn host(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest(format!("invalid base URL {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn project_endpoint(&self, segments: &[&str], project: &str) -> Result<Url> {
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut().append_pair("project", project);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("{} {}", method, url);
        self.http.request(method, url).bearer_auth(&self.token)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = check(req.send().await?).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_empty(&self, req: RequestBuilder) -> Result<()> {
        check(req.send().await?).await?;
        Ok(())
    }

    /// Walk every page of a listing.
    async fn list_all<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        project: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.endpoint(segments)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &PAGE_LIMIT.to_string());
                // The page token carries the scan parameters of the first request.
                if let Some(token) = &page_token {
                    query.append_pair("page_token", token);
                } else if let Some(project) = project {
                    query.append_pair("project", project);
                }
            }

            let page: ResultsPage<T> = self.send(self.request(Method::GET, url)).await?;
            items.extend(page.items);

            match page.next_page {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(items)
    }
}

/// Turn a non-success response into a classified error.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

fn error_from_body(status: StatusCode, body: &str) -> ApiError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();

    if let Some(request_id) = parsed.as_ref().and_then(|b| b.request_id.as_deref()) {
        debug!("request {} failed with {}", request_id, status);
    }

    let message = match &parsed {
        Some(b) => b.message.clone(),
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };

    if status == StatusCode::NOT_FOUND {
        return ApiError::NotFound(message);
    }

    ApiError::Status {
        status: status.as_u16(),
        error_code: parsed.and_then(|b| b.error_code),
        message,
    }
}

#[async_trait]
impl ControlPlane for HttpClient {
    async fn disk_create(&self, project: &str, body: &DiskCreate) -> Result<Disk> {
        let url = self.project_endpoint(&["v1", "disks"], project)?;
        self.send(self.request(Method::POST, url).json(body)).await
    }

    async fn disk_view(&self, disk: &str) -> Result<Disk> {
        let url = self.endpoint(&["v1", "disks", disk])?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn disk_list(&self, project: &str) -> Result<Vec<Disk>> {
        self.list_all(&["v1", "disks"], Some(project)).await
    }

    async fn disk_delete(&self, disk: &str) -> Result<()> {
        let url = self.endpoint(&["v1", "disks", disk])?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }

    async fn image_create(&self, project: &str, body: &ImageCreate) -> Result<Image> {
        let url = self.project_endpoint(&["v1", "images"], project)?;
        self.send(self.request(Method::POST, url).json(body)).await
    }

    async fn image_view(&self, image: &str) -> Result<Image> {
        let url = self.endpoint(&["v1", "images", image])?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn image_list(&self, project: &str) -> Result<Vec<Image>> {
        self.list_all(&["v1", "images"], Some(project)).await
    }

    async fn image_delete(&self, image: &str) -> Result<()> {
        let url = self.endpoint(&["v1", "images", image])?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }

    async fn instance_create(&self, project: &str, body: &InstanceCreate) -> Result<Instance> {
        let url = self.project_endpoint(&["v1", "instances"], project)?;
        self.send(self.request(Method::POST, url).json(body)).await
    }

    async fn instance_view(&self, instance: &str) -> Result<Instance> {
        let url = self.endpoint(&["v1", "instances", instance])?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn instance_list(&self, project: &str) -> Result<Vec<Instance>> {
        self.list_all(&["v1", "instances"], Some(project)).await
    }

    async fn instance_stop(&self, instance: &str) -> Result<Instance> {
        let url = self.endpoint(&["v1", "instances", instance, "stop"])?;
        self.send(self.request(Method::POST, url)).await
    }

    async fn instance_delete(&self, instance: &str) -> Result<()> {
        let url = self.endpoint(&["v1", "instances", instance])?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }

    async fn ip_pool_create(&self, body: &IpPoolCreate) -> Result<IpPool> {
        let url = self.endpoint(&["v1", "system", "ip-pools"])?;
        self.send(self.request(Method::POST, url).json(body)).await
    }

    async fn ip_pool_view(&self, pool: &str) -> Result<IpPool> {
        let url = self.endpoint(&["v1", "system", "ip-pools", pool])?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn ip_pool_list(&self) -> Result<Vec<IpPool>> {
        self.list_all(&["v1", "system", "ip-pools"], None).await
    }

    async fn ip_pool_update(&self, pool: &str, body: &IpPoolUpdate) -> Result<IpPool> {
        let url = self.endpoint(&["v1", "system", "ip-pools", pool])?;
        self.send(self.request(Method::PUT, url).json(body)).await
    }

    async fn ip_pool_delete(&self, pool: &str) -> Result<()> {
        let url = self.endpoint(&["v1", "system", "ip-pools", pool])?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }
}
