use crate::error::{Error, Result};
use crate::types::{
    AboutInfo, ManagedObjectReference, RetrieveResult, ServerFault, ServiceContent, UpdateSet,
    unbox,
};
use crate::ManagementClient;
use async_trait::async_trait;
use reqwest::{Client, IntoUrl, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Header carrying the session id after `Login`.
const SESSION_HEADER: &str = "vmware-api-session-id";

/// VI/JSON API release used when none is configured.
pub const DEFAULT_RELEASE: &str = "8.0.1.0";

#[derive(Debug, Clone)]
pub struct VimOptions {
    /// API release segment of the endpoint path, e.g. "8.0.1.0"
    pub release: String,
    /// Accept invalid TLS certificates (self-signed vCenter/ESXi certs)
    pub accept_invalid_certs: bool,
}

impl Default for VimOptions {
    fn default() -> Self {
        Self {
            release: DEFAULT_RELEASE.to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// Authenticated session against a vCenter or ESXi host.
pub struct VimClient {
    client: Client,
    base_url: Url,
    session_id: Option<String>,
    content: ServiceContent,
}

impl VimClient {
    /// Fetch the service content and log in.
    ///
    /// `url` is the server root; a trailing `/sdk` is accepted.
    pub async fn connect<T: IntoUrl>(
        url: T,
        username: &str,
        password: &str,
        options: &VimOptions,
    ) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()?;
        let base_url = api_base_url(url.into_url()?, &options.release)?;
        debug!("Using VI/JSON endpoint {base_url}");

        let instance = ManagedObjectReference::new("ServiceInstance", "ServiceInstance");
        let url = method_url(&base_url, &instance, "content")?;
        let resp = client.get(url).send().await?;
        let content: ServiceContent = decode(read_response(resp).await?, "ServiceContent")?;

        let mut vim = Self {
            client,
            base_url,
            session_id: None,
            content,
        };
        vim.login(username, password).await?;
        Ok(vim)
    }

    pub fn about(&self) -> &AboutInfo {
        &self.content.about
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let url = method_url(&self.base_url, &self.content.session_manager, "Login")?;
        let body = json!({ "userName": username, "password": password });
        let resp = self.request(Method::POST, url).json(&body).send().await?;

        let session_id = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        read_response(resp).await?;

        self.session_id = Some(session_id.ok_or(Error::MissingSession)?);
        info!("Logged in to {} as {username}", self.content.about.full_name);
        Ok(())
    }

    /// End the session.
    pub async fn logout(&mut self) -> Result<()> {
        let session_manager = self.content.session_manager.clone();
        self.invoke(&session_manager, "Logout", None).await?;
        self.session_id = None;
        debug!("Logged out");
        Ok(())
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request_builder = self.client.request(method, url);
        match &self.session_id {
            Some(id) => request_builder.header(SESSION_HEADER, id),
            None => request_builder,
        }
    }

    /// POST a method invocation. `None` means the method returned nothing.
    async fn invoke(
        &self,
        moref: &ManagedObjectReference,
        method: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        let url = method_url(&self.base_url, moref, method)?;
        let mut req = self.request(Method::POST, url);
        if let Some(body) = &body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        read_response(resp).await.inspect_err(|e| {
            error!("{method} on {moref} failed: {e}");
        })
    }

    async fn create_container_view(
        &self,
        container: &ManagedObjectReference,
        type_name: &str,
    ) -> Result<ManagedObjectReference> {
        let body = json!({
            "container": container.to_wire(),
            "type": [type_name],
            "recursive": true,
        });
        let view = self
            .invoke(&self.content.view_manager, "CreateContainerView", Some(body))
            .await?;
        decode(view, "ContainerView reference")
    }

    async fn retrieve_names(
        &self,
        view: &ManagedObjectReference,
        type_name: &str,
    ) -> Result<Vec<(String, ManagedObjectReference)>> {
        let spec = json!({
            "_typeName": "PropertyFilterSpec",
            "propSet": [{
                "_typeName": "PropertySpec",
                "type": type_name,
                "pathSet": ["name"],
            }],
            "objectSet": [{
                "_typeName": "ObjectSpec",
                "obj": view.to_wire(),
                "skip": true,
                "selectSet": [{
                    "_typeName": "TraversalSpec",
                    "name": "traverseView",
                    "type": "ContainerView",
                    "path": "view",
                    "skip": false,
                }],
            }],
        });
        let collector = &self.content.property_collector;

        let mut entities = Vec::new();
        let mut page = self
            .invoke(
                collector,
                "RetrievePropertiesEx",
                Some(json!({ "specSet": [spec], "options": { "_typeName": "RetrieveOptions" } })),
            )
            .await?;

        while let Some(value) = page {
            let result: RetrieveResult = decode(Some(value), "RetrieveResult")?;
            for object in result.objects {
                let name = object
                    .prop_set
                    .iter()
                    .find(|p| p.name == "name")
                    .and_then(|p| unbox(&p.val).as_str());
                match name {
                    Some(name) => entities.push((name.to_string(), object.obj)),
                    None => debug!("Skipping {} without a name", object.obj),
                }
            }
            page = match result.token {
                Some(token) => {
                    self.invoke(
                        collector,
                        "ContinueRetrievePropertiesEx",
                        Some(json!({ "token": token })),
                    )
                    .await?
                }
                None => None,
            };
        }

        Ok(entities)
    }
}

#[async_trait]
impl ManagementClient for VimClient {
    fn root_folder(&self) -> &ManagedObjectReference {
        &self.content.root_folder
    }

    async fn entities_by_type(
        &self,
        container: &ManagedObjectReference,
        type_name: &str,
    ) -> Result<Vec<(String, ManagedObjectReference)>> {
        let view = self.create_container_view(container, type_name).await?;
        let result = self.retrieve_names(&view, type_name).await;

        if let Err(e) = self.invoke(&view, "DestroyView", None).await {
            warn!("Failed to destroy container view {view}: {e}");
        }

        let entities = result?;
        debug!("Found {} {type_name} object(s) under {container}", entities.len());
        Ok(entities)
    }

    async fn destroy(&self, entity: &ManagedObjectReference) -> Result<ManagedObjectReference> {
        let task = self.invoke(entity, "Destroy_Task", None).await?;
        let task: ManagedObjectReference = decode(task, "Task reference")?;
        debug!("Destroy task for {entity}: {task}");
        Ok(task)
    }

    async fn create_filter(
        &self,
        obj: &ManagedObjectReference,
        paths: &[&str],
    ) -> Result<ManagedObjectReference> {
        let body = json!({
            "spec": {
                "_typeName": "PropertyFilterSpec",
                "propSet": [{
                    "_typeName": "PropertySpec",
                    "type": obj.type_name,
                    "pathSet": paths,
                }],
                "objectSet": [{
                    "_typeName": "ObjectSpec",
                    "obj": obj.to_wire(),
                    "skip": false,
                }],
            },
            "partialUpdates": true,
        });
        let filter = self
            .invoke(&self.content.property_collector, "CreateFilter", Some(body))
            .await?;
        decode(filter, "PropertyFilter reference")
    }

    async fn wait_for_updates(
        &self,
        version: &str,
        max_wait: Option<Duration>,
    ) -> Result<Option<UpdateSet>> {
        let mut options = json!({ "_typeName": "WaitOptions" });
        if let Some(max_wait) = max_wait {
            options["maxWaitSeconds"] = json!(max_wait.as_secs());
        }
        let body = json!({ "version": version, "options": options });
        let update = self
            .invoke(&self.content.property_collector, "WaitForUpdatesEx", Some(body))
            .await?;
        update
            .map(|u| decode(Some(u), "UpdateSet"))
            .transpose()
    }

    async fn destroy_filter(&self, filter: &ManagedObjectReference) -> Result<()> {
        self.invoke(filter, "DestroyPropertyFilter", None).await?;
        Ok(())
    }
}

/// `{root}/sdk/vim25/{release}/`, keeping any path prefix in front of `/sdk`.
fn api_base_url(mut url: Url, release: &str) -> Result<Url> {
    if url.cannot_be_a_base() {
        return Err(Error::InvalidUrl(url.to_string()));
    }
    let path = url.path().trim_end_matches('/');
    let path = path.strip_suffix("/sdk").unwrap_or(path).to_string();
    url.set_path(&format!("{path}/sdk/vim25/{release}/"));
    url.set_query(None);
    Ok(url)
}

fn method_url(base_url: &Url, moref: &ManagedObjectReference, method: &str) -> Result<Url> {
    let path = format!(
        "{}/{}/{}",
        moref.type_name,
        urlencoding::encode(&moref.value),
        method
    );
    base_url
        .join(&path)
        .map_err(|e| Error::InvalidUrl(format!("{base_url}{path}: {e}")))
}

async fn read_response(resp: Response) -> Result<Option<Value>> {
    let status = resp.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(None);
    }

    let body = resp.text().await?;
    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| Error::unexpected(format!("invalid JSON body: {e}")))?;
        return Ok((!value.is_null()).then_some(value));
    }

    Err(fault_from_body(status, &body))
}

fn fault_from_body(status: StatusCode, body: &str) -> Error {
    match serde_json::from_str::<ServerFault>(body) {
        Ok(fault) if fault.type_name == "InvalidCollectorVersion" => {
            Error::InvalidCollectorVersion(fault.message())
        }
        Ok(fault) => Error::Fault {
            message: fault.message(),
            kind: fault.type_name,
        },
        Err(_) => {
            debug!("Non-fault error body ({status}): {body}");
            Error::HttpError(status)
        }
    }
}

fn decode<T: DeserializeOwned>(value: Option<Value>, what: &str) -> Result<T> {
    let value = value.ok_or_else(|| Error::unexpected(format!("empty response, expected {what}")))?;
    serde_json::from_value(value).map_err(|e| Error::unexpected(format!("{what}: {e}")))
}
