use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::Deserialize;
use url::Url;

use super::{
    parse_identifier, ChildDescriptor, ChildKind, Cid, PinStream, PutOptions, Stat, StorageError,
    StorageGateway,
};

/// unixfs link type for a directory in `ls` output
const UNIXFS_DIRECTORY: i32 = 1;

/// Adapter over a Kubo (go-ipfs) daemon's HTTP RPC API.
///
/// Uploads are added as CIDv0 so identifiers match what the rest
///  of a default IPFS setup shows.
#[derive(Debug, Clone)]
pub struct KuboGateway {
    api_url: Url,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FilesStatResponse {
    size: u64,
    #[serde(default)]
    cumulative_size: u64,
    #[serde(rename = "Type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsResponse {
    #[serde(default)]
    objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsObject {
    #[serde(default)]
    links: Vec<LsLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsLink {
    name: String,
    hash: String,
    size: u64,
    #[serde(rename = "Type")]
    kind: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinLsResponse {
    #[serde(default)]
    keys: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KuboErrorBody {
    message: String,
}

impl KuboGateway {
    pub fn new(api_url: &Url) -> Result<Self, StorageError> {
        let client = Client::builder()
            .build()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self {
            api_url: api_url.clone(),
            client,
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    fn request(&self, command: &str, timeout: Duration) -> Result<RequestBuilder, StorageError> {
        let url = self
            .api_url
            .join(&format!("api/v0/{}", command))
            .map_err(|e| StorageError::Unavailable(format!("bad kubo api url: {}", e)))?;
        // kubo abandons the lookup at the same deadline
        Ok(self
            .client
            .post(url)
            .query(&[("timeout", format!("{}ms", timeout.as_millis()))])
            .timeout(timeout))
    }

    /// Roots only: indirect pins are the blocks under a pinned root
    fn pin_ls_request(&self, timeout: Duration) -> Result<RequestBuilder, StorageError> {
        Ok(self
            .request("pin/ls", timeout)?
            .query(&[("type", "recursive")]))
    }

    async fn send(
        &self,
        request: RequestBuilder,
        identifier: Option<&Cid>,
        timeout: Duration,
    ) -> Result<Response, StorageError> {
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let message = response
            .json::<KuboErrorBody>()
            .await
            .map(|body| body.message)
            .unwrap_or_else(|_| status.to_string());
        Err(map_daemon_error(&message, identifier, timeout))
    }
}

fn map_transport_error(err: reqwest::Error, timeout: Duration) -> StorageError {
    if err.is_timeout() {
        StorageError::Timeout(timeout)
    } else {
        StorageError::Unavailable(err.to_string())
    }
}

fn map_daemon_error(message: &str, identifier: Option<&Cid>, timeout: Duration) -> StorageError {
    let lowered = message.to_lowercase();
    match identifier {
        Some(cid) if lowered.contains("not found") || lowered.contains("no link named") => {
            StorageError::NotFound(*cid)
        }
        Some(cid) if lowered.contains("is a directory") || lowered.contains("not a directory") => {
            StorageError::NotADirectory(*cid)
        }
        _ if lowered.contains("context deadline exceeded") => StorageError::Timeout(timeout),
        _ => StorageError::Unavailable(message.to_string()),
    }
}

#[async_trait]
impl StorageGateway for KuboGateway {
    async fn put(
        &self,
        data: Bytes,
        options: PutOptions,
        timeout: Duration,
    ) -> Result<Cid, StorageError> {
        let part = multipart::Part::bytes(data.to_vec()).file_name("upload");
        let form = multipart::Form::new().part("file", part);
        let request = self
            .request("add", timeout)?
            .query(&[
                ("pin", options.pin.to_string()),
                ("cid-version", "0".to_string()),
                ("quieter", "true".to_string()),
            ])
            .multipart(form);

        let response = self.send(request, None, timeout).await?;
        let body: AddResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;
        parse_identifier(&body.hash)
    }

    async fn stat(&self, identifier: &Cid, timeout: Duration) -> Result<Stat, StorageError> {
        let request = self
            .request("files/stat", timeout)?
            .query(&[("arg", format!("/ipfs/{}", identifier))]);
        let response = self.send(request, Some(identifier), timeout).await?;
        let body: FilesStatResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        // directories report a zero Size, the cumulative size is what they hold
        let size_bytes = if body.kind == "directory" {
            body.cumulative_size
        } else {
            body.size
        };
        Ok(Stat { size_bytes })
    }

    async fn list_pinned(&self, timeout: Duration) -> Result<PinStream, StorageError> {
        let request = self.pin_ls_request(timeout)?;
        let response = self.send(request, None, timeout).await?;
        let body: PinLsResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let pins = body
            .keys
            .into_keys()
            .map(|key| parse_identifier(&key))
            .collect::<Vec<_>>();
        Ok(Box::pin(stream::iter(pins)))
    }

    async fn list_children(
        &self,
        identifier: &Cid,
        timeout: Duration,
    ) -> Result<Vec<ChildDescriptor>, StorageError> {
        let request = self
            .request("ls", timeout)?
            .query(&[("arg", identifier.to_string())]);
        let response = self.send(request, Some(identifier), timeout).await?;
        let body: LsResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        body.objects
            .into_iter()
            .flat_map(|object| object.links)
            .map(|link| -> Result<ChildDescriptor, StorageError> {
                Ok(ChildDescriptor {
                    identifier: parse_identifier(&link.hash)?,
                    name: link.name,
                    size_bytes: link.size,
                    kind: if link.kind == UNIXFS_DIRECTORY {
                        ChildKind::Directory
                    } else {
                        ChildKind::File
                    },
                })
            })
            .collect()
    }

    async fn read_at(
        &self,
        identifier: &Cid,
        offset: u64,
        length: u64,
        timeout: Duration,
    ) -> Result<Bytes, StorageError> {
        let request = self.request("cat", timeout)?.query(&[
            ("arg", identifier.to_string()),
            ("offset", offset.to_string()),
            ("length", length.to_string()),
        ]);
        let response = self.send(request, Some(identifier), timeout).await?;
        response
            .bytes()
            .await
            .map_err(|e| map_transport_error(e, timeout))
    }
}
