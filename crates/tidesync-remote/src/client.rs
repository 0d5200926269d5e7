//! HTTP remote store client
//!
//! Wraps `reqwest::Client` with bearer authentication, base-URL construction
//! and the wire endpoints of the store:
//!
//! | Operation         | Request                                        |
//! |-------------------|------------------------------------------------|
//! | `list`            | `GET  /entries?path=`                          |
//! | `stat`            | `GET  /entry?path=`                            |
//! | `get`/`get_range` | `GET  /content/{id}` (optional `Range`)        |
//! | `get_manifest`    | `GET  /manifest/{id}`                          |
//! | `put`             | `PUT  /files?path=`                            |
//! | `put_chunk`       | `PUT  /transfers/{tid}/{index}?total=`         |
//! | `finish_transfer` | `POST /transfers/{tid}?path=`                  |
//! | `mkdir`           | `POST /dirs?path=`                             |
//! | `delete`          | `DELETE /entries/{id}`                         |
//! | `move_entry`      | `POST /entries/{id}/move`                      |
//!
//! Mutations carry the etag precondition as an `If-Match` header. Listing
//! traffic is throttled client-side through a governor rate limiter so a
//! large tree walk cannot hammer the server.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::Context;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tidesync_core::config::RemoteConfig;
use tidesync_core::ports::remote_store::{PutResult, RemoteEntry, RemoteError, RemoteStore};
use tidesync_core::domain::newtypes::{Etag, RemoteId, SyncPath};

/// Longest error-body excerpt carried into an error message.
const MAX_ERROR_BODY: usize = 200;

// ============================================================================
// Wire types
// ============================================================================

/// Envelope of a directory listing response.
#[derive(Debug, Deserialize)]
struct ListingResponse {
    entries: Vec<RemoteEntry>,
}

/// Body of a move request.
#[derive(Debug, Serialize)]
struct MoveRequest<'a> {
    to: &'a str,
}

// ============================================================================
// HttpRemoteStore
// ============================================================================

/// Remote store adapter over HTTP.
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    bearer_token: String,
    list_limiter: DefaultDirectRateLimiter,
}

impl HttpRemoteStore {
    /// Build a client from the remote section of the configuration.
    ///
    /// The per-operation timeout is installed on the underlying HTTP client,
    /// so every port method surfaces an elapsed deadline as
    /// [`RemoteError::Timeout`].
    pub fn new(config: &RemoteConfig, bearer_token: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .context("building HTTP client")?;

        let per_minute = NonZeroU32::new(config.list_requests_per_minute.max(1))
            .unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
            list_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    /// Base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticated request builder for `method` on `path` (relative to the
    /// base URL).
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, url)
            .bearer_auth(&self.bearer_token)
    }

    /// Send a request and fold transport failures and error statuses into
    /// [`RemoteError`].
    async fn send(&self, op: &'static str, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(|e| transport_err(op, &e))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_err(op, response).await)
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        op: &'static str,
        response: Response,
    ) -> Result<T, RemoteError> {
        response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("{op}: {e}")))
    }

    async fn bytes(&self, op: &'static str, response: Response) -> Result<Vec<u8>, RemoteError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_err(op, &e))?;
        Ok(bytes.to_vec())
    }
}

/// Map a reqwest transport failure onto the error taxonomy.
fn transport_err(op: &str, err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout(format!("{op}: {err}"))
    } else {
        RemoteError::Network(format!("{op}: {err}"))
    }
}

/// Map a non-success status onto the error taxonomy.
///
/// 408, 429 and 5xx are server-side and retryable; 403, 404, 412 and 507
/// carry distinct meanings for the scheduler. Anything else is a protocol
/// mismatch and reported as an invalid response.
async fn status_err(op: &str, response: Response) -> RemoteError {
    let status = response.status().as_u16();
    let mut message: String = response.text().await.unwrap_or_default();
    message.truncate(MAX_ERROR_BODY);

    match status {
        403 => RemoteError::Forbidden(format!("{op}: {message}")),
        404 => RemoteError::NotFound(format!("{op}: {message}")),
        412 => RemoteError::PreconditionFailed(format!("{op}: {message}")),
        507 => RemoteError::InsufficientStorage(format!("{op}: {message}")),
        408 | 429 => RemoteError::Server { status, message },
        s if (500..600).contains(&s) => RemoteError::Server { status, message },
        s => RemoteError::InvalidResponse(format!("{op}: unexpected status {s}: {message}")),
    }
}

fn if_match(request: RequestBuilder, etag: Option<&Etag>) -> RequestBuilder {
    match etag {
        Some(etag) => request.header(header::IF_MATCH, etag.as_str()),
        None => request,
    }
}

#[async_trait::async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list(&self, path: &SyncPath) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.list_limiter.until_ready().await;
        debug!(path = %path, "listing remote directory");

        let request = self
            .request(Method::GET, "/entries")
            .query(&[("path", path.as_str())]);
        let response = self.send("list", request).await?;
        let listing: ListingResponse = self.json("list", response).await?;
        Ok(listing.entries)
    }

    async fn stat(&self, path: &SyncPath) -> Result<Option<RemoteEntry>, RemoteError> {
        self.list_limiter.until_ready().await;

        let request = self
            .request(Method::GET, "/entry")
            .query(&[("path", path.as_str())]);
        match self.send("stat", request).await {
            Ok(response) => Ok(Some(self.json("stat", response).await?)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get(&self, id: &RemoteId) -> Result<Vec<u8>, RemoteError> {
        debug!(id = %id.as_str(), "downloading content");

        let request = self.request(Method::GET, &format!("/content/{}", id.as_str()));
        let response = self.send("get", request).await?;
        self.bytes("get", response).await
    }

    async fn get_range(
        &self,
        id: &RemoteId,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, RemoteError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let range = format!("bytes={}-{}", offset, offset + len - 1);
        debug!(id = %id.as_str(), %range, "downloading range");

        let request = self
            .request(Method::GET, &format!("/content/{}", id.as_str()))
            .header(header::RANGE, range);
        let response = self.send("get_range", request).await?;
        self.bytes("get_range", response).await
    }

    async fn get_manifest(&self, id: &RemoteId) -> Result<Option<Vec<u8>>, RemoteError> {
        let request = self.request(Method::GET, &format!("/manifest/{}", id.as_str()));
        match self.send("get_manifest", request).await {
            Ok(response) => Ok(Some(self.bytes("get_manifest", response).await?)),
            // Servers without manifest support simply do not have the entry.
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(
        &self,
        path: &SyncPath,
        content: &[u8],
        if_match_etag: Option<&Etag>,
    ) -> Result<PutResult, RemoteError> {
        debug!(path = %path, size = content.len(), "uploading content");

        let request = self
            .request(Method::PUT, "/files")
            .query(&[("path", path.as_str())])
            .body(content.to_vec());
        let response = self.send("put", if_match(request, if_match_etag)).await?;
        self.json("put", response).await
    }

    async fn put_chunk(
        &self,
        transfer_id: &str,
        index: u32,
        total: u32,
        content: &[u8],
    ) -> Result<(), RemoteError> {
        debug!(transfer_id, index, total, size = content.len(), "uploading chunk");

        let request = self
            .request(Method::PUT, &format!("/transfers/{transfer_id}/{index}"))
            .query(&[("total", total.to_string())])
            .body(content.to_vec());
        self.send("put_chunk", request).await?;
        Ok(())
    }

    async fn finish_transfer(
        &self,
        transfer_id: &str,
        path: &SyncPath,
        if_match_etag: Option<&Etag>,
    ) -> Result<PutResult, RemoteError> {
        debug!(transfer_id, path = %path, "finishing chunked transfer");

        let request = self
            .request(Method::POST, &format!("/transfers/{transfer_id}"))
            .query(&[("path", path.as_str())]);
        let response = self
            .send("finish_transfer", if_match(request, if_match_etag))
            .await?;
        self.json("finish_transfer", response).await
    }

    async fn mkdir(&self, path: &SyncPath) -> Result<PutResult, RemoteError> {
        debug!(path = %path, "creating remote directory");

        let request = self
            .request(Method::POST, "/dirs")
            .query(&[("path", path.as_str())]);
        let response = self.send("mkdir", request).await?;
        self.json("mkdir", response).await
    }

    async fn delete(&self, id: &RemoteId, if_match_etag: Option<&Etag>) -> Result<(), RemoteError> {
        debug!(id = %id.as_str(), "deleting remote entry");

        let request = self.request(Method::DELETE, &format!("/entries/{}", id.as_str()));
        self.send("delete", if_match(request, if_match_etag)).await?;
        Ok(())
    }

    async fn move_entry(
        &self,
        id: &RemoteId,
        to: &SyncPath,
        if_match_etag: Option<&Etag>,
    ) -> Result<PutResult, RemoteError> {
        debug!(id = %id.as_str(), to = %to, "moving remote entry");

        let request = self
            .request(Method::POST, &format!("/entries/{}/move", id.as_str()))
            .json(&MoveRequest { to: to.as_str() });
        let response = self.send("move_entry", if_match(request, if_match_etag)).await?;
        self.json("move_entry", response).await
    }
}
