//! Document store over a JSON HTTP API.
//!
//! `GET {base}/{collection}/{id}` reads a document, `PATCH` on the same path
//! merges fields into it and answers with the stored document.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use stocksync_engine::InventoryRecord;

use super::{decode_document, DocumentStore, Fields, RemoteError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    collection: String,
}

impl HttpDocumentStore {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
        })
    }

    pub fn document_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.collection, id)
    }

    async fn decode(&self, id: &str, response: Response) -> Result<InventoryRecord, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(id, status, body));
        }
        let document: Value = response.json().await.map_err(|e| RemoteError::Malformed {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        decode_document(id, document)
    }
}

impl DocumentStore for HttpDocumentStore {
    fn read_one<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<InventoryRecord, RemoteError>> {
        async move {
            tracing::debug!(item_id = %id, "Reading remote document");
            let response = self
                .client
                .get(self.document_url(id))
                .send()
                .await
                .map_err(unavailable)?;
            self.decode(id, response).await
        }
        .boxed()
    }

    fn write_one<'a>(
        &'a self,
        id: &'a str,
        fields: Fields,
    ) -> BoxFuture<'a, Result<InventoryRecord, RemoteError>> {
        async move {
            tracing::debug!(item_id = %id, fields = fields.len(), "Writing remote document");
            let response = self
                .client
                .patch(self.document_url(id))
                .json(&fields)
                .send()
                .await
                .map_err(unavailable)?;
            self.decode(id, response).await
        }
        .boxed()
    }
}

fn unavailable(e: reqwest::Error) -> RemoteError {
    RemoteError::Unavailable(e.to_string())
}

/// Map a non-success status to an error, keeping the server's message.
fn status_error(id: &str, status: StatusCode, body: String) -> RemoteError {
    if status == StatusCode::NOT_FOUND {
        return RemoteError::NotFound(id.to_string());
    }
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    RemoteError::Rejected(format!("{status}: {message}"))
}
