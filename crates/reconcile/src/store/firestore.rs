//! Hosted document store client over the REST API.
//!
//! Requests are authorized with the operator's ID token, so the store's
//! security rules see the same identity the operator signed in with.

use std::sync::Arc;

use async_trait::async_trait;
use freightdesk_core::{Document, FieldValue, Fields};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use url::Url;

use super::DocumentStore;
use crate::auth::{FirebaseAuth, OperatorSession};
use crate::config::FirebaseConfig;
use crate::error::StoreError;

const FIRESTORE_HOST: &str = "https://firestore.googleapis.com";
const LIST_PAGE_SIZE: &str = "300";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Fields,
    #[serde(default)]
    update_time: Option<String>,
}

impl RawDocument {
    fn into_document(self) -> Document {
        let key = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_owned();
        Document {
            key,
            fields: self.fields,
            version: self.update_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponseItem {
    #[serde(default)]
    document: Option<RawDocument>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// REST client for the hosted document store.
#[derive(Clone)]
pub struct FirestoreClient {
    inner: Arc<FirestoreClientInner>,
}

struct FirestoreClientInner {
    client: reqwest::Client,
    /// `.../databases/{db}/documents`
    documents_url: Url,
    /// Used to refresh the session; `None` for fixed emulator tokens.
    auth: Option<FirebaseAuth>,
    session: RwLock<OperatorSession>,
}

impl std::fmt::Debug for FirestoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreClient")
            .field("documents_url", &self.inner.documents_url.as_str())
            .finish_non_exhaustive()
    }
}

impl FirestoreClient {
    /// Create a client acting as the signed-in operator.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Api` if the configured project or database
    /// produces an invalid URL.
    pub fn new(
        client: reqwest::Client,
        config: &FirebaseConfig,
        auth: Option<FirebaseAuth>,
        session: OperatorSession,
    ) -> Result<Self, StoreError> {
        let host = config
            .firestore_emulator_host
            .as_ref()
            .map_or_else(|| FIRESTORE_HOST.to_owned(), |h| format!("http://{h}"));
        let documents_url = documents_url(&host, &config.project_id, &config.database)?;

        Ok(Self {
            inner: Arc::new(FirestoreClientInner {
                client,
                documents_url,
                auth,
                session: RwLock::new(session),
            }),
        })
    }

    fn document_url(&self, collection: &str, key: &str) -> Url {
        let mut url = self.collection_url(collection);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(key);
        }
        url
    }

    fn collection_url(&self, collection: &str) -> Url {
        let mut url = self.inner.documents_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(collection);
        }
        url
    }

    fn run_query_url(&self) -> Url {
        let mut url = self.inner.documents_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop().push("documents:runQuery");
        }
        url
    }

    /// Current bearer token, refreshed first if it is about to expire.
    async fn bearer(&self) -> Result<String, StoreError> {
        {
            let session = self.inner.session.read().await;
            if !session.is_expired() || self.inner.auth.is_none() {
                return Ok(session.id_token().expose_secret().to_owned());
            }
        }

        let mut session = self.inner.session.write().await;
        if session.is_expired() {
            if let Some(auth) = &self.inner.auth {
                debug!("Refreshing operator token");
                *session = auth
                    .refresh(&session)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        Ok(session.id_token().expose_secret().to_owned())
    }

    /// Send a request and require a success status.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
        target: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let response = self.execute(method, url, body).await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(failure(response, target).await)
    }

    /// Send a request addressed at a single document; `None` if it is absent.
    ///
    /// Only valid for document paths: on a collection or query a 404 means
    /// the project or database is missing, not that the result is empty.
    async fn send_for_document(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
        target: &str,
    ) -> Result<Option<reqwest::Response>, StoreError> {
        let response = self.execute(method, url, body).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(Some(response));
        }
        if status != StatusCode::NOT_FOUND {
            return Err(failure(response, target).await);
        }

        let text = response.text().await.unwrap_or_default();
        if names_missing_database(&text) {
            let err = classify_error(status, &text, target);
            warn!(status = %status, error = %err, "Document store database not found");
            return Err(err);
        }
        Ok(None)
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, StoreError> {
        let token = self.bearer().await?;
        let mut request = self.inner.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    #[instrument(skip(self))]
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.collection_url(collection);
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", LIST_PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.send(Method::GET, url, None, collection).await?;
            let page: ListResponse = decode(response).await?;
            documents.extend(page.documents.into_iter().map(RawDocument::into_document));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = documents.len(), "Listed collection");
        Ok(documents)
    }

    #[instrument(skip(self))]
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let target = format!("{collection}/{key}");
        let url = self.document_url(collection, key);
        let Some(response) = self.send_for_document(Method::GET, url, None, &target).await? else {
            return Ok(None);
        };
        let raw: RawDocument = decode(response).await?;
        Ok(Some(raw.into_document()))
    }

    #[instrument(skip(self, fields), fields(field_count = fields.len()))]
    async fn put(
        &self,
        collection: &str,
        key: &str,
        fields: &Fields,
        merge: bool,
    ) -> Result<(), StoreError> {
        // A PATCH without an update mask replaces the whole document
        if merge && fields.is_empty() {
            return Ok(());
        }

        let target = format!("{collection}/{key}");
        let mut url = self.document_url(collection, key);
        if merge {
            append_update_mask(&mut url, fields);
        }

        let body = serde_json::json!({ "fields": fields });
        self.send(Method::PATCH, url, Some(body), &target).await?;
        Ok(())
    }

    #[instrument(skip(self, fields), fields(field_count = fields.len()))]
    async fn update(&self, collection: &str, key: &str, fields: &Fields) -> Result<bool, StoreError> {
        if fields.is_empty() {
            return Ok(self.get(collection, key).await?.is_some());
        }

        let target = format!("{collection}/{key}");
        let mut url = self.document_url(collection, key);
        append_update_mask(&mut url, fields);
        url.query_pairs_mut()
            .append_pair("currentDocument.exists", "true");

        let body = serde_json::json!({ "fields": fields });
        let response = self
            .send_for_document(Method::PATCH, url, Some(body), &target)
            .await?;
        Ok(response.is_some())
    }

    #[instrument(skip(self))]
    async fn delete(
        &self,
        collection: &str,
        key: &str,
        expected_version: Option<&str>,
    ) -> Result<(), StoreError> {
        let target = format!("{collection}/{key}");
        let mut url = self.document_url(collection, key);
        if let Some(version) = expected_version {
            url.query_pairs_mut()
                .append_pair("currentDocument.updateTime", version);
        }

        let response = self
            .send_for_document(Method::DELETE, url, None, &target)
            .await?;
        if response.is_none() && expected_version.is_some() {
            // Deleted by someone else since we read it.
            return Err(StoreError::PreconditionFailed(target));
        }
        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, StoreError> {
        let body = serde_json::json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": quote_field_path(field) },
                        "op": "EQUAL",
                        "value": value,
                    }
                }
            }
        });

        let response = self
            .send(Method::POST, self.run_query_url(), Some(body), collection)
            .await?;
        let items: Vec<QueryResponseItem> = decode(response).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| item.document)
            .map(RawDocument::into_document)
            .collect())
    }
}

fn documents_url(host: &str, project_id: &str, database: &str) -> Result<Url, StoreError> {
    let mut url = Url::parse(host).map_err(|e| StoreError::Api {
        status: 0,
        message: format!("invalid store host {host}: {e}"),
    })?;
    url.path_segments_mut()
        .map_err(|()| StoreError::Api {
            status: 0,
            message: format!("store host {host} cannot be a base URL"),
        })?
        .extend(["v1", "projects", project_id, "databases", database, "documents"]);
    Ok(url)
}

fn append_update_mask(url: &mut Url, fields: &Fields) {
    let mut query = url.query_pairs_mut();
    for name in fields.keys() {
        query.append_pair("updateMask.fieldPaths", &quote_field_path(name));
    }
}

/// Whether a 404 body reports a missing project or database rather than a
/// missing document.
///
/// Document misses read `Document "..." not found` or `No document to
/// update: ...`; a missing database reads `The database (...) does not
/// exist for project ...`. Document paths contain `databases/`, so match on
/// the phrase, not the word.
fn names_missing_database(body: &str) -> bool {
    serde_json::from_str::<ErrorEnvelope>(body)
        .is_ok_and(|e| e.error.message.contains("does not exist"))
}

async fn failure(response: reqwest::Response, target: &str) -> StoreError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let err = classify_error(status, &text, target);
    warn!(status = %status, error = %err, "Document store request failed");
    err
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, StoreError> {
    let text = response
        .text()
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Map a failed response onto the store error taxonomy.
fn classify_error(status: StatusCode, body: &str, target: &str) -> StoreError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .map_or_else(|| body.to_owned(), |e| e.error.message.clone());
    let precondition = parsed
        .as_ref()
        .is_some_and(|e| e.error.status == "FAILED_PRECONDITION");

    if precondition || status == StatusCode::PRECONDITION_FAILED {
        StoreError::PreconditionFailed(target.to_owned())
    } else if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        StoreError::Unavailable(format!("HTTP {status}: {message}"))
    } else {
        StoreError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Quote a top-level field name for use as a field path.
///
/// Plain identifiers pass through; anything else is wrapped in backticks
/// with backslashes and backticks escaped.
fn quote_field_path(name: &str) -> String {
    let mut chars = name.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if simple {
        name.to_owned()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}
