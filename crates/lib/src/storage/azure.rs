//! Azure Blob Storage backend: Put Blob over REST, signed with the account's Shared Key.

use crate::storage::{BlobStore, StorageError};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// REST API version sent as x-ms-version.
pub const AZURE_STORAGE_VERSION: &str = "2021-08-06";

/// Block blob writer for one container. Credentials are checked on first write, not at construction.
pub struct AzureBlobStore {
    account_name: Option<String>,
    account_key: Option<String>,
    endpoint: Option<String>,
    container: String,
    client: reqwest::Client,
}

impl AzureBlobStore {
    /// `endpoint` defaults to https://{account_name}.blob.core.windows.net.
    pub fn new(
        account_name: Option<String>,
        account_key: Option<String>,
        endpoint: Option<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            account_name,
            account_key,
            endpoint: endpoint
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty()),
            container: container.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Full URL for `key`. Each path segment is percent-encoded; `/` separators are kept.
    pub fn blob_url(&self, account_name: &str, key: &str) -> String {
        let base = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}.blob.core.windows.net", account_name));
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}/{}", base, self.container, encoded.join("/"))
    }
}

/// String-to-sign for a Put Blob request (Shared Key, version 2015-02-21 and later).
/// `canonical_headers` must be the sorted `x-ms-*` headers, each as `name:value\n`.
fn put_blob_string_to_sign(
    content_length: usize,
    content_type: &str,
    canonical_headers: &str,
    canonical_resource: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    // VERB, Content-Encoding, Content-Language, Content-Length, Content-MD5, Content-Type,
    // Date, If-Modified-Since, If-Match, If-None-Match, If-Unmodified-Since, Range
    let fields = [
        "PUT", "", "", length.as_str(), "", content_type, "", "", "", "", "", "",
    ];
    format!("{}\n{}{}", fields.join("\n"), canonical_headers, canonical_resource)
}

/// base64(HMAC-SHA256(base64-decoded account key, string_to_sign)).
pub fn shared_key_signature(account_key: &str, string_to_sign: &str) -> Result<String, StorageError> {
    let key = base64::engine::general_purpose::STANDARD
        .decode(account_key.trim().as_bytes())
        .map_err(|_| StorageError::InvalidAccountKey)?;
    let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| StorageError::InvalidAccountKey)?;
    mac.update(string_to_sign.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let account = self
            .account_name
            .as_deref()
            .ok_or(StorageError::NotConfigured("account name"))?;
        let account_key = self
            .account_key
            .as_deref()
            .ok_or(StorageError::NotConfigured("account key"))?;

        let url = self.blob_url(account, key);
        let parsed = reqwest::Url::parse(&url).map_err(|_| StorageError::InvalidUrl(url.clone()))?;
        let canonical_resource = format!("/{}{}", account, parsed.path());

        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let canonical_headers = format!(
            "x-ms-blob-type:BlockBlob\nx-ms-date:{}\nx-ms-version:{}\n",
            date, AZURE_STORAGE_VERSION
        );
        let string_to_sign =
            put_blob_string_to_sign(body.len(), content_type, &canonical_headers, &canonical_resource);
        let signature = shared_key_signature(account_key, &string_to_sign)?;

        let res = self
            .client
            .put(parsed)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_STORAGE_VERSION)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("SharedKey {}:{}", account, signature),
            )
            .body(body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let code = res
                .headers()
                .get("x-ms-error-code")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            let message = res.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                status,
                code,
                message,
            });
        }
        log::debug!("put blob {} into {}", key, self.container);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JSON_CONTENT_TYPE;
    use axum::{
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode, Uri},
        response::IntoResponse,
        routing::put,
        Router,
    };
    use std::sync::{Arc, Mutex};

    // base64("test-account-key")
    const ACCOUNT_KEY: &str = "dGVzdC1hY2NvdW50LWtleQ==";

    #[derive(Debug, Clone)]
    struct Request {
        path: String,
        headers: HeaderMap,
        body: Vec<u8>,
    }

    type Captured = Arc<Mutex<Vec<Request>>>;

    async fn put_blob(
        State(captured): State<Captured>,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> axum::response::Response {
        captured.lock().unwrap().push(Request {
            path: uri.path().to_string(),
            headers,
            body: body.to_vec(),
        });
        if uri.path().contains("/missing/") {
            return (
                StatusCode::NOT_FOUND,
                [("x-ms-error-code", "ContainerNotFound")],
                "The specified container does not exist.",
            )
                .into_response();
        }
        StatusCode::CREATED.into_response()
    }

    async fn mock_blob_service() -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/*blob", put(put_blob))
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{}/devstoreaccount1", addr), captured)
    }

    #[test]
    fn default_endpoint_and_encoded_key() {
        let store = AzureBlobStore::new(None, None, None, "raw-zone");
        assert_eq!(
            store.blob_url("acct", "linebot/date=2024-03-05/09/07/09-07-02_1000_U 1.json"),
            "https://acct.blob.core.windows.net/raw-zone/linebot/date%3D2024-03-05/09/07/09-07-02_1000_U%201.json"
        );
    }

    #[test]
    fn string_to_sign_layout() {
        let s = put_blob_string_to_sign(
            12,
            "application/json",
            "x-ms-blob-type:BlockBlob\nx-ms-date:D\nx-ms-version:V\n",
            "/acct/raw-zone/a.json",
        );
        assert_eq!(
            s,
            "PUT\n\n\n12\n\napplication/json\n\n\n\n\n\n\nx-ms-blob-type:BlockBlob\nx-ms-date:D\nx-ms-version:V\n/acct/raw-zone/a.json"
        );
        let empty = put_blob_string_to_sign(0, "", "", "/r");
        assert_eq!(empty, "PUT\n\n\n\n\n\n\n\n\n\n\n\n/r");
    }

    #[test]
    fn signature_rejects_non_base64_key() {
        assert!(matches!(
            shared_key_signature("not base64!", "x"),
            Err(StorageError::InvalidAccountKey)
        ));
    }

    #[tokio::test]
    async fn puts_signed_block_blob() {
        let (endpoint, captured) = mock_blob_service().await;
        let store = AzureBlobStore::new(
            Some("devstoreaccount1".to_string()),
            Some(ACCOUNT_KEY.to_string()),
            Some(endpoint),
            "raw-zone",
        );
        store
            .put("linebot/a.json", b"{\"a\":1}".to_vec(), JSON_CONTENT_TYPE)
            .await
            .unwrap();

        let got = captured.lock().unwrap();
        assert_eq!(got.len(), 1);
        let req = &got[0];
        assert_eq!(req.path, "/devstoreaccount1/raw-zone/linebot/a.json");
        assert_eq!(req.body, b"{\"a\":1}");
        assert_eq!(req.headers["x-ms-blob-type"], "BlockBlob");
        assert_eq!(req.headers["x-ms-version"], AZURE_STORAGE_VERSION);
        assert_eq!(req.headers["content-type"], JSON_CONTENT_TYPE);

        let date = req.headers["x-ms-date"].to_str().unwrap();
        let expected_sts = put_blob_string_to_sign(
            req.body.len(),
            JSON_CONTENT_TYPE,
            &format!(
                "x-ms-blob-type:BlockBlob\nx-ms-date:{}\nx-ms-version:{}\n",
                date, AZURE_STORAGE_VERSION
            ),
            "/devstoreaccount1/devstoreaccount1/raw-zone/linebot/a.json",
        );
        let expected = format!(
            "SharedKey devstoreaccount1:{}",
            shared_key_signature(ACCOUNT_KEY, &expected_sts).unwrap()
        );
        assert_eq!(req.headers["authorization"], expected.as_str());
    }

    #[tokio::test]
    async fn service_errors_carry_code() {
        let (endpoint, _captured) = mock_blob_service().await;
        let store = AzureBlobStore::new(
            Some("devstoreaccount1".to_string()),
            Some(ACCOUNT_KEY.to_string()),
            Some(endpoint),
            "missing",
        );
        let err = store
            .put("linebot/a.json", b"{}".to_vec(), JSON_CONTENT_TYPE)
            .await
            .unwrap_err();
        match err {
            StorageError::Status { status, code, .. } => {
                assert_eq!(status, 404);
                assert_eq!(code, "ContainerNotFound");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_credentials_fail_on_use() {
        let store = AzureBlobStore::new(None, Some(ACCOUNT_KEY.to_string()), None, "raw-zone");
        let err = store.put("a.json", Vec::new(), JSON_CONTENT_TYPE).await.unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured("account name")));
        let store = AzureBlobStore::new(Some("acct".to_string()), None, None, "raw-zone");
        let err = store.put("a.json", Vec::new(), JSON_CONTENT_TYPE).await.unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured("account key")));
    }
}
