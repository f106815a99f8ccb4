use super::payload::{build_key, ImagePayload};
use super::{ImageStore, StoredImage};
use crate::config::ObjectStorageConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Url};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// S3-compatible object storage signed with AWS Signature Version 4
pub struct ObjectStore {
    config: ObjectStorageConfig,
    client: Client,
}

/// Headers produced by signing a single request
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SignedRequest {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
}

impl ObjectStore {
    pub const NAME: &'static str = "object";

    pub fn new(config: ObjectStorageConfig) -> Result<Self, StorageError> {
        if !config.is_complete() {
            return Err(StorageError::NotConfigured {
                backend: Self::NAME.to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StorageError::Upload {
                backend: Self::NAME.to_string(),
                details: e.to_string(),
            })?;

        Ok(Self { config, client })
    }

    fn object_key(&self, owner: &str, extension: &str) -> String {
        let key = build_key(owner, extension, Utc::now().timestamp_millis());
        let prefix = self.config.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            key
        } else {
            format!("{}/{}", prefix, key)
        }
    }

    /// Object URL; path-style for custom endpoints, virtual-hosted for AWS
    pub(crate) fn object_url(&self, key: &str) -> String {
        let key = encode_path(key);
        match &self.config.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.config.bucket,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.config.bucket, self.config.region, key
            ),
        }
    }

    pub(crate) fn sign(
        &self,
        method: &Method,
        url: &Url,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SignedRequest, StorageError> {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(StorageError::Upload {
                    backend: Self::NAME.to_string(),
                    details: format!("object URL has no host: {}", url),
                })
            }
        };

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let content_sha256 = hex::encode(Sha256::digest(payload));

        let canonical_request = format!(
            "{}\n{}\n\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
            method.as_str(),
            url.path(),
            host,
            content_sha256,
            amz_date,
            SIGNED_HEADERS,
            content_sha256
        );

        let scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let secret = format!("AWS4{}", self.config.secret_access_key);
        let k_date = hmac(secret.as_bytes(), date_stamp.as_bytes())?;
        let k_region = hmac(&k_date, self.config.region.as_bytes())?;
        let k_service = hmac(&k_region, b"s3")?;
        let k_signing = hmac(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes())?);

        Ok(SignedRequest {
            authorization: format!(
                "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                self.config.access_key_id, scope, SIGNED_HEADERS, signature
            ),
            amz_date,
            content_sha256,
        })
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let url_text = self.object_url(key);
        let url = Url::parse(&url_text).map_err(|e| StorageError::Upload {
            backend: Self::NAME.to_string(),
            details: format!("invalid object URL {}: {}", url_text, e),
        })?;

        let signed = self.sign(&method, &url, &body, Utc::now())?;

        let mut request = self
            .client
            .request(method, url)
            .header("authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256);
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                backend: Self::NAME.to_string(),
                details: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Upload {
            backend: Self::NAME.to_string(),
            details: format!("{}: {}", status, body.chars().take(200).collect::<String>()),
        })
    }
}

#[async_trait]
impl ImageStore for ObjectStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn upload(&self, image: &ImagePayload, owner: &str) -> Result<StoredImage, StorageError> {
        let key = self.object_key(owner, &image.extension);
        debug!(
            "Uploading {} bytes to bucket {} as {}",
            image.len(),
            self.config.bucket,
            key
        );

        self.send(
            Method::PUT,
            &key,
            image.bytes.to_vec(),
            Some(&image.content_type),
        )
        .await?;

        info!("Stored image {} in bucket {}", key, self.config.bucket);
        Ok(StoredImage {
            url: self.object_url(&key),
            key,
            backend: Self::NAME.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.send(Method::DELETE, key, Vec::new(), None).await
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| StorageError::Upload {
        backend: ObjectStore::NAME.to_string(),
        details: e.to_string(),
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode an object key, leaving path separators intact
fn encode_path(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
