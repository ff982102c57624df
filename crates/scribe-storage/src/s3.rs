//! S3-compatible object store client.
//!
//! Presigned part URLs are pure computation (SigV4 query signing) so issuing
//! them never touches the network. The multipart initiate/complete/abort
//! calls are signed requests over `reqwest` with bounded retry and backoff
//! for transient failures; permanent errors (4xx) surface immediately.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::{Client, Method, StatusCode, Url};
use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use scribe_core::defaults::{STORAGE_MAX_RETRIES, STORAGE_RETRY_BACKOFF_MS};
use scribe_core::{Error, ObjectStore, PartTag, Result};

type HmacSha256 = Hmac<Sha256>;

/// Connection settings for an S3-compatible endpoint.
///
/// Path-style addressing (`endpoint/bucket/key`) is used throughout, which
/// works against AWS and self-hosted stores alike.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

impl S3Config {
    /// Read configuration from `S3_ENDPOINT`, `S3_REGION`, `S3_BUCKET`,
    /// `S3_ACCESS_KEY`, `S3_SECRET_KEY`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| Error::Config(format!("{} is not set", name)))
        };
        Ok(Self {
            endpoint: var("S3_ENDPOINT")?,
            region: var("S3_REGION")?,
            bucket: var("S3_BUCKET")?,
            access_key: var("S3_ACCESS_KEY")?,
            secret_key: var("S3_SECRET_KEY")?,
        })
    }
}

/// S3-compatible [`ObjectStore`] implementation.
pub struct S3ObjectStore {
    config: S3Config,
    client: Client,
    host: String,
}

impl S3ObjectStore {
    pub fn new(config: S3Config) -> Result<Self> {
        let url = Url::parse(&config.endpoint)
            .map_err(|e| Error::Config(format!("invalid S3 endpoint: {}", e)))?;
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(Error::Config("S3 endpoint has no host".into())),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            host,
        })
    }

    fn object_url(&self, key: &str, query: &[(String, String)]) -> String {
        let mut url = format!(
            "{}/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            uri_encode(&self.config.bucket, false),
            uri_encode(key, false)
        );
        if !query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query(query));
        }
        url
    }

    fn canonical_uri(&self, key: &str) -> String {
        format!(
            "/{}/{}",
            uri_encode(&self.config.bucket, false),
            uri_encode(key, false)
        )
    }

    /// Compute a SigV4 query-presigned URL for one part upload.
    fn presign_part_url(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> String {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", date, self.config.region);

        let mut query: Vec<(String, String)> = vec![
            ("X-Amz-Algorithm".into(), "AWS4-HMAC-SHA256".into()),
            (
                "X-Amz-Credential".into(),
                format!("{}/{}", self.config.access_key, scope),
            ),
            ("X-Amz-Date".into(), amz_date.clone()),
            ("X-Amz-Expires".into(), ttl.as_secs().to_string()),
            ("X-Amz-SignedHeaders".into(), "host".into()),
            ("partNumber".into(), part_number.to_string()),
            ("uploadId".into(), upload_id.into()),
        ];
        query.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical_request = format!(
            "PUT\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            self.canonical_uri(key),
            canonical_query(&query),
            self.host
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            sha256_hex(canonical_request.as_bytes())
        );
        let signature = hex::encode(hmac_sha256(
            &self.signing_key(&date),
            string_to_sign.as_bytes(),
        ));

        query.push(("X-Amz-Signature".into(), signature));
        self.object_url(key, &query)
    }

    fn signing_key(&self, date: &str) -> Vec<u8> {
        let secret = format!("AWS4{}", self.config.secret_key);
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.config.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        hmac_sha256(&k_service, b"aws4_request")
    }

    /// Issue a header-signed request, retrying transient failures with
    /// doubling backoff. Returns the response body on success.
    async fn signed_request(
        &self,
        method: Method,
        key: &str,
        query: &[(String, String)],
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(StatusCode, String)> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self
                .signed_request_once(method.clone(), key, query, content_type, body.clone())
                .await
            {
                Ok(response) => return Ok(response),
                Err(RequestFailure::Permanent(err)) => return Err(err),
                Err(RequestFailure::Transient(reason)) => {
                    if attempt > STORAGE_MAX_RETRIES {
                        warn!(
                            subsystem = "storage",
                            component = "s3",
                            object_key = %key,
                            attempts = attempt,
                            error = %reason,
                            "Object store unavailable after bounded retries"
                        );
                        return Err(Error::StorageUnavailable(reason));
                    }
                    let base = STORAGE_RETRY_BACKOFF_MS << (attempt - 1);
                    let jitter = rand::thread_rng().gen_range(0..STORAGE_RETRY_BACKOFF_MS);
                    debug!(
                        subsystem = "storage",
                        component = "s3",
                        object_key = %key,
                        attempt,
                        backoff_ms = base + jitter,
                        "Retrying transient object store failure"
                    );
                    sleep(Duration::from_millis(base + jitter)).await;
                }
            }
        }
    }

    async fn signed_request_once(
        &self,
        method: Method,
        key: &str,
        query: &[(String, String)],
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> std::result::Result<(StatusCode, String), RequestFailure> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", date, self.config.region);
        let payload_hash = sha256_hex(&body);

        let mut sorted_query = query.to_vec();
        sorted_query.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical_request = format!(
            "{}\n{}\n{}\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\nhost;x-amz-content-sha256;x-amz-date\n{}",
            method.as_str(),
            self.canonical_uri(key),
            canonical_query(&sorted_query),
            self.host,
            payload_hash,
            amz_date,
            payload_hash
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            sha256_hex(canonical_request.as_bytes())
        );
        let signature = hex::encode(hmac_sha256(
            &self.signing_key(&date),
            string_to_sign.as_bytes(),
        ));
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature={}",
            self.config.access_key, scope, signature
        );

        let url = self.object_url(key, &sorted_query);
        let mut request = self
            .client
            .request(method, &url)
            .header("authorization", authorization)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash);
        if let Some(content_type) = content_type {
            // Not part of the signed header set; the store records it as-is.
            request = request.header("content-type", content_type);
        }
        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| RequestFailure::Transient(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RequestFailure::Transient(e.to_string()))?;

        if status.is_server_error() {
            return Err(RequestFailure::Transient(format!(
                "object store returned {}",
                status
            )));
        }
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(RequestFailure::Permanent(Error::Storage(format!(
                "object store returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            ))));
        }
        Ok((status, text))
    }
}

enum RequestFailure {
    /// Timeouts and 5xx: worth retrying with backoff.
    Transient(String),
    /// 4xx and malformed requests: retrying cannot help.
    Permanent(Error),
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn initiate_multipart(&self, key: &str, content_type: &str) -> Result<String> {
        let query = vec![("uploads".to_string(), String::new())];
        let (_, body) = self
            .signed_request(Method::POST, key, &query, Some(content_type), Vec::new())
            .await?;

        let upload_id = extract_xml_tag(&body, "UploadId").ok_or_else(|| {
            Error::Storage(format!(
                "multipart initiation response missing UploadId: {}",
                body.chars().take(200).collect::<String>()
            ))
        })?;

        info!(
            subsystem = "storage",
            component = "s3",
            op = "initiate",
            object_key = %key,
            "Initiated multipart upload"
        );
        Ok(upload_id)
    }

    async fn presign_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> Result<String> {
        Ok(self.presign_part_url(key, upload_id, part_number, ttl, Utc::now()))
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<()> {
        let mut xml = String::from("<CompleteMultipartUpload>");
        for (part_number, etag) in parts {
            xml.push_str(&format!(
                "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
                part_number,
                etag.trim_matches('"')
            ));
        }
        xml.push_str("</CompleteMultipartUpload>");

        let query = vec![("uploadId".to_string(), upload_id.to_string())];
        let (_, body) = self
            .signed_request(
                Method::POST,
                key,
                &query,
                Some("application/xml"),
                xml.into_bytes(),
            )
            .await?;

        // S3 can return 200 with an error document in the body.
        if body.contains("<Error>") {
            return Err(Error::Storage(format!(
                "multipart completion failed: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        info!(
            subsystem = "storage",
            component = "s3",
            op = "complete",
            object_key = %key,
            part_count = parts.len(),
            "Completed multipart upload"
        );
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()> {
        let query = vec![("uploadId".to_string(), upload_id.to_string())];
        let (status, _) = self
            .signed_request(Method::DELETE, key, &query, None, Vec::new())
            .await?;

        if status == StatusCode::NOT_FOUND {
            debug!(
                subsystem = "storage",
                component = "s3",
                object_key = %key,
                "Multipart upload already completed or aborted"
            );
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.signed_request(Method::DELETE, key, &[], None, Vec::new())
            .await?;
        Ok(())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC-SHA256 accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode per the SigV4 rules: unreserved characters pass through,
/// `/` passes only in paths.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn canonical_query(query: &[(String, String)]) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Extract the text content of the first `<tag>...</tag>` pair.
fn extract_xml_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> S3ObjectStore {
        S3ObjectStore::new(S3Config {
            endpoint: "https://s3.eu-central-1.example.com".into(),
            region: "eu-central-1".into(),
            bucket: "scribe-media".into(),
            access_key: "AKIDEXAMPLE".into(),
            secret_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_uri_encode_unreserved_passthrough() {
        assert_eq!(uri_encode("abc-DEF_0.9~", true), "abc-DEF_0.9~");
    }

    #[test]
    fn test_uri_encode_slash_modes() {
        assert_eq!(uri_encode("a/b", false), "a/b");
        assert_eq!(uri_encode("a/b", true), "a%2Fb");
        assert_eq!(uri_encode("a b+c", true), "a%20b%2Bc");
    }

    #[test]
    fn test_extract_xml_tag() {
        let body = "<InitiateMultipartUploadResult><UploadId>abc-123</UploadId></InitiateMultipartUploadResult>";
        assert_eq!(extract_xml_tag(body, "UploadId").as_deref(), Some("abc-123"));
        assert_eq!(extract_xml_tag(body, "Missing"), None);
    }

    #[test]
    fn test_presigned_url_shape() {
        let store = test_store();
        let now = DateTime::parse_from_rfc3339("2026-08-07T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let url = store.presign_part_url(
            "uploads/u1/s1/audio.mp3",
            "mpu-1",
            2,
            Duration::from_secs(900),
            now,
        );

        assert!(url.starts_with(
            "https://s3.eu-central-1.example.com/scribe-media/uploads/u1/s1/audio.mp3?"
        ));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Expires=900"));
        assert!(url.contains("partNumber=2"));
        assert!(url.contains("uploadId=mpu-1"));
        assert!(url.contains("X-Amz-Signature="));
        // Signed query parameters sort before the unsigned signature append.
        let part_pos = url.find("partNumber").unwrap();
        let cred_pos = url.find("X-Amz-Credential").unwrap();
        assert!(cred_pos < part_pos);
    }

    #[test]
    fn test_presigning_is_deterministic() {
        let store = test_store();
        let now = DateTime::parse_from_rfc3339("2026-08-07T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let a = store.presign_part_url("k", "u", 1, Duration::from_secs(60), now);
        let b = store.presign_part_url("k", "u", 1, Duration::from_secs(60), now);
        assert_eq!(a, b);

        let other_part = store.presign_part_url("k", "u", 2, Duration::from_secs(60), now);
        assert_ne!(a, other_part);
    }

    #[test]
    fn test_sigv4_signing_key_derivation() {
        // Chained HMAC must differ when any scope component changes.
        let store = test_store();
        assert_ne!(store.signing_key("20260807"), store.signing_key("20260808"));
    }
}
