//! S3-compatible storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use futures::StreamExt;

use super::{ItemOutcome, RemoteStore};
use crate::config::BucketConfig;
use crate::error::StoreError;
use crate::model::{FileDigest, PendingEvent};

/// User metadata entry carrying the hex MD5 of the uploaded file.
/// Stored as `x-amz-meta-md5`.
const MD5_METADATA_KEY: &str = "md5";

/// DeleteObjects accepts at most this many keys per request.
const DELETE_CHUNK: usize = 1000;

/// Uploads in flight at once within one batch.
const UPLOAD_CONCURRENCY: usize = 8;

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for the configured bucket.
    ///
    /// Explicit credentials win; otherwise the default AWS provider chain
    /// (environment, profile, instance metadata) is used. The bucket is probed
    /// once, but an unreachable bucket is only logged: the dispatcher reports
    /// failures per batch anyway.
    pub async fn connect(config: &BucketConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(id, secret, None, None, "syncs3"));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        // Path-style addressing is required by MinIO and most self-hosted services.
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint.is_some())
            .build();
        let client = Client::from_conf(s3_config);

        match client.head_bucket().bucket(&config.name).send().await {
            Ok(_) => tracing::info!(bucket = %config.name, "connected to bucket"),
            Err(err) => tracing::warn!(
                bucket = %config.name,
                error = %DisplayErrorContext(&err),
                "could not verify bucket, will attempt operations anyway"
            ),
        }

        Self::from_client(client, config.name.clone())
    }

    pub fn from_client(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Returns the outcome plus whether the failure (if any) was a transport failure.
    async fn upload_one(&self, event: &PendingEvent) -> (ItemOutcome, bool) {
        let key = event.canonical_key.clone();
        let Some(digest) = &event.digest else {
            let error = StoreError::Object {
                key: key.clone(),
                message: "no digest computed for upload".into(),
            };
            return (ItemOutcome::failed(key, error), false);
        };

        let body = match ByteStream::from_path(event.path()).await {
            Ok(body) => body,
            Err(err) => {
                let error = StoreError::Io {
                    path: event.path().to_path_buf(),
                    message: err.to_string(),
                };
                return (ItemOutcome::failed(key, error), false);
            }
        };

        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .metadata(MD5_METADATA_KEY, digest.hex())
            .send()
            .await;

        match result {
            Ok(_) => (ItemOutcome::ok(key), false),
            Err(err) => {
                let transport = is_transport(&err);
                let error = StoreError::Object {
                    key: key.clone(),
                    message: DisplayErrorContext(&err).to_string(),
                };
                (ItemOutcome::failed(key, error), transport)
            }
        }
    }
}

/// What a HeadObject lookup found under a key.
#[derive(Debug, Clone, Copy)]
enum RemoteObject<'a> {
    Missing,
    Present {
        e_tag: Option<&'a str>,
        md5_metadata: Option<&'a str>,
    },
}

impl RemoteObject<'_> {
    /// Whether the remote object holds content with digest `hex`.
    ///
    /// A plain MD5 ETag is computed by the store from the bytes it received,
    /// so it alone decides. The `md5` metadata records the digest taken at
    /// classification time and may be stale if the file changed before upload;
    /// it is consulted only when the ETag is multipart or opaque.
    fn matches(self, hex: &str) -> bool {
        let RemoteObject::Present {
            e_tag,
            md5_metadata,
        } = self
        else {
            return false;
        };
        match e_tag.map(|tag| tag.trim_matches('"')) {
            Some(tag) if is_plain_md5(tag) => tag.eq_ignore_ascii_case(hex),
            _ => md5_metadata.is_some_and(|v| v.eq_ignore_ascii_case(hex)),
        }
    }
}

/// Single-part uploads report the MD5 of the body as their ETag.
fn is_plain_md5(tag: &str) -> bool {
    tag.len() == 32 && tag.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_transport<E, R>(err: &SdkError<E, R>) -> bool {
    matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_))
}

/// Collapse a batch whose every item failed in transport into one store-level error.
fn all_transport_failures(
    outcomes: Vec<ItemOutcome>,
    transport_failures: usize,
) -> Result<Vec<ItemOutcome>, StoreError> {
    if !outcomes.is_empty() && transport_failures == outcomes.len() {
        let message = outcomes
            .into_iter()
            .find_map(|o| o.result.err())
            .map(|e| e.to_string())
            .unwrap_or_default();
        return Err(StoreError::Unavailable(message));
    }
    Ok(outcomes)
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn exists(&self, key: &str, digest: &FileDigest) -> Result<bool, StoreError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(head) => {
                let remote = RemoteObject::Present {
                    e_tag: head.e_tag(),
                    md5_metadata: head
                        .metadata()
                        .and_then(|m| m.get(MD5_METADATA_KEY))
                        .map(String::as_str),
                };
                Ok(remote.matches(&digest.hex()))
            }
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    Ok(RemoteObject::Missing.matches(&digest.hex()))
                } else {
                    Err(StoreError::Unavailable(DisplayErrorContext(&err).to_string()))
                }
            }
        }
    }

    async fn batch_upload(&self, events: &[PendingEvent]) -> Result<Vec<ItemOutcome>, StoreError> {
        let uploads: Vec<_> = events.iter().map(|event| self.upload_one(event)).collect();
        let results: Vec<(ItemOutcome, bool)> = futures::stream::iter(uploads)
            .buffered(UPLOAD_CONCURRENCY)
            .collect()
            .await;

        let transport_failures = results.iter().filter(|(_, transport)| *transport).count();
        let outcomes = results.into_iter().map(|(outcome, _)| outcome).collect();
        all_transport_failures(outcomes, transport_failures)
    }

    async fn batch_delete(&self, events: &[PendingEvent]) -> Result<Vec<ItemOutcome>, StoreError> {
        let mut outcomes = Vec::with_capacity(events.len());
        let mut transport_failures = 0;

        for chunk in events.chunks(DELETE_CHUNK) {
            let objects = chunk
                .iter()
                .map(|e| ObjectIdentifier::builder().key(&e.canonical_key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Unavailable(format!("invalid delete request: {e}")))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| StoreError::Unavailable(format!("invalid delete request: {e}")))?;

            let result = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await;

            match result {
                Ok(output) => {
                    // Quiet mode: only failed keys are listed.
                    let failed: HashMap<&str, &str> = output
                        .errors()
                        .iter()
                        .filter_map(|e| e.key().map(|k| (k, e.message().unwrap_or("delete failed"))))
                        .collect();
                    for event in chunk {
                        let key = event.canonical_key.clone();
                        match failed.get(key.as_str()) {
                            Some(message) => {
                                let error = StoreError::Object {
                                    key: key.clone(),
                                    message: (*message).to_string(),
                                };
                                outcomes.push(ItemOutcome::failed(key, error));
                            }
                            None => outcomes.push(ItemOutcome::ok(key)),
                        }
                    }
                }
                Err(err) => {
                    let transport = is_transport(&err);
                    let message = DisplayErrorContext(&err).to_string();
                    for event in chunk {
                        if transport {
                            transport_failures += 1;
                        }
                        let key = event.canonical_key.clone();
                        let error = StoreError::Object {
                            key: key.clone(),
                            message: message.clone(),
                        };
                        outcomes.push(ItemOutcome::failed(key, error));
                    }
                }
            }
        }

        all_transport_failures(outcomes, transport_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const V2: &str = "b10a8db164e0754105b7a99be72e3fe5";

    #[test]
    fn missing_object_never_matches() {
        assert!(!RemoteObject::Missing.matches(V1));
    }

    #[test]
    fn plain_etag_decides_over_metadata() {
        // Bytes changed between hashing and upload: body is v2, metadata says v1.
        let remote = RemoteObject::Present {
            e_tag: Some("\"b10a8db164e0754105b7a99be72e3fe5\""),
            md5_metadata: Some(V1),
        };
        assert!(!remote.matches(V1));
        assert!(remote.matches(V2));
    }

    #[test]
    fn plain_etag_is_case_insensitive() {
        let remote = RemoteObject::Present {
            e_tag: Some("\"5EB63BBBE01EEED093CB22BB8F5ACDC3\""),
            md5_metadata: None,
        };
        assert!(remote.matches(V1));
    }

    #[test]
    fn multipart_etag_falls_back_to_metadata() {
        let remote = RemoteObject::Present {
            e_tag: Some("\"d41d8cd98f00b204e9800998ecf8427e-3\""),
            md5_metadata: Some(V1),
        };
        assert!(remote.matches(V1));
        assert!(!remote.matches(V2));

        let untagged = RemoteObject::Present {
            e_tag: None,
            md5_metadata: None,
        };
        assert!(!untagged.matches(V1));
    }

    #[test]
    fn all_transport_failures_collapse_to_unavailable() {
        let outcomes = vec![
            ItemOutcome::failed("/a", StoreError::Unavailable("connection refused".into())),
            ItemOutcome::failed("/b", StoreError::Unavailable("connection refused".into())),
        ];
        let err = all_transport_failures(outcomes, 2).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(msg) if msg.contains("connection refused")));
    }

    #[test]
    fn partial_failures_stay_per_item() {
        let outcomes = vec![
            ItemOutcome::ok("/a"),
            ItemOutcome::failed("/b", StoreError::Unavailable("timeout".into())),
        ];
        let outcomes = all_transport_failures(outcomes, 1).unwrap();
        assert_eq!(outcomes.len(), 2);
    }

    #[test]
    fn empty_batch_is_not_an_outage() {
        assert!(all_transport_failures(Vec::new(), 0).unwrap().is_empty());
    }
}
