//! Windowed listing and recursive enumeration
//!
//! One window maps to one underlying list call with delimiter `/` and a
//! fixed page size; sub-prefixes collapse into folder entries. The
//! recursive enumerator builds delete/copy plans: breadth within a
//! level, cancellable at every page boundary, with an optional async
//! continuation prompt for very large trees.

use crate::client::{ListObjectsRequest, ListVersionsRequest, ObjectStoreClient, VersionToken};
use futures::future::BoxFuture;
use s3browser_common::types::{LIST_PAGE_SIZE, ListWindow, S3Object};
use s3browser_common::{Error, Result, key};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Separator inside a version-listing continuation token; keys cannot
/// contain control characters, so this never collides.
const VERSION_TOKEN_SEP: char = '\x1f';

/// Async callback asked whether enumeration should continue after N
/// collected items. Returning `false` stops with a partial plan.
pub type ContinuationPrompt = Arc<dyn Fn(usize) -> BoxFuture<'static, bool> + Send + Sync>;

/// Options for [`ListingService::enumerate`].
#[derive(Clone, Default)]
pub struct EnumerateOptions {
    pub prompt: Option<ContinuationPrompt>,
    pub prompt_start_at: usize,
    pub prompt_every: usize,
}

impl std::fmt::Debug for EnumerateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnumerateOptions")
            .field("prompt", &self.prompt.is_some())
            .field("prompt_start_at", &self.prompt_start_at)
            .field("prompt_every", &self.prompt_every)
            .finish()
    }
}

impl EnumerateOptions {
    /// Default prompt thresholds: first ask at 500 items, then every
    /// 10,000.
    pub const DEFAULT_PROMPT_START_AT: usize = 500;
    pub const DEFAULT_PROMPT_EVERY: usize = 10_000;

    /// Options with a prompt at the default thresholds.
    #[must_use]
    pub fn with_prompt(prompt: ContinuationPrompt) -> Self {
        Self {
            prompt: Some(prompt),
            prompt_start_at: Self::DEFAULT_PROMPT_START_AT,
            prompt_every: Self::DEFAULT_PROMPT_EVERY,
        }
    }
}

/// The product of a recursive enumeration: every file key and folder
/// placeholder under the starting prefix.
#[derive(Clone, Debug, Default)]
pub struct EnumeratePlan {
    /// Plain object keys (not ending in `/`).
    pub files: Vec<String>,
    /// Folder placeholder keys (ending in `/`), including the starting
    /// prefix when it exists as an object.
    pub placeholders: Vec<String>,
    /// False when a continuation prompt stopped enumeration early.
    pub complete: bool,
}

impl EnumeratePlan {
    /// Total collected keys.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.files.len() + self.placeholders.len()
    }

    /// Whether nothing was collected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Windowed listing and recursive plan building.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListingService;

impl ListingService {
    /// List one window under `prefix`, folders collapsed.
    pub async fn list_window(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        include_versions: bool,
    ) -> Result<ListWindow> {
        let prefix = key::validate_prefix(prefix)?;
        if include_versions {
            Self::list_versions_window(client, bucket, &prefix, continuation_token).await
        } else {
            Self::list_objects_window(client, bucket, &prefix, continuation_token).await
        }
    }

    async fn list_objects_window(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListWindow> {
        let page = client
            .list_objects_v2(ListObjectsRequest {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                delimiter: Some("/".to_string()),
                continuation_token,
                max_keys: LIST_PAGE_SIZE,
            })
            .await?;

        let mut objects: Vec<S3Object> = page
            .common_prefixes
            .iter()
            .map(|cp| S3Object::folder(cp))
            .collect();
        for raw in page.objects {
            // The prefix placeholder itself is not a row in its own
            // window.
            if raw.key == prefix {
                continue;
            }
            objects.push(S3Object {
                name: S3Object::file_name(&raw.key),
                key: raw.key,
                is_folder: false,
                size: raw.size,
                last_modified: raw.last_modified,
                etag: raw.etag,
                version_id: None,
                is_latest: None,
                is_delete_marker: None,
            });
        }
        Ok(ListWindow {
            objects,
            continuation_token: page.next_continuation_token,
            is_truncated: page.is_truncated,
        })
    }

    async fn list_versions_window(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListWindow> {
        let token = continuation_token
            .as_deref()
            .map(decode_version_token)
            .transpose()?;
        let page = client
            .list_object_versions(ListVersionsRequest {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                delimiter: Some("/".to_string()),
                token,
                max_keys: LIST_PAGE_SIZE,
            })
            .await?;

        let mut objects: Vec<S3Object> = page
            .common_prefixes
            .iter()
            .map(|cp| S3Object::folder(cp))
            .collect();
        for raw in page.versions {
            if raw.key == prefix {
                continue;
            }
            objects.push(S3Object {
                name: S3Object::file_name(&raw.key),
                key: raw.key,
                is_folder: false,
                size: raw.size,
                last_modified: raw.last_modified,
                etag: raw.etag,
                version_id: raw.version_id,
                is_latest: Some(raw.is_latest),
                is_delete_marker: Some(raw.is_delete_marker),
            });
        }
        Ok(ListWindow {
            objects,
            continuation_token: page.next_token.as_ref().map(encode_version_token),
            is_truncated: page.is_truncated,
        })
    }

    /// Collect every key under `prefix`, recursively.
    ///
    /// Prefixes are processed breadth-within-level from a queue; every
    /// page boundary checks the cancellation token. When a prompt is
    /// configured it is asked at `prompt_start_at` collected items and
    /// every `prompt_every` after that; a `false` answer returns the
    /// partial plan with `complete == false`.
    pub async fn enumerate(
        client: &dyn ObjectStoreClient,
        bucket: &str,
        prefix: &str,
        opts: &EnumerateOptions,
        cancel: &CancellationToken,
    ) -> Result<EnumeratePlan> {
        let prefix = key::validate_prefix(prefix)?;
        if prefix.is_empty() {
            return Err(Error::invalid_input(
                "recursive enumeration requires a non-empty prefix",
            ));
        }

        let mut plan = EnumeratePlan {
            complete: true,
            ..EnumeratePlan::default()
        };
        let mut queue: VecDeque<String> = VecDeque::from([prefix]);
        let mut next_prompt_at = if opts.prompt.is_some() {
            Some(opts.prompt_start_at.max(1))
        } else {
            None
        };

        while let Some(current) = queue.pop_front() {
            let mut token: Option<String> = None;
            loop {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let page = client
                    .list_objects_v2(ListObjectsRequest {
                        bucket: bucket.to_string(),
                        prefix: current.clone(),
                        delimiter: Some("/".to_string()),
                        continuation_token: token.take(),
                        max_keys: LIST_PAGE_SIZE,
                    })
                    .await?;

                for sub_prefix in page.common_prefixes {
                    queue.push_back(sub_prefix);
                }
                for raw in page.objects {
                    if raw.key.ends_with('/') {
                        plan.placeholders.push(raw.key);
                    } else {
                        plan.files.push(raw.key);
                    }
                    if let (Some(threshold), Some(prompt)) = (next_prompt_at, opts.prompt.as_ref())
                    {
                        if plan.len() >= threshold {
                            if !prompt(plan.len()).await {
                                plan.complete = false;
                                return Ok(plan);
                            }
                            next_prompt_at = Some(threshold + opts.prompt_every.max(1));
                        }
                    }
                }

                if page.is_truncated {
                    token = page.next_continuation_token;
                } else {
                    break;
                }
            }
        }
        Ok(plan)
    }
}

fn encode_version_token(token: &VersionToken) -> String {
    match &token.version_id_marker {
        Some(version) => format!("{}{VERSION_TOKEN_SEP}{version}", token.key_marker),
        None => token.key_marker.clone(),
    }
}

fn decode_version_token(raw: &str) -> Result<VersionToken> {
    let mut parts = raw.splitn(2, VERSION_TOKEN_SEP);
    let key_marker = parts
        .next()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::invalid_input("malformed continuation token"))?;
    Ok(VersionToken {
        key_marker: key_marker.to_string(),
        version_id_marker: parts.next().map(str::to_string),
    })
}
