//! Object-key, prefix and profile-name validation
//!
//! Every mutation path runs its key material through these checks before
//! anything reaches the object store. Traversal-shaped input (`..`
//! segments, leading `/`, NUL bytes) is rejected outright.

use crate::error::{Error, Result};

/// Maximum object key length accepted by S3-compatible stores.
const MAX_KEY_BYTES: usize = 1024;

/// Maximum profile name length.
const MAX_PROFILE_NAME_LEN: usize = 64;

/// Validate and return an object key for upload/delete/copy targets.
///
/// Rejects empty keys, leading `/`, `..` path segments, NUL bytes and
/// ASCII control characters. The key is otherwise returned unchanged.
pub fn sanitize_key(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(Error::invalid_input("object key must not be empty"));
    }
    if raw.len() > MAX_KEY_BYTES {
        return Err(Error::invalid_input(format!(
            "object key exceeds {MAX_KEY_BYTES} bytes"
        )));
    }
    if raw.starts_with('/') {
        return Err(Error::invalid_input(
            "object key must not start with a slash",
        ));
    }
    if raw.split('/').any(|segment| segment == "..") {
        return Err(Error::invalid_input(
            "object key must not contain '..' segments",
        ));
    }
    if raw.chars().any(|c| c.is_ascii_control()) {
        return Err(Error::invalid_input(
            "object key must not contain control characters",
        ));
    }
    Ok(raw.to_string())
}

/// Validate a listing/enumeration prefix: empty, or a sane key ending
/// with `/`.
pub fn validate_prefix(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Ok(String::new());
    }
    if !raw.ends_with('/') {
        return Err(Error::invalid_input("prefix must end with '/'"));
    }
    sanitize_key(raw)
}

/// Validate a copy/move destination key.
///
/// On top of the plain key rules the destination must not contain
/// duplicate slashes; the caller is responsible for normalization and a
/// `//` almost always means it failed to.
pub fn validate_destination_key(raw: &str) -> Result<String> {
    let key = sanitize_key(raw)?;
    if key.contains("//") {
        return Err(Error::invalid_input(
            "destination key must not contain duplicate slashes",
        ));
    }
    Ok(key)
}

/// Validate a connection profile name: non-empty, at most 64 chars, from
/// `[A-Za-z0-9._-]`.
pub fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_input("profile name must not be empty"));
    }
    if name.len() > MAX_PROFILE_NAME_LEN {
        return Err(Error::invalid_input(format!(
            "profile name exceeds {MAX_PROFILE_NAME_LEN} characters"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '-'))
    {
        return Err(Error::invalid_input(format!(
            "profile name contains invalid character: {bad:?}"
        )));
    }
    Ok(())
}

/// Validate a connection endpoint URL: `http` or `https` scheme with a
/// non-empty host part.
pub fn validate_endpoint(endpoint: &str) -> Result<()> {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .ok_or_else(|| {
            Error::invalid_input("endpoint must use the http or https scheme")
        })?;
    let host = rest.split('/').next().unwrap_or("");
    if host.is_empty() {
        return Err(Error::invalid_input("endpoint is missing a host"));
    }
    Ok(())
}

/// Extract the host portion of an endpoint URL, if well-formed.
#[must_use]
pub fn endpoint_host(endpoint: &str) -> Option<&str> {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))?;
    let host_port = rest.split('/').next()?;
    let host = host_port.split(':').next()?;
    if host.is_empty() { None } else { Some(host) }
}
