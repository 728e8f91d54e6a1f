//! Profile export as CLI configuration fragments
//!
//! Renders a connection profile into an AWS CLI or rclone configuration
//! fragment containing the decrypted credentials. Content only ever
//! exists in memory; the transport layer marks the response
//! `Cache-Control: no-store`.

use s3browser_common::types::{ConnectionRecord, Vendor};
use s3browser_common::{Error, Result, key};

/// Supported export formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Aws,
    Rclone,
}

impl ExportFormat {
    /// Parse the `format` query parameter.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "aws" => Ok(Self::Aws),
            "rclone" => Ok(Self::Rclone),
            other => Err(Error::invalid_input(format!(
                "unsupported export format {other:?}"
            ))),
        }
    }
}

/// A rendered export: suggested filename plus plain-text content.
#[derive(Clone, Debug)]
pub struct ExportFile {
    pub filename: String,
    pub content: String,
}

/// Render the profile into the requested format.
#[must_use]
pub fn render(
    format: ExportFormat,
    record: &ConnectionRecord,
    secret: &str,
    bucket: Option<&str>,
) -> ExportFile {
    match format {
        ExportFormat::Aws => render_aws(record, secret, bucket),
        ExportFormat::Rclone => render_rclone(record, secret, bucket),
    }
}

fn render_aws(record: &ConnectionRecord, secret: &str, bucket: Option<&str>) -> ExportFile {
    let region = record.region.as_deref().unwrap_or("us-east-1");
    let mut content = format!(
        "[profile {name}]\n\
         aws_access_key_id = {access_key}\n\
         aws_secret_access_key = {secret}\n\
         region = {region}\n",
        name = record.profile_name,
        access_key = record.access_key_id,
    );
    if !record.endpoint.contains("amazonaws.com") {
        content.push_str(&format!("endpoint_url = {}\n", record.endpoint));
    }
    if let Some(bucket) = bucket {
        content.push_str(&format!("# default bucket: s3://{bucket}\n"));
    }
    ExportFile {
        filename: format!("{}-aws-profile.txt", record.profile_name),
        content,
    }
}

fn render_rclone(record: &ConnectionRecord, secret: &str, bucket: Option<&str>) -> ExportFile {
    let provider = match key::endpoint_host(&record.endpoint).map(Vendor::from_host) {
        Some(Vendor::Aws) => "AWS",
        _ => "Other",
    };
    let mut content = format!(
        "[{name}]\n\
         type = s3\n\
         provider = {provider}\n\
         access_key_id = {access_key}\n\
         secret_access_key = {secret}\n",
        name = record.profile_name,
        access_key = record.access_key_id,
    );
    if !record.endpoint.contains("amazonaws.com") {
        content.push_str(&format!("endpoint = {}\n", record.endpoint));
    }
    if let Some(region) = record.region.as_deref() {
        content.push_str(&format!("region = {region}\n"));
    }
    if let Some(bucket) = bucket {
        content.push_str(&format!("# remote path: {}:{bucket}\n", record.profile_name));
    }
    ExportFile {
        filename: format!("{}-rclone.conf", record.profile_name),
        content,
    }
}
