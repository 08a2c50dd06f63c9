use std::path::Path;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use serde::Deserialize;
use tracing::info;

use crate::backends::s3::{ObjectPath, default_s3_region, s3_client};
use crate::backends::{InputOrigin, Publisher, RunArtifacts};

/// 🔧 Where the report and log go in S3, and what happens to the processed input.
#[derive(Debug, Deserialize, Clone)]
pub struct S3PublishConfig {
    /// 🪣 Destination bucket. Omitted means "the bucket the input came from".
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default = "default_outbound_prefix")]
    pub outbound_prefix: String,
    #[serde(default = "default_processed_prefix")]
    pub processed_prefix: String,
    /// 📦 Move an S3 input to `processed/<date>_<basename>` once the run succeeds.
    #[serde(default = "default_archive_input")]
    pub archive_input: bool,
    #[serde(default)]
    pub remove_local: bool,
}

fn default_outbound_prefix() -> String {
    "outbound/".to_string()
}

fn default_processed_prefix() -> String {
    "processed/".to_string()
}

fn default_archive_input() -> bool {
    true
}

impl S3PublishConfig {
    /// 🪣 Configured bucket, else the input's bucket, else nothing we can use.
    pub fn resolve_bucket(&self, input: &InputOrigin) -> Result<String> {
        match (&self.bucket, input) {
            (Some(bucket), _) => Ok(bucket.clone()),
            (None, InputOrigin::S3 { object, .. }) => Ok(object.bucket.clone()),
            (None, _) => Err(anyhow!(
                "💀 The S3 publisher has no bucket configured and the input did not come from S3. \
                 Set publish_config.S3.bucket."
            )),
        }
    }

    pub fn outbound_key(&self, file_name: &str) -> String {
        format!("{}{}", self.outbound_prefix, file_name)
    }

    /// 📦 `processed/2026-10-14_data.tsv` for an input at `inbound/data.tsv`.
    pub fn processed_key(&self, date: &str, input: &ObjectPath) -> String {
        format!("{}{}_{}", self.processed_prefix, date, input.basename())
    }
}

/// 🚰 A `ByteStream` that reads `artifact` from disk as it uploads. A multi-gigabyte
/// debug log never sits in memory.
async fn artifact_body(artifact: &Path) -> Result<ByteStream> {
    ByteStream::from_path(artifact)
        .await
        .context(format!("💀 Could not open '{}' for upload.", artifact.display()))
}

/// 🪣 Uploads the run's artifacts and archives the S3 input.
///
/// Order matters: uploads first, then the copy into `processed/`, then the delete
/// of the inbound object. A failure at any step stops the rest, so the inbound
/// object is never deleted without an archived copy.
pub(crate) struct S3Publisher {
    config: S3PublishConfig,
    client: aws_sdk_s3::Client,
}

impl std::fmt::Debug for S3Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Publisher")
            .field("config", &self.config)
            .finish()
    }
}

impl S3Publisher {
    pub(crate) async fn new(config: S3PublishConfig) -> Self {
        let client = s3_client(&config.region).await;
        Self { config, client }
    }

    async fn upload(&self, bucket: &str, artifact: &Path) -> Result<()> {
        let the_name = artifact
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("💀 '{}' has no usable file name to upload under.", artifact.display()))?;
        let the_key = self.config.outbound_key(the_name);

        let the_body = artifact_body(artifact).await?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(&the_key)
            .body(the_body)
            .send()
            .await
            .context(format!("💀 Uploading '{}' to s3://{bucket}/{the_key} failed.", artifact.display()))?;

        info!("📤 uploaded '{}' to s3://{}/{}", artifact.display(), bucket, the_key);
        if self.config.remove_local {
            tokio::fs::remove_file(artifact).await.context(format!(
                "💀 '{}' was uploaded but refused to be removed locally.",
                artifact.display()
            ))?;
        }
        Ok(())
    }

    async fn archive(&self, date: &str, input: &ObjectPath) -> Result<()> {
        let the_processed_key = self.config.processed_key(date, input);
        self.client
            .copy_object()
            .copy_source(format!("{}/{}", input.bucket, input.key))
            .bucket(&input.bucket)
            .key(&the_processed_key)
            .send()
            .await
            .context(format!(
                "💀 Copying {input} to s3://{}/{the_processed_key} failed. The inbound object is untouched.",
                input.bucket
            ))?;

        self.client
            .delete_object()
            .bucket(&input.bucket)
            .key(&input.key)
            .send()
            .await
            .context(format!(
                "💀 {input} was archived but could not be deleted. It will be processed again next run."
            ))?;

        info!("📦 archived {} as s3://{}/{}", input, input.bucket, the_processed_key);
        Ok(())
    }
}

#[async_trait]
impl Publisher for S3Publisher {
    async fn publish(&mut self, artifacts: &RunArtifacts) -> Result<()> {
        let the_bucket = self.config.resolve_bucket(&artifacts.input)?;

        if let Some(log_path) = &artifacts.log_path {
            self.upload(&the_bucket, log_path).await?;
        }
        self.upload(&the_bucket, &artifacts.report_path).await?;

        if let (true, InputOrigin::S3 { object, .. }) = (self.config.archive_input, &artifacts.input) {
            self.archive(&artifacts.date, object).await?;
        }
        Ok(())
    }

    fn destination(&self) -> String {
        match &self.config.bucket {
            Some(bucket) => format!("s3://{}/{}", bucket, self.config.outbound_prefix),
            None => format!("s3://<input bucket>/{}", self.config.outbound_prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn the_default_config() -> S3PublishConfig {
        toml::from_str("").expect("💀 an empty S3 publish table should take every default")
    }

    fn an_s3_input() -> InputOrigin {
        InputOrigin::S3 {
            object: ObjectPath::parse("clickstream/inbound/data.tsv").expect("💀 valid path"),
            region: "us-east-1".to_string(),
        }
    }

    #[test]
    fn the_one_where_artifacts_go_outbound_and_inputs_get_a_date_stamp() {
        let the_config = the_default_config();
        let the_input = ObjectPath::parse("clickstream/inbound/data.tsv").expect("💀 valid path");

        assert_eq!(
            the_config.outbound_key("2026-10-14_SearchKeywordPerformance.tab"),
            "outbound/2026-10-14_SearchKeywordPerformance.tab"
        );
        assert_eq!(
            the_config.processed_key("2026-10-14", &the_input),
            "processed/2026-10-14_data.tsv"
        );
        assert!(the_config.archive_input);
        assert!(!the_config.remove_local);
    }

    #[test]
    fn the_one_where_the_bucket_falls_back_to_where_the_input_lived() {
        let the_config = the_default_config();
        assert_eq!(
            the_config
                .resolve_bucket(&an_s3_input())
                .expect("💀 should fall back to the input bucket"),
            "clickstream"
        );

        let the_pinned = S3PublishConfig {
            bucket: Some("reports".to_string()),
            ..the_default_config()
        };
        assert_eq!(
            the_pinned
                .resolve_bucket(&an_s3_input())
                .expect("💀 configured bucket wins"),
            "reports"
        );
    }

    #[test]
    fn the_one_where_a_local_input_and_no_bucket_is_a_dead_end() {
        let the_config = the_default_config();
        assert!(the_config.resolve_bucket(&InputOrigin::InMemory).is_err());
    }

    #[tokio::test]
    async fn the_one_where_uploads_stream_from_disk_with_a_known_length() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_log = the_dir.path().join("log.txt");
        std::fs::write(&the_log, "[Info]\tFile finished processing.\n")?;

        let the_body = artifact_body(&the_log).await?;

        assert_eq!(the_body.size_hint().1, Some(33));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_vanished_artifact_fails_before_any_request() {
        let the_error = artifact_body(Path::new("/definitely/not/here/report.tab"))
            .await
            .expect_err("💀 a missing artifact cannot be uploaded");

        assert!(format!("{the_error:#}").contains("/definitely/not/here/report.tab"));
    }
}
