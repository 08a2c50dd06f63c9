use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::backends::line_reader::LineReader;
use crate::backends::s3::{ObjectPath, default_s3_region, s3_client};
use crate::backends::{CommonSourceConfig, InputOrigin, Source};
use crate::progress::ProgressMetrics;

/// 🔧 Which object to stream, and from where.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct S3SourceConfig {
    /// 🗝️ `bucket/key`, parsed with [`ObjectPath::parse`] when the source opens.
    pub object: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default)]
    pub common_config: CommonSourceConfig,
}

impl S3SourceConfig {
    pub fn for_object(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            region: default_s3_region(),
            common_config: CommonSourceConfig::default(),
        }
    }
}

// 🧠 `ByteStream::into_async_read()` returns an opaque type. Boxing it lets the struct name it.
type S3AsyncReader = Box<dyn AsyncRead + Send + Unpin>;

/// 🪣 Streams one clickstream export out of S3 without ever holding the whole object.
///
/// Transport: `HeadObject` (size for the progress bar) → `GetObject` →
/// `ByteStream::into_async_read()` → the same `LineReader` the file source uses.
pub(crate) struct S3Source {
    lines: LineReader<S3AsyncReader>,
    object: ObjectPath,
    region: String,
}

impl std::fmt::Debug for S3Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Source")
            .field("object", &self.object)
            .field("region", &self.region)
            .finish()
    }
}

impl S3Source {
    /// 🚀 Resolve credentials, confirm the object is there, open the byte stream.
    pub(crate) async fn new(source_config: S3SourceConfig, show_progress: bool) -> Result<Self> {
        let object = ObjectPath::parse(&source_config.object).context(format!(
            "💀 '{}' is not a usable object path. Expected `bucket/key`.",
            source_config.object
        ))?;
        let the_s3_client = s3_client(&source_config.region).await;

        // 📏 HEAD first: a missing object or a permissions problem fails here, at startup.
        let the_head_response = the_s3_client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .context(format!(
                "💀 HEAD request failed for {object}. The bucket ghosted us. \
                 Check: bucket name, key path, region, and credentials."
            ))?;
        let the_content_length = the_head_response
            .content_length()
            .and_then(|length| u64::try_from(length).ok())
            .unwrap_or(0);

        let the_get_response = the_s3_client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .context(format!(
                "💀 GetObject failed for {object}. HEAD said the data is there, \
                 but S3 won't let us read it. Check: IAM permissions, bucket policy, KMS key access."
            ))?;

        let the_boxed_reader: S3AsyncReader = Box::new(the_get_response.body.into_async_read());
        let the_progress = ProgressMetrics::new(object.to_string(), the_content_length, show_progress);
        let lines = LineReader::new(the_boxed_reader, &source_config.common_config, the_progress);

        Ok(Self {
            lines,
            object,
            region: source_config.region,
        })
    }
}

#[async_trait]
impl Source for S3Source {
    async fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        self.lines
            .read_line(buf)
            .await
            .context(format!("💀 The S3 stream for {} broke off mid-object.", self.object))
    }

    fn origin(&self) -> InputOrigin {
        InputOrigin::S3 {
            object: self.object.clone(),
            region: self.region.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_region_defaults_to_where_data_goes_to_retire() {
        let the_config: S3SourceConfig = toml::from_str(r#"object = "clickstream/inbound/data.tsv""#)
            .expect("💀 an object alone should be enough config");

        assert_eq!(the_config.region, "us-east-1");
        assert_eq!(the_config.common_config, CommonSourceConfig::default());
    }

    #[tokio::test]
    async fn the_one_where_a_bucket_without_a_key_fails_before_touching_the_network() {
        let the_error = S3Source::new(S3SourceConfig::for_object("just-a-bucket"), false)
            .await
            .expect_err("💀 a keyless object path must be refused");

        assert!(format!("{the_error:#}").contains("no '/' separating the bucket from the key"));
    }
}
