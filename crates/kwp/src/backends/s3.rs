//! 🪣🚀🌐 S3 backend: the clickstream arrives in a bucket, the report leaves in one.
//!
//! INT. AWS CONSOLE. NIGHT. Somebody dropped a file into `inbound/`. Nobody remembers
//! why. The cron fired, and now a Rust process is streaming it line by line,
//! counting dollars by search phrase.
//!
//! 🧠 Knowledge graph:
//! - [`ObjectPath`]: `bucket/key` split on the first `/`. Shared by source and publisher.
//! - [`S3Source`]: `GetObject` → `ByteStream::into_async_read()` → `LineReader`.
//! - [`S3Publisher`]: `PutObject` to `outbound/`, `CopyObject` to `processed/`, `DeleteObject` inbound.
//! - Credentials come from the SDK default chain: env vars, `~/.aws/config`, instance role.
//!
//! 🦆 The duck has no clearance for AWS. It watches from the edge of the VPC.

mod object_path;
mod s3_publisher;
mod s3_source;

pub use object_path::{ObjectPath, ObjectPathError};
pub use s3_publisher::S3PublishConfig;
pub(crate) use s3_publisher::S3Publisher;
pub use s3_source::S3SourceConfig;
pub(crate) use s3_source::S3Source;

// -- 🏖️ if you don't choose a region, the region chooses you
pub(crate) fn default_s3_region() -> String {
    "us-east-1".to_string()
}

/// 🔧 An S3 client for `region`, everything else from the environment.
pub(crate) async fn s3_client(region: &str) -> aws_sdk_s3::Client {
    let the_aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_sdk_s3::config::Region::new(region.to_string()))
        .load()
        .await;
    aws_sdk_s3::Client::new(&the_aws_config)
}
