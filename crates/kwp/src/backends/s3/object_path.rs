use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// 🗝️ `bucket/key/with/slashes`, split on the first `/`.
///
/// An optional `s3://` prefix is tolerated. Everything after the first `/` is the key,
/// slashes and all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectPath {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObjectPathError {
    #[error("object path '{0}' has no '/' separating the bucket from the key")]
    MissingSeparator(String),
    #[error("object path '{0}' has an empty bucket")]
    EmptyBucket(String),
    #[error("object path '{0}' has an empty key")]
    EmptyKey(String),
}

impl ObjectPath {
    pub fn parse(raw: &str) -> Result<Self, ObjectPathError> {
        let the_path = raw.strip_prefix("s3://").unwrap_or(raw);
        let Some((bucket, key)) = the_path.split_once('/') else {
            return Err(ObjectPathError::MissingSeparator(raw.to_string()));
        };
        if bucket.is_empty() {
            return Err(ObjectPathError::EmptyBucket(raw.to_string()));
        }
        if key.is_empty() {
            return Err(ObjectPathError::EmptyKey(raw.to_string()));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// 📄 The last path segment of the key: `inbound/data.tsv` → `data.tsv`.
    pub fn basename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl FromStr for ObjectPath {
    type Err = ObjectPathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
