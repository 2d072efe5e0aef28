use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Blob storage used for sources, reference faces, variants and archives.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError>;

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    region: Region,
    credentials: Credentials,
}

impl R2Client {
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { region, credentials })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StorageError> {
        Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Delete an object.
    pub async fn delete(&self, bucket: &str, path: &str) -> Result<(), StorageError> {
        self.bucket(bucket)?
            .delete_object(path)
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket(bucket)?
            .get_object(path)
            .await
            .map_err(StorageError::S3)?;
        check_status(response.status_code(), path)?;
        Ok(response.to_vec())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        let response = self
            .bucket(bucket)?
            .put_object_with_content_type(path, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        check_status(response.status_code(), path)
    }
}

fn check_status(code: u16, path: &str) -> Result<(), StorageError> {
    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(StorageError::Status {
            code,
            path: path.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage returned HTTP {code} for {path}")]
    Status { code: u16, path: String },

    #[error("Storage configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_success_status_is_an_error() {
        assert!(check_status(200, "a").is_ok());
        assert!(check_status(204, "a").is_ok());
        let err = check_status(404, "u/job/variant_001.mp4").unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
