use std::sync::Arc;

use anyhow::Result;
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use url::Url;

use crate::config::StorageConfig;

/// Build the object store holding delete-request files.
pub fn create_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    create_object_store_from_dsn(&config.dsn)
}

/// Build an object store from a DSN.
///
/// Supported schemes: `memory://`, `file:///path`, and
/// `s3://[access_key:secret_key@]host[:port]/bucket` (a non-AWS host is
/// treated as an S3-compatible endpoint).
pub fn create_object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    let url = Url::parse(dsn).map_err(|e| anyhow::anyhow!("invalid storage DSN '{dsn}': {e}"))?;

    match url.scheme() {
        "memory" => Ok(Arc::new(InMemory::new())),
        "file" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                return Err(anyhow::anyhow!(
                    "file DSN must carry a path: file:///path/to/files"
                ));
            }
            // file:///.data/raw is a relative path, file:///var/raw an absolute one
            let path = if path.starts_with("/.") { &path[1..] } else { path };
            Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
        }
        "s3" => {
            let bucket = url.path().trim_start_matches('/');
            if bucket.is_empty() {
                return Err(anyhow::anyhow!("s3 DSN must carry a bucket: s3://host/bucket"));
            }
            let host = url
                .host_str()
                .ok_or_else(|| anyhow::anyhow!("missing S3 host in DSN"))?;

            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

            if !url.username().is_empty() {
                builder = builder
                    .with_access_key_id(url.username())
                    .with_secret_access_key(url.password().unwrap_or(""));
            }

            if !host.contains("amazonaws.com") {
                // S3-compatible endpoint (MinIO and friends): path-style, http
                // unless the DSN pins port 443.
                let scheme = if url.port() == Some(443) { "https" } else { "http" };
                let endpoint = match url.port() {
                    Some(port) => format!("{scheme}://{host}:{port}"),
                    None => format!("{scheme}://{host}"),
                };
                builder = builder
                    .with_endpoint(endpoint)
                    .with_allow_http(true)
                    .with_virtual_hosted_style_request(false);
            }

            Ok(Arc::new(builder.build()?))
        }
        scheme => Err(anyhow::anyhow!(
            "unsupported storage scheme '{scheme}'; supported: memory, file, s3"
        )),
    }
}
