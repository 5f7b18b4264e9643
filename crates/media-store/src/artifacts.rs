//! Artifact persisters: turn a provider URL into a stable locator.

use async_trait::async_trait;
use media_types::{PersistContext, PersistError, ResultPersister};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Keeps the provider URL as the locator. Useful when artifacts are consumed straight from the
/// provider CDN.
#[derive(Debug, Clone, Default)]
pub struct PassthroughPersister;

impl PassthroughPersister {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResultPersister for PassthroughPersister {
    async fn persist(
        &self,
        _ctx: &PersistContext,
        remote_url: &str,
    ) -> Result<String, PersistError> {
        Ok(remote_url.to_string())
    }
}

/// Downloads artifacts into `{root}/{owner_id}/{job_id}/{index}.{ext}`.
pub struct LocalFilePersister {
    client: reqwest::Client,
    root: PathBuf,
}

impl LocalFilePersister {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            client: reqwest::Client::new(),
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn from_env() -> Self {
        let root = std::env::var("ARTIFACT_DIR").unwrap_or_else(|_| "./artifacts".to_string());
        Self::new(root)
    }

    fn target_path(&self, ctx: &PersistContext, remote_url: &str) -> PathBuf {
        self.root
            .join(sanitize(&ctx.owner_id))
            .join(sanitize(&ctx.job_id))
            .join(format!("{}.{}", ctx.index, extension_of(remote_url)))
    }
}

/// Extension from the last URL path segment, ignoring query and fragment. Defaults to `bin`.
fn extension_of(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "bin".to_string(),
    }
}

fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ResultPersister for LocalFilePersister {
    async fn persist(&self, ctx: &PersistContext, remote_url: &str) -> Result<String, PersistError> {
        let res = self
            .client
            .get(remote_url)
            .send()
            .await
            .map_err(|e| PersistError::Download(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            return Err(PersistError::Download(format!(
                "GET {} returned {}",
                remote_url, status
            )));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| PersistError::Download(e.to_string()))?;

        let path = self.target_path(ctx, remote_url);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut f = tokio::fs::File::create(&path).await?;
        f.write_all(&bytes).await?;
        f.flush().await?;
        tracing::debug!(
            job_id = %ctx.job_id,
            index = ctx.index,
            bytes = bytes.len(),
            path = %path.display(),
            "artifact persisted"
        );
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> PersistContext {
        PersistContext {
            job_id: "job-1".to_string(),
            owner_id: "owner/1".to_string(),
            index: 3,
        }
    }

    #[test]
    fn extension_is_taken_from_url_path() {
        assert_eq!(extension_of("https://cdn/x/out.PNG?sig=abc"), "png");
        assert_eq!(extension_of("https://cdn/x/clip.mp4#t=1"), "mp4");
        assert_eq!(extension_of("https://cdn/x/noext"), "bin");
        assert_eq!(extension_of("https://cdn/x/.hidden"), "bin");
    }

    #[tokio::test]
    async fn passthrough_keeps_remote_url() {
        let loc = PassthroughPersister::new()
            .persist(&ctx(), "https://cdn/a.png")
            .await
            .unwrap();
        assert_eq!(loc, "https://cdn/a.png");
    }

    #[tokio::test]
    async fn local_file_persister_writes_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/out.webp"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFFdata".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let persister = LocalFilePersister::new(dir.path());
        let url = format!("{}/files/out.webp", server.uri());
        let loc = persister.persist(&ctx(), &url).await.unwrap();

        let expected = dir.path().join("owner_1").join("job-1").join("3.webp");
        assert_eq!(PathBuf::from(&loc), expected);
        assert_eq!(std::fs::read(expected).unwrap(), b"RIFFdata");
    }

    #[tokio::test]
    async fn local_file_persister_reports_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = LocalFilePersister::new(dir.path())
            .persist(&ctx(), &format!("{}/gone.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Download(_)));
    }
}
