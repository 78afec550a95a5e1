//! Remote archive fetching.
//!
//! Given `(owner, repo, ref)` the fetcher resolves the ref to a commit
//! SHA via the hosting provider's commits endpoint, downloads the source
//! tarball, and extracts it into a staging directory next to the final
//! target so the installer can rename it into place atomically. Only two
//! provider endpoints are used: ref resolution and the tarball stream.
//!
//! Authentication ladder: requests start unauthenticated; a 401 or 404
//! triggers one bearer-token retry using `APM_GITHUB_TOKEN` then
//! `GITHUB_TOKEN`. Transient transport failures are retried up to three
//! times with exponential backoff starting at 500 ms; a corrupt archive
//! is re-downloaded once.

use flate2::read::GzDecoder;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tar::Archive;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info};

use crate::constants::{
    API_URL_VAR, CONNECT_TIMEOUT_SECS, DEFAULT_API_URL, FETCH_TIMEOUT_SECS, HOSTING_TOKEN_VAR,
    MANIFEST_FILENAME, NETWORK_RETRIES, PACKAGE_TOKEN_VAR, RETRY_BASE_DELAY_MS,
};
use crate::core::ApmError;

/// Ref-resolution payload: the only fields read from the provider.
#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: String,
}

/// An extracted archive in a staging directory.
///
/// The provider's top-level prefix directory has already been stripped:
/// [`FetchedArchive::root`] is the repository content itself. Dropping
/// the value removes the staging directory and anything still in it, so
/// partial downloads never survive an interrupted install.
#[derive(Debug)]
pub struct FetchedArchive {
    /// Commit SHA the requested ref resolved to.
    pub resolved_sha: String,
    /// Directory holding the extracted repository contents.
    pub root: PathBuf,
    staging: tempfile::TempDir,
}

impl FetchedArchive {
    /// Atomically move the extracted contents to `target`.
    ///
    /// The staging directory lives on the same filesystem as the target,
    /// so the rename is atomic. An existing target is replaced.
    pub fn install_to(self, target: &Path) -> Result<(), ApmError> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if target.exists() {
            std::fs::remove_dir_all(target)?;
        }
        std::fs::rename(&self.root, target)?;
        drop(self.staging);
        Ok(())
    }
}

/// HTTP fetcher for the hosting provider.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    staging_parent: PathBuf,
}

impl ArchiveFetcher {
    /// Build a fetcher staging extractions under `staging_parent`.
    ///
    /// The parent must be on the same filesystem as the final install
    /// targets for renames to stay atomic. Tokens are read from the
    /// environment: the dedicated package token first, the general
    /// hosting token as fallback.
    pub fn new(staging_parent: &Path) -> Result<Self, ApmError> {
        let token = std::env::var(PACKAGE_TOKEN_VAR)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(HOSTING_TOKEN_VAR).ok().filter(|t| !t.is_empty()));
        let api_url = std::env::var(API_URL_VAR)
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self::with_config(staging_parent, api_url, token)
    }

    /// Build a fetcher with explicit API URL and token (used by tests).
    pub fn with_config(
        staging_parent: &Path,
        api_url: String,
        token: Option<String>,
    ) -> Result<Self, ApmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("apm-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApmError::NetworkError {
                operation: "client setup".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            staging_parent: staging_parent.to_path_buf(),
        })
    }

    /// Resolve a ref (branch, tag, or commit) to a commit SHA.
    ///
    /// A `None` ref resolves `HEAD`, which the provider maps to the head
    /// of the default branch.
    pub async fn resolve_ref(
        &self,
        owner: &str,
        repo: &str,
        reference: Option<&str>,
    ) -> Result<String, ApmError> {
        let reference = reference.unwrap_or("HEAD");
        let url = format!("{}/repos/{owner}/{repo}/commits/{reference}", self.api_url);
        let package = format!("{owner}/{repo}");

        let response = self.get_with_auth_ladder(&url, &package, reference).await?;
        let info: CommitInfo =
            response.json().await.map_err(|e| ApmError::NetworkError {
                operation: format!("ref resolution for {package}"),
                reason: e.to_string(),
            })?;
        debug!("Resolved {package}#{reference} to {}", info.sha);
        Ok(info.sha)
    }

    /// Fetch and extract the archive for `(owner, repo, ref)`.
    ///
    /// Resolves the ref, downloads the tarball at the resolved SHA, and
    /// extracts it with the top-level prefix stripped. A corrupt archive
    /// is re-downloaded once before surfacing [`ApmError::ArchiveCorrupt`].
    pub async fn fetch(
        &self,
        owner: &str,
        repo: &str,
        reference: Option<&str>,
    ) -> Result<FetchedArchive, ApmError> {
        let package = format!("{owner}/{repo}");
        let sha = self.resolve_ref(owner, repo, reference).await?;

        let mut last_err = None;
        for attempt in 0..2 {
            let bytes = self.download_tarball(owner, repo, &sha).await?;
            match self.extract(&bytes, &package, &sha) {
                Ok(archive) => {
                    info!("Fetched {package}@{sha}");
                    return Ok(archive);
                }
                Err(e @ ApmError::ArchiveCorrupt { .. }) if attempt == 0 => {
                    debug!("Archive for {package} corrupt, retrying once: {e}");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.expect("loop exits via return or records an error"))
    }

    async fn download_tarball(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<u8>, ApmError> {
        let url = format!("{}/repos/{owner}/{repo}/tarball/{sha}", self.api_url);
        let package = format!("{owner}/{repo}");

        let response = self.get_with_auth_ladder(&url, &package, sha).await?;
        let bytes = response.bytes().await.map_err(|e| ApmError::NetworkError {
            operation: format!("tarball download for {package}"),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    /// One GET with the unauthenticated-then-authenticated ladder and
    /// transient-failure retry.
    async fn get_with_auth_ladder(
        &self,
        url: &str,
        package: &str,
        reference: &str,
    ) -> Result<reqwest::Response, ApmError> {
        let response = self.get_retried(url, None).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::NOT_FOUND {
            let Some(token) = self.token.as_deref() else {
                return Err(ApmError::AuthRequired {
                    resource: package.to_string(),
                });
            };
            let authed = self.get_retried(url, Some(token)).await?;
            let status = authed.status();
            if status.is_success() {
                return Ok(authed);
            }
            return Err(match status {
                reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                    ApmError::AuthRequired {
                        resource: package.to_string(),
                    }
                }
                _ => ApmError::RefNotFound {
                    package: package.to_string(),
                    reference: reference.to_string(),
                },
            });
        }

        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(ApmError::RefNotFound {
                package: package.to_string(),
                reference: reference.to_string(),
            });
        }

        Err(ApmError::NetworkError {
            operation: format!("GET {url}"),
            reason: format!("HTTP {status}"),
        })
    }

    /// Issue one GET, retrying transport failures with backoff.
    async fn get_retried(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApmError> {
        // Delays of 500 ms, 1 s, 2 s: the base is exponentiated per
        // attempt and scaled by the factor.
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(RETRY_BASE_DELAY_MS / 2)
            .take(NETWORK_RETRIES);

        RetryIf::spawn(
            strategy,
            move || async move {
                let mut request = self
                    .client
                    .get(url)
                    .header(reqwest::header::ACCEPT, "application/vnd.github+json");
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }
                request.send().await.map_err(|e| ApmError::NetworkError {
                    operation: format!("GET {url}"),
                    reason: e.to_string(),
                })
            },
            |e: &ApmError| matches!(e, ApmError::NetworkError { .. }),
        )
        .await
    }

    /// Extract a gzip tarball into a fresh staging directory, strip the
    /// provider's top-level prefix, and verify the package shape.
    fn extract(
        &self,
        bytes: &[u8],
        package: &str,
        sha: &str,
    ) -> Result<FetchedArchive, ApmError> {
        if bytes.is_empty() {
            return Err(ApmError::ArchiveCorrupt {
                package: package.to_string(),
                reason: "empty archive".to_string(),
            });
        }

        std::fs::create_dir_all(&self.staging_parent)?;
        let staging = tempfile::tempdir_in(&self.staging_parent).map_err(ApmError::IoError)?;

        let decoder = GzDecoder::new(bytes);
        let mut archive = Archive::new(decoder);
        archive.unpack(staging.path()).map_err(|e| ApmError::ArchiveCorrupt {
            package: package.to_string(),
            reason: e.to_string(),
        })?;

        // Provider tarballs wrap contents in a single `owner-repo-sha/`
        // prefix directory; its children become the package root.
        let mut entries: Vec<PathBuf> = std::fs::read_dir(staging.path())?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .collect();
        entries.sort();
        let root = match entries.as_slice() {
            [single] if single.is_dir() => single.clone(),
            _ => {
                return Err(ApmError::ArchiveCorrupt {
                    package: package.to_string(),
                    reason: "expected a single top-level directory".to_string(),
                });
            }
        };

        if !root.join(MANIFEST_FILENAME).is_file() {
            return Err(ApmError::NotAnApmPackage {
                path: format!("{package}@{sha}"),
                reason: format!("archive contains no {MANIFEST_FILENAME}"),
            });
        }

        Ok(FetchedArchive {
            resolved_sha: sha.to_string(),
            root,
            staging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;

    /// Build a gzip tarball with a provider-style prefix directory.
    fn make_tarball(prefix: &str, files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in files {
            let path = format!("{prefix}/{name}");
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn fetcher(staging: &Path) -> ArchiveFetcher {
        ArchiveFetcher::with_config(staging, "http://127.0.0.1:1".to_string(), None).unwrap()
    }

    #[test]
    fn test_extract_strips_prefix_and_validates() {
        let dir = tempdir().unwrap();
        let f = fetcher(dir.path());
        let bytes = make_tarball(
            "acme-ctx-abc123",
            &[
                ("apm.yml", "name: ctx\nversion: 1.0.0\n"),
                ("hello.prompt.md", "Hi.\n"),
            ],
        );

        let archive = f.extract(&bytes, "acme/ctx", "abc123").unwrap();
        assert_eq!(archive.resolved_sha, "abc123");
        assert!(archive.root.join("apm.yml").is_file());
        assert!(archive.root.join("hello.prompt.md").is_file());
    }

    #[test]
    fn test_extract_rejects_missing_manifest() {
        let dir = tempdir().unwrap();
        let f = fetcher(dir.path());
        let bytes = make_tarball("acme-ctx-abc123", &[("README.md", "hi\n")]);

        let err = f.extract(&bytes, "acme/ctx", "abc123").unwrap_err();
        assert!(matches!(err, ApmError::NotAnApmPackage { .. }));
    }

    #[test]
    fn test_extract_rejects_empty_archive() {
        let dir = tempdir().unwrap();
        let f = fetcher(dir.path());
        let err = f.extract(&[], "acme/ctx", "abc123").unwrap_err();
        assert!(matches!(err, ApmError::ArchiveCorrupt { .. }));
    }

    #[test]
    fn test_extract_rejects_garbage_bytes() {
        let dir = tempdir().unwrap();
        let f = fetcher(dir.path());
        let err = f.extract(b"not a tarball at all", "acme/ctx", "abc").unwrap_err();
        assert!(matches!(err, ApmError::ArchiveCorrupt { .. }));
    }

    #[test]
    fn test_install_to_moves_contents() {
        let dir = tempdir().unwrap();
        let staging_parent = dir.path().join("staging");
        std::fs::create_dir_all(&staging_parent).unwrap();
        let f = fetcher(&staging_parent);
        let bytes =
            make_tarball("acme-ctx-abc", &[("apm.yml", "name: ctx\nversion: 1.0.0\n")]);
        let archive = f.extract(&bytes, "acme/ctx", "abc").unwrap();

        let target = dir.path().join("staging").join("acme").join("ctx");
        archive.install_to(&target).unwrap();
        assert!(target.join("apm.yml").is_file());
    }

    #[test]
    fn test_install_to_replaces_existing() {
        let dir = tempdir().unwrap();
        let f = fetcher(dir.path());
        let target = dir.path().join("acme/ctx");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("stale.txt"), "old").unwrap();

        let bytes =
            make_tarball("acme-ctx-def", &[("apm.yml", "name: ctx\nversion: 2.0.0\n")]);
        let archive = f.extract(&bytes, "acme/ctx", "def").unwrap();
        archive.install_to(&target).unwrap();

        assert!(target.join("apm.yml").is_file());
        assert!(!target.join("stale.txt").exists());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let dir = tempdir().unwrap();
        let f = fetcher(dir.path());
        let err = f.resolve_ref("acme", "ctx", Some("v1")).await.unwrap_err();
        assert!(matches!(err, ApmError::NetworkError { .. }));
    }
}
