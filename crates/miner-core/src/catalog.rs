//! Module availability per release and platform.
//!
//! The planner only ever asks one question: "does `platform` publish a module
//! of `kind` for this release, and where?". [`Catalog`] is that question;
//! [`TargetCatalog`] answers it from the manifests stored on the target, and
//! [`CatalogLoader`] fetches those manifests over HTTP.

use async_trait::async_trait;
use miner_schema::{BuildTarget, ComponentKind, EditorVersion, ModuleManifest, Platform};
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::releases::Release;

/// Releases before this one have no per-platform catalog documents.
const FIRST_MODULAR: (u32, u32) = (5, 3);

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("HTTP error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },
}

/// Lookup of downloadable modules for a target.
pub trait Catalog: Send + Sync {
    /// Download URL of the `kind` module published by `platform`, if any.
    ///
    /// Never returns a URL for a platform's own support bundle.
    fn module_url(
        &self,
        target: &BuildTarget,
        platform: Platform,
        kind: ComponentKind,
    ) -> Option<String>;

    /// Whether `platform` has any catalog data for this target.
    ///
    /// Wildcard requirements fan out only over platforms with data.
    fn has_data(&self, target: &BuildTarget, platform: Platform) -> bool;
}

impl<T: Catalog + ?Sized> Catalog for std::sync::Arc<T> {
    fn module_url(
        &self,
        target: &BuildTarget,
        platform: Platform,
        kind: ComponentKind,
    ) -> Option<String> {
        (**self).module_url(target, platform, kind)
    }

    fn has_data(&self, target: &BuildTarget, platform: Platform) -> bool {
        (**self).has_data(target, platform)
    }
}

/// Catalog backed by the manifests attached to each [`BuildTarget`].
///
/// Monolithic targets are a fixed special case: the only module is the
/// Windows editor, at the legacy installer URL.
#[derive(Debug, Clone)]
pub struct TargetCatalog {
    base_url: String,
}

impl TargetCatalog {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Catalog for TargetCatalog {
    fn module_url(
        &self,
        target: &BuildTarget,
        platform: Platform,
        kind: ComponentKind,
    ) -> Option<String> {
        if !kind.is_published_by(platform) {
            return None;
        }

        if target.monolithic {
            return (kind == ComponentKind::Editor && platform == Platform::Windows).then(|| {
                legacy_editor_url(&self.base_url, &target.version, target.id.as_deref())
            });
        }

        target
            .manifest(platform)
            .and_then(|m| m.url(kind))
            .map(str::to_string)
    }

    fn has_data(&self, target: &BuildTarget, platform: Platform) -> bool {
        if target.monolithic {
            platform == Platform::Windows
        } else {
            target.has_catalog(platform)
        }
    }
}

/// Download URL of the omnibus Windows installer for pre-modular releases.
pub fn legacy_editor_url(base_url: &str, version: &EditorVersion, id: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    if version.major < 5 {
        return format!("{base}/UnitySetup-{version}.exe");
    }
    match id {
        Some(id) => {
            format!("{base}/{id}/Windows64EditorInstaller/UnitySetup64-{version}.exe")
        }
        None => format!("{base}/Windows64EditorInstaller/UnitySetup64-{version}.exe"),
    }
}

/// Turns a release identity into a fully populated [`BuildTarget`].
#[async_trait]
pub trait TargetSource: Send + Sync {
    async fn load(&self, release: &Release) -> Result<BuildTarget, CatalogError>;
}

/// Fetches the per-platform catalog documents of a release.
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    client: Client,
    base_url: String,
}

impl CatalogLoader {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn release_base(&self, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{id}", self.base_url),
            None => self.base_url.clone(),
        }
    }

    /// Fetch one platform's document. `Ok(None)` when the platform has none.
    async fn fetch_manifest(
        &self,
        release: &Release,
        platform: Platform,
    ) -> Result<Option<ModuleManifest>, CatalogError> {
        let Some(suffix) = platform.catalog_suffix() else {
            return Ok(None);
        };
        let base = self.release_base(release.id.as_deref());
        let url = format!("{base}/unity-{}-{suffix}.ini", release.version);

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await
            .map_err(|source| CatalogError::Http {
                url: url.clone(),
                source,
            })?;

        if resp.status() == StatusCode::NOT_FOUND {
            tracing::debug!(%url, "no catalog document");
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(CatalogError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|source| CatalogError::Http {
                url: url.clone(),
                source,
            })?;
        Ok(Some(ModuleManifest::parse(&text, &base)))
    }
}

#[async_trait]
impl TargetSource for CatalogLoader {
    async fn load(&self, release: &Release) -> Result<BuildTarget, CatalogError> {
        let mut manifests = Vec::new();
        for platform in Platform::CONCRETE {
            if let Some(manifest) = self.fetch_manifest(release, platform).await? {
                manifests.push((platform, manifest));
            }
        }

        let has_any = manifests.iter().any(|(_, m)| !m.is_empty());
        if !has_any && release.version.before(FIRST_MODULAR.0, FIRST_MODULAR.1) {
            tracing::debug!(version = %release.version, "treating release as monolithic");
            return Ok(BuildTarget::monolithic(
                release.version.clone(),
                release.id.clone(),
            ));
        }

        Ok(BuildTarget::modular(
            release.version.clone(),
            release.id.clone(),
            manifests,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(s: &str) -> EditorVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_legacy_urls() {
        assert_eq!(
            legacy_editor_url("https://cdn.example.com/", &version("4.7.2f1"), None),
            "https://cdn.example.com/UnitySetup-4.7.2f1.exe"
        );
        assert_eq!(
            legacy_editor_url("https://cdn.example.com", &version("5.2.4f1"), Some("abc")),
            "https://cdn.example.com/abc/Windows64EditorInstaller/UnitySetup64-5.2.4f1.exe"
        );
    }

    #[test]
    fn test_monolithic_only_serves_windows_editor() {
        let catalog = TargetCatalog::new("https://cdn.example.com");
        let target = BuildTarget::monolithic(version("5.1.0f3"), None);

        assert!(
            catalog
                .module_url(&target, Platform::Windows, ComponentKind::Editor)
                .is_some()
        );
        assert!(
            catalog
                .module_url(&target, Platform::Linux, ComponentKind::Editor)
                .is_none()
        );
        assert!(
            catalog
                .module_url(&target, Platform::Windows, ComponentKind::Android)
                .is_none()
        );
        assert!(catalog.has_data(&target, Platform::Windows));
        assert!(!catalog.has_data(&target, Platform::MacOS));
    }

    #[test]
    fn test_self_support_never_resolved_from_own_document() {
        let catalog = TargetCatalog::new("https://cdn.example.com");
        let target = BuildTarget::modular(
            version("2019.4.0f1"),
            None,
            [(
                Platform::Windows,
                ModuleManifest::from_entries([
                    (ComponentKind::Editor, "https://x/editor.exe".to_string()),
                    (ComponentKind::WindowsSupport, "https://x/win.exe".to_string()),
                ]),
            )],
        );

        assert_eq!(
            catalog.module_url(&target, Platform::Windows, ComponentKind::WindowsSupport),
            None
        );
        assert_eq!(
            catalog
                .module_url(&target, Platform::Windows, ComponentKind::Editor)
                .as_deref(),
            Some("https://x/editor.exe")
        );
    }

    #[tokio::test]
    async fn test_loader_reads_available_documents() {
        let mut server = mockito::Server::new_async().await;
        let linux = server
            .mock("GET", "/abc/unity-2019.4.0f1-linux.ini")
            .with_status(200)
            .with_body("[Unity]\nurl=LinuxEditorInstaller/Unity.tar.xz\n")
            .create_async()
            .await;
        let win = server
            .mock("GET", "/abc/unity-2019.4.0f1-win.ini")
            .with_status(404)
            .create_async()
            .await;
        let mac = server
            .mock("GET", "/abc/unity-2019.4.0f1-osx.ini")
            .with_status(404)
            .create_async()
            .await;

        let loader = CatalogLoader::new(Client::new(), server.url());
        let release = Release {
            version: version("2019.4.0f1"),
            id: Some("abc".into()),
        };
        let target = loader.load(&release).await.unwrap();

        linux.assert_async().await;
        win.assert_async().await;
        mac.assert_async().await;
        assert!(!target.monolithic);
        assert!(target.has_catalog(Platform::Linux));
        assert!(!target.has_catalog(Platform::Windows));
        assert_eq!(
            target
                .manifest(Platform::Linux)
                .and_then(|m| m.url(ComponentKind::Editor)),
            Some(format!("{}/abc/LinuxEditorInstaller/Unity.tar.xz", server.url()).as_str())
        );
    }

    #[tokio::test]
    async fn test_loader_falls_back_to_monolithic_for_old_releases() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .expect(3)
            .create_async()
            .await;

        let loader = CatalogLoader::new(Client::new(), server.url());
        let release = Release {
            version: version("5.2.4f1"),
            id: None,
        };
        let target = loader.load(&release).await.unwrap();
        assert!(target.monolithic);
    }

    #[tokio::test]
    async fn test_loader_reports_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let _broken = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let loader = CatalogLoader::new(Client::new(), server.url());
        let release = Release {
            version: version("2020.1.0f1"),
            id: None,
        };
        let err = loader.load(&release).await.unwrap_err();
        assert!(matches!(err, CatalogError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_loader_treats_forbidden_as_error() {
        let mut server = mockito::Server::new_async().await;
        let _forbidden = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let loader = CatalogLoader::new(Client::new(), server.url());
        let release = Release {
            version: version("2019.4.0f1"),
            id: Some("abc".into()),
        };
        let err = loader.load(&release).await.unwrap_err();
        assert!(matches!(err, CatalogError::Status { status: 403, .. }));
    }
}
