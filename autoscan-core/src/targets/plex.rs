use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::Target;
use crate::rewrite::{Rewrite, Rewriter};
use crate::{Error, Result, ScanRequest, Verbosity};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PlexConfig {
    pub url: String,
    pub token: String,
    #[serde(default)]
    pub rewrite: Vec<Rewrite>,
    #[serde(default)]
    pub verbosity: Verbosity,
}

pub struct PlexTarget {
    url: String,
    client: Client,
    libraries: Vec<PlexLibrary>,
    rewriter: Rewriter,
    verbosity: Verbosity,
}

/// One library section location; sections with multiple locations expand to
/// one entry per path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlexLibrary {
    key: String,
    name: String,
    path: String,
}

impl PlexTarget {
    /// Connects, verifies the server version and caches the library map.
    ///
    /// An unsupported server version is a startup failure (or a permanent
    /// stall when hit at runtime): partial-scan support arrived in 1.20.
    pub async fn new(config: PlexConfig) -> Result<Self> {
        let url = config.url.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let token = HeaderValue::from_str(&config.token)
            .map_err(|_| Error::Fatal("plex token is not a valid header value".to_string()))?;
        headers.insert("X-Plex-Token", token);

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|err| Error::Fatal(format!("failed building plex client: {err}")))?;

        let mut target = Self {
            url,
            client,
            libraries: Vec::new(),
            rewriter: Rewriter::new(config.rewrite),
            verbosity: config.verbosity,
        };

        let version = target.version().await?;
        debug!(target = "plex", url = %target.url, %version, "Connected to server");

        if !is_supported_version(&version) {
            return Err(Error::Fatal(format!(
                "plex running unsupported version {version}"
            )));
        }

        target.libraries = target.fetch_libraries().await?;
        info!(
            target = "plex",
            url = %target.url,
            libraries = target.libraries.len(),
            "Initialised target"
        );

        Ok(target)
    }

    async fn version(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/", self.url))
            .send()
            .await?
            .error_for_status()?;

        let identity: MediaContainerResponse<IdentityContainer> = response.json().await?;
        Ok(identity.media_container.version)
    }

    async fn fetch_libraries(&self) -> Result<Vec<PlexLibrary>> {
        let response = self
            .client
            .get(format!("{}/library/sections", self.url))
            .send()
            .await?
            .error_for_status()?;

        let sections: MediaContainerResponse<SectionsContainer> = response.json().await?;
        Ok(flatten_sections(sections.media_container))
    }

    fn matching_libraries(&self, folder: &str) -> Vec<&PlexLibrary> {
        self.libraries
            .iter()
            .filter(|library| folder.starts_with(&library.path))
            .collect()
    }
}

#[async_trait]
impl Target for PlexTarget {
    async fn available(&self) -> Result<()> {
        let version = self.version().await?;

        // A server downgrade mid-flight halts dispatch for good.
        if !is_supported_version(&version) {
            return Err(Error::Fatal(format!(
                "plex running unsupported version {version}"
            )));
        }

        Ok(())
    }

    async fn scan(&self, request: &ScanRequest) -> Result<()> {
        let folder = self.rewriter.rewrite(&request.folder);

        let libraries = self.matching_libraries(&folder);
        if libraries.is_empty() {
            warn!(target = "plex", folder = %folder, "No target libraries found");
            return Ok(());
        }

        for library in libraries {
            if self.verbosity >= Verbosity::Debug {
                debug!(
                    target = "plex",
                    folder = %folder,
                    library = %library.name,
                    "Sending scan request"
                );
            }

            self.client
                .get(format!(
                    "{}/library/sections/{}/refresh",
                    self.url, library.key
                ))
                .query(&[("path", folder.as_str())])
                .send()
                .await?
                .error_for_status()?;

            info!(
                target = "plex",
                folder = %folder,
                library = %library.name,
                "Scan moved to target"
            );
        }

        Ok(())
    }
}

fn is_supported_version(version: &str) -> bool {
    let mut parts = version.split('.');
    let major: u32 = match parts.next().and_then(|part| part.parse().ok()) {
        Some(major) => major,
        None => return false,
    };
    let minor: u32 = match parts.next().and_then(|part| part.parse().ok()) {
        Some(minor) => minor,
        None => return false,
    };

    major >= 2 || (major == 1 && minor >= 20)
}

fn flatten_sections(container: SectionsContainer) -> Vec<PlexLibrary> {
    let mut libraries = Vec::new();

    for section in container.directory {
        for location in section.location {
            libraries.push(PlexLibrary {
                key: section.key.clone(),
                name: section.title.clone(),
                path: location.path,
            });
        }
    }

    libraries
}

#[derive(Debug, Deserialize)]
struct MediaContainerResponse<T> {
    #[serde(rename = "MediaContainer")]
    media_container: T,
}

#[derive(Debug, Deserialize)]
struct IdentityContainer {
    version: String,
}

#[derive(Debug, Deserialize)]
struct SectionsContainer {
    #[serde(rename = "Directory", default)]
    directory: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    key: String,
    title: String,
    #[serde(rename = "Location", default)]
    location: Vec<SectionLocation>,
}

#[derive(Debug, Deserialize)]
struct SectionLocation {
    path: String,
}
