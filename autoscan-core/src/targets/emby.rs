use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::Target;
use crate::rewrite::{Rewrite, Rewriter};
use crate::{Error, Result, ScanRequest, Verbosity};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct EmbyConfig {
    pub url: String,
    pub token: String,
    #[serde(default)]
    pub rewrite: Vec<Rewrite>,
    #[serde(default)]
    pub verbosity: Verbosity,
}

pub struct EmbyTarget {
    url: String,
    client: Client,
    libraries: Vec<EmbyLibrary>,
    rewriter: Rewriter,
    verbosity: Verbosity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EmbyLibrary {
    name: String,
    path: String,
}

impl EmbyTarget {
    /// Connects and caches the library map. Emby accepts folder updates for
    /// any version this daemon targets, so the version is only logged.
    pub async fn new(config: EmbyConfig) -> Result<Self> {
        let url = config.url.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let token = HeaderValue::from_str(&config.token)
            .map_err(|_| Error::Fatal("emby token is not a valid header value".to_string()))?;
        headers.insert("X-Emby-Token", token);

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|err| Error::Fatal(format!("failed building emby client: {err}")))?;

        let mut target = Self {
            url,
            client,
            libraries: Vec::new(),
            rewriter: Rewriter::new(config.rewrite),
            verbosity: config.verbosity,
        };

        let version = target.system_version().await?;
        debug!(target = "emby", url = %target.url, %version, "Connected to server");

        target.libraries = target.fetch_libraries().await?;
        info!(
            target = "emby",
            url = %target.url,
            libraries = target.libraries.len(),
            "Initialised target"
        );

        Ok(target)
    }

    async fn system_version(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/System/Info", self.url))
            .send()
            .await?
            .error_for_status()?;

        let info: SystemInfo = response.json().await?;
        Ok(info.version)
    }

    async fn fetch_libraries(&self) -> Result<Vec<EmbyLibrary>> {
        let response = self
            .client
            .get(format!("{}/Library/SelectableMediaFolders", self.url))
            .send()
            .await?
            .error_for_status()?;

        let folders: Vec<MediaFolder> = response.json().await?;
        Ok(flatten_folders(folders))
    }

    fn matching_libraries(&self, folder: &str) -> Vec<&EmbyLibrary> {
        self.libraries
            .iter()
            .filter(|library| folder.starts_with(&library.path))
            .collect()
    }
}

#[async_trait]
impl Target for EmbyTarget {
    async fn available(&self) -> Result<()> {
        self.system_version().await.map(|_| ())
    }

    async fn scan(&self, request: &ScanRequest) -> Result<()> {
        let folder = self.rewriter.rewrite(&request.folder);

        let libraries = self.matching_libraries(&folder);
        if libraries.is_empty() {
            warn!(target = "emby", folder = %folder, "No target libraries found");
            return Ok(());
        }

        let names: Vec<&str> = libraries.iter().map(|l| l.name.as_str()).collect();
        if self.verbosity >= Verbosity::Debug {
            debug!(
                target = "emby",
                folder = %folder,
                libraries = ?names,
                "Sending scan request"
            );
        }

        let update = MediaUpdateRequest {
            updates: vec![MediaUpdate {
                path: folder.clone(),
                update_type: "Created".to_string(),
            }],
        };

        self.client
            .post(format!("{}/Library/Media/Updated", self.url))
            .json(&update)
            .send()
            .await?
            .error_for_status()?;

        info!(target = "emby", folder = %folder, "Scan moved to target");
        Ok(())
    }
}

fn flatten_folders(folders: Vec<MediaFolder>) -> Vec<EmbyLibrary> {
    let mut libraries = Vec::new();

    for folder in folders {
        for sub_folder in folder.sub_folders {
            libraries.push(EmbyLibrary {
                name: folder.name.clone(),
                path: sub_folder.path,
            });
        }
    }

    libraries
}

#[derive(Debug, Deserialize)]
struct SystemInfo {
    #[serde(rename = "Version")]
    version: String,
}

#[derive(Debug, Deserialize)]
struct MediaFolder {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "SubFolders", default)]
    sub_folders: Vec<SubFolder>,
}

#[derive(Debug, Deserialize)]
struct SubFolder {
    #[serde(rename = "Path")]
    path: String,
}

#[derive(Debug, Serialize)]
struct MediaUpdateRequest {
    #[serde(rename = "Updates")]
    updates: Vec<MediaUpdate>,
}

#[derive(Debug, Serialize)]
struct MediaUpdate {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "UpdateType")]
    update_type: String,
}
