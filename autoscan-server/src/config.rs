//! YAML configuration. Decoding is strict: unknown keys anywhere in the file
//! reject startup rather than being silently ignored.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use autoscan_core::targets::{EmbyConfig, PlexConfig};
use autoscan_core::triggers::inotify::InotifyConfig;
use autoscan_core::triggers::lidarr::LidarrConfig;
use autoscan_core::triggers::manual::ManualConfig;
use autoscan_core::triggers::radarr::RadarrConfig;
use autoscan_core::triggers::sonarr::SonarrConfig;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// A folder is dispatched only once every row is at least this old.
    #[serde(
        default = "default_minimum_age",
        deserialize_with = "duration::deserialize"
    )]
    pub minimum_age: Duration,

    /// Idle time after a successful dispatch, to spread load on targets.
    #[serde(
        default = "default_scan_delay",
        deserialize_with = "duration::deserialize"
    )]
    pub scan_delay: Duration,

    /// Sentinel files that must exist before any dispatch pass runs.
    #[serde(default)]
    pub anchors: Vec<PathBuf>,

    #[serde(default)]
    pub authentication: Option<AuthConfig>,

    #[serde(default)]
    pub triggers: TriggerSet,

    #[serde(default)]
    pub targets: TargetSet,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed reading config {}", path.display()))?;

        serde_yaml::from_str(&contents)
            .with_context(|| format!("failed decoding config {}", path.display()))
    }

    /// Basic auth applies only when both credentials are set.
    pub fn auth(&self) -> Option<&AuthConfig> {
        self.authentication
            .as_ref()
            .filter(|auth| !auth.username.is_empty() && !auth.password.is_empty())
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth().is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TriggerSet {
    #[serde(default)]
    pub manual: Option<ManualConfig>,
    #[serde(default)]
    pub radarr: Vec<RadarrConfig>,
    #[serde(default)]
    pub sonarr: Vec<SonarrConfig>,
    #[serde(default)]
    pub lidarr: Vec<LidarrConfig>,
    #[serde(default)]
    pub inotify: Vec<InotifyConfig>,
}

impl TriggerSet {
    /// Webhook triggers are the ones an unauthenticated network peer could
    /// abuse; used for the startup warning.
    pub fn webhook_count(&self) -> usize {
        self.radarr.len() + self.sonarr.len() + self.lidarr.len()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TargetSet {
    #[serde(default)]
    pub plex: Vec<PlexConfig>,
    #[serde(default)]
    pub emby: Vec<EmbyConfig>,
}

impl TargetSet {
    pub fn len(&self) -> usize {
        self.plex.len() + self.emby.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn default_port() -> u16 {
    3030
}

fn default_minimum_age() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_scan_delay() -> Duration {
    Duration::from_secs(5)
}

mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> serde_yaml::Result<Config> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn empty_config_takes_defaults() {
        let config = parse("{}").unwrap();

        assert_eq!(config.port, 3030);
        assert_eq!(config.minimum_age, Duration::from_secs(600));
        assert_eq!(config.scan_delay, Duration::from_secs(5));
        assert!(config.anchors.is_empty());
        assert!(!config.auth_enabled());
        assert_eq!(config.triggers.webhook_count(), 0);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn full_config_round_trips() {
        let config = parse(
            r#"
            port: 8080
            minimum-age: 2m 30s
            scan-delay: 1s
            anchors:
              - /mnt/unionfs/mounted
            authentication:
              username: user
              password: pass
            triggers:
              manual:
                priority: 5
              radarr:
                - name: radarr-movies
                  priority: 2
                  rewrite:
                    - from: /downloads
                      to: /media
              inotify:
                - priority: 0
                  paths:
                    - path: /mnt/unionfs/Media
                  exclude:
                    - "**/*.partial~"
            targets:
              plex:
                - url: https://plex.domain.tld
                  token: plex-token
              emby:
                - url: https://emby.domain.tld
                  token: emby-token
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.minimum_age, Duration::from_secs(150));
        assert!(config.auth_enabled());
        assert_eq!(config.triggers.radarr.len(), 1);
        assert_eq!(config.triggers.radarr[0].name, "radarr-movies");
        assert_eq!(config.triggers.inotify.len(), 1);
        assert_eq!(config.triggers.webhook_count(), 1);
        assert_eq!(config.targets.len(), 2);
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        assert!(parse("bogus: true").is_err());
    }

    #[test]
    fn unknown_nested_keys_are_rejected() {
        let yaml = r#"
            targets:
              plex:
                - url: https://plex.domain.tld
                  token: t
                  libraries: [Movies]
            "#;

        assert!(parse(yaml).is_err());
    }

    #[test]
    fn malformed_durations_are_rejected() {
        assert!(parse("minimum-age: soon").is_err());
    }

    #[test]
    fn auth_with_empty_password_counts_as_disabled() {
        let config = parse("authentication: { username: user }").unwrap();
        assert!(!config.auth_enabled());
    }
}
