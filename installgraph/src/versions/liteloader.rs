//! LiteLoader versions from the official `versions.json`.
//!
//! The manifest is keyed by game version; each entry lists release
//! artefacts and snapshots:
//!
//! ```text
//! versions
//! └── "1.12.2"
//!     ├── artefacts.com.mumfrey:liteloader.{latest, <build>...}
//!     └── snapshots.com.mumfrey:liteloader.{latest, <build>...}
//! ```
//!
//! `latest` duplicates one of the builds and is skipped. Builds publish MD5
//! only, so they are downloaded without a checksum.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::error::VersionListError;
use super::list::VersionSource;
use super::types::{LoaderKind, RemoteVersion};

pub const LITELOADER_MANIFEST: &str = "http://dl.liteloader.com/versions/versions.json";
const LITELOADER_DOWNLOADS: &str = "http://dl.liteloader.com/versions";
const ARTEFACT_KEY: &str = "com.mumfrey:liteloader";

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    versions: BTreeMap<String, GameEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct GameEntry {
    #[serde(default)]
    artefacts: BTreeMap<String, BTreeMap<String, Build>>,
    #[serde(default)]
    snapshots: BTreeMap<String, BTreeMap<String, Build>>,
}

#[derive(Debug, Deserialize)]
struct Build {
    version: String,
    file: String,
    #[serde(default)]
    timestamp: Option<String>,
}

/// LiteLoader builds for every game version, from one manifest.
#[derive(Clone, Debug)]
pub struct LiteLoaderSource {
    manifest: String,
}

impl LiteLoaderSource {
    pub fn new() -> Self {
        Self::with_manifest(LITELOADER_MANIFEST)
    }

    pub fn with_manifest(manifest: impl Into<String>) -> Self {
        Self {
            manifest: manifest.into(),
        }
    }
}

impl Default for LiteLoaderSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionSource for LiteLoaderSource {
    fn loader(&self) -> LoaderKind {
        LoaderKind::LiteLoader
    }

    fn manifest_url(&self, _game_version: Option<&str>) -> String {
        self.manifest.clone()
    }

    fn parse(
        &self,
        body: &str,
        _game_version: Option<&str>,
    ) -> Result<Vec<RemoteVersion>, VersionListError> {
        let manifest: Manifest =
            serde_json::from_str(body).map_err(|source| VersionListError::Malformed {
                loader: LoaderKind::LiteLoader,
                source,
            })?;

        let mut versions = Vec::new();
        for (game_version, entry) in manifest.versions {
            let channels = [entry.artefacts.get(ARTEFACT_KEY), entry.snapshots.get(ARTEFACT_KEY)];
            for builds in channels.into_iter().flatten() {
                for (key, build) in builds {
                    if key == "latest" {
                        continue;
                    }
                    let url = format!(
                        "{}/com/mumfrey/liteloader/{}/{}",
                        LITELOADER_DOWNLOADS, game_version, build.file
                    );
                    let mut version =
                        RemoteVersion::new(LoaderKind::LiteLoader, &game_version, &build.version, url);
                    if let Some(timestamp) = &build.timestamp {
                        version = version.with_released(timestamp);
                    }
                    versions.push(version);
                }
            }
        }
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "meta": {"description": "LiteLoader"},
        "versions": {
            "1.12.2": {
                "artefacts": {
                    "com.mumfrey:liteloader": {
                        "latest": {"version": "1.12.2", "file": "liteloader-1.12.2.jar"},
                        "1.12.2": {"version": "1.12.2", "file": "liteloader-1.12.2.jar", "timestamp": "1508016000"}
                    }
                },
                "snapshots": {
                    "com.mumfrey:liteloader": {
                        "1.12.2-SNAPSHOT": {"version": "1.12.2-SNAPSHOT", "file": "liteloader-1.12.2-SNAPSHOT.jar"}
                    }
                }
            },
            "1.5.2": {}
        }
    }"#;

    #[test]
    fn test_parse_skips_latest_alias() {
        let versions = LiteLoaderSource::new().parse(SAMPLE, None).unwrap();
        let names: Vec<_> = versions.iter().map(|v| v.self_version.as_str()).collect();
        assert_eq!(names, vec!["1.12.2", "1.12.2-SNAPSHOT"]);
        assert_eq!(
            versions[0].urls[0],
            "http://dl.liteloader.com/versions/com/mumfrey/liteloader/1.12.2/liteloader-1.12.2.jar"
        );
        assert_eq!(versions[0].released.as_deref(), Some("1508016000"));
    }

    #[test]
    fn test_manifest_is_mirrored() {
        let list = crate::download::MirrorList::new(crate::download::DownloadSource::Mirror);
        assert!(list.candidates(&LiteLoaderSource::new().manifest_url(None))[0]
            .ends_with("/maven/com/mumfrey/liteloader/versions.json"));
    }
}
