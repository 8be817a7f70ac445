//! Forge versions from the BMCLAPI index.

use serde::Deserialize;

use crate::download::{Checksum, BMCLAPI_ROOT};

use super::error::VersionListError;
use super::list::VersionSource;
use super::types::{LoaderKind, RemoteVersion};

const FORGE_MAVEN: &str = "https://maven.minecraftforge.net/net/minecraftforge/forge";

#[derive(Debug, Deserialize)]
struct ForgeBuild {
    #[serde(rename = "mcversion")]
    game_version: String,
    version: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    modified: Option<String>,
    #[serde(default)]
    files: Vec<ForgeFile>,
}

#[derive(Debug, Deserialize)]
struct ForgeFile {
    format: String,
    category: String,
    #[serde(default)]
    hash: Option<String>,
}

/// Forge builds, listed per game version.
#[derive(Clone, Debug)]
pub struct ForgeSource {
    root: String,
}

impl ForgeSource {
    pub fn new() -> Self {
        Self::with_root(BMCLAPI_ROOT)
    }

    /// Uses another BMCLAPI-compatible host.
    pub fn with_root(root: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for ForgeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionSource for ForgeSource {
    fn loader(&self) -> LoaderKind {
        LoaderKind::Forge
    }

    fn per_game_version(&self) -> bool {
        true
    }

    fn manifest_url(&self, game_version: Option<&str>) -> String {
        format!("{}/forge/minecraft/{}", self.root, game_version.unwrap_or_default())
    }

    fn parse(
        &self,
        body: &str,
        _game_version: Option<&str>,
    ) -> Result<Vec<RemoteVersion>, VersionListError> {
        let builds: Vec<ForgeBuild> =
            serde_json::from_str(body).map_err(|source| VersionListError::Malformed {
                loader: LoaderKind::Forge,
                source,
            })?;

        Ok(builds.into_iter().filter_map(into_remote).collect())
    }
}

/// Builds without an installer jar (very old ones) are skipped.
fn into_remote(build: ForgeBuild) -> Option<RemoteVersion> {
    let installer = build
        .files
        .iter()
        .find(|f| f.category == "installer" && f.format == "jar")?;

    // Maven coordinates carry the branch as a suffix when there is one.
    let mut coordinate = format!("{}-{}", build.game_version, build.version);
    if let Some(branch) = build.branch.as_deref().filter(|b| !b.is_empty()) {
        coordinate.push('-');
        coordinate.push_str(branch);
    }
    let url = format!(
        "{}/{}/forge-{}-installer.jar",
        FORGE_MAVEN, coordinate, coordinate
    );

    let mut version = RemoteVersion::new(LoaderKind::Forge, build.game_version, build.version, url);
    if let Some(hash) = installer.hash.as_deref() {
        version = version.with_checksum(Checksum::sha1(hash));
    }
    if let Some(modified) = build.modified {
        version = version.with_released(modified);
    }
    Some(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "mcversion": "1.12.2",
            "version": "14.23.5.2859",
            "build": 2859,
            "branch": null,
            "modified": "2021-08-29T01:14:06.000Z",
            "files": [
                {"format": "jar", "category": "installer", "hash": "ABCDEF0123"},
                {"format": "txt", "category": "changelog", "hash": "00"}
            ]
        },
        {
            "mcversion": "1.7.10",
            "version": "10.13.4.1614",
            "branch": "1.7.10",
            "files": [{"format": "jar", "category": "installer"}]
        },
        {
            "mcversion": "1.1",
            "version": "1.3.4.29",
            "files": [{"format": "zip", "category": "client"}]
        }
    ]"#;

    #[test]
    fn test_parse_builds() {
        let versions = ForgeSource::new().parse(SAMPLE, Some("1.12.2")).unwrap();
        assert_eq!(versions.len(), 2);

        let latest = &versions[0];
        assert_eq!(latest.self_version, "14.23.5.2859");
        assert_eq!(
            latest.urls[0],
            "https://maven.minecraftforge.net/net/minecraftforge/forge/1.12.2-14.23.5.2859/forge-1.12.2-14.23.5.2859-installer.jar"
        );
        assert_eq!(latest.checksum, Some(Checksum::sha1("abcdef0123")));
        assert!(latest.released.is_some());
    }

    #[test]
    fn test_branch_is_part_of_coordinate() {
        let versions = ForgeSource::new().parse(SAMPLE, None).unwrap();
        assert!(versions[1].urls[0].ends_with("forge-1.7.10-10.13.4.1614-1.7.10-installer.jar"));
        assert_eq!(versions[1].checksum, None);
    }

    #[test]
    fn test_manifest_url() {
        let source = ForgeSource::with_root("http://localhost:8080/");
        assert_eq!(
            source.manifest_url(Some("1.12.2")),
            "http://localhost:8080/forge/minecraft/1.12.2"
        );
    }

    #[test]
    fn test_malformed_body() {
        let err = ForgeSource::new().parse("{\"error\": 1}", None).unwrap_err();
        assert!(err.to_string().starts_with("malformed forge version list"));
    }
}
