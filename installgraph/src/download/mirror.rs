//! Download source selection.
//!
//! Official hosts are slow or unreachable from some networks, so every
//! official URL can be rewritten to a BMCLAPI mirror. A [`MirrorList`] turns
//! one URL into an ordered list of candidates; the download task tries them
//! in order.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Root of the BMCLAPI mirror.
pub const BMCLAPI_ROOT: &str = "https://bmclapi2.bangbang93.com";

/// Official prefix -> mirror prefix.
const BMCLAPI_RULES: &[(&str, &str)] = &[
    ("https://launchermeta.mojang.com", BMCLAPI_ROOT),
    ("https://piston-meta.mojang.com", BMCLAPI_ROOT),
    ("https://piston-data.mojang.com", BMCLAPI_ROOT),
    ("https://launcher.mojang.com", BMCLAPI_ROOT),
    ("https://libraries.minecraft.net", "https://bmclapi2.bangbang93.com/libraries"),
    (
        "https://resources.download.minecraft.net",
        "https://bmclapi2.bangbang93.com/assets",
    ),
    ("https://maven.minecraftforge.net", "https://bmclapi2.bangbang93.com/maven"),
    ("https://files.minecraftforge.net/maven", "https://bmclapi2.bangbang93.com/maven"),
    (
        "http://dl.liteloader.com/versions/versions.json",
        "https://bmclapi2.bangbang93.com/maven/com/mumfrey/liteloader/versions.json",
    ),
    ("http://dl.liteloader.com/versions", "https://bmclapi2.bangbang93.com/maven"),
];

/// Which host a download should prefer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DownloadSource {
    /// Official hosts first, mirror as fallback.
    #[default]
    Official,
    /// Mirror first, official hosts as fallback.
    Mirror,
    /// Spread URLs over both; each URL consistently prefers one host.
    Balanced,
}

impl fmt::Display for DownloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Official => "official",
            Self::Mirror => "mirror",
            Self::Balanced => "balanced",
        };
        f.write_str(s)
    }
}

impl FromStr for DownloadSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "official" => Ok(Self::Official),
            "mirror" | "bmclapi" => Ok(Self::Mirror),
            "balanced" => Ok(Self::Balanced),
            other => Err(format!(
                "unknown download source '{}' (expected official, mirror or balanced)",
                other
            )),
        }
    }
}

/// Rewrites official URLs into candidate lists.
#[derive(Clone, Debug)]
pub struct MirrorList {
    source: DownloadSource,
    rules: Vec<(String, String)>,
}

impl MirrorList {
    /// Creates a list with the BMCLAPI rules.
    pub fn new(source: DownloadSource) -> Self {
        Self {
            source,
            rules: BMCLAPI_RULES
                .iter()
                .map(|(official, mirror)| (official.to_string(), mirror.to_string()))
                .collect(),
        }
    }

    /// Creates a list with no rewrite rules.
    pub fn without_rules(source: DownloadSource) -> Self {
        Self {
            source,
            rules: Vec::new(),
        }
    }

    /// Adds a rule. Rules added later take precedence.
    pub fn with_rule(mut self, official_prefix: impl Into<String>, mirror_prefix: impl Into<String>) -> Self {
        self.rules.insert(0, (official_prefix.into(), mirror_prefix.into()));
        self
    }

    /// Returns the configured source.
    pub fn source(&self) -> DownloadSource {
        self.source
    }

    /// Rewrites `url` with the first matching rule.
    pub fn rewrite(&self, url: &str) -> Option<String> {
        self.rules
            .iter()
            .find(|(official, _)| url.starts_with(official.as_str()))
            .map(|(official, mirror)| format!("{}{}", mirror, &url[official.len()..]))
    }

    /// Returns the URLs to try for `url`, in order, without duplicates.
    pub fn candidates(&self, url: &str) -> Vec<String> {
        let mirrored = match self.rewrite(url) {
            Some(mirrored) if mirrored != url => mirrored,
            _ => return vec![url.to_string()],
        };

        let mirror_first = match self.source {
            DownloadSource::Official => false,
            DownloadSource::Mirror => true,
            DownloadSource::Balanced => {
                let mut hasher = DefaultHasher::new();
                url.hash(&mut hasher);
                hasher.finish() % 2 == 0
            }
        };

        if mirror_first {
            vec![mirrored, url.to_string()]
        } else {
            vec![url.to_string(), mirrored]
        }
    }
}

impl Default for MirrorList {
    fn default() -> Self {
        Self::new(DownloadSource::default())
    }
}
