//! Remote version records.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::download::Checksum;

/// Which mod loader a version list describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    Forge,
    OptiFine,
    LiteLoader,
}

impl LoaderKind {
    /// Returns the lowercase identifier used in task names and on the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forge => "forge",
            Self::OptiFine => "optifine",
            Self::LiteLoader => "liteloader",
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoaderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forge" => Ok(Self::Forge),
            "optifine" => Ok(Self::OptiFine),
            "liteloader" => Ok(Self::LiteLoader),
            other => Err(format!("unknown loader '{}'", other)),
        }
    }
}

/// One installable loader version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteVersion {
    pub loader: LoaderKind,
    /// Game version this build targets, e.g. `1.12.2`.
    pub game_version: String,
    /// Loader's own version, e.g. `14.23.5.2859` or `HD_U_G5`.
    pub self_version: String,
    /// Official download URLs; mirrors are applied at download time.
    pub urls: Vec<String>,
    pub checksum: Option<Checksum>,
    /// Release timestamp as published, if any.
    pub released: Option<String>,
}

impl RemoteVersion {
    pub fn new(
        loader: LoaderKind,
        game_version: impl Into<String>,
        self_version: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            game_version: game_version.into(),
            self_version: self_version.into(),
            urls: vec![url.into()],
            checksum: None,
            released: None,
        }
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn with_released(mut self, released: impl Into<String>) -> Self {
        self.released = Some(released.into());
        self
    }
}

impl fmt::Display for RemoteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} for {}", self.loader, self.self_version, self.game_version)
    }
}

/// Orders game versions by their numeric components, so "1.9" < "1.10".
///
/// Components are split on `.`, `-` and `_`. Numeric components compare as
/// numbers, anything else as text; a version that is a prefix of another
/// sorts first ("1.12" < "1.12.2").
pub fn compare_game_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split(['.', '-', '_']);
    let mut right = b.split(['.', '-', '_']);
    loop {
        let ordering = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Ok(_)) => Ordering::Greater,
                (Err(_), Err(_)) => x.cmp(y),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_game_versions_numeric() {
        let mut games = vec!["1.10", "1.9", "1.12.2", "1.7.10", "1.12"];
        games.sort_by(|a, b| compare_game_versions(a, b));
        assert_eq!(games, vec!["1.7.10", "1.9", "1.10", "1.12", "1.12.2"]);
    }

    #[test]
    fn test_compare_game_versions_text_components() {
        assert_eq!(compare_game_versions("1.14.4", "1.14.4"), Ordering::Equal);
        assert_eq!(compare_game_versions("1.14_pre1", "1.14_pre2"), Ordering::Less);
        assert_eq!(compare_game_versions("1.14.1", "1.14_pre1"), Ordering::Less);
    }
}
