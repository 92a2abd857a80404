use std::fmt;
use std::str::FromStr;

use crate::model::Error;

/// Version of an istioctl release, used as the dispatch key for commanders.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(semver::Version);

impl Version {
    /// Parses `x.y.z` with an optional pre-release or build suffix. A leading `v` is tolerated.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::VersionParse {
                version: raw.to_owned(),
                reason: "version is empty".to_owned(),
            });
        }
        let numeric = trimmed.strip_prefix('v').unwrap_or(trimmed);
        semver::Version::parse(numeric)
            .map(Version)
            .map_err(|e| Error::VersionParse {
                version: raw.to_owned(),
                reason: e.to_string(),
            })
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Whether both versions belong to the same `major.minor` release line
    pub fn same_release_line(&self, other: &Version) -> bool {
        self.major() == other.major() && self.minor() == other.minor()
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Version::parse(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
