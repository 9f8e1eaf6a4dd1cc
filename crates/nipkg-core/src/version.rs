use std::cmp::Ordering;
use std::fmt;

use semver::{BuildMetadata, Prerelease, Version};

use crate::error::{PackageError, Result};

/// A package version as written in manifests and the state store
/// (`1.0`, `2.1.3`, `1.0.0.4`, `1.2-beta`), kept verbatim and compared
/// through its semver normalization.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    raw: String,
    normalized: Version,
}

impl PackageVersion {
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let (numeric, pre) = match raw.split_once('-') {
            Some((numeric, pre)) => (numeric, Some(pre)),
            None => (raw, None),
        };

        let parts = numeric
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| invalid_version(input))?;
        if parts.is_empty() || parts.len() > 4 {
            return Err(invalid_version(input));
        }

        let mut normalized = Version::new(
            parts[0],
            parts.get(1).copied().unwrap_or(0),
            parts.get(2).copied().unwrap_or(0),
        );
        if let Some(revision) = parts.get(3) {
            normalized.build =
                BuildMetadata::new(&revision.to_string()).map_err(|_| invalid_version(input))?;
        }
        if let Some(pre) = pre {
            normalized.pre = Prerelease::new(pre).map_err(|_| invalid_version(input))?;
        }

        Ok(Self {
            raw: raw.to_string(),
            normalized,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn semver(&self) -> &Version {
        &self.normalized
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left, right) = (&self.normalized, &other.normalized);
        (left.major, left.minor, left.patch)
            .cmp(&(right.major, right.minor, right.patch))
            .then_with(|| left.pre.cmp(&right.pre))
            .then_with(|| revision(left).cmp(&revision(right)))
    }
}

fn revision(version: &Version) -> u64 {
    version.build.as_str().parse().unwrap_or(0)
}

fn invalid_version(input: &str) -> PackageError {
    PackageError::invalid_manifest(format!("invalid version '{input}'"))
}
