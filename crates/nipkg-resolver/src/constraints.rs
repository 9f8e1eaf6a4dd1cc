use std::fmt;

use nipkg_core::{PackageError, PackageVersion, Result};
use semver::VersionReq;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: PackageVersion,
    inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rule {
    Range {
        min: Option<Bound>,
        max: Option<Bound>,
    },
    Semver(VersionReq),
}

/// A dependency version constraint.
///
/// Accepted forms:
/// - `1.2` : at least 1.2
/// - `[1.0,2.0)`, `(1.0,]`, `[1.0]` : interval notation, `[`/`]` inclusive
/// - anything else is read as a semver requirement (`^1.2`, `>=1, <3`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    rule: Rule,
}

impl VersionConstraint {
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let rule = if raw.starts_with('[') || raw.starts_with('(') {
            parse_interval(raw).ok_or_else(|| invalid_constraint(input))?
        } else if let Ok(version) = PackageVersion::parse(raw) {
            Rule::Range {
                min: Some(Bound {
                    version,
                    inclusive: true,
                }),
                max: None,
            }
        } else {
            Rule::Semver(VersionReq::parse(raw).map_err(|_| invalid_constraint(input))?)
        };

        Ok(Self {
            raw: raw.to_string(),
            rule,
        })
    }

    pub fn matches(&self, version: &PackageVersion) -> bool {
        match &self.rule {
            Rule::Range { min, max } => {
                let above_min = min.as_ref().map_or(true, |bound| {
                    if bound.inclusive {
                        *version >= bound.version
                    } else {
                        *version > bound.version
                    }
                });
                let below_max = max.as_ref().map_or(true, |bound| {
                    if bound.inclusive {
                        *version <= bound.version
                    } else {
                        *version < bound.version
                    }
                });
                above_min && below_max
            }
            Rule::Semver(req) => req.matches(version.semver()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_interval(raw: &str) -> Option<Rule> {
    let min_inclusive = raw.starts_with('[');
    let max_inclusive = raw.ends_with(']');
    if !(max_inclusive || raw.ends_with(')')) || raw.len() < 2 {
        return None;
    }
    let body = &raw[1..raw.len() - 1];

    let Some((low, high)) = body.split_once(',') else {
        // `[1.0]` pins an exact version; `(1.0)` is meaningless.
        if !(min_inclusive && max_inclusive) {
            return None;
        }
        let version = PackageVersion::parse(body).ok()?;
        return Some(Rule::Range {
            min: Some(Bound {
                version: version.clone(),
                inclusive: true,
            }),
            max: Some(Bound {
                version,
                inclusive: true,
            }),
        });
    };

    let bound = |text: &str, inclusive: bool| -> Option<Option<Bound>> {
        let text = text.trim();
        if text.is_empty() {
            return Some(None);
        }
        let version = PackageVersion::parse(text).ok()?;
        Some(Some(Bound { version, inclusive }))
    };
    let min = bound(low, min_inclusive)?;
    let max = bound(high, max_inclusive)?;
    if min.is_none() && max.is_none() {
        return None;
    }

    Some(Rule::Range { min, max })
}

fn invalid_constraint(input: &str) -> PackageError {
    PackageError::invalid_manifest(format!("invalid version constraint '{input}'"))
}
