//! Package and compiler versions.
//!
//! Scientific software rarely follows semver: VASP ships `5.4.4.pl2`, Ansys
//! ships `2022R2`, Gaussian ships `g16-C.01`. A [`Version`] is therefore an
//! ordered tuple of components split on `.`, `-`, `_` and on every
//! digit/letter boundary.
//!
//! Ordering rules:
//! - numeric components compare numerically (`01 == 1`);
//! - a numeric component sorts after an alphabetic one (`6.pre < 6.0`);
//! - a version that is a strict prefix of another is smaller (`6.1 < 6.1.2`).
//!
//! A [`VersionRange`] is either a bare version (prefix match, so `6.4.1`
//! satisfies `6.4`) or a `lo:hi` interval where both ends are optional and
//! the upper end is prefix-inclusive (`6.1.2` satisfies `:6.1`).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error parsing a version or version range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,

    #[error("invalid character `{ch}` in version `{input}`")]
    InvalidChar { input: String, ch: char },

    #[error("invalid version range `{0}`")]
    InvalidRange(String),
}

/// One component of a version.
#[derive(Debug, Clone)]
enum Component {
    Numeric(u64, String),
    Alpha(String),
}

impl Component {
    fn text(&self) -> &str {
        match self {
            Component::Numeric(_, text) => text,
            Component::Alpha(text) => text,
        }
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Component {}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Numeric(a, _), Component::Numeric(b, _)) => a.cmp(b),
            (Component::Alpha(a), Component::Alpha(b)) => a.cmp(b),
            (Component::Numeric(..), Component::Alpha(_)) => Ordering::Greater,
            (Component::Alpha(_), Component::Numeric(..)) => Ordering::Less,
        }
    }
}

/// A package or compiler version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    raw: String,
    components: Vec<Component>,
    /// `separators[i]` sits between `components[i]` and `components[i + 1]`.
    separators: Vec<String>,
}

impl Version {
    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut components = Vec::new();
        let mut separators = Vec::new();
        let mut current = String::new();
        let mut pending_sep = String::new();

        let flush = |current: &mut String,
                     pending_sep: &mut String,
                     components: &mut Vec<Component>,
                     separators: &mut Vec<String>| {
            if current.is_empty() {
                return;
            }
            if !components.is_empty() {
                separators.push(std::mem::take(pending_sep));
            } else {
                pending_sep.clear();
            }
            let text = std::mem::take(current);
            let component = match text.parse::<u64>() {
                Ok(n) if text.chars().all(|c| c.is_ascii_digit()) => Component::Numeric(n, text),
                _ => Component::Alpha(text),
            };
            components.push(component);
        };

        for ch in input.chars() {
            match ch {
                '.' | '-' | '_' => {
                    flush(&mut current, &mut pending_sep, &mut components, &mut separators);
                    pending_sep.push(ch);
                }
                c if c.is_ascii_alphanumeric() => {
                    let boundary = current
                        .chars()
                        .last()
                        .is_some_and(|last| last.is_ascii_digit() != c.is_ascii_digit());
                    if boundary {
                        flush(&mut current, &mut pending_sep, &mut components, &mut separators);
                    }
                    current.push(c);
                }
                other => {
                    return Err(VersionError::InvalidChar {
                        input: input.to_string(),
                        ch: other,
                    })
                }
            }
        }
        flush(&mut current, &mut pending_sep, &mut components, &mut separators);

        if components.is_empty() {
            return Err(VersionError::Empty);
        }

        Ok(Version {
            raw: input.to_string(),
            components,
            separators,
        })
    }

    /// The version exactly as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Versions always have at least one component.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether `self` equals the first components of `other`.
    pub fn is_prefix_of(&self, other: &Version) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a == b)
    }

    /// Truncate to the first `n` components, keeping the original separators.
    pub fn up_to(&self, n: usize) -> Version {
        let n = n.clamp(1, self.components.len());
        let mut raw = String::new();
        for (i, component) in self.components[..n].iter().enumerate() {
            if i > 0 {
                raw.push_str(&self.separators[i - 1]);
            }
            raw.push_str(component.text());
        }
        Version {
            raw,
            components: self.components[..n].to_vec(),
            separators: self.separators[..n - 1].to_vec(),
        }
    }

    fn join_with(&self, sep: &str) -> String {
        self.components
            .iter()
            .map(Component::text)
            .collect::<Vec<_>>()
            .join(sep)
    }

    /// Components joined by `.` (`2020R2` -> `2020.R.2`).
    pub fn dotted(&self) -> String {
        self.join_with(".")
    }

    /// Components joined by `_` (`2019.2` -> `2019_2`).
    pub fn underscored(&self) -> String {
        self.join_with("_")
    }

    /// Components joined by `-`.
    pub fn dashed(&self) -> String {
        self.join_with("-")
    }

    /// Components concatenated (`17.1` -> `171`).
    pub fn joined(&self) -> String {
        self.join_with("")
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for component in &self.components {
            match component {
                Component::Numeric(n, _) => {
                    0u8.hash(state);
                    n.hash(state);
                }
                Component::Alpha(s) => {
                    1u8.hash(state);
                    s.hash(state);
                }
            }
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.components.iter().zip(&other.components) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.components.len().cmp(&other.components.len())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.raw
    }
}

/// A single version interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRange {
    /// Bare version: matches itself and anything it prefixes.
    Prefix(Version),
    /// `lo:hi` interval, either end optional.
    Between {
        lo: Option<Version>,
        hi: Option<Version>,
    },
}

impl VersionRange {
    /// Parse `6.3:`, `:6.1`, `6.2:6.4`, `6.4` or `:`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(VersionError::InvalidRange(input.to_string()));
        }

        match input.split_once(':') {
            None => Ok(VersionRange::Prefix(Version::parse(input)?)),
            Some((lo, hi)) => {
                if hi.contains(':') {
                    return Err(VersionError::InvalidRange(input.to_string()));
                }
                let lo = if lo.is_empty() { None } else { Some(Version::parse(lo)?) };
                let hi = if hi.is_empty() { None } else { Some(Version::parse(hi)?) };
                if let (Some(l), Some(h)) = (&lo, &hi) {
                    if l > h && !l.is_prefix_of(h) && !h.is_prefix_of(l) {
                        return Err(VersionError::InvalidRange(input.to_string()));
                    }
                }
                Ok(VersionRange::Between { lo, hi })
            }
        }
    }

    /// Check whether `version` falls inside this range.
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            VersionRange::Prefix(p) => p.is_prefix_of(version),
            VersionRange::Between { lo, hi } => {
                let above = lo.as_ref().is_none_or(|lo| version >= lo);
                let below = hi
                    .as_ref()
                    .is_none_or(|hi| version <= hi || hi.is_prefix_of(version));
                above && below
            }
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRange::Prefix(v) => write!(f, "{}", v),
            VersionRange::Between { lo, hi } => {
                if let Some(lo) = lo {
                    write!(f, "{}", lo)?;
                }
                f.write_str(":")?;
                if let Some(hi) = hi {
                    write!(f, "{}", hi)?;
                }
                Ok(())
            }
        }
    }
}

/// A union of version ranges, written comma-separated (`:5,6.2:`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    ranges: Vec<VersionRange>,
}

impl VersionConstraint {
    /// Parse a comma-separated list of ranges.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let ranges = input
            .split(',')
            .map(VersionRange::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(VersionConstraint { ranges })
    }

    /// A constraint matching every version.
    pub fn any() -> Self {
        VersionConstraint {
            ranges: vec![VersionRange::Between { lo: None, hi: None }],
        }
    }

    /// Check whether any range contains `version`.
    pub fn contains(&self, version: &Version) -> bool {
        self.ranges.iter().any(|r| r.contains(version))
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ranges.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionConstraint::parse(s)
    }
}
