//! Compiler identity.
//!
//! Recipes only ever ask two questions about the compiler: which family is
//! it, and which version. The family set is closed for the families recipes
//! branch on; anything else is carried as [`CompilerFamily::Other`] so that
//! template selection can derive a name from it instead of failing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::version::{Version, VersionError};

/// Error parsing a compiler identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilerError {
    #[error("empty compiler specification")]
    Empty,

    #[error("invalid compiler version in `{spec}`: {source}")]
    Version {
        spec: String,
        #[source]
        source: VersionError,
    },
}

/// Compiler family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompilerFamily {
    Gcc,
    Intel,
    Nvhpc,
    Aocc,
    Other(String),
}

impl CompilerFamily {
    /// Parse a family name, folding vendor aliases.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "gcc" | "gnu" => CompilerFamily::Gcc,
            "intel" | "oneapi" | "icc" | "ifort" | "icx" => CompilerFamily::Intel,
            "nvhpc" | "pgi" | "nvidia" => CompilerFamily::Nvhpc,
            "aocc" => CompilerFamily::Aocc,
            other => CompilerFamily::Other(other.to_string()),
        }
    }

    /// Canonical family name.
    pub fn as_str(&self) -> &str {
        match self {
            CompilerFamily::Gcc => "gcc",
            CompilerFamily::Intel => "intel",
            CompilerFamily::Nvhpc => "nvhpc",
            CompilerFamily::Aocc => "aocc",
            CompilerFamily::Other(name) => name,
        }
    }

    /// Conventional C, C++ and Fortran driver names for this family.
    pub fn default_wrappers(&self) -> CompilerWrappers {
        let (cc, cxx, fc) = match self {
            CompilerFamily::Gcc => ("gcc", "g++", "gfortran"),
            CompilerFamily::Intel => ("icc", "icpc", "ifort"),
            CompilerFamily::Nvhpc => ("nvc", "nvc++", "nvfortran"),
            CompilerFamily::Aocc => ("clang", "clang++", "flang"),
            CompilerFamily::Other(name) if name == "clang" => ("clang", "clang++", "flang"),
            CompilerFamily::Other(_) => ("cc", "c++", "f95"),
        };
        CompilerWrappers {
            cc: cc.to_string(),
            cxx: cxx.to_string(),
            fc: fc.to_string(),
        }
    }
}

impl fmt::Display for CompilerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiler family plus optional version, written `gcc@11.3.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompilerIdentity {
    pub family: CompilerFamily,
    pub version: Option<Version>,
}

impl CompilerIdentity {
    pub fn new(family: CompilerFamily, version: Option<Version>) -> Self {
        CompilerIdentity { family, version }
    }

    /// Parse `family` or `family@version`.
    pub fn parse(spec: &str) -> Result<Self, CompilerError> {
        let spec = spec.trim();
        let (name, version) = match spec.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (spec, None),
        };
        if name.is_empty() {
            return Err(CompilerError::Empty);
        }

        let version = version
            .map(Version::parse)
            .transpose()
            .map_err(|source| CompilerError::Version {
                spec: spec.to_string(),
                source,
            })?;

        Ok(CompilerIdentity {
            family: CompilerFamily::parse(name),
            version,
        })
    }
}

impl fmt::Display for CompilerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.family, v),
            None => write!(f, "{}", self.family),
        }
    }
}

impl FromStr for CompilerIdentity {
    type Err = CompilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompilerIdentity::parse(s)
    }
}

impl TryFrom<String> for CompilerIdentity {
    type Error = CompilerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CompilerIdentity::parse(&value)
    }
}

impl From<CompilerIdentity> for String {
    fn from(value: CompilerIdentity) -> Self {
        value.to_string()
    }
}

/// Compiler driver commands handed to vendor build systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerWrappers {
    pub cc: String,
    pub cxx: String,
    pub fc: String,
}
