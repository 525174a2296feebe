//! Build options (variants).
//!
//! A recipe declares each option with a default; a build request toggles
//! some of them. The resolved [`OptionSet`] is fixed once the build target
//! is constructed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error resolving requested options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    #[error("invalid option request `{0}` (expected `+name`, `~name` or `name=value`)")]
    InvalidRequest(String),

    #[error("unknown option `{name}`")]
    Unknown { name: String, declared: Vec<String> },

    #[error("invalid value `{value}` for option `{name}`")]
    InvalidValue {
        name: String,
        value: String,
        allowed: Vec<String>,
    },
}

/// Value of a build option.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Choice(String),
}

impl OptionValue {
    /// Truthiness: `true`, or any choice other than `none`/`false`.
    pub fn is_enabled(&self) -> bool {
        match self {
            OptionValue::Bool(b) => *b,
            OptionValue::Choice(c) => !matches!(c.as_str(), "none" | "false" | ""),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Choice(c) => f.write_str(c),
        }
    }
}

/// An option declared by a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildOption {
    #[serde(skip)]
    pub name: String,
    pub default: OptionValue,
    #[serde(default)]
    pub description: String,
    /// Allowed values for choice options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl BuildOption {
    /// Boolean option helper.
    pub fn flag(name: impl Into<String>, default: bool) -> Self {
        BuildOption {
            name: name.into(),
            default: OptionValue::Bool(default),
            description: String::new(),
            values: Vec::new(),
        }
    }

    /// Whether the option takes a boolean value.
    pub fn is_bool(&self) -> bool {
        matches!(self.default, OptionValue::Bool(_))
    }

    /// Check a value against this declaration.
    pub fn accepts(&self, value: &OptionValue) -> bool {
        match (&self.default, value) {
            (OptionValue::Bool(_), OptionValue::Bool(_)) => true,
            (OptionValue::Choice(_), OptionValue::Choice(c)) => {
                self.values.is_empty() || self.values.iter().any(|v| v == c)
            }
            _ => false,
        }
    }
}

/// A single requested option: `+openmp`, `~cuda`, `fabrics=ofi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionRequest {
    pub name: String,
    pub value: OptionValue,
}

impl OptionRequest {
    pub fn parse(input: &str) -> Result<Self, OptionError> {
        let input = input.trim();
        let invalid = || OptionError::InvalidRequest(input.to_string());

        let (name, value) = if let Some(name) = input.strip_prefix('+') {
            (name, OptionValue::Bool(true))
        } else if let Some(name) = input.strip_prefix('~') {
            (name, OptionValue::Bool(false))
        } else if let Some((name, value)) = input.split_once('=') {
            let value = match value {
                "true" => OptionValue::Bool(true),
                "false" => OptionValue::Bool(false),
                "" => return Err(invalid()),
                other => OptionValue::Choice(other.to_string()),
            };
            (name, value)
        } else {
            return Err(invalid());
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(invalid());
        }

        Ok(OptionRequest {
            name: name.to_string(),
            value,
        })
    }
}

impl FromStr for OptionRequest {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OptionRequest::parse(s)
    }
}

/// Resolved option values for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OptionSet {
    values: BTreeMap<String, OptionValue>,
}

impl OptionSet {
    /// Overlay `requests` on the declared defaults.
    pub fn resolve(
        declared: &BTreeMap<String, BuildOption>,
        requests: &[OptionRequest],
    ) -> Result<Self, OptionError> {
        let mut values: BTreeMap<String, OptionValue> = declared
            .iter()
            .map(|(name, opt)| (name.clone(), opt.default.clone()))
            .collect();

        for request in requests {
            let Some(option) = declared.get(&request.name) else {
                return Err(OptionError::Unknown {
                    name: request.name.clone(),
                    declared: declared.keys().cloned().collect(),
                });
            };
            if !option.accepts(&request.value) {
                return Err(OptionError::InvalidValue {
                    name: request.name.clone(),
                    value: request.value.to_string(),
                    allowed: if option.is_bool() {
                        vec!["true".to_string(), "false".to_string()]
                    } else {
                        option.values.clone()
                    },
                });
            }
            values.insert(request.name.clone(), request.value.clone());
        }

        Ok(OptionSet { values })
    }

    /// Build a set directly from values, without validation.
    pub fn from_values(values: BTreeMap<String, OptionValue>) -> Self {
        OptionSet { values }
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Whether `name` is set and truthy.
    pub fn enabled(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(OptionValue::is_enabled)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.values {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match value {
                OptionValue::Bool(true) => write!(f, "+{}", name)?,
                OptionValue::Bool(false) => write!(f, "~{}", name)?,
                OptionValue::Choice(c) => write!(f, "{}={}", name, c)?,
            }
        }
        Ok(())
    }
}
