//! Ordered text substitution.
//!
//! Rules run one after another over a single buffer: rule N+1 sees the text
//! rule N produced. Some recipes depend on this (Intel's `fpp` fix first
//! rewrites `fpp` to the compiler driver, then repairs the `ifort -f_com`
//! line the first rewrite broke), so rules are never reordered.
//!
//! A rule whose pattern does not occur is a no-op. Vendor templates differ
//! between releases and many rules target lines that only some of them
//! carry.

use std::borrow::Cow;

use regex::{NoExpand, Regex, RegexBuilder};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use crate::core::guard::Guard;
use crate::resolver::expr::{EvalScope, Expr, ExprError};

/// Error turning rule declarations into executable rules.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("failed to evaluate replacement for `{pattern}`: {source}")]
    Replacement {
        pattern: String,
        #[source]
        source: ExprError,
    },
}

/// How many occurrences a rule replaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    First,
    #[default]
    All,
}

/// A rule as declared in a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleSpec {
    pub pattern: String,
    pub replace: Expr,
    /// Match `pattern` as plain text instead of a regular expression.
    #[serde(default)]
    pub literal: bool,
    #[serde(default)]
    pub scope: Scope,
    /// Expand `$1` / `${name}` in the replacement.
    #[serde(default)]
    pub captures: bool,
    #[serde(default)]
    pub when: Guard,
}

impl RuleSpec {
    /// Compile the pattern, for validation.
    pub fn compile(&self) -> Result<Matcher, RuleError> {
        if self.literal {
            return Ok(Matcher::Literal(self.pattern.clone()));
        }
        RegexBuilder::new(&self.pattern)
            .multi_line(true)
            .build()
            .map(Matcher::Regex)
            .map_err(|source| RuleError::Pattern {
                pattern: self.pattern.clone(),
                source: Box::new(source),
            })
    }
}

/// Compiled pattern.
#[derive(Debug, Clone)]
pub enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    pub fn as_str(&self) -> &str {
        match self {
            Matcher::Literal(s) => s,
            Matcher::Regex(re) => re.as_str(),
        }
    }
}

/// A fully materialized rule: no guards, no placeholders.
#[derive(Debug, Clone)]
pub struct SubstitutionRule {
    pub matcher: Matcher,
    pub replacement: String,
    pub scope: Scope,
    pub captures: bool,
}

impl SubstitutionRule {
    /// Regex rule replacing every match, with literal replacement text.
    pub fn regex(pattern: &str, replacement: impl Into<String>) -> Result<Self, RuleError> {
        let spec = RuleSpec {
            pattern: pattern.to_string(),
            replace: Expr::default(),
            literal: false,
            scope: Scope::All,
            captures: false,
            when: Guard::always(),
        };
        Ok(SubstitutionRule {
            matcher: spec.compile()?,
            replacement: replacement.into(),
            scope: Scope::All,
            captures: false,
        })
    }

    /// Plain-text rule replacing every occurrence.
    pub fn literal(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        SubstitutionRule {
            matcher: Matcher::Literal(pattern.into()),
            replacement: replacement.into(),
            scope: Scope::All,
            captures: false,
        }
    }

    pub fn first_only(mut self) -> Self {
        self.scope = Scope::First;
        self
    }

    pub fn with_captures(mut self) -> Self {
        self.captures = true;
        self
    }

    /// Apply to `text`, returning the new text and the number of replacements.
    pub fn apply<'t>(&self, text: &'t str) -> (Cow<'t, str>, usize) {
        let limit = match self.scope {
            Scope::First => 1,
            Scope::All => 0,
        };
        match &self.matcher {
            Matcher::Literal(pattern) => {
                if pattern.is_empty() {
                    return (Cow::Borrowed(text), 0);
                }
                let found = text.matches(pattern.as_str()).count();
                let count = if limit == 1 { found.min(1) } else { found };
                if count == 0 {
                    return (Cow::Borrowed(text), 0);
                }
                let replaced = if limit == 1 {
                    text.replacen(pattern.as_str(), &self.replacement, 1)
                } else {
                    text.replace(pattern.as_str(), &self.replacement)
                };
                (Cow::Owned(replaced), count)
            }
            Matcher::Regex(re) => {
                let found = re.find_iter(text).count();
                let count = if limit == 1 { found.min(1) } else { found };
                if count == 0 {
                    return (Cow::Borrowed(text), 0);
                }
                let replaced = if self.captures {
                    re.replacen(text, limit, self.replacement.as_str())
                } else {
                    re.replacen(text, limit, NoExpand(&self.replacement))
                };
                (replaced, count)
            }
        }
    }
}

impl Serialize for SubstitutionRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SubstitutionRule", 5)?;
        s.serialize_field("pattern", self.matcher.as_str())?;
        s.serialize_field("literal", &matches!(self.matcher, Matcher::Literal(_)))?;
        s.serialize_field("replacement", &self.replacement)?;
        s.serialize_field("scope", &self.scope)?;
        s.serialize_field("captures", &self.captures)?;
        s.end()
    }
}

/// What one rule did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub pattern: String,
    pub matches: usize,
}

/// Drop rules whose guard does not match and evaluate replacements.
pub fn materialize_rules(
    specs: &[RuleSpec],
    scope: &EvalScope<'_>,
) -> Result<Vec<SubstitutionRule>, RuleError> {
    let target = scope.target();
    specs
        .iter()
        .filter(|spec| spec.when.matches(target))
        .map(|spec| {
            let replacement = spec
                .replace
                .eval(scope)
                .map_err(|source| RuleError::Replacement {
                    pattern: spec.pattern.clone(),
                    source,
                })?;
            Ok(SubstitutionRule {
                matcher: spec.compile()?,
                replacement,
                scope: spec.scope,
                captures: spec.captures,
            })
        })
        .collect()
}

/// Apply `rules` in order to `text`.
pub fn apply_rules(text: &str, rules: &[SubstitutionRule]) -> (String, Vec<RuleOutcome>) {
    let mut buffer = text.to_string();
    let mut outcomes = Vec::with_capacity(rules.len());

    for rule in rules {
        let (next, matches) = rule.apply(&buffer);
        if matches == 0 {
            debug!(pattern = rule.matcher.as_str(), "pattern not found, rule skipped");
        }
        let next = next.into_owned();
        buffer = next;
        outcomes.push(RuleOutcome {
            pattern: rule.matcher.as_str().to_string(),
            matches,
        });
    }

    (buffer, outcomes)
}
