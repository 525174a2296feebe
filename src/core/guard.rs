//! `when` predicates over a build target.
//!
//! A guard is a whitespace-separated conjunction of atoms:
//!
//! | atom            | matches when                                         |
//! |-----------------|------------------------------------------------------|
//! | `@6.3:`         | the package version lies in the range                |
//! | `%gcc`          | the compiler family is gcc                           |
//! | `%gcc@:9`       | ... and the compiler version lies in the range       |
//! | `+openmp`       | the option is enabled                                |
//! | `~cuda`         | the option is disabled                               |
//! | `fabrics=ofi`   | the option has that value                            |
//! | `^mkl`          | a dependency has that key or provider name           |
//! | `cpu:avx2`      | the target CPU has that feature                      |
//!
//! Any atom may be negated with a leading `!`. Atoms may be glued together
//! (`+vaspsol+cuda`, `%aocc@:6.2`). The empty guard matches everything.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::compiler::CompilerFamily;
use crate::core::target::BuildTarget;
use crate::core::version::{VersionConstraint, VersionError};

/// Error parsing a guard expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("unexpected `{ch}` at offset {offset} in `{input}`")]
    Unexpected {
        input: String,
        offset: usize,
        ch: char,
    },

    #[error("missing {what} after `{sigil}` in `{input}`")]
    Missing {
        input: String,
        sigil: char,
        what: &'static str,
    },

    #[error("dangling `!` in `{0}`")]
    DanglingNegation(String),

    #[error("invalid version range in `{input}`: {source}")]
    Version {
        input: String,
        #[source]
        source: VersionError,
    },
}

/// One predicate of a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Version(VersionConstraint),
    Compiler {
        family: CompilerFamily,
        versions: Option<VersionConstraint>,
    },
    Enabled(String),
    Disabled(String),
    Value { name: String, value: String },
    Dependency(String),
    Cpu(String),
}

impl Atom {
    fn matches(&self, target: &BuildTarget) -> bool {
        match self {
            Atom::Version(range) => range.contains(target.version()),
            Atom::Compiler { family, versions } => {
                let compiler = target.compiler();
                if &compiler.family != family {
                    return false;
                }
                match (versions, &compiler.version) {
                    (None, _) => true,
                    (Some(range), Some(version)) => range.contains(version),
                    (Some(_), None) => false,
                }
            }
            Atom::Enabled(name) => target.options().enabled(name),
            Atom::Disabled(name) => !target.options().enabled(name),
            Atom::Value { name, value } => target
                .options()
                .get(name)
                .is_some_and(|v| v.to_string() == *value),
            Atom::Dependency(name) => target.has_dependency(name),
            Atom::Cpu(feature) => target.has_cpu_feature(feature),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    negated: bool,
    atom: Atom,
}

/// A conjunction of (possibly negated) atoms.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Guard {
    source: String,
    terms: Vec<Term>,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn is_range_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | ',')
}

struct Scanner<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Scanner {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn take_while(&mut self, pred: fn(char) -> bool) -> &'a str {
        let start = self.offset();
        while self.peek().is_some_and(pred) {
            self.pos += 1;
        }
        &self.input[start..self.offset()]
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(i, _)| i)
            .unwrap_or(self.input.len())
    }

    fn unexpected(&self) -> GuardError {
        GuardError::Unexpected {
            input: self.input.to_string(),
            offset: self.offset(),
            ch: self.peek().unwrap_or(' '),
        }
    }

    fn missing(&self, sigil: char, what: &'static str) -> GuardError {
        GuardError::Missing {
            input: self.input.to_string(),
            sigil,
            what,
        }
    }

    fn name(&mut self, sigil: char) -> Result<String, GuardError> {
        let name = self.take_while(is_name_char);
        if name.is_empty() {
            return Err(self.missing(sigil, "a name"));
        }
        Ok(name.to_string())
    }

    fn range(&mut self) -> Result<VersionConstraint, GuardError> {
        let text = self.take_while(is_range_char);
        if text.is_empty() {
            return Err(self.missing('@', "a version range"));
        }
        VersionConstraint::parse(text).map_err(|source| GuardError::Version {
            input: self.input.to_string(),
            source,
        })
    }

    fn atom(&mut self) -> Result<Atom, GuardError> {
        let Some(c) = self.peek() else {
            return Err(self.unexpected());
        };
        match c {
            '@' => {
                self.pos += 1;
                Ok(Atom::Version(self.range()?))
            }
            '%' => {
                self.pos += 1;
                let name = self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
                if name.is_empty() {
                    return Err(self.missing('%', "a compiler name"));
                }
                let family = CompilerFamily::parse(name);
                let versions = if self.peek() == Some('@') {
                    self.pos += 1;
                    Some(self.range()?)
                } else {
                    None
                };
                Ok(Atom::Compiler { family, versions })
            }
            '+' => {
                self.pos += 1;
                Ok(Atom::Enabled(self.name('+')?))
            }
            '~' => {
                self.pos += 1;
                Ok(Atom::Disabled(self.name('~')?))
            }
            '^' => {
                self.pos += 1;
                Ok(Atom::Dependency(self.name('^')?))
            }
            c if c.is_ascii_alphabetic() => {
                let ident = self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
                match self.peek() {
                    Some(':') if ident == "cpu" => {
                        self.pos += 1;
                        Ok(Atom::Cpu(self.name(':')?))
                    }
                    Some('=') => {
                        self.pos += 1;
                        let value = self.take_while(is_name_char);
                        if value.is_empty() {
                            return Err(self.missing('=', "a value"));
                        }
                        Ok(Atom::Value {
                            name: ident.to_string(),
                            value: value.to_string(),
                        })
                    }
                    _ => Err(self.unexpected()),
                }
            }
            _ => Err(self.unexpected()),
        }
    }
}

impl Guard {
    /// Parse a guard expression.
    pub fn parse(input: &str) -> Result<Self, GuardError> {
        let mut scanner = Scanner::new(input);
        let mut terms = Vec::new();
        let mut negated = false;

        loop {
            match scanner.peek() {
                None => break,
                Some(c) if c.is_whitespace() => {
                    if negated {
                        return Err(GuardError::DanglingNegation(input.to_string()));
                    }
                    scanner.pos += 1;
                }
                Some('!') => {
                    if negated {
                        return Err(scanner.unexpected());
                    }
                    negated = true;
                    scanner.pos += 1;
                }
                Some(_) => {
                    let atom = scanner.atom()?;
                    terms.push(Term { negated, atom });
                    negated = false;
                }
            }
        }
        if negated {
            return Err(GuardError::DanglingNegation(input.to_string()));
        }

        Ok(Guard {
            source: input.trim().to_string(),
            terms,
        })
    }

    /// The guard that matches every target.
    pub fn always() -> Self {
        Guard::default()
    }

    pub fn is_always(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluate against a target.
    pub fn matches(&self, target: &BuildTarget) -> bool {
        self.terms
            .iter()
            .all(|term| term.atom.matches(target) != term.negated)
    }

    /// Option names referenced by `+x`, `~x` and `x=v` atoms.
    pub fn option_names(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|t| match &t.atom {
            Atom::Enabled(name) | Atom::Disabled(name) | Atom::Value { name, .. } => {
                Some(name.as_str())
            }
            _ => None,
        })
    }

    /// Names referenced by `^name` atoms.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|t| match &t.atom {
            Atom::Dependency(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Features referenced by `cpu:feature` atoms.
    pub fn cpu_features(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|t| match &t.atom {
            Atom::Cpu(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            f.write_str("(always)")
        } else {
            f.write_str(&self.source)
        }
    }
}

impl FromStr for Guard {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Guard::parse(s)
    }
}

impl TryFrom<String> for Guard {
    type Error = GuardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Guard::parse(&value)
    }
}

impl From<Guard> for String {
    fn from(value: Guard) -> Self {
        value.source
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::compiler::CompilerIdentity;
    use crate::core::option::{BuildOption, OptionRequest, OptionSet};
    use crate::core::target::Dependency;
    use crate::core::version::Version;

    fn target(version: &str, compiler: &str, requests: &[&str], deps: &[(&str, &str)]) -> BuildTarget {
        let mut declared = BTreeMap::new();
        for name in ["openmp", "cuda", "vaspsol"] {
            declared.insert(name.to_string(), BuildOption::flag(name, false));
        }
        declared.insert("shmem".to_string(), BuildOption::flag("shmem", true));
        let requests: Vec<_> = requests
            .iter()
            .map(|r| OptionRequest::parse(r).unwrap())
            .collect();

        let mut builder = BuildTarget::builder(
            "vasp",
            Version::parse(version).unwrap(),
            CompilerIdentity::parse(compiler).unwrap(),
        )
        .options(OptionSet::resolve(&declared, &requests).unwrap())
        .cpu_feature("avx2");
        for (key, provider) in deps {
            builder = builder.dependency(Dependency::new(*key, *provider));
        }
        builder.build()
    }

    fn guard(s: &str) -> Guard {
        Guard::parse(s).unwrap()
    }

    #[test]
    fn test_empty_guard_matches_everything() {
        let t = target("6.4.1", "gcc@11.3.0", &[], &[]);
        assert!(guard("").matches(&t));
        assert!(guard("   ").is_always());
    }

    #[test]
    fn test_version_and_compiler_atoms() {
        let t = target("6.4.1", "gcc@8.5.0", &[], &[]);
        assert!(guard("@6.3:").matches(&t));
        assert!(!guard("@:6.2").matches(&t));
        assert!(guard("%gcc@:8").matches(&t));
        assert!(!guard("%gcc@9:").matches(&t));
        assert!(guard("%gnu").matches(&t));
        assert!(!guard("%intel").matches(&t));

        let unversioned = target("6.4.1", "gcc", &[], &[]);
        assert!(guard("%gcc").matches(&unversioned));
        assert!(!guard("%gcc@:9").matches(&unversioned));
    }

    #[test]
    fn test_option_atoms() {
        let t = target("6.4.1", "gcc@11.3.0", &["+openmp"], &[]);
        assert!(guard("+openmp").matches(&t));
        assert!(guard("~cuda").matches(&t));
        assert!(guard("+shmem").matches(&t));
        assert!(guard("openmp=true").matches(&t));
        assert!(!guard("+openmp ~shmem").matches(&t));
        assert!(guard("+openmp+shmem").matches(&t));
    }

    #[test]
    fn test_dependency_and_cpu_atoms() {
        let t = target("6.4.1", "gcc@11.3.0", &[], &[("blas", "mkl"), ("mpi", "openmpi")]);
        assert!(guard("^mkl").matches(&t));
        assert!(guard("^blas").matches(&t));
        assert!(!guard("^openblas").matches(&t));
        assert!(guard("!^intel-mpi").matches(&t));
        assert!(guard("cpu:avx2").matches(&t));
        assert!(!guard("cpu:avx512").matches(&t));
    }

    #[test]
    fn test_negation() {
        let t = target("6.2.1", "aocc@4.0.0", &[], &[]);
        assert!(guard("!%nvhpc !%gcc !%intel").matches(&t));
        assert!(!guard("!%aocc").matches(&t));
        assert!(guard("%aocc @:6.2").matches(&t));
        assert!(guard("%aocc@4:@:6.2").matches(&t));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Guard::parse("@").is_err());
        assert!(Guard::parse("%").is_err());
        assert!(Guard::parse("+").is_err());
        assert!(Guard::parse("! +openmp").is_err());
        assert!(Guard::parse("+openmp !").is_err());
        assert!(Guard::parse("openmp").is_err());
        assert!(Guard::parse("@7:6").is_err());
        assert!(Guard::parse("#cuda").is_err());
    }

    #[test]
    fn test_referenced_names() {
        let g = guard("%gcc +openmp ~cuda fabrics=ofi ^mkl !^cray-mpich cpu:avx");
        let options: Vec<_> = g.option_names().collect();
        assert_eq!(options, vec!["openmp", "cuda", "fabrics"]);
        let deps: Vec<_> = g.dependency_names().collect();
        assert_eq!(deps, vec!["mkl", "cray-mpich"]);
        assert_eq!(g.cpu_features().collect::<Vec<_>>(), vec!["avx"]);
    }
}
