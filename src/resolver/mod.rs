//! Configuration resolution.
//!
//! This module selects the vendor configuration template for a build target
//! and rewrites it with the recipe's ordered substitution rules. Selection
//! and patching are pure; [`ConfigResolver`] adds the two filesystem touches
//! (read the template, write the result once).

pub mod expr;
pub mod rules;
pub mod select;

pub use expr::{EvalScope, Expr, ExprError, Lookup, VarSpec};
pub use rules::{
    apply_rules, materialize_rules, RuleError, RuleOutcome, RuleSpec, Scope, SubstitutionRule,
};
pub use select::{BranchId, ConfigTemplate, SelectError, TemplateTable};

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::core::recipe::{ConfigSection, Recipe};
use crate::core::target::BuildTarget;
use crate::util::fs::{read_to_string, write_atomic};
use crate::util::hash::Fingerprint;

/// Outcome of resolving a configuration file.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub template: ConfigTemplate,
    /// File the text was read from
    pub template_path: PathBuf,
    /// File the text is written to
    pub output_path: PathBuf,
    #[serde(skip)]
    pub text: String,
    pub outcomes: Vec<RuleOutcome>,
    /// Short SHA-256 over the template name and resolved text
    pub fingerprint: String,
}

impl ResolvedConfig {
    /// Write the resolved text to `output_path`, replacing it atomically.
    pub fn write(&self) -> Result<()> {
        write_atomic(&self.output_path, &self.text)?;
        info!(
            "wrote {} from {} ({})",
            self.output_path.display(),
            self.template.name,
            self.fingerprint
        );
        Ok(())
    }

    /// Rules whose pattern was not found.
    pub fn unmatched(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| o.matches == 0)
    }
}

/// Resolves the `[config]` section of one recipe.
pub struct ConfigResolver<'a> {
    recipe: &'a Recipe,
    config: &'a ConfigSection,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(recipe: &'a Recipe) -> Result<Self> {
        let config = recipe.config.as_ref().with_context(|| {
            format!(
                "`{}` does not resolve a configuration file (no [config] section)",
                recipe.name()
            )
        })?;
        Ok(ConfigResolver { recipe, config })
    }

    /// Select the template for `target`.
    pub fn select(&self, target: &BuildTarget) -> Result<ConfigTemplate> {
        let scope = self.recipe.scope(target)?;
        Ok(self.config.table.select(&scope)?)
    }

    /// Select, read and patch the template. Nothing is written.
    pub fn resolve(&self, target: &BuildTarget) -> Result<ResolvedConfig> {
        let scope = self.recipe.scope(target)?;
        let template = self.config.table.select(&scope)?;

        let stage = target.stage();
        let template_path = stage.join(template.source_path(&self.config.directory));
        let output_path = stage.join(&self.config.output);

        let source = read_to_string(&template_path).with_context(|| {
            format!(
                "configuration template `{}` is missing from the stage",
                template.name
            )
        })?;

        let rules = materialize_rules(&self.config.rules, &scope)
            .with_context(|| format!("failed to materialize rules of `{}`", self.recipe.name()))?;
        debug!("applying {} rule(s) to {}", rules.len(), template_path.display());
        let (text, outcomes) = apply_rules(&source, &rules);

        let mut fp = Fingerprint::new();
        fp.update_str(&template.name)
            .update_opt(template.derived_from.as_deref())
            .update_str(&text);

        Ok(ResolvedConfig {
            template,
            template_path,
            output_path,
            text,
            outcomes,
            fingerprint: fp.finish_short(),
        })
    }
}
