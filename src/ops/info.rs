//! Implementation of `berth list` and `berth info`.

use std::fmt::Write;

use anyhow::Result;

use crate::core::recipe::DepKind;
use crate::registry::{RecipeEntry, RecipeRegistry};
use crate::util::context::GlobalContext;

/// Load the registry the current configuration describes.
pub fn registry(ctx: &GlobalContext) -> Result<RecipeRegistry> {
    RecipeRegistry::from_config(&ctx.load_config())
}

/// All profiles, optionally restricted to one namespace, sorted by id.
pub fn list_recipes(ctx: &GlobalContext, namespace: Option<&str>) -> Result<Vec<RecipeEntry>> {
    let registry = registry(ctx)?;
    let entries = match namespace {
        Some(ns) => registry.namespace(ns).cloned().collect(),
        None => registry.iter().cloned().collect(),
    };
    Ok(entries)
}

/// Look up one profile.
pub fn info(ctx: &GlobalContext, query: &str) -> Result<RecipeEntry> {
    let registry = registry(ctx)?;
    Ok(registry.get(query)?.clone())
}

/// First line of a recipe description.
pub fn summary_line(entry: &RecipeEntry) -> &str {
    entry
        .recipe
        .package
        .description
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}

fn kinds(kind: &[DepKind]) -> String {
    kind.iter()
        .map(|k| match k {
            DepKind::Build => "build",
            DepKind::Link => "link",
            DepKind::Run => "run",
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Human-readable description of a profile.
pub fn format_info(entry: &RecipeEntry) -> String {
    let recipe = &entry.recipe;
    let pkg = &recipe.package;
    let mut out = String::new();

    let _ = writeln!(out, "{} ({})", entry.id, entry.origin);
    for line in pkg.description.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let _ = writeln!(out, "  {}", line);
    }
    if let Some(homepage) = &pkg.homepage {
        let _ = writeln!(out, "\nHomepage: {}", homepage);
    }

    let mut flags = Vec::new();
    if pkg.licensed {
        flags.push("licensed");
    }
    if pkg.manual_download {
        flags.push("manual download");
    }
    if pkg.only_binary {
        flags.push("binary only");
    }
    if !pkg.parallel {
        flags.push("serial make");
    }
    if !flags.is_empty() {
        let _ = writeln!(out, "Flags: {}", flags.join(", "));
    }

    let mut versions: Vec<_> = recipe.versions.iter().collect();
    versions.sort_by(|a, b| b.version.cmp(&a.version));
    let _ = writeln!(out, "\nVersions:");
    for entry in versions {
        match &entry.sha256 {
            Some(sha) => {
                let _ = writeln!(out, "  {:<20} sha256:{}", entry.version, sha);
            }
            None => {
                let _ = writeln!(out, "  {}", entry.version);
            }
        }
    }

    if !recipe.options.is_empty() {
        let _ = writeln!(out, "\nOptions:");
        for option in recipe.options.values() {
            let values = if option.values.is_empty() {
                String::new()
            } else {
                format!(" [{}]", option.values.join(", "))
            };
            let _ = writeln!(
                out,
                "  {:<16} default={}{}  {}",
                option.name, option.default, values, option.description
            );
        }
    }

    if !recipe.depends.is_empty() {
        let _ = writeln!(out, "\nDependencies:");
        for dep in &recipe.depends {
            let when = if dep.when.is_always() {
                String::new()
            } else {
                format!(" when {}", dep.when)
            };
            let _ = writeln!(out, "  {:<16} ({}){}", dep.name, kinds(&dep.kind), when);
        }
    }

    if !recipe.conflicts.is_empty() {
        let _ = writeln!(out, "\nConflicts:");
        for conflict in &recipe.conflicts {
            if conflict.msg.is_empty() {
                let _ = writeln!(out, "  {}", conflict.when);
            } else {
                let _ = writeln!(out, "  {}: {}", conflict.when, conflict.msg);
            }
        }
    }

    if let Some(config) = &recipe.config {
        let _ = writeln!(
            out,
            "\nConfiguration: {} from {} ({} branch(es), {} rule(s))",
            config.output.display(),
            config.directory.display(),
            config.table.templates.len() + usize::from(config.table.default.is_some()),
            config.rules.len()
        );
    }

    if let Some(license) = recipe.license.as_ref().filter(|l| l.required) {
        let _ = writeln!(out, "\nLicense:");
        if !license.files.is_empty() {
            let _ = writeln!(out, "  files: {}", license.files.join(", "));
        }
        if !license.vars.is_empty() {
            let _ = writeln!(out, "  variables: {}", license.vars.join(", "));
        }
        if let Some(url) = &license.url {
            let _ = writeln!(out, "  see {}", url);
        }
    }

    out
}
