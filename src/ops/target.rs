//! Turning a target description into a [`BuildTarget`].
//!
//! Berth does not concretize dependencies. Whatever the target file and the
//! command line do not say is filled in from the configuration and a few
//! fixed defaults, then checked against the recipe.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::compiler::CompilerIdentity;
use crate::core::option::{OptionRequest, OptionSet};
use crate::core::recipe::{Recipe, TargetError};
use crate::core::target::{BuildTarget, Dependency, TargetSpec};
use crate::core::version::Version;
use crate::registry::{RecipeId, RecipeRegistry};
use crate::util::config::Config;
use crate::util::context::GlobalContext;

/// Compiler used when neither the target nor the configuration names one.
pub const DEFAULT_COMPILER: &str = "gcc";

/// A recipe looked up in the registry together with its concrete target.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub id: RecipeId,
    pub recipe: Recipe,
    pub target: BuildTarget,
}

/// Look up `query` and concretize `spec` against it.
pub fn prepare(ctx: &GlobalContext, query: &str, spec: &TargetSpec) -> Result<Prepared> {
    let config = ctx.load_config();
    let registry = RecipeRegistry::from_config(&config)?;
    let entry = registry.get(query)?;
    let target = concretize(&entry.recipe, spec, &config, ctx)?;
    Ok(Prepared {
        id: entry.id.clone(),
        recipe: entry.recipe.clone(),
        target,
    })
}

/// Fill in `spec` and check the result against `recipe`.
pub fn concretize(
    recipe: &Recipe,
    spec: &TargetSpec,
    config: &Config,
    ctx: &GlobalContext,
) -> Result<BuildTarget> {
    let version = match &spec.version {
        Some(v) => Version::parse(v).with_context(|| format!("invalid version `{}`", v))?,
        None => recipe
            .default_version()
            .cloned()
            .with_context(|| format!("`{}` declares no versions", recipe.name()))?,
    };

    let compiler_spec = spec
        .compiler
        .as_deref()
        .or(config.build.compiler.as_deref())
        .unwrap_or(DEFAULT_COMPILER);
    let compiler = CompilerIdentity::parse(compiler_spec)
        .with_context(|| format!("invalid compiler `{}`", compiler_spec))?;
    let wrappers = spec
        .wrappers
        .clone()
        .or_else(|| config.wrappers_for(&compiler))
        .unwrap_or_else(|| compiler.family.default_wrappers());

    let requests = spec
        .options
        .iter()
        .map(|r| OptionRequest::parse(r))
        .collect::<Result<Vec<_>, _>>()
        .map_err(TargetError::Option)?;
    let options = OptionSet::resolve(&recipe.options, &requests).map_err(TargetError::Option)?;

    let prefix = match &spec.prefix {
        Some(prefix) => ctx.absolute(prefix),
        None => config
            .install
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from("/opt"))
            .join(format!("{}-{}", recipe.name(), version)),
    };
    let stage = spec
        .stage
        .as_deref()
        .map(|s| ctx.absolute(s))
        .unwrap_or_else(|| ctx.cwd().to_path_buf());
    let license_dir = config
        .install
        .license_dir
        .clone()
        .unwrap_or_else(|| ctx.home().join("licenses"));
    let jobs = config.build.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });

    let mut env: BTreeMap<String, String> = std::env::vars().collect();
    env.extend(spec.env.clone());

    let mut builder = BuildTarget::builder(recipe.name(), version, compiler)
        .wrappers(wrappers)
        .options(options)
        .prefix(prefix)
        .stage(stage)
        .env(env)
        .license_dir(license_dir)
        .jobs(jobs);

    for (key, dep) in &spec.dependencies {
        let provider = dep.provider.clone().unwrap_or_else(|| key.clone());
        let mut dependency = Dependency::new(key, provider);
        if let Some(prefix) = &dep.prefix {
            dependency = dependency.with_prefix(ctx.absolute(prefix));
        }
        for (name, value) in &dep.attrs {
            dependency = dependency.with_attr(name, value);
        }
        builder = builder.dependency(dependency);
    }
    for feature in &spec.cpu_features {
        builder = builder.cpu_feature(feature);
    }

    let target = builder.build();
    debug!("concretized {}", target.describe());
    recipe.check_target(&target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::DependencySpec;
    use crate::test_support::recipes;
    use tempfile::TempDir;

    fn context(tmp: &TempDir) -> GlobalContext {
        GlobalContext::with_cwd(tmp.path().to_path_buf())
            .unwrap()
            .with_home(tmp.path().join("home"))
    }

    fn with_mpi(spec: &mut TargetSpec) {
        spec.dependencies.insert(
            "mpi".to_string(),
            DependencySpec {
                provider: Some("openmpi".to_string()),
                prefix: Some(PathBuf::from("/opt/openmpi")),
                ..Default::default()
            },
        );
        spec.dependencies.insert("blas".to_string(), DependencySpec::default());
    }

    #[test]
    fn test_defaults() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let recipe = Recipe::parse(recipes::MINI_VASP).unwrap();
        let mut spec = TargetSpec::default();
        with_mpi(&mut spec);

        let target = concretize(&recipe, &spec, &Config::default(), &ctx).unwrap();
        assert_eq!(target.version().to_string(), "6.4.1");
        assert_eq!(target.compiler().to_string(), "gcc");
        assert_eq!(target.wrappers().fc, "gfortran");
        assert_eq!(target.prefix(), PathBuf::from("/opt/vasp-6.4.1"));
        assert_eq!(target.stage(), tmp.path());
        assert_eq!(target.license_dir(), Some(tmp.path().join("home/licenses").as_path()));
        assert_eq!(target.dependency("blas").unwrap().provider, "blas");
        assert!(target.jobs() >= 1);
    }

    #[test]
    fn test_config_fills_gaps() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let recipe = Recipe::parse(recipes::MINI_VASP).unwrap();
        let config: Config = toml::from_str(
            r#"
[build]
jobs = 6
compiler = "intel@2021.6.0"

[install]
root = "/ssoft"

[[compilers]]
spec = "intel"
cc = "mpiicc"
cxx = "mpiicpc"
fc = "mpiifort"
"#,
        )
        .unwrap();
        let mut spec = TargetSpec {
            version: Some("6.2.1".to_string()),
            options: vec!["+openmp".to_string()],
            stage: Some(PathBuf::from("stage")),
            ..Default::default()
        };
        with_mpi(&mut spec);

        let target = concretize(&recipe, &spec, &config, &ctx).unwrap();
        assert_eq!(target.compiler().to_string(), "intel@2021.6.0");
        assert_eq!(target.wrappers().fc, "mpiifort");
        assert_eq!(target.prefix(), PathBuf::from("/ssoft/vasp-6.2.1"));
        assert_eq!(target.stage(), tmp.path().join("stage"));
        assert_eq!(target.jobs(), 6);
        assert!(target.options().enabled("openmp"));
    }

    #[test]
    fn test_target_errors() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let recipe = Recipe::parse(recipes::MINI_VASP).unwrap();
        let config = Config::default();

        let missing = concretize(&recipe, &TargetSpec::default(), &config, &ctx).unwrap_err();
        assert!(matches!(
            missing.downcast_ref::<TargetError>(),
            Some(TargetError::MissingDependency { .. })
        ));

        let mut spec = TargetSpec {
            options: vec!["+openacc".to_string()],
            ..Default::default()
        };
        with_mpi(&mut spec);
        let unknown = concretize(&recipe, &spec, &config, &ctx).unwrap_err();
        assert!(matches!(
            unknown.downcast_ref::<TargetError>(),
            Some(TargetError::Option(_))
        ));

        spec.options = vec!["+openmp".to_string()];
        spec.version = Some("6.1.1".to_string());
        let conflict = concretize(&recipe, &spec, &config, &ctx).unwrap_err();
        assert!(conflict.to_string().contains("OpenMP support was added on 6.2"));

        spec.version = Some("7.0".to_string());
        let undeclared = concretize(&recipe, &spec, &config, &ctx).unwrap_err();
        assert!(matches!(
            undeclared.downcast_ref::<TargetError>(),
            Some(TargetError::UndeclaredVersion { .. })
        ));
    }
}
