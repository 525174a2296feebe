//! Implementation of `berth select` and `berth resolve`.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::core::target::TargetSpec;
use crate::ops::target::prepare;
use crate::registry::RecipeId;
use crate::resolver::{ConfigResolver, ConfigTemplate, ResolvedConfig};
use crate::util::context::GlobalContext;

/// Options for the resolve command.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Recipe name, bare or qualified
    pub recipe: String,

    /// What to build
    pub target: TargetSpec,

    /// Print the result instead of writing it
    pub dry_run: bool,
}

/// Template chosen for a target.
#[derive(Debug, Clone)]
pub struct Selection {
    pub id: RecipeId,
    /// Target description
    pub target: String,
    pub template: ConfigTemplate,
    /// Where the template is read from, relative to the stage
    pub source: PathBuf,
}

/// Select the configuration template without touching the stage.
pub fn select(ctx: &GlobalContext, recipe: &str, target: &TargetSpec) -> Result<Selection> {
    let prepared = prepare(ctx, recipe, target)?;
    let resolver = ConfigResolver::new(&prepared.recipe)?;
    let template = resolver.select(&prepared.target)?;
    let directory = prepared
        .recipe
        .config
        .as_ref()
        .map(|c| c.directory.clone())
        .unwrap_or_default();

    Ok(Selection {
        id: prepared.id,
        target: prepared.target.describe(),
        source: template.source_path(&directory),
        template,
    })
}

/// Resolve the configuration file in the stage.
///
/// The resolved text is written once unless `dry_run` is set.
pub fn resolve(ctx: &GlobalContext, opts: &ResolveOptions) -> Result<ResolvedConfig> {
    let prepared = prepare(ctx, &opts.recipe, &opts.target)?;
    let resolved = ConfigResolver::new(&prepared.recipe)?.resolve(&prepared.target)?;

    if opts.dry_run {
        info!(
            "dry run: not writing {} ({})",
            resolved.output_path.display(),
            resolved.fingerprint
        );
    } else {
        resolved.write()?;
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::DependencySpec;
    use crate::test_support::StageFixture;
    use tempfile::TempDir;

    fn context(tmp: &TempDir) -> GlobalContext {
        GlobalContext::with_cwd(tmp.path().to_path_buf())
            .unwrap()
            .with_home(tmp.path().join("home"))
    }

    fn scitas_vasp(compiler: &str, stage: &std::path::Path) -> TargetSpec {
        let mut spec = TargetSpec {
            compiler: Some(compiler.to_string()),
            stage: Some(stage.to_path_buf()),
            ..Default::default()
        };
        for (key, provider, prefix) in [
            ("mpi", "openmpi", "/opt/openmpi"),
            ("blas", "openblas", "/opt/openblas"),
            ("lapack", "openblas", "/opt/openblas"),
            ("fftw", "fftw", "/opt/fftw"),
            ("scalapack", "netlib-scalapack", "/opt/scalapack"),
        ] {
            spec.dependencies.insert(
                key.to_string(),
                DependencySpec {
                    provider: Some(provider.to_string()),
                    prefix: Some(prefix.into()),
                    ..Default::default()
                },
            );
        }
        spec
    }

    #[test]
    fn test_select_scitas_vasp() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let selection = select(&ctx, "scitas.vasp", &scitas_vasp("gcc@11.3.0", tmp.path())).unwrap();
        assert_eq!(selection.template.name, "makefile.include.linux_gnu");
        assert_eq!(selection.source, PathBuf::from("arch/makefile.include.linux_gnu"));
        assert!(selection.target.starts_with("vasp@5.4.4 %gcc@11.3.0"));
    }

    #[test]
    fn test_resolve_scitas_vasp() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let stage = StageFixture::new()
            .with_file(
                "arch/makefile.include.linux_gnu",
                "FC         = mpif90\nBLAS       = -L/usr/lib -lblas\nLAPACK     = -llapack\nFFTW       ?= /opt/gfortran/fftw-3.3.4-GCC-5.4.1\nMPI_INC    = /usr/include\n",
            )
            .create();
        let spec = scitas_vasp("gcc@11.3.0", stage.path());

        let dry = resolve(
            &ctx,
            &ResolveOptions {
                recipe: "scitas.vasp".to_string(),
                target: spec.clone(),
                dry_run: true,
            },
        )
        .unwrap();
        assert!(!stage.path().join("makefile.include").exists());

        let resolved = resolve(
            &ctx,
            &ResolveOptions {
                recipe: "scitas.vasp".to_string(),
                target: spec,
                dry_run: false,
            },
        )
        .unwrap();
        assert_eq!(dry.fingerprint, resolved.fingerprint);

        let written = std::fs::read_to_string(stage.path().join("makefile.include")).unwrap();
        assert!(written.contains("FC         = /opt/openmpi/bin/mpif90"));
        assert!(written.contains("BLAS = -L/opt/openblas/lib -lopenblas"));
        assert!(written.contains("LAPACK =\n"));
        assert!(written.contains("FFTW = /opt/fftw"));
        assert!(written.contains("MPI_INC = /opt/openmpi/include"));
    }

    #[test]
    fn test_conflict_blocks_selection() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let err = select(&ctx, "scitas.vasp", &scitas_vasp("nvhpc@23.1", tmp.path())).unwrap_err();
        assert!(err.to_string().contains("Only the GNU and Intel makefiles"));
    }

    #[test]
    fn test_select_builtin_vasp_branches() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let spec = |version: &str, compiler: &str, options: &[&str]| {
            let mut spec = scitas_vasp(compiler, tmp.path());
            spec.version = Some(version.to_string());
            spec.options = options.iter().map(|o| o.to_string()).collect();
            spec.dependencies.insert("fftw-api".to_string(), DependencySpec::default());
            spec.dependencies.insert("qd".to_string(), DependencySpec::default());
            spec
        };

        let omp = select(&ctx, "builtin.vasp", &spec("6.4.1", "gcc@12.2.0", &["+openmp"])).unwrap();
        assert_eq!(omp.template.name, "makefile.include.gnu_omp");

        let aocc = select(&ctx, "builtin.vasp", &spec("6.2.1", "aocc@4.0.0", &[])).unwrap();
        assert_eq!(aocc.template.name, "makefile.include.linux_aocc");
        assert_eq!(aocc.source, PathBuf::from("arch/makefile.include.linux_gnu"));

        let clang = select(&ctx, "builtin.vasp", &spec("6.4.1", "clang@15.0.0", &[])).unwrap();
        assert_eq!(clang.template.name, "makefile.include.clang");

        let nvhpc = select(&ctx, "builtin.vasp", &spec("6.3.2", "nvhpc@23.1", &[])).unwrap();
        assert_eq!(nvhpc.template.name, "makefile.include.nvhpc_acc");
    }
}
