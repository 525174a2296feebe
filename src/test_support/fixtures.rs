//! Test fixtures for common test scenarios.
//!
//! Recipes, stage trees and build targets shared by unit tests across
//! modules.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Fixture for an unpacked source tree.
#[derive(Debug, Clone, Default)]
pub struct StageFixture {
    /// Files (path relative to stage root -> content).
    pub files: BTreeMap<PathBuf, String>,
}

impl StageFixture {
    pub fn new() -> Self {
        StageFixture::default()
    }

    /// Add a file.
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Write the fixture into `base_path`.
    pub fn write_to(&self, base_path: &Path) -> std::io::Result<()> {
        for (path, content) in &self.files {
            let full = base_path.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
        }
        Ok(())
    }

    /// Write the fixture into a fresh temporary directory.
    pub fn create(&self) -> TempDir {
        let tmp = TempDir::new().expect("failed to create temp dir");
        self.write_to(tmp.path()).expect("failed to write stage fixture");
        tmp
    }
}

/// Recipe documents.
pub mod recipes {
    /// A cut-down VASP recipe covering every recipe section.
    pub const MINI_VASP: &str = r##"
[package]
name = "vasp"
description = "Vienna Ab initio Simulation Package"
homepage = "https://vasp.at"
url = "file://{stage}/vasp.{version}.tgz"
licensed = true
manual-download = true
parallel = false

[[versions]]
version = "6.4.1"
sha256 = "4747e7403ecd114c56ada213cf8745e177e874aa4553897dcc21e9d43e67140c"

[[versions]]
version = "6.2.1"
sha256 = "d25e2f477d83cb20fce6a2a56dcee5dccf86d045dd7f76d3ae19af8343156a13"

[[versions]]
version = "6.1.1"
sha256 = "e37a4dfad09d3ad0410833bcd55af6b599179a085299026992c2d8e319bf6927"

[options.openmp]
default = false
description = "Enable OpenMP build"

[options.cuda]
default = false
description = "Enable the GPU port"

[[depends]]
name = "rsync"
kind = ["build"]

[[depends]]
name = "mpi"
kind = ["build", "link", "run"]

[[depends]]
name = "blas"

[[conflicts]]
when = "%gcc@:8"
msg = "GFortran before 9.x does not support all features needed to build VASP"

[[conflicts]]
when = "+openmp @:6.1"
msg = "OpenMP support was added on 6.2"

[config]
directory = "arch"
output = "makefile.include"

[[config.naming]]
when = "@6.3:"
prefix = "makefile.include."

[[config.naming]]
prefix = "makefile.include.linux_"

[[config.templates]]
when = "%gcc"
name = "gnu"
suffixes = [{ when = "+openmp", value = "_omp" }]

[[config.templates]]
when = "%aocc"
name = "aocc"
derive-from = "gnu"

[[config.templates]]
when = "%intel"
name = "intel"

[config.default]
name = "{compiler.name}"

[[config.rules]]
pattern = '^FC\s+= \S+'
replace = "FC          = {dep.mpi.mpifc}"
when = "!%intel"

[[config.rules]]
pattern = '^FFLAGS\s*='
replace = "FFLAGS ?="

[[config.rules]]
pattern = '^CPP_OPTIONS\s*='
replace = "CPP_OPTIONS ?="

[[config.rules]]
pattern = '^OFLAG[ ]{0,}=.*$'
replace = "OFLAG = -O3"
when = "%aocc"

[[env.build]]
var = "MPI_INC"
value = "{dep.mpi.include}"

[[env.build]]
var = "CPP_OPTIONS"
value = "-DMPI -DMPI_BLOCK=8000"

[[env.build]]
var = "CPP_OPTIONS"
op = "append-flags"
value = "-D_OPENMP"
when = "+openmp"

[[env.run]]
var = "PATH"
op = "prepend-path"
value = "{prefix.bin}"

[[phases.build]]
step = "run"
program = "make"
args = ["std", "gam", "ncl"]
when = "~cuda"

[[phases.build]]
step = "run"
program = "make"
args = ["gpu", "gpu_ncl"]
when = "+cuda"

[[phases.install]]
step = "install-tree"
from = "bin"
to = "{prefix.bin}"
"##;

    /// A recipe whose build runs a shell script, for executor tests.
    pub const SCRIPTED: &str = r##"
[package]
name = "molden"
description = "Molecular and electronic structure viewer"

[[versions]]
version = "6.7"

[options.openmp]
default = false

[config]
output = "makefile"

[config.default]
name = "makefile.in"

[[config.rules]]
pattern = "CC = cc"
replace = "CC = {compiler.cc}"
literal = true

[[env.build]]
var = "CPP_OPTIONS"
value = "-DMPI"

[[env.build]]
var = "CPP_OPTIONS"
op = "append-flags"
value = "-D_OPENMP"
when = "+openmp"

[[phases.edit]]
step = "filter"
file = "src/version.h"
rules = [{ pattern = "@VERSION@", replace = "{version}", literal = true }]

[[phases.build]]
step = "run"
program = "sh"
args = ["-c", "mkdir -p bin && echo \"$CPP_OPTIONS\" > bin/flags"]

[[phases.install]]
step = "mkdir"
path = "{prefix.share}"

[[phases.install]]
step = "install-tree"
from = "bin"
to = "{prefix.bin}"

[[phases.install]]
step = "copy"
from = "src/*.h"
to = "{prefix.include}"
"##;
}

/// Stage trees.
pub mod stage {
    use super::StageFixture;
    use tempfile::TempDir;

    const GNU_OMP: &str = r#"# Default precompiler options
CPP_OPTIONS = -DHOST=\"LinuxGNU\" \
              -DMPI -DMPI_BLOCK=8000 -Duse_collective

CPP         = gcc -E -C -w $*$(FUFFIX) >$*$(SUFFIX) $(CPP_OPTIONS)

FC          = mpif90 -fopenmp
FCL         = mpif90 -fopenmp

FFLAGS     = -w -ffpe-summary=none

OFLAG      = -O2
OFLAG_IN   = $(OFLAG)
"#;

    const GNU: &str = r#"CPP         = gcc -E -C -w $*$(FUFFIX) >$*$(SUFFIX)

FC          = mpif90
FCL         = mpif90

FFLAGS     = -w -ffpe-summary=none

OFLAG      = -O2
"#;

    const LINUX_GNU: &str = r#"CPP_OPTIONS= -DHOST=\"LinuxGNU\" -DMPI -DMPI_BLOCK=8000

FC         = mpif90
FCL        = mpif90

FFLAGS     = -ffree-form -ffree-line-length-none

OFLAG      = -O2
"#;

    const INTEL: &str = r#"CPP_OPTIONS = -DHOST=\"LinuxIFC\" -DMPI -DMPI_BLOCK=8000

FC          = mpiifort
FCL         = mpiifort

FFLAGS      = -assume byterecl -w
"#;

    const LINUX_INTEL: &str = r#"CPP_OPTIONS= -DHOST=\"LinuxIFC\" -DMPI

FC          = ifort
FCL         = ifort -mkl=sequential

FFLAGS     = -assume byterecl -w
"#;

    /// VASP-like stage with one template per compiler branch.
    pub fn mini_vasp() -> TempDir {
        StageFixture::new()
            .with_file("arch/makefile.include.gnu_omp", GNU_OMP)
            .with_file("arch/makefile.include.gnu", GNU)
            .with_file("arch/makefile.include.intel", INTEL)
            .with_file("arch/makefile.include.linux_gnu", LINUX_GNU)
            .with_file("arch/makefile.include.linux_intel", LINUX_INTEL)
            .with_file("src/main.F", "program vasp\nend program vasp\n")
            .create()
    }

    /// Stage for the scripted recipe.
    pub fn scripted() -> TempDir {
        StageFixture::new()
            .with_file("makefile.in", "CC = cc\nCFLAGS = -O2\n")
            .with_file("src/version.h", "#define VERSION \"@VERSION@\"\n")
            .with_file("src/molden.h", "void molden(void);\n")
            .create()
    }
}

/// Build targets.
pub mod targets {
    use std::path::Path;

    use crate::core::compiler::CompilerIdentity;
    use crate::core::option::{OptionRequest, OptionSet};
    use crate::core::recipe::Recipe;
    use crate::core::target::{BuildTarget, Dependency};
    use crate::core::version::Version;

    /// Stage used by tests that never touch the filesystem.
    pub const STAGE: &str = "/tmp/berth-stage";

    pub fn vasp(recipe: &Recipe, version: &str, compiler: &str, requests: &[&str]) -> BuildTarget {
        vasp_in(recipe, Path::new(STAGE), version, compiler, requests)
    }

    /// Target with MPI and BLAS supplied, staged at `stage`.
    pub fn vasp_in(
        recipe: &Recipe,
        stage: &Path,
        version: &str,
        compiler: &str,
        requests: &[&str],
    ) -> BuildTarget {
        let requests: Vec<_> = requests
            .iter()
            .map(|r| OptionRequest::parse(r).unwrap())
            .collect();
        BuildTarget::builder(
            recipe.name(),
            Version::parse(version).unwrap(),
            CompilerIdentity::parse(compiler).unwrap(),
        )
        .options(OptionSet::resolve(&recipe.options, &requests).unwrap())
        .dependency(
            Dependency::new("mpi", "openmpi")
                .with_prefix("/opt/openmpi")
                .with_attr("mpifc", "/opt/openmpi/bin/mpif90"),
        )
        .dependency(Dependency::new("blas", "openblas").with_prefix("/opt/openblas"))
        .stage(stage)
        .jobs(4)
        .build()
    }

    /// Target for the scripted recipe, installing into `prefix`.
    pub fn scripted(recipe: &Recipe, stage: &Path, prefix: &Path, requests: &[&str]) -> BuildTarget {
        let requests: Vec<_> = requests
            .iter()
            .map(|r| OptionRequest::parse(r).unwrap())
            .collect();
        BuildTarget::builder(
            recipe.name(),
            Version::parse("6.7").unwrap(),
            CompilerIdentity::parse("gcc@12.2.0").unwrap(),
        )
        .options(OptionSet::resolve(&recipe.options, &requests).unwrap())
        .stage(stage)
        .prefix(prefix)
        .env_var("PATH", std::env::var("PATH").unwrap_or_default())
        .build()
    }
}
