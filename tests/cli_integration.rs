//! CLI integration tests for Berth.
//!
//! These tests run the `berth` binary against the built-in recipes with an
//! isolated home directory.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the berth binary command, isolated in `home`.
fn berth(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("berth").unwrap();
    cmd.env("BERTH_HOME", home)
        .env_remove("BERTH_COMPILER")
        .current_dir(home);
    cmd
}

/// Create a temporary directory for test homes and stages.
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

const VASP_DEPS: &[&str] = &[
    "--dep",
    "mpi=openmpi:/opt/openmpi",
    "--dep",
    "blas=openblas:/opt/openblas",
    "--dep",
    "lapack=openblas:/opt/openblas",
    "--dep",
    "fftw=fftw:/opt/fftw",
    "--dep",
    "scalapack=netlib-scalapack:/opt/scalapack",
];

// ============================================================================
// berth list / info
// ============================================================================

#[test]
fn test_list_shows_profiles() {
    let tmp = temp_dir();

    berth(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("builtin.vasp"))
        .stdout(predicate::str::contains("scitas.vasp"))
        .stdout(predicate::str::contains("scitas.cfdplusplus"));
}

#[test]
fn test_list_namespace() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["list", "--namespace", "scitas"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scitas.amber"))
        .stdout(predicate::str::contains("builtin.").not());
}

#[test]
fn test_list_includes_configured_repository() {
    let tmp = temp_dir();
    let repo = tmp.path().join("site");
    fs::create_dir_all(&repo).unwrap();
    fs::write(
        repo.join("hello.toml"),
        "[package]\nname = \"hello\"\ndescription = \"Site-local hello\"\n\n[[versions]]\nversion = \"1.0\"\n",
    )
    .unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        format!(
            "[[recipes.repos]]\nnamespace = \"site\"\npath = \"{}\"\n",
            repo.display()
        ),
    )
    .unwrap();

    berth(tmp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("site.hello"))
        .stdout(predicate::str::contains("Site-local hello"));
}

#[test]
fn test_info_shows_metadata() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["info", "builtin.gurobi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("9.5.2"))
        .stdout(predicate::str::contains("GRB_LICENSE_FILE"));
}

#[test]
fn test_info_ambiguous_name_fails() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["info", "vasp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("matches several profiles"))
        .stderr(predicate::str::contains("candidate: scitas.vasp"));
}

#[test]
fn test_info_unknown_recipe_fails() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["info", "nonexistent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nonexistent"));
}

// ============================================================================
// berth select / resolve
// ============================================================================

#[test]
fn test_select_prints_template() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["select", "scitas.vasp", "--compiler", "gcc@11.3.0"])
        .args(VASP_DEPS)
        .assert()
        .success()
        .stdout(predicate::str::diff("makefile.include.linux_gnu\n"));
}

#[test]
fn test_select_conflict_fails() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["select", "scitas.vasp", "--compiler", "nvhpc@23.1"])
        .args(VASP_DEPS)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Only the GNU and Intel makefiles"));
}

#[test]
fn test_select_missing_dependency_fails() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["select", "scitas.vasp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires dependency `blas`"));
}

#[test]
fn test_resolve_writes_config() {
    let tmp = temp_dir();
    let stage = tmp.path().join("stage");
    fs::create_dir_all(stage.join("arch")).unwrap();
    fs::write(
        stage.join("arch/makefile.include.linux_gnu"),
        "FC         = mpif90\nMPI_INC    = /usr/include\n",
    )
    .unwrap();

    berth(tmp.path())
        .args(["resolve", "scitas.vasp", "--compiler", "gcc@11.3.0", "--stage"])
        .arg(&stage)
        .args(VASP_DEPS)
        .assert()
        .success();

    let written = fs::read_to_string(stage.join("makefile.include")).unwrap();
    assert!(written.contains("/opt/openmpi/bin/mpif90"));
    assert!(written.contains("MPI_INC = /opt/openmpi/include"));
}

#[test]
fn test_resolve_dry_run_prints() {
    let tmp = temp_dir();
    let stage = tmp.path().join("stage");
    fs::create_dir_all(stage.join("arch")).unwrap();
    fs::write(
        stage.join("arch/makefile.include.linux_gnu"),
        "FC         = mpif90\n",
    )
    .unwrap();

    berth(tmp.path())
        .args(["resolve", "scitas.vasp", "--dry-run", "--compiler", "gcc@11.3.0", "--stage"])
        .arg(&stage)
        .args(VASP_DEPS)
        .assert()
        .success()
        .stdout(predicate::str::contains("/opt/openmpi/bin/mpif90"));

    assert!(!stage.join("makefile.include").exists());
}

#[test]
fn test_resolve_missing_template_fails() {
    let tmp = temp_dir();
    let stage = tmp.path().join("empty");
    fs::create_dir_all(&stage).unwrap();

    berth(tmp.path())
        .args(["resolve", "scitas.vasp", "--compiler", "intel@2021.6.0", "--stage"])
        .arg(&stage)
        .args(VASP_DEPS)
        .assert()
        .failure()
        .stderr(predicate::str::contains("makefile.include.linux_intel"));
}

#[test]
fn test_target_file() {
    let tmp = temp_dir();
    let target = tmp.path().join("target.toml");
    fs::write(
        &target,
        r#"
compiler = "intel@2021.6.0"

[dependencies.mpi]
provider = "intel-mpi"
prefix = "/opt/impi"

[dependencies.blas]
provider = "mkl"

[dependencies.lapack]
provider = "mkl"

[dependencies.fftw]
provider = "mkl"

[dependencies.scalapack]
provider = "mkl"
"#,
    )
    .unwrap();

    berth(tmp.path())
        .args(["select", "scitas.vasp", "--target-file"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("makefile.include.linux_intel"));
}

// ============================================================================
// berth env
// ============================================================================

#[test]
fn test_env_sh() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["env", "builtin.gurobi", "--prefix", "/opt/gurobi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("export GUROBI_HOME='/opt/gurobi/linux64';"));
}

#[test]
fn test_env_csh_and_json() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["env", "scitas.gurobi", "--prefix", "/opt/gurobi", "--shell", "csh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("setenv GRB_LICENSE_FILE '/opt/gurobi/gurobi.lic';"));

    berth(tmp.path())
        .args(["env", "gaussian", "--prefix", "/opt/g16", "--cpu", "avx2", "--shell", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"var\": \"g16root\""))
        .stdout(predicate::str::contains("/opt/g16/avx2"));
}

#[test]
fn test_env_unknown_shell_fails() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["env", "builtin.gurobi", "--shell", "powershell"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown shell"));
}

// ============================================================================
// berth build
// ============================================================================

#[test]
fn test_build_plan_json() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["build", "molden", "--plan", "-o", "+ambfor", "--prefix", "/opt/molden"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"steps\""))
        .stdout(predicate::str::contains("/opt/molden"));
}

#[test]
fn test_build_installs_tree() {
    let tmp = temp_dir();
    let stage = tmp.path().join("stage");
    fs::create_dir_all(stage.join("linux64/bin")).unwrap();
    fs::write(stage.join("linux64/bin/gurobi_cl"), "#!/bin/sh\n").unwrap();
    let prefix = tmp.path().join("prefix");

    berth(tmp.path())
        .args(["build", "builtin.gurobi", "--stage"])
        .arg(&stage)
        .arg("--prefix")
        .arg(&prefix)
        .assert()
        .success();

    assert!(prefix.join("linux64/bin/gurobi_cl").exists());
}

#[test]
fn test_build_dry_run_touches_nothing() {
    let tmp = temp_dir();
    let stage = tmp.path().join("stage");
    fs::create_dir_all(stage.join("linux64")).unwrap();
    let prefix = tmp.path().join("prefix");

    berth(tmp.path())
        .args(["build", "builtin.gurobi", "--dry-run", "--stage"])
        .arg(&stage)
        .arg("--prefix")
        .arg(&prefix)
        .assert()
        .success()
        .stdout(predicate::str::contains("Installing"));

    assert!(!prefix.exists());
}

// ============================================================================
// berth lint / completions
// ============================================================================

#[test]
fn test_lint_builtin_recipes() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["lint", "--all"])
        .assert()
        .success()
        .stderr(predicate::str::contains("0 error(s)"));
}

#[test]
fn test_lint_reports_ambiguity() {
    let tmp = temp_dir();
    let repo = tmp.path().join("site");
    fs::create_dir_all(&repo).unwrap();
    fs::write(
        repo.join("overlap.toml"),
        r#"
[package]
name = "overlap"

[[versions]]
version = "1.0"

[options.mpi]
default = false

[config]
output = "Makefile"

[[config.templates]]
when = "%gcc"
name = "Makefile.gnu"

[[config.templates]]
when = "+mpi"
name = "Makefile.mpi"

[config.default]
name = "Makefile.{compiler.name}"
"#,
    )
    .unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        format!(
            "[[recipes.repos]]\nnamespace = \"site\"\npath = \"{}\"\n",
            repo.display()
        ),
    )
    .unwrap();

    berth(tmp.path())
        .args(["lint", "site.overlap"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ambiguous"));
}

#[test]
fn test_completions() {
    let tmp = temp_dir();

    berth(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("berth"));
}
