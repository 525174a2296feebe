//! Recipes compiled into the binary.

/// `(namespace, file stem, document)` for every bundled recipe.
pub const RECIPES: &[(&str, &str, &str)] = &[
    ("builtin", "abaqus", include_str!("../../recipes/builtin/abaqus.toml")),
    ("builtin", "ams", include_str!("../../recipes/builtin/ams.toml")),
    ("builtin", "ansys", include_str!("../../recipes/builtin/ansys.toml")),
    ("builtin", "castep", include_str!("../../recipes/builtin/castep.toml")),
    ("builtin", "crystal17", include_str!("../../recipes/builtin/crystal17.toml")),
    ("builtin", "fdtd", include_str!("../../recipes/builtin/fdtd.toml")),
    ("builtin", "gaussian", include_str!("../../recipes/builtin/gaussian.toml")),
    ("builtin", "gurobi", include_str!("../../recipes/builtin/gurobi.toml")),
    ("builtin", "intel-advisor", include_str!("../../recipes/builtin/intel-advisor.toml")),
    ("builtin", "intel-vtune", include_str!("../../recipes/builtin/intel-vtune.toml")),
    ("builtin", "mathematica", include_str!("../../recipes/builtin/mathematica.toml")),
    ("builtin", "molden", include_str!("../../recipes/builtin/molden.toml")),
    ("builtin", "molpro", include_str!("../../recipes/builtin/molpro.toml")),
    ("builtin", "terachem", include_str!("../../recipes/builtin/terachem.toml")),
    ("builtin", "totalview", include_str!("../../recipes/builtin/totalview.toml")),
    ("builtin", "vasp", include_str!("../../recipes/builtin/vasp.toml")),
    ("scitas", "amber", include_str!("../../recipes/scitas/amber.toml")),
    ("scitas", "ansys", include_str!("../../recipes/scitas/ansys.toml")),
    ("scitas", "cfdplusplus", include_str!("../../recipes/scitas/cfdplusplus.toml")),
    ("scitas", "crystal", include_str!("../../recipes/scitas/crystal.toml")),
    ("scitas", "gurobi", include_str!("../../recipes/scitas/gurobi.toml")),
    ("scitas", "molpro", include_str!("../../recipes/scitas/molpro.toml")),
    ("scitas", "vasp", include_str!("../../recipes/scitas/vasp.toml")),
];
