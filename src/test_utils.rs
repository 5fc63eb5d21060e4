//! Test utilities for unit and property-based tests
//!
//! This module provides fixtures and proptest generators.

use crate::core::package::{Package, PackageSet};

/// The six-package graph used throughout the executor tests
///
/// e and f have no dependencies, c depends on e, d on c and e,
/// b on d, and a on b and c. Declared as a, b, c, d, e, f.
pub fn sample_package_set() -> PackageSet {
    PackageSet::from_packages([
        Package::new("adir", "apackage").with_dependencies(["packages/bdir", "cdir"]),
        Package::new("packages/bdir", "bpackage").with_dependencies(["ddir"]),
        Package::new("cdir", "cpackage").with_dependencies(["edir"]),
        Package::new("ddir", "dpackage").with_dependencies(["cdir", "edir"]),
        Package::new("edir", "epackage"),
        Package::new("fdir", "fpackage"),
    ])
    .expect("sample directories are unique")
}

pub mod generators {
    use super::{Package, PackageSet};
    use proptest::prelude::*;

    /// Generate an acyclic package set with a shuffled declaration order
    ///
    /// Package `pkg-i` may only depend on `pkg-j` with `j < i`, which keeps
    /// the graph acyclic whatever order the packages are declared in.
    pub fn acyclic_package_set() -> impl Strategy<Value = PackageSet> {
        (1usize..16)
            .prop_flat_map(|n| {
                let edges = proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n);
                let declaration = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
                (edges, declaration)
            })
            .prop_map(|(edges, declaration)| {
                let mut set = PackageSet::new();
                for &i in &declaration {
                    let deps: Vec<String> = (0..i)
                        .filter(|&j| edges[i][j])
                        .map(|j| format!("pkg-{j}"))
                        .collect();
                    set.insert(Package::new(format!("pkg-{i}"), format!("pkg-{i}")).with_dependencies(deps))
                        .expect("generated directories are unique");
                }
                set
            })
    }

    /// Generate an acyclic package set together with the packages whose
    /// build action should fail
    pub fn package_set_with_failures() -> impl Strategy<Value = (PackageSet, Vec<String>)> {
        acyclic_package_set().prop_flat_map(|set| {
            let directories: Vec<String> = set.directories().map(String::from).collect();
            let failing = proptest::sample::subsequence(directories.clone(), 0..=directories.len());
            (Just(set), failing)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_generated_dependencies_exist(set in acyclic_package_set()) {
            for package in &set {
                for dep in &package.dependencies {
                    prop_assert!(set.contains(dep));
                }
            }
        }
    }
}
