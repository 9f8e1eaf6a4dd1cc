use std::collections::{BTreeMap, BTreeSet, HashSet};

use nipkg_core::{PackageError, PackageManifest, Result, UnmetDependency};

/// Orders a batch of manifests (keyed by package id) so that every package
/// comes after the batch members it depends on. Dependencies outside the
/// batch do not constrain the order.
pub fn install_order(batch: &BTreeMap<String, PackageManifest>) -> Result<Vec<String>> {
    let mut reverse: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();

    for (id, manifest) in batch {
        let dependencies = manifest
            .dependencies
            .keys()
            .filter(|dep| batch.contains_key(dep.as_str()) && *dep != id)
            .collect::<BTreeSet<_>>();
        in_degree.insert(id.as_str(), dependencies.len());
        for dep in dependencies {
            reverse.entry(dep.as_str()).or_default().insert(id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter_map(|(id, degree)| (*degree == 0).then_some(*id))
        .collect();
    let mut ordered = Vec::with_capacity(batch.len());

    while let Some(next) = ready.pop_first() {
        ordered.push(next.to_string());
        if let Some(dependents) = reverse.get(next) {
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }
    }

    if ordered.len() != batch.len() {
        let ordered_set: HashSet<&str> = ordered.iter().map(String::as_str).collect();
        let cycle = batch
            .keys()
            .filter(|id| !ordered_set.contains(id.as_str()))
            .collect::<Vec<_>>();
        let mut unmet = Vec::new();
        for id in &cycle {
            for (dep, constraint) in &batch[id.as_str()].dependencies {
                if cycle.contains(&dep) {
                    unmet.push(UnmetDependency {
                        package_id: dep.clone(),
                        constraint: constraint.clone(),
                        installed: None,
                    });
                }
            }
        }
        return Err(PackageError::DependencyUnsatisfied {
            package_id: cycle
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            unmet,
        });
    }

    Ok(ordered)
}
