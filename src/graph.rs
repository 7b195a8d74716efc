//! Dependency-graph validation.
//!
//! Run exactly once, after every service has been registered and before
//! any lifecycle task is spawned. Checks that every declared dependency
//! resolves to a registered service and that the graph is acyclic, so
//! no service can end up waiting forever on a "started" signal that
//! will never fire.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::ConfigError;

/// Validate the declared dependency graph.
///
/// `deps` maps every registered service name to its declared dependency
/// names. Returns the first unresolved name or, if all names resolve, a
/// service sitting on a cycle (detected via Kahn's algorithm). Sorted
/// maps keep the reported service deterministic.
pub(crate) fn validate(deps: &BTreeMap<String, BTreeSet<String>>) -> Result<(), ConfigError> {
    for (name, wanted) in deps {
        for dep in wanted {
            if !deps.contains_key(dep) {
                return Err(ConfigError::UnknownDependency {
                    service: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Kahn's algorithm: repeatedly retire services whose dependencies
    // have all been retired. Anything left over sits on a cycle.
    let mut indegree: BTreeMap<&str, usize> = deps
        .iter()
        .map(|(name, wanted)| (name.as_str(), wanted.len()))
        .collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, wanted) in deps {
        for dep in wanted {
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut ready: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut retired = 0usize;
    while let Some(name) = ready.pop_front() {
        retired += 1;
        if let Some(waiting) = dependents.get(name) {
            for &dependent in waiting {
                let degree = indegree
                    .get_mut(dependent)
                    .expect("dependent is a registered service");
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(dependent);
                }
            }
        }
    }

    if retired < deps.len() {
        return Err(ConfigError::DependencyCycle(find_cycle_member(
            deps, &indegree,
        )));
    }
    Ok(())
}

/// Pick a leftover service that actually sits on a cycle.
///
/// Services left with a positive degree include those merely downstream
/// of a cycle, so walk leftover-to-leftover dependency edges until a
/// node repeats; the repeated node is a cycle member. Every leftover
/// node has at least one leftover dependency, so the walk cannot get
/// stuck before repeating.
fn find_cycle_member(
    deps: &BTreeMap<String, BTreeSet<String>>,
    indegree: &BTreeMap<&str, usize>,
) -> String {
    let leftover: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree > 0)
        .map(|(name, _)| *name)
        .collect();

    let mut seen = BTreeSet::new();
    let mut current = *leftover
        .iter()
        .next()
        .expect("at least one service remains unretired");
    while seen.insert(current) {
        current = deps[current]
            .iter()
            .map(String::as_str)
            .find(|dep| leftover.contains(dep))
            .expect("an unretired service has an unretired dependency");
    }
    current.to_string()
}
