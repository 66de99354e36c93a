//! Dependency ordering for catalog descriptors.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::error::ConfigError;

use super::descriptor::ResourceDescriptor;

/// Returns descriptor indices in forward dependency order.
///
/// Kahn's algorithm with a min-heap on declaration index: among the ready
/// nodes the one declared first always goes next, so the order depends only
/// on the catalog contents.
///
/// # Errors
///
/// Returns an error for an unknown dependency, a self-dependency or a cycle.
/// Cycle errors name the path, e.g. `a -> b -> a`.
pub fn topological_order(descriptors: &[ResourceDescriptor]) -> Result<Vec<usize>, ConfigError> {
    let index: HashMap<&str, usize> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| (d.logical_name.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; descriptors.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];

    for (i, descriptor) in descriptors.iter().enumerate() {
        for dep in &descriptor.depends_on {
            let &d = index
                .get(dep.as_str())
                .ok_or_else(|| ConfigError::UnknownDependency {
                    resource: descriptor.logical_name.clone(),
                    dependency: dep.clone(),
                })?;
            if d == i {
                return Err(ConfigError::CircularDependency {
                    cycle: format!("{dep} -> {dep}"),
                });
            }
            in_degree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(descriptors.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() < descriptors.len() {
        return Err(ConfigError::CircularDependency {
            cycle: find_cycle(descriptors, &index, &in_degree),
        });
    }

    Ok(order)
}

/// Walks dependency edges among the unresolved nodes until one repeats.
fn find_cycle(
    descriptors: &[ResourceDescriptor],
    index: &HashMap<&str, usize>,
    in_degree: &[usize],
) -> String {
    let Some(start) = in_degree.iter().position(|deg| *deg > 0) else {
        return String::from("unknown");
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        // Every unresolved node has at least one unresolved dependency.
        let next = descriptors[current]
            .depends_on
            .iter()
            .filter_map(|dep| index.get(dep.as_str()).copied())
            .find(|&d| in_degree[d] > 0);

        let Some(next) = next else {
            break;
        };

        if let Some(pos) = path.iter().position(|&p| p == next) {
            // Dependencies point backwards; print in creation order.
            let mut cycle: Vec<&str> = path[pos..]
                .iter()
                .rev()
                .map(|&i| descriptors[i].logical_name.as_str())
                .collect();
            cycle.push(cycle[0]);
            return cycle.join(" -> ");
        }

        path.push(next);
        current = next;
    }

    path.iter()
        .map(|&i| descriptors[i].logical_name.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceKind;

    fn node(name: &str, deps: &[&str]) -> ResourceDescriptor {
        deps.iter().fold(
            ResourceDescriptor::new(name, ResourceKind::Network, "{name}").unwrap(),
            |d, dep| d.depends_on(*dep),
        )
    }

    fn names(descriptors: &[ResourceDescriptor], order: &[usize]) -> Vec<String> {
        order
            .iter()
            .map(|&i| descriptors[i].logical_name.clone())
            .collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let d = vec![
            node("vm", &["subnet"]),
            node("subnet", &["network"]),
            node("network", &[]),
        ];
        let order = topological_order(&d).unwrap();
        assert_eq!(names(&d, &order), vec!["network", "subnet", "vm"]);
    }

    #[test]
    fn test_independent_nodes_keep_declaration_order() {
        let d = vec![
            node("b", &[]),
            node("a", &[]),
            node("c", &["a"]),
            node("d", &[]),
        ];
        let order = topological_order(&d).unwrap();
        assert_eq!(names(&d, &order), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_cycle_is_named() {
        let d = vec![node("a", &["b"]), node("b", &["a"]), node("c", &[])];
        let err = topological_order(&d).unwrap_err();
        match err {
            ConfigError::CircularDependency { cycle } => {
                assert!(cycle == "a -> b -> a" || cycle == "b -> a -> b", "{cycle}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency() {
        let d = vec![node("a", &["a"])];
        assert!(matches!(
            topological_order(&d),
            Err(ConfigError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let d = vec![node("a", &["ghost"])];
        assert!(matches!(
            topological_order(&d),
            Err(ConfigError::UnknownDependency { .. })
        ));
    }
}
