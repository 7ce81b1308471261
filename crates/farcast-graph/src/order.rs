//! Deterministic build ordering.
//!
//! Kahn's algorithm over the unit DAG. Ties among units with no remaining
//! dependency break by stable discovery order, so repeated builds of an
//! unchanged tree always schedule identically. The sort carries its own
//! cycle check, separate from the SCC pass.

use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::cmp::Reverse;

use farcast_index::SourceIndex;

use crate::cycles::strongly_connected_components;
use crate::error::GraphError;

/// Discovery rank per unit: the smallest discovery index of its specs.
/// Units the index never saw sort last, by name.
pub fn discovery_ranks(index: &SourceIndex) -> HashMap<String, usize> {
    let mut ranks = HashMap::new();
    for iu in index.spec_units() {
        if let Some(min) = iu.unit.specs.iter().map(|s| s.discovery_index).min() {
            ranks.insert(iu.unit.name.clone(), min);
        }
    }
    ranks
}

/// Compute one total topological order, dependencies first.
pub fn topo_order(
    dag: &BTreeMap<String, BTreeSet<String>>,
    ranks: &HashMap<String, usize>,
) -> Result<Vec<String>, GraphError> {
    let mut indegree: BTreeMap<&str, usize> = dag.keys().map(|k| (k.as_str(), 0)).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (unit, deps) in dag {
        for dep in deps {
            if dag.contains_key(dep) {
                *indegree.entry(unit.as_str()).or_default() += 1;
                dependents.entry(dep.as_str()).or_default().push(unit.as_str());
            }
        }
    }

    let rank = |name: &str| -> (usize, String) {
        (
            ranks.get(name).copied().unwrap_or(usize::MAX),
            name.to_string(),
        )
    };

    let mut ready: BinaryHeap<Reverse<(usize, String)>> = indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(name, _)| Reverse(rank(name)))
        .collect();

    let mut order = Vec::with_capacity(dag.len());
    while let Some(Reverse((_, unit))) = ready.pop() {
        for dependent in dependents.get(unit.as_str()).into_iter().flatten() {
            if let Some(entry) = indegree.get_mut(dependent) {
                *entry -= 1;
                if *entry == 0 {
                    ready.push(Reverse(rank(dependent)));
                }
            }
        }
        order.push(unit);
    }

    if order.len() != dag.len() {
        // Leftover nodes form cycles; report them as chains.
        let processed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let remaining: BTreeMap<String, BTreeSet<String>> = dag
            .iter()
            .filter(|(unit, _)| !processed.contains(unit.as_str()))
            .map(|(unit, deps)| {
                (
                    unit.clone(),
                    deps.iter()
                        .filter(|d| !processed.contains(d.as_str()))
                        .cloned()
                        .collect(),
                )
            })
            .collect();
        let chains = strongly_connected_components(&remaining)
            .into_iter()
            .filter(|scc| scc.len() > 1 || remaining.get(&scc[0]).is_some_and(|d| d.contains(&scc[0])))
            .map(|mut scc| {
                let first = scc[0].clone();
                scc.push(first);
                scc
            })
            .collect();
        return Err(GraphError::Cycles { chains });
    }
    Ok(order)
}

/// Longest downstream chain per unit: the scheduler's priority heuristic.
/// Prefers nodes with the most work hanging off them.
pub fn critical_path_lengths(
    order: &[String],
    dag: &BTreeMap<String, BTreeSet<String>>,
) -> HashMap<String, usize> {
    let considered: BTreeSet<&str> = order.iter().map(String::as_str).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (unit, deps) in dag {
        if !considered.contains(unit.as_str()) {
            continue;
        }
        for dep in deps {
            if considered.contains(dep.as_str()) {
                dependents.entry(dep.as_str()).or_default().push(unit.as_str());
            }
        }
    }

    let mut lengths: HashMap<String, usize> = HashMap::new();
    // Reverse topological order: dependents are computed before their deps.
    for unit in order.iter().rev() {
        let length = dependents
            .get(unit.as_str())
            .into_iter()
            .flatten()
            .map(|d| lengths.get(*d).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        lengths.insert(unit.clone(), length);
    }
    lengths
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dag(edges: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        edges
            .iter()
            .map(|(from, tos)| {
                (
                    from.to_string(),
                    tos.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect()
    }

    fn ranks(names: &[&str]) -> HashMap<String, usize> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), i))
            .collect()
    }

    #[test]
    fn dependencies_precede_dependents() {
        let dag = dag(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let order = topo_order(&dag, &ranks(&["a", "b", "c"])).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn ties_break_by_discovery_order() {
        let dag = dag(&[("x", &[]), ("y", &[]), ("z", &[])]);
        // Discovery saw z first, then x, then y.
        let order = topo_order(&dag, &ranks(&["z", "x", "y"])).unwrap();
        assert_eq!(order, vec!["z", "x", "y"]);
    }

    #[test]
    fn cycle_is_detected_by_the_sort_itself() {
        let dag = dag(&[("d", &["e"]), ("e", &["d"]), ("a", &[])]);
        let err = topo_order(&dag, &ranks(&["a", "d", "e"])).unwrap_err();
        assert!(matches!(err, GraphError::Cycles { chains } if !chains.is_empty()));
    }

    #[test]
    fn critical_paths_prefer_long_chains() {
        let dag = dag(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["b"]),
            ("solo", &[]),
        ]);
        let order = topo_order(&dag, &ranks(&["a", "b", "c", "solo"])).unwrap();
        let lengths = critical_path_lengths(&order, &dag);
        assert_eq!(lengths["a"], 2);
        assert_eq!(lengths["b"], 1);
        assert_eq!(lengths["c"], 0);
        assert_eq!(lengths["solo"], 0);
    }

    proptest! {
        /// Any DAG built from forward-only edges yields a valid
        /// linearization: every dependency precedes its dependents.
        #[test]
        fn topo_order_is_a_valid_linearization(
            edge_bits in proptest::collection::vec(any::<bool>(), 45)
        ) {
            // 10 nodes; possible edges only from higher index to lower,
            // so the graph is acyclic by construction.
            let names: Vec<String> = (0..10).map(|i| format!("u{i}")).collect();
            let mut dag: BTreeMap<String, BTreeSet<String>> =
                names.iter().map(|n| (n.clone(), BTreeSet::new())).collect();
            let mut bit = 0;
            for hi in 0..10usize {
                for lo in 0..hi {
                    if edge_bits[bit] {
                        dag.get_mut(&names[hi]).unwrap().insert(names[lo].clone());
                    }
                    bit += 1;
                }
            }
            let ranks: HashMap<String, usize> =
                names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();
            let order = topo_order(&dag, &ranks).unwrap();
            prop_assert_eq!(order.len(), 10);
            let position: HashMap<&str, usize> =
                order.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
            for (unit, deps) in &dag {
                for dep in deps {
                    prop_assert!(position[dep.as_str()] < position[unit.as_str()]);
                }
            }
        }
    }
}
