//! Cycle detection, run before any scheduling.
//!
//! Strongly-connected components over the unit DAG, independent of the
//! topological sort's own check, so that every distinct cycle is reported
//! in one pass. Spec-level self-loops surface as one-node cycles.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::error::GraphError;
use crate::graph::SpecGraph;

/// Find every distinct cycle. Returns chains ending where they start
/// (`d -> e -> d`); empty means the graph is buildable.
pub fn find_cycles(graph: &SpecGraph) -> Vec<Vec<String>> {
    let mut chains: Vec<Vec<String>> = Vec::new();

    // Spec-level self-loops are one-node cycles.
    for (spec_ref, deps) in graph.deps() {
        if deps.contains(spec_ref) {
            chains.push(vec![spec_ref.to_string(), spec_ref.to_string()]);
        }
    }

    let dag = graph.unit_dag();
    for scc in strongly_connected_components(&dag) {
        if scc.len() > 1 {
            chains.push(cycle_chain(&scc, &dag));
        }
    }
    chains
}

/// Validate acyclicity; any cycle is fatal for the whole build.
pub fn ensure_acyclic(graph: &SpecGraph) -> Result<(), GraphError> {
    let chains = find_cycles(graph);
    if chains.is_empty() {
        Ok(())
    } else {
        Err(GraphError::Cycles { chains })
    }
}

/// Iterative Tarjan over a name-keyed adjacency map.
pub(crate) fn strongly_connected_components(
    dag: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<Vec<String>> {
    const UNVISITED: usize = usize::MAX;

    // Stable node numbering: sorted names.
    let mut names: BTreeSet<&str> = dag.keys().map(String::as_str).collect();
    for deps in dag.values() {
        names.extend(deps.iter().map(String::as_str));
    }
    let names: Vec<&str> = names.into_iter().collect();
    let id_of: BTreeMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    let adjacency: Vec<Vec<usize>> = names
        .iter()
        .map(|name| {
            dag.get(*name)
                .map(|deps| {
                    deps.iter()
                        .filter_map(|d| id_of.get(d.as_str()).copied())
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    let n = names.len();
    let mut order = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut counter = 0usize;
    let mut components = Vec::new();

    struct Frame {
        node: usize,
        next_edge: usize,
    }

    for start in 0..n {
        if order[start] != UNVISITED {
            continue;
        }
        let mut frames = vec![Frame {
            node: start,
            next_edge: 0,
        }];
        while let Some(frame) = frames.last_mut() {
            let v = frame.node;
            if frame.next_edge == 0 {
                order[v] = counter;
                lowlink[v] = counter;
                counter += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            if frame.next_edge < adjacency[v].len() {
                let w = adjacency[v][frame.next_edge];
                frame.next_edge += 1;
                if order[w] == UNVISITED {
                    frames.push(Frame {
                        node: w,
                        next_edge: 0,
                    });
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(order[w]);
                }
                continue;
            }
            frames.pop();
            if let Some(parent) = frames.last() {
                lowlink[parent.node] = lowlink[parent.node].min(lowlink[v]);
            }
            if lowlink[v] == order[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(names[w].to_string());
                    if w == v {
                        break;
                    }
                }
                component.sort();
                components.push(component);
            }
        }
    }
    components
}

/// Render one concrete cycle path inside an SCC, starting from its
/// smallest member for determinism.
fn cycle_chain(scc: &[String], dag: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    let members: BTreeSet<&str> = scc.iter().map(String::as_str).collect();
    let start = scc[0].as_str();
    let mut chain = vec![start.to_string()];
    let mut current = start;
    loop {
        let next = dag
            .get(current)
            .and_then(|deps| deps.iter().find(|d| members.contains(d.as_str())));
        let Some(next) = next else {
            // Degenerate SCC data; close the chain where it stands.
            chain.push(start.to_string());
            return chain;
        };
        if next == start || chain.iter().any(|c| c == next) {
            chain.push(next.clone());
            return chain;
        }
        chain.push(next.clone());
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn acyclic_graph_has_single_node_components_only() {
        let dag = dag(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
        let sccs = strongly_connected_components(&dag);
        assert_eq!(sccs.len(), 3);
        assert!(sccs.iter().all(|scc| scc.len() == 1));
    }

    #[test]
    fn two_node_cycle_is_one_component() {
        let dag = dag(&[("d", &["e"]), ("e", &["d"])]);
        let sccs = strongly_connected_components(&dag);
        let cyclic: Vec<_> = sccs.into_iter().filter(|s| s.len() > 1).collect();
        assert_eq!(cyclic, vec![vec!["d".to_string(), "e".to_string()]]);
    }

    #[test]
    fn reports_every_independent_cycle() {
        let dag = dag(&[
            ("a", &["b"]),
            ("b", &["a"]),
            ("x", &["y"]),
            ("y", &["z"]),
            ("z", &["x"]),
            ("solo", &[]),
        ]);
        let sccs = strongly_connected_components(&dag);
        let cyclic: Vec<_> = sccs.into_iter().filter(|s| s.len() > 1).collect();
        assert_eq!(cyclic.len(), 2);
    }

    #[test]
    fn chain_walks_back_to_start() {
        let graph = dag(&[("d", &["e"]), ("e", &["d"])]);
        let chain = cycle_chain(&["d".to_string(), "e".to_string()], &graph);
        assert_eq!(chain, vec!["d", "e", "d"]);
    }
}
