//! Maximum-weight spanning arborescence of a transition graph.
//!
//! Weights are negated and a minimum spanning arborescence is found with
//! Chu-Liu/Edmonds cycle contraction. The root is chosen inside the same
//! optimization: a virtual super-root reaches every node through an arc that
//! costs more than the whole graph, so the optimum opens as few roots as
//! possible and, among those, keeps the heaviest edges.

use serde::Serialize;

use crate::graph::{Edge, WeightedDiGraph};

pub const NO_TRANSITIONS: &str = "no transitions detected";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Simplified {
    /// The input graph had no edges; nothing to simplify.
    NoTransitions,
    /// Every non-root node has exactly one incoming edge.
    Arborescence { root: String, tree: WeightedDiGraph },
    /// No single node reaches all others. Each tree of the forest has its own root.
    Branching {
        roots: Vec<String>,
        forest: WeightedDiGraph,
    },
}

impl Simplified {
    pub fn graph(&self) -> Option<&WeightedDiGraph> {
        match self {
            Simplified::NoTransitions => None,
            Simplified::Arborescence { tree, .. } => Some(tree),
            Simplified::Branching { forest, .. } => Some(forest),
        }
    }

    pub fn roots(&self) -> Vec<&str> {
        match self {
            Simplified::NoTransitions => Vec::new(),
            Simplified::Arborescence { root, .. } => vec![root.as_str()],
            Simplified::Branching { roots, .. } => roots.iter().map(String::as_str).collect(),
        }
    }

    pub fn diagnostic(&self) -> Option<&'static str> {
        match self {
            Simplified::NoTransitions => Some(NO_TRANSITIONS),
            _ => None,
        }
    }
}

/// Maximum-weight spanning arborescence (or branching) of `graph`.
pub fn simplify(graph: &WeightedDiGraph) -> Simplified {
    if graph.is_empty() {
        tracing::info!("{}", NO_TRANSITIONS);
        return Simplified::NoTransitions;
    }

    let nodes = graph.nodes();
    let position = |name: &str| nodes.iter().position(|n| n == name);
    let virtual_root = nodes.len();
    let penalty = i128::from(graph.total_weight()) + 1;

    let mut arcs: Vec<Arc> = Vec::with_capacity(graph.edge_count() + nodes.len());
    for edge in graph.edges() {
        if let (Some(from), Some(to)) = (position(edge.from.as_str()), position(edge.to.as_str())) {
            arcs.push(Arc {
                from,
                to,
                cost: -i128::from(edge.weight),
            });
        }
    }
    let real_arcs = arcs.len();
    for node in 0..nodes.len() {
        arcs.push(Arc {
            from: virtual_root,
            to: node,
            cost: penalty,
        });
    }

    // Every node is reachable from the virtual root, so this always succeeds.
    let chosen = min_arborescence(nodes.len() + 1, virtual_root, &arcs).unwrap_or_default();

    let mut roots = Vec::new();
    let mut kept = Vec::new();
    for i in chosen {
        if i >= real_arcs {
            roots.push(arcs[i].to);
        } else {
            kept.push(i);
        }
    }
    roots.sort_unstable();
    kept.sort_unstable();

    let mut roots: Vec<String> = roots.into_iter().map(|r| nodes[r].clone()).collect();
    // Roots whose only edges were self loops still belong to the result.
    let tree = WeightedDiGraph::from_edges(
        kept.iter()
            .map(|&i| &graph.edges()[i])
            .map(|e| Edge::new(e.from.clone(), e.to.clone(), e.weight)),
    )
    .with_nodes(roots.iter().cloned());

    let kind = if roots.len() == 1 { "arborescence" } else { "branching" };
    tracing::info!(
        kind,
        roots = roots.len(),
        edges = tree.edge_count(),
        total_weight = tree.total_weight(),
        "simplified transition graph"
    );

    if roots.len() == 1 {
        Simplified::Arborescence {
            root: roots.remove(0),
            tree,
        }
    } else {
        Simplified::Branching {
            roots,
            forest: tree,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Arc {
    from: usize,
    to: usize,
    cost: i128,
}

/// Chu-Liu/Edmonds. Returns indices into `arcs` forming a minimum-cost
/// arborescence rooted at `root`, or `None` if some node is unreachable.
fn min_arborescence(node_count: usize, root: usize, arcs: &[Arc]) -> Option<Vec<usize>> {
    // Cheapest incoming arc per node; earliest arc wins ties.
    let mut best: Vec<Option<usize>> = vec![None; node_count];
    for (i, arc) in arcs.iter().enumerate() {
        if arc.from == arc.to || arc.to == root {
            continue;
        }
        match best[arc.to] {
            Some(j) if arcs[j].cost <= arc.cost => {}
            _ => best[arc.to] = Some(i),
        }
    }

    let mut parent = vec![usize::MAX; node_count];
    let mut best_cost = vec![0i128; node_count];
    for v in 0..node_count {
        if v == root {
            continue;
        }
        let i = best[v]?;
        parent[v] = arcs[i].from;
        best_cost[v] = arcs[i].cost;
    }

    let Some(cycle) = find_cycle(root, &parent) else {
        return Some(best.into_iter().flatten().collect());
    };

    // Contract the cycle into one node and reprice arcs entering it.
    let mut in_cycle = vec![false; node_count];
    for &v in &cycle {
        in_cycle[v] = true;
    }
    let mut component = vec![0usize; node_count];
    let mut next = 0;
    for v in 0..node_count {
        if !in_cycle[v] {
            component[v] = next;
            next += 1;
        }
    }
    let contracted_node = next;
    for &v in &cycle {
        component[v] = contracted_node;
    }

    let mut contracted = Vec::new();
    let mut origin = Vec::new();
    for (i, arc) in arcs.iter().enumerate() {
        let (from, to) = (component[arc.from], component[arc.to]);
        if from == to {
            continue;
        }
        let cost = if in_cycle[arc.to] {
            arc.cost - best_cost[arc.to]
        } else {
            arc.cost
        };
        contracted.push(Arc { from, to, cost });
        origin.push(i);
    }

    let picked = min_arborescence(contracted_node + 1, component[root], &contracted)?;
    let mut result: Vec<usize> = picked.into_iter().map(|j| origin[j]).collect();

    // Exactly one picked arc enters the cycle; it replaces the cycle arc into its head.
    let entry = result.iter().map(|&i| arcs[i].to).find(|&v| in_cycle[v])?;
    for &v in &cycle {
        if v != entry {
            result.extend(best[v]);
        }
    }
    Some(result)
}

/// A cycle in the parent pointers, if any.
fn find_cycle(root: usize, parent: &[usize]) -> Option<Vec<usize>> {
    const UNSEEN: usize = usize::MAX;
    let mut visited_by = vec![UNSEEN; parent.len()];

    for start in 0..parent.len() {
        let mut v = start;
        while v != root && visited_by[v] == UNSEEN {
            visited_by[v] = start;
            v = parent[v];
        }
        if v != root && visited_by[v] == start {
            let mut cycle = vec![v];
            let mut u = parent[v];
            while u != v {
                cycle.push(u);
                u = parent[u];
            }
            return Some(cycle);
        }
    }
    None
}
