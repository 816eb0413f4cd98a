//! Weighted feature-transition graph built from encoded rules.
//!
//! An edge `A -> B` with weight `n` means feature `B` was tested directly after
//! feature `A` in `n` rule paths. This is tree-traversal adjacency, not a causal
//! or statistical dependency.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec::Rule;
use crate::error::CodecError;
use crate::features::FeatureIndex;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub weight: u64,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, weight: u64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            weight,
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Node list and weighted edge list. Sufficient for any renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GraphExport {
    pub nodes: Vec<String>,
    pub edges: Vec<Edge>,
}

/// Directed graph whose node set is derived from its edges, plus any nodes
/// added with [`WeightedDiGraph::with_nodes`].
///
/// Edges keep first-discovery order; nodes keep first-appearance order. Both
/// orders are used as deterministic tie-breakers downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GraphExport", into = "GraphExport")]
pub struct WeightedDiGraph {
    nodes: Vec<String>,
    edges: Vec<Edge>,
}

impl WeightedDiGraph {
    /// Build from an edge list. Repeated `(from, to)` pairs are summed and
    /// zero-weight edges dropped, so every stored weight is at least 1.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = Edge>,
    {
        let mut merged: Vec<Edge> = Vec::new();
        let mut slots: HashMap<(String, String), usize> = HashMap::new();
        for edge in edges {
            if edge.weight == 0 {
                continue;
            }
            let key = (edge.from.clone(), edge.to.clone());
            match slots.get(&key) {
                Some(&i) => merged[i].weight += edge.weight,
                None => {
                    slots.insert(key, merged.len());
                    merged.push(edge);
                }
            }
        }

        let mut nodes: Vec<String> = Vec::new();
        for edge in &merged {
            for name in [&edge.from, &edge.to] {
                if !nodes.contains(name) {
                    nodes.push(name.clone());
                }
            }
        }

        Self {
            nodes,
            edges: merged,
        }
    }

    /// Add nodes that may have no incident edge. Names already present are
    /// skipped; new ones are appended in the given order.
    pub fn with_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in nodes {
            let name = name.into();
            if !self.nodes.contains(&name) {
                self.nodes.push(name);
            }
        }
        self
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// No transitions were detected.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.edges.iter().map(|e| e.weight).sum()
    }

    pub fn weight(&self, from: &str, to: &str) -> Option<u64> {
        self.edges
            .iter()
            .find(|e| e.from == from && e.to == to)
            .map(|e| e.weight)
    }

    pub fn in_degree(&self, node: &str) -> usize {
        self.edges.iter().filter(|e| e.to == node).count()
    }

    pub fn out_weight(&self, node: &str) -> u64 {
        self.edges
            .iter()
            .filter(|e| e.from == node)
            .map(|e| e.weight)
            .sum()
    }
}

impl From<GraphExport> for WeightedDiGraph {
    fn from(export: GraphExport) -> Self {
        Self::from_edges(export.edges).with_nodes(export.nodes)
    }
}

impl From<WeightedDiGraph> for GraphExport {
    fn from(graph: WeightedDiGraph) -> Self {
        GraphExport {
            nodes: graph.nodes,
            edges: graph.edges,
        }
    }
}

/// Aggregate consecutive feature pairs of every encoded rule into a graph.
///
/// Any decode error fails the whole build. Rules with fewer than two
/// conditions contribute nothing; if no rule contributes, the empty graph is
/// returned.
pub fn build<S: AsRef<str>>(
    encoded_rules: &[S],
    index: &FeatureIndex,
) -> Result<WeightedDiGraph, CodecError> {
    let mut counts: Vec<((usize, usize), u64)> = Vec::new();
    let mut slots: HashMap<(usize, usize), usize> = HashMap::new();

    for text in encoded_rules {
        let rule = Rule::parse_encoded(text.as_ref(), index)?;
        let sequence: Vec<usize> = rule.features().collect();
        tracing::debug!(rule = text.as_ref(), features = ?sequence, "extracted feature sequence");

        for pair in sequence.windows(2) {
            let key = (pair[0], pair[1]);
            match slots.get(&key) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    slots.insert(key, counts.len());
                    counts.push((key, 1));
                }
            }
        }
    }

    let mut edges = Vec::with_capacity(counts.len());
    for ((from, to), weight) in counts {
        edges.push(Edge::new(index.name_of(from)?, index.name_of(to)?, weight));
    }
    let graph = WeightedDiGraph::from_edges(edges);

    if graph.is_empty() {
        tracing::info!(rules = encoded_rules.len(), "empty graph: no feature transitions detected");
    } else {
        tracing::info!(
            rules = encoded_rules.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            total_weight = graph.total_weight(),
            "built transition graph"
        );
    }
    Ok(graph)
}

/// Number of consecutive condition pairs across the rules. Equals the total
/// edge weight of the graph built from the same rules.
pub fn transition_count<S: AsRef<str>>(
    encoded_rules: &[S],
    index: &FeatureIndex,
) -> Result<u64, CodecError> {
    encoded_rules.iter().try_fold(0u64, |acc, text| {
        let rule = Rule::parse_encoded(text.as_ref(), index)?;
        Ok(acc + rule.len().saturating_sub(1) as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_all, CONJUNCTION};
    use proptest::prelude::*;

    fn abc() -> FeatureIndex {
        FeatureIndex::fit(["A", "B", "C"])
    }

    #[test]
    fn aggregates_consecutive_pairs() {
        let index = abc();
        let rules = [
            "(A <= 1.00) AND (B <= 2.00)",
            "(A <= 1.00) AND (B <= 2.00)",
            "(B <= 2.00) AND (C > 3.00)",
        ];
        let encoded = encode_all(&rules, &index).unwrap();
        let graph = build(&encoded, &index).unwrap();

        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.weight("A", "B"), Some(2));
        assert_eq!(graph.weight("B", "C"), Some(1));
        assert_eq!(graph.nodes(), ["A", "B", "C"]);
    }

    #[test]
    fn self_pairs_are_edges() {
        let index = abc();
        let encoded = encode_all(&["(A <= 1.00) AND (A <= 0.50) AND (B > 1.00)"], &index).unwrap();
        let graph = build(&encoded, &index).unwrap();
        assert_eq!(graph.weight("A", "A"), Some(1));
        assert_eq!(graph.weight("A", "B"), Some(1));
        assert!(graph.edges()[0].is_self_loop());
    }

    #[test]
    fn single_feature_rules_give_empty_graph() {
        let index = abc();
        let encoded = encode_all(&["(A <= 1.00)", "(B > 2.00)", ""], &index).unwrap();
        let graph = build(&encoded, &index).unwrap();
        assert!(graph.is_empty());
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn isolated_features_are_not_nodes() {
        let index = abc();
        let encoded = encode_all(&["(A <= 1.00) AND (B > 2.00)", "(C > 1.00)"], &index).unwrap();
        let graph = build(&encoded, &index).unwrap();
        assert_eq!(graph.nodes(), ["A", "B"]);
    }

    #[test]
    fn decode_error_fails_whole_build() {
        let index = abc();
        let err = build(&["FEAT_0_LTE_1.00 AND FEAT_1_GT_2.00", "FEAT_7_GT_1.00"], &index).unwrap_err();
        assert!(matches!(err, CodecError::IndexOutOfRange { index: 7, .. }));
    }

    #[test]
    fn from_edges_merges_and_drops_zero() {
        let graph = WeightedDiGraph::from_edges([
            Edge::new("x", "y", 2),
            Edge::new("y", "z", 0),
            Edge::new("x", "y", 3),
        ]);
        assert_eq!(graph.edges(), [Edge::new("x", "y", 5)]);
        assert_eq!(graph.nodes(), ["x", "y"]);
    }

    #[test]
    fn degree_helpers() {
        let graph = WeightedDiGraph::from_edges([
            Edge::new("a", "b", 2),
            Edge::new("a", "c", 1),
            Edge::new("c", "b", 4),
        ]);
        assert_eq!(graph.in_degree("b"), 2);
        assert_eq!(graph.out_weight("a"), 3);
        assert_eq!(graph.total_weight(), 7);
    }

    #[test]
    fn export_round_trips_through_json() {
        let graph = WeightedDiGraph::from_edges([Edge::new("a", "b", 2), Edge::new("b", "a", 1)]);
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "nodes": ["a", "b"],
                "edges": [
                    {"from": "a", "to": "b", "weight": 2},
                    {"from": "b", "to": "a", "weight": 1},
                ]
            })
        );
        let back: WeightedDiGraph = serde_json::from_value(json).unwrap();
        assert_eq!(back, graph);
    }

    #[test]
    fn isolated_nodes_survive_json() {
        let graph = WeightedDiGraph::from_edges([Edge::new("b", "c", 1)]).with_nodes(["a", "b"]);
        assert_eq!(graph.nodes(), ["b", "c", "a"]);
        assert_eq!(graph.edge_count(), 1);

        let json = serde_json::to_string(&graph).unwrap();
        let back: WeightedDiGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);
    }

    proptest! {
        #[test]
        fn total_weight_equals_transition_count(
            rules in proptest::collection::vec(
                proptest::collection::vec((0usize..4, any::<bool>()), 0..7),
                0..20,
            )
        ) {
            let index = FeatureIndex::fit(["f0", "f1", "f2", "f3"]);
            let texts: Vec<String> = rules
                .iter()
                .map(|conds| {
                    conds
                        .iter()
                        .map(|(f, lte)| format!("(f{} {} 1.00)", f, if *lte { "<=" } else { ">" }))
                        .collect::<Vec<_>>()
                        .join(CONJUNCTION)
                })
                .collect();
            let encoded = encode_all(&texts, &index).unwrap();
            let graph = build(&encoded, &index).unwrap();
            let expected: u64 = rules.iter().map(|r| r.len().saturating_sub(1) as u64).sum();

            prop_assert_eq!(graph.total_weight(), expected);
            prop_assert_eq!(transition_count(&encoded, &index).unwrap(), expected);
            prop_assert!(graph.edges().iter().all(|e| e.weight >= 1));
        }
    }
}
