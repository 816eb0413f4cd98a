//! Cardinality-constrained edge selection.
//!
//! Choose at most `max_edges` edges maximizing their total weight. Each edge is
//! either fully in or out; nothing else constrains the choice, so the selected
//! edges need not be acyclic or connected.
//!
//! With only a count constraint the optimum is the `max_edges` heaviest edges,
//! which [`Strategy::TopK`] computes directly. [`Strategy::IntegerProgram`]
//! states the same problem as a 0/1 program for `good_lp`, where structural
//! constraints can be added later; its answer is checked against the
//! closed-form optimum.

use std::cmp::Reverse;

use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use serde::{Deserialize, Serialize};

use crate::graph::{Edge, WeightedDiGraph};

pub const DEFAULT_MAX_EDGES: usize = 20;
pub const DEFAULT_MAX_VARIABLES: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Heaviest edges first, ties by discovery order.
    #[default]
    TopK,
    /// 0/1 integer program solved with `good_lp`.
    IntegerProgram,
}

impl Strategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "topK" | "top_k" | "topk" => Some(Strategy::TopK),
            "integerProgram" | "integer_program" | "ip" | "milp" => Some(Strategy::IntegerProgram),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectionConfig {
    pub max_edges: usize,
    pub strategy: Strategy,
    /// Refuse to build an integer program with more variables than this.
    /// Checked before solving; once started, a solve runs to completion with
    /// no time or iteration limit.
    pub max_variables: Option<usize>,
}

impl SelectionConfig {
    pub fn new(max_edges: usize) -> Self {
        Self {
            max_edges,
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_edges: DEFAULT_MAX_EDGES,
            strategy: Strategy::TopK,
            max_variables: Some(DEFAULT_MAX_VARIABLES),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SolverStatus {
    Optimal,
    Infeasible,
    Unbounded,
    NotSolved,
}

/// Outcome of a selection. Only an `Optimal` result carries edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    pub status: SolverStatus,
    pub edges: Vec<Edge>,
    pub total_weight: u64,
    pub max_edges: usize,
}

impl SelectionResult {
    fn optimal(edges: Vec<Edge>, max_edges: usize) -> Self {
        Self {
            status: SolverStatus::Optimal,
            total_weight: edges.iter().map(|e| e.weight).sum(),
            edges,
            max_edges,
        }
    }

    fn unusable(status: SolverStatus, max_edges: usize) -> Self {
        Self {
            status,
            edges: Vec::new(),
            total_weight: 0,
            max_edges,
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolverStatus::Optimal
    }

    /// The surrogate graph, only when the selection is optimal.
    pub fn graph(&self) -> Option<WeightedDiGraph> {
        self.is_optimal()
            .then(|| WeightedDiGraph::from_edges(self.edges.iter().cloned()))
    }
}

/// Select at most `config.max_edges` edges of `graph` with maximum total weight.
pub fn select(graph: &WeightedDiGraph, config: &SelectionConfig) -> SelectionResult {
    let edges = graph.edges();
    let k = config.max_edges;

    if edges.is_empty() {
        tracing::info!("empty graph: nothing to select");
        return SelectionResult::optimal(Vec::new(), k);
    }

    let result = match config.strategy {
        Strategy::TopK => SelectionResult::optimal(pick(edges, &heaviest(edges, k)), k),
        Strategy::IntegerProgram => solve_integer_program(edges, config),
    };

    if result.is_optimal() {
        tracing::info!(
            selected = result.edges.len(),
            available = edges.len(),
            max_edges = k,
            total_weight = result.total_weight,
            "selected edges"
        );
    } else {
        tracing::warn!(status = ?result.status, max_edges = k, "edge selection not optimal");
    }
    result
}

/// Indices of the `k` heaviest edges, ties by discovery order.
fn heaviest(edges: &[Edge], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..edges.len()).collect();
    order.sort_by_key(|&i| Reverse(edges[i].weight));
    order.truncate(k);
    order
}

/// Edges at `indices`, heaviest first, ties by discovery order.
fn pick(edges: &[Edge], indices: &[usize]) -> Vec<Edge> {
    let mut indices = indices.to_vec();
    indices.sort_by_key(|&i| (Reverse(edges[i].weight), i));
    indices.into_iter().map(|i| edges[i].clone()).collect()
}

fn solve_integer_program(edges: &[Edge], config: &SelectionConfig) -> SelectionResult {
    let k = config.max_edges;
    if let Some(budget) = config.max_variables {
        if edges.len() > budget {
            tracing::warn!(variables = edges.len(), budget, "integer program exceeds variable budget");
            return SelectionResult::unusable(SolverStatus::NotSolved, k);
        }
    }

    let mut vars = ProblemVariables::new();
    let picks: Vec<Variable> = edges.iter().map(|_| vars.add(variable().binary())).collect();
    let objective: Expression = picks
        .iter()
        .zip(edges)
        .map(|(&x, e)| x * (e.weight as f64))
        .sum();
    let count: Expression = picks.iter().copied().sum();
    let bound = k as f64;

    let solution = vars
        .maximise(objective)
        .using(microlp)
        .with(constraint!(count <= bound))
        .solve();

    let solution = match solution {
        Ok(solution) => solution,
        Err(e) => {
            let status = match e {
                ResolutionError::Infeasible => SolverStatus::Infeasible,
                ResolutionError::Unbounded => SolverStatus::Unbounded,
                _ => SolverStatus::NotSolved,
            };
            tracing::warn!(error = %e, "integer program failed");
            return SelectionResult::unusable(status, k);
        }
    };

    let chosen: Vec<usize> = picks
        .iter()
        .enumerate()
        .filter(|&(_, &x)| solution.value(x) > 0.5)
        .map(|(i, _)| i)
        .collect();

    let expected: u64 = heaviest(edges, k).iter().map(|&i| edges[i].weight).sum();
    let achieved: u64 = chosen.iter().map(|&i| edges[i].weight).sum();
    if chosen.len() > k || achieved != expected {
        tracing::warn!(
            chosen = chosen.len(),
            achieved,
            expected,
            "integer program disagrees with closed-form optimum"
        );
        return SelectionResult::unusable(SolverStatus::NotSolved, k);
    }

    SelectionResult::optimal(pick(edges, &chosen), k)
}
