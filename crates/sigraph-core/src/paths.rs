//! Rule producer: decision paths from fitted trees.
//!
//! Trees use the flat array layout of a fitted CART tree: node `i` tests
//! `feature[i] <= threshold[i]`, going to `children_left[i]` when true and
//! `children_right[i]` otherwise. A left child of `-1` marks a leaf.

use serde::{Deserialize, Serialize};

use crate::codec::{Operator, CONJUNCTION};
use crate::error::{Error, Result};

pub const LEAF: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    /// Column index of the tested feature (ignored at leaves).
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Class distribution per node, used for leaf predictions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<Vec<f64>>,
}

impl DecisionTree {
    pub fn node_count(&self) -> usize {
        self.children_left.len()
    }

    fn is_leaf(&self, node: usize) -> bool {
        self.children_left[node] == LEAF
    }

    /// Check array shapes and child links. Children must come after their
    /// parent, which rules out cycles.
    pub fn validate(&self, feature_count: usize) -> Result<()> {
        let n = self.node_count();
        if n == 0 {
            return Err(Error::InvalidTree("tree has no nodes".into()));
        }
        if self.children_right.len() != n || self.feature.len() != n || self.threshold.len() != n {
            return Err(Error::InvalidTree(format!(
                "array lengths differ: childrenLeft={}, childrenRight={}, feature={}, threshold={}",
                n,
                self.children_right.len(),
                self.feature.len(),
                self.threshold.len()
            )));
        }
        if !self.value.is_empty() && self.value.len() != n {
            return Err(Error::InvalidTree(format!(
                "value has {} rows for {} nodes",
                self.value.len(),
                n
            )));
        }

        for node in 0..n {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF {
                if right != LEAF {
                    return Err(Error::InvalidTree(format!(
                        "node {node} has a right child but no left child"
                    )));
                }
                continue;
            }
            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    return Err(Error::InvalidTree(format!(
                        "node {node} links to invalid child {child}"
                    )));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= feature_count {
                return Err(Error::InvalidTree(format!(
                    "node {node} tests feature {feature}, but only {feature_count} features are named"
                )));
            }
            if !self.threshold[node].is_finite() {
                return Err(Error::InvalidTree(format!("node {node} has a non-finite threshold")));
            }
        }
        Ok(())
    }

    /// Every root-to-leaf rule, left branches first.
    pub fn rule_paths<'a>(&'a self, feature_names: &'a [String]) -> Result<RulePaths<'a>> {
        self.validate(feature_names.len())?;
        Ok(RulePaths {
            tree: self,
            names: feature_names,
            stack: vec![Frame {
                node: 0,
                depth: 0,
                step: None,
            }],
            prefix: Vec::new(),
        })
    }

    /// Follow one sample from the root to its leaf.
    pub fn trace(&self, sample: &[f64], feature_names: &[String]) -> Result<DecisionPath> {
        self.validate(feature_names.len())?;
        if sample.len() < feature_names.len() {
            return Err(Error::InvalidTree(format!(
                "sample has {} values for {} features",
                sample.len(),
                feature_names.len()
            )));
        }

        let mut steps = Vec::new();
        let mut node = 0usize;
        while !self.is_leaf(node) {
            let feature = self.feature[node] as usize;
            let threshold = self.threshold[node];
            let direction = if sample[feature] <= threshold {
                Direction::Left
            } else {
                Direction::Right
            };
            steps.push(PathStep {
                feature: feature_names[feature].clone(),
                threshold,
                direction,
            });
            let next = match direction {
                Direction::Left => self.children_left[node],
                Direction::Right => self.children_right[node],
            };
            node = next as usize;
        }

        Ok(DecisionPath {
            steps,
            leaf: node,
            prediction: self.value.get(node).and_then(|v| argmax(v)),
        })
    }
}

fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

fn condition(name: &str, operator: Operator, threshold: f64) -> String {
    format!("({} {} {:.2})", name, operator.symbol(), threshold)
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: usize,
    depth: usize,
    step: Option<(Operator, usize)>,
}

/// Lazy depth-first walk over a tree's rule paths. Cloning restarts from the
/// clone's current position; call [`DecisionTree::rule_paths`] again to start over.
#[derive(Debug, Clone)]
pub struct RulePaths<'a> {
    tree: &'a DecisionTree,
    names: &'a [String],
    stack: Vec<Frame>,
    prefix: Vec<String>,
}

impl Iterator for RulePaths<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while let Some(frame) = self.stack.pop() {
            self.prefix.truncate(frame.depth);
            if let Some((operator, parent)) = frame.step {
                let (tree, names) = (self.tree, self.names);
                let name = &names[tree.feature[parent] as usize];
                self.prefix
                    .push(condition(name, operator, tree.threshold[parent]));
            }

            if self.tree.is_leaf(frame.node) {
                return Some(self.prefix.join(CONJUNCTION));
            }

            let depth = self.prefix.len();
            let node = frame.node;
            // Right is pushed first so the left branch is walked first.
            self.stack.push(Frame {
                node: self.tree.children_right[node] as usize,
                depth,
                step: Some((Operator::Gt, node)),
            });
            self.stack.push(Frame {
                node: self.tree.children_left[node] as usize,
                depth,
                step: Some((Operator::Lte, node)),
            });
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub feature: String,
    pub threshold: f64,
    pub direction: Direction,
}

/// The path one sample takes through one tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPath {
    pub steps: Vec<PathStep>,
    pub leaf: usize,
    pub prediction: Option<usize>,
}

impl DecisionPath {
    /// The path in rule-producer form.
    pub fn to_rule(&self) -> String {
        self.steps
            .iter()
            .map(|s| {
                let operator = match s.direction {
                    Direction::Left => Operator::Lte,
                    Direction::Right => Operator::Gt,
                };
                condition(&s.feature, operator, s.threshold)
            })
            .collect::<Vec<_>>()
            .join(CONJUNCTION)
    }
}

/// An ensemble of trees sharing one feature naming.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Forest {
    pub trees: Vec<DecisionTree>,
}

impl Forest {
    /// Rule paths of every tree, tree by tree.
    pub fn rule_paths(&self, feature_names: &[String]) -> Result<Vec<String>> {
        let mut rules = Vec::new();
        for (i, tree) in self.trees.iter().enumerate() {
            let paths = tree.rule_paths(feature_names).map_err(|e| match e {
                Error::InvalidTree(msg) => Error::InvalidTree(format!("tree {i}: {msg}")),
                other => other,
            })?;
            rules.extend(paths);
        }
        tracing::debug!(trees = self.trees.len(), rules = rules.len(), "extracted rule paths");
        Ok(rules)
    }

    /// One decision path per tree for `sample`.
    pub fn trace(&self, sample: &[f64], feature_names: &[String]) -> Result<Vec<DecisionPath>> {
        self.trees
            .iter()
            .map(|t| t.trace(sample, feature_names))
            .collect()
    }
}
