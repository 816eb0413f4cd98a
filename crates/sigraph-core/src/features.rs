use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Fitted bijection between feature names and their integer indices.
///
/// Names are deduplicated and sorted (byte order) before indices are assigned,
/// so fitting the same name set always yields the same mapping regardless of
/// the order columns were supplied in. Rules encoded against one index must be
/// decoded against an index fitted on the same set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureIndex {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl FeatureIndex {
    pub fn fit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        let lookup = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, lookup }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Fitted names in index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index of `name`. The error's rule context is left empty for the
    /// caller to fill in.
    pub fn index_of(&self, name: &str) -> Result<usize, CodecError> {
        self.lookup
            .get(name)
            .copied()
            .ok_or_else(|| CodecError::UnknownFeature {
                rule: String::new(),
                feature: name.to_string(),
            })
    }

    pub fn name_of(&self, index: usize) -> Result<&str, CodecError> {
        self.names
            .get(index)
            .map(String::as_str)
            .ok_or(CodecError::IndexOutOfRange {
                rule: String::new(),
                index,
                count: self.names.len(),
            })
    }
}

impl From<Vec<String>> for FeatureIndex {
    fn from(names: Vec<String>) -> Self {
        Self::fit(names)
    }
}

impl From<FeatureIndex> for Vec<String> {
    fn from(index: FeatureIndex) -> Self {
        index.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_sorted_order() {
        let index = FeatureIndex::fit(["mean radius", "age", "BMI"]);
        assert_eq!(index.names(), ["BMI", "age", "mean radius"]);
        assert_eq!(index.index_of("BMI").unwrap(), 0);
        assert_eq!(index.index_of("age").unwrap(), 1);
        assert_eq!(index.name_of(2).unwrap(), "mean radius");
    }

    #[test]
    fn fit_is_order_independent() {
        let a = FeatureIndex::fit(["c", "a", "b"]);
        let b = FeatureIndex::fit(["b", "c", "a"]);
        assert_eq!(a, b);
    }

    #[test]
    fn duplicates_collapse() {
        let index = FeatureIndex::fit(["x", "y", "x"]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn unknown_name_and_index() {
        let index = FeatureIndex::fit(["a"]);
        assert!(matches!(
            index.index_of("b"),
            Err(CodecError::UnknownFeature { .. })
        ));
        assert!(matches!(
            index.name_of(1),
            Err(CodecError::IndexOutOfRange { index: 1, count: 1, .. })
        ));
    }

    #[test]
    fn serializes_as_name_list() {
        let index = FeatureIndex::fit(["b", "a"]);
        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
        let back: FeatureIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
    }
}
