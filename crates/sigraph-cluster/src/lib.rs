pub mod linkage;
pub mod vectorize;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CLUSTERS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Vectorizer {
    /// Raw token counts.
    #[default]
    Count,
    /// Smooth idf weighted, L2 normalized counts.
    Tfidf,
}

impl std::str::FromStr for Vectorizer {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "count" | "countvectorizer" => Ok(Self::Count),
            "tfidf" | "tf-idf" | "tfidfvectorizer" => Ok(Self::Tfidf),
            _ => Err(ClusterError::UnknownVectorizer(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ClusterError {
    #[error("cluster count must be at least 1")]
    ZeroClusters,
    #[error("unknown vectorizer '{0}' (expected 'count' or 'tfidf')")]
    UnknownVectorizer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterConfig {
    pub n_clusters: usize,
    pub vectorizer: Vectorizer,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            n_clusters: DEFAULT_CLUSTERS,
            vectorizer: Vectorizer::Count,
        }
    }
}

/// Flat clustering of a rule list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Clustering {
    /// Cluster label for each input rule, in input order.
    pub labels: Vec<usize>,
    /// Rules grouped by label, each group in input order.
    pub groups: Vec<Vec<String>>,
}

impl Clustering {
    /// The first `per_group` rules of every group.
    pub fn preview(&self, per_group: usize) -> Vec<Vec<&str>> {
        self.groups
            .iter()
            .map(|g| g.iter().take(per_group).map(String::as_str).collect())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Group rules by text similarity.
///
/// Works on either readable or encoded rules. Asking for more clusters than
/// there are rules gives one cluster per rule.
pub fn cluster_rules<S: AsRef<str>>(
    rules: &[S],
    config: &ClusterConfig,
) -> Result<Clustering, ClusterError> {
    if config.n_clusters == 0 {
        return Err(ClusterError::ZeroClusters);
    }

    let n = rules.len();
    let matrix = vectorize::vectorize(rules, config.vectorizer);
    let dist: Vec<Vec<f64>> = matrix
        .rows
        .iter()
        .map(|a| {
            matrix
                .rows
                .iter()
                .map(|b| vectorize::cosine_distance(a, b))
                .collect()
        })
        .collect();

    let merges = linkage::dendrogram(dist);
    let labels = linkage::cut(n, &merges, config.n_clusters.min(n));

    let count = labels.iter().max().map_or(0, |m| m + 1);
    let mut groups = vec![Vec::new(); count];
    for (rule, &label) in rules.iter().zip(&labels) {
        groups[label].push(rule.as_ref().to_string());
    }

    tracing::info!(rules = n, clusters = count, "clustered rules");
    Ok(Clustering { labels, groups })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RULES: [&str; 6] = [
        "FEAT_0_LTE_1.00 AND FEAT_1_GT_2.00",
        "FEAT_5_GT_7.25 AND FEAT_6_LTE_0.10",
        "FEAT_0_LTE_1.00 AND FEAT_1_GT_2.00 AND FEAT_2_GT_3.00",
        "FEAT_5_GT_7.25 AND FEAT_6_LTE_0.10 AND FEAT_7_GT_1.75",
        "FEAT_0_LTE_1.00",
        "FEAT_5_GT_7.25",
    ];

    #[test]
    fn separates_two_families() {
        for vectorizer in [Vectorizer::Count, Vectorizer::Tfidf] {
            let config = ClusterConfig {
                n_clusters: 2,
                vectorizer,
            };
            let c = cluster_rules(&RULES, &config).unwrap();
            assert_eq!(c.labels, [0, 1, 0, 1, 0, 1], "{vectorizer:?}");
            assert_eq!(c.groups[0][0], RULES[0]);
            assert_eq!(c.groups[1].len(), 3);
        }
    }

    #[test]
    fn more_clusters_than_rules_is_clamped() {
        let config = ClusterConfig {
            n_clusters: 10,
            ..ClusterConfig::default()
        };
        let c = cluster_rules(&RULES[..3], &config).unwrap();
        assert_eq!(c.labels, [0, 1, 2]);
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn zero_clusters_is_rejected() {
        let config = ClusterConfig {
            n_clusters: 0,
            ..ClusterConfig::default()
        };
        assert_eq!(
            cluster_rules(&RULES, &config),
            Err(ClusterError::ZeroClusters)
        );
    }

    #[test]
    fn empty_input_gives_empty_clustering() {
        let c = cluster_rules::<&str>(&[], &ClusterConfig::default()).unwrap();
        assert!(c.is_empty());
        assert!(c.labels.is_empty());
    }

    #[test]
    fn preview_truncates_groups() {
        let config = ClusterConfig {
            n_clusters: 2,
            ..ClusterConfig::default()
        };
        let c = cluster_rules(&RULES, &config).unwrap();
        let preview = c.preview(2);
        assert_eq!(preview[0], [RULES[0], RULES[2]]);
        assert_eq!(preview[1], [RULES[1], RULES[3]]);
    }

    #[test]
    fn vectorizer_names() {
        assert_eq!("count".parse::<Vectorizer>(), Ok(Vectorizer::Count));
        assert_eq!("TfidfVectorizer".parse::<Vectorizer>(), Ok(Vectorizer::Tfidf));
        assert!(matches!(
            "bag".parse::<Vectorizer>(),
            Err(ClusterError::UnknownVectorizer(_))
        ));
    }

    proptest! {
        #[test]
        fn labels_are_dense_and_bounded(
            rules in proptest::collection::vec("[a-d]{2}( [a-d]{2}){0,3}", 1..12),
            k in 1usize..6,
        ) {
            let config = ClusterConfig { n_clusters: k, vectorizer: Vectorizer::Count };
            let c = cluster_rules(&rules, &config).unwrap();
            prop_assert_eq!(c.labels.len(), rules.len());
            prop_assert_eq!(c.len(), k.min(rules.len()));
            // first appearance numbering
            let mut seen = 0;
            for &l in &c.labels {
                prop_assert!(l <= seen);
                if l == seen { seen += 1; }
            }
            prop_assert_eq!(c.groups.iter().map(Vec::len).sum::<usize>(), rules.len());
        }
    }
}
