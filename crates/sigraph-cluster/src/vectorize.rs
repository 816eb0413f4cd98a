use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::Vectorizer;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("Invalid token regex"));

/// Lowercased word tokens of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Document-term matrix over a sorted vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct TermMatrix {
    pub vocabulary: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

pub fn vectorize<S: AsRef<str>>(docs: &[S], kind: Vectorizer) -> TermMatrix {
    let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d.as_ref())).collect();

    let mut columns: BTreeMap<&str, usize> = BTreeMap::new();
    for tokens in &tokenized {
        for t in tokens {
            columns.entry(t.as_str()).or_insert(0);
        }
    }
    for (i, col) in columns.values_mut().enumerate() {
        *col = i;
    }

    let width = columns.len();
    let mut rows: Vec<Vec<f64>> = tokenized
        .iter()
        .map(|tokens| {
            let mut row = vec![0.0; width];
            for t in tokens {
                row[columns[t.as_str()]] += 1.0;
            }
            row
        })
        .collect();

    if kind == Vectorizer::Tfidf {
        apply_tfidf(&mut rows, width);
    }

    tracing::debug!(docs = rows.len(), vocabulary = width, ?kind, "vectorized rules");
    TermMatrix {
        vocabulary: columns.keys().map(|k| k.to_string()).collect(),
        rows,
    }
}

/// Smooth idf weighting followed by L2 row normalization.
fn apply_tfidf(rows: &mut [Vec<f64>], width: usize) {
    let n = rows.len() as f64;
    let idf: Vec<f64> = (0..width)
        .map(|col| {
            let df = rows.iter().filter(|r| r[col] > 0.0).count() as f64;
            ((1.0 + n) / (1.0 + df)).ln() + 1.0
        })
        .collect();

    for row in rows.iter_mut() {
        for (x, w) in row.iter_mut().zip(&idf) {
            *x *= w;
        }
        let norm = row.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|x| *x /= norm);
        }
    }
}

/// Cosine distance; a zero vector is at distance 1 from everything.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (na * nb)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_splits_encoded_rules() {
        assert_eq!(
            tokenize("FEAT_0_LTE_1.00 AND FEAT_3_GT_-2.50"),
            ["feat_0_lte_1", "00", "and", "feat_3_gt_", "50"]
        );
    }

    #[test]
    fn single_characters_are_dropped() {
        assert_eq!(tokenize("(a <= 1) b cc"), ["cc"]);
    }

    #[test]
    fn counts_over_sorted_vocabulary() {
        let m = vectorize(&["beta alpha alpha", "gamma"], Vectorizer::Count);
        assert_eq!(m.vocabulary, ["alpha", "beta", "gamma"]);
        assert_eq!(m.rows, vec![vec![2.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]]);
    }

    #[test]
    fn tfidf_rows_are_unit_length() {
        let m = vectorize(&["aa bb", "aa cc", "dd"], Vectorizer::Tfidf);
        for row in &m.rows {
            let norm: f64 = row.iter().map(|x| x * x).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
        }
        // "aa" appears in two documents, so it weighs less than "bb"
        assert!(m.rows[0][0] < m.rows[0][1]);
    }

    #[test]
    fn empty_document_is_zero_row() {
        let m = vectorize(&["aa", ""], Vectorizer::Tfidf);
        assert_eq!(m.rows[1], vec![0.0]);
        assert_eq!(cosine_distance(&m.rows[0], &m.rows[1]), 1.0);
    }

    #[test]
    fn cosine_distance_bounds() {
        assert_eq!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]), 0.0);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 3.0]) - 1.0).abs() < 1e-12);
    }
}
