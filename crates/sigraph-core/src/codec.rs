//! Reversible structural encoding of decision-path rules.
//!
//! A rule such as `(mean radius <= 15.05) AND (age > 42.50)` becomes
//! `FEAT_3_LTE_15.05 AND FEAT_0_GT_42.50`, where the numbers are indices from a
//! fitted [`FeatureIndex`]. Thresholds are always written with two decimals, so
//! a round trip is exact for names and operators but only approximate for
//! thresholds.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::features::FeatureIndex;

/// Separator between conditions, in both the readable and encoded forms.
pub const CONJUNCTION: &str = " AND ";

const TOKEN_PREFIX: &str = "FEAT_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Lte,
    Gt,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Lte => "<=",
            Operator::Gt => ">",
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Operator::Lte => "LTE",
            Operator::Gt => "GT",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "LTE" => Some(Operator::Lte),
            "GT" => Some(Operator::Gt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub feature: usize,
    pub operator: Operator,
    pub threshold: f64,
}

impl Condition {
    /// `FEAT_<index>_<OP>_<threshold>`
    pub fn token(&self) -> String {
        format!(
            "{}{}_{}_{:.2}",
            TOKEN_PREFIX,
            self.feature,
            self.operator.tag(),
            self.threshold
        )
    }

    /// `(<name> <= <threshold>)`
    pub fn render(&self, index: &FeatureIndex) -> Result<String, CodecError> {
        let name = index.name_of(self.feature)?;
        Ok(format!(
            "({} {} {:.2})",
            name,
            self.operator.symbol(),
            self.threshold
        ))
    }
}

/// One root-to-leaf decision path. Condition order is traversal order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub conditions: Vec<Condition>,
}

impl Rule {
    /// Parse a readable rule. Errors carry `text` as their rule context.
    pub fn parse(text: &str, index: &FeatureIndex) -> Result<Self, CodecError> {
        let conditions = components(text)
            .map(|c| parse_condition(c, index))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.with_rule(text))?;
        Ok(Self { conditions })
    }

    /// Parse an encoded rule. Errors carry `text` as their rule context.
    pub fn parse_encoded(text: &str, index: &FeatureIndex) -> Result<Self, CodecError> {
        let conditions = components(text)
            .map(|t| parse_token(t, index))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.with_rule(text))?;
        Ok(Self { conditions })
    }

    pub fn encode(&self) -> String {
        self.conditions
            .iter()
            .map(Condition::token)
            .collect::<Vec<_>>()
            .join(CONJUNCTION)
    }

    pub fn render(&self, index: &FeatureIndex) -> Result<String, CodecError> {
        let parts = self
            .conditions
            .iter()
            .map(|c| c.render(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(CONJUNCTION))
    }

    /// Feature indices in the order the path tests them.
    pub fn features(&self) -> impl Iterator<Item = usize> + '_ {
        self.conditions.iter().map(|c| c.feature)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A leaf-only tree produces an empty rule, which has no components.
fn components(text: &str) -> impl Iterator<Item = &str> {
    let text = if text.trim().is_empty() { "" } else { text };
    text.split(CONJUNCTION).filter(|c| !c.is_empty())
}

fn parse_condition(component: &str, index: &FeatureIndex) -> Result<Condition, CodecError> {
    let malformed = || CodecError::MalformedCondition {
        rule: String::new(),
        condition: component.to_string(),
    };

    let trimmed = component.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);

    let (name, operator, threshold) = if let Some((n, t)) = inner.rsplit_once("<=") {
        (n, Operator::Lte, t)
    } else if let Some((n, t)) = inner.rsplit_once('>') {
        (n, Operator::Gt, t)
    } else {
        return Err(malformed());
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(malformed());
    }
    let threshold = parse_threshold(threshold.trim()).ok_or_else(malformed)?;
    let feature = index.index_of(name)?;

    Ok(Condition {
        feature,
        operator,
        threshold,
    })
}

fn parse_token(token: &str, index: &FeatureIndex) -> Result<Condition, CodecError> {
    let malformed = || CodecError::MalformedToken {
        rule: String::new(),
        token: token.to_string(),
    };

    let body = token.trim().strip_prefix(TOKEN_PREFIX).ok_or_else(malformed)?;
    let (feature, rest) = body.split_once('_').ok_or_else(malformed)?;
    let feature: usize = feature.parse().map_err(|_| malformed())?;
    let (tag, threshold) = rest.split_once('_').ok_or_else(malformed)?;
    let operator = Operator::from_tag(tag).ok_or_else(malformed)?;
    let threshold = parse_threshold(threshold).ok_or_else(malformed)?;

    if feature >= index.len() {
        return Err(CodecError::IndexOutOfRange {
            rule: String::new(),
            index: feature,
            count: index.len(),
        });
    }

    Ok(Condition {
        feature,
        operator,
        threshold,
    })
}

fn parse_threshold(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|t| t.is_finite())
}

/// Encode each readable rule independently. One malformed rule does not
/// affect the others; the caller decides whether to skip or stop.
pub fn encode<S: AsRef<str>>(rules: &[S], index: &FeatureIndex) -> Vec<Result<String, CodecError>> {
    let results: Vec<_> = rules
        .iter()
        .map(|r| Rule::parse(r.as_ref(), index).map(|rule| rule.encode()))
        .collect();
    tracing::debug!(
        rules = results.len(),
        failed = results.iter().filter(|r| r.is_err()).count(),
        "encoded rule batch"
    );
    results
}

/// Encode every rule or fail on the first error.
pub fn encode_all<S: AsRef<str>>(rules: &[S], index: &FeatureIndex) -> Result<Vec<String>, CodecError> {
    rules
        .iter()
        .map(|r| Rule::parse(r.as_ref(), index).map(|rule| rule.encode()))
        .collect()
}

/// Decode each encoded rule independently back to readable form.
pub fn decode<S: AsRef<str>>(encoded: &[S], index: &FeatureIndex) -> Vec<Result<String, CodecError>> {
    encoded
        .iter()
        .map(|e| decode_one(e.as_ref(), index))
        .collect()
}

/// Decode every rule or fail on the first error.
pub fn decode_all<S: AsRef<str>>(encoded: &[S], index: &FeatureIndex) -> Result<Vec<String>, CodecError> {
    encoded
        .iter()
        .map(|e| decode_one(e.as_ref(), index))
        .collect()
}

fn decode_one(text: &str, index: &FeatureIndex) -> Result<String, CodecError> {
    Rule::parse_encoded(text, index)?
        .render(index)
        .map_err(|e| e.with_rule(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn abc() -> FeatureIndex {
        FeatureIndex::fit(["A", "B", "C"])
    }

    #[test]
    fn encodes_with_sorted_indices() {
        let index = FeatureIndex::fit(["texture", "area", "radius"]);
        let encoded = encode_all(&["(radius <= 15.05) AND (area > 700.1)"], &index).unwrap();
        assert_eq!(encoded, ["FEAT_1_LTE_15.05 AND FEAT_0_GT_700.10"]);
    }

    #[test]
    fn decodes_to_readable_form() {
        let decoded = decode_all(&["FEAT_0_LTE_1.00 AND FEAT_2_GT_3.00"], &abc()).unwrap();
        assert_eq!(decoded, ["(A <= 1.00) AND (C > 3.00)"]);
    }

    #[test]
    fn threshold_rounds_to_two_decimals() {
        let encoded = encode_all(&["(A <= 1.23456)"], &abc()).unwrap();
        assert_eq!(encoded, ["FEAT_0_LTE_1.23"]);
    }

    #[test]
    fn negative_thresholds_survive() {
        let index = abc();
        let encoded = encode_all(&["(B > -0.75)"], &index).unwrap();
        assert_eq!(encoded, ["FEAT_1_GT_-0.75"]);
        assert_eq!(decode_all(&encoded, &index).unwrap(), ["(B > -0.75)"]);
    }

    #[test]
    fn feature_names_with_spaces() {
        let index = FeatureIndex::fit(["mean radius", "worst area"]);
        let rule = "(mean radius <= 13.10) AND (worst area > 880.80)";
        let encoded = encode_all(&[rule], &index).unwrap();
        assert_eq!(decode_all(&encoded, &index).unwrap(), [rule]);
    }

    #[test]
    fn empty_rule_encodes_to_empty() {
        let index = abc();
        assert_eq!(encode_all(&[""], &index).unwrap(), [""]);
        assert_eq!(decode_all(&[""], &index).unwrap(), [""]);
    }

    #[test]
    fn malformed_condition_keeps_rule_context() {
        let rule = "(A <= 1.00) AND (B == 2.00)";
        let err = encode_all(&[rule], &abc()).unwrap_err();
        assert_eq!(
            err,
            CodecError::MalformedCondition {
                rule: rule.into(),
                condition: "(B == 2.00)".into(),
            }
        );
    }

    #[test]
    fn unparseable_threshold_is_malformed() {
        let err = encode_all(&["(A <= abc)"], &abc()).unwrap_err();
        assert!(matches!(err, CodecError::MalformedCondition { .. }));
        let err = encode_all(&["(A > NaN)"], &abc()).unwrap_err();
        assert!(matches!(err, CodecError::MalformedCondition { .. }));
    }

    #[test]
    fn unknown_feature_is_fatal() {
        let err = encode_all(&["(Z <= 1.00)"], &abc()).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, CodecError::UnknownFeature { ref feature, .. } if feature == "Z"));
    }

    #[test]
    fn index_out_of_range_on_decode() {
        let err = decode_all(&["FEAT_3_GT_1.00"], &abc()).unwrap_err();
        assert_eq!(
            err,
            CodecError::IndexOutOfRange {
                rule: "FEAT_3_GT_1.00".into(),
                index: 3,
                count: 3,
            }
        );
    }

    #[test]
    fn malformed_tokens() {
        let index = abc();
        for bad in ["FEAT_0_EQ_1.00", "FEAT_x_LTE_1.00", "0_LTE_1.00", "FEAT_0_LTE", "FEAT_0_GT_"] {
            let err = decode_all(&[bad], &index).unwrap_err();
            assert!(matches!(err, CodecError::MalformedToken { .. }), "{bad}");
        }
    }

    #[test]
    fn batch_encode_isolates_failures() {
        let results = encode(&["(A <= 1.00)", "(A ~ 1.00)", "(C > 2.00)"], &abc());
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_deref().unwrap(), "FEAT_2_GT_2.00");
    }

    #[test]
    fn feature_sequence_preserves_order() {
        let rule = Rule::parse("(C > 1.00) AND (A <= 2.00) AND (C > 0.50)", &abc()).unwrap();
        assert_eq!(rule.features().collect::<Vec<_>>(), [2, 0, 2]);
        assert_eq!(rule.len(), 3);
    }

    fn feature_name() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_]{0,10}"
    }

    proptest! {
        #[test]
        fn round_trip_preserves_names_and_operators(
            names in proptest::collection::btree_set(feature_name(), 1..8),
            picks in proptest::collection::vec((any::<prop::sample::Index>(), any::<bool>(), -1.0e4f64..1.0e4), 0..6),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let index = FeatureIndex::fit(names.clone());
            let originals: Vec<(String, &str, f64)> = picks
                .iter()
                .map(|(i, lte, t)| (i.get(&names).clone(), if *lte { "<=" } else { ">" }, *t))
                .collect();
            let text = originals
                .iter()
                .map(|(n, op, t)| format!("({n} {op} {t})"))
                .collect::<Vec<_>>()
                .join(CONJUNCTION);

            let encoded = encode_all(&[&text], &index).unwrap();
            let decoded = decode_all(&encoded, &index).unwrap();
            let back = Rule::parse(&decoded[0], &index).unwrap();

            prop_assert_eq!(back.len(), originals.len());
            for (cond, (name, op, t)) in back.conditions.iter().zip(&originals) {
                prop_assert_eq!(index.name_of(cond.feature).unwrap(), name.as_str());
                prop_assert_eq!(cond.operator.symbol(), *op);
                prop_assert!((cond.threshold - t).abs() <= 0.005 + 1e-9);
            }
        }
    }
}
