/// Errors raised while parsing, encoding or decoding a single rule.
/// Every variant carries the offending rule text so a caller can log and
/// discard it without losing the rest of the batch.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CodecError {
    // Per-rule: the text itself is broken
    #[error("malformed condition `{condition}` in rule `{rule}`")]
    MalformedCondition { rule: String, condition: String },
    #[error("malformed token `{token}` in encoded rule `{rule}`")]
    MalformedToken { rule: String, token: String },

    // Fatal: encoder and decoder disagree about the feature set
    #[error("unknown feature `{feature}` in rule `{rule}`")]
    UnknownFeature { rule: String, feature: String },
    #[error("feature index {index} out of range for {count} fitted features in rule `{rule}`")]
    IndexOutOfRange {
        rule: String,
        index: usize,
        count: usize,
    },
}

impl CodecError {
    /// Mapping inconsistencies mean the codec is being misused; processing
    /// more rules with the same index will not help.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownFeature { .. } | Self::IndexOutOfRange { .. }
        )
    }

    /// Errors local to one rule's text. Safe to skip and continue.
    pub fn is_per_rule(&self) -> bool {
        !self.is_fatal()
    }

    /// The rule text the error was raised for.
    pub fn rule(&self) -> &str {
        match self {
            Self::MalformedCondition { rule, .. }
            | Self::MalformedToken { rule, .. }
            | Self::UnknownFeature { rule, .. }
            | Self::IndexOutOfRange { rule, .. } => rule,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MalformedCondition { .. } => "malformed_condition",
            Self::MalformedToken { .. } => "malformed_token",
            Self::UnknownFeature { .. } => "unknown_feature",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
        }
    }

    pub(crate) fn with_rule(mut self, text: &str) -> Self {
        match &mut self {
            Self::MalformedCondition { rule, .. }
            | Self::MalformedToken { rule, .. }
            | Self::UnknownFeature { rule, .. }
            | Self::IndexOutOfRange { rule, .. } => *rule = text.to_string(),
        }
        self
    }
}

/// Workspace-level error for operations above the codec.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("invalid decision tree: {0}")]
    InvalidTree(String),
    #[error("graph '{0}' not found")]
    GraphNotFound(String),
    #[error("invalid graph name '{0}'")]
    InvalidName(String),
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid rule file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
