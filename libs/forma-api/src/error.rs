use std::fmt;

/// Error returned by [`convert`](crate::converter::convert) and by model
/// construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvertError {
    /// The value has the right shape but cannot be read as the target type:
    /// malformed numeric or date text, out-of-range numbers.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// No rule leads from this source kind to the target kind at all.
    #[error("cannot convert `{from}` to {to}")]
    Unsupported { from: String, to: String },

    /// Raised by a model's construction capability. Passed through as-is.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Shape errors raised while building a model instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("{model}: missing field '{field}'")]
    MissingField { model: String, field: String },

    #[error("{model}: expected at most {expected} values, got {got}")]
    TooManyValues {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("{model}: expected a mapping or a sequence, got `{got}`")]
    UnexpectedValue { model: String, got: String },
}

impl ConvertError {
    pub fn conversion(msg: impl Into<String>) -> Self {
        ConvertError::Conversion(msg.into())
    }

    pub fn unsupported(from: impl Into<String>, to: impl fmt::Display) -> Self {
        ConvertError::Unsupported {
            from: from.into(),
            to: to.to_string(),
        }
    }

    /// Add context to the error.
    ///
    /// Only `Conversion` messages are prefixed (`"context: original message"`);
    /// other variants carry structured fields and are returned unchanged.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        match self {
            ConvertError::Conversion(msg) => ConvertError::Conversion(format!("{ctx}: {msg}")),
            other => other,
        }
    }

    /// Whether this is a value-domain failure (as opposed to a shape or
    /// capability failure).
    pub fn is_conversion(&self) -> bool {
        matches!(self, ConvertError::Conversion(_))
    }
}
