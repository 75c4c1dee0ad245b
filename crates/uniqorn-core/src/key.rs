// Bucket key codec: canonical string form of a bucket shape.
//
// The canonical key is `"(p, a, r, b, s)"`, the same text used as map keys in
// the persisted aggregate tables.

use crate::bucket::BucketShape;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("bucket key must be wrapped in parentheses: {key:?}")]
    MissingParens { key: String },

    #[error("bucket key must have 5 components, got {found}: {key:?}")]
    WrongArity { key: String, found: usize },

    #[error("bucket key component {position} is not an integer: {key:?}")]
    NotAnInteger { key: String, position: usize },
}

/// Encode a shape as its canonical key.
pub fn encode(shape: &BucketShape) -> String {
    shape.to_string()
}

/// Decode a canonical key.
///
/// Structurally malformed keys are rejected. Components that parse as
/// integers but fall outside their dimension's range are clamped to the
/// nearest valid bin, so `decode(encode(s)) == s` for every valid shape and
/// no well-formed key is ever an error.
pub fn decode(key: &str) -> Result<BucketShape, KeyError> {
    let trimmed = key.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| KeyError::MissingParens {
            key: key.to_string(),
        })?;

    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != 5 {
        return Err(KeyError::WrongArity {
            key: key.to_string(),
            found: parts.len(),
        });
    }

    let mut indices = [0i64; 5];
    for (position, (slot, part)) in indices.iter_mut().zip(parts).enumerate() {
        *slot = part.parse::<i64>().map_err(|_| KeyError::NotAnInteger {
            key: key.to_string(),
            position,
        })?;
    }

    Ok(BucketShape::clamped(indices))
}

impl From<BucketShape> for String {
    fn from(shape: BucketShape) -> Self {
        encode(&shape)
    }
}

impl TryFrom<String> for BucketShape {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        decode(&value)
    }
}

impl std::str::FromStr for BucketShape {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}
