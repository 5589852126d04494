//! Categorical feature codec
//!
//! A [`Category`] packs a categorical value into an unsigned integer code
//! plus the cardinality needed to normalise Hamming distance into [0, 1].
//!
//! Two encodings are supported:
//! * one-hot bit strings such as `"[1,0,1,0]"`, where the leftmost bit is
//!   the most significant and cardinality is the number of bits
//! * nominal tokens looked up in a sorted [`Vocabulary`], where the code is
//!   the token index and cardinality is the vocabulary size
//!
//! Centroid averaging adds codes as plain integers and divides by the member
//! count. For bitmask codes wider than one bit this is not a per-bit mean;
//! the behaviour is kept as is.

use std::fmt;
use std::sync::Arc;

use rand::Rng;

use crate::utils::LearnError;

/// Widest supported bitmask
pub const MAX_BITS: u32 = 64;

/// Sorted, de-duplicated list of the tokens a nominal column can take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    tokens: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary; tokens are sorted and de-duplicated
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        tokens.sort();
        tokens.dedup();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Index of `token`, if present
    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.tokens.binary_search_by(|t| t.as_str().cmp(token)).ok()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Encoded categorical value
#[derive(Debug, Clone)]
pub struct Category {
    code: u64,
    cardinality: u32,
    vocabulary: Option<Arc<Vocabulary>>,
}

impl Category {
    /// Parse a one-hot bit string, `"[1,0,1,0]"` or `"1,0,1,0"`
    ///
    /// # Returns
    /// * `Ok(Category)` with the bits concatenated into the code
    /// * `Err(LearnError::InvalidEncoding)` for empty, non-binary or over-wide input
    pub fn from_bits(raw: &str) -> Result<Self, LearnError> {
        let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let inner = cleaned
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(&cleaned);

        if inner.is_empty() {
            return Err(LearnError::InvalidEncoding(format!(
                "empty bit string '{}'",
                raw
            )));
        }

        let mut code: u64 = 0;
        let mut cardinality: u32 = 0;
        for bit in inner.split(',') {
            let value = match bit {
                "0" => 0,
                "1" => 1,
                _ => {
                    return Err(LearnError::InvalidEncoding(format!(
                        "'{}' is not a binary digit in '{}'",
                        bit, raw
                    )))
                }
            };
            cardinality += 1;
            if cardinality > MAX_BITS {
                return Err(LearnError::InvalidEncoding(format!(
                    "bit string '{}' is wider than {} bits",
                    raw, MAX_BITS
                )));
            }
            code = (code << 1) | value;
        }

        Ok(Self {
            code,
            cardinality,
            vocabulary: None,
        })
    }

    /// Encode a nominal token as its index within `vocabulary`
    pub fn from_token(token: &str, vocabulary: &Arc<Vocabulary>) -> Result<Self, LearnError> {
        let index = vocabulary.index_of(token).ok_or_else(|| {
            LearnError::InvalidEncoding(format!("token '{}' not in vocabulary", token))
        })?;

        Ok(Self {
            code: index as u64,
            cardinality: vocabulary.len() as u32,
            vocabulary: Some(Arc::clone(vocabulary)),
        })
    }

    /// Random category of the same shape as `template`
    ///
    /// Bitmask categories get a random bit pattern, vocabulary categories a
    /// uniformly chosen token.
    pub fn random_like<R: Rng>(template: &Category, rng: &mut R) -> Self {
        let code = match &template.vocabulary {
            Some(vocabulary) if !vocabulary.is_empty() => {
                rng.random_range(0..vocabulary.len()) as u64
            }
            Some(_) => 0,
            None => (0..template.cardinality)
                .fold(0u64, |acc, _| (acc << 1) | rng.random_range(0..2u64)),
        };

        Self {
            code,
            cardinality: template.cardinality,
            vocabulary: template.vocabulary.clone(),
        }
    }

    pub fn code(&self) -> u64 {
        self.code
    }

    pub fn cardinality(&self) -> u32 {
        self.cardinality
    }

    pub fn vocabulary(&self) -> Option<&Arc<Vocabulary>> {
        self.vocabulary.as_ref()
    }

    /// Original token for vocabulary categories
    ///
    /// `None` for bitmask categories, and for running sums whose code has
    /// moved past the vocabulary.
    pub fn label(&self) -> Option<&str> {
        self.vocabulary
            .as_ref()
            .and_then(|v| usize::try_from(self.code).ok().and_then(|i| v.token(i)))
    }

    /// Whether `other` can be compared against `self`
    pub fn is_comparable(&self, other: &Category) -> bool {
        if self.cardinality != other.cardinality {
            return false;
        }
        match (&self.vocabulary, &other.vocabulary) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }

    /// Add `other`'s code into this one (centroid running sum)
    pub fn accumulate(&mut self, other: &Category) -> Result<(), LearnError> {
        self.ensure_comparable(other)?;
        self.code = self.code.saturating_add(other.code);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.code = 0;
    }

    /// Integer-divide the running sum by the number of members
    pub fn finalize_mean(&mut self, member_count: usize) -> Result<(), LearnError> {
        if member_count == 0 {
            return Err(LearnError::ValidationError(
                "cannot average a category over zero members".to_string(),
            ));
        }
        self.code /= member_count as u64;
        Ok(())
    }

    /// Hamming distance normalised by cardinality, in [0, 1]
    pub fn hamming_distance(&self, other: &Category) -> Result<f64, LearnError> {
        self.ensure_comparable(other)?;
        if self.cardinality == 0 {
            return Ok(0.0);
        }
        Ok(hamming(self.code, other.code) as f64 / self.cardinality as f64)
    }

    fn ensure_comparable(&self, other: &Category) -> Result<(), LearnError> {
        if self.is_comparable(other) {
            Ok(())
        } else {
            Err(LearnError::TypeMismatch(format!(
                "category of cardinality {} compared with category of cardinality {}",
                self.cardinality, other.cardinality
            )))
        }
    }
}

/// Number of differing bits
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.is_comparable(other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "{}", label),
            None => write!(f, "{:0width$b}", self.code, width = self.cardinality as usize),
        }
    }
}
