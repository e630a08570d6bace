//! Token cost estimate for section text.

use crate::domain::config::CHARS_PER_TOKEN;

/// Estimate the number of tokens in `text`.
///
/// Counts characters rather than bytes so multi-byte scripts are not
/// over-counted, rounding up so any non-empty text costs at least one token.
pub fn count_tokens(text: &str) -> usize {
  text.chars().count().div_ceil(CHARS_PER_TOKEN)
}
