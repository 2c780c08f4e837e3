//! Token cost estimation
//!
//! Every size decision in the pipeline goes through [`TokenEstimator`] so
//! trimming, chunking and batch sizing agree with each other even though
//! the proxy is only an approximation of the agent's real tokenizer.

use scribe_core::BudgetConfig;

/// Character-count based token estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimator {
    chars_per_token: usize,
}

impl TokenEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn from_config(budget: &BudgetConfig) -> Self {
        Self::new(budget.chars_per_token)
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }

    /// Estimated token cost of a piece of text
    ///
    /// Monotonic in the number of characters: appending text never lowers
    /// the estimate.
    pub fn estimate(&self, text: &str) -> usize {
        self.estimate_chars(text.chars().count())
    }

    /// Estimated token cost of `chars` characters
    pub fn estimate_chars(&self, chars: usize) -> usize {
        chars.div_ceil(self.chars_per_token)
    }

    /// Largest number of characters whose estimate stays within `tokens`
    pub fn chars_for(&self, tokens: usize) -> usize {
        tokens.saturating_mul(self.chars_per_token)
    }

    /// Whether `text` fits within `tokens`
    pub fn fits(&self, text: &str, tokens: usize) -> bool {
        self.estimate(text) <= tokens
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::from_config(&BudgetConfig::default())
    }
}
