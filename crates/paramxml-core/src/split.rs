//! Splitting strategies: one overlong label -> ordered atomic labels.

use crate::ident::ParameterLabel;
use crate::translate::StrategyError;

/// Capability: decompose a compound label, preserving left-to-right order.
///
/// Returning `vec![label.clone()]` is always a legal answer. Callers treat an
/// error or an empty answer as "no split".
pub trait SplittingStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn split(&self, label: &ParameterLabel) -> Result<Vec<ParameterLabel>, StrategyError>;
}

/// Never splits.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySplitter;

impl IdentitySplitter {
    pub const NAME: &'static str = "none";
}

impl SplittingStrategy for IdentitySplitter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn split(&self, label: &ParameterLabel) -> Result<Vec<ParameterLabel>, StrategyError> {
        Ok(vec![label.clone()])
    }
}

/// Splits enumerations such as `Дата и время` or `Рост, вес` into their parts.
///
/// Separators are list punctuation and the standalone conjunction `и`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConjunctionSplitter;

impl ConjunctionSplitter {
    pub const NAME: &'static str = "conjunction";

    const PUNCTUATION: &'static [char] = &[',', ';', '/', '&', '+'];
    const CONJUNCTIONS: &'static [&'static str] = &["и", "И"];
}

impl SplittingStrategy for ConjunctionSplitter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn split(&self, label: &ParameterLabel) -> Result<Vec<ParameterLabel>, StrategyError> {
        let mut parts = Vec::new();
        for chunk in label.as_str().split(Self::PUNCTUATION) {
            let mut current: Vec<&str> = Vec::new();
            for word in chunk.split_whitespace() {
                if Self::CONJUNCTIONS.contains(&word) {
                    if !current.is_empty() {
                        parts.push(current.join(" "));
                        current.clear();
                    }
                } else {
                    current.push(word);
                }
            }
            if !current.is_empty() {
                parts.push(current.join(" "));
            }
        }

        if parts.len() <= 1 {
            return Ok(vec![label.clone()]);
        }
        Ok(parts.into_iter().map(ParameterLabel::new).collect())
    }
}
