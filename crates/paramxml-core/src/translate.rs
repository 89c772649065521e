//! Translation strategies: label -> best-effort Latin candidate.
//!
//! The candidate is not yet a legal identifier; [`crate::ident::normalize`]
//! runs afterwards. Strategies are stateless and shared across threads.

use crate::ident::ParameterLabel;

/// Failure modes shared by translation and splitting strategies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("invalid label {0:?}: empty or whitespace-only")]
    InvalidLabel(String),
    #[error("strategy `{strategy}` unavailable: {reason}")]
    Unavailable { strategy: String, reason: String },
}

impl StrategyError {
    pub fn unavailable(strategy: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            strategy: strategy.to_string(),
            reason: reason.into(),
        }
    }
}

/// Capability: render a label in Latin script.
pub trait TranslationStrategy: Send + Sync {
    /// Short name used in logs and CLI flags.
    fn name(&self) -> &str;

    fn resolve(&self, label: &ParameterLabel) -> Result<String, StrategyError>;
}

// ============================================================================
// Transliteration
// ============================================================================

/// Rule-based Cyrillic -> Latin transliteration.
///
/// Characters without a table entry pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transliterator;

impl Transliterator {
    pub const NAME: &'static str = "translit";

    pub fn transliterate(text: &str) -> String {
        let mut out = String::with_capacity(text.len() * 2);
        for c in text.chars() {
            let lower = lower_cyrillic(c);
            match cluster(lower) {
                Some(latin) if lower != c => push_capitalized(&mut out, latin),
                Some(latin) => out.push_str(latin),
                None => out.push(c),
            }
        }
        out
    }
}

impl TranslationStrategy for Transliterator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve(&self, label: &ParameterLabel) -> Result<String, StrategyError> {
        if label.is_blank() {
            return Err(StrategyError::InvalidLabel(label.as_str().to_string()));
        }
        Ok(Self::transliterate(label.as_str().trim()))
    }
}

fn lower_cyrillic(c: char) -> char {
    if matches!(c, 'А'..='Я' | 'Ё' | 'І' | 'Ї' | 'Є' | 'Ґ' | 'Ў') {
        c.to_lowercase().next().unwrap_or(c)
    } else {
        c
    }
}

fn push_capitalized(out: &mut String, latin: &str) {
    let mut chars = latin.chars();
    if let Some(first) = chars.next() {
        out.push(first.to_ascii_uppercase());
        out.push_str(chars.as_str());
    }
}

fn cluster(c: char) -> Option<&'static str> {
    let latin = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "yo",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sch",
        'ъ' => "",
        'ы' => "y",
        'ь' => "",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        // Ukrainian / Belarusian
        'і' => "i",
        'ї' => "yi",
        'є' => "ye",
        'ґ' => "g",
        'ў' => "w",
        _ => return None,
    };
    Some(latin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transliterate_basic() {
        assert_eq!(Transliterator::transliterate("Параметр1"), "Parametr1");
        assert_eq!(Transliterator::transliterate("щука"), "schuka");
        assert_eq!(Transliterator::transliterate("Жёлтый"), "Zhyoltyy");
        assert_eq!(Transliterator::transliterate("объём"), "obyom");
    }

    #[test]
    fn test_unmapped_passes_through() {
        assert_eq!(Transliterator::transliterate("ID-номер №5"), "ID-nomer №5");
    }

    #[test]
    fn test_resolve_rejects_blank() {
        let t = Transliterator;
        assert!(matches!(
            t.resolve(&ParameterLabel::new("   ")),
            Err(StrategyError::InvalidLabel(_))
        ));
        assert!(matches!(
            t.resolve(&ParameterLabel::new("")),
            Err(StrategyError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let t = Transliterator;
        let label = ParameterLabel::new("Дата рождения");
        assert_eq!(t.resolve(&label), t.resolve(&label));
        assert_eq!(t.resolve(&label).unwrap(), "Data rozhdeniya");
    }
}
