//! Bilingual (Arabic/English) text fields.

use serde::{Deserialize, Serialize};

/// A text value carried in both storefront languages.
///
/// Rows store the two languages in sibling columns (`name_ar`, `name_en`);
/// this type keeps them together so filtering and grouping can treat a
/// field as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bilingual {
    /// Arabic text.
    pub ar: String,
    /// English text.
    pub en: String,
}

impl Bilingual {
    /// Create a bilingual value.
    #[must_use]
    pub fn new(ar: impl Into<String>, en: impl Into<String>) -> Self {
        Self {
            ar: ar.into(),
            en: en.into(),
        }
    }

    /// True when both languages are blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.ar.trim().is_empty() && self.en.trim().is_empty()
    }

    /// Case-insensitive substring match against either language.
    ///
    /// `needle` must already be lower-cased.
    #[must_use]
    pub fn contains_lowercase(&self, needle: &str) -> bool {
        self.en.to_lowercase().contains(needle) || self.ar.to_lowercase().contains(needle)
    }

    /// Grouping key: trimmed, lower-cased English, falling back to Arabic.
    #[must_use]
    pub fn key(&self) -> String {
        let en = self.en.trim();
        if en.is_empty() {
            self.ar.trim().to_lowercase()
        } else {
            en.to_lowercase()
        }
    }

    /// Text for the requested language, falling back to the other one.
    #[must_use]
    pub fn display(&self, arabic: bool) -> &str {
        let (primary, fallback) = if arabic {
            (&self.ar, &self.en)
        } else {
            (&self.en, &self.ar)
        };
        if primary.trim().is_empty() {
            fallback
        } else {
            primary
        }
    }
}
