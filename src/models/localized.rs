//! Multilingual field types shared by products and projects.
//!
//! Serbian (`sr`) is the source language; English and German are filled in
//! by editors or backfilled through the translation service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the catalog is published in.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Sr,
    En,
    De,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Sr, Language::En, Language::De];

    /// Human readable name, used when prompting the translation model.
    pub fn display_name(self) -> &'static str {
        match self {
            Language::Sr => "Serbian",
            Language::En => "English",
            Language::De => "German",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::Sr => "sr",
            Language::En => "en",
            Language::De => "de",
        }
    }

    /// Languages that can be backfilled from `sr`.
    pub fn translation_targets() -> Vec<Language> {
        vec![Language::En, Language::De]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A text value with one optional variant per language.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalizedText {
    #[serde(default)]
    pub sr: Option<String>,
    #[serde(default)]
    pub en: Option<String>,
    #[serde(default)]
    pub de: Option<String>,
}

impl LocalizedText {
    pub fn sr(value: impl Into<String>) -> Self {
        Self {
            sr: Some(value.into()),
            ..Self::default()
        }
    }

    /// Variant for `lang`, treating blank strings as missing.
    pub fn get(&self, lang: Language) -> Option<&str> {
        let value = match lang {
            Language::Sr => self.sr.as_deref(),
            Language::En => self.en.as_deref(),
            Language::De => self.de.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, lang: Language, value: impl Into<String>) {
        let slot = match lang {
            Language::Sr => &mut self.sr,
            Language::En => &mut self.en,
            Language::De => &mut self.de,
        };
        *slot = Some(value.into());
    }

    /// Resolve for display: the requested language, then `sr`, `en`, `de`.
    pub fn resolve(&self, lang: Language) -> Option<&str> {
        self.get(lang)
            .or_else(|| Language::ALL.iter().find_map(|l| self.get(*l)))
    }

    pub fn is_missing(&self, lang: Language) -> bool {
        self.get(lang).is_none()
    }

    /// True when any language variant equals `needle`.
    pub fn matches(&self, needle: &str) -> bool {
        Language::ALL.iter().any(|l| self.get(*l) == Some(needle))
    }

    /// Trim every variant and drop the ones left empty.
    pub fn normalized(mut self) -> Self {
        for slot in [&mut self.sr, &mut self.en, &mut self.de] {
            *slot = slot
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
        self
    }

    /// Longest variant in characters.
    pub fn max_chars(&self) -> usize {
        [&self.sr, &self.en, &self.de]
            .iter()
            .filter_map(|v| v.as_deref())
            .map(|v| v.chars().count())
            .max()
            .unwrap_or(0)
    }
}

/// Per-language tag lists.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalizedTags {
    #[serde(default)]
    pub sr: Vec<String>,
    #[serde(default)]
    pub en: Vec<String>,
    #[serde(default)]
    pub de: Vec<String>,
}

impl LocalizedTags {
    pub fn get(&self, lang: Language) -> &[String] {
        match lang {
            Language::Sr => &self.sr,
            Language::En => &self.en,
            Language::De => &self.de,
        }
    }

    pub fn set(&mut self, lang: Language, tags: Vec<String>) {
        match lang {
            Language::Sr => self.sr = tags,
            Language::En => self.en = tags,
            Language::De => self.de = tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_serbian() {
        let text = LocalizedText {
            sr: Some("Prozor".into()),
            en: None,
            de: Some("Fenster".into()),
        };
        assert_eq!(text.resolve(Language::En), Some("Prozor"));
        assert_eq!(text.resolve(Language::De), Some("Fenster"));
    }

    #[test]
    fn resolve_uses_any_language_when_serbian_missing() {
        let text = LocalizedText {
            sr: None,
            en: None,
            de: Some("Tür".into()),
        };
        assert_eq!(text.resolve(Language::En), Some("Tür"));
        assert_eq!(LocalizedText::default().resolve(Language::Sr), None);
    }

    #[test]
    fn blank_variants_count_as_missing() {
        let text = LocalizedText {
            sr: Some("Vrata".into()),
            en: Some("   ".into()),
            de: None,
        };
        assert!(text.is_missing(Language::En));
        assert!(!text.is_missing(Language::Sr));
        let normalized = text.normalized();
        assert_eq!(normalized.en, None);
    }

    #[test]
    fn deserializes_partial_objects() {
        let text: LocalizedText = serde_json::from_str(r#"{"sr":"Fasada"}"#).unwrap();
        assert_eq!(text.sr.as_deref(), Some("Fasada"));
        assert_eq!(text.de, None);

        let tags: LocalizedTags = serde_json::from_str(r#"{"en":["door"]}"#).unwrap();
        assert!(tags.sr.is_empty());
        assert_eq!(tags.get(Language::En), ["door".to_string()]);
    }
}
