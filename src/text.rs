//! Per-language text with preferred → English → any-available fallback.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FALLBACK_LANGUAGE: &str = "en";

/// Text keyed by language code (`"en"`, `"it"` …). Empty entries count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, lang: &str) -> Option<&str> {
        self.0
            .get(lang)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Setting an empty value removes the entry.
    pub fn set(&mut self, lang: impl Into<String>, text: impl Into<String>) {
        let lang = lang.into();
        let text = text.into();
        if text.trim().is_empty() {
            self.0.remove(&lang);
        } else {
            self.0.insert(lang, text);
        }
    }

    pub fn remove(&mut self, lang: &str) -> Option<String> {
        self.0.remove(lang)
    }

    /// `lang`, then English, then the first non-empty entry in language order.
    pub fn get_with_fallback(&self, lang: &str) -> Option<&str> {
        self.get(lang)
            .or_else(|| self.get(FALLBACK_LANGUAGE))
            .or_else(|| {
                self.0
                    .values()
                    .map(String::as_str)
                    .find(|s| !s.trim().is_empty())
            })
    }

    pub fn has_any(&self) -> bool {
        self.0.values().any(|s| !s.trim().is_empty())
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LocalizedText {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut text = LocalizedText::new();
        for (lang, value) in iter {
            text.set(lang, value);
        }
        text
    }
}
