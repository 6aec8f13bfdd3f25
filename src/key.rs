//! Key folding for case-insensitive stores.

use std::borrow::Cow;

/// Folds keys to their canonical form. Chosen once per store and never
/// changed afterwards.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeyNormalizer {
    /// Keys are compared byte for byte.
    CaseSensitive,
    /// Keys are lowercased before every lookup, insert or removal.
    CaseInsensitive,
}

impl KeyNormalizer {
    pub const fn from_case_sensitive(case_sensitive: bool) -> Self {
        if case_sensitive {
            KeyNormalizer::CaseSensitive
        } else {
            KeyNormalizer::CaseInsensitive
        }
    }

    pub const fn is_case_sensitive(self) -> bool {
        matches!(self, KeyNormalizer::CaseSensitive)
    }

    /// Canonical form of `key`. Borrows when no folding is needed.
    #[inline]
    pub fn fold(self, key: &str) -> Cow<'_, str> {
        match self {
            KeyNormalizer::CaseSensitive => Cow::Borrowed(key),
            KeyNormalizer::CaseInsensitive => {
                // Titlecase letters such as 'ǅ' are not uppercase but still fold.
                if key.chars().any(|c| c.to_lowercase().ne([c])) {
                    Cow::Owned(key.to_lowercase())
                } else {
                    Cow::Borrowed(key)
                }
            }
        }
    }
}
