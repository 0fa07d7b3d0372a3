//! Language-aware ordering of reference names.

use std::cmp::Ordering;

use icu_collator::options::CollatorOptions;
use icu_collator::{Collator, CollatorBorrowed};
use icu_locale_core::Locale;

use crate::config::ConfigError;

/// Sorts reference names the way readers of a given content language expect.
pub struct NameOrder {
    collator: CollatorBorrowed<'static>,
}

impl NameOrder {
    /// Builds the ordering for a BCP 47 language tag such as `en` or `et`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLanguage`] if the tag does not parse or
    /// no collation data is available for it.
    pub fn for_language(tag: &str) -> Result<Self, ConfigError> {
        let locale = parse_language(tag)?;
        let collator = Collator::try_new(locale.into(), CollatorOptions::default()).map_err(
            |e| ConfigError::InvalidLanguage {
                tag: tag.to_string(),
                message: e.to_string(),
            },
        )?;
        Ok(Self { collator })
    }

    /// Collation order; names the collator considers equal fall back to
    /// byte order so sorting stays deterministic.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.collator.compare(a, b).then_with(|| a.cmp(b))
    }
}

pub(crate) fn parse_language(tag: &str) -> Result<Locale, ConfigError> {
    tag.trim()
        .parse::<Locale>()
        .map_err(|e| ConfigError::InvalidLanguage {
            tag: tag.to_string(),
            message: e.to_string(),
        })
}
