//! Cell name rules.
//!
//! A cell name is one or more ASCII letters followed by one or more ASCII
//! digits (`A1`, `bc12`). On top of that pattern the embedding application
//! supplies two hooks at construction time: a normalizer (typically
//! upper-casing) applied before every lookup or store, and an extra validity
//! predicate (for example "column must be A..Z").

use std::fmt;
use std::sync::Arc;

type Normalizer = Arc<dyn Fn(&str) -> String + Send + Sync>;
type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Returns true if `s` matches `^[A-Za-z]+[0-9]+$`.
pub fn is_cell_name(s: &str) -> bool {
    let letters = s.bytes().take_while(|b| b.is_ascii_alphabetic()).count();
    if letters == 0 || letters == s.len() {
        return false;
    }
    s.bytes().skip(letters).all(|b| b.is_ascii_digit())
}

/// Normalization and validation hooks for cell names.
#[derive(Clone)]
pub struct NameRules {
    normalize: Normalizer,
    validate: Validator,
}

impl NameRules {
    pub fn new<N, V>(normalize: N, validate: V) -> Self
    where
        N: Fn(&str) -> String + Send + Sync + 'static,
        V: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            normalize: Arc::new(normalize),
            validate: Arc::new(validate),
        }
    }

    /// Upper-case every name, accept anything that matches the pattern.
    pub fn uppercase() -> Self {
        Self::new(|s| s.to_ascii_uppercase(), |_| true)
    }

    pub fn normalize(&self, name: &str) -> String {
        (self.normalize)(name)
    }

    /// Normalize `name` and check it against both the pattern and the
    /// validator. Returns the normalized name on success.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let normalized = self.normalize(name);
        if is_cell_name(&normalized) && (self.validate)(&normalized) {
            Some(normalized)
        } else {
            None
        }
    }
}

impl Default for NameRules {
    /// Identity normalizer, no extra validation.
    fn default() -> Self {
        Self::new(|s| s.to_string(), |_| true)
    }
}

impl fmt::Debug for NameRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameRules").finish_non_exhaustive()
    }
}
