//! Process-lifetime, content-addressed string interning cache.
//!
//! Equal strings share one heap allocation via `Arc<str>`, so cloning an
//! `IStr` is a refcount bump, and `avr_dup_part` (see `model::part`) can
//! share interned strings across clones without deep-copying them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

/// An interned, reference-counted string.
pub type IStr = Arc<str>;

static CACHE: Lazy<Mutex<HashMap<Arc<str>, ()>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Intern `s`, returning the shared instance (allocating on first sight).
pub fn intern(s: &str) -> IStr {
    let mut cache = CACHE.lock().expect("intern cache poisoned");
    if let Some((existing, _)) = cache.get_key_value(s) {
        return existing.clone();
    }
    let arc: Arc<str> = Arc::from(s);
    cache.insert(arc.clone(), ());
    arc
}

/// Number of distinct strings interned so far (test/diagnostic use).
pub fn cache_len() -> usize {
    CACHE.lock().expect("intern cache poisoned").len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_share_storage() {
        let a = intern("flash");
        let b = intern("flash");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_strings_do_not_share() {
        let a = intern("eeprom-distinct-marker");
        let b = intern("lock-distinct-marker");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
