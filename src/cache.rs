use std::collections::HashSet;
use std::rc::Rc;

/// An interner for decoded field strings.
///
/// Delimited data is heavy on repeated values (enum-like columns, empty
/// fields, country codes). When `cache_fields` is enabled, owned field
/// lookups return a shared handle to a single allocation per distinct value
/// instead of a fresh `String` per row.
///
/// The cache is instance-private and single-threaded, like the reader that
/// owns it. Values longer than `MAX_INTERN_LEN` are not interned: long
/// fields are unlikely to repeat and would pin memory for the lifetime of
/// the reader.
#[derive(Debug, Default)]
pub(crate) struct FieldCache {
    seen: HashSet<Rc<str>>,
}

const MAX_INTERN_LEN: usize = 128;

impl FieldCache {
    pub(crate) fn new() -> FieldCache {
        FieldCache::default()
    }

    /// A shared handle for `field`, reusing the stored allocation when the
    /// value has been seen before.
    pub(crate) fn intern(&mut self, field: &str) -> Rc<str> {
        if field.len() > MAX_INTERN_LEN {
            return Rc::from(field);
        }
        if let Some(hit) = self.seen.get(field) {
            return Rc::clone(hit);
        }
        let value: Rc<str> = Rc::from(field);
        self.seen.insert(Rc::clone(&value));
        value
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_values_share_storage() {
        let mut cache = FieldCache::new();
        let a = cache.intern("active");
        let b = cache.intern("active");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_values_are_distinct() {
        let mut cache = FieldCache::new();
        let a = cache.intern("active");
        let b = cache.intern("inactive");
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn oversized_values_bypass_the_cache() {
        let mut cache = FieldCache::new();
        let long = "x".repeat(MAX_INTERN_LEN + 1);
        let a = cache.intern(&long);
        let b = cache.intern(&long);
        assert_eq!(&*a, &*b);
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 0);
    }
}
