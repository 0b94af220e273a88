//! In-place list reconciliation.
//!
//! Compares a held list against a freshly fetched snapshot and rewrites the
//! held list only when they differ. The comparison is shallow: lengths first,
//! then element by element at the same index, either on an identity key or on
//! the whole element. When a key is used, elements whose keys match are
//! treated as equal even if other fields changed.
//!
//! The target is rewritten in place (`clear` + `extend`), never replaced, so
//! anything holding the container keeps seeing current contents.

/// Whole-element comparison.
pub fn lists_equal<T: PartialEq>(current: &[T], incoming: &[T]) -> bool {
    current.len() == incoming.len() && current.iter().zip(incoming).all(|(a, b)| a == b)
}

/// Identity-key comparison.
pub fn lists_equal_by_key<T, K, F>(current: &[T], incoming: &[T], key: F) -> bool
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    current.len() == incoming.len() && current.iter().zip(incoming).all(|(a, b)| key(a) == key(b))
}

/// Replace `target`'s contents with `incoming` when they differ.
///
/// Returns whether a replacement happened.
pub fn reconcile<T: PartialEq + Clone>(target: &mut Vec<T>, incoming: &[T]) -> bool {
    if lists_equal(target, incoming) {
        return false;
    }
    replace_in_place(target, incoming);
    true
}

/// Like [`reconcile`], comparing only the identity key of each element.
pub fn reconcile_by_key<T, K, F>(target: &mut Vec<T>, incoming: &[T], key: F) -> bool
where
    T: Clone,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    if lists_equal_by_key(target, incoming, key) {
        return false;
    }
    replace_in_place(target, incoming);
    true
}

fn replace_in_place<T: Clone>(target: &mut Vec<T>, incoming: &[T]) {
    target.clear();
    target.extend_from_slice(incoming);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Record {
        id: u32,
        v: &'static str,
    }

    #[test]
    fn test_identical_lists_are_untouched() {
        let mut target = vec![1, 2, 3];
        let before = target.as_ptr();
        assert!(!reconcile(&mut target, &[1, 2, 3]));
        assert_eq!(target, vec![1, 2, 3]);
        assert_eq!(target.as_ptr(), before);
    }

    #[test]
    fn test_element_mismatch_replaces() {
        let mut target = vec![1, 2, 3];
        assert!(reconcile(&mut target, &[1, 2, 4]));
        assert_eq!(target, vec![1, 2, 4]);
    }

    #[test]
    fn test_length_mismatch_replaces() {
        let mut target = vec![1, 2, 3];
        assert!(reconcile(&mut target, &[1, 2]));
        assert_eq!(target, vec![1, 2]);

        assert!(reconcile(&mut target, &[]));
        assert!(target.is_empty());

        assert!(!reconcile(&mut target, &[]));
    }

    #[test]
    fn test_equal_keys_hide_field_changes() {
        let mut target = vec![Record { id: 1, v: "a" }];
        let incoming = vec![Record { id: 1, v: "b" }];
        assert!(!reconcile_by_key(&mut target, &incoming, |r| r.id));
        assert_eq!(target[0].v, "a");

        // Without a key the same change is visible.
        assert!(reconcile(&mut target, &incoming));
        assert_eq!(target[0].v, "b");
    }

    #[test]
    fn test_key_mismatch_replaces() {
        let mut target = vec![Record { id: 1, v: "a" }, Record { id: 2, v: "b" }];
        let incoming = vec![Record { id: 2, v: "b" }, Record { id: 1, v: "a" }];
        assert!(reconcile_by_key(&mut target, &incoming, |r| r.id));
        assert_eq!(target, incoming);
    }

    #[test]
    fn test_reordering_counts_as_change() {
        assert!(!lists_equal(&[1, 2], &[2, 1]));
        assert!(lists_equal_by_key(&["a", "bb"], &["c", "dd"], |s| s.len()));
    }
}
