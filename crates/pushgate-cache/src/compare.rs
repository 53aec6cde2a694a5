//! Null-safe structural comparison combinators.
//!
//! Derived `PartialEq` already treats `None` and `Some(default)` as
//! different. These helpers cover the fields that compare by something
//! other than full equality, such as a nested entity compared by identity
//! or a list of entities compared with [`Entity::same_as`](crate::diff::Entity::same_as).

/// Equal when both are absent, or both present and `eq` holds.
pub fn opt_eq_by<T, F>(a: Option<&T>, b: Option<&T>, eq: F) -> bool
where
    T: ?Sized,
    F: FnOnce(&T, &T) -> bool,
{
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => eq(a, b),
        _ => false,
    }
}

/// Equal when both have the same length and `eq` holds pairwise, in order.
pub fn seq_eq_by<T, F>(a: &[T], b: &[T], mut eq: F) -> bool
where
    F: FnMut(&T, &T) -> bool,
{
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| eq(a, b))
}

/// [`seq_eq_by`] for optional lists. An absent list differs from an empty one.
pub fn opt_seq_eq_by<T, F>(a: Option<&[T]>, b: Option<&[T]>, eq: F) -> bool
where
    F: FnMut(&T, &T) -> bool,
{
    opt_eq_by(a, b, |a, b| seq_eq_by(a, b, eq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_differs_from_default() {
        assert!(opt_eq_by::<u32, _>(None, None, |a, b| a == b));
        assert!(!opt_eq_by(None, Some(&0), |a: &u32, b| a == b));
        assert!(!opt_eq_by(Some(&0), None, |a: &u32, b| a == b));
        assert!(opt_eq_by(Some(&0), Some(&0), |a: &u32, b| a == b));
    }

    #[test]
    fn test_custom_predicate() {
        let a = (1, "x");
        let b = (1, "y");
        assert!(opt_eq_by(Some(&a), Some(&b), |a, b| a.0 == b.0));
    }

    #[test]
    fn test_sequences_are_order_sensitive() {
        assert!(seq_eq_by(&[1, 2], &[1, 2], |a, b| a == b));
        assert!(!seq_eq_by(&[1, 2], &[2, 1], |a, b| a == b));
        assert!(!seq_eq_by(&[1], &[1, 1], |a, b| a == b));
    }

    #[test]
    fn test_absent_list_differs_from_empty() {
        let empty: &[u8] = &[];
        assert!(!opt_seq_eq_by(None, Some(empty), |a, b| a == b));
        assert!(opt_seq_eq_by(Some(empty), Some(empty), |a, b| a == b));
        assert!(opt_seq_eq_by::<u8, _>(None, None, |a, b| a == b));
    }
}
