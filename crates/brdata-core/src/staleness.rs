// Freshness gate
//
// A run only proceeds when the remote source reports something newer than
// what was last ingested. Works over any ordered signal: periods, row counts,
// publication dates.

/// True when nothing has been ingested yet or the remote signal is strictly newer.
pub fn is_stale<S: PartialOrd>(remote: &S, local: Option<&S>) -> bool {
    match local {
        None => true,
        Some(local) => remote > local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::Watermark;

    #[test]
    fn test_no_watermark_is_stale() {
        assert!(is_stale(&5u64, None));
    }

    #[test]
    fn test_equal_or_older_is_fresh() {
        assert!(!is_stale(&5u64, Some(&5)));
        assert!(!is_stale(&4u64, Some(&5)));
        assert!(is_stale(&6u64, Some(&5)));
    }

    #[test]
    fn test_periods() {
        let stored = Watermark::from_year_month(2023, 5).unwrap();
        let remote = Watermark::from_year_month(2023, 6).unwrap();
        assert!(is_stale(&remote, Some(&stored)));
        assert!(!is_stale(&stored, Some(&remote)));
    }
}
