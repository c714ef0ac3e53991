//! # Timestamp Rules

/// Median of the given ancestor timestamps.
///
/// Returns `None` for an empty slice. With fewer ancestors than the full
/// window (near the root) the median of those available is used.
pub fn median_time_past(timestamps: &[u32]) -> Option<u32> {
    if timestamps.is_empty() {
        return None;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_window() {
        let times = [5, 1, 9, 3, 7, 11, 2, 8, 4, 10, 6];
        assert_eq!(median_time_past(&times), Some(6));
    }

    #[test]
    fn test_median_short_window() {
        assert_eq!(median_time_past(&[100]), Some(100));
        assert_eq!(median_time_past(&[100, 200]), Some(200));
    }

    #[test]
    fn test_median_empty() {
        assert_eq!(median_time_past(&[]), None);
    }
}
