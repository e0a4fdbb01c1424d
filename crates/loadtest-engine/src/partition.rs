//! Work partitioning across workers.

/// Split `total` submissions over `workers` workers.
///
/// Unit `i` belongs to worker `i % workers`, so the first `total % workers`
/// workers carry one extra unit. Returns an empty plan when `workers` is 0.
pub fn partition_counts(total: u64, workers: usize) -> Vec<u64> {
    if workers == 0 {
        return Vec::new();
    }
    let base = total / workers as u64;
    let remainder = total % workers as u64;

    (0..workers as u64)
        .map(|i| base + u64::from(i < remainder))
        .collect()
}

/// Describe the partitioning plan for logging.
pub fn describe_partitioning(counts: &[u64]) -> String {
    let total: u64 = counts.iter().sum();
    let mut lines = vec![format!(
        "Work distribution: {} submissions over {} workers",
        total,
        counts.len()
    )];

    // Plans are uniform up to one unit, so only the two sizes are listed.
    if let (Some(max), Some(min)) = (counts.iter().max(), counts.iter().min()) {
        let heavy = counts.iter().filter(|&&c| c == *max).count();
        lines.push(format!("  {heavy} workers x {max}"));
        if max != min {
            lines.push(format!("  {} workers x {}", counts.len() - heavy, min));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_matches_round_robin() {
        for total in 1..50u64 {
            for workers in 1..=total as usize {
                let mut expected = vec![0u64; workers];
                for i in 0..total {
                    expected[(i % workers as u64) as usize] += 1;
                }
                assert_eq!(partition_counts(total, workers), expected);
            }
        }
    }

    #[test]
    fn test_partition_covers_total() {
        let counts = partition_counts(10, 3);
        assert_eq!(counts, vec![4, 3, 3]);
        assert_eq!(counts.iter().sum::<u64>(), 10);
    }

    #[test]
    fn test_partition_zero_workers() {
        assert!(partition_counts(10, 0).is_empty());
    }

    #[test]
    fn test_describe_partitioning() {
        let description = describe_partitioning(&[4, 3, 3]);
        assert!(description.contains("10 submissions over 3 workers"));
        assert!(description.contains("1 workers x 4"));
        assert!(description.contains("2 workers x 3"));
    }
}
