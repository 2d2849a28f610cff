//! Derived ARC efficiency figures.

use crate::model::ArcStats;

/// Cache hit/miss ratios as percent strings with two decimals and a
/// trailing `%` (e.g. `"80.00%"`), the way `arc_summary` reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcEfficiency {
    pub cache_hit_ratio: String,
    pub cache_miss_ratio: String,
}

impl ArcEfficiency {
    pub fn from_stats(stats: &ArcStats) -> Self {
        let total = stats.hits as u128 + stats.misses as u128;
        Self {
            cache_hit_ratio: format_ratio(stats.hits, total),
            cache_miss_ratio: format_ratio(stats.misses, total),
        }
    }
}

fn format_ratio(part: u64, total: u128) -> String {
    if total == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", 100.0 * part as f64 / total as f64)
}

/// Percentage of ARC reads that missed.
///
/// Returns `None` when there have been no reads at all.
pub fn arc_miss_percent(hits: u64, misses: u64) -> Option<f64> {
    let reads = hits as u128 + misses as u128;
    if reads == 0 {
        return None;
    }
    let hit_percent = 100.0 * hits as f64 / reads as f64;
    Some(100.0 - hit_percent)
}

/// Renders [`arc_miss_percent`] for the `zfsArcMissPercent` string.
///
/// No reads renders as `"0"`; otherwise the shortest decimal that
/// round-trips, always with a fractional part (`"20.0"`).
pub fn format_miss_percent(hits: u64, misses: u64) -> String {
    match arc_miss_percent(hits, misses) {
        Some(percent) => format!("{:?}", percent),
        None => "0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_percent() {
        assert_eq!(arc_miss_percent(80, 20), Some(20.0));
        assert_eq!(arc_miss_percent(0, 0), None);
        assert_eq!(arc_miss_percent(0, 5), Some(100.0));
    }

    #[test]
    fn test_format_miss_percent() {
        assert_eq!(format_miss_percent(80, 20), "20.0");
        assert_eq!(format_miss_percent(0, 0), "0");
        assert_eq!(format_miss_percent(100, 0), "0.0");
    }

    #[test]
    fn test_efficiency() {
        let stats = ArcStats {
            hits: 750,
            misses: 250,
            ..ArcStats::default()
        };
        let eff = ArcEfficiency::from_stats(&stats);
        assert_eq!(eff.cache_hit_ratio, "75.00%");
        assert_eq!(eff.cache_miss_ratio, "25.00%");
    }

    #[test]
    fn test_efficiency_no_accesses() {
        let eff = ArcEfficiency::from_stats(&ArcStats::default());
        assert_eq!(eff.cache_hit_ratio, "0.00%");
        assert_eq!(eff.cache_miss_ratio, "0.00%");
    }

    #[test]
    fn test_efficiency_huge_counters() {
        let stats = ArcStats {
            hits: u64::MAX,
            misses: u64::MAX,
            ..ArcStats::default()
        };
        let eff = ArcEfficiency::from_stats(&stats);
        assert_eq!(eff.cache_hit_ratio, "50.00%");
    }
}
