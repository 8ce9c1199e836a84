use crate::models::DerivedStats;

/// Combines two independently derived statistics.
///
/// Totals add, `average_ro` is recomputed from the merged totals, and the
/// ranked lists are rebuilt from the union of both underlying aggregates, so
/// a label can show up in both lists. Merging is commutative and associative.
pub fn merge(a: &DerivedStats, b: &DerivedStats) -> DerivedStats {
    let mut repairs = a.repairs().clone();
    repairs.absorb(b.repairs());
    repairs.into_stats()
}

/// Folds any number of statistics; the empty input yields empty stats.
pub fn merge_all<'a, I>(stats: I) -> DerivedStats
where
    I: IntoIterator<Item = &'a DerivedStats>,
{
    stats
        .into_iter()
        .fold(DerivedStats::empty(), |acc, next| merge(&acc, next))
}
