//! Play-count leaderboard pages and boundary search within them.

use std::collections::HashMap;

/// One (artist, playcount) row of a user's top-artists chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistScrobbleRecord {
    pub artist_name: String,
    pub playcount: u64,
}

impl ArtistScrobbleRecord {
    pub fn new(artist_name: impl Into<String>, playcount: u64) -> Self {
        ArtistScrobbleRecord {
            artist_name: artist_name.into(),
            playcount,
        }
    }
}

/// One page of a top-artists chart, sorted by playcount, highest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderboardPage {
    pub records: Vec<ArtistScrobbleRecord>,
    /// Total page count reported by the service, when it reports one.
    pub total_pages: Option<u32>,
}

impl LeaderboardPage {
    /// Build a page, restoring descending order if the service handed
    /// back ties in a different order.
    pub fn new(mut records: Vec<ArtistScrobbleRecord>, total_pages: Option<u32>) -> Self {
        if !records.windows(2).all(|w| w[0].playcount >= w[1].playcount) {
            log::debug!("leaderboard page out of order, re-sorting {} rows", records.len());
            records.sort_by(|a, b| b.playcount.cmp(&a.playcount));
        }
        LeaderboardPage {
            records,
            total_pages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn last_playcount(&self) -> Option<u64> {
        self.records.last().map(|r| r.playcount)
    }

    /// Index of the first entry below `limit` (see [`first_under`]).
    pub fn first_under(&self, limit: u64) -> usize {
        first_under(&self.records, limit)
    }
}

/// Artist name → playcount (or a deficit/gap derived from one).
///
/// Insertion keeps the first value seen for a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrobbleMap {
    counts: HashMap<String, u64>,
}

impl ScrobbleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (and keeps the old value) if `artist` is already present.
    pub fn insert_first(&mut self, artist: &str, count: u64) -> bool {
        if self.counts.contains_key(artist) {
            return false;
        }
        self.counts.insert(artist.to_string(), count);
        true
    }

    /// Keep the larger of the stored and the given value.
    pub fn merge_max(&mut self, artist: &str, count: u64) {
        let entry = self.counts.entry(artist.to_string()).or_insert(count);
        *entry = (*entry).max(count);
    }

    pub fn get(&self, artist: &str) -> Option<u64> {
        self.counts.get(artist).copied()
    }

    pub fn remove(&mut self, artist: &str) -> Option<u64> {
        self.counts.remove(artist)
    }

    pub fn contains(&self, artist: &str) -> bool {
        self.counts.contains_key(artist)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn into_inner(self) -> HashMap<String, u64> {
        self.counts
    }
}

impl From<HashMap<String, u64>> for ScrobbleMap {
    fn from(counts: HashMap<String, u64>) -> Self {
        ScrobbleMap { counts }
    }
}

impl<'a> FromIterator<(&'a str, u64)> for ScrobbleMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, u64)>>(iter: I) -> Self {
        let mut map = ScrobbleMap::new();
        for (artist, count) in iter {
            map.insert_first(artist, count);
        }
        map
    }
}

/// Binary search for the first index where `holds` turns false, assuming it
/// is true for a prefix of `0..len` and false afterwards.
fn boundary_by(len: usize, mut holds: impl FnMut(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if holds(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Smallest `i` with `page[i].playcount < limit`.
///
/// `0` when every entry is below `limit`, `page.len()` when none is.
/// `page` must be sorted by playcount, highest first.
pub fn first_under(page: &[ArtistScrobbleRecord], limit: u64) -> usize {
    boundary_by(page.len(), |i| page[i].playcount >= limit)
}

/// Largest `i` with `page[i].playcount >= limit`, or `None` if the whole page is below.
pub fn last_at_or_over(page: &[ArtistScrobbleRecord], limit: u64) -> Option<usize> {
    first_under(page, limit).checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn page(counts: &[u64]) -> Vec<ArtistScrobbleRecord> {
        counts
            .iter()
            .enumerate()
            .map(|(i, c)| ArtistScrobbleRecord::new(format!("artist{i}"), *c))
            .collect()
    }

    #[rstest]
    #[case(&[50, 40, 30, 20, 10], 30, 3)]
    #[case(&[50, 40, 30, 20, 10], 31, 2)]
    #[case(&[50, 40, 30, 20, 10], 100, 0)]
    #[case(&[50, 40, 30, 20, 10], 5, 5)]
    #[case(&[50, 40, 30, 20, 10], 10, 5)]
    #[case(&[50, 40, 30, 20, 10], 51, 0)]
    #[case(&[30, 30, 30, 30], 30, 4)]
    #[case(&[30, 30, 29, 29], 30, 2)]
    #[case(&[7], 7, 1)]
    #[case(&[7], 8, 0)]
    #[case(&[], 8, 0)]
    fn test_first_under(#[case] counts: &[u64], #[case] limit: u64, #[case] expected: usize) {
        assert_eq!(first_under(&page(counts), limit), expected);
    }

    #[test]
    fn test_boundary_property_over_all_limits() {
        let records = page(&[90, 90, 75, 60, 60, 60, 41, 30, 30, 12, 3, 1]);
        for limit in 0..100 {
            let i = first_under(&records, limit);
            if i > 0 {
                assert!(records[i - 1].playcount >= limit, "limit {limit}, index {i}");
            }
            if i < records.len() {
                assert!(records[i].playcount < limit, "limit {limit}, index {i}");
            }
        }
    }

    #[test]
    fn test_last_at_or_over() {
        let records = page(&[50, 40, 30, 20, 10]);
        assert_eq!(last_at_or_over(&records, 30), Some(2));
        assert_eq!(last_at_or_over(&records, 10), Some(4));
        assert_eq!(last_at_or_over(&records, 1), Some(4));
        assert_eq!(last_at_or_over(&records, 51), None);
    }

    #[test]
    fn test_logarithmic_probe_count() {
        let counts: Vec<u64> = (0..1000).rev().collect();
        for limit in [0, 1, 499, 500, 998, 999, 1000, 5000] {
            let mut probes = 0;
            let index = boundary_by(counts.len(), |i| {
                probes += 1;
                counts[i] >= limit
            });
            assert_eq!(index, counts.iter().filter(|c| **c >= limit).count());
            assert!(probes <= 10, "limit {limit} took {probes} probes");
        }
    }

    #[test]
    fn test_page_restores_order() {
        let page = LeaderboardPage::new(page(&[10, 30, 20]), None);
        let counts: Vec<u64> = page.records.iter().map(|r| r.playcount).collect();
        assert_eq!(counts, vec![30, 20, 10]);
        assert_eq!(page.last_playcount(), Some(10));
    }

    #[test]
    fn test_scrobble_map_first_wins() {
        let mut map = ScrobbleMap::new();
        assert!(map.insert_first("Abba", 12));
        assert!(!map.insert_first("Abba", 99));
        assert_eq!(map.get("Abba"), Some(12));

        map.merge_max("Abba", 40);
        map.merge_max("Abba", 20);
        map.merge_max("Blur", 3);
        assert_eq!(map.get("Abba"), Some(40));
        assert_eq!(map.get("Blur"), Some(3));
        assert_eq!(map.len(), 2);
    }
}
