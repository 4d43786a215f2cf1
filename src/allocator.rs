//! Merges per-artist track lists into one bounded playlist.
//!
//! Artists are grouped by how many tracks they bring: every artist with one
//! track comes first, then those with two, and so on up to ten. Artists with
//! more than ten come last. Within a group the caller's order is kept.

/// Largest per-artist count with its own bucket.
const MAX_BUCKET: usize = 10;

/// Pick at most `capacity - already_used` tracks from `resolved`.
///
/// `resolved` holds `(artist, tracks)` pairs in priority order.
pub fn allocate(resolved: &[(String, Vec<String>)], capacity: usize, already_used: usize) -> Vec<String> {
    let headroom = capacity.saturating_sub(already_used);
    let mut buckets: Vec<Vec<&String>> = vec![Vec::new(); MAX_BUCKET + 1];

    for (_, tracks) in resolved {
        if tracks.is_empty() {
            continue;
        }
        let bucket = tracks.len().min(MAX_BUCKET + 1) - 1;
        buckets[bucket].extend(tracks);
    }

    let allocated: Vec<String> = buckets
        .into_iter()
        .flatten()
        .take(headroom)
        .cloned()
        .collect();
    log::debug!(
        "allocated {} of {} available slots from {} artists",
        allocated.len(),
        headroom,
        resolved.len()
    );
    allocated
}
