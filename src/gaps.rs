//! Turns playcounts into "plays still needed" per artist.

use crate::config::StealPolicy;
use crate::leaderboard::ScrobbleMap;
use crate::state::ExclusionSets;

/// Policy knobs for [`stealing_gaps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapPolicy {
    pub policy: StealPolicy,
    /// Gaps above this are left alone. `None` targets every gap.
    pub max_gap: Option<u64>,
}

impl GapPolicy {
    /// Window of `range_widths` crown goals; `None` or `0` widths means unbounded.
    pub fn new(policy: StealPolicy, threshold: u64, range_widths: Option<u64>) -> Self {
        GapPolicy {
            policy,
            max_gap: range_widths
                .filter(|w| *w > 0)
                .map(|w| w.saturating_mul(threshold)),
        }
    }
}

/// Steal candidates plus the artists whose crown is already safe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StealPlan {
    /// `(artist, plays to overtake)`, cheapest first.
    pub candidates: Vec<(String, u64)>,
    /// Artists where we already out-play every rival.
    pub secured: Vec<String>,
}

/// Plays each of our artists below `threshold` still needs to reach it.
pub fn farming_deficits(own: &ScrobbleMap, threshold: u64, exclusions: &ExclusionSets) -> ScrobbleMap {
    own.iter()
        .filter(|(_, playcount)| *playcount < threshold)
        .filter(|(artist, _)| !exclusions.contains(artist))
        .map(|(artist, playcount)| (artist, threshold - playcount))
        .collect()
}

/// Combine several rivals' charts, keeping the highest playcount per artist.
pub fn merge_rivals<'a>(charts: impl IntoIterator<Item = &'a ScrobbleMap>) -> ScrobbleMap {
    let mut merged = ScrobbleMap::new();
    for chart in charts {
        for (artist, playcount) in chart.iter() {
            merged.merge_max(artist, playcount);
        }
    }
    merged
}

/// Plays needed to take each rival crown at or over `threshold`.
///
/// The reported count is one more than the gap so we overtake rather than tie.
pub fn stealing_gaps(
    rivals: &ScrobbleMap,
    own: &ScrobbleMap,
    threshold: u64,
    policy: GapPolicy,
    exclusions: &ExclusionSets,
) -> StealPlan {
    let mut plan = StealPlan::default();

    for (artist, rival_count) in rivals.iter() {
        if rival_count < threshold {
            continue;
        }
        let own_count = own.get(artist).unwrap_or(0);
        if own_count > rival_count {
            plan.secured.push(artist.to_string());
            continue;
        }
        if policy.policy == StealPolicy::OvertakeOnly && own_count == 0 {
            continue;
        }
        if exclusions.contains(artist) {
            continue;
        }
        let gap = rival_count - own_count;
        if policy.max_gap.is_some_and(|max| gap > max) {
            continue;
        }
        plan.candidates.push((artist.to_string(), gap + 1));
    }

    plan.candidates
        .sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    plan.secured.sort();
    plan
}

/// Map entries as a list, smallest value first (ties by name).
pub fn cheapest_first(map: &ScrobbleMap) -> Vec<(String, u64)> {
    let mut rows: Vec<(String, u64)> = map.iter().map(|(a, n)| (a.to_string(), n)).collect();
    rows.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    rows
}
