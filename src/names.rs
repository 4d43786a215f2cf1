//! Artist-name equivalence and the search-query variants tried for an artist.
//!
//! Each strategy is a pure transform; [`search_candidates`] applies them in
//! order and drops duplicates, so the resolver just walks the list.

/// Tag stored for artists the music service lists without any genre.
pub const NO_GENRE: &str = "no genre";

/// Comparison key for artist names: case-folded, whitespace collapsed,
/// typographic quotes and dashes flattened.
pub fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{00B4}' | '`' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2010}'..='\u{2015}' => '-',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// True when both names refer to the same artist.
pub fn same_artist(a: &str, b: &str) -> bool {
    name_key(a) == name_key(b)
}

/// A query rewrite; `None` when it does not apply to the name.
pub type NameStrategy = fn(&str) -> Option<String>;

/// Conjunction words tried in place of `&`. Swedish "och" covers the many
/// Scandinavian acts written either way.
const CONJUNCTIONS: [&str; 2] = ["and", "och"];

pub fn identity(name: &str) -> Option<String> {
    Some(name.to_string())
}

/// "Simon & Garfunkel" → "Simon and Garfunkel", "Hasse och Tage" → "Hasse & Tage".
pub fn ampersand_swap(name: &str) -> Option<String> {
    if name.contains('&') {
        let spaced = name.replace('&', " & ");
        let words: Vec<&str> = spaced.split_whitespace().collect();
        let swapped: Vec<&str> = words
            .iter()
            .map(|w| if *w == "&" { CONJUNCTIONS[0] } else { *w })
            .collect();
        return Some(swapped.join(" "));
    }
    let words: Vec<&str> = name.split_whitespace().collect();
    if !words
        .iter()
        .any(|w| CONJUNCTIONS.iter().any(|c| w.eq_ignore_ascii_case(c)))
    {
        return None;
    }
    let swapped: Vec<&str> = words
        .iter()
        .map(|w| {
            if CONJUNCTIONS.iter().any(|c| w.eq_ignore_ascii_case(c)) {
                "&"
            } else {
                *w
            }
        })
        .collect();
    Some(swapped.join(" "))
}

/// "Simon & Garfunkel" → "Simon och Garfunkel".
pub fn ampersand_to_local(name: &str) -> Option<String> {
    if !name.contains('&') {
        return None;
    }
    let spaced = name.replace('&', " & ");
    let words: Vec<&str> = spaced
        .split_whitespace()
        .map(|w| if w == "&" { CONJUNCTIONS[1] } else { w })
        .collect();
    Some(words.join(" "))
}

pub fn lower_case(name: &str) -> Option<String> {
    Some(name.to_lowercase())
}

pub fn upper_case(name: &str) -> Option<String> {
    Some(name.to_uppercase())
}

/// "The Cure" → "Cure", "Cure" → "The Cure".
pub fn the_prefix(name: &str) -> Option<String> {
    let trimmed = name.trim();
    match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("the ") => Some(trimmed[4..].trim_start().to_string()),
        _ => Some(format!("The {trimmed}")),
    }
}

/// Keep letters, digits and spaces only: "AC/DC" → "ACDC", "P!nk" → "Pnk".
pub fn alphanumeric_only(name: &str) -> Option<String> {
    let stripped: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// The order strategies are tried in.
pub const STRATEGIES: [(&str, NameStrategy); 7] = [
    ("identity", identity),
    ("ampersand", ampersand_swap),
    ("ampersand-local", ampersand_to_local),
    ("lower-case", lower_case),
    ("upper-case", upper_case),
    ("the-prefix", the_prefix),
    ("alphanumeric", alphanumeric_only),
];

/// Distinct query strings for `name`, in strategy order.
pub fn search_candidates(name: &str) -> Vec<(&'static str, String)> {
    let mut candidates: Vec<(&'static str, String)> = Vec::new();
    for (label, strategy) in STRATEGIES {
        if let Some(candidate) = strategy(name) {
            let candidate = candidate.trim().to_string();
            if !candidate.is_empty() && !candidates.iter().any(|(_, c)| *c == candidate) {
                candidates.push((label, candidate));
            }
        }
    }
    candidates
}

/// Replace an empty genre list with [`NO_GENRE`] so "fetched, none" is
/// distinguishable from "not fetched yet".
pub fn normalize_genres(genres: Vec<String>) -> Vec<String> {
    let genres: Vec<String> = genres
        .into_iter()
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty())
        .collect();
    if genres.is_empty() {
        vec![NO_GENRE.to_string()]
    } else {
        genres
    }
}

/// Whether an artist with `artist_genres` passes the configured filters.
///
/// No filters keeps everything. `"+tag"` needs an exact genre, a plain
/// entry matches any genre containing it.
pub fn genre_allowed(filters: &[String], artist_genres: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    filters.iter().any(|filter| {
        let filter = filter.trim().to_lowercase();
        match filter.strip_prefix('+') {
            Some(exact) => artist_genres.iter().any(|g| g.eq_ignore_ascii_case(exact.trim())),
            None => artist_genres.iter().any(|g| g.to_lowercase().contains(&filter)),
        }
    })
}
