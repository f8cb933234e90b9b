use std::collections::HashMap;

use crate::types::RawItem;

/// Tuning for the approximate item search. Defaults favor precision over
/// recall: a tight threshold, zero location bias and a moderate distance
/// tolerance.
#[derive(Debug, Clone)]
pub struct FuzzyOptions {
    /// Order survivors by ascending score (best match first).
    pub should_sort: bool,
    /// Maximum acceptable match score; 0.0 demands perfection, 1.0 accepts
    /// anything.
    pub threshold: f64,
    /// Text position the pattern is expected near.
    pub location: usize,
    /// How far from `location` a match may drift before the proximity
    /// penalty alone disqualifies it.
    pub distance: usize,
    /// Patterns longer than this are truncated before matching.
    pub max_pattern_length: usize,
    /// Queries shorter than this match nothing.
    pub min_match_char_length: usize,
    /// Raw-record fields the pattern is matched against.
    pub keys: Vec<String>,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            should_sort: true,
            threshold: 0.15,
            location: 0,
            distance: 100,
            max_pattern_length: 32,
            min_match_char_length: 1,
            keys: vec![
                "uuid".to_string(),
                "vaultUuid".to_string(),
                "overview.ainfo".to_string(),
                "overview.title".to_string(),
                "overview.url".to_string(),
            ],
        }
    }
}

fn field_text<'a>(item: &'a RawItem, key: &str) -> Option<&'a str> {
    match key {
        "uuid" => Some(&item.uuid),
        "vaultUuid" => Some(&item.vault_uuid),
        "overview.ainfo" => Some(&item.overview.ainfo),
        "overview.title" => Some(&item.overview.title),
        "overview.url" => Some(&item.overview.url),
        _ => None,
    }
}

/// Substitution-tolerant bitap score for `pattern` in `text`, both already
/// lowercased. `None` when no match clears the threshold. Score combines
/// error ratio and distance from the expected location, lower is better.
fn bitap_score(text: &str, pattern: &str, options: &FuzzyOptions) -> Option<f64> {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let m = pattern_chars.len();
    if m == 0 || m < options.min_match_char_length || m > 64 {
        return None;
    }

    let mut mask: HashMap<char, u64> = HashMap::new();
    for (i, ch) in pattern_chars.iter().enumerate() {
        *mask.entry(*ch).or_insert(0) |= 1 << i;
    }
    let match_bit = 1u64 << (m - 1);

    // Error budget the accuracy term alone allows under the threshold.
    let max_errors = ((options.threshold * m as f64).floor() as usize).min(m.saturating_sub(1));

    let score_at = |errors: usize, start: i64| -> f64 {
        let accuracy = errors as f64 / m as f64;
        let proximity = (options.location as i64 - start).unsigned_abs();
        if options.distance == 0 {
            if proximity == 0 { accuracy } else { 1.0 }
        } else {
            accuracy + proximity as f64 / options.distance as f64
        }
    };

    // levels[d]: active pattern prefixes with exactly <= d substitutions
    let mut levels = vec![0u64; max_errors + 1];
    let mut best: Option<f64> = None;

    for (i, ch) in text.chars().enumerate() {
        let ch_mask = mask.get(&ch).copied().unwrap_or(0);
        let mut prev_old = levels[0];
        levels[0] = ((levels[0] << 1) | 1) & ch_mask;
        for d in 1..=max_errors {
            let old = levels[d];
            levels[d] = (((old << 1) | 1) & ch_mask) | ((prev_old << 1) | 1);
            prev_old = old;
        }
        for (d, level) in levels.iter().enumerate() {
            if level & match_bit != 0 {
                let start = i as i64 + 1 - m as i64;
                let score = score_at(d, start.max(0));
                if score <= options.threshold && best.is_none_or(|b| score < b) {
                    best = Some(score);
                }
                break;
            }
        }
    }

    best
}

fn item_score(item: &RawItem, pattern: &str, options: &FuzzyOptions) -> Option<f64> {
    options
        .keys
        .iter()
        .filter_map(|key| field_text(item, key))
        .filter(|text| !text.is_empty())
        .filter_map(|text| bitap_score(&text.to_lowercase(), pattern, options))
        .fold(None, |best: Option<f64>, score| {
            Some(best.map_or(score, |b| b.min(score)))
        })
}

/// Narrow a raw item list by approximate text match. Applied strictly
/// before normalization so matching sees the unmapped overview fields.
pub(crate) fn search(items: &[RawItem], query: &str, options: &FuzzyOptions) -> Vec<RawItem> {
    let pattern: String = query
        .to_lowercase()
        .chars()
        .take(options.max_pattern_length)
        .collect();
    if pattern.is_empty() {
        return items.to_vec();
    }

    let mut scored: Vec<(f64, &RawItem)> = items
        .iter()
        .filter_map(|item| item_score(item, &pattern, options).map(|score| (score, item)))
        .collect();
    if options.should_sort {
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    }
    scored.into_iter().map(|(_, item)| item.clone()).collect()
}
