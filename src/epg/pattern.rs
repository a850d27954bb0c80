//! Weighted scoring of inclusion patterns against channel names

use crate::models::PatternMapping;

const LENGTH_WEIGHT: u32 = 10;
const EXACT_MATCH_BONUS: u32 = 10_000;
const PREFIX_BONUS: u32 = 3_000;
const WORD_PREFIX_BONUS: u32 = 2_500;
const WHOLE_WORD_BONUS: u32 = 1_000;
const WORD_ORDER_BONUS: u32 = 500;
const DIGIT_BONUS: u32 = 1_500;
const FIRST_WORD_BONUS: u32 = 1_800;

fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Relevance of `pattern` for `channel_name`, or `None` when the pattern is
/// not a case-insensitive substring of the name.
///
/// Longer and more specific patterns win: a pattern that starts the name,
/// shares its first word, matches whole words in order or pins a number
/// outranks a shorter generic one.
pub fn score_pattern(pattern: &str, channel_name: &str) -> Option<u32> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return None;
    }
    let pattern_lower = pattern.to_lowercase();
    let name_lower = channel_name.trim().to_lowercase();
    if !name_lower.contains(&pattern_lower) {
        return None;
    }

    let mut score = pattern.chars().count() as u32 * LENGTH_WEIGHT;

    if name_lower == pattern_lower {
        score += EXACT_MATCH_BONUS;
    }

    if channel_name.trim_start().starts_with(pattern) {
        score += PREFIX_BONUS;
    } else if name_lower.starts_with(&format!("{pattern_lower} ")) {
        score += WORD_PREFIX_BONUS;
    }

    let pattern_words = words(&pattern_lower);
    let name_words = words(&name_lower);

    let matched: Vec<&str> = pattern_words
        .iter()
        .copied()
        .filter(|w| name_words.contains(w))
        .collect();
    score += matched.len() as u32 * WHOLE_WORD_BONUS;
    if !matched.is_empty() && in_order(&matched, &name_words) {
        score += WORD_ORDER_BONUS;
    }

    if pattern.chars().any(|c| c.is_ascii_digit()) {
        score += DIGIT_BONUS;
    }

    if let (Some(first_pattern), Some(first_name)) = (pattern_words.first(), name_words.first()) {
        if first_pattern == first_name {
            score += FIRST_WORD_BONUS;
        }
    }

    Some(score)
}

fn in_order(matched: &[&str], name_words: &[&str]) -> bool {
    let mut position = 0;
    for word in matched {
        match name_words[position..].iter().position(|w| w == word) {
            Some(offset) => position += offset + 1,
            None => return false,
        }
    }
    true
}

/// Whether an exclusion mapping (`!pattern`) applies to the channel name
pub fn is_excluded_by(mapping: &PatternMapping, channel_name: &str) -> bool {
    if !mapping.is_exclusion() {
        return false;
    }
    let needle = mapping.needle().to_lowercase();
    !needle.is_empty() && channel_name.to_lowercase().contains(&needle)
}
