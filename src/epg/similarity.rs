//! Ratcliff/Obershelp similarity
//!
//! `ratio` is `2 * M / T` where `T` is the total number of characters in
//! both strings and `M` the number of characters in matching blocks, found
//! by taking the longest common substring and recursing on both sides of
//! it. Comparison is per Unicode scalar value, with no junk heuristic.

/// Similarity of two strings in `[0, 1]`
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

/// Similarity of two normalized names with a prefix bonus, capped at 1.0.
///
/// Either side being empty scores 0.
pub fn score(a: &str, b: &str, prefix_bonus: f64) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut similarity = ratio(a, b);
    if a.starts_with(b) || b.starts_with(a) {
        similarity += prefix_bonus;
    }
    similarity.min(1.0)
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`.
///
/// Ties go to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // lengths[j] = length of the common suffix of a[..i] and b[..j]
    let mut previous = vec![0usize; bhi - blo + 1];
    let mut current = vec![0usize; bhi - blo + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let slot = j - blo + 1;
            current[slot] = if a[i] == b[j] { previous[slot - 1] + 1 } else { 0 };
            let size = current[slot];
            if size > best_size {
                best_i = i + 1 - size;
                best_j = j + 1 - size;
                best_size = size;
            }
        }
        std::mem::swap(&mut previous, &mut current);
    }

    (best_i, best_j, best_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_identical_and_disjoint() {
        assert!(approx(ratio("espn", "espn"), 1.0));
        assert!(approx(ratio("abc", "xyz"), 0.0));
        assert!(approx(ratio("", ""), 1.0));
    }

    #[test]
    fn test_known_ratios() {
        // Same values Python's difflib.SequenceMatcher reports
        assert!(approx(ratio("abcd", "bcde"), 0.75));
        assert!(approx(ratio("sky sports", "sky sport"), 18.0 / 19.0));
        assert!(approx(ratio("fox", "fax"), 4.0 / 6.0));
    }

    #[test]
    fn test_symmetric_for_distinct_blocks() {
        assert!(approx(ratio("bein sports", "bein sport 1"), ratio("bein sport 1", "bein sports")));
    }

    #[test]
    fn test_prefix_bonus_is_capped() {
        let plain = ratio("sky sports", "sky sports main event");
        let boosted = score("sky sports", "sky sports main event", 0.1);
        assert!(approx(boosted, plain + 0.1));
        assert!(approx(score("espn", "espn", 0.1), 1.0));
        assert!(approx(score("", "espn", 0.1), 0.0));
    }
}
