//! Channel name normalization for fuzzy comparison

use regex::Regex;
use std::sync::OnceLock;

struct NamePatterns {
    bracketed: Regex,
    quality: Regex,
    language: Regex,
    punctuation: Regex,
}

fn patterns() -> &'static NamePatterns {
    static PATTERNS: OnceLock<NamePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| NamePatterns {
        bracketed: Regex::new(r"\([^)]*\)|\[[^\]]*\]|\{[^}]*\}").expect("valid bracket pattern"),
        quality: Regex::new(
            r"(?i)\b(?:UHD|FHD|HD|SD|HQ|LQ|4K|8K|2160[pi]?|1080[pi]?|720[pi]?|576[pi]?|480[pi]?|HEVC|H\.?26[45]|X26[45]|AVC|AAC|AC3|HDR|50FPS|60FPS)\b",
        )
        .expect("valid quality pattern"),
        language: Regex::new(r"(?i)\b(?:ENG|ESP|SPA|MULTI|MULTIAUDIO|DUAL|VO|VOSE)\b")
            .expect("valid language pattern"),
        punctuation: Regex::new(r"[^\p{L}\p{N}\s]+").expect("valid punctuation pattern"),
    })
}

/// Reduce a display name to its comparable base form.
///
/// Removes bracketed content (`(EN)`, `[ES]`), resolution, codec and quality
/// tokens, bare language markers and punctuation, then lowercases and
/// collapses whitespace. The result is a fixed point:
/// `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(name: &str) -> String {
    let p = patterns();
    let stripped = p.bracketed.replace_all(name, " ");
    let stripped = p.quality.replace_all(&stripped, " ");
    let stripped = p.language.replace_all(&stripped, " ");
    let stripped = p.punctuation.replace_all(&stripped, " ");

    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
