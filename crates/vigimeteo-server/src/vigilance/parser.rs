//! Free-text bulletin parsing.
//!
//! Bulletins are French prose. The level is the maximum of every colour
//! phrase ("vigilance rouge", "niveau orange", ...) and every explicit
//! numeric level ("niveau: 3", "vig=2") found on any line, starting from
//! green. Phenomena are plain keyword hits.

use std::sync::LazyLock;

use regex::Regex;

use super::{LEVEL_GREEN, LEVEL_ORANGE, LEVEL_PURPLE, LEVEL_RED, LEVEL_YELLOW};

static COLOR_PATTERNS: LazyLock<Vec<(Regex, i32)>> = LazyLock::new(|| {
    [
        (r"(?i)\b(?:vigilance|niveau|alerte)\s+(?:violette|violet)\b", LEVEL_PURPLE),
        (r"(?i)\b(?:vigilance|niveau|alerte)\s+rouge\b", LEVEL_RED),
        (r"(?i)\b(?:vigilance|niveau|alerte)\s+orange\b", LEVEL_ORANGE),
        (r"(?i)\b(?:vigilance|niveau|alerte)\s+jaune\b", LEVEL_YELLOW),
        (r"(?i)\b(?:vigilance|niveau|alerte)\s+(?:verte|vert)\b", LEVEL_GREEN),
    ]
    .into_iter()
    .map(|(pattern, level)| (Regex::new(pattern).expect("static regex is valid"), level))
    .collect()
});

static NUMERIC_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:couleur|color|niveau|level|niv|vig)[:\s=]*(\d)")
        .expect("static regex is valid")
});

/// Phenomenon keywords, matched as lowercase substrings.
pub const PHENOMENA: &[&str] = &[
    "vent",
    "pluie",
    "orage",
    "inondation",
    "cyclone",
    "houle",
    "submersion",
    "canicule",
    "grand froid",
    "neige",
    "verglas",
    "avalanche",
    "vague",
];

/// Level and phenomena extracted from a bulletin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBulletin {
    pub color_level: i32,
    pub phenomena: Vec<String>,
}

/// Parse a bulletin. Never fails: text without any level marker is green.
pub fn parse_bulletin(text: &str) -> ParsedBulletin {
    let mut level = LEVEL_GREEN;
    let mut phenomena: Vec<String> = Vec::new();

    for line in text.lines() {
        level = level.max(line_level(line));

        let lower = line.to_lowercase();
        let mut hits: Vec<(usize, &str)> = PHENOMENA
            .iter()
            .filter_map(|kw| lower.find(kw).map(|pos| (pos, *kw)))
            .collect();
        hits.sort_unstable();
        for (_, kw) in hits {
            if !phenomena.iter().any(|p| p == kw) {
                phenomena.push(kw.to_string());
            }
        }
    }

    ParsedBulletin {
        color_level: level,
        phenomena,
    }
}

/// Highest level mentioned on a single line, or 0 if none.
fn line_level(line: &str) -> i32 {
    let named = COLOR_PATTERNS
        .iter()
        .filter(|(re, _)| re.is_match(line))
        .map(|(_, level)| *level)
        .max()
        .unwrap_or(0);

    let numeric = NUMERIC_LEVEL
        .captures_iter(line)
        .filter_map(|caps| caps.get(1))
        .filter_map(|digit| digit.as_str().parse::<i32>().ok())
        .filter(|n| (LEVEL_GREEN..=LEVEL_PURPLE).contains(n))
        .max()
        .unwrap_or(0);

    named.max(numeric)
}
