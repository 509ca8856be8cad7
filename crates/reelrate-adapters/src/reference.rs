//! Metadata helpers for reference manual chunks: topics, section titles, page ranges
//! and short summaries.

use once_cell::sync::Lazy;
use regex::Regex;

/// Topic → keywords; a topic applies when any keyword occurs in the lowercased text.
const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "fringes",
        &["fringe", "payroll", "health", "welfare", "pension", "iatse", "dga", "sag", "wga"],
    ),
    ("budget_hierarchy", &["topsheet", "account", "category", "detail", "level", "hierarchy"]),
    ("globals", &["global", "variable", "reusable"]),
    ("groups", &["group", "prep", "shoot", "wrap", "post"]),
    ("units", &["unit", "day", "week", "hour", "allow", "flat"]),
    ("formulas", &["formula", "calculation", "math", "compute"]),
    ("currency", &["currency", "exchange", "rate", "conversion"]),
    ("tax_incentives", &["tax", "credit", "incentive", "rebate"]),
    ("contractual_charges", &["contractual", "overhead", "fee", "producer"]),
    ("locations", &["location", "set", "studio"]),
    ("comparison", &["comparison", "variance", "original", "current"]),
    ("shortcuts", &["shortcut", "template", "library"]),
    ("printing", &["print", "report", "export", "pdf"]),
];

pub const GENERAL_TOPIC: &str = "general";
pub const DEFAULT_SUMMARY_LEN: usize = 500;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(Chapter|Section|\d+\.)\s+").unwrap());
static CHUNK_PAGES: Lazy<Regex> = Lazy::new(|| Regex::new(r"pages-(\d+)-(\d+)").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").unwrap());

/// Topics in table order, or `["general"]` when nothing matches.
pub fn extract_topics(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let topics: Vec<String> = TOPIC_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(topic, _)| topic.to_string())
        .collect();

    if topics.is_empty() {
        vec![GENERAL_TOPIC.to_string()]
    } else {
        topics
    }
}

fn is_all_caps(line: &str) -> bool {
    line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase)
}

/// Section heading from the first ten lines: a `Chapter`/`Section`/`N.` heading
/// (cut to 100 chars) or an all-caps line of 6 to 79 chars.
pub fn extract_section_title(text: &str) -> Option<String> {
    for line in text.trim().lines().take(10) {
        let line = line.trim();
        if HEADING.is_match(line) {
            return Some(line.chars().take(100).collect());
        }
        let len = line.chars().count();
        if is_all_caps(line) && len > 5 && len < 80 {
            return Some(line.to_string());
        }
    }
    None
}

/// Page range encoded in a chunk file name such as `manual-pages-41-60.pdf`.
pub fn parse_chunk_pages(filename: &str) -> Option<(i32, i32)> {
    let caps = CHUNK_PAGES.captures(filename)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// First sentences (up to five, each longer than 20 chars) that fit in `max_len`.
/// Falls back to a truncated prefix when no sentence qualifies.
pub fn summarize(text: &str, max_len: usize) -> String {
    let normalized = WHITESPACE.replace_all(text, " ");
    let normalized = normalized.trim();

    let mut summary = String::new();
    for sentence in SENTENCE_END.split(normalized).take(5) {
        let sentence = sentence.trim();
        if sentence.len() <= 20 {
            continue;
        }
        if summary.len() + sentence.len() >= max_len {
            break;
        }
        summary.push_str(sentence);
        summary.push_str(". ");
    }

    if summary.is_empty() {
        let prefix: String = normalized.chars().take(max_len).collect();
        format!("{prefix}...")
    } else {
        summary.trim_end().to_string()
    }
}
