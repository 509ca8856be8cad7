//! Heuristic classifier for wage-schedule lines in extracted contract text.

use once_cell::sync::Lazy;
use regex::Regex;
use reelrate_core::RateType;
use serde::Serialize;

pub const BASE_KEYWORDS: &[&str] = &[
    "director", "designer", "technician", "supervisor", "assistant", "editor",
    "operator", "mixer", "engineer", "coordinator", "manager", "foreman",
    "chief", "gaffer", "grip", "electrician", "programmer", "artist",
    "painter", "carpenter", "prop", "set", "wardrobe", "makeup", "hair",
    "sound", "camera", "script", "accountant", "driver", "teamster",
    "consultant", "illustrator", "draftsperson", "trainee", "journeyman",
    "entry level", "best boy", "key", "lead", "senior", "junior",
];

/// Craft vocabulary for post, props (Local 44), grips (Local 80) and camera (Local 600).
pub const EXTENDED_KEYWORDS: &[&str] = &[
    "foley", "librarian", "apprentice", "montage", "serial", "shorts",
    "trailer", "effects", "music", "film", "head", "supervising",
    "maker", "decorator", "upholsterer", "draper", "greens", "sewing",
    "floor coverer", "powder", "property", "gang boss", "foreperson",
    "rigging", "dolly", "crane",
    "loader", "dit", "still photographer", "portrait",
];

/// Tunables that distinguish the legacy and standard line extractors.
#[derive(Debug, Clone)]
pub struct ExtractorProfile {
    pub name: &'static str,
    pub keywords: Vec<&'static str>,
    pub min_title_len: usize,
    pub require_capitalized_title: bool,
    pub require_keyword_in_title: bool,
    pub merge_experience_tiers: bool,
    pub track_sections: bool,
}

impl ExtractorProfile {
    pub fn legacy() -> Self {
        Self {
            name: "v1",
            keywords: BASE_KEYWORDS.to_vec(),
            min_title_len: 3,
            require_capitalized_title: false,
            require_keyword_in_title: false,
            merge_experience_tiers: false,
            track_sections: true,
        }
    }

    pub fn standard() -> Self {
        Self {
            name: "v2",
            keywords: BASE_KEYWORDS.iter().chain(EXTENDED_KEYWORDS).copied().collect(),
            min_title_len: 5,
            require_capitalized_title: true,
            require_keyword_in_title: true,
            merge_experience_tiers: true,
            track_sections: false,
        }
    }

    fn has_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords.iter().any(|kw| lower.contains(kw))
    }
}

impl Default for ExtractorProfile {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRateLine {
    pub occupation_code: String,
    pub title: String,
    pub amounts: Vec<f64>,
    pub rate: f64,
    pub rate_type: RateType,
}

static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\$\s*(?P<dollar>\d{1,3}(?:,\d{3})+(?:\.\d{2})?|\d+(?:\.\d{2})?)",
        r"|\b(?P<bare>\d{1,3}(?:,\d{3})+(?:\.\d{2})?|\d+\.\d{2})\b",
    ))
    .unwrap()
});
static OCCUPATION_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})\s+(.*)$").unwrap());
static RATE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\(?\b(?:hourly|daily|weekly)\b\)?\s*$").unwrap());
static SCHEDULE_CODE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*Z-\d+[a-z]*\s*$").unwrap());
static FOOTNOTE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\s*$").unwrap());
static TRAILING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,;:\-]+$").unwrap());
static HOURLY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bhourly\b|/\s*hr\b|\bper\s+hour\b").unwrap());
static STOPWORD_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:and|or|the|a|at|in|of|to|for|with|that|which|shall)\s").unwrap()
});
static GARBAGE_TITLE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^Productions?\s+LLC",
        r"(?i)^Salary\s+of",
        r"(?i)^Alliance\s+of",
        r"(?i)^Article\s+",
        r"(?i)^Section\s+",
        r"(?i)^Commences\s+On",
        r"(?i)^set\s+forth",
        r"(?i)^does\s+not",
        r"(?i)^Artists?\s+and\s+the",
        r"(?i)SVOD|AVOD|FAST|HB\s",
        r"(?i)pursuant\s+to",
        r"(?i)accordance\s+with",
        r"\d{4}-\d{2,4}",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});
static EXPERIENCE_TIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^((?:1st|2nd|3rd|4th|5th|first|second|third)\s+\d+\s*(?:months?|mos\.?)|thereafter)",
        r"\s*(\w[\w\-]*)?$",
    ))
    .unwrap()
});
static BARE_SCHEDULE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Z-\d+[a-z]*$").unwrap());

const MAX_CONTINUATION_LEN: usize = 50;

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

/// Amounts that look like currency: `$`-prefixed, or bare with cents or thousands separators.
pub fn currency_amounts(line: &str) -> Vec<f64> {
    AMOUNT
        .captures_iter(line)
        .filter_map(|caps| caps.name("dollar").or_else(|| caps.name("bare")))
        .filter_map(|m| parse_amount(m.as_str()))
        .collect()
}

fn clean_title(raw: &str) -> String {
    let mut title = raw.trim().to_string();
    loop {
        let before = title.clone();
        for pattern in [
            &*RATE_MARKER,
            &*SCHEDULE_CODE_SUFFIX,
            &*FOOTNOTE_DIGITS,
            &*TRAILING_PUNCT,
        ] {
            let stripped = pattern.replace(&title, "").trim().to_string();
            title = stripped;
        }
        if title == before {
            return title;
        }
    }
}

/// Split a candidate rate line into occupation code, title and amounts.
pub fn parse_rate_line(line: &str, profile: &ExtractorProfile) -> Option<ParsedRateLine> {
    let line = line.trim();
    if !profile.has_keyword(line) {
        return None;
    }

    let first_amount = AMOUNT.find(line)?;
    let prefix = &line[..first_amount.start()];
    let (occupation_code, title_part) = match OCCUPATION_CODE.captures(prefix.trim()) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => (String::new(), prefix.to_string()),
    };

    let title = clean_title(&title_part);
    if !title.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let amounts = currency_amounts(&line[first_amount.start()..]);
    let rate = amounts.iter().copied().fold(None, |acc: Option<f64>, amount| {
        Some(acc.map_or(amount, |current| current.max(amount)))
    })?;

    let rate_type = if HOURLY_MARKER.is_match(line) {
        RateType::Hourly
    } else {
        RateType::from_amount(rate)
    };

    if !is_valid_title(&title, profile) {
        return None;
    }

    Some(ParsedRateLine {
        occupation_code,
        title,
        amounts,
        rate,
        rate_type,
    })
}

pub fn is_valid_title(title: &str, profile: &ExtractorProfile) -> bool {
    if title.chars().count() < profile.min_title_len {
        return false;
    }
    if title.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
        return false;
    }
    if profile.require_capitalized_title && !title.chars().next().is_some_and(char::is_uppercase) {
        return false;
    }
    if STOPWORD_START.is_match(title) || GARBAGE_TITLE.iter().any(|re| re.is_match(title)) {
        return false;
    }
    !profile.require_keyword_in_title || profile.has_keyword(title)
}

/// Experience-tier line that qualifies the rate line before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub tier: Option<String>,
    pub schedule_code: Option<String>,
}

pub fn is_experience_continuation(line: &str) -> Option<Continuation> {
    let line = line.trim();
    if line.is_empty() || line.len() > MAX_CONTINUATION_LEN {
        return None;
    }

    if let Some(caps) = EXPERIENCE_TIER.captures(line) {
        return Some(Continuation {
            tier: Some(caps[1].trim().to_string()),
            schedule_code: caps.get(2).map(|m| m.as_str().to_string()),
        });
    }

    BARE_SCHEDULE_CODE.is_match(line).then(|| Continuation {
        tier: None,
        schedule_code: Some(line.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn largest_amount_is_the_primary_rate() {
        let parsed = parse_rate_line("Gaffer $599.00 $2,395.00", &ExtractorProfile::standard())
            .expect("rate line");
        assert_eq!(parsed.title, "Gaffer");
        assert_eq!(parsed.rate, 2395.0);
        assert_eq!(parsed.amounts, vec![599.0, 2395.0]);
        assert_eq!(parsed.rate_type, RateType::Weekly);
    }

    #[test]
    fn explicit_hourly_marker_wins_and_is_stripped_from_title() {
        let parsed = parse_rate_line("Key Grip (hourly) 45.00", &ExtractorProfile::standard())
            .expect("rate line");
        assert_eq!(parsed.title, "Key Grip");
        assert_eq!(parsed.rate, 45.0);
        assert_eq!(parsed.rate_type, RateType::Hourly);
    }

    #[test]
    fn occupation_code_and_schedule_suffix_are_split_off() {
        let parsed = parse_rate_line(
            "4121 Motion Picture Editor2 Z-1 $71.00 $65.55 $3,185.73 $4,014.30",
            &ExtractorProfile::standard(),
        )
        .expect("rate line");
        assert_eq!(parsed.occupation_code, "4121");
        assert_eq!(parsed.title, "Motion Picture Editor");
        assert_eq!(parsed.rate, 4014.30);
    }

    #[test]
    fn spaced_dollar_amounts_are_recognised() {
        let line = "7300 Prop Maker Foreman $ 57.43 $ 3,068.62";
        let parsed = parse_rate_line(line, &ExtractorProfile::standard()).expect("rate line");
        assert_eq!(parsed.title, "Prop Maker Foreman");
        assert_eq!(parsed.rate, 3068.62);
    }

    #[test]
    fn lines_without_keyword_or_amount_are_rejected() {
        let profile = ExtractorProfile::standard();
        assert!(parse_rate_line("Holiday pay $250.00", &profile).is_none());
        assert!(parse_rate_line("Camera Operator per agreement", &profile).is_none());
    }

    #[test]
    fn garbage_titles_are_rejected() {
        let profile = ExtractorProfile::standard();
        assert!(parse_rate_line("Section 12 Director $1,000.00", &profile).is_none());
        assert!(parse_rate_line("pursuant to the Director $1,000.00", &profile).is_none());
        assert!(parse_rate_line("HB SVOD Director $1,000.00", &profile).is_none());
    }

    #[test]
    fn legacy_profile_accepts_lowercase_titles() {
        let line = "set lighting tech $1,250.00";
        assert!(parse_rate_line(line, &ExtractorProfile::standard()).is_none());
        let parsed = parse_rate_line(line, &ExtractorProfile::legacy()).expect("legacy rate");
        assert_eq!(parsed.title, "set lighting tech");
    }

    #[test]
    fn experience_tiers_are_continuations() {
        let tier = is_experience_continuation("1st 6 months Z-5a").expect("tier");
        assert_eq!(tier.tier.as_deref(), Some("1st 6 months"));
        assert_eq!(tier.schedule_code.as_deref(), Some("Z-5a"));

        let thereafter = is_experience_continuation("Thereafter").expect("thereafter");
        assert_eq!(thereafter.tier.as_deref(), Some("Thereafter"));

        let code = is_experience_continuation("Z-10c").expect("code");
        assert_eq!(code.tier, None);

        assert!(is_experience_continuation("Camera Operator $2,000.00").is_none());
        assert!(is_experience_continuation(&"1st 6 months ".repeat(5)).is_none());
    }
}
