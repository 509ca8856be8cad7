//! Union identification from contract file paths, plus effective-date discovery.

use once_cell::sync::Lazy;
use regex::Regex;
use reelrate_core::UnionInfo;

struct UnionRule {
    /// Matches when any of these appears in the path.
    any_of: &'static [&'static str],
    /// Additionally required, all of them.
    all_of: &'static [&'static str],
    union_local: &'static str,
    craft: &'static str,
}

const fn rule(
    any_of: &'static [&'static str],
    union_local: &'static str,
    craft: &'static str,
) -> UnionRule {
    UnionRule {
        any_of,
        all_of: &[],
        union_local,
        craft,
    }
}

// Order matters: first match wins, and `Local_80` must be tried before `Local_800`.
const UNION_RULES: &[UnionRule] = &[
    rule(&["Local_44", "Props"], "IATSE Local 44", "Property Craftspersons"),
    UnionRule {
        any_of: &["Local_80"],
        all_of: &["Grip"],
        union_local: "IATSE Local 80",
        craft: "Grips",
    },
    rule(&["Local_600", "Camera"], "IATSE Local 600", "Camera"),
    rule(&["Local_700", "Editors"], "IATSE Local 700", "Editors"),
    rule(&["Local_728", "Lighting"], "IATSE Local 728", "Lighting Technicians"),
    rule(&["Local_800", "Art_Director"], "IATSE Local 800", "Art Directors"),
    rule(&["Local_695", "Sound"], "IATSE Local 695", "Production Sound"),
    rule(&["Local_798", "Makeup"], "IATSE Local 798", "Makeup & Hair Stylists"),
    rule(&["Local_871", "Script"], "IATSE Local 871", "Script Supervisors"),
    rule(&["Local_892", "Costume"], "IATSE Local 892", "Costume Designers"),
    rule(&["Local_52"], "IATSE Local 52", "Studio Mechanics (NYC)"),
    rule(&["SAG-AFTRA", "SAG_AFTRA"], "SAG-AFTRA", "Actors"),
    rule(&["Teamsters", "399"], "Teamsters Local 399", "Drivers/Transportation"),
    rule(&["WGA"], "WGA", "Writers"),
    rule(&["IATSE_Basic"], "IATSE", "Multiple Crafts"),
];

/// Resolve the union local for a contract file. The path is matched as a whole,
/// directory components included.
pub fn union_for_path(path: &str) -> UnionInfo {
    UNION_RULES
        .iter()
        .find(|rule| {
            rule.any_of.iter().any(|needle| path.contains(needle))
                && rule.all_of.iter().all(|needle| path.contains(needle))
        })
        .map(|rule| UnionInfo::new(rule.union_local, rule.craft))
        .unwrap_or_default()
}

static DATE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,2}/\d{1,2}/\d{2,4})\s*(?:to|through|-)\s*(\d{1,2}/\d{1,2}/\d{2,4})")
        .unwrap()
});
static EFFECTIVE_ON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)effective[:\s]+(\d{1,2}/\d{1,2}/\d{2,4})").unwrap());
static COMMENCING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)commencing[:\s]+(?:with\s+)?([A-Za-z]+\s+\d{1,2},?\s*\d{4})").unwrap()
});

const MAX_EFFECTIVE_DATES: usize = 5;

/// Up to five effective-date strings, ranges first, then `effective:` and
/// `commencing` phrases.
pub fn effective_dates(text: &str) -> Vec<String> {
    let ranges = DATE_RANGE
        .captures_iter(text)
        .map(|caps| format!("{}-{}", &caps[1], &caps[2]));
    let effective = EFFECTIVE_ON.captures_iter(text).map(|caps| caps[1].to_string());
    let commencing = COMMENCING.captures_iter(text).map(|caps| caps[1].to_string());

    ranges
        .chain(effective)
        .chain(commencing)
        .take(MAX_EFFECTIVE_DATES)
        .collect()
}
