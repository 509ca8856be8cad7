//! Rate extractors: turn one contract text file into raw rate records.

use std::collections::HashSet;
use std::hash::Hash;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reelrate_core::{amount_cents, RateType, RawRate, UnionInfo};
use tracing::debug;

use crate::rate_line::{is_experience_continuation, parse_rate_line, ExtractorProfile};
use crate::union::{effective_dates, union_for_path};

pub trait RateExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, text: &str, source_file: &str) -> Vec<RawRate>;

    /// Order-preserving dedupe applied after all files are extracted.
    fn dedupe(&self, rates: Vec<RawRate>) -> Vec<RawRate> {
        dedupe_raw_rates(rates, RawRate::dedupe_key)
    }
}

pub fn dedupe_raw_rates<K, F>(rates: Vec<RawRate>, key: F) -> Vec<RawRate>
where
    K: Eq + Hash,
    F: Fn(&RawRate) -> K,
{
    let mut seen = HashSet::new();
    rates.into_iter().filter(|rate| seen.insert(key(rate))).collect()
}

static PERIOD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}/\d{1,2}/\d{2,4})\s*[-to]+\s*(\d{1,2}/\d{1,2}/\d{2,4})").unwrap()
});

const SHORT_SCHEDULE_LINE: usize = 30;
const MAX_SECTION_LEN: usize = 100;

/// Profile-driven line walker for IATSE-style wage schedules.
#[derive(Debug, Clone, Default)]
pub struct LineRateExtractor {
    profile: ExtractorProfile,
}

struct LineState {
    current_period: String,
    current_section: Option<String>,
    /// Accepted rate line that the next line may qualify with an experience tier.
    pending: Option<RawRate>,
}

impl LineRateExtractor {
    pub fn new(profile: ExtractorProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &ExtractorProfile {
        &self.profile
    }

    fn is_noise(line: &str) -> bool {
        let lower = line.to_lowercase();
        line.starts_with("---")
            || line.contains("PAGE")
            || lower.contains("printed on")
            || (lower.contains("schedule") && line.chars().count() < SHORT_SCHEDULE_LINE)
    }

    fn section_heading(line: &str) -> Option<String> {
        let lower = line.to_lowercase();
        (lower.contains("wage schedule") || lower.contains("rate schedule"))
            .then(|| line.chars().take(MAX_SECTION_LEN).collect())
    }
}

impl RateExtractor for LineRateExtractor {
    fn name(&self) -> &'static str {
        self.profile.name
    }

    fn extract(&self, text: &str, source_file: &str) -> Vec<RawRate> {
        let union = union_for_path(source_file);
        let fallback_period = effective_dates(text).into_iter().next().unwrap_or_default();
        let mut state = LineState {
            current_period: String::new(),
            current_section: None,
            pending: None,
        };
        let mut rates = Vec::new();

        for raw_line in text.lines() {
            let line = raw_line.trim();

            if let Some(mut pending) = state.pending.take() {
                match is_experience_continuation(line) {
                    Some(cont) => match cont.tier {
                        Some(tier) => {
                            pending.job_classification =
                                format!("{}, {}", pending.job_classification, tier);
                            rates.push(pending);
                            continue;
                        }
                        None => {
                            state.pending = Some(pending);
                            continue;
                        }
                    },
                    None => rates.push(pending),
                }
            }

            if line.is_empty() {
                continue;
            }

            if self.profile.track_sections {
                if let Some(section) = Self::section_heading(line) {
                    state.current_section = Some(section);
                    continue;
                }
            }

            if Self::is_noise(line) {
                continue;
            }

            if let Some(caps) = PERIOD_LINE.captures(line) {
                state.current_period = format!("{}-{}", &caps[1], &caps[2]);
                continue;
            }

            if self.profile.merge_experience_tiers && is_experience_continuation(line).is_some() {
                continue;
            }

            let Some(parsed) = parse_rate_line(line, &self.profile) else {
                continue;
            };

            let effective_period = if state.current_period.is_empty() {
                fallback_period.clone()
            } else {
                state.current_period.clone()
            };
            let rate = build_rate(
                &union,
                parsed.title,
                parsed.occupation_code,
                parsed.rate,
                parsed.rate_type,
                effective_period,
                state.current_section.clone(),
                source_file,
            );

            if self.profile.merge_experience_tiers {
                state.pending = Some(rate);
            } else {
                rates.push(rate);
            }
        }

        if let Some(pending) = state.pending.take() {
            rates.push(pending);
        }

        debug!(extractor = self.name(), source_file, count = rates.len(), "extracted rates");
        rates
    }
}

#[allow(clippy::too_many_arguments)]
fn build_rate(
    union: &UnionInfo,
    title: String,
    occupation_code: String,
    base_rate: f64,
    rate_type: RateType,
    effective_period: String,
    section: Option<String>,
    source_file: &str,
) -> RawRate {
    RawRate {
        union_local: union.union_local.clone(),
        craft: union.craft.clone(),
        job_classification: title,
        occupation_code,
        base_rate,
        rate_type,
        effective_period,
        section,
        source_file: source_file.to_string(),
    }
}

static DOLLAR_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\s*([\d,]+(?:\.\d{2})?)").unwrap());
static FIRST_DRAFT: Lazy<Regex> = Lazy::new(|| Regex::new(r"First\s+Draft\s+Screenplay").unwrap());
static FINAL_DRAFT: Lazy<Regex> = Lazy::new(|| Regex::new(r"Final\s+Draft\s+Screenplay").unwrap());
static FOURTEEN_OF_FOURTEEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)14\s+out\s+of\s+14").unwrap());
static FORTY_WEEKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"40\s+(?:out\s+of\s+)?(?:52\s+)?[Ww]eeks").unwrap());

const WGA_UNION: &str = "WGA";
const WGA_CRAFT: &str = "Writers";
const WRITING_NOISE_FLOOR: f64 = 1000.0;

struct WgaRule {
    matches: fn(&str) -> bool,
    label: &'static str,
    /// Append the current section, e.g. `Story Only (High Budget)`.
    sectioned: bool,
    rate_type: RateType,
    /// Rule only claims the line when a `$` amount is present.
    requires_amount: bool,
    min_amount: Option<f64>,
}

fn original_screenplay(line: &str) -> bool {
    line.contains("Original Screenplay") && line.contains("Treatment")
}

fn non_original_screenplay(line: &str) -> bool {
    line.contains("Non-Original Screenplay")
}

fn first_draft(line: &str) -> bool {
    FIRST_DRAFT.is_match(line)
}

fn final_draft(line: &str) -> bool {
    FINAL_DRAFT.is_match(line)
}

fn story_only(line: &str) -> bool {
    line.contains("Story Only") && !line.contains("Teleplay")
}

fn story_and_teleplay(line: &str) -> bool {
    line.contains("Story & Teleplay") || line.contains("Story and Teleplay")
}

fn teleplay_only(line: &str) -> bool {
    line.contains("Teleplay Only")
}

fn week_to_week(line: &str) -> bool {
    line.contains("Week-to-Week")
}

fn fourteen_of_fourteen(line: &str) -> bool {
    FOURTEEN_OF_FOURTEEN.is_match(line)
}

fn forty_weeks(line: &str) -> bool {
    FORTY_WEEKS.is_match(line)
}

fn rewrite(line: &str) -> bool {
    line.contains("Rewrite") && !line.contains("Polish")
}

fn polish(line: &str) -> bool {
    line.contains("Polish")
}

// First matching rule claims the line, even when it then yields no rate.
const WGA_RULES: &[WgaRule] = &[
    WgaRule {
        matches: original_screenplay,
        label: "Screenplay, Including Treatment",
        sectioned: true,
        rate_type: RateType::Flat,
        requires_amount: false,
        min_amount: None,
    },
    WgaRule {
        matches: non_original_screenplay,
        label: "Non-Original Screenplay",
        sectioned: true,
        rate_type: RateType::Flat,
        requires_amount: false,
        min_amount: None,
    },
    WgaRule {
        matches: first_draft,
        label: "First Draft Screenplay",
        sectioned: true,
        rate_type: RateType::Flat,
        requires_amount: false,
        min_amount: None,
    },
    WgaRule {
        matches: final_draft,
        label: "Final Draft Screenplay",
        sectioned: true,
        rate_type: RateType::Flat,
        requires_amount: false,
        min_amount: None,
    },
    WgaRule {
        matches: story_only,
        label: "Story Only",
        sectioned: true,
        rate_type: RateType::Flat,
        requires_amount: false,
        min_amount: None,
    },
    WgaRule {
        matches: story_and_teleplay,
        label: "Story & Teleplay",
        sectioned: true,
        rate_type: RateType::Flat,
        requires_amount: false,
        min_amount: None,
    },
    WgaRule {
        matches: teleplay_only,
        label: "Teleplay Only",
        sectioned: true,
        rate_type: RateType::Flat,
        requires_amount: false,
        min_amount: None,
    },
    WgaRule {
        matches: week_to_week,
        label: "Staff Writer (Week-to-Week)",
        sectioned: false,
        rate_type: RateType::Weekly,
        requires_amount: true,
        min_amount: None,
    },
    WgaRule {
        matches: fourteen_of_fourteen,
        label: "Staff Writer (14 out of 14 Weeks)",
        sectioned: false,
        rate_type: RateType::Weekly,
        requires_amount: true,
        min_amount: None,
    },
    WgaRule {
        matches: forty_weeks,
        label: "Staff Writer (40 Weeks Term)",
        sectioned: false,
        rate_type: RateType::Weekly,
        requires_amount: true,
        min_amount: None,
    },
    WgaRule {
        matches: rewrite,
        label: "Rewrite",
        sectioned: true,
        rate_type: RateType::Flat,
        requires_amount: true,
        min_amount: Some(WRITING_NOISE_FLOOR),
    },
    WgaRule {
        matches: polish,
        label: "Polish",
        sectioned: true,
        rate_type: RateType::Flat,
        requires_amount: true,
        min_amount: Some(WRITING_NOISE_FLOOR),
    },
];

/// Writers Guild schedule-of-minimums extractor.
#[derive(Debug, Clone)]
pub struct WgaScheduleExtractor {
    effective_date: NaiveDate,
}

impl Default for WgaScheduleExtractor {
    fn default() -> Self {
        Self {
            effective_date: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap_or_default(),
        }
    }
}

impl WgaScheduleExtractor {
    pub fn new(effective_date: NaiveDate) -> Self {
        Self { effective_date }
    }

    pub fn effective_date(&self) -> NaiveDate {
        self.effective_date
    }

    fn section_for(line: &str) -> Option<&'static str> {
        let upper = line.to_uppercase();
        if upper.contains("HIGH BUDGET") {
            Some("High Budget")
        } else if upper.contains("LOW BUDGET") {
            Some("Low Budget")
        } else if upper.contains("NETWORK PRIME TIME") {
            Some("Network Prime Time")
        } else if upper.contains("STAFF WRITER") && upper.contains("WEEK") {
            Some("Staff Writer")
        } else {
            None
        }
    }
}

/// Last `$` amount on the line; schedules list the latest contract year last.
fn last_dollar_amount(line: &str) -> Option<f64> {
    DOLLAR_AMOUNT
        .captures_iter(line)
        .last()
        .and_then(|caps| caps[1].replace(',', "").parse().ok())
}

impl RateExtractor for WgaScheduleExtractor {
    fn name(&self) -> &'static str {
        "wga"
    }

    fn extract(&self, text: &str, source_file: &str) -> Vec<RawRate> {
        let union = UnionInfo::new(WGA_UNION, WGA_CRAFT);
        let effective_period = self.effective_date.format("%Y-%m-%d").to_string();
        let mut section = "";
        let mut rates = Vec::new();

        for line in text.lines() {
            if let Some(found) = Self::section_for(line) {
                section = found;
            }

            let has_amount = DOLLAR_AMOUNT.is_match(line);
            let Some(rule) = WGA_RULES
                .iter()
                .find(|rule| (rule.matches)(line) && (has_amount || !rule.requires_amount))
            else {
                continue;
            };

            let Some(amount) = last_dollar_amount(line) else {
                continue;
            };
            if rule.min_amount.is_some_and(|floor| amount <= floor) {
                continue;
            }

            let title = if rule.sectioned {
                format!("{} ({})", rule.label, section)
            } else {
                rule.label.to_string()
            };
            rates.push(build_rate(
                &union,
                title,
                String::new(),
                amount,
                rule.rate_type,
                effective_period.clone(),
                None,
                source_file,
            ));
        }

        debug!(extractor = "wga", source_file, count = rates.len(), "extracted rates");
        rates
    }

    fn dedupe(&self, rates: Vec<RawRate>) -> Vec<RawRate> {
        dedupe_raw_rates(rates, |rate| {
            (
                rate.union_local.clone(),
                rate.job_classification.clone(),
                amount_cents(rate.base_rate),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL_728_SCHEDULE: &str = "\
SOURCE: IATSE_Local_728_Agreement.pdf
PAGES: 2
============================================================

--- PAGE 1 of 2 ---
WAGE SCHEDULE
8/4/24 - 8/2/25
Chief Lighting Technician $60.44 $2,417.60
Rigging Gaffer $57.62 $2,304.80
1st 6 months Z-5a
Best Boy Electrician $54.06 $2,162.40
thereafter Z-5c
Holiday pay $250.00
";

    #[test]
    fn standard_profile_merges_experience_tiers() {
        let extractor = LineRateExtractor::new(ExtractorProfile::standard());
        let rates = extractor.extract(LOCAL_728_SCHEDULE, "IATSE_Local_728/agreement.txt");
        let titles: Vec<_> = rates.iter().map(|r| r.job_classification.as_str()).collect();

        assert_eq!(
            titles,
            vec![
                "Chief Lighting Technician",
                "Rigging Gaffer, 1st 6 months",
                "Best Boy Electrician, thereafter",
            ]
        );
        assert!(rates.iter().all(|r| r.union_local == "IATSE Local 728"));
        assert!(rates.iter().all(|r| r.effective_period == "8/4/24-8/2/25"));
        assert_eq!(rates[1].base_rate, 2304.80);
        assert_eq!(rates[1].rate_type, RateType::Weekly);
    }

    #[test]
    fn legacy_profile_tracks_sections_without_merging() {
        let extractor = LineRateExtractor::new(ExtractorProfile::legacy());
        let rates = extractor.extract(LOCAL_728_SCHEDULE, "IATSE_Local_728/agreement.txt");
        let titles: Vec<_> = rates.iter().map(|r| r.job_classification.as_str()).collect();

        assert_eq!(
            titles,
            vec!["Chief Lighting Technician", "Rigging Gaffer", "Best Boy Electrician"]
        );
        assert!(rates.iter().all(|r| r.section.as_deref() == Some("WAGE SCHEDULE")));
    }

    #[test]
    fn period_falls_back_to_the_first_effective_date() {
        let text = "Agreement effective: 8/4/2024\nCamera Operator $3,100.00\n";
        let rates = LineRateExtractor::default().extract(text, "Local_600/rates.txt");
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].effective_period, "8/4/2024");
        assert_eq!(rates[0].craft, "Camera");
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let extractor = LineRateExtractor::default();
        let text = "Camera Operator $3,100.00\n\
                    Camera Operator $3,100.00\n\
                    Camera Operator $3,200.00\n";
        let rates = extractor.dedupe(extractor.extract(text, "Local_600/rates.txt"));
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].base_rate, 3100.0);
        assert_eq!(rates[1].base_rate, 3200.0);
    }

    const WGA_SCHEDULE: &str = "\
THEATRICAL COMPENSATION - HIGH BUDGET
A. Original Screenplay, Including Treatment $186,418 $192,943 $198,712
B. Non-Original Screenplay, no treatment $161,568 $167,223 $172,240
Story Only $ 71,425 $ 73,925 $ 76,143
Rewrite of Screenplay $ 60,000
Polish of Screenplay $ 500
NETWORK PRIME TIME
Story & Teleplay $ 30,000 $ 31,050 $ 32,000
Teleplay Only
Week-to-Week $ 5,000 $ 5,200
";

    #[test]
    fn wga_rules_use_the_last_amount_and_section() {
        let extractor = WgaScheduleExtractor::default();
        let rates = extractor.extract(WGA_SCHEDULE, "WGA/schedule.txt");
        let found: Vec<_> = rates
            .iter()
            .map(|r| (r.job_classification.as_str(), r.base_rate, r.rate_type))
            .collect();

        assert_eq!(
            found,
            vec![
                ("Screenplay, Including Treatment (High Budget)", 198712.0, RateType::Flat),
                ("Non-Original Screenplay (High Budget)", 172240.0, RateType::Flat),
                ("Story Only (High Budget)", 76143.0, RateType::Flat),
                ("Rewrite (High Budget)", 60000.0, RateType::Flat),
                ("Story & Teleplay (Network Prime Time)", 32000.0, RateType::Flat),
                ("Staff Writer (Week-to-Week)", 5200.0, RateType::Weekly),
            ]
        );
        assert!(rates.iter().all(|r| r.effective_period == "2025-05-02"));
    }

    #[test]
    fn wga_dedupe_ignores_rate_type() {
        let extractor = WgaScheduleExtractor::default();
        let mut rates = extractor.extract("Week-to-Week $ 5,000\n", "WGA/a.txt");
        let mut again = rates.clone();
        again[0].rate_type = RateType::Flat;
        rates.extend(again);
        assert_eq!(extractor.dedupe(rates).len(), 1);
    }
}
