//! Movie Magic budget parsing: top-sheet metadata plus the department → line item →
//! period hierarchy recovered from detail-page table rows.

use once_cell::sync::Lazy;
use regex::Regex;
use reelrate_core::{
    BudgetMetadata, BudgetPeriod, BudgetTemplate, Department, DetailLine, ExtractionStats,
    LineItem, PageContent, PeriodBreakdown,
};
use tracing::debug;

static DEPARTMENT_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})\s+([A-Z\s&]+)$").unwrap());
static ACCOUNT_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})\s*$").unwrap());
static PLAIN_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d.,]+$").unwrap());
static DEPARTMENT_TOTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\s*([\d,]+)").unwrap());
static LOCATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Location:[ \t]*([^\n]+)").unwrap());
static SHOOT_DAYS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:Local\s*)?Location\s*Days").unwrap());
static SHOOT_DATES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Shoot\s*Dates?:[ \t]*([^\n]+)").unwrap());
static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static NAME_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").unwrap());

/// Parse a budget amount: `$` and thousands separators are dropped and
/// parentheses mean a negative value.
pub fn clean_amount(raw: &str) -> Option<f64> {
    let cleaned = raw
        .replace(['$', ','], "")
        .replace('(', "-")
        .replace(')', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse().ok()
}

fn cell(row: &[Option<String>], idx: usize) -> &str {
    row.get(idx).and_then(|c| c.as_deref()).map(str::trim).unwrap_or("")
}

fn plain_number(raw: &str) -> Option<f64> {
    if PLAIN_NUMBER.is_match(raw) {
        raw.replace(',', "").parse().ok()
    } else {
        None
    }
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetParserConfig {
    /// Zero-based index of the first detail page; earlier pages are summaries.
    pub first_detail_page: usize,
    /// Detail rows consumed per line item before it is closed regardless.
    pub max_detail_rows: usize,
}

impl Default for BudgetParserConfig {
    fn default() -> Self {
        Self {
            first_detail_page: 3,
            max_detail_rows: 20,
        }
    }
}

#[derive(Debug)]
enum ParserState {
    SeekingDepartment,
    SeekingLineItem,
    AccumulatingDetails { item: LineItem, rows_seen: usize },
}

/// Row-at-a-time parser. Rows may span pages; departments are emitted only once
/// they hold at least one line item.
#[derive(Debug)]
pub struct BudgetTableParser {
    config: BudgetParserConfig,
    state: ParserState,
    current: Option<Department>,
    departments: Vec<Department>,
}

impl BudgetTableParser {
    pub fn new(config: BudgetParserConfig) -> Self {
        Self {
            config,
            state: ParserState::SeekingDepartment,
            current: None,
            departments: Vec::new(),
        }
    }

    pub fn feed_page(&mut self, page: &PageContent) {
        for table in &page.tables {
            for row in table {
                self.feed_row(row);
            }
        }
    }

    pub fn feed_row(&mut self, row: &[Option<String>]) {
        let first = cell(row, 0);
        let second = cell(row, 1);

        if let ParserState::AccumulatingDetails { .. } = self.state {
            if self.ends_line_item(first, second) {
                self.close_line_item();
            } else {
                if let ParserState::AccumulatingDetails { item, rows_seen } = &mut self.state {
                    *rows_seen += 1;
                    let is_total = first.starts_with("Total $") || second.starts_with("Total $");
                    if row.iter().any(Option::is_some) && !is_total {
                        apply_detail_row(item, row);
                    }
                }
                return;
            }
        }

        if let Some(caps) = DEPARTMENT_HEADER.captures(first) {
            self.open_department(&caps[1], caps[2].trim());
            return;
        }

        if first.contains("AccountTotalfor") || first.contains("Account Total for") {
            self.close_department_with_total(first);
            return;
        }

        if self.current.is_none() {
            return;
        }

        let combined = format!("{first}{second}").to_lowercase();
        if ["total", "subtotal", "continuation"]
            .iter()
            .any(|kw| combined.contains(kw))
        {
            return;
        }

        if let Some(caps) = ACCOUNT_ONLY.captures(first) {
            self.state = ParserState::AccumulatingDetails {
                item: LineItem {
                    account: caps[1].to_string(),
                    description: second.to_string(),
                    position: second.to_string(),
                    ..LineItem::default()
                },
                rows_seen: 0,
            };
        }
    }

    fn ends_line_item(&self, first: &str, second: &str) -> bool {
        let ParserState::AccumulatingDetails { rows_seen, .. } = &self.state else {
            return false;
        };
        let combined = format!("{first}{second}").to_lowercase();
        *rows_seen >= self.config.max_detail_rows
            || ACCOUNT_ONLY.is_match(first)
            || DEPARTMENT_HEADER.is_match(first)
            || combined.contains("account total")
            || combined.contains("total fringes")
    }

    fn close_line_item(&mut self) {
        let state = std::mem::replace(&mut self.state, ParserState::SeekingLineItem);
        let ParserState::AccumulatingDetails { item, .. } = state else {
            return;
        };
        let keep = (!item.periods.is_empty() || !item.detail_lines.is_empty())
            && !item.description.is_empty()
            && !item.description.to_lowercase().contains("fringes");
        if !keep {
            return;
        }
        if let Some(dept) = self.current.as_mut() {
            dept.line_items.push(item);
        }
    }

    fn open_department(&mut self, account: &str, name: &str) {
        let same_department = self
            .current
            .as_ref()
            .and_then(|dept| dept.account.as_deref())
            .map(account_prefix)
            == Some(account_prefix(account));
        // Sub-account headers share the two-digit prefix of their department.
        if !same_department {
            self.flush_department();
            self.current = Some(new_department(account, name));
        }
        self.state = ParserState::SeekingLineItem;
    }

    fn close_department_with_total(&mut self, marker: &str) {
        let Some(dept) = self.current.as_mut() else {
            return;
        };
        if let Some(caps) = DEPARTMENT_TOTAL.captures(marker) {
            dept.total = clean_amount(&caps[1]);
        }
        if !dept.line_items.is_empty() {
            self.flush_department();
            self.state = ParserState::SeekingDepartment;
        }
    }

    fn flush_department(&mut self) {
        if let Some(dept) = self.current.take() {
            if dept.line_items.is_empty() {
                debug!(account = ?dept.account, "dropping department without line items");
            } else {
                self.departments.push(dept);
            }
        }
    }

    pub fn finish(mut self) -> Vec<Department> {
        if matches!(self.state, ParserState::AccumulatingDetails { .. }) {
            self.close_line_item();
        }
        self.flush_department();
        self.departments
    }
}

fn account_prefix(account: &str) -> &str {
    account.get(..2).unwrap_or(account)
}

fn new_department(account: &str, name: &str) -> Department {
    Department {
        name: Some(name.to_string()),
        account: Some(account.to_string()),
        total: None,
        line_items: Vec::new(),
    }
}

const MIN_DETAIL_CELLS: usize = 6;

fn apply_detail_row(item: &mut LineItem, row: &[Option<String>]) {
    if row.len() < MIN_DETAIL_CELLS {
        return;
    }

    let position = cell(row, 1).to_string();
    let detail = DetailLine {
        position: position.clone(),
        quantity: plain_number(cell(row, 2)),
        unit: non_empty(cell(row, 3)).map(|u| u.to_lowercase()),
        multiplier: plain_number(cell(row, 4)),
        rate: clean_amount(cell(row, 5)),
        subtotal: clean_amount(cell(row, 6)),
        total: clean_amount(cell(row, 7)),
    };

    if let Some(period) = BudgetPeriod::classify(&position) {
        item.periods.insert(
            period.as_str().to_string(),
            PeriodBreakdown {
                quantity: detail.quantity,
                unit: detail.unit.clone(),
                rate: detail.rate,
                subtotal: detail.subtotal,
            },
        );
        return;
    }

    if position.is_empty() || !detail.has_amounts() {
        return;
    }

    if item.position.is_empty() || item.position == item.description {
        item.position = position;
    }
    item.quantity = item.quantity.or(detail.quantity);
    item.unit = item.unit.clone().or_else(|| detail.unit.clone());
    item.rate = item.rate.or(detail.rate);
    if let Some(subtotal) = detail.subtotal {
        item.subtotal = Some(item.subtotal.unwrap_or(0.0) + subtotal);
    }
    item.detail_lines.push(detail);
}

/// Top-sheet metadata from the first page, grand total from the second.
pub fn extract_metadata(pages: &[PageContent], filename: &str) -> BudgetMetadata {
    let mut metadata = BudgetMetadata {
        filename: filename.to_string(),
        ..BudgetMetadata::default()
    };

    if let Some(first) = pages.first() {
        let text = &first.text;
        metadata.location = LOCATION.captures(text).map(|c| c[1].trim().to_string());
        metadata.shoot_days = SHOOT_DAYS.captures(text).and_then(|c| c[1].parse().ok());
        metadata.shoot_dates = SHOOT_DATES.captures(text).map(|c| c[1].trim().to_string());

        let upper = text.to_uppercase();
        metadata.production_type = if upper.contains("ONE HOUR") {
            Some("one_hour_pilot".to_string())
        } else if upper.contains("HALF HOUR") {
            Some("half_hour_pilot".to_string())
        } else if upper.contains("MULTI") {
            Some("multicam_pilot".to_string())
        } else {
            None
        };

        for row in first.tables.first().into_iter().flatten() {
            if row.len() < 2 {
                continue;
            }
            let desc = cell(row, 0);
            let amount = clean_amount(cell(row, row.len() - 1));

            if desc.contains("Above-The-Line") || desc.contains("ATL") {
                if desc.contains("Total") {
                    metadata.atl_total = amount;
                }
            } else if desc.contains("Below-The-Line") || desc.contains("BTL") {
                if desc.contains("Production") {
                    metadata.production_total = amount;
                } else if desc.contains("Other") || desc.contains("Post") {
                    metadata.post_total = amount;
                } else if desc.contains("Total") {
                    metadata.btl_total = amount;
                }
            } else if desc.contains("Other") && desc.contains("Total") {
                metadata.other_total = amount;
            }
        }
    }

    if let Some(second) = pages.get(1) {
        for row in second.tables.first().into_iter().flatten() {
            if !row.is_empty() && cell(row, 0).contains("Grand") {
                metadata.total_budget = clean_amount(cell(row, row.len() - 1));
            }
        }
    }

    metadata
}

pub fn extract_departments(pages: &[PageContent], config: BudgetParserConfig) -> Vec<Department> {
    let mut parser = BudgetTableParser::new(config);
    for page in pages.iter().skip(config.first_detail_page) {
        parser.feed_page(page);
    }
    parser.finish()
}

pub fn extract_budget(
    pages: &[PageContent],
    filename: &str,
    config: BudgetParserConfig,
) -> BudgetTemplate {
    let metadata = extract_metadata(pages, filename);
    let departments = extract_departments(pages, config);
    let extraction_stats = ExtractionStats {
        total_pages: pages.len(),
        departments_found: departments.len(),
        line_items_found: departments.iter().map(|d| d.line_items.len()).sum(),
        error: None,
    };

    BudgetTemplate {
        metadata,
        departments,
        extraction_stats,
    }
}

/// Error-shaped result for a budget that could not be read at all.
pub fn failed_budget(filename: &str, error: &str) -> BudgetTemplate {
    BudgetTemplate {
        metadata: BudgetMetadata {
            filename: filename.to_string(),
            error: Some(error.to_string()),
            ..BudgetMetadata::default()
        },
        departments: Vec::new(),
        extraction_stats: ExtractionStats {
            error: Some(error.to_string()),
            ..ExtractionStats::default()
        },
    }
}

/// File stem for the per-budget JSON output.
pub fn safe_output_name(filename: &str) -> String {
    let stem = filename.replace(".pdf", "");
    let stripped = UNSAFE_NAME_CHARS.replace_all(&stem, "");
    NAME_SEPARATORS.replace_all(&stripped, "_").into_owned()
}
