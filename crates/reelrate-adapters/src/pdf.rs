//! Thin wrapper over `lopdf`: page text plus table rows rebuilt from where each text
//! run is drawn on the page.

use std::path::Path;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use reelrate_core::{PageContent, TableRow};
use tracing::{debug, warn};

use crate::AdapterError;

const HEADER_RULE_WIDTH: usize = 60;

/// Runs whose baselines differ by less than this share a line.
const LINE_TOLERANCE: f32 = 3.0;
/// Cell starts closer than this on the same page belong to one column.
const COLUMN_TOLERANCE: f32 = 6.0;
/// Average glyph advance as a share of the font size; no widths table is read.
const GLYPH_WIDTH_EM: f32 = 0.5;
/// A gap wider than this many ems after a run starts a new cell.
const CELL_GAP_EM: f32 = 1.0;

type Matrix = [f32; 6];
const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// One shown string and the user-space origin it was drawn at.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
}

impl TextRun {
    fn estimated_end(&self) -> f32 {
        self.x + self.text.chars().count() as f32 * self.font_size * GLYPH_WIDTH_EM
    }
}

/// Load every page of a PDF. Pages whose text cannot be decoded come back empty.
pub fn load_pages(path: &Path) -> Result<Vec<PageContent>, AdapterError> {
    let doc = Document::load(path).map_err(|source| AdapterError::Pdf {
        path: path.to_path_buf(),
        source,
    })?;

    let pages: Vec<PageContent> = doc
        .get_pages()
        .into_iter()
        .map(|(number, page_id)| {
            let text = doc.extract_text(&[number]).unwrap_or_else(|err| {
                warn!(
                    path = %path.display(),
                    page = number,
                    error = %err,
                    "page text extraction failed"
                );
                String::new()
            });
            let runs = page_runs(&doc, page_id).unwrap_or_else(|err| {
                warn!(
                    path = %path.display(),
                    page = number,
                    error = %err,
                    "page layout unreadable"
                );
                Vec::new()
            });
            let rows = rows_from_runs(runs);
            PageContent {
                number,
                text,
                tables: if rows.is_empty() { Vec::new() } else { vec![rows] },
            }
        })
        .collect();

    debug!(path = %path.display(), pages = pages.len(), "loaded pdf");
    Ok(pages)
}

fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn operand(operands: &[Object], idx: usize, default: f32) -> f32 {
    operands.get(idx).and_then(number).unwrap_or(default)
}

/// String operands decoded as UTF-16BE when marked so, Latin-1 otherwise.
fn decode_string(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    if let [0xFE, 0xFF, rest @ ..] = bytes.as_slice() {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }
    Some(bytes.iter().map(|&b| b as char).collect())
}

/// Walk a page's content stream, tracking the transformation and text matrices, and
/// collect every non-blank string it shows.
pub fn page_runs(doc: &Document, page_id: ObjectId) -> Result<Vec<TextRun>, lopdf::Error> {
    let content = Content::decode(&doc.get_page_content(page_id)?)?;

    let mut runs = Vec::new();
    let mut ctm = IDENTITY;
    let mut saved: Vec<Matrix> = Vec::new();
    let mut text_matrix = IDENTITY;
    let mut line_matrix = IDENTITY;
    let mut font_size: f32 = 12.0;
    let mut leading: f32 = 0.0;

    for op in &content.operations {
        let args = op.operands.as_slice();
        let shown = match op.operator.as_str() {
            "q" => {
                saved.push(ctm);
                None
            }
            "Q" => {
                if let Some(previous) = saved.pop() {
                    ctm = previous;
                }
                None
            }
            "cm" if args.len() >= 6 => {
                let m = [
                    operand(args, 0, 1.0),
                    operand(args, 1, 0.0),
                    operand(args, 2, 0.0),
                    operand(args, 3, 1.0),
                    operand(args, 4, 0.0),
                    operand(args, 5, 0.0),
                ];
                ctm = multiply(&m, &ctm);
                None
            }
            "BT" => {
                text_matrix = IDENTITY;
                line_matrix = IDENTITY;
                None
            }
            "Tf" => {
                font_size = operand(args, 1, font_size);
                None
            }
            "TL" => {
                leading = operand(args, 0, leading);
                None
            }
            "Td" | "TD" => {
                let (tx, ty) = (operand(args, 0, 0.0), operand(args, 1, 0.0));
                if op.operator == "TD" {
                    leading = -ty;
                }
                line_matrix = multiply(&translate(tx, ty), &line_matrix);
                text_matrix = line_matrix;
                None
            }
            "Tm" if args.len() >= 6 => {
                for (idx, slot) in text_matrix.iter_mut().enumerate() {
                    *slot = operand(args, idx, IDENTITY[idx]);
                }
                line_matrix = text_matrix;
                None
            }
            "T*" => {
                let down = translate(0.0, -next_line(leading, font_size));
                line_matrix = multiply(&down, &line_matrix);
                text_matrix = line_matrix;
                None
            }
            "Tj" => args.first().and_then(decode_string),
            "'" | "\"" => {
                let down = translate(0.0, -next_line(leading, font_size));
                line_matrix = multiply(&down, &line_matrix);
                text_matrix = line_matrix;
                args.last().and_then(decode_string)
            }
            "TJ" => args.first().and_then(|array| array.as_array().ok()).map(|parts| {
                parts.iter().filter_map(decode_string).collect::<String>()
            }),
            _ => None,
        };

        if let Some(text) = shown.filter(|t| !t.trim().is_empty()) {
            let placed = multiply(&text_matrix, &ctm);
            let scale = (placed[2].powi(2) + placed[3].powi(2)).sqrt();
            runs.push(TextRun {
                text,
                x: placed[4],
                y: placed[5],
                font_size: font_size * if scale > 0.0 { scale } else { 1.0 },
            });
        }
    }

    Ok(runs)
}

fn next_line(leading: f32, font_size: f32) -> f32 {
    if leading > 0.0 {
        leading
    } else {
        font_size * 1.2
    }
}

/// A cell before column assignment: merged text and where it starts.
struct Cell {
    text: String,
    x: f32,
}

/// Group runs into lines top to bottom, merge runs separated by less than a cell gap,
/// then place each cell in the page-wide column its left edge falls in. A line that
/// starts right of the first column gets leading `None` cells.
pub fn rows_from_runs(mut runs: Vec<TextRun>) -> Vec<TableRow> {
    runs.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut lines: Vec<Vec<TextRun>> = Vec::new();
    for run in runs {
        match lines.last_mut() {
            Some(line) if (line[0].y - run.y).abs() < LINE_TOLERANCE => line.push(run),
            _ => lines.push(vec![run]),
        }
    }

    let lines: Vec<Vec<Cell>> = lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
            merge_cells(line)
        })
        .collect();

    let columns = column_starts(lines.iter().flatten().map(|c| c.x));

    lines
        .into_iter()
        .map(|cells| {
            let mut row: TableRow = Vec::new();
            for cell in cells {
                let idx = column_index(&columns, cell.x);
                if row.len() <= idx {
                    row.resize(idx + 1, None);
                }
                match &mut row[idx] {
                    Some(existing) => {
                        existing.push(' ');
                        existing.push_str(&cell.text);
                    }
                    slot => *slot = Some(cell.text),
                }
            }
            row
        })
        .collect()
}

fn merge_cells(line: Vec<TextRun>) -> Vec<Cell> {
    let mut cells: Vec<Cell> = Vec::new();
    let mut end = f32::NEG_INFINITY;
    let mut gap_limit = 0.0;
    for run in line {
        let text = run.text.trim().to_string();
        match cells.last_mut() {
            Some(cell) if run.x - end <= gap_limit => {
                cell.text.push(' ');
                cell.text.push_str(&text);
            }
            _ => cells.push(Cell { text, x: run.x }),
        }
        end = end.max(run.estimated_end());
        gap_limit = run.font_size * CELL_GAP_EM;
    }
    cells
}

/// Left edges of the columns: sorted cell starts chained together while each is
/// within `COLUMN_TOLERANCE` of the previous one.
fn column_starts(xs: impl Iterator<Item = f32>) -> Vec<f32> {
    let mut xs: Vec<f32> = xs.collect();
    xs.sort_by(f32::total_cmp);
    let mut starts: Vec<f32> = Vec::new();
    let mut previous = f32::NEG_INFINITY;
    for x in xs {
        if x - previous > COLUMN_TOLERANCE {
            starts.push(x);
        }
        previous = x;
    }
    starts
}

fn column_index(starts: &[f32], x: f32) -> usize {
    starts.partition_point(|&start| start <= x).saturating_sub(1)
}

/// Render extracted pages in the contract text layout consumed by the rate extractors.
/// Returns `None` when no page carries any text.
pub fn render_contract_text(pages: &[PageContent], source_name: &str) -> Option<String> {
    let total = pages.len();
    let chunks: Vec<String> = pages
        .iter()
        .enumerate()
        .filter(|(_, page)| !page.text.trim().is_empty())
        .flat_map(|(idx, page)| {
            [
                format!("\n--- PAGE {} of {} ---\n", idx + 1, total),
                page.text.clone(),
            ]
        })
        .collect();

    if chunks.is_empty() {
        return None;
    }

    Some(format!(
        "SOURCE: {source_name}\nPAGES: {total}\n{}\n\n{}",
        "=".repeat(HEADER_RULE_WIDTH),
        chunks.join("\n")
    ))
}
