//! Spreadsheet rendering of an assembled [`Report`].
//!
//! ```text
//! Sheet: Instructions
//! Sheet: <group>          (one per group, in report order)
//! | Title | Mastery | alice | bob | Tagged |   <- frozen header
//! |       |                                    <- blank separator
//! | <category> (bold)                          <- category separator
//! | Title | Mastery | alice | bob | Tagged |   <- table header
//! | ...   | ...     | DONE  | 3/10| Weekly |   <- table rows (outline-grouped)
//! ```

use std::collections::HashSet;

use camino::Utf8Path;
use regex::Regex;
use rust_xlsxwriter::{Format, Table, TableColumn, TableStyle, Workbook, Worksheet};

use crate::error::TrackerError;
use crate::report::{CategoryBlock, GroupSheet, MASTERY_COLUMN, Report, TAG_COLUMN, TITLE_COLUMN};

pub const INSTRUCTIONS_SHEET: &str = "Instructions";

const INSTRUCTIONS: &[&str] = &[
    "",
    "Guild Achievements tracker:",
    "",
    "Achievement Groups are separated as worksheets.",
    "",
    "Achievement Categories are collapsible tables.",
    "",
    "The 'Tagged' column allows you to filter the view to only those items.",
];

const SHEET_NAME_MAX: usize = 31;
const TABLE_NAME_MAX: usize = 255;

/// Renders a report into a file.
pub trait ReportWriter {
    fn write(&self, report: &Report, path: &Utf8Path) -> Result<(), TrackerError>;
}

#[derive(Debug, Clone)]
pub struct XlsxReportWriter {
    /// Width of the Title column.
    pub title_width: f64,
    pub include_instructions: bool,
}

impl Default for XlsxReportWriter {
    fn default() -> Self {
        Self {
            title_width: 60.0,
            include_instructions: true,
        }
    }
}

impl XlsxReportWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_to_buffer(&self, report: &Report) -> Result<Vec<u8>, TrackerError> {
        let mut workbook = self.build_workbook(report)?;
        workbook.save_to_buffer().map_err(xlsx_err)
    }

    fn build_workbook(&self, report: &Report) -> Result<Workbook, TrackerError> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let header = column_headers(report);
        let mut sheet_names = SheetNamer::default();
        let mut table_names = TableNamer::new()?;

        if self.include_instructions {
            let sheet = workbook.add_worksheet();
            sheet
                .set_name(sheet_names.claim(INSTRUCTIONS_SHEET))
                .map_err(xlsx_err)?;
            for (row, line) in INSTRUCTIONS.iter().enumerate() {
                sheet.write_string(row as u32, 0, *line).map_err(xlsx_err)?;
            }
        }

        for group in &report.sheets {
            let sheet = workbook.add_worksheet();
            sheet
                .set_name(sheet_names.claim(&group.name))
                .map_err(xlsx_err)?;
            self.write_group(sheet, group, &header, &bold, &mut table_names)?;
        }

        Ok(workbook)
    }

    fn write_group(
        &self,
        sheet: &mut Worksheet,
        group: &GroupSheet,
        header: &[String],
        bold: &Format,
        table_names: &mut TableNamer,
    ) -> Result<(), TrackerError> {
        for (col, title) in header.iter().enumerate() {
            sheet
                .write_string_with_format(0, col as u16, title, bold)
                .map_err(xlsx_err)?;
        }
        sheet.set_freeze_panes(1, 0).map_err(xlsx_err)?;
        sheet
            .set_column_width(0, self.title_width)
            .map_err(xlsx_err)?;

        let mut next_row = 1u32;
        for block in &group.blocks {
            next_row = write_block(sheet, &group.name, block, header, bold, table_names, next_row)?;
        }
        Ok(())
    }
}

impl ReportWriter for XlsxReportWriter {
    fn write(&self, report: &Report, path: &Utf8Path) -> Result<(), TrackerError> {
        let mut workbook = self.build_workbook(report)?;
        workbook.save(path.as_std_path()).map_err(xlsx_err)
    }
}

/// Writes one category block starting at `row`; returns the next free row.
fn write_block(
    sheet: &mut Worksheet,
    group_name: &str,
    block: &CategoryBlock,
    header: &[String],
    bold: &Format,
    table_names: &mut TableNamer,
    row: u32,
) -> Result<u32, TrackerError> {
    // blank separator row, then the category name
    let name_row = row + 1;
    sheet
        .write_string_with_format(name_row, 0, &block.name, bold)
        .map_err(xlsx_err)?;

    let top_row = name_row + 1;
    for (col, title) in header.iter().enumerate() {
        sheet
            .write_string(top_row, col as u16, title)
            .map_err(xlsx_err)?;
    }
    for (offset, report_row) in block.rows.iter().enumerate() {
        let row = top_row + 1 + offset as u32;
        for (col, cell) in report_row.cells().into_iter().enumerate() {
            sheet.write_string(row, col as u16, cell).map_err(xlsx_err)?;
        }
    }

    let last_row = top_row + block.rows.len() as u32;
    if !block.rows.is_empty() {
        let columns: Vec<TableColumn> = header
            .iter()
            .map(|title| TableColumn::new().set_header(title))
            .collect();
        let table = Table::new()
            .set_name(table_names.claim(&format!("{group_name}_{}", block.name)))
            .set_style(TableStyle::Medium16)
            .set_banded_rows(true)
            .set_columns(&columns);
        let last_col = header.len().saturating_sub(1) as u16;
        sheet
            .add_table(top_row, 0, last_row, last_col, &table)
            .map_err(xlsx_err)?;
    }
    sheet.group_rows(top_row, last_row).map_err(xlsx_err)?;

    Ok(last_row + 1)
}

/// Header cells for every group sheet and table.
///
/// Excel table columns must be unique ignoring case, so a user named like a
/// fixed column or like another user gets a `_2`, `_3`, ... suffix.
pub fn column_headers(report: &Report) -> Vec<String> {
    let fixed = [TITLE_COLUMN, MASTERY_COLUMN, TAG_COLUMN];
    let mut used: HashSet<String> = fixed.iter().map(|name| name.to_lowercase()).collect();

    let mut header = vec![TITLE_COLUMN.to_string(), MASTERY_COLUMN.to_string()];
    for user in &report.users {
        let base = match user.trim() {
            "" => "User",
            trimmed => trimmed,
        };
        let mut candidate = base.to_string();
        let mut suffix = 2usize;
        while !used.insert(candidate.to_lowercase()) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        header.push(candidate);
    }
    header.push(TAG_COLUMN.to_string());
    header
}

#[derive(Debug, Default)]
struct SheetNamer {
    used: HashSet<String>,
}

impl SheetNamer {
    fn claim(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        let mut candidate = base.clone();
        let mut suffix = 2usize;
        while !self.used.insert(candidate.to_lowercase()) {
            let tail = format!(" ({suffix})");
            let keep = SHEET_NAME_MAX.saturating_sub(tail.chars().count());
            candidate = format!("{}{tail}", trim_sheet_name(&truncate(&base, keep)));
            suffix += 1;
        }
        candidate
    }
}

/// Excel sheet names: at most 31 chars, none of `[]:*?/\`, no leading or trailing `'`.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| match ch {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    let name = trim_sheet_name(&truncate(trim_sheet_name(&cleaned), SHEET_NAME_MAX)).to_string();
    if name.is_empty() {
        "Group".to_string()
    } else if name.eq_ignore_ascii_case("history") {
        // reserved by Excel
        format!("{name}_")
    } else {
        name
    }
}

// Excel rejects names with a leading or trailing apostrophe.
fn trim_sheet_name(name: &str) -> &str {
    name.trim_matches(|ch: char| ch.is_whitespace() || ch == '\'')
}

fn truncate(name: &str, max: usize) -> String {
    name.chars().take(max).collect()
}

struct TableNamer {
    separators: Regex,
    used: HashSet<String>,
}

impl TableNamer {
    fn new() -> Result<Self, TrackerError> {
        let separators = Regex::new(r#"[\s:,`'"]+"#)
            .map_err(|err| TrackerError::ReportWrite(err.to_string()))?;
        Ok(Self {
            separators,
            used: HashSet::new(),
        })
    }

    fn claim(&mut self, raw: &str) -> String {
        let base = sanitize_table_name(&self.separators, raw);
        let mut candidate = base.clone();
        let mut suffix = 2usize;
        while !self.used.insert(candidate.to_lowercase()) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        candidate
    }
}

/// Excel table names: letters, digits, `_` and `.`, starting with a letter or `_`.
fn sanitize_table_name(separators: &Regex, raw: &str) -> String {
    let joined = separators.replace_all(raw, "_");
    let mut name: String = joined
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if !name.starts_with(|ch: char| ch.is_alphabetic() || ch == '_') {
        name.insert(0, '_');
    }
    // names such as "A1" or "R1C1" read as cell references
    if looks_like_cell_ref(&name) {
        name.insert(0, '_');
    }
    name.chars().take(TABLE_NAME_MAX - 8).collect()
}

fn looks_like_cell_ref(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    let letters = upper.chars().take_while(char::is_ascii_alphabetic).count();
    let rest = &upper[letters..];
    let a1 = (1..=3).contains(&letters)
        && !rest.is_empty()
        && rest.chars().all(|ch| ch.is_ascii_digit());
    a1 || upper == "R" || upper == "C" || upper.starts_with("R1C")
}

fn xlsx_err(err: rust_xlsxwriter::XlsxError) -> TrackerError {
    TrackerError::ReportWrite(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_name(raw: &str) -> String {
        let namer = TableNamer::new().unwrap();
        sanitize_table_name(&namer.separators, raw)
    }

    #[test]
    fn table_names_collapse_separators() {
        assert_eq!(table_name("Heart of Thorns_Mastery: Act 1"), "Heart_of_Thorns_Mastery_Act_1");
        assert_eq!(table_name("Living World, \"Season\" 2"), "Living_World_Season_2");
    }

    #[test]
    fn table_names_start_with_letter() {
        assert_eq!(table_name("2019_Festival"), "_2019_Festival");
        assert_eq!(table_name("A1"), "_A1");
        assert_eq!(table_name("Path of Fire (PoF)"), "Path_of_Fire__PoF_");
    }

    #[test]
    fn table_names_are_unique() {
        let mut namer = TableNamer::new().unwrap();
        assert_eq!(namer.claim("Story_Act 1"), "Story_Act_1");
        assert_eq!(namer.claim("Story_Act:1"), "Story_Act_1_2");
    }

    #[test]
    fn sheet_names_fit_excel_rules() {
        assert_eq!(sanitize_sheet_name("Fractals/Raids?"), "Fractals_Raids_");
        assert_eq!(sanitize_sheet_name(""), "Group");
        assert_eq!(sanitize_sheet_name("History"), "History_");
        assert_eq!(
            sanitize_sheet_name("An exceedingly long achievement group name")
                .chars()
                .count(),
            31
        );

        let mut namer = SheetNamer::default();
        assert_eq!(namer.claim("Story"), "Story");
        assert_eq!(namer.claim("story"), "story (2)");
    }

    #[test]
    fn truncated_sheet_names_are_trimmed_again() {
        let apostrophe = format!("{}'s rest of a long name", "A".repeat(30));
        assert_eq!(sanitize_sheet_name(&apostrophe), "A".repeat(30));

        let space = format!("{} tail", "B".repeat(30));
        assert_eq!(sanitize_sheet_name(&space), "B".repeat(30));

        let mut namer = SheetNamer::default();
        let base = format!("{} {}", "C".repeat(26), "D".repeat(4));
        assert_eq!(namer.claim(&base), base);
        assert_eq!(namer.claim(&base), format!("{} (2)", "C".repeat(26)));
    }
}
