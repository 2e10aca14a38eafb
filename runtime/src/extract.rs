// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Structured extraction from rendered fixture pages.
//!
//! Pure functions over an HTML string: no I/O, no suspension. The upstream
//! markup is not schema-guaranteed, so anything that does not look like a
//! complete row is skipped rather than reported.

use crate::model::{ScheduleRecord, WeekOption};
use scraper::{ElementRef, Html, Selector};

/// Default selector of the table body holding fixture rows.
pub const DEFAULT_TABLE_SELECTOR: &str = "table tbody";

/// Default selector of the week picker.
pub const DEFAULT_WEEK_SELECTOR: &str = "select";

/// Default separator a week option value must contain to count as a date.
pub const DEFAULT_WEEK_SEPARATOR: char = '-';

// Column positions in the source table. Column 2 sits between the two sides
// and carries no data of its own.
const COL_NUMBER: usize = 0;
const COL_HOME: usize = 1;
const COL_AWAY: usize = 3;
const COL_RESULT: usize = 4;
const COL_STATUS: usize = 5;

/// Invalid CSS selector supplied through configuration.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid CSS selector `{selector}`: {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

/// Compiled selectors for one origin's page layout.
#[derive(Debug, Clone)]
pub struct Extractor {
    table_body: Selector,
    table_body_css: String,
    week_select: Selector,
    week_select_css: String,
    week_separator: char,
    row: Selector,
    cell: Selector,
    option: Selector,
}

impl Extractor {
    pub fn new(
        table_body: &str,
        week_select: &str,
        week_separator: char,
    ) -> Result<Self, SelectorError> {
        Ok(Self {
            table_body: compile(table_body)?,
            table_body_css: table_body.to_string(),
            week_select: compile(week_select)?,
            week_select_css: week_select.to_string(),
            week_separator,
            row: compile("tr")?,
            cell: compile("td")?,
            option: compile("option")?,
        })
    }

    /// Selector that signals the fixtures table has been rendered.
    pub fn table_selector(&self) -> &str {
        &self.table_body_css
    }

    /// Selector that signals the week picker has been rendered.
    pub fn week_selector(&self) -> &str {
        &self.week_select_css
    }

    /// Extract fixture rows from the first matching table body.
    pub fn records(&self, html: &str) -> Vec<ScheduleRecord> {
        let document = Html::parse_document(html);
        let Some(body) = document.select(&self.table_body).next() else {
            return Vec::new();
        };

        body.select(&self.row)
            .filter_map(|row| {
                let cells: Vec<String> = row.select(&self.cell).map(cell_text).collect();
                let at = |i: usize| cells.get(i).cloned().unwrap_or_default();

                let record = ScheduleRecord {
                    number: at(COL_NUMBER),
                    home: at(COL_HOME),
                    away: at(COL_AWAY),
                    result: at(COL_RESULT),
                    status: at(COL_STATUS),
                };
                let complete = !record.number.is_empty()
                    && !record.home.is_empty()
                    && !record.away.is_empty();
                complete.then_some(record)
            })
            .collect()
    }

    /// Extract the week picker's date-valued options.
    pub fn week_options(&self, html: &str) -> Vec<WeekOption> {
        let document = Html::parse_document(html);
        let Some(select) = document.select(&self.week_select).next() else {
            return Vec::new();
        };

        select
            .select(&self.option)
            .filter_map(|opt| {
                let date = opt.value().attr("value")?.trim();
                if !date.contains(self.week_separator) {
                    return None;
                }
                Some(WeekOption {
                    date: date.to_string(),
                    label: cell_text(opt),
                })
            })
            .collect()
    }

    /// Label of the week the page is showing, if the picker marks one.
    pub fn selected_week(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let select = document.select(&self.week_select).next()?;
        select
            .select(&self.option)
            .find(|opt| opt.value().attr("selected").is_some())
            .map(cell_text)
            .filter(|label| !label.is_empty())
    }
}

impl Default for Extractor {
    fn default() -> Self {
        // The built-in selectors are static and known to parse.
        Self::new(
            DEFAULT_TABLE_SELECTOR,
            DEFAULT_WEEK_SELECTOR,
            DEFAULT_WEEK_SEPARATOR,
        )
        .unwrap_or_else(|e| unreachable!("built-in selectors must parse: {e}"))
    }
}

fn compile(css: &str) -> Result<Selector, SelectorError> {
    Selector::parse(css).map_err(|e| SelectorError {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(rows: &str) -> String {
        format!(
            "<html><body>\
             <select id=\"week\">\
               <option value=\"\">Choose</option>\
               <option value=\"2024-03-03\">Week 1</option>\
               <option value=\"2024-03-10\" selected>Week 2</option>\
               <option value=\"latest\">Latest</option>\
             </select>\
             <table><thead><tr><th>#</th></tr></thead><tbody>{rows}</tbody></table>\
             </body></html>"
        )
    }

    #[test]
    fn test_full_row_yields_record() {
        let html = page(
            "<tr><td>12</td><td>Red FC</td><td>v</td><td>Blue FC</td><td>2-1</td><td>FT</td></tr>",
        );
        let records = Extractor::default().records(&html);
        assert_eq!(
            records,
            vec![ScheduleRecord {
                number: "12".into(),
                home: "Red FC".into(),
                away: "Blue FC".into(),
                result: "2-1".into(),
                status: "FT".into(),
            }]
        );
    }

    #[test]
    fn test_short_row_is_skipped_and_parsing_continues() {
        let html = page(
            "<tr><td>1</td><td>Red FC</td><td>v</td></tr>\
             <tr><td>2</td><td>Green FC</td><td>v</td><td>Gold FC</td><td></td><td>18:00</td></tr>",
        );
        let records = Extractor::default().records(&html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].number, "2");
        assert_eq!(records[0].away, "Gold FC");
        assert_eq!(records[0].result, "");
    }

    #[test]
    fn test_blank_identity_cells_are_skipped() {
        let html = page(
            "<tr><td>  </td><td>Red FC</td><td>v</td><td>Blue FC</td><td>0-0</td><td>FT</td></tr>\
             <tr><td>4</td><td>\n</td><td>v</td><td>Blue FC</td><td>0-0</td><td>FT</td></tr>",
        );
        assert!(Extractor::default().records(&html).is_empty());
    }

    #[test]
    fn test_missing_table_yields_nothing() {
        let records = Extractor::default().records("<html><body><p>maintenance</p></body></html>");
        assert!(records.is_empty());
    }

    #[test]
    fn test_cell_whitespace_is_collapsed() {
        let html = page(
            "<tr><td> 7 </td><td><a href=\"#\">Red\n  FC</a></td><td>v</td><td>Blue FC</td><td> 1 - 1 </td><td>HT</td></tr>",
        );
        let records = Extractor::default().records(&html);
        assert_eq!(records[0].home, "Red FC");
        assert_eq!(records[0].result, "1 - 1");
    }

    #[test]
    fn test_week_options_require_separator() {
        let options = Extractor::default().week_options(&page(""));
        assert_eq!(
            options,
            vec![
                WeekOption {
                    date: "2024-03-03".into(),
                    label: "Week 1".into()
                },
                WeekOption {
                    date: "2024-03-10".into(),
                    label: "Week 2".into()
                },
            ]
        );
    }

    #[test]
    fn test_selected_week_label() {
        assert_eq!(
            Extractor::default().selected_week(&page("")).as_deref(),
            Some("Week 2")
        );
        assert_eq!(Extractor::default().selected_week("<p></p>"), None);
    }

    #[test]
    fn test_custom_selectors() {
        let ex = Extractor::new("#fixtures tbody", "select#week", '/').unwrap();
        let html = "<table id=\"other\"><tbody><tr><td>9</td><td>A</td><td></td><td>B</td></tr></tbody></table>\
                    <table id=\"fixtures\"><tbody><tr><td>1</td><td>C</td><td></td><td>D</td></tr></tbody></table>\
                    <select id=\"week\"><option value=\"03/10\">W</option><option value=\"2024-03-10\">X</option></select>";
        let records = ex.records(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].home, "C");
        assert_eq!(ex.week_options(html).len(), 1);
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let err = Extractor::new("tbody[", "select", '-').unwrap_err();
        assert_eq!(err.selector, "tbody[");
    }
}
