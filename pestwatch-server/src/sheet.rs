//! Spreadsheet document
//!
//! The `.xlsx` mirror of the aggregator: a "Pest Detection Data" sheet with
//! every column and a "Visualization" sheet with the label + count
//! projection and a column chart over it. The document is always rewritten
//! whole; the visualization sheet is derived from the data sheet on every
//! write.

use crate::aggregator::PestRecord;
use crate::sync::SyncError;
use calamine::{open_workbook, Data, Reader, Xlsx};
use pestwatch_common::catalog::{
    self, COLUMN_COUNT, COLUMN_LAST_UPDATED, COLUMN_LOCATION, COLUMN_PEST_TYPE, DATA_COLUMNS,
    DATA_SHEET, VISUALIZATION_COLUMNS, VISUALIZATION_SHEET,
};
use pestwatch_common::{time, DEFAULT_LOCATION};
use rust_xlsxwriter::{Chart, ChartType, Format, Workbook, Worksheet};
use std::path::{Path, PathBuf};

/// One row of the data sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub pest_type: String,
    pub count: u64,
    pub last_updated: String,
    pub location: String,
}

impl SheetRow {
    fn empty(pest_type: &str) -> Self {
        Self {
            pest_type: pest_type.to_string(),
            count: 0,
            last_updated: String::new(),
            location: String::new(),
        }
    }

    fn from_record(record: &PestRecord) -> Self {
        Self {
            pest_type: record.label.clone(),
            count: record.count,
            last_updated: time::format_timestamp(&record.last_updated),
            location: record.location.clone(),
        }
    }
}

/// Result of applying in-memory records to the sheet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub updated: usize,
    pub appended: usize,
    pub skipped: usize,
}

/// In-memory copy of the data sheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PestSheet {
    pub rows: Vec<SheetRow>,
}

impl PestSheet {
    /// Catalog labels at zero counts
    pub fn seeded() -> Self {
        Self {
            rows: catalog::PEST_LABELS.iter().map(|l| SheetRow::empty(l)).collect(),
        }
    }

    pub fn row(&self, pest_type: &str) -> Option<&SheetRow> {
        self.rows.iter().find(|r| r.pest_type == pest_type)
    }

    /// Overwrite count, timestamp and location of matching rows.
    ///
    /// Records without a row are appended when `append_missing` is set and
    /// skipped otherwise.
    pub fn apply(&mut self, records: &[PestRecord], append_missing: bool) -> ApplyStats {
        let mut stats = ApplyStats::default();

        for record in records {
            match self.rows.iter_mut().find(|r| r.pest_type == record.label) {
                Some(row) => {
                    row.count = record.count;
                    row.last_updated = time::format_timestamp(&record.last_updated);
                    row.location = record.location.clone();
                    stats.updated += 1;
                }
                None if append_missing => {
                    self.rows.push(SheetRow::from_record(record));
                    stats.appended += 1;
                }
                None => stats.skipped += 1,
            }
        }

        stats
    }

    /// Records to seed the aggregator with at startup (rows with `count > 0`)
    pub fn seed_records(&self) -> Vec<PestRecord> {
        self.rows
            .iter()
            .filter(|r| r.count > 0)
            .map(|r| PestRecord {
                label: r.pest_type.clone(),
                count: r.count,
                last_updated: time::parse_timestamp(&r.last_updated)
                    .unwrap_or_else(time::now_local),
                location: if r.location.trim().is_empty() {
                    DEFAULT_LOCATION.to_string()
                } else {
                    r.location.clone()
                },
            })
            .collect()
    }

    /// Load the data sheet of an existing document
    pub fn read(path: &Path) -> Result<Self, SyncError> {
        let mut workbook: Xlsx<_> = open_workbook(path)?;
        if !workbook.sheet_names().iter().any(|n| n == DATA_SHEET) {
            return Err(SyncError::MissingSheet(DATA_SHEET.to_string()));
        }
        let range = workbook.worksheet_range(DATA_SHEET)?;

        let mut rows = range.rows();
        let header = rows
            .next()
            .ok_or_else(|| SyncError::MissingColumn(COLUMN_PEST_TYPE.to_string()))?;
        let column = |name: &str| header.iter().position(|c| cell_text(c).trim() == name);

        let pest_col = column(COLUMN_PEST_TYPE)
            .ok_or_else(|| SyncError::MissingColumn(COLUMN_PEST_TYPE.to_string()))?;
        let count_col = column(COLUMN_COUNT)
            .ok_or_else(|| SyncError::MissingColumn(COLUMN_COUNT.to_string()))?;
        let updated_col = column(COLUMN_LAST_UPDATED);
        let location_col = column(COLUMN_LOCATION);

        let text_at = |row: &[Data], col: Option<usize>| {
            col.and_then(|c| row.get(c)).map(cell_text).unwrap_or_default()
        };

        let mut sheet = PestSheet::default();
        for row in rows {
            let pest_type = text_at(row, Some(pest_col));
            if pest_type.trim().is_empty() {
                continue;
            }
            sheet.rows.push(SheetRow {
                pest_type,
                count: row.get(count_col).map(cell_count).unwrap_or(0),
                last_updated: text_at(row, updated_col),
                location: text_at(row, location_col),
            });
        }

        Ok(sheet)
    }

    /// Write the whole document (data + visualization sheets).
    ///
    /// The workbook is saved next to the target and renamed over it, so a
    /// reader never sees a half-written file.
    pub fn write(&self, path: &Path) -> Result<(), SyncError> {
        let mut workbook = Workbook::new();
        workbook.push_worksheet(self.data_worksheet()?);
        workbook.push_worksheet(self.visualization_worksheet()?);

        let staging = staging_path(path);
        workbook.save(&staging)?;
        if let Err(e) = std::fs::rename(&staging, path) {
            let _ = std::fs::remove_file(&staging);
            return Err(SyncError::Io(e));
        }
        Ok(())
    }

    fn data_worksheet(&self) -> Result<Worksheet, SyncError> {
        let bold = Format::new().set_bold();
        let mut sheet = Worksheet::new();
        sheet.set_name(DATA_SHEET)?;

        for (col, header) in DATA_COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, &bold)?;
        }
        for (i, row) in self.rows.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, &row.pest_type)?;
            sheet.write_number(r, 1, row.count as f64)?;
            if !row.last_updated.is_empty() {
                sheet.write_string(r, 2, &row.last_updated)?;
            }
            if !row.location.is_empty() {
                sheet.write_string(r, 3, &row.location)?;
            }
        }
        sheet.set_column_width(0, 16)?;
        sheet.set_column_width(2, 20)?;
        sheet.set_column_width(3, 16)?;

        Ok(sheet)
    }

    fn visualization_worksheet(&self) -> Result<Worksheet, SyncError> {
        let bold = Format::new().set_bold();
        let mut sheet = Worksheet::new();
        sheet.set_name(VISUALIZATION_SHEET)?;

        for (col, header) in VISUALIZATION_COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, &bold)?;
        }
        for (i, row) in self.rows.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, &row.pest_type)?;
            sheet.write_number(r, 1, row.count as f64)?;
        }
        sheet.set_column_width(0, 16)?;

        if !self.rows.is_empty() {
            let last = self.rows.len() as u32;
            let mut chart = Chart::new(ChartType::Column);
            chart
                .add_series()
                .set_categories((VISUALIZATION_SHEET, 1, 0, last, 0))
                .set_values((VISUALIZATION_SHEET, 1, 1, last, 1));
            chart.title().set_name("Pest Counts");
            chart.legend().set_hidden();
            sheet.insert_chart(1, 3, &chart)?;
        }

        Ok(sheet)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::DateTimeIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Non-negative integer count; anything unreadable counts as zero
fn cell_count(cell: &Data) -> u64 {
    match cell {
        Data::Int(i) if *i >= 0 => *i as u64,
        Data::Float(f) if f.is_finite() && *f >= 0.0 => f.round() as u64,
        Data::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
