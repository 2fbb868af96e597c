// Spreadsheet loading (xlsx, xls, xlsb, ods)

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Duration, NaiveDate};
use datalyzer_recon::model::{CellValue, Dataset};

use crate::error::LoadError;

/// Read one worksheet (default: the first). Row 1 is the header.
pub fn load(label: &str, path: &Path, sheet: Option<&str>) -> Result<Dataset, LoadError> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)
        .map_err(|e| LoadError::malformed(path, format!("failed to open spreadsheet: {e}")))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let sheet_name = match sheet {
        Some(wanted) => sheet_names
            .iter()
            .find(|n| n.as_str() == wanted)
            .cloned()
            .ok_or_else(|| {
                LoadError::malformed(
                    path,
                    format!("no sheet named '{wanted}' (found: {})", sheet_names.join(", ")),
                )
            })?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| LoadError::malformed(path, "spreadsheet contains no sheets"))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| LoadError::malformed(path, format!("failed to read sheet '{sheet_name}': {e}")))?;
    log::debug!("{}: reading sheet '{sheet_name}'", path.display());

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(row) => row.iter().map(|c| cell_of(c).canonical()).collect(),
        None => Vec::new(),
    };
    // Trailing empty header cells come from formatting, not data.
    let width = headers.iter().rposition(|h| !h.trim().is_empty()).map_or(0, |p| p + 1);
    let headers = &headers[..width];

    let mut data: Vec<Vec<CellValue>> = Vec::new();
    for row in rows {
        let mut cells: Vec<CellValue> = row.iter().map(cell_of).collect();
        if cells.iter().all(|c| matches!(c, CellValue::Null)) {
            continue;
        }
        // Cells past the header only count if they hold data.
        if cells.len() > width && cells[width..].iter().all(|c| matches!(c, CellValue::Null)) {
            cells.truncate(width);
        }
        data.push(cells);
    }

    Ok(Dataset::from_rows(label, headers, data)?)
}

fn cell_of(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        // Integral floats render without decimals.
        Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => CellValue::Int(*n as i64),
        Data::Float(n) => CellValue::Float(*n),
        Data::Int(n) => CellValue::Int(*n),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Error(e) => CellValue::Text(format!("#{e:?}")),
        Data::DateTime(dt) => CellValue::Text(render_serial(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// Excel serial (1900 system) to `YYYY-MM-DD`, with ` HH:MM:SS` when the
/// serial carries a time of day.
fn render_serial(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return serial.to_string();
    };
    let days = serial.floor();
    let seconds = ((serial - days) * 86_400.0).round() as i64;
    let Some(date) = epoch.checked_add_signed(Duration::days(days as i64)) else {
        return serial.to_string();
    };
    if seconds == 0 {
        date.format("%Y-%m-%d").to_string()
    } else {
        let datetime = date.and_hms_opt(0, 0, 0).map(|d| d + Duration::seconds(seconds));
        match datetime {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => serial.to_string(),
        }
    }
}
