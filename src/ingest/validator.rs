//! Row validation: raw CSV cells → typed readings or rejection records.
//!
//! A row is all-or-nothing. Every rejection names the 1-based row number
//! (header = row 1) and the offending field.

use serde::{Deserialize, Serialize};

use super::aliases::{CanonicalField, HeaderResolution};
use super::csv_input::RawRow;

// ============================================================================
// Types
// ============================================================================

/// One fully-typed sensor reading, in the model service's wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidatedReading {
    pub x_direction: f64,
    pub y_direction: f64,
    pub bearing_tem: f64,
    pub env_temp: f64,
}

impl ValidatedReading {
    pub const fn get(&self, field: CanonicalField) -> f64 {
        match field {
            CanonicalField::XDirection => self.x_direction,
            CanonicalField::YDirection => self.y_direction,
            CanonicalField::BearingTemp => self.bearing_tem,
            CanonicalField::EnvTemp => self.env_temp,
        }
    }

    /// True when every value is finite.
    pub fn is_finite(&self) -> bool {
        CanonicalField::ALL.iter().all(|f| self.get(*f).is_finite())
    }
}

/// Why a row was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub row_number: usize,
    pub reason: String,
    /// First offending field; `None` when the line itself was unreadable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<CanonicalField>,
}

impl RejectionRecord {
    pub(crate) fn unreadable(row_number: usize, detail: &str) -> Self {
        Self {
            row_number,
            reason: format!("Row {row_number}: unreadable CSV line ({detail})"),
            field: None,
        }
    }
}

/// Aggregate of validating every row of one input.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub readings: Vec<ValidatedReading>,
    pub rejections: Vec<RejectionRecord>,
}

impl ValidationReport {
    pub fn valid_count(&self) -> usize {
        self.readings.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejections.len()
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Problem with a single cell.
enum CellError {
    Unresolved,
    Missing(String),
    Empty(String),
    NotNumeric(String, String),
    NotFinite(String, String),
}

fn parse_cell(
    row: &RawRow,
    resolution: &HeaderResolution,
    field: CanonicalField,
) -> Result<f64, CellError> {
    let header = resolution.header_for(field).ok_or(CellError::Unresolved)?;
    let raw = row
        .get(header)
        .ok_or_else(|| CellError::Missing(header.to_string()))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CellError::Empty(header.to_string()));
    }
    let value: f64 = trimmed
        .parse()
        .map_err(|_| CellError::NotNumeric(header.to_string(), trimmed.to_string()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CellError::NotFinite(header.to_string(), trimmed.to_string()))
    }
}

fn describe(
    err: CellError,
    field: CanonicalField,
    resolution: &HeaderResolution,
) -> String {
    let name = field.name();
    match err {
        CellError::Unresolved => resolution.unresolved_message(field),
        CellError::Missing(h) => format!("missing value for '{name}' (column '{h}')"),
        CellError::Empty(h) => format!("empty value for '{name}' (column '{h}')"),
        CellError::NotNumeric(h, v) => {
            format!("invalid number '{v}' for '{name}' (column '{h}')")
        }
        CellError::NotFinite(h, v) => {
            format!("non-finite value '{v}' for '{name}' (column '{h}')")
        }
    }
}

/// Validate one row against the resolved headers.
///
/// All four fields must parse as finite numbers; otherwise the whole row is
/// rejected with one record listing every offending field.
pub fn validate_row(
    row: &RawRow,
    resolution: &HeaderResolution,
    row_number: usize,
) -> Result<ValidatedReading, RejectionRecord> {
    let mut values = [0.0_f64; 4];
    let mut problems: Vec<String> = Vec::new();
    let mut first_bad: Option<CanonicalField> = None;

    for (slot, field) in values.iter_mut().zip(CanonicalField::ALL) {
        match parse_cell(row, resolution, field) {
            Ok(v) => *slot = v,
            Err(e) => {
                first_bad.get_or_insert(field);
                problems.push(describe(e, field, resolution));
            }
        }
    }

    if problems.is_empty() {
        let [x_direction, y_direction, bearing_tem, env_temp] = values;
        Ok(ValidatedReading {
            x_direction,
            y_direction,
            bearing_tem,
            env_temp,
        })
    } else {
        Err(RejectionRecord {
            row_number,
            reason: format!("Row {row_number}: {}", problems.join("; ")),
            field: first_bad,
        })
    }
}

/// Validate every row, preserving input order of the accepted readings.
pub fn validate_rows(rows: &[RawRow], resolution: &HeaderResolution) -> ValidationReport {
    let mut report = ValidationReport {
        readings: Vec::with_capacity(rows.len()),
        rejections: Vec::new(),
    };

    for row in rows {
        match validate_row(row, resolution, row.row_number()) {
            Ok(reading) => report.readings.push(reading),
            Err(rejection) => {
                if report.rejections.len() < 10 {
                    tracing::debug!(row = rejection.row_number, reason = %rejection.reason, "Row rejected");
                }
                report.rejections.push(rejection);
            }
        }
    }

    report
}
