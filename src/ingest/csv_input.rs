//! CSV text → header list + raw rows.
//!
//! Only tokenizes. Typing and rejection happen in the validator so that every
//! data row, readable or not, is accounted for with a row number.

use std::io::Read;
use std::path::Path;

use super::validator::RejectionRecord;

/// Row number of the header line; the first data row is `HEADER_ROW + 1`.
pub const HEADER_ROW: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read CSV input: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV input has no header row")]
    MissingHeader,
}

// ============================================================================
// Raw Row
// ============================================================================

/// One data line as header → cell pairs, in column order.
///
/// Cells under blank headers are dropped; a short line simply has fewer
/// cells, which the validator reports as missing values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    row_number: usize,
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(row_number: usize, cells: Vec<(String, String)>) -> Self {
        Self { row_number, cells }
    }

    /// Build a row from `(header, value)` string pairs.
    pub fn from_pairs(row_number: usize, pairs: &[(&str, &str)]) -> Self {
        Self::new(
            row_number,
            pairs
                .iter()
                .map(|(h, v)| ((*h).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    /// 1-based row number (header is row 1).
    pub const fn row_number(&self) -> usize {
        self.row_number
    }

    /// Cell under the given header (first occurrence).
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }
}

// ============================================================================
// Parsed Input
// ============================================================================

/// Tokenized CSV input.
#[derive(Debug, Clone, Default)]
pub struct CsvInput {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Lines the CSV reader could not decode (bad UTF-8, broken quoting)
    pub unreadable: Vec<RejectionRecord>,
}

impl CsvInput {
    /// Data lines seen, readable or not.
    pub fn total_rows(&self) -> usize {
        self.rows.len() + self.unreadable.len()
    }
}

/// Parse CSV text (header row required).
pub fn parse_csv_str(text: &str) -> Result<CsvInput, IngestError> {
    parse_csv_reader(text.as_bytes())
}

/// Parse a CSV file from disk.
pub fn parse_csv_path(path: impl AsRef<Path>) -> Result<CsvInput, IngestError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| IngestError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let input = parse_csv_reader(file)?;
    tracing::info!(
        file = %path.display(),
        rows = input.rows.len(),
        unreadable = input.unreadable.len(),
        "CSV loaded"
    );
    Ok(input)
}

/// Byte offset → 1-based file line.
struct LineIndex<'a> {
    bytes: &'a [u8],
    newlines: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        let newlines = bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .map(|(i, _)| i)
            .collect();
        Self { bytes, newlines }
    }

    /// Line a record starts on. The reader reports the offset where it began
    /// looking, which may sit on skipped blank lines or the prior terminator.
    fn line_of(&self, position: &csv::Position) -> Option<usize> {
        let mut offset = usize::try_from(position.byte()).ok()?;
        while matches!(self.bytes.get(offset), Some(b'\r' | b'\n')) {
            offset += 1;
        }
        Some(self.newlines.partition_point(|nl| *nl < offset) + 1)
    }
}

/// Parse CSV from any reader.
///
/// Row numbers are file lines, so blank lines and multi-line quoted cells
/// do not shift them.
pub fn parse_csv_reader<R: Read>(mut reader: R) -> Result<CsvInput, IngestError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| IngestError::Csv(e.into()))?;
    let lines = LineIndex::new(&bytes);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(IngestError::MissingHeader);
    }

    let mut rows = Vec::new();
    let mut unreadable = Vec::new();

    let mut last_row = HEADER_ROW;
    for result in rdr.records() {
        let position = match &result {
            Ok(record) => record.position(),
            Err(e) => e.position(),
        };
        let row_number = position
            .and_then(|p| lines.line_of(p))
            .filter(|line| *line > last_row)
            .unwrap_or(last_row + 1);
        last_row = row_number;
        match result {
            Ok(record) => {
                let cells = headers
                    .iter()
                    .zip(record.iter())
                    .filter(|(h, _)| !h.is_empty())
                    .map(|(h, v)| (h.clone(), v.to_string()))
                    .collect();
                rows.push(RawRow::new(row_number, cells));
            }
            Err(e) => {
                if unreadable.len() < 10 {
                    tracing::warn!(row = row_number, error = %e, "Unreadable CSV row");
                }
                unreadable.push(RejectionRecord::unreadable(row_number, &e.to_string()));
            }
        }
    }

    Ok(CsvInput {
        headers,
        rows,
        unreadable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers_and_rows() {
        let input = parse_csv_str("x direction,y direction,bearing temp,env temp\n1,2,3,4\n5,6,7,8\n").unwrap();
        assert_eq!(input.headers.len(), 4);
        assert_eq!(input.rows.len(), 2);
        assert_eq!(input.rows[0].row_number(), 2);
        assert_eq!(input.rows[1].get("bearing temp"), Some("7"));
    }

    #[test]
    fn test_row_numbers_follow_file_lines() {
        let input = parse_csv_str("a,b,c,d\n1,2,3,4\n\n1,2,N/A,4\n\"x\ny\",2,3,4\n5,6,7,8\n").unwrap();
        let numbers: Vec<usize> = input.rows.iter().map(RawRow::row_number).collect();
        // Blank line 3 is skipped; the quoted cell spans lines 5 and 6.
        assert_eq!(numbers, vec![2, 4, 5, 7]);
        assert_eq!(input.rows[1].get("c"), Some("N/A"));
    }

    #[test]
    fn test_unreadable_row_keeps_its_line() {
        let mut bytes = b"a,b\n1,2\n\n".to_vec();
        bytes.extend_from_slice(b"\xff\xfe,2\n3,4\n");
        let input = parse_csv_reader(bytes.as_slice()).unwrap();
        assert_eq!(input.unreadable.len(), 1);
        assert_eq!(input.unreadable[0].row_number, 4);
        assert_eq!(input.rows.last().unwrap().row_number(), 5);
    }

    #[test]
    fn test_blank_header_cells_dropped() {
        let input = parse_csv_str(",x,y\n0,1,2\n").unwrap();
        assert_eq!(input.rows[0].cells().len(), 2);
        assert_eq!(input.rows[0].get("x"), Some("1"));
    }

    #[test]
    fn test_short_row_keeps_available_cells() {
        let input = parse_csv_str("a,b,c\n1,2\n").unwrap();
        assert_eq!(input.rows[0].get("b"), Some("2"));
        assert_eq!(input.rows[0].get("c"), None);
    }

    #[test]
    fn test_quoted_fields() {
        let input = parse_csv_str("name,x\n\"a, b\",1.5\n").unwrap();
        assert_eq!(input.rows[0].get("name"), Some("a, b"));
    }

    #[test]
    fn test_bom_stripped_from_first_header() {
        let input = parse_csv_str("\u{feff}x direction,y\n1,2\n").unwrap();
        assert_eq!(input.headers[0], "x direction");
    }

    #[test]
    fn test_empty_input_is_error() {
        assert!(matches!(parse_csv_str(""), Err(IngestError::MissingHeader)));
    }
}
