//! Sensor Ingestion
//!
//! ```text
//! CSV text ──► csv_input (headers + RawRows)
//!          ──► aliases   (header → canonical field)
//!          ──► validator (RawRow → ValidatedReading | RejectionRecord)
//!          ──► windower  (readings → 50-reading Sequences)
//! ```
//!
//! Everything here is synchronous and side-effect free apart from logging.

pub mod aliases;
pub mod csv_input;
pub mod validator;
pub mod windower;

pub use aliases::{normalize_header, CanonicalField, FieldAliasTable, HeaderResolution};
pub use csv_input::{parse_csv_path, parse_csv_reader, parse_csv_str, CsvInput, IngestError, RawRow};
pub use validator::{validate_row, validate_rows, RejectionRecord, ValidatedReading, ValidationReport};
pub use windower::{window, Sequence, WindowReport};
