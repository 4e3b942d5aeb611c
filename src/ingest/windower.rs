//! Fixed-length, non-overlapping sequence windowing.
//!
//! Sequence *k* (0-indexed) spans `readings[k*L .. k*L + L]`. Numbers are
//! 1-based and dense over the sequences formed; they do not track CSV row
//! numbers once rejected rows have been dropped. A remainder shorter than `L`
//! is never padded.

use serde::Serialize;

use super::validator::ValidatedReading;
use crate::config::defaults::SEQUENCE_LENGTH;

/// Exactly `SEQUENCE_LENGTH` readings plus their position among all sequences.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sequence {
    sequence_number: usize,
    readings: Vec<ValidatedReading>,
}

impl Sequence {
    /// Build a sequence, refusing anything that is not exactly
    /// `SEQUENCE_LENGTH` readings long.
    pub fn new(sequence_number: usize, readings: Vec<ValidatedReading>) -> Option<Self> {
        (readings.len() == SEQUENCE_LENGTH).then_some(Self {
            sequence_number,
            readings,
        })
    }

    /// 1-based position.
    pub const fn sequence_number(&self) -> usize {
        self.sequence_number
    }

    pub fn readings(&self) -> &[ValidatedReading] {
        &self.readings
    }
}

/// Result of windowing one input.
#[derive(Debug, Clone, Default)]
pub struct WindowReport {
    pub sequences: Vec<Sequence>,
    /// Readings past the last full window (`valid mod SEQUENCE_LENGTH`)
    pub leftover_readings: usize,
    /// `floor(valid / SEQUENCE_LENGTH) - formed`; zero under pure chunking
    pub discarded_sequences: usize,
}

/// Chunk validated readings into sequences of `SEQUENCE_LENGTH`.
pub fn window(readings: &[ValidatedReading]) -> WindowReport {
    let expected = readings.len() / SEQUENCE_LENGTH;

    let sequences: Vec<Sequence> = readings
        .chunks_exact(SEQUENCE_LENGTH)
        .enumerate()
        .map(|(k, chunk)| Sequence {
            sequence_number: k + 1,
            readings: chunk.to_vec(),
        })
        .collect();

    WindowReport {
        leftover_readings: readings.len() % SEQUENCE_LENGTH,
        discarded_sequences: expected - sequences.len(),
        sequences,
    }
}
