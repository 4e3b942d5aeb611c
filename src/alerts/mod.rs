//! Result Aggregation & Alert Classification
//!
//! Turns prediction outcomes into result-stream records, persisted
//! predictions and threshold alerts. Classification is a pure function of the
//! (adjusted) RUL and two ascending cutoffs.

mod aggregator;

pub use aggregator::{AggregateStats, ResultAggregator, ResultRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Thresholds & Severity
// ============================================================================

/// Two ascending cutoffs: `critical < warning`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub critical: f64,
    pub warning: f64,
}

impl AlertThresholds {
    /// Classify a RUL value.
    ///
    /// `rul < critical` → Critical, `critical <= rul < warning` → Warning,
    /// anything else → None.
    pub fn classify(&self, rul: f64) -> Severity {
        if rul < self.critical {
            Severity::Critical
        } else if rul < self.warning {
            Severity::Warning
        } else {
            Severity::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Warning,
    Critical,
}

impl Severity {
    pub const fn is_alert(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// ============================================================================
// Alert Record
// ============================================================================

/// An alert raised when a prediction crosses a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub subject_id: String,
    pub severity: Severity,
    pub message: String,
    pub rul_at_alert: f64,
    pub triggering_condition: String,
    pub created_at: DateTime<Utc>,
}

impl AlertRecord {
    /// Build the alert for a classified RUL; `None` below alert level.
    pub fn for_prediction(
        subject_id: &str,
        sequence_number: Option<usize>,
        rul: f64,
        thresholds: &AlertThresholds,
    ) -> Option<Self> {
        let severity = thresholds.classify(rul);
        let (label, cutoff) = match severity {
            Severity::None => return None,
            Severity::Warning => ("Warning", thresholds.warning),
            Severity::Critical => ("Critical", thresholds.critical),
        };

        let origin = sequence_number.map_or_else(String::new, |n| format!(" (sequence {n})"));
        Some(Self {
            subject_id: subject_id.to_string(),
            severity,
            message: format!(
                "{label}: predicted RUL {rul:.1} for asset '{subject_id}'{origin} is below the {severity} threshold {cutoff:.1}"
            ),
            rul_at_alert: rul,
            triggering_condition: format!("predicted_rul < {cutoff}"),
            created_at: Utc::now(),
        })
    }
}
