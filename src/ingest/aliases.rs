//! Header alias resolution.
//!
//! Maps arbitrary CSV header spellings ("X direction", "bearing temp",
//! "Ambient Temperature", ...) onto the four canonical sensor fields the
//! model expects. One table is built at startup and shared by every entry
//! point (bulk runs, single predictions, the HTTP API).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Canonical Fields
// ============================================================================

/// The four sensor fields every reading must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CanonicalField {
    #[serde(rename = "x_direction")]
    XDirection,
    #[serde(rename = "y_direction")]
    YDirection,
    #[serde(rename = "bearing_tem")]
    BearingTemp,
    #[serde(rename = "env_temp")]
    EnvTemp,
}

impl CanonicalField {
    /// All required fields, in wire order.
    pub const ALL: [Self; 4] = [
        Self::XDirection,
        Self::YDirection,
        Self::BearingTemp,
        Self::EnvTemp,
    ];

    /// Canonical (wire) name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::XDirection => "x_direction",
            Self::YDirection => "y_direction",
            Self::BearingTemp => "bearing_tem",
            Self::EnvTemp => "env_temp",
        }
    }

    /// Human-readable description for error messages.
    pub const fn description(self) -> &'static str {
        match self {
            Self::XDirection => "direction-X vibration",
            Self::YDirection => "direction-Y vibration",
            Self::BearingTemp => "bearing temperature",
            Self::EnvTemp => "environment temperature",
        }
    }

    /// Parse a canonical name (case/whitespace-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize_header(name);
        Self::ALL.into_iter().find(|f| f.name() == wanted)
    }

    const fn index(self) -> usize {
        match self {
            Self::XDirection => 0,
            Self::YDirection => 1,
            Self::BearingTemp => 2,
            Self::EnvTemp => 3,
        }
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Normalize a header for comparison: lower-case, all whitespace removed.
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// Alias Table
// ============================================================================

/// Built-in spellings seen across sensor exports.
const BUILTIN_ALIASES: &[(CanonicalField, &str)] = &[
    (CanonicalField::XDirection, "x direction"),
    (CanonicalField::XDirection, "x_direction"),
    (CanonicalField::XDirection, "x-direction"),
    (CanonicalField::XDirection, "x dir"),
    (CanonicalField::XDirection, "x axis"),
    (CanonicalField::XDirection, "x"),
    (CanonicalField::XDirection, "horizontal vibration"),
    (CanonicalField::XDirection, "vibration x"),
    (CanonicalField::YDirection, "y direction"),
    (CanonicalField::YDirection, "y_direction"),
    (CanonicalField::YDirection, "y-direction"),
    (CanonicalField::YDirection, "y dir"),
    (CanonicalField::YDirection, "y axis"),
    (CanonicalField::YDirection, "y"),
    (CanonicalField::YDirection, "vertical vibration"),
    (CanonicalField::YDirection, "vibration y"),
    (CanonicalField::BearingTemp, "bearing tem"),
    (CanonicalField::BearingTemp, "bearing temp"),
    (CanonicalField::BearingTemp, "bearing temperature"),
    (CanonicalField::BearingTemp, "bearing_temp"),
    (CanonicalField::BearingTemp, "bearing_temperature"),
    (CanonicalField::BearingTemp, "brg temp"),
    (CanonicalField::EnvTemp, "env temp"),
    (CanonicalField::EnvTemp, "env_temp"),
    (CanonicalField::EnvTemp, "env temperature"),
    (CanonicalField::EnvTemp, "environment temp"),
    (CanonicalField::EnvTemp, "environment temperature"),
    (CanonicalField::EnvTemp, "environmental temperature"),
    (CanonicalField::EnvTemp, "ambient temp"),
    (CanonicalField::EnvTemp, "ambient temperature"),
];

/// Many-to-one mapping from normalized alias to canonical field.
#[derive(Debug, Clone)]
pub struct FieldAliasTable {
    by_alias: HashMap<String, CanonicalField>,
    /// Spellings as written, for error messages
    spellings: BTreeMap<CanonicalField, Vec<String>>,
}

impl Default for FieldAliasTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FieldAliasTable {
    /// Table with only the built-in spellings.
    pub fn builtin() -> Self {
        Self::with_extra(std::iter::empty())
    }

    /// Built-in spellings plus operator-supplied ones.
    ///
    /// A spelling already claimed by another field keeps its first owner.
    pub fn with_extra<I>(extra: I) -> Self
    where
        I: IntoIterator<Item = (CanonicalField, String)>,
    {
        let mut table = Self {
            by_alias: HashMap::new(),
            spellings: BTreeMap::new(),
        };
        for &(field, alias) in BUILTIN_ALIASES {
            table.insert(field, alias);
        }
        for (field, alias) in extra {
            table.insert(field, &alias);
        }
        table
    }

    fn insert(&mut self, field: CanonicalField, alias: &str) {
        let key = normalize_header(alias);
        if key.is_empty() {
            return;
        }
        match self.by_alias.get(&key) {
            Some(existing) if *existing != field => {
                tracing::warn!(
                    alias = %alias,
                    claimed_by = %existing,
                    ignored_for = %field,
                    "Alias already maps to another field"
                );
            }
            Some(_) => {}
            None => {
                self.by_alias.insert(key, field);
                self.spellings.entry(field).or_default().push(alias.to_string());
            }
        }
    }

    /// Canonical field for a header, via the alias table only.
    pub fn lookup(&self, header: &str) -> Option<CanonicalField> {
        self.by_alias.get(&normalize_header(header)).copied()
    }

    /// Accepted spellings for a field (as configured, not normalized).
    pub fn aliases_for(&self, field: CanonicalField) -> &[String] {
        self.spellings.get(&field).map_or(&[], Vec::as_slice)
    }

    /// Resolve every canonical field against the headers of one input.
    pub fn resolve(&self, headers: &[String]) -> HeaderResolution {
        let mut resolved: [Option<String>; 4] = Default::default();

        for field in CanonicalField::ALL {
            let mut matches = headers
                .iter()
                .filter(|h| !h.trim().is_empty())
                .filter(|h| self.lookup(h) == Some(field));

            let chosen = matches.next().or_else(|| {
                headers
                    .iter()
                    .find(|h| !h.trim().is_empty() && normalize_header(h) == field.name())
            });

            if let Some(header) = chosen {
                if let Some(dup) = matches.next() {
                    tracing::warn!(
                        field = %field,
                        used = %header,
                        ignored = %dup,
                        "Multiple headers map to the same field; using the first"
                    );
                }
                resolved[field.index()] = Some(header.clone());
            }
        }

        HeaderResolution {
            resolved,
            present: headers
                .iter()
                .filter(|h| !h.trim().is_empty())
                .cloned()
                .collect(),
            expected: CanonicalField::ALL.map(|f| self.aliases_for(f).to_vec()),
        }
    }
}

// ============================================================================
// Resolution Result
// ============================================================================

/// Outcome of matching one input's headers against the alias table.
#[derive(Debug, Clone)]
pub struct HeaderResolution {
    resolved: [Option<String>; 4],
    present: Vec<String>,
    expected: [Vec<String>; 4],
}

impl HeaderResolution {
    /// Header chosen for a field, if any.
    pub fn header_for(&self, field: CanonicalField) -> Option<&str> {
        self.resolved[field.index()].as_deref()
    }

    /// Fields with no matching header.
    pub fn missing_fields(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .into_iter()
            .filter(|f| self.resolved[f.index()].is_none())
            .collect()
    }

    /// True when all four fields resolved.
    pub fn is_complete(&self) -> bool {
        self.resolved.iter().all(Option::is_some)
    }

    /// Non-blank headers that were present in the input.
    pub fn present_headers(&self) -> &[String] {
        &self.present
    }

    /// Descriptive explanation of why a field could not be resolved.
    pub fn unresolved_message(&self, field: CanonicalField) -> String {
        format!(
            "required column '{}' ({}) not found. Expected one of: [{}]. Headers present: [{}]",
            field.name(),
            field.description(),
            self.expected[field.index()].join(", "),
            self.present.join(", ")
        )
    }
}
