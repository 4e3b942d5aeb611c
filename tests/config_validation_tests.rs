//! Config Validation Tests
//!
//! Typo detection, range validation, threshold presets and alias extension,
//! exercised through the public config surface.

use std::io::Write;

use rul_sentinel::config::validation::{known_config_keys, suggest_correction, validate_unknown_keys};
use rul_sentinel::config::{ConfigError, PipelineConfig, ThresholdScale};
use rul_sentinel::ingest::{CanonicalField, FieldAliasTable};
use rul_sentinel::prediction::ProcessingMode;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_batch_size_warns_with_suggestion() {
    let toml_str = r#"
[batch]
batch_sise = 10
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("batch_sise"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("batch.batch_size"));
}

#[test]
fn far_off_key_has_no_suggestion() {
    let known = known_config_keys();
    assert!(suggest_correction("completely.unrelated.key", &known).is_none());
}

#[test]
fn unknown_keys_do_not_fail_loading() {
    let (cfg, _) = PipelineConfig::from_toml_str(
        r#"
[service]
base_url = "http://model:8000"
retries = 3
"#,
    )
    .unwrap();
    assert_eq!(cfg.service.base_url, "http://model:8000");
}

// ============================================================================
// Thresholds
// ============================================================================

#[test]
fn default_scale_is_absolute() {
    let cfg = PipelineConfig::default();
    assert_eq!(cfg.alerts.scale, ThresholdScale::Absolute);
    let t = cfg.alerts.thresholds();
    assert_eq!(t.critical, 20_000.0);
    assert_eq!(t.warning, 60_000.0);
    assert_eq!(cfg.alerts.adjustment_factor, 1.0);
}

#[test]
fn hours_scale_and_provenance() {
    let (cfg, provenance) = PipelineConfig::from_toml_str(
        r#"
[alerts]
scale = "hours"
"#,
    )
    .unwrap();
    let t = cfg.alerts.thresholds();
    assert_eq!(t.critical, 168.0);
    assert_eq!(t.warning, 720.0);
    assert!(provenance.is_user_set("alerts.scale"));
    assert!(!provenance.is_user_set("alerts.critical_threshold"));
}

#[test]
fn explicit_threshold_overrides_preset() {
    let (cfg, _) = PipelineConfig::from_toml_str(
        r#"
[alerts]
scale = "hours"
critical_threshold = 100.0
"#,
    )
    .unwrap();
    let t = cfg.alerts.thresholds();
    assert_eq!(t.critical, 100.0);
    assert_eq!(t.warning, 720.0);
}

#[test]
fn inverted_thresholds_are_rejected() {
    let err = PipelineConfig::from_toml_str(
        r#"
[alerts]
critical_threshold = 70000.0
warning_threshold = 60000.0
"#,
    )
    .unwrap_err();
    match err {
        ConfigError::Validation(errors) => {
            assert!(errors.iter().any(|e| e.contains("must be less than")), "{errors:?}");
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn zero_batch_size_and_factor_are_rejected() {
    let err = PipelineConfig::from_toml_str(
        r#"
[batch]
batch_size = 0

[alerts]
adjustment_factor = 0.0
"#,
    )
    .unwrap_err();
    let ConfigError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.len(), 2, "{errors:?}");
}

// ============================================================================
// Service & Aliases
// ============================================================================

#[test]
fn fast_mode_parses() {
    let (cfg, _) = PipelineConfig::from_toml_str(
        r#"
[service]
mode = "fast"
timeout_secs = 5
"#,
    )
    .unwrap();
    assert_eq!(cfg.service.mode, ProcessingMode::Fast);
    assert_eq!(cfg.service.timeout_secs, 5);
}

#[test]
fn extra_aliases_extend_the_builtin_table() {
    let (cfg, _) = PipelineConfig::from_toml_str(
        r#"
[aliases]
bearing_tem = ["Lager Temperatur"]
"#,
    )
    .unwrap();
    let table = FieldAliasTable::with_extra(cfg.extra_aliases());
    assert_eq!(table.lookup("lager temperatur"), Some(CanonicalField::BearingTemp));
    assert_eq!(table.lookup("bearing temp"), Some(CanonicalField::BearingTemp));
}

#[test]
fn alias_for_unknown_field_is_rejected() {
    let err = PipelineConfig::from_toml_str(
        r#"
[aliases]
rotor_speed = ["rpm"]
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("aliases.rotor_speed"), "{err}");
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn load_from_file_round_trips_through_to_toml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[subject]
asset_id = "bearing-9"

[storage]
enabled = false
"#
    )
    .unwrap();

    let (cfg, provenance) = PipelineConfig::load_from_file_with_provenance(file.path()).unwrap();
    assert_eq!(cfg.subject.asset_id, "bearing-9");
    assert!(!cfg.storage.enabled);
    assert!(provenance.is_user_set("subject.asset_id"));

    let (reparsed, _) = PipelineConfig::from_toml_str(&cfg.to_toml().unwrap()).unwrap();
    assert_eq!(reparsed.subject.asset_id, "bearing-9");
    assert_eq!(reparsed.batch.batch_size, cfg.batch.batch_size);
}

#[test]
fn missing_file_is_io_error() {
    let err = PipelineConfig::load_from_file_with_provenance(std::path::Path::new(
        "/definitely/not/here.toml",
    ))
    .unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}
