use std::fs;

use template_core::config::{ConfigError, EngineConfig};
use template_core::document::DelimiterGrammar;
use template_core::matching::{MatchWeights, WeightsError};
use tempfile::tempdir;

#[test]
fn invariant_v0_defaults() {
    let config = EngineConfig::v0();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.weights, MatchWeights::default());
    assert_eq!(config.delimiters, DelimiterGrammar::new("{", "}"));
    assert_eq!(config.default_top_k, 5);
    assert_eq!(config.max_write_retries, 3);
    assert_eq!(config.plain_heading_max_chars, 60);
    assert!(config.validate().is_ok());
}

#[test]
fn invariant_partial_json_keeps_other_defaults() {
    let config = EngineConfig::from_json_str(r#"{ "default_top_k": 10 }"#).unwrap();
    assert_eq!(config.default_top_k, 10);
    assert_eq!(config.weights, MatchWeights::default());
}

#[test]
fn invariant_config_file_is_loaded_and_validated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.json");
    fs::write(
        &path,
        r#"{
            "weights": { "structural": 0.4, "placeholder": 0.3, "length": 0.2, "category": 0.1 },
            "delimiters": { "open": "{{", "close": "}}" }
        }"#,
    )
    .unwrap();

    let config = EngineConfig::from_json_file(&path).unwrap();
    assert_eq!(config.weights.structural, 0.4);
    assert_eq!(config.delimiters.open, "{{");
}

#[test]
fn invariant_bad_weights_are_rejected() {
    let sum = EngineConfig::from_json_str(
        r#"{ "weights": { "structural": 0.5, "placeholder": 0.5, "length": 0.5, "category": 0.0 } }"#,
    );
    assert!(matches!(
        sum,
        Err(ConfigError::InvalidWeights(WeightsError::BadSum(_)))
    ));

    let negative = EngineConfig::from_json_str(
        r#"{ "weights": { "structural": 1.25, "placeholder": -0.25, "length": 0.0, "category": 0.0 } }"#,
    );
    assert!(matches!(
        negative,
        Err(ConfigError::InvalidWeights(WeightsError::OutOfRange { name: "placeholder", .. }))
    ));

    let category_only = EngineConfig::from_json_str(
        r#"{ "weights": { "structural": 0.0, "placeholder": 0.0, "length": 0.0, "category": 1.0 } }"#,
    );
    assert!(matches!(
        category_only,
        Err(ConfigError::InvalidWeights(WeightsError::NoContentSignal))
    ));
}

#[test]
fn invariant_other_invalid_settings_are_rejected() {
    assert!(matches!(
        EngineConfig::from_json_str(r#"{ "default_top_k": 0 }"#),
        Err(ConfigError::InvalidTopK)
    ));
    assert!(matches!(
        EngineConfig::from_json_str(r#"{ "delimiters": { "open": "", "close": "}" } }"#),
        Err(ConfigError::InvalidDelimiters)
    ));
    assert!(matches!(
        EngineConfig::from_json_str(r#"{ "plain_heading_max_chars": 0 }"#),
        Err(ConfigError::InvalidHeadingLength)
    ));
    assert!(matches!(
        EngineConfig::from_json_str("not json"),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn invariant_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        EngineConfig::from_json_file(&dir.path().join("missing.json")),
        Err(ConfigError::Io(_))
    ));
}
