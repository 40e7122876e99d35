use std::collections::HashMap;

use test_case::test_case;

use crate::TunerConfig;
use crate::config::{DEFAULT_MAX_CANDIDATES, DEFAULT_WARMUP_ITERATIONS, DEFAULT_WORKSPACE_BYTES};

fn from_pairs(pairs: &[(&str, &str)]) -> TunerConfig {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    TunerConfig::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn test_default_disables_tuning() {
    let config = TunerConfig::default();
    assert_eq!(config.search_times, 0);
    assert!(!config.is_tuning_enabled());
    assert_eq!(config.max_candidates, 10);
    assert_eq!(config.warmup_iterations, 100);
    assert_eq!(config.workspace_bytes, 4 * 1024 * 1024);
}

#[test]
fn test_builder_defaults_match_default() {
    assert_eq!(TunerConfig::builder().build(), TunerConfig::default());
}

#[test]
fn test_builder() {
    let config = TunerConfig::builder().search_times(5).max_candidates(3).warmup_iterations(7).build();
    assert_eq!(config.search_times, 5);
    assert_eq!(config.max_candidates, 3);
    assert_eq!(config.warmup_iterations, 7);
    assert_eq!(config.workspace_bytes, DEFAULT_WORKSPACE_BYTES);
    assert!(config.is_tuning_enabled());
}

#[test]
fn test_lookup_empty_environment() {
    assert_eq!(from_pairs(&[]), TunerConfig::default());
}

#[test]
fn test_lookup_all_variables() {
    let config = from_pairs(&[
        ("FUSETUNE_SEARCH_TIMES", "20"),
        ("FUSETUNE_MAX_CANDIDATES", "4"),
        ("FUSETUNE_WARMUP_ITERS", "10"),
        ("FUSETUNE_WORKSPACE_BYTES", "65536"),
    ]);
    let expected =
        TunerConfig::builder().search_times(20).max_candidates(4).warmup_iterations(10).workspace_bytes(65536).build();
    assert_eq!(config, expected);
}

#[test_case("3", 3; "positive")]
#[test_case(" 3 ", 3; "padded")]
#[test_case("-2", -2; "negative")]
#[test_case("many", 0; "garbage falls back")]
#[test_case("", 0; "empty falls back")]
fn test_search_times_parsing(raw: &str, expected: i64) {
    assert_eq!(from_pairs(&[("FUSETUNE_SEARCH_TIMES", raw)]).search_times, expected);
}

#[test]
fn test_invalid_limits_fall_back() {
    let config = from_pairs(&[("FUSETUNE_MAX_CANDIDATES", "-1"), ("FUSETUNE_WARMUP_ITERS", "1.5")]);
    assert_eq!(config.max_candidates, DEFAULT_MAX_CANDIDATES);
    assert_eq!(config.warmup_iterations, DEFAULT_WARMUP_ITERATIONS);
}
