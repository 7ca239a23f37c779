//! Integration tests for the packweight binary's library half:
//! config files and scripted scenarios.

use packweight::config_file;
use packweight::scenario::Scenario;
use packweight_core::{SyncEvent, SyncKey, WeightConfig, WildcardRule};
use std::fs;
use tempfile::TempDir;

// ============================================================
// Config files
// ============================================================

#[test]
fn missing_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = config_file::load(&dir.path().join("nope.toml"));
    assert_eq!(config, WeightConfig::default());
}

#[test]
fn invalid_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("packweight.toml");
    fs::write(&path, "enabled = \"maybe\"\n[[[").unwrap();
    assert_eq!(config_file::load(&path), WeightConfig::default());
}

#[test]
fn partial_config_file_is_merged_and_sanitized() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("packweight.toml");
    fs::write(
        &path,
        r#"
default_mass = 0.2
debounce_ms = 0

[encumbrance]
cap_mass = 120.0

[weight_rules.exact]
"ingot-iron" = 2.0

[[weight_rules.wildcard]]
pattern = "*Ingot*"
mass = 1.0
"#,
    )
    .unwrap();

    let config = config_file::load(&path);
    assert_eq!(config.default_mass, 0.2);
    assert_eq!(config.debounce_ms, 1);
    assert_eq!(config.encumbrance.cap_mass, 120.0);
    assert_eq!(config.encumbrance.start_mass, 30.0);
    assert_eq!(config.weight_rules.exact.get("ingot-iron"), Some(&2.0));
    assert_eq!(
        config.weight_rules.wildcard,
        vec![WildcardRule::new("ingot", 1.0)]
    );
}

#[test]
fn dumped_config_parses_back() {
    let text = config_file::to_toml(&WeightConfig::default());
    assert!(text.contains("debounce_ms = 125"));
    let parsed = config_file::parse(&text).unwrap();
    assert_eq!(parsed, WeightConfig::default());
}

// ============================================================
// Scenarios
// ============================================================

const TRIP: &str = r#"{
  "catalog": {
    "backpack": { "mass": 0.0, "bag_effectiveness": 0.5 }
  },
  "actors": [
    {
      "id": "alice",
      "layout": { "bags": [4] },
      "main": [ { "slot": 16, "code": "backpack", "size": 1 } ]
    },
    {}
  ],
  "steps": [
    { "at_ms": 300, "actor": 0, "action": "set", "container": "fast_access",
      "slot": 0, "stack": { "code": "ingot-iron", "size": 20 } },
    { "at_ms": 100, "actor": 0, "action": "set", "container": "main",
      "slot": 17, "stack": { "code": "ingot-iron", "size": 20 } },
    { "at_ms": 600, "actor": 1, "action": "leave" }
  ],
  "settle_ms": 400
}"#;

fn trip_config() -> WeightConfig {
    let mut config = WeightConfig::default();
    config.weight_rules.exact.insert("ingot-iron".into(), 2.0);
    config
}

#[tokio::test(start_paused = true)]
async fn scenario_runs_to_final_state() {
    let scenario = Scenario::parse(TRIP).unwrap();
    let report = scenario.run(trip_config()).await.unwrap();

    // The second actor left before the end.
    assert_eq!(report.actors.len(), 1);
    let alice = &report.actors[0];
    assert_eq!(alice.actor.as_str(), "alice");
    assert!((alice.raw_mass - 80.0).abs() < 1e-9);
    assert!((alice.effective_mass - 60.0).abs() < 1e-9);
    assert!((alice.multiplier - 0.8).abs() < 1e-9);
    assert_eq!(alice.recomputes, 3);

    let generated: Vec<&str> = report
        .events
        .iter()
        .map(|e| e.actor().as_str())
        .filter(|id| *id != "alice")
        .collect();
    assert!(!generated.is_empty());
    assert!(generated.iter().all(|id| id.starts_with("actor-")));

    let last_effective = report.events.iter().rev().find_map(|e| match e {
        SyncEvent::Value { actor, key, value }
            if actor.as_str() == "alice" && *key == SyncKey::EffectiveMass =>
        {
            Some(*value)
        }
        _ => None,
    });
    assert_eq!(last_effective, Some(60.0));
}

#[test]
fn scenario_rejects_unknown_actor_index() {
    let bad = r#"{ "actors": [ {} ], "steps": [ { "at_ms": 0, "actor": 3, "action": "leave" } ] }"#;
    let err = Scenario::parse(bad).unwrap_err();
    assert!(err.to_string().contains("actor 3"));
}

#[tokio::test(start_paused = true)]
async fn scenario_rejects_out_of_range_placement() {
    let bad = r#"{ "actors": [ { "fast_access": [ { "slot": 99, "code": "x", "size": 1 } ] } ] }"#;
    let scenario = Scenario::parse(bad).unwrap();
    assert!(scenario.run(WeightConfig::default()).await.is_err());
}
