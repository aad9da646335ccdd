//! Scenario: the config files shipped under `config/` load, parse into
//! settings and read no unknown keys.

use ndy_config::{
    load_layered_yaml, report_unused_keys, AdmissionSettings, FactSource, UnusedKeyPolicy,
};

fn config_path(name: &str) -> String {
    format!("{}/../../config/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn base_plus_fixture_is_clean() {
    let base = config_path("base.yaml");
    let fixture = config_path("fixture.yaml");
    let loaded = load_layered_yaml(&[&base, &fixture]).unwrap();

    let settings = AdmissionSettings::from_config_json(&loaded.config_json).unwrap();
    assert_eq!(settings.fact_source, FactSource::Fixture);
    assert_eq!(settings.fixture_path.as_deref(), Some("fixtures/demo_gym.yaml"));
    assert_eq!(settings.override_ttl_minutes, None);

    report_unused_keys(FactSource::Fixture, &loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
}

#[test]
fn base_plus_backend_is_clean() {
    let base = config_path("base.yaml");
    let backend = config_path("backend.yaml");
    let loaded = load_layered_yaml(&[&base, &backend]).unwrap();

    let settings = AdmissionSettings::from_config_json(&loaded.config_json).unwrap();
    assert_eq!(settings.fact_source, FactSource::Backend);
    assert_eq!(settings.override_ttl_minutes, Some(720));
    assert_eq!(settings.database_url_env, "NDY_DATABASE_URL");

    report_unused_keys(FactSource::Backend, &loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
}
