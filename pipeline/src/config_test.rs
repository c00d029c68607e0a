use std::collections::HashMap;

use super::*;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_when_unset() {
    let cfg = ExportConfig::from_lookup(lookup(&[]));
    assert_eq!(cfg, ExportConfig::default());
    assert_eq!(cfg.max_concurrency, 4);
    assert_eq!(cfg.fetch_timeout, Duration::from_secs(30));
}

#[test]
fn parses_overrides() {
    let cfg = ExportConfig::from_lookup(lookup(&[("EXPORT_MAX_CONCURRENCY", "8"), ("EXPORT_FETCH_TIMEOUT_MS", " 250 ")]));
    assert_eq!(cfg.max_concurrency, 8);
    assert_eq!(cfg.fetch_timeout, Duration::from_millis(250));
}

#[test]
fn invalid_values_fall_back() {
    let cfg = ExportConfig::from_lookup(lookup(&[("EXPORT_MAX_CONCURRENCY", "many"), ("EXPORT_FETCH_TIMEOUT_MS", "-1")]));
    assert_eq!(cfg, ExportConfig::default());
}

#[test]
fn concurrency_never_drops_below_one() {
    let cfg = ExportConfig::from_lookup(lookup(&[("EXPORT_MAX_CONCURRENCY", "0")]));
    assert_eq!(cfg.max_concurrency, 1);
    assert_eq!(ExportConfig::default().with_max_concurrency(0).max_concurrency, 1);
}
