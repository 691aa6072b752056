use auriga::config::Config;

#[test]
fn save_and_reload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auriga_config.yaml");

    let mut config = Config::default();
    config.battery.capacity_kwh = 100.0;
    config.charging.connector_type = "CHADEMO".to_string();
    config.vehicle.max_speed_kmh = 160.0;
    config.save_to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert!((loaded.battery.capacity_kwh - 100.0).abs() < 1e-9);
    assert_eq!(loaded.charging.connector_type, "CHADEMO");
    assert!((loaded.vehicle.max_speed_kmh - 160.0).abs() < 1e-9);
}

#[test]
fn partial_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.yaml");
    std::fs::write(&path, "battery:\n  capacity_kwh: 60.0\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert!((config.battery.capacity_kwh - 60.0).abs() < 1e-9);
    // Everything else keeps its default
    assert!((config.charging.ac_max_power_kw - 11.0).abs() < 1e-9);
    assert_eq!(config.tick_interval_ms, 100);
}

#[test]
fn invalid_bounds_rejected() {
    let mut config = Config::default();
    config.battery.min_voltage = 5.0; // above max_voltage
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.tick_interval_ms = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.charging.min_voltage_v = 600.0;
    assert!(config.validate().is_err());
}

#[test]
fn unreadable_file_is_an_error() {
    assert!(Config::from_file("/nonexistent/auriga.yaml").is_err());
}
