// ==========================================
// ConfigManager 集成测试
// ==========================================
// 测试目标: 分配配置读取、写入校验、快照恢复
// ==========================================


use group_allocation::app::AppState;
use group_allocation::config::{config_keys, AllocationConfig, AllocationConfigReader, ConfigManager};
use rusqlite::params;
use std::time::Duration;
use test_helpers::{create_test_db, open_test_connection};

#[test]
fn test_defaults_when_config_table_empty() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");

    let config = config_manager.load_allocation_config().unwrap();
    assert_eq!(config, AllocationConfig::default());
    assert_eq!(config.lock_timeout_ms, 2_000);
    assert_eq!(config.default_capacity_max, 3);
    assert_eq!(config.lock_timeout(), Duration::from_millis(2_000));
}

#[test]
fn test_update_then_load() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");

    config_manager.update_config(config_keys::LOCK_TIMEOUT_MS, "750").unwrap();
    config_manager.update_config(config_keys::DEFAULT_CAPACITY_MAX, " 5 ").unwrap();
    config_manager.update_config(config_keys::BUSY_TIMEOUT_MS, "8000").unwrap();

    let config = config_manager.load_allocation_config().unwrap();
    assert_eq!(config.lock_timeout_ms, 750);
    assert_eq!(config.default_capacity_max, 5);
    assert_eq!(config.busy_timeout_ms, 8_000);

    // 覆盖写
    config_manager.update_config(config_keys::LOCK_TIMEOUT_MS, "100").unwrap();
    assert_eq!(config_manager.get_lock_timeout_ms().unwrap(), 100);
    assert_eq!(
        config_manager.get_global_config_value(config_keys::LOCK_TIMEOUT_MS).unwrap().as_deref(),
        Some("100")
    );
}

#[test]
fn test_invalid_values_rejected() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");

    assert!(config_manager.update_config(config_keys::LOCK_TIMEOUT_MS, "-1").is_err());
    assert!(config_manager.update_config(config_keys::LOCK_TIMEOUT_MS, "fast").is_err());
    assert!(config_manager.update_config(config_keys::DEFAULT_CAPACITY_MAX, "0").is_err());
    assert!(config_manager.update_config(config_keys::DEFAULT_CAPACITY_MAX, "-3").is_err());

    // 未落库
    assert!(config_manager
        .get_global_config_value(config_keys::DEFAULT_CAPACITY_MAX)
        .unwrap()
        .is_none());

    // 未知键不做校验
    config_manager.update_config("ui.theme", "dark").unwrap();
}

#[test]
fn test_invalid_stored_value_falls_back_to_default() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).unwrap();
    conn.execute(
        "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
        params![config_keys::LOCK_TIMEOUT_MS, "soon"],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
        params![config_keys::DEFAULT_CAPACITY_MAX, "-2"],
    )
    .unwrap();

    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");
    assert_eq!(config_manager.get_lock_timeout_ms().unwrap(), 2_000);
    assert_eq!(config_manager.get_default_capacity_max().unwrap(), 3);
}

#[test]
fn test_snapshot_and_restore() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");

    config_manager.update_config(config_keys::LOCK_TIMEOUT_MS, "500").unwrap();
    config_manager.update_config(config_keys::DEFAULT_CAPACITY_MAX, "4").unwrap();
    let snapshot = config_manager.get_config_snapshot().unwrap();

    let parsed: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
    assert_eq!(parsed[config_keys::LOCK_TIMEOUT_MS], "500");

    config_manager.update_config(config_keys::LOCK_TIMEOUT_MS, "9000").unwrap();
    let restored = config_manager.restore_config_from_snapshot(&snapshot).unwrap();
    assert_eq!(restored, 2);
    assert_eq!(config_manager.get_lock_timeout_ms().unwrap(), 500);

    // 快照中任一项非法 → 整体拒绝
    let bad = format!(
        r#"{{"{}":"1","{}":"0"}}"#,
        config_keys::LOCK_TIMEOUT_MS,
        config_keys::DEFAULT_CAPACITY_MAX
    );
    assert!(config_manager.restore_config_from_snapshot(&bad).is_err());
    assert_eq!(config_manager.get_lock_timeout_ms().unwrap(), 500);
    assert_eq!(config_manager.get_default_capacity_max().unwrap(), 4);
}

#[test]
fn test_app_state_applies_stored_config() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    {
        let config_manager = ConfigManager::new(&db_path).unwrap();
        config_manager.update_config(config_keys::LOCK_TIMEOUT_MS, "125").unwrap();
    }

    let state = AppState::new(db_path).unwrap();
    assert_eq!(state.config.lock_timeout_ms, 125);
    assert_eq!(state.engine.lock_timeout(), Duration::from_millis(125));
}
