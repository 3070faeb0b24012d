/// Plugin tests against an embedded DuckDB store
use logsink::config::env::from_properties;
use logsink::config::StoreConfig;
use logsink::pipeline::FlushStatus;
use logsink::plugin::{ConfigSource, OutputPlugin};
use logsink::store::duckdb::{DuckDbConnector, DuckDbStore};
use logsink::store::ConnectionState;
use std::collections::HashMap;
use tempfile::TempDir;

fn properties(host: &str, batch_size: &str) -> HashMap<String, String> {
    [
        ("host", host),
        ("user", "default"),
        ("password", "secret"),
        ("database", "logs"),
        ("table", "k8s"),
        ("batch_size", batch_size),
        ("create_table", "true"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn chunk(count: i64, offset: i64) -> Vec<u8> {
    let mut data = String::new();
    for i in offset..offset + count {
        data.push_str(&format!(
            concat!(
                r#"[{}, {{"kubernetes": {{"namespace_name": "prod", "labels": {{"app": "svc"}}, "#,
                r#""pod_name": "svc-{}", "container_name": "main", "host": "node-1"}}, "#,
                r#""log": "line {}"}}]"#
            ),
            1700000000 + i,
            i,
            i
        ));
        data.push('\n');
    }
    data.into_bytes()
}

fn store_config(host: &str) -> StoreConfig {
    from_properties(&properties(host, "1")).unwrap().store
}

fn logged_lines(store: &DuckDbStore) -> Vec<String> {
    let conn = store.connection().unwrap();
    let mut stmt = conn
        .prepare("SELECT log FROM logs.k8s ORDER BY ts")
        .unwrap();
    let lines = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    lines
}

#[test]
fn test_plugin_writes_to_database_file() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("data/logs.duckdb");
    let host = db_path.to_string_lossy().into_owned();

    let mut plugin = OutputPlugin::new(DuckDbConnector);
    plugin
        .init(ConfigSource::Properties(properties(&host, "3")))
        .unwrap();
    assert_eq!(plugin.connection_state(), ConnectionState::Connected);

    assert_eq!(plugin.flush(&chunk(2, 0), "kube"), FlushStatus::Ok);
    assert_eq!(plugin.flush(&chunk(2, 2), "kube"), FlushStatus::Ok);
    assert_eq!(plugin.pipeline().unwrap().buffered_rows(), 0);

    assert_eq!(plugin.flush(&chunk(1, 4), "kube"), FlushStatus::Ok);
    assert_eq!(plugin.pipeline().unwrap().buffered_rows(), 1);

    assert_eq!(plugin.exit(), FlushStatus::Ok);
    assert_eq!(plugin.connection_state(), ConnectionState::Closed);
    drop(plugin);

    let store = DuckDbStore::open(&store_config(&host)).unwrap();
    assert_eq!(
        logged_lines(&store),
        vec!["line 0", "line 1", "line 2", "line 3", "line 4"]
    );
}

#[test]
fn test_rows_round_trip_columns() {
    let temp_dir = TempDir::new().unwrap();
    let host = temp_dir.path().join("cols.duckdb").to_string_lossy().into_owned();

    let mut plugin = OutputPlugin::new(DuckDbConnector);
    plugin
        .init(ConfigSource::Properties(properties(&host, "1")))
        .unwrap();
    assert_eq!(plugin.flush(&chunk(1, 0), "kube"), FlushStatus::Ok);
    plugin.exit();
    drop(plugin);

    let store = DuckDbStore::open(&store_config(&host)).unwrap();
    let conn = store.connection().unwrap();
    let (date, app, pod, host_col, ts): (String, String, String, String, String) = conn
        .query_row(
            "SELECT CAST(date AS VARCHAR), app, pod_name, host, CAST(ts AS VARCHAR) FROM logs.k8s",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .unwrap();

    assert_eq!(date, "2023-11-14");
    assert_eq!(app, "svc");
    assert_eq!(pod, "svc-0");
    assert_eq!(host_col, "node-1");
    assert_eq!(ts, "2023-11-14 22:13:20");
}

#[test]
fn test_flush_fails_without_table() {
    let mut props = properties(":memory:", "1");
    props.remove("create_table");

    let mut plugin = OutputPlugin::new(DuckDbConnector);
    plugin.init(ConfigSource::Properties(props)).unwrap();

    // The table is missing, so the first batch cannot be written.
    assert_eq!(plugin.flush(&chunk(1, 0), "kube"), FlushStatus::Error);
    assert_eq!(plugin.pipeline().unwrap().buffered_rows(), 1);
}
