pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGSINK CONFIGURATION
# =============================================================================
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logsink/config.yml
#   3. /etc/logsink/config.yml
# Without a config file, settings are read from CLICKHOUSE_* environment
# variables (CLICKHOUSE_HOST, CLICKHOUSE_USER, CLICKHOUSE_PASSWORD, ...).
#
# $env{...} references anywhere in this file are replaced by the value of the
# named environment variable before parsing.

# =============================================================================
# STORE
# =============================================================================
store:
  scheme: tcp
  # For the embedded DuckDB store this is a database file path or ":memory:"
  host: ~/.local/share/logsink/logs.duckdb
  user: default
  password: $env{LOGSINK_PASSWORD}
  database: logs
  table: k8s_logs
  write_timeout: 20s
  read_timeout: 10s
  # Create {database}.{table} on connect if it is missing
  create_table: true

# =============================================================================
# BATCHING
# =============================================================================
batch:
  # Rows buffered before a batch is committed
  size: 1024
  # Upper bound on buffered rows while the store is failing (default 16 x size)
  max_buffered_rows: 16384
  # 'reject' asks the host to retry a flush that does not fit,
  # 'drop_oldest' accepts it and evicts the oldest rows
  overflow: reject

# =============================================================================
# FLATTENING
# =============================================================================
flatten:
  # underscore (a_b), dot (a.b), path (a/b) or rails (a[b])
  join: underscore
  lowercase: false

# Extra flattened keys mapped onto row columns
# (cluster, namespace, app, pod, container, host, log)
aliases:
  kubernetes_labels_app_kubernetes_io/name: app

errors:
  # 'skip' drops records without an app and continues,
  # 'stop' also abandons the rest of the flush
  on_rejected_record: skip
"#
    .to_string()
}
