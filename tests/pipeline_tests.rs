/// Pipeline tests against the in-memory store
///
/// These cover the flush path end to end:
/// - Batch threshold commits and row order
/// - Decode errors and records without an app
/// - Probe failures, write failures and retained rows
/// - Buffer overflow under both strategies
/// - Final commit at shutdown

use logsink::config::env::from_properties;
use logsink::config::Config;
use logsink::pipeline::{FlushStatus, Pipeline};
use logsink::store::memory::{MemoryStore, StoreCall};
use logsink::store::{Connection, ConnectionState};
use std::collections::HashMap;

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &[(&str, &str)]) -> Config {
        let mut properties: HashMap<String, String> = [
            ("host", "localhost:9000"),
            ("user", "default"),
            ("password", "secret"),
            ("database", "logs"),
            ("table", "k8s"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            properties.insert(k.to_string(), v.to_string());
        }
        from_properties(&properties).unwrap()
    }

    fn pipeline(store: &MemoryStore, extra: &[(&str, &str)]) -> Pipeline<MemoryStore> {
        let config = config(extra);
        let connection = Connection::establish(store, &config.store).unwrap();
        Pipeline::new(&config, connection)
    }

    /// Helper: one framed record for pod `pod` with the given app
    fn record(ts: i64, app: &str, pod: &str, log: &str) -> String {
        format!(
            concat!(
                r#"[{}, {{"kubernetes": {{"namespace_name": "prod", "labels": {{"app": "{}"}}, "#,
                r#""pod_name": "{}", "container_name": "main", "host": "node-1"}}, "log": "{}"}}]"#
            ),
            ts, app, pod, log
        )
    }

    fn chunk(lines: &[String]) -> Vec<u8> {
        let mut data = lines.join("\n");
        data.push('\n');
        data.into_bytes()
    }

    fn logs(store: &MemoryStore) -> Vec<String> {
        store.committed_rows().into_iter().map(|r| r.log).collect()
    }

    #[test]
    fn test_commit_waits_for_batch_size() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "2")]);

        let report = pipeline.flush_bytes(&chunk(&[record(1700000000, "svc", "p-0", "first")]));
        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.decoded, 1);
        assert_eq!(report.committed, 0);
        assert_eq!(report.buffered, 1);
        assert!(store.committed_rows().is_empty());

        let report = pipeline.flush_bytes(&chunk(&[record(1700000001, "svc", "p-1", "second")]));
        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.committed, 2);
        assert_eq!(report.buffered, 0);
        assert_eq!(logs(&store), vec!["first", "second"]);

        let report = pipeline.flush_bytes(&chunk(&[record(1700000002, "svc", "p-2", "third")]));
        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.committed, 0);
        assert_eq!(report.buffered, 1);
        assert_eq!(pipeline.buffered_rows(), 1);
        assert_eq!(logs(&store), vec!["first", "second"]);
    }

    #[test]
    fn test_nested_kubernetes_record_becomes_row() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "1")]);
        let line = concat!(
            r#"[1700000000, {"kubernetes": {"labels": {"app": "svc"}, "pod_name": "p1", "#,
            r#""container_name": "c1", "namespace_name": "ns"}, "log": "hello", "host": "h1"}]"#
        );

        let report = pipeline.flush_bytes(&chunk(&[line.to_string()]));

        assert_eq!(report.status, FlushStatus::Ok);
        let rows = store.committed_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].app, "svc");
        assert_eq!(rows[0].pod, "p1");
        assert_eq!(rows[0].container, "c1");
        assert_eq!(rows[0].namespace, "ns");
        assert_eq!(rows[0].log, "hello");
        // Only `kubernetes_host` feeds the host column.
        assert_eq!(rows[0].host, "");
    }

    #[test]
    fn test_rows_carry_mapped_columns() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "1")]);

        pipeline.flush_bytes(&chunk(&[record(1700000000, "checkout", "checkout-7f9", "hello")]));

        let rows = store.committed_rows();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.app, "checkout");
        assert_eq!(row.namespace, "prod");
        assert_eq!(row.pod, "checkout-7f9");
        assert_eq!(row.container, "main");
        assert_eq!(row.host, "node-1");
        assert_eq!(row.cluster, "");
        assert_eq!(row.ts.timestamp(), 1700000000);
        assert_eq!(row.date.to_string(), "2023-11-14");
    }

    #[test]
    fn test_order_preserved_across_flushes() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "4")]);

        for i in 0..3 {
            let lines: Vec<String> = (0..3)
                .map(|j| record(1700000000 + i * 3 + j, "svc", "p", &format!("line-{}", i * 3 + j)))
                .collect();
            assert_eq!(pipeline.flush_bytes(&chunk(&lines)).status, FlushStatus::Ok);
        }
        pipeline.shutdown();

        let expected: Vec<String> = (0..9).map(|i| format!("line-{}", i)).collect();
        assert_eq!(logs(&store), expected);
    }

    #[test]
    fn test_decode_error_keeps_earlier_records() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "10")]);

        let lines = vec![
            record(1700000000, "svc", "p", "kept"),
            "not json at all".to_string(),
            record(1700000002, "svc", "p", "lost"),
        ];
        let report = pipeline.flush_bytes(&chunk(&lines));

        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.decoded, 1);
        assert_eq!(report.buffered, 1);
    }

    #[test]
    fn test_records_without_app_are_skipped() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "2")]);

        let lines = vec![
            record(1700000000, "svc", "p", "a"),
            record(1700000001, "", "p", "no app"),
            record(1700000002, "svc", "p", "b"),
        ];
        let report = pipeline.flush_bytes(&chunk(&lines));

        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.decoded, 3);
        assert_eq!(report.rejected, 1);
        assert_eq!(logs(&store), vec!["a", "b"]);
    }

    #[test]
    fn test_stop_on_rejected_record_abandons_rest_of_flush() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "10"), ("on_rejected_record", "stop")]);

        let lines = vec![
            record(1700000000, "svc", "p", "a"),
            record(1700000001, "", "p", "no app"),
            record(1700000002, "svc", "p", "b"),
        ];
        let report = pipeline.flush_bytes(&chunk(&lines));

        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.decoded, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.buffered, 1);
    }

    #[test]
    fn test_unreachable_store_asks_for_retry() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "1")]);
        let data = chunk(&[record(1700000000, "svc", "p", "later")]);

        store.set_ping_failure(true);
        let report = pipeline.flush_bytes(&data);
        assert_eq!(report.status, FlushStatus::Retry);
        assert_eq!(report.decoded, 0);
        assert_eq!(report.buffered, 0);
        assert_eq!(pipeline.connection_state(), ConnectionState::Unreachable);

        store.set_ping_failure(false);
        let report = pipeline.flush_bytes(&data);
        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(pipeline.connection_state(), ConnectionState::Healthy);
        assert_eq!(logs(&store), vec!["later"]);
    }

    #[test]
    fn test_write_failure_retains_rows_for_next_commit() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "2"), ("max_buffered_rows", "8")]);

        store.set_exec_failure_at(Some(1));
        let lines = vec![
            record(1700000000, "svc", "p", "a"),
            record(1700000001, "svc", "p", "b"),
        ];
        let report = pipeline.flush_bytes(&chunk(&lines));
        assert_eq!(report.status, FlushStatus::Error);
        assert_eq!(report.committed, 0);
        assert_eq!(report.buffered, 2);
        assert!(store.committed_rows().is_empty());
        assert_eq!(store.calls().last(), Some(&StoreCall::Rollback));

        store.set_exec_failure_at(None);
        let report = pipeline.flush_bytes(&chunk(&[record(1700000002, "svc", "p", "c")]));
        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.committed, 2);
        assert_eq!(report.buffered, 1);
        assert_eq!(logs(&store), vec!["a", "b"]);

        pipeline.shutdown();
        assert_eq!(logs(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_retained_rows_at_cap_commit_once_store_recovers() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "2"), ("max_buffered_rows", "2")]);

        store.set_commit_failure(true);
        let lines = vec![
            record(1700000000, "svc", "p", "a"),
            record(1700000001, "svc", "p", "b"),
        ];
        assert_eq!(pipeline.flush_bytes(&chunk(&lines)).status, FlushStatus::Error);
        assert_eq!(pipeline.buffered_rows(), 2);

        store.set_commit_failure(false);
        let report = pipeline.flush_bytes(&chunk(&[record(1700000002, "svc", "p", "c")]));
        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.committed, 2);
        assert_eq!(report.buffered, 1);

        let report = pipeline.flush_bytes(&chunk(&[record(1700000003, "svc", "p", "d")]));
        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.buffered, 0);
        assert_eq!(logs(&store), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_chunk_larger_than_cap_is_accepted_into_empty_buffer() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "10")]);
        assert_eq!(pipeline.buffer_stats().max_rows, 160);

        let lines: Vec<String> = (0..256)
            .map(|i| record(1700000000 + i, "svc", "p", &format!("line-{}", i)))
            .collect();
        let report = pipeline.flush_bytes(&chunk(&lines));

        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.committed, 256);
        assert_eq!(report.buffered, 0);
        assert_eq!(store.committed_rows().len(), 256);
    }

    #[test]
    fn test_full_buffer_rejects_flush() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "2"), ("max_buffered_rows", "3")]);
        store.set_commit_failure(true);

        let first = vec![
            record(1700000000, "svc", "p", "a"),
            record(1700000001, "svc", "p", "b"),
        ];
        assert_eq!(pipeline.flush_bytes(&chunk(&first)).status, FlushStatus::Error);

        let second = vec![
            record(1700000002, "svc", "p", "c"),
            record(1700000003, "svc", "p", "d"),
        ];
        let report = pipeline.flush_bytes(&chunk(&second));
        assert_eq!(report.status, FlushStatus::Retry);
        assert_eq!(report.buffered, 2);

        store.set_commit_failure(false);
        let report = pipeline.flush_bytes(&chunk(&second));
        assert_eq!(report.status, FlushStatus::Ok);
        assert_eq!(report.committed, 4);
        assert_eq!(logs(&store), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_drop_oldest_evicts_buffered_rows() {
        let store = MemoryStore::new();
        let pipeline = pipeline(
            &store,
            &[("batch_size", "2"), ("max_buffered_rows", "3"), ("overflow", "drop_oldest")],
        );
        store.set_commit_failure(true);

        let lines: Vec<String> = (0..2)
            .map(|i| record(1700000000 + i, "svc", "p", &format!("old-{}", i)))
            .collect();
        pipeline.flush_bytes(&chunk(&lines));

        let lines: Vec<String> = (0..2)
            .map(|i| record(1700000010 + i, "svc", "p", &format!("new-{}", i)))
            .collect();
        let report = pipeline.flush_bytes(&chunk(&lines));
        assert_eq!(report.status, FlushStatus::Error);
        assert_eq!(report.buffered, 3);
        assert_eq!(pipeline.buffer_stats().evicted_total, 1);

        store.set_commit_failure(false);
        let report = pipeline.shutdown();
        assert_eq!(report.committed, 3);
        assert_eq!(logs(&store), vec!["old-1", "new-0", "new-1"]);
    }

    #[test]
    fn test_shutdown_commits_leftovers_and_closes() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "100")]);

        pipeline.flush_bytes(&chunk(&[record(1700000000, "svc", "p", "tail")]));
        assert!(store.committed_rows().is_empty());

        let report = pipeline.shutdown();
        assert_eq!(report.committed, 1);
        assert_eq!(report.dropped, 0);
        assert_eq!(logs(&store), vec!["tail"]);
        assert!(store.is_closed());
        assert_eq!(pipeline.connection_state(), ConnectionState::Closed);

        let report = pipeline.flush_bytes(&chunk(&[record(1700000001, "svc", "p", "late")]));
        assert_eq!(report.status, FlushStatus::Error);
    }

    #[test]
    fn test_shutdown_drops_rows_store_refuses() {
        let store = MemoryStore::new();
        let pipeline = pipeline(&store, &[("batch_size", "100")]);

        pipeline.flush_bytes(&chunk(&[record(1700000000, "svc", "p", "tail")]));
        store.set_commit_failure(true);

        let report = pipeline.shutdown();
        assert_eq!(report.committed, 0);
        assert_eq!(report.dropped, 1);
        assert_eq!(pipeline.buffered_rows(), 0);
        assert!(store.is_closed());
    }

    #[test]
    fn test_concurrent_flushes_do_not_interleave() {
        let store = MemoryStore::new();
        let pipeline = std::sync::Arc::new(pipeline(&store, &[("batch_size", "5")]));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pipeline = pipeline.clone();
                std::thread::spawn(move || {
                    let pod = format!("t{}", t);
                    let lines: Vec<String> = (0..5)
                        .map(|i| record(1700000000 + i, "svc", &pod, &format!("{}-{}", t, i)))
                        .collect();
                    pipeline.flush_bytes(&chunk(&lines)).status
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), FlushStatus::Ok);
        }

        let rows = store.committed_rows();
        assert_eq!(rows.len(), 20);
        for batch in rows.chunks(5) {
            let pod = &batch[0].pod;
            assert!(batch.iter().all(|r| &r.pod == pod));
            let order: Vec<String> = batch.iter().map(|r| r.log.clone()).collect();
            let expected: Vec<String> = (0..5).map(|i| format!("{}-{}", &pod[1..], i)).collect();
            assert_eq!(order, expected);
        }
    }
}
