use crate::flatten::FlatRecord;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One destination row, in insert column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub date: NaiveDate,
    pub cluster: String,
    pub namespace: String,
    pub app: String,
    pub pod: String,
    pub container: String,
    pub host: String,
    pub log: String,
    pub ts: DateTime<Utc>,
}

/// Row columns that can be populated from a flattened key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowField {
    Cluster,
    Namespace,
    App,
    Pod,
    Container,
    Host,
    Log,
}

/// Flattened keys (underscore style) recognised out of the box.
pub const DEFAULT_ALIASES: &[(&str, RowField)] = &[
    ("cluster", RowField::Cluster),
    ("kubernetes_namespace_name", RowField::Namespace),
    ("kubernetes_labels_app", RowField::App),
    ("kubernetes_labels_k8s-app", RowField::App),
    ("kubernetes_pod_name", RowField::Pod),
    ("kubernetes_container_name", RowField::Container),
    ("kubernetes_host", RowField::Host),
    ("log", RowField::Log),
];

/// Maps flattened records onto [`Row`]s through an alias table.
#[derive(Debug, Clone)]
pub struct RowMapper {
    aliases: HashMap<String, RowField>,
}

impl Default for RowMapper {
    fn default() -> Self {
        Self {
            aliases: DEFAULT_ALIASES
                .iter()
                .map(|(key, field)| (key.to_string(), *field))
                .collect(),
        }
    }
}

impl RowMapper {
    /// Default aliases with `extra` layered on top. An extra entry for an
    /// existing key replaces the default target.
    pub fn with_aliases<I>(extra: I) -> Self
    where
        I: IntoIterator<Item = (String, RowField)>,
    {
        let mut mapper = Self::default();
        mapper.aliases.extend(extra);
        mapper
    }

    pub fn alias_for(&self, key: &str) -> Option<RowField> {
        self.aliases.get(key).copied()
    }

    /// Build a row, or `None` when the record carries no application name.
    ///
    /// Keys are visited in order; when several keys target the same field
    /// the last one wins.
    pub fn to_row(&self, flat: &FlatRecord, ts: DateTime<Utc>) -> Option<Row> {
        let mut row = Row {
            date: ts.date_naive(),
            cluster: String::new(),
            namespace: String::new(),
            app: String::new(),
            pod: String::new(),
            container: String::new(),
            host: String::new(),
            log: String::new(),
            ts,
        };

        for (key, value) in flat {
            let Some(field) = self.alias_for(key) else {
                continue;
            };
            let value = value.to_string();
            match field {
                RowField::Cluster => row.cluster = value,
                RowField::Namespace => row.namespace = value,
                RowField::App => row.app = value,
                RowField::Pod => row.pod = value,
                RowField::Container => row.container = value,
                RowField::Host => row.host = value,
                RowField::Log => row.log = value,
            }
        }

        if row.app.is_empty() {
            return None;
        }

        Some(row)
    }
}
