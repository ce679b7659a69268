//! In-memory gateway for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{
    ChangeFeed, ChangeKind, Direction, Gateway, GatewayError, Query, Result, Row, Subscription,
    Table,
};

#[derive(Default)]
pub struct MockGateway {
    tables: RwLock<BTreeMap<&'static str, Vec<Row>>>,
    next_id: RwLock<i64>,
    fail_reads: RwLock<bool>,
    fail_writes: RwLock<bool>,
    calls: RwLock<Vec<String>>,
    feed: ChangeFeed,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.write().await = fail;
    }

    pub async fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.write().await = fail;
    }

    /// Operations seen so far, as "op table[#id]".
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    pub async fn rows(&self, table: Table) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(table.as_str())
            .cloned()
            .unwrap_or_default()
    }

    async fn record(&self, call: String) {
        self.calls.write().await.push(call);
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_reads.read().await {
            return Err(GatewayError::Transport("mock read failure".to_string()));
        }
        Ok(())
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_writes.read().await {
            return Err(GatewayError::Transport("mock write failure".to_string()));
        }
        Ok(())
    }
}

fn row_id(row: &Row) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn list(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        self.record(format!("list {}", table)).await;
        self.check_read().await?;
        query.validate(table)?;

        let mut rows: Vec<Row> = self
            .rows(table)
            .await
            .into_iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
            })
            .filter(|row| match &query.search {
                None => true,
                Some(search) => {
                    let term = search.term.to_lowercase();
                    search.columns.iter().any(|column| {
                        row.get(column)
                            .and_then(Value::as_str)
                            .is_some_and(|text| text.to_lowercase().contains(&term))
                    })
                }
            })
            .collect();

        if let Some((column, direction)) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(column), b.get(column))
                    .then_with(|| row_id(a).cmp(&row_id(b)));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn get(&self, table: Table, id: i64) -> Result<Row> {
        self.record(format!("get {}#{}", table, id)).await;
        self.check_read().await?;
        self.rows(table)
            .await
            .into_iter()
            .find(|row| row_id(row) == Some(id))
            .ok_or(GatewayError::NotFound { table, id })
    }

    async fn create(&self, table: Table, mut row: Row) -> Result<Row> {
        self.record(format!("create {}", table)).await;
        self.check_write().await?;
        for column in row.keys() {
            table.check_column(column)?;
        }
        let id = {
            let mut next = self.next_id.write().await;
            *next += 1;
            *next
        };
        row.insert("id".to_string(), Value::from(id));
        if table.has_column("created_at") {
            row.insert(
                "created_at".to_string(),
                Value::String(format!("2024-08-{:02}T00:00:00.000Z", id % 28 + 1)),
            );
        }
        self.tables
            .write()
            .await
            .entry(table.as_str())
            .or_default()
            .push(row.clone());
        self.feed.publish(table, ChangeKind::Insert, Some(id));
        Ok(row)
    }

    async fn update(&self, table: Table, id: i64, patch: Row) -> Result<Row> {
        self.record(format!("update {}#{}", table, id)).await;
        self.check_write().await?;
        let updated = {
            let mut tables = self.tables.write().await;
            let row = tables
                .get_mut(table.as_str())
                .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id)))
                .ok_or(GatewayError::NotFound { table, id })?;
            for (column, value) in patch {
                if column != "id" {
                    row.insert(column, value);
                }
            }
            row.clone()
        };
        self.feed.publish(table, ChangeKind::Update, Some(id));
        Ok(updated)
    }

    async fn delete(&self, table: Table, id: i64) -> Result<()> {
        self.record(format!("delete {}#{}", table, id)).await;
        self.check_write().await?;
        {
            let mut tables = self.tables.write().await;
            let rows = tables.entry(table.as_str()).or_default();
            let before = rows.len();
            rows.retain(|row| row_id(row) != Some(id));
            if rows.len() == before {
                return Err(GatewayError::NotFound { table, id });
            }
            for (dependent, column) in table.dependents() {
                if let Some(children) = tables.get_mut(dependent.as_str()) {
                    children.retain(|row| row.get(*column).and_then(Value::as_i64) != Some(id));
                }
            }
        }
        self.feed.publish(table, ChangeKind::Delete, Some(id));
        Ok(())
    }

    fn subscribe(&self, table: Table) -> Subscription {
        self.feed.subscribe(table)
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
