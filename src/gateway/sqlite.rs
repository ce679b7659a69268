use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{
    escape_like, now_timestamp, ChangeFeed, ChangeKind, Direction, Gateway, GatewayError, Query, Result, Row,
    Subscription, Table,
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS influencers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        platform TEXT NOT NULL DEFAULT 'Instagram',
        handle TEXT NOT NULL,
        follower_count INTEGER NOT NULL DEFAULT 0,
        engagement_rate REAL NOT NULL DEFAULT 0,
        content_niche TEXT,
        location TEXT,
        contact_info TEXT,
        phone TEXT,
        website_url TEXT,
        notes TEXT,
        collaboration_status TEXT NOT NULL DEFAULT 'pending' CHECK (collaboration_status IN
            ('pending', 'contacted', 'interested', 'negotiating', 'confirmed', 'declined')),
        last_contact TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS campaigns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        budget REAL,
        start_date TEXT,
        end_date TEXT,
        status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'active', 'completed', 'paused')),
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS campaign_influencers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        campaign_id INTEGER NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
        influencer_id INTEGER NOT NULL REFERENCES influencers(id) ON DELETE CASCADE,
        rate REAL,
        deliverables TEXT,
        status TEXT NOT NULL DEFAULT 'invited' CHECK (status IN
            ('invited', 'accepted', 'active', 'completed', 'declined')),
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        UNIQUE (campaign_id, influencer_id)
    );

    CREATE TABLE IF NOT EXISTS outreach_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        influencer_id INTEGER NOT NULL REFERENCES influencers(id) ON DELETE CASCADE,
        contact_date TEXT NOT NULL,
        contact_method TEXT NOT NULL CHECK (contact_method IN ('email', 'phone', 'dm', 'whatsapp')),
        message_content TEXT,
        response_status TEXT NOT NULL DEFAULT 'sent' CHECK (response_status IN
            ('sent', 'delivered', 'read', 'replied', 'no_response')),
        follow_up_date TEXT,
        notes TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE INDEX IF NOT EXISTS idx_influencers_status ON influencers(collaboration_status);
    CREATE INDEX IF NOT EXISTS idx_assignments_campaign ON campaign_influencers(campaign_id);
    CREATE INDEX IF NOT EXISTS idx_assignments_influencer ON campaign_influencers(influencer_id);
    CREATE INDEX IF NOT EXISTS idx_outreach_influencer ON outreach_log(influencer_id);
"#;

/// Local SQLite store with the same tables as the hosted database.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

impl SqliteGateway {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::Transport(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let gateway = Self::with_connection(Connection::open_in_memory()?)?;
        gateway.init()?;
        Ok(gateway)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            feed: ChangeFeed::new(),
        })
    }

    pub fn init(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn is_initialized(&self) -> Result<bool> {
        let tables: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='influencers'",
            [],
            |row| row.get(0),
        )?;
        Ok(tables > 0)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GatewayError::Transport("sqlite connection poisoned".to_string()))
    }

    fn fetch(conn: &Connection, table: Table, id: i64) -> Result<Row> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?1", table.columns().join(", "), table);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map([id], |row| row_to_json(table, row))?;
        match rows.next() {
            Some(row) => Ok(row?),
            None => Err(GatewayError::NotFound { table, id }),
        }
    }
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn list(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        query.validate(table)?;

        let mut sql = format!("SELECT {} FROM {} WHERE 1=1", table.columns().join(", "), table);
        let mut params: Vec<SqlValue> = Vec::new();

        for (column, value) in &query.filters {
            params.push(json_to_sql(value));
            sql.push_str(&format!(" AND {} = ?{}", column, params.len()));
        }

        if let Some(search) = &query.search {
            let pattern = format!("%{}%", escape_like(&search.term));
            let clauses: Vec<String> = search
                .columns
                .iter()
                .map(|column| {
                    params.push(SqlValue::Text(pattern.clone()));
                    format!("{} LIKE ?{} ESCAPE '\\'", column, params.len())
                })
                .collect();
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }

        if let Some((column, direction)) = &query.order {
            let dir = match direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {}, id {}", column, dir, dir));
        } else {
            sql.push_str(" ORDER BY id");
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        tracing::debug!(%table, %sql, "sqlite list");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| row_to_json(table, row))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    async fn get(&self, table: Table, id: i64) -> Result<Row> {
        Self::fetch(&*self.conn()?, table, id)
    }

    async fn create(&self, table: Table, mut row: Row) -> Result<Row> {
        row.remove("id");
        for column in row.keys() {
            table.check_column(column)?;
        }
        let now = now_timestamp();
        for column in ["created_at", "updated_at"] {
            if table.has_column(column) && row.get(column).is_none_or(Value::is_null) {
                row.insert(column.to_string(), Value::String(now.clone()));
            }
        }

        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        let created = {
            let conn = self.conn()?;
            conn.execute(&sql, params_from_iter(row.values().map(json_to_sql)))?;
            let id = conn.last_insert_rowid();
            Self::fetch(&conn, table, id)?
        };
        let id = created.get("id").and_then(Value::as_i64);
        self.feed.publish(table, ChangeKind::Insert, id);
        Ok(created)
    }

    async fn update(&self, table: Table, id: i64, mut patch: Row) -> Result<Row> {
        patch.remove("id");
        for column in patch.keys() {
            table.check_column(column)?;
        }

        let updated = {
            let conn = self.conn()?;
            if !patch.is_empty() {
                let assignments: Vec<String> = patch
                    .keys()
                    .enumerate()
                    .map(|(i, column)| format!("{} = ?{}", column, i + 1))
                    .collect();
                let sql = format!(
                    "UPDATE {} SET {} WHERE id = ?{}",
                    table,
                    assignments.join(", "),
                    patch.len() + 1
                );
                let mut params: Vec<SqlValue> = patch.values().map(json_to_sql).collect();
                params.push(SqlValue::Integer(id));
                if conn.execute(&sql, params_from_iter(params))? == 0 {
                    return Err(GatewayError::NotFound { table, id });
                }
            }
            Self::fetch(&conn, table, id)?
        };
        self.feed.publish(table, ChangeKind::Update, Some(id));
        Ok(updated)
    }

    async fn delete(&self, table: Table, id: i64) -> Result<()> {
        let removed = self
            .conn()?
            .execute(&format!("DELETE FROM {} WHERE id = ?1", table), [id])?;
        if removed == 0 {
            return Err(GatewayError::NotFound { table, id });
        }
        self.feed.publish(table, ChangeKind::Delete, Some(id));
        for (dependent, _) in table.dependents() {
            self.feed.publish(*dependent, ChangeKind::Refresh, None);
        }
        Ok(())
    }

    fn subscribe(&self, table: Table) -> Subscription {
        self.feed.subscribe(table)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

fn row_to_json(table: Table, row: &rusqlite::Row) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (i, column) in table.columns().iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        };
        out.insert(column.to_string(), value);
    }
    Ok(out)
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
