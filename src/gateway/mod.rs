//! Table-addressed access to the relational store.
//!
//! A [`Gateway`] speaks rows (`serde_json` objects) against a table name; a
//! [`Repository`] layers one record kind on top of it. Backends:
//! [`rest::RestGateway`] for the hosted PostgREST API and
//! [`sqlite::SqliteGateway`] for the local database file.

pub mod rest;
pub mod sqlite;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::broadcast;

use crate::filter::StatusFilter;
use crate::models::Record;

pub type Row = Map<String, Value>;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not authorized: {0}")]
    Auth(String),
    #[error("{table} #{id} not found")]
    NotFound { table: Table, id: i64 },
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("failed to decode row: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("unknown column '{column}' for table {table}")]
    InvalidColumn { table: Table, column: String },
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                GatewayError::Auth(err.to_string())
            }
            Some(status) => GatewayError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => GatewayError::Transport(format!("bad response body: {err}")),
            None => GatewayError::Transport(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Influencers,
    Campaigns,
    CampaignInfluencers,
    OutreachLog,
}

impl Table {
    pub const ALL: &'static [Table] = &[
        Table::Influencers,
        Table::Campaigns,
        Table::CampaignInfluencers,
        Table::OutreachLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Influencers => "influencers",
            Table::Campaigns => "campaigns",
            Table::CampaignInfluencers => "campaign_influencers",
            Table::OutreachLog => "outreach_log",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Influencers => &[
                "id",
                "name",
                "platform",
                "handle",
                "follower_count",
                "engagement_rate",
                "content_niche",
                "location",
                "contact_info",
                "phone",
                "website_url",
                "notes",
                "collaboration_status",
                "last_contact",
                "created_at",
                "updated_at",
            ],
            Table::Campaigns => &[
                "id",
                "name",
                "description",
                "budget",
                "start_date",
                "end_date",
                "status",
                "created_at",
                "updated_at",
            ],
            Table::CampaignInfluencers => &[
                "id",
                "campaign_id",
                "influencer_id",
                "rate",
                "deliverables",
                "status",
                "created_at",
            ],
            Table::OutreachLog => &[
                "id",
                "influencer_id",
                "contact_date",
                "contact_method",
                "message_content",
                "response_status",
                "follow_up_date",
                "notes",
                "created_at",
            ],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    pub fn check_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(GatewayError::InvalidColumn {
                table: *self,
                column: column.to_string(),
            })
        }
    }

    /// Tables whose rows reference this one and go away with it.
    pub fn dependents(&self) -> &'static [(Table, &'static str)] {
        match self {
            Table::Influencers => &[
                (Table::CampaignInfluencers, "influencer_id"),
                (Table::OutreachLog, "influencer_id"),
            ],
            Table::Campaigns => &[(Table::CampaignInfluencers, "campaign_id")],
            Table::CampaignInfluencers | Table::OutreachLog => &[],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Table {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "contacts" => Ok(Table::OutreachLog),
            _ => Table::ALL
                .iter()
                .copied()
                .find(|t| t.as_str() == name)
                .ok_or_else(|| anyhow::anyhow!("Unknown table '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    pub columns: Vec<String>,
    pub term: String,
}

/// List query: equality filters, an OR'd case-insensitive substring search,
/// and a single ordering column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub search: Option<Search>,
    pub order: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn search(mut self, columns: &[&str], term: &str) -> Self {
        let term = term.trim();
        if !term.is_empty() {
            self.search = Some(Search {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                term: term.to_string(),
            });
        }
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order = Some((column.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when the query can leave rows of the table out.
    pub fn is_narrowed(&self) -> bool {
        !self.filters.is_empty() || self.search.is_some()
    }

    /// Every column the query touches, for validation against the table.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.filters
            .iter()
            .map(|(c, _)| c.as_str())
            .chain(self.search.iter().flat_map(|s| s.columns.iter().map(String::as_str)))
            .chain(self.order.iter().map(|(c, _)| c.as_str()))
    }

    pub fn validate(&self, table: Table) -> Result<()> {
        self.columns().try_for_each(|c| table.check_column(c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// The table changed in a way the backend can't attribute to one row.
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub id: Option<i64>,
}

/// Broadcast fan-out of row changes, shared by the backends.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
    interest: Arc<Mutex<HashMap<Table, Weak<()>>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            interest: Arc::default(),
        }
    }

    pub fn publish(&self, table: Table, kind: ChangeKind, id: Option<i64>) {
        // No receivers is fine.
        let _ = self.tx.send(ChangeEvent { table, kind, id });
    }

    pub fn subscribe(&self, table: Table) -> Subscription {
        let mut interest = self.interest.lock().unwrap_or_else(PoisonError::into_inner);
        let token = match interest.get(&table).and_then(Weak::upgrade) {
            Some(token) => token,
            None => {
                let token = Arc::new(());
                interest.insert(table, Arc::downgrade(&token));
                token
            }
        };
        Subscription {
            table,
            rx: self.tx.subscribe(),
            _interest: token,
        }
    }

    /// Live subscriptions to one table.
    pub fn subscriber_count(&self, table: Table) -> usize {
        let interest = self.interest.lock().unwrap_or_else(PoisonError::into_inner);
        interest.get(&table).map_or(0, Weak::strong_count)
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Change stream for one table. Dropping it unsubscribes.
pub struct Subscription {
    table: Table,
    rx: broadcast::Receiver<ChangeEvent>,
    _interest: Arc<()>,
}

impl Subscription {
    /// Next change on this table, or `None` once the backend is gone.
    /// A lagging subscriber gets a single `Refresh` in place of what it missed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.table == self.table => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(table = %self.table, skipped, "subscriber lagged");
                    return Some(ChangeEvent {
                        table: self.table,
                        kind: ChangeKind::Refresh,
                        id: None,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list(&self, table: Table, query: &Query) -> Result<Vec<Row>>;
    async fn get(&self, table: Table, id: i64) -> Result<Row>;
    async fn create(&self, table: Table, row: Row) -> Result<Row>;
    async fn update(&self, table: Table, id: i64, patch: Row) -> Result<Row>;
    async fn delete(&self, table: Table, id: i64) -> Result<()>;
    fn subscribe(&self, table: Table) -> Subscription;
    fn backend_name(&self) -> &'static str;
}

/// Typed access to one record kind.
pub struct Repository<R> {
    gateway: Arc<dyn Gateway>,
    _kind: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            _kind: PhantomData,
        }
    }
}

impl<R: Record> Repository<R> {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            _kind: PhantomData,
        }
    }

    /// Default listing: newest first by the kind's ordering column.
    pub fn default_query() -> Query {
        Query::new().order_by(R::ORDER_COLUMN, Direction::Descending)
    }

    /// Default listing narrowed by the store: `term` against the kind's
    /// search columns, `status` against its status column.
    pub fn search_query(term: &str, status: &StatusFilter<R::Status>) -> Result<Query> {
        let mut query = Self::default_query().search(R::SEARCH_COLUMNS, term);
        if let StatusFilter::Only(status) = status {
            query = query.eq(R::STATUS_COLUMN, serde_json::to_value(status)?);
        }
        Ok(query)
    }

    pub async fn search(&self, term: &str, status: &StatusFilter<R::Status>) -> Result<Vec<R>> {
        self.list(&Self::search_query(term, status)?).await
    }

    pub async fn list(&self, query: &Query) -> Result<Vec<R>> {
        let rows = self.gateway.list(R::TABLE, query).await?;
        rows.into_iter().map(decode).collect()
    }

    pub async fn list_all(&self) -> Result<Vec<R>> {
        self.list(&Self::default_query()).await
    }

    pub async fn get(&self, id: i64) -> Result<R> {
        decode(self.gateway.get(R::TABLE, id).await?)
    }

    pub async fn create(&self, record: &R) -> Result<R> {
        let row = insert_payload(record)?;
        decode(self.gateway.create(R::TABLE, row).await?)
    }

    pub async fn update(&self, id: i64, mut patch: Row) -> Result<R> {
        if R::TABLE.has_column("updated_at") && !patch.contains_key("updated_at") {
            patch.insert("updated_at".to_string(), Value::String(now_timestamp()));
        }
        decode(self.gateway.update(R::TABLE, id, patch).await?)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.gateway.delete(R::TABLE, id).await
    }

    pub fn subscribe(&self) -> Subscription {
        self.gateway.subscribe(R::TABLE)
    }
}

fn decode<R: Record>(row: Row) -> Result<R> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

fn to_row<R: Record>(record: &R) -> Result<Row> {
    match serde_json::to_value(record)? {
        Value::Object(row) => Ok(row),
        other => Err(GatewayError::Rejected {
            status: 0,
            message: format!("{} record serialized to non-object {}", R::TABLE, other),
        }),
    }
}

/// Row for an insert: server-assigned columns are left to the store.
pub fn insert_payload<R: Record>(record: &R) -> Result<Row> {
    let mut row = to_row(record)?;
    for key in ["id", "created_at", "updated_at"] {
        row.remove(key);
    }
    Ok(row)
}

/// Columns that differ between two versions of a record.
pub fn diff<R: Record>(before: &R, after: &R) -> Result<Row> {
    let before = to_row(before)?;
    let mut after = to_row(after)?;
    after.retain(|key, value| key != "id" && before.get(key) != Some(value));
    Ok(after)
}

/// Escape `LIKE` wildcards (`%`, `_`) and the escape character itself, so a
/// search term matches literally under `ESCAPE '\'`.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
