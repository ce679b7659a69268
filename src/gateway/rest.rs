use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{
    escape_like, ChangeFeed, ChangeKind, Direction, Gateway, GatewayError, Query, Result, Row, Subscription,
    Table,
};

/// Client for a PostgREST endpoint (as exposed by Supabase under `/rest/v1`).
#[derive(Clone)]
pub struct RestGateway {
    client: Client,
    base_url: String,
    api_key: String,
    feed: ChangeFeed,
    poll_interval: Option<Duration>,
    polling: Arc<Mutex<HashSet<Table>>>,
}

impl RestGateway {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            feed: ChangeFeed::new(),
            poll_interval: None,
            polling: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Poll subscribed tables so changes made by other clients show up as
    /// `Refresh` events.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    fn endpoint(&self, table: Table) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, table: Table) -> RequestBuilder {
        self.client
            .request(method, self.endpoint(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn rows(response: Response) -> Result<Vec<Row>> {
        let response = check(response).await?;
        let body: Value = response.json().await?;
        match body {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(GatewayError::Rejected {
                        status: 200,
                        message: format!("expected row object, got {}", other),
                    }),
                })
                .collect(),
            Value::Object(row) => Ok(vec![row]),
            other => Err(GatewayError::Rejected {
                status: 200,
                message: format!("expected row array, got {}", other),
            }),
        }
    }

    fn single(table: Table, id: i64, rows: Vec<Row>) -> Result<Row> {
        rows.into_iter()
            .next()
            .ok_or(GatewayError::NotFound { table, id })
    }

    fn spawn_poller(&self, table: Table, interval: Duration) {
        {
            let mut polling = self.polling.lock().unwrap_or_else(PoisonError::into_inner);
            if !polling.insert(table) {
                return;
            }
        }
        let gateway = self.clone();
        tokio::spawn(async move {
            let mut last: Option<u64> = None;
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if gateway.release_if_idle(table) {
                    break;
                }
                let query = Query::new().order_by("id", Direction::Ascending);
                match gateway.list(table, &query).await {
                    Ok(rows) => {
                        let print = fingerprint(&rows);
                        if last.is_some_and(|prev| prev != print) {
                            gateway.feed.publish(table, ChangeKind::Refresh, None);
                        }
                        last = Some(print);
                    }
                    Err(err) => tracing::warn!(%table, error = %err, "poll failed"),
                }
            }
            tracing::debug!(%table, "poller stopped");
        });
    }

    /// Take `table` off the polled set once it has no subscribers. Checked
    /// under the set's lock, so a subscribe racing with this either keeps the
    /// poller alive or finds the table gone and starts a new one.
    fn release_if_idle(&self, table: Table) -> bool {
        let mut polling = self.polling.lock().unwrap_or_else(PoisonError::into_inner);
        if self.feed.subscriber_count(table) > 0 {
            return false;
        }
        polling.remove(&table);
        true
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn list(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        query.validate(table)?;
        let params = list_params(query);
        tracing::debug!(%table, ?params, "rest list");
        let response = self
            .request(reqwest::Method::GET, table)
            .query(&params)
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn get(&self, table: Table, id: i64) -> Result<Row> {
        let rows = self.list(table, &Query::new().eq("id", id)).await?;
        Self::single(table, id, rows)
    }

    async fn create(&self, table: Table, mut row: Row) -> Result<Row> {
        row.remove("id");
        for column in row.keys() {
            table.check_column(column)?;
        }
        let response = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&vec![Value::Object(row)])
            .send()
            .await?;
        let created = Self::rows(response).await?.into_iter().next().ok_or_else(|| {
            GatewayError::Rejected {
                status: 201,
                message: format!("insert into {} returned no row", table),
            }
        })?;
        let id = created.get("id").and_then(Value::as_i64);
        self.feed.publish(table, ChangeKind::Insert, id);
        Ok(created)
    }

    async fn update(&self, table: Table, id: i64, mut patch: Row) -> Result<Row> {
        patch.remove("id");
        for column in patch.keys() {
            table.check_column(column)?;
        }
        let response = self
            .request(reqwest::Method::PATCH, table)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&Value::Object(patch))
            .send()
            .await?;
        let updated = Self::single(table, id, Self::rows(response).await?)?;
        self.feed.publish(table, ChangeKind::Update, Some(id));
        Ok(updated)
    }

    async fn delete(&self, table: Table, id: i64) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, table)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        Self::single(table, id, Self::rows(response).await?)?;
        self.feed.publish(table, ChangeKind::Delete, Some(id));
        for (dependent, _) in table.dependents() {
            self.feed.publish(*dependent, ChangeKind::Refresh, None);
        }
        Ok(())
    }

    fn subscribe(&self, table: Table) -> Subscription {
        let subscription = self.feed.subscribe(table);
        if let Some(interval) = self.poll_interval {
            self.spawn_poller(table, interval);
        }
        subscription
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Auth(message)),
        _ => Err(GatewayError::Rejected {
            status: status.as_u16(),
            message,
        }),
    }
}

/// PostgREST query-string parameters for a list query.
fn list_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    for (column, value) in &query.filters {
        params.push((column.clone(), filter_value(value)));
    }
    if let Some(search) = &query.search {
        let pattern = quote(&format!("*{}*", escape_like(&search.term)));
        let clauses: Vec<String> = search
            .columns
            .iter()
            .map(|column| format!("{}.ilike.{}", column, pattern))
            .collect();
        params.push(("or".to_string(), format!("({})", clauses.join(","))));
    }
    if let Some((column, direction)) = &query.order {
        let dir = match direction {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        };
        params.push(("order".to_string(), format!("{}.{}", column, dir)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn filter_value(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{}", s),
        other => format!("eq.{}", other),
    }
}

/// Double-quote a value so PostgREST's reserved characters (`,` `(` `)`)
/// inside a search term don't break the `or` expression.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn fingerprint(rows: &[Row]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for row in rows {
        Value::Object(row.clone()).to_string().hash(&mut hasher);
    }
    hasher.finish()
}
