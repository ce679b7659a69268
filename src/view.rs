//! The in-memory copy of what a screen shows, kept in step with the store.
//!
//! One [`ViewState`] per record kind. Writes are applied locally first and
//! confirmed by the gateway afterwards; entries carry a [`SyncState`] so a
//! write the store never accepted stays visibly unsynced instead of looking
//! like confirmed data. Reads that fail (or come back empty, depending on
//! [`EmptyPolicy`]) show the kind's sample records and say so through
//! [`ViewState::source`].

use serde::Deserialize;
use std::sync::Arc;

use crate::filter::{self, StatusFilter};
use crate::gateway::{self, ChangeEvent, GatewayError, Query, Repository};
use crate::models::{Campaign, Influencer, Record, ValidationError};
use crate::report::{Event, Operation, Reporter};
use crate::stats::{self, CampaignStats, InfluencerStats};

#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Synced,
    /// Created locally, store hasn't answered yet.
    Pending,
    /// The store rejected or never received the last write.
    Unsynced(String),
    /// From the fallback set; never written to the store.
    Sample,
}

#[derive(Debug, Clone)]
pub struct Entry<R> {
    pub record: R,
    pub sync: SyncState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Unloaded,
    Remote,
    Fallback(FallbackReason),
}

/// What to show when the store answers with zero rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPolicy {
    /// Show the sample records, flagged as such.
    #[default]
    Fallback,
    /// Show an empty list.
    ShowEmpty,
}

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("no record #{0} in view")]
    UnknownRecord(i64),
}

/// Ticket for an optimistic create awaiting the store's answer.
#[derive(Debug)]
#[must_use]
pub struct PendingCreate<R> {
    temp_id: i64,
    record: R,
}

impl<R> PendingCreate<R> {
    pub fn temp_id(&self) -> i64 {
        self.temp_id
    }
}

pub struct ViewState<R: Record> {
    repo: Repository<R>,
    reporter: Arc<dyn Reporter>,
    empty_policy: EmptyPolicy,
    query: Query,
    entries: Vec<Entry<R>>,
    visible: Vec<usize>,
    loading: bool,
    source: DataSource,
    search: String,
    status_filter: StatusFilter<R::Status>,
    next_temp_id: i64,
}

impl<R: Record> ViewState<R> {
    pub fn new(repo: Repository<R>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            repo,
            reporter,
            empty_policy: EmptyPolicy::default(),
            query: Repository::<R>::default_query(),
            entries: Vec::new(),
            visible: Vec::new(),
            loading: false,
            source: DataSource::Unloaded,
            search: String::new(),
            status_filter: StatusFilter::All,
            next_temp_id: 0,
        }
    }

    pub fn with_empty_policy(mut self, policy: EmptyPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    pub fn repository(&self) -> &Repository<R> {
        &self.repo
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn using_fallback(&self) -> bool {
        matches!(self.source, DataSource::Fallback(_))
    }

    /// Banner text when the list isn't real data.
    pub fn warning(&self) -> Option<String> {
        match &self.source {
            DataSource::Fallback(FallbackReason::Empty) => {
                Some(format!("No {} yet, showing demo data", R::TABLE))
            }
            DataSource::Fallback(FallbackReason::Failed(err)) => {
                Some(format!("Using demo data: could not load {} ({})", R::TABLE, err))
            }
            DataSource::Unloaded | DataSource::Remote => None,
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn status_filter(&self) -> StatusFilter<R::Status> {
        self.status_filter
    }

    pub fn set_search(&mut self, term: &str) {
        self.search = term.to_string();
        self.refresh_view();
    }

    pub fn set_status_filter(&mut self, filter: StatusFilter<R::Status>) {
        self.status_filter = filter;
        self.refresh_view();
    }

    pub fn entries(&self) -> &[Entry<R>] {
        &self.entries
    }

    #[cfg(test)]
    pub fn records(&self) -> impl Iterator<Item = &R> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, id: i64) -> Option<&Entry<R>> {
        self.entries.iter().find(|e| e.record.id() == id)
    }

    /// Entries passing the current search term and status filter.
    pub fn visible_entries(&self) -> Vec<&Entry<R>> {
        self.visible.iter().map(|&i| &self.entries[i]).collect()
    }

    pub fn visible(&self) -> Vec<&R> {
        self.visible.iter().map(|&i| &self.entries[i].record).collect()
    }

    fn refresh_view(&mut self) {
        self.visible = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| filter::matches(&e.record, &self.search, &self.status_filter))
            .map(|(i, _)| i)
            .collect();
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.entries.iter().position(|e| e.record.id() == id)
    }

    // --- load ---

    pub fn begin_load(&mut self) {
        self.loading = true;
    }

    pub fn finish_load(&mut self, result: gateway::Result<Vec<R>>) {
        let table = R::TABLE;
        match result {
            Ok(records) if !records.is_empty() => {
                self.reporter.report(Event::Loaded { table, count: records.len() });
                self.source = DataSource::Remote;
                self.entries = records
                    .into_iter()
                    .map(|record| Entry { record, sync: SyncState::Synced })
                    .collect();
            }
            Ok(_) => match self.empty_policy {
                EmptyPolicy::Fallback if !self.query.is_narrowed() => {
                    self.reporter.report(Event::FallbackActivated {
                        table,
                        reason: "store returned no rows".to_string(),
                    });
                    self.show_fallback(FallbackReason::Empty);
                }
                // No match for a search says nothing about whether the store is empty.
                EmptyPolicy::Fallback | EmptyPolicy::ShowEmpty => {
                    self.reporter.report(Event::Loaded { table, count: 0 });
                    self.source = DataSource::Remote;
                    self.entries.clear();
                }
            },
            Err(err) => {
                self.reporter.report(Event::FallbackActivated {
                    table,
                    reason: err.to_string(),
                });
                self.show_fallback(FallbackReason::Failed(err.to_string()));
            }
        }
        self.loading = false;
        self.refresh_view();
    }

    fn show_fallback(&mut self, reason: FallbackReason) {
        self.source = DataSource::Fallback(reason);
        self.entries = R::fallback()
            .into_iter()
            .map(|record| Entry { record, sync: SyncState::Sample })
            .collect();
    }

    pub async fn load(&mut self) {
        self.begin_load();
        let result = self.repo.list(&self.query).await;
        self.finish_load(result);
    }

    /// Load only what the store finds for `term` and `status`. Reloads keep
    /// the same narrowing, and the filter also applies locally so sample data
    /// and later local edits are held to it.
    pub async fn load_matching(&mut self, term: &str, status: StatusFilter<R::Status>) {
        self.search = term.to_string();
        self.status_filter = status;
        self.begin_load();
        let result = match Repository::<R>::search_query(term, &status) {
            Ok(query) => {
                self.query = query;
                self.repo.search(term, &status).await
            }
            Err(err) => Err(err),
        };
        self.finish_load(result);
    }

    /// Reload when the store reports a change to this view's table.
    pub async fn handle_change(&mut self, event: &ChangeEvent) -> bool {
        if event.table != R::TABLE {
            return false;
        }
        self.load().await;
        true
    }

    // --- create ---

    /// Validate and append the record right away under a temporary id.
    pub fn begin_create(&mut self, mut record: R) -> Result<PendingCreate<R>, ValidationError> {
        if let Err(err) = record.validate() {
            self.reporter.report(Event::Rejected {
                table: R::TABLE,
                error: err.to_string(),
            });
            return Err(err);
        }
        self.next_temp_id -= 1;
        let temp_id = self.next_temp_id;
        record.set_id(temp_id);
        self.entries.push(Entry {
            record: record.clone(),
            sync: SyncState::Pending,
        });
        self.refresh_view();
        Ok(PendingCreate { temp_id, record })
    }

    /// Swap the optimistic entry for the stored row, or mark it unsynced.
    /// Returns the id the record ends up with.
    pub fn finish_create(
        &mut self,
        pending: PendingCreate<R>,
        result: gateway::Result<R>,
    ) -> Result<i64, ViewError> {
        let table = R::TABLE;
        let position = self.position(pending.temp_id);
        let outcome = match (result, position) {
            (Ok(stored), Some(i)) => {
                let id = stored.id();
                self.entries[i] = Entry { record: stored, sync: SyncState::Synced };
                Ok(id)
            }
            (Ok(stored), None) => {
                self.reporter.report(Event::Orphaned { table, id: stored.id() });
                Ok(stored.id())
            }
            (Err(err), position) => {
                self.reporter.report(Event::WriteFailed {
                    table,
                    op: Operation::Create,
                    id: pending.temp_id,
                    error: err.to_string(),
                });
                if let Some(i) = position {
                    self.entries[i].sync = SyncState::Unsynced(err.to_string());
                }
                Err(ViewError::Gateway(err))
            }
        };
        self.refresh_view();
        outcome
    }

    pub async fn create(&mut self, record: R) -> Result<i64, ViewError> {
        let pending = self.begin_create(record)?;
        let result = self.repo.create(&pending.record).await;
        self.finish_create(pending, result)
    }

    // --- delete ---

    /// Drops the entry immediately. A failed remote delete is reported and
    /// returned, but the entry stays gone until the next load.
    pub async fn delete(&mut self, id: i64) -> Result<(), ViewError> {
        let i = self.position(id).ok_or(ViewError::UnknownRecord(id))?;
        let entry = self.entries.remove(i);
        self.refresh_view();

        match entry.sync {
            // Not in the store (yet); a late create confirmation is reported as orphaned.
            SyncState::Pending => Ok(()),
            SyncState::Sample => {
                self.reporter.report(Event::LocalOnly {
                    table: R::TABLE,
                    op: Operation::Delete,
                    id,
                });
                Ok(())
            }
            SyncState::Unsynced(_) if id < 0 => Ok(()),
            SyncState::Synced | SyncState::Unsynced(_) => {
                self.repo.delete(id).await.map_err(|err| {
                    self.reporter.report(Event::WriteFailed {
                        table: R::TABLE,
                        op: Operation::Delete,
                        id,
                        error: err.to_string(),
                    });
                    ViewError::Gateway(err)
                })
            }
        }
    }

    // --- update ---

    /// Apply `edit` locally, then send the changed columns to the store.
    /// A rejected edit (validation) is reverted; a failed remote write is
    /// kept and marked unsynced.
    pub async fn update<F>(&mut self, id: i64, edit: F) -> Result<(), ViewError>
    where
        F: FnOnce(&mut R),
    {
        let i = self.position(id).ok_or(ViewError::UnknownRecord(id))?;
        let before = self.entries[i].record.clone();
        let mut after = before.clone();
        edit(&mut after);
        after.set_id(id);
        if let Err(err) = after.validate() {
            self.reporter.report(Event::Rejected {
                table: R::TABLE,
                error: err.to_string(),
            });
            return Err(err.into());
        }
        self.entries[i].record = after.clone();
        self.refresh_view();

        match self.entries[i].sync {
            SyncState::Sample | SyncState::Pending => {
                self.reporter.report(Event::LocalOnly {
                    table: R::TABLE,
                    op: Operation::Update,
                    id,
                });
                return Ok(());
            }
            SyncState::Unsynced(_) if id < 0 => return Ok(()),
            SyncState::Synced | SyncState::Unsynced(_) => {}
        }

        let patch = gateway::diff(&before, &after)?;
        if patch.is_empty() {
            return Ok(());
        }
        let result = self.repo.update(id, patch).await;

        // The entry may have moved while the request was out.
        let Some(i) = self.position(id) else {
            return result.map(|_| ()).map_err(ViewError::from);
        };
        match result {
            Ok(stored) => {
                self.entries[i] = Entry { record: stored, sync: SyncState::Synced };
                self.refresh_view();
                Ok(())
            }
            Err(err) => {
                self.reporter.report(Event::WriteFailed {
                    table: R::TABLE,
                    op: Operation::Update,
                    id,
                    error: err.to_string(),
                });
                self.entries[i].sync = SyncState::Unsynced(err.to_string());
                Err(err.into())
            }
        }
    }

    pub async fn set_status(&mut self, id: i64, status: R::Status) -> Result<(), ViewError> {
        self.update(id, |record| record.set_status(status)).await
    }
}

impl ViewState<Influencer> {
    /// Dashboard numbers for the influencers currently shown.
    pub fn stats(&self) -> InfluencerStats {
        stats::influencer_stats(self.visible())
    }
}

impl ViewState<Campaign> {
    pub fn stats(&self) -> CampaignStats {
        stats::campaign_stats(self.visible())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback;
    use crate::gateway::mock::MockGateway;
    use crate::gateway::{ChangeKind, Table};
    use crate::models::{CampaignStatus, CollaborationStatus};
    use crate::report::MemoryReporter;

    struct Harness {
        gateway: Arc<MockGateway>,
        reporter: Arc<MemoryReporter>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                gateway: Arc::new(MockGateway::new()),
                reporter: Arc::new(MemoryReporter::new()),
            }
        }

        fn view<R: Record>(&self) -> ViewState<R> {
            ViewState::new(Repository::new(self.gateway.clone()), self.reporter.clone())
        }

        async fn seed(&self, name: &str, handle: &str, followers: i64) -> Influencer {
            let mut inf = Influencer::new(name, "Instagram", handle);
            inf.follower_count = followers;
            Repository::<Influencer>::new(self.gateway.clone())
                .create(&inf)
                .await
                .unwrap()
        }
    }

    fn ids<R: Record>(view: &ViewState<R>) -> Vec<i64> {
        view.records().map(|r| r.id()).collect()
    }

    #[tokio::test]
    async fn test_load_remote_rows() {
        let h = Harness::new();
        h.seed("Dr. Sagari Ananda", "@dr.sagariananda", 45_000).await;
        h.seed("Fit Saida", "@fitsaida_fit", 527_000).await;

        let mut view = h.view::<Influencer>();
        assert_eq!(view.source(), &DataSource::Unloaded);
        view.load().await;

        assert!(!view.is_loading());
        assert_eq!(view.source(), &DataSource::Remote);
        assert!(!view.using_fallback());
        assert_eq!(view.warning(), None);
        assert_eq!(view.len(), 2);
        assert!(view.entries().iter().all(|e| e.sync == SyncState::Synced));
    }

    #[tokio::test]
    async fn test_load_matching_narrows_in_store() {
        let h = Harness::new();
        h.seed("Dr. Sagari Ananda", "@dr.sagariananda", 45_000).await;
        h.seed("Fit Saida", "@fitsaida_fit", 527_000).await;

        let mut view = h.view::<Influencer>();
        view.load_matching("SAGARI", StatusFilter::All).await;
        assert_eq!(view.source(), &DataSource::Remote);
        assert_eq!(view.len(), 1);
        assert_eq!(view.visible()[0].name, "Dr. Sagari Ananda");
        assert_eq!(view.search(), "SAGARI");

        // Nothing matching is an empty result, not an empty store.
        view.load_matching("sagari", StatusFilter::Only(CollaborationStatus::Confirmed))
            .await;
        assert_eq!(view.source(), &DataSource::Remote);
        assert!(view.is_empty());
        assert!(!view.using_fallback());

        // A change reload keeps the narrowing.
        let event = ChangeEvent { table: Table::Influencers, kind: ChangeKind::Refresh, id: None };
        view.load_matching("fit", StatusFilter::All).await;
        assert!(view.handle_change(&event).await);
        assert_eq!(view.len(), 1);
        assert_eq!(view.visible()[0].name, "Fit Saida");
    }

    #[tokio::test]
    async fn test_begin_load_sets_loading() {
        let h = Harness::new();
        let mut view = h.view::<Influencer>();
        view.begin_load();
        assert!(view.is_loading());
        view.finish_load(Ok(vec![]));
        assert!(!view.is_loading());
    }

    #[tokio::test]
    async fn test_failed_load_shows_fallback() {
        let h = Harness::new();
        h.gateway.set_fail_reads(true).await;
        let mut view = h.view::<Influencer>();
        view.load().await;

        assert!(view.using_fallback());
        assert!(matches!(
            view.source(),
            DataSource::Fallback(FallbackReason::Failed(_))
        ));
        let shown: Vec<Influencer> = view.records().cloned().collect();
        assert_eq!(shown, fallback::influencers());
        assert!(view.entries().iter().all(|e| e.sync == SyncState::Sample));
        assert!(view.warning().unwrap().contains("mock read failure"));
        assert!(!view.is_loading());
    }

    #[tokio::test]
    async fn test_empty_result_follows_fallback_policy() {
        let h = Harness::new();
        let mut view = h.view::<Campaign>();
        view.load().await;
        assert_eq!(
            view.source(),
            &DataSource::Fallback(FallbackReason::Empty)
        );
        assert_eq!(view.len(), fallback::campaigns().len());
        assert!(view.warning().unwrap().starts_with("No campaigns yet"));
    }

    #[tokio::test]
    async fn test_empty_result_with_show_empty_policy() {
        let h = Harness::new();
        let mut view = h.view::<Campaign>().with_empty_policy(EmptyPolicy::ShowEmpty);
        view.load().await;
        assert_eq!(view.source(), &DataSource::Remote);
        assert!(view.is_empty());
        assert!(!view.using_fallback());
    }

    #[tokio::test]
    async fn test_create_is_visible_before_store_answers() {
        let h = Harness::new();
        h.seed("Fit Saida", "@fitsaida_fit", 527_000).await;
        let mut view = h.view::<Influencer>();
        view.load().await;

        let pending = view
            .begin_create(Influencer::new("Pooja Ganesh", "Instagram", "@nutritionist_inkannada"))
            .unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.find(pending.temp_id()).unwrap().sync, SyncState::Pending);
        assert!(h.gateway.rows(Table::Influencers).await.len() == 1);

        let stored = view.repository().create(&pending.record).await;
        let id = view.finish_create(pending, stored).unwrap();
        assert_eq!(id, 2);
        assert_eq!(view.len(), 2);
        let entry = view.find(2).unwrap();
        assert_eq!(entry.sync, SyncState::Synced);
        assert!(entry.record.created_at.is_some());
        assert!(view.records().all(|r| r.id > 0));
    }

    #[tokio::test]
    async fn test_failed_create_is_kept_unsynced() {
        let h = Harness::new();
        h.gateway.set_fail_writes(true).await;
        let mut view = h.view::<Influencer>().with_empty_policy(EmptyPolicy::ShowEmpty);
        view.load().await;

        let err = view
            .create(Influencer::new("Pooja Ganesh", "Instagram", "@nutritionist_inkannada"))
            .await
            .unwrap_err();
        assert!(matches!(err, ViewError::Gateway(GatewayError::Transport(_))));
        assert_eq!(view.len(), 1);
        assert!(matches!(view.entries()[0].sync, SyncState::Unsynced(_)));
        assert!(matches!(
            h.reporter.last(),
            Some(Event::WriteFailed { op: Operation::Create, .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_create_never_reaches_store() {
        let h = Harness::new();
        let mut view = h.view::<Influencer>();
        let err = view.create(Influencer::new("", "Instagram", "@nobody")).await.unwrap_err();
        assert!(matches!(err, ViewError::Validation(ValidationError::Required("name"))));
        assert!(view.is_empty());
        assert!(h.gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_local_even_when_store_fails() {
        let h = Harness::new();
        let a = h.seed("Dr. Sagari Ananda", "@dr.sagariananda", 45_000).await;
        h.seed("Fit Saida", "@fitsaida_fit", 527_000).await;
        let mut view = h.view::<Influencer>();
        view.load().await;

        h.gateway.set_fail_writes(true).await;
        let err = view.delete(a.id).await.unwrap_err();
        assert!(matches!(err, ViewError::Gateway(_)));
        assert!(view.find(a.id).is_none());
        assert_eq!(view.len(), 1);
        assert_eq!(h.gateway.rows(Table::Influencers).await.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_pending_skips_store_and_orphans_late_create() {
        let h = Harness::new();
        let mut view = h.view::<Influencer>();
        let pending = view
            .begin_create(Influencer::new("Fit Saida", "Instagram", "@fitsaida_fit"))
            .unwrap();
        view.delete(pending.temp_id()).await.unwrap();
        assert!(view.is_empty());
        assert!(!h.gateway.calls().await.iter().any(|c| c.starts_with("delete")));

        let stored = view.repository().create(&pending.record).await;
        view.finish_create(pending, stored).unwrap();
        assert!(view.is_empty());
        assert_eq!(
            h.reporter.last(),
            Some(Event::Orphaned { table: Table::Influencers, id: 1 })
        );
    }

    #[tokio::test]
    async fn test_sample_records_never_written() {
        let h = Harness::new();
        h.gateway.set_fail_reads(true).await;
        let mut view = h.view::<Influencer>();
        view.load().await;

        view.set_status(2, CollaborationStatus::Interested).await.unwrap();
        view.delete(1).await.unwrap();
        assert_eq!(
            view.find(2).unwrap().record.collaboration_status,
            CollaborationStatus::Interested
        );
        assert_eq!(view.len(), fallback::influencers().len() - 1);
        assert_eq!(h.gateway.calls().await, vec!["list influencers".to_string()]);
    }

    #[tokio::test]
    async fn test_status_change_syncs() {
        let h = Harness::new();
        let a = h.seed("Dr. Rajender Ramagiri", "@doctor.rajender", 38_000).await;
        let mut view = h.view::<Influencer>();
        view.load().await;

        view.set_status(a.id, CollaborationStatus::Negotiating).await.unwrap();
        let entry = view.find(a.id).unwrap();
        assert_eq!(entry.record.collaboration_status, CollaborationStatus::Negotiating);
        assert_eq!(entry.sync, SyncState::Synced);
        assert!(entry.record.updated_at.is_some());
        let rows = h.gateway.rows(Table::Influencers).await;
        assert_eq!(rows[0]["collaboration_status"], serde_json::json!("negotiating"));
    }

    #[tokio::test]
    async fn test_failed_status_change_is_kept_and_marked() {
        let h = Harness::new();
        let a = h.seed("Dr. Rajender Ramagiri", "@doctor.rajender", 38_000).await;
        let mut view = h.view::<Influencer>();
        view.load().await;

        h.gateway.set_fail_writes(true).await;
        assert!(view.set_status(a.id, CollaborationStatus::Declined).await.is_err());
        let entry = view.find(a.id).unwrap();
        assert_eq!(entry.record.collaboration_status, CollaborationStatus::Declined);
        assert!(matches!(entry.sync, SyncState::Unsynced(_)));
    }

    #[tokio::test]
    async fn test_invalid_edit_is_reverted() {
        let h = Harness::new();
        let a = h.seed("Fit Saida", "@fitsaida_fit", 527_000).await;
        let mut view = h.view::<Influencer>();
        view.load().await;

        let err = view.update(a.id, |r| r.handle.clear()).await.unwrap_err();
        assert!(matches!(err, ViewError::Validation(_)));
        assert_eq!(view.find(a.id).unwrap().record.handle, "@fitsaida_fit");
        assert!(matches!(view.update(999, |_| {}).await, Err(ViewError::UnknownRecord(999))));
    }

    #[tokio::test]
    async fn test_filtered_view_tracks_every_change() {
        let h = Harness::new();
        h.gateway.set_fail_reads(true).await;
        let mut view = h.view::<Influencer>();
        view.load().await;

        assert_eq!(view.visible().len(), view.len());
        view.set_search("HYDERABAD");
        assert!(view.visible().is_empty());
        view.set_search("dr.");
        assert_eq!(view.visible().len(), 4);
        view.set_status_filter(StatusFilter::Only(CollaborationStatus::Interested));
        assert!(view.visible().is_empty());
        view.set_status(3, CollaborationStatus::Interested).await.unwrap();
        assert_eq!(view.visible().len(), 1);
        view.delete(3).await.unwrap();
        assert!(view.visible().is_empty());
        view.set_status_filter(StatusFilter::All);
        view.set_search("");
        assert_eq!(view.visible().len(), view.len());
    }

    #[tokio::test]
    async fn test_total_followers_follows_displayed_set() {
        let h = Harness::new();
        h.gateway.set_fail_reads(true).await;
        let mut view = h.view::<Influencer>();
        view.load().await;

        let sum = |view: &ViewState<Influencer>| -> i64 {
            view.visible().iter().map(|r| r.follower_count).sum()
        };
        assert_eq!(view.stats().total_followers, sum(&view));
        view.set_search("nutrition");
        assert_eq!(view.stats().total_followers, 632_000);
        view.set_search("");
        let mut extra = Influencer::new("Dr. New", "YouTube", "@drnew");
        extra.follower_count = 1_000;
        let pending = view.begin_create(extra).unwrap();
        assert_eq!(view.stats().total_followers, 1_290_000);
        assert_eq!(view.stats().total_followers, sum(&view));
        view.delete(pending.temp_id()).await.unwrap();
        assert_eq!(view.stats().total_followers, 1_289_000);
    }

    #[tokio::test]
    async fn test_change_event_triggers_reload() {
        let h = Harness::new();
        let mut view = h.view::<Campaign>().with_empty_policy(EmptyPolicy::ShowEmpty);
        view.load().await;
        assert!(view.is_empty());

        let mut sub = view.repository().subscribe();
        let campaign = Campaign {
            name: "World Diabetes Day Live".to_string(),
            status: CampaignStatus::Active,
            ..Default::default()
        };
        Repository::<Campaign>::new(h.gateway.clone()).create(&campaign).await.unwrap();
        let event = sub.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);

        assert!(view.handle_change(&event).await);
        assert_eq!(view.len(), 1);
        assert_eq!(view.stats().by_status[&CampaignStatus::Active], 1);

        let other = ChangeEvent { table: Table::OutreachLog, kind: ChangeKind::Refresh, id: None };
        assert!(!view.handle_change(&other).await);
    }
}
