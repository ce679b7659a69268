//! Workflows that span more than one table: logging outreach, campaign
//! assignments and rosters.

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::fallback;
use crate::gateway::{self, now_timestamp, Direction, Gateway, Query, Repository};
use crate::models::{
    AssignmentStatus, Campaign, CampaignInfluencer, CollaborationStatus, ContactMethod,
    Influencer, OutreachLog, Record, ResponseStatus,
};

pub struct Crm {
    pub influencers: Repository<Influencer>,
    pub campaigns: Repository<Campaign>,
    pub assignments: Repository<CampaignInfluencer>,
    pub outreach: Repository<OutreachLog>,
}

/// A campaign with its assigned influencers.
#[derive(Debug, Clone)]
pub struct Roster {
    pub campaign: Campaign,
    pub members: Vec<(CampaignInfluencer, Influencer)>,
}

/// Rows written by [`Crm::seed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub influencers: usize,
    pub campaigns: usize,
    pub assignments: usize,
    pub outreach: usize,
}

impl Roster {
    pub fn committed_rate(&self) -> f64 {
        self.members.iter().filter_map(|(a, _)| a.rate).sum()
    }
}

impl Crm {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            influencers: Repository::new(Arc::clone(&gateway)),
            campaigns: Repository::new(Arc::clone(&gateway)),
            assignments: Repository::new(Arc::clone(&gateway)),
            outreach: Repository::new(gateway),
        }
    }

    /// Record a contact attempt and advance the influencer out of `pending`.
    pub async fn log_outreach(
        &self,
        influencer_id: i64,
        method: ContactMethod,
        message: Option<&str>,
    ) -> Result<OutreachLog> {
        let influencer = self
            .influencers
            .get(influencer_id)
            .await
            .with_context(|| format!("Influencer #{} not found", influencer_id))?;

        let now = now_timestamp();
        let entry = OutreachLog {
            influencer_id,
            contact_date: now.clone(),
            contact_method: method,
            message_content: message.map(str::to_string),
            response_status: ResponseStatus::Sent,
            ..Default::default()
        };
        entry.validate()?;
        let logged = self.outreach.create(&entry).await?;

        let mut patch = Map::new();
        patch.insert("last_contact".to_string(), Value::String(now));
        if influencer.collaboration_status == CollaborationStatus::Pending {
            patch.insert(
                Influencer::STATUS_COLUMN.to_string(),
                Value::String(CollaborationStatus::Contacted.to_string()),
            );
        }
        self.influencers.update(influencer_id, patch).await?;

        tracing::info!(influencer_id, method = %method, "logged outreach");
        Ok(logged)
    }

    /// Outreach for one influencer, newest first.
    pub async fn history(&self, influencer_id: i64) -> gateway::Result<Vec<OutreachLog>> {
        let query = Query::new()
            .eq("influencer_id", influencer_id)
            .order_by(OutreachLog::ORDER_COLUMN, Direction::Descending);
        self.outreach.list(&query).await
    }

    pub async fn assign(
        &self,
        campaign_id: i64,
        influencer_id: i64,
        rate: Option<f64>,
        deliverables: Option<&str>,
    ) -> Result<CampaignInfluencer> {
        let assignment = CampaignInfluencer {
            campaign_id,
            influencer_id,
            rate,
            deliverables: deliverables.map(str::to_string),
            status: AssignmentStatus::Invited,
            ..Default::default()
        };
        assignment.validate()?;

        let existing = self
            .assignments
            .list(
                &Query::new()
                    .eq("campaign_id", campaign_id)
                    .eq("influencer_id", influencer_id),
            )
            .await?;
        if !existing.is_empty() {
            return Err(anyhow!(
                "Influencer #{} is already assigned to campaign #{}",
                influencer_id,
                campaign_id
            ));
        }

        Ok(self.assignments.create(&assignment).await?)
    }

    pub async fn unassign(&self, campaign_id: i64, influencer_id: i64) -> Result<()> {
        let existing = self
            .assignments
            .list(
                &Query::new()
                    .eq("campaign_id", campaign_id)
                    .eq("influencer_id", influencer_id),
            )
            .await?;
        let assignment = existing.first().ok_or_else(|| {
            anyhow!(
                "Influencer #{} is not assigned to campaign #{}",
                influencer_id,
                campaign_id
            )
        })?;
        self.assignments.delete(assignment.id).await?;
        Ok(())
    }

    /// Every campaign with its members. Assignments pointing at rows that
    /// no longer exist are skipped.
    pub async fn rosters(&self) -> gateway::Result<Vec<Roster>> {
        let campaigns = self.campaigns.list_all().await?;
        let assignments = self
            .assignments
            .list(&Query::new().order_by("id", Direction::Ascending))
            .await?;
        let influencers: HashMap<i64, Influencer> = self
            .influencers
            .list(&Query::new())
            .await?
            .into_iter()
            .map(|inf| (inf.id, inf))
            .collect();

        let mut by_campaign: HashMap<i64, Vec<(CampaignInfluencer, Influencer)>> = HashMap::new();
        for assignment in assignments {
            if let Some(influencer) = influencers.get(&assignment.influencer_id) {
                by_campaign
                    .entry(assignment.campaign_id)
                    .or_default()
                    .push((assignment, influencer.clone()));
            }
        }

        Ok(campaigns
            .into_iter()
            .map(|campaign| Roster {
                members: by_campaign.remove(&campaign.id).unwrap_or_default(),
                campaign,
            })
            .collect())
    }

    /// Write the sample dataset into an empty store. Sample ids are
    /// remapped to the ids the store hands out.
    pub async fn seed(&self) -> Result<SeedSummary> {
        let existing = self.influencers.list(&Query::new().limit(1)).await?;
        if !existing.is_empty() {
            return Err(anyhow!("Store already has influencers; seed only fills an empty store"));
        }

        let mut summary = SeedSummary::default();
        let mut influencer_ids = HashMap::new();
        for sample in fallback::influencers() {
            let stored = self.influencers.create(&sample).await?;
            influencer_ids.insert(sample.id, stored.id);
            summary.influencers += 1;
        }
        let mut campaign_ids = HashMap::new();
        for sample in fallback::campaigns() {
            let stored = self.campaigns.create(&sample).await?;
            campaign_ids.insert(sample.id, stored.id);
            summary.campaigns += 1;
        }
        for mut sample in fallback::assignments() {
            let (Some(&campaign_id), Some(&influencer_id)) = (
                campaign_ids.get(&sample.campaign_id),
                influencer_ids.get(&sample.influencer_id),
            ) else {
                continue;
            };
            sample.campaign_id = campaign_id;
            sample.influencer_id = influencer_id;
            self.assignments.create(&sample).await?;
            summary.assignments += 1;
        }
        for mut sample in fallback::outreach() {
            let Some(&influencer_id) = influencer_ids.get(&sample.influencer_id) else {
                continue;
            };
            sample.influencer_id = influencer_id;
            self.outreach.create(&sample).await?;
            summary.outreach += 1;
        }

        tracing::info!(?summary, "seeded sample data");
        Ok(summary)
    }
}
