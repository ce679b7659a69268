//! Dashboard aggregates. Always computed from whatever set is displayed;
//! nothing here is persisted.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use std::collections::BTreeMap;

use crate::models::{Campaign, CampaignStatus, CollaborationStatus, Influencer, OutreachLog};

/// Window for the dashboard's "recent contacts" count.
pub const RECENT_OUTREACH_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfluencerStats {
    pub total: usize,
    pub total_followers: i64,
    pub avg_engagement: f64,
    pub active_collaborations: usize,
    pub pending: usize,
    pub by_status: BTreeMap<CollaborationStatus, usize>,
    pub by_niche: BTreeMap<String, usize>,
    pub by_city: BTreeMap<String, usize>,
    pub by_platform: BTreeMap<String, usize>,
}

impl InfluencerStats {
    pub fn distinct_niches(&self) -> usize {
        self.by_niche.len()
    }

    pub fn distinct_cities(&self) -> usize {
        self.by_city.len()
    }
}

pub fn influencer_stats<'a>(records: impl IntoIterator<Item = &'a Influencer>) -> InfluencerStats {
    let mut stats = InfluencerStats::default();
    let mut engagement_sum = 0.0;

    for inf in records {
        stats.total += 1;
        stats.total_followers = stats.total_followers.saturating_add(inf.follower_count);
        engagement_sum += inf.engagement_rate;
        if inf.collaboration_status.is_active() {
            stats.active_collaborations += 1;
        }
        if inf.collaboration_status == CollaborationStatus::Pending {
            stats.pending += 1;
        }
        *stats.by_status.entry(inf.collaboration_status).or_default() += 1;
        if let Some(niche) = inf.content_niche.as_deref().filter(|n| !n.trim().is_empty()) {
            *stats.by_niche.entry(niche.to_string()).or_default() += 1;
        }
        if let Some(city) = inf.city() {
            *stats.by_city.entry(city.to_string()).or_default() += 1;
        }
        if !inf.platform.trim().is_empty() {
            *stats.by_platform.entry(inf.platform.clone()).or_default() += 1;
        }
    }

    if stats.total > 0 {
        stats.avg_engagement = engagement_sum / stats.total as f64;
    }
    stats
}

/// Highest engagement first, ties broken by reach.
pub fn top_performers<'a>(
    records: impl IntoIterator<Item = &'a Influencer>,
    limit: usize,
) -> Vec<&'a Influencer> {
    let mut ranked: Vec<&Influencer> = records.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.engagement_rate
            .partial_cmp(&a.engagement_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.follower_count.cmp(&a.follower_count))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignStats {
    pub total: usize,
    pub total_budget: f64,
    pub by_status: BTreeMap<CampaignStatus, usize>,
}

pub fn campaign_stats<'a>(records: impl IntoIterator<Item = &'a Campaign>) -> CampaignStats {
    let mut stats = CampaignStats::default();
    for campaign in records {
        stats.total += 1;
        stats.total_budget += campaign.budget.unwrap_or(0.0);
        *stats.by_status.entry(campaign.status).or_default() += 1;
    }
    stats
}

/// Outreach entries contacted at or after `now - days`. Entries whose date
/// can't be read are not counted.
pub fn recent_outreach<'a>(
    logs: impl IntoIterator<Item = &'a OutreachLog>,
    now: DateTime<Utc>,
    days: i64,
) -> usize {
    let since = now - TimeDelta::days(days);
    logs.into_iter()
        .filter_map(|log| parse_timestamp(&log.contact_date))
        .filter(|at| *at >= since)
        .count()
}

/// RFC 3339, SQLite's "YYYY-MM-DD HH:MM:SS", or a bare date at midnight UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(at.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

/// "1.2M", "45.0K", or the raw count below a thousand.
pub fn format_followers(count: i64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Thousands-separated count, e.g. "632,000".
pub fn group_thousands(count: i64) -> String {
    let digits = count.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if count < 0 {
        out.insert(0, '-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback;

    #[test]
    fn test_totals_over_samples() {
        let records = fallback::influencers();
        let stats = influencer_stats(&records);
        assert_eq!(stats.total, 6);
        assert_eq!(
            stats.total_followers,
            records.iter().map(|r| r.follower_count).sum::<i64>()
        );
        assert_eq!(stats.total_followers, 1_289_000);
        assert_eq!(stats.pending, 6);
        assert_eq!(stats.active_collaborations, 0);
        assert_eq!(stats.distinct_niches(), 6);
        assert_eq!(stats.by_city["Hyderabad"], 3);
        assert_eq!(stats.distinct_cities(), 4);
        assert_eq!(stats.by_platform["Instagram"], 6);
    }

    #[test]
    fn test_total_followers_saturates() {
        let a: Influencer = serde_json::from_value(serde_json::json!({
            "name": "A", "platform": "YouTube", "handle": "@a", "follower_count": i64::MAX
        }))
        .unwrap();
        let mut b = Influencer::new("B", "YouTube", "@b");
        b.follower_count = 5;
        let stats = influencer_stats([&a, &b]);
        assert_eq!(stats.total_followers, i64::MAX);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn test_recent_outreach_counts_last_week() {
        let now = DateTime::parse_from_rfc3339("2024-09-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let logs: Vec<OutreachLog> = [
            "2024-09-10T09:30:00.000Z",
            "2024-09-03T12:00:00Z",
            "2024-09-03T11:59:59Z",
            "2024-09-05 08:00:00",
            "2024-09-04",
            "2024-08-12",
            "last tuesday",
        ]
        .iter()
        .map(|date| OutreachLog {
            influencer_id: 1,
            contact_date: date.to_string(),
            ..Default::default()
        })
        .collect();
        assert_eq!(recent_outreach(&logs, now, RECENT_OUTREACH_DAYS), 4);
        assert_eq!(recent_outreach(&logs, now, 30), 6);
        assert_eq!(recent_outreach(&fallback::outreach(), now, RECENT_OUTREACH_DAYS), 0);
    }

    #[test]
    fn test_average_engagement() {
        let mut a = Influencer::new("A", "TikTok", "@a");
        a.engagement_rate = 4.0;
        let mut b = Influencer::new("B", "TikTok", "@b");
        b.engagement_rate = 6.0;
        b.collaboration_status = CollaborationStatus::Confirmed;
        let stats = influencer_stats([&a, &b]);
        assert!((stats.avg_engagement - 5.0).abs() < 1e-9);
        assert_eq!(stats.active_collaborations, 1);
        assert_eq!(influencer_stats(std::iter::empty()).avg_engagement, 0.0);
    }

    #[test]
    fn test_top_performers() {
        let records = fallback::influencers();
        let top = top_performers(&records, 2);
        let names: Vec<&str> = top.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Pooja Ganesh", "Dr. Rajender Ramagiri"]);
    }

    #[test]
    fn test_campaign_stats() {
        let stats = campaign_stats(&fallback::campaigns());
        assert_eq!(stats.total, 2);
        assert_eq!(stats.total_budget, 370_000.0);
        assert_eq!(stats.by_status[&CampaignStatus::Active], 1);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_followers(1_289_000), "1.3M");
        assert_eq!(format_followers(45_000), "45.0K");
        assert_eq!(format_followers(999), "999");
        assert_eq!(group_thousands(632_000), "632,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
        assert_eq!(group_thousands(12), "12");
    }
}
