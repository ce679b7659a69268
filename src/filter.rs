use std::fmt;
use std::str::FromStr;

use crate::models::Record;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusFilter<S> {
    All,
    Only(S),
}

impl<S> Default for StatusFilter<S> {
    fn default() -> Self {
        StatusFilter::All
    }
}

impl<S: Copy + PartialEq> StatusFilter<S> {
    pub fn matches(&self, status: S) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }

    /// Step through `All` then each status in order, wrapping around.
    pub fn cycle(&self, statuses: &[S]) -> Self {
        match self {
            StatusFilter::All => statuses.first().copied().map_or(StatusFilter::All, StatusFilter::Only),
            StatusFilter::Only(current) => {
                match statuses.iter().position(|s| s == current) {
                    Some(i) if i + 1 < statuses.len() => StatusFilter::Only(statuses[i + 1]),
                    _ => StatusFilter::All,
                }
            }
        }
    }
}

impl<S: fmt::Display> fmt::Display for StatusFilter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => f.write_str("all"),
            StatusFilter::Only(status) => status.fmt(f),
        }
    }
}

impl<S: FromStr> FromStr for StatusFilter<S> {
    type Err = S::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") || s.trim().is_empty() {
            Ok(StatusFilter::All)
        } else {
            s.parse().map(StatusFilter::Only)
        }
    }
}

/// Case-insensitive substring match over the record's search fields.
/// A blank term matches everything.
pub fn matches_term<R: Record>(record: &R, term: &str) -> bool {
    let term = term.trim();
    if term.is_empty() {
        return true;
    }
    let needle = term.to_lowercase();
    record
        .search_text()
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

pub fn matches<R: Record>(record: &R, term: &str, status: &StatusFilter<R::Status>) -> bool {
    status.matches(record.status()) && matches_term(record, term)
}

/// The records a page would display for a search term and status filter,
/// in their original order.
#[cfg(test)]
pub fn filtered_view<'a, R: Record>(
    records: &'a [R],
    term: &str,
    status: &StatusFilter<R::Status>,
) -> Vec<&'a R> {
    records.iter().filter(|r| matches(*r, term, status)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback;
    use crate::models::{Campaign, CampaignStatus, CollaborationStatus, Influencer, OutreachLog};

    #[test]
    fn test_identity_without_filters() {
        let influencers = fallback::influencers();
        let view: Vec<Influencer> = filtered_view(&influencers, "", &StatusFilter::All)
            .into_iter()
            .cloned()
            .collect();
        assert_eq!(view, influencers);

        let campaigns = fallback::campaigns();
        assert_eq!(filtered_view(&campaigns, "", &StatusFilter::All).len(), campaigns.len());

        let logs = fallback::outreach();
        assert_eq!(filtered_view(&logs, "  ", &StatusFilter::<_>::All).len(), logs.len());
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let records = vec![Influencer::new("Dr. Sagari", "Instagram", "@dr.sagari")];
        assert_eq!(filtered_view(&records, "sagari", &StatusFilter::All).len(), 1);
        assert_eq!(filtered_view(&records, "SAGARI", &StatusFilter::All).len(), 1);
        assert!(filtered_view(&records, "zzz", &StatusFilter::All).is_empty());
    }

    #[test]
    fn test_search_covers_handle_and_niche() {
        let records = fallback::influencers();
        let by_handle = filtered_view(&records, "fitsaida", &StatusFilter::All);
        assert_eq!(by_handle[0].name, "Fit Saida");
        let by_niche = filtered_view(&records, "endocrin", &StatusFilter::All);
        assert_eq!(by_niche[0].name, "Dr. Manasa Mynepally");
    }

    #[test]
    fn test_term_and_status_compose() {
        let mut records = fallback::influencers();
        records[1].collaboration_status = CollaborationStatus::Interested;
        records[2].collaboration_status = CollaborationStatus::Interested;

        let interested = StatusFilter::Only(CollaborationStatus::Interested);
        assert_eq!(filtered_view(&records, "", &interested).len(), 2);
        let both = filtered_view(&records, "diabetes", &interested);
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].id, 2);
    }

    #[test]
    fn test_campaign_search_uses_description() {
        let campaigns: Vec<Campaign> = fallback::campaigns();
        let hits = filtered_view(&campaigns, "q&a", &StatusFilter::Only(CampaignStatus::Draft));
        assert_eq!(hits.len(), 1);
        let logs: Vec<OutreachLog> = fallback::outreach();
        assert_eq!(filtered_view(&logs, "reversal", &StatusFilter::All).len(), 1);
    }

    #[test]
    fn test_filter_parse_and_cycle() {
        let all: StatusFilter<CampaignStatus> = "all".parse().unwrap();
        assert_eq!(all, StatusFilter::All);
        let paused: StatusFilter<CampaignStatus> = "Paused".parse().unwrap();
        assert_eq!(paused, StatusFilter::Only(CampaignStatus::Paused));
        assert!("nope".parse::<StatusFilter<CampaignStatus>>().is_err());

        let statuses = CampaignStatus::ALL;
        assert_eq!(all.cycle(statuses), StatusFilter::Only(CampaignStatus::Draft));
        assert_eq!(paused.cycle(statuses), StatusFilter::All);
    }
}
