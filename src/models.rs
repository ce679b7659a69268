use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::gateway::Table;

/// Common surface of every record kind the CRM tracks.
///
/// The view container, repositories and fallback provider are generic over
/// this trait; each kind names its table, its status column and the text
/// columns that free-text search looks at.
pub trait Record: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Status: Copy + PartialEq + fmt::Display + FromStr + Serialize + Send + Sync;

    const TABLE: Table;
    const STATUS_COLUMN: &'static str;
    const SEARCH_COLUMNS: &'static [&'static str];
    const ORDER_COLUMN: &'static str = "created_at";

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);
    fn search_text(&self) -> Vec<&str>;
    fn validate(&self) -> Result<(), ValidationError>;
    fn fallback() -> Vec<Self>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("{0} must not be negative")]
    Negative(&'static str),
    #[error("end date {end} is before start date {start}")]
    DateOrder { start: String, end: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
    expected: String,
}

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lower = s.trim().to_lowercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == lower)
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                        expected: $name::ALL
                            .iter()
                            .map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
            }
        }
    };
}

status_enum!(
    /// Outreach pipeline stage. Any stage may follow any other.
    CollaborationStatus, "collaboration status", {
        Pending => "pending",
        Contacted => "contacted",
        Interested => "interested",
        Negotiating => "negotiating",
        Confirmed => "confirmed",
        Declined => "declined",
    }
);

status_enum!(CampaignStatus, "campaign status", {
    Draft => "draft",
    Active => "active",
    Completed => "completed",
    Paused => "paused",
});

status_enum!(AssignmentStatus, "assignment status", {
    Invited => "invited",
    Accepted => "accepted",
    Active => "active",
    Completed => "completed",
    Declined => "declined",
});

status_enum!(ContactMethod, "contact method", {
    Email => "email",
    Phone => "phone",
    Dm => "dm",
    Whatsapp => "whatsapp",
});

status_enum!(ResponseStatus, "response status", {
    Sent => "sent",
    Delivered => "delivered",
    Read => "read",
    Replied => "replied",
    NoResponse => "no_response",
});

impl CollaborationStatus {
    /// Stages that count as an ongoing collaboration on the dashboard.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CollaborationStatus::Interested
                | CollaborationStatus::Negotiating
                | CollaborationStatus::Confirmed
        )
    }
}

impl Default for CollaborationStatus {
    fn default() -> Self {
        CollaborationStatus::Pending
    }
}

impl Default for CampaignStatus {
    fn default() -> Self {
        CampaignStatus::Draft
    }
}

impl Default for AssignmentStatus {
    fn default() -> Self {
        AssignmentStatus::Invited
    }
}

impl Default for ContactMethod {
    fn default() -> Self {
        ContactMethod::Email
    }
}

impl Default for ResponseStatus {
    fn default() -> Self {
        ResponseStatus::Sent
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Influencer {
    pub id: i64,
    pub name: String,
    pub platform: String,
    pub handle: String,
    #[serde(deserialize_with = "lenient::count")]
    pub follower_count: i64,
    #[serde(deserialize_with = "lenient::rate")]
    pub engagement_rate: f64,
    pub content_niche: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,
    pub phone: Option<String>,
    pub website_url: Option<String>,
    pub notes: Option<String>,
    pub collaboration_status: CollaborationStatus,
    pub last_contact: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Influencer {
    pub fn new(name: &str, platform: &str, handle: &str) -> Self {
        Self {
            name: name.to_string(),
            platform: platform.to_string(),
            handle: handle.to_string(),
            ..Default::default()
        }
    }

    /// First comma-separated segment of the location, e.g. "Khajaguda" for
    /// "Khajaguda, Hyderabad".
    pub fn city(&self) -> Option<&str> {
        self.location
            .as_deref()
            .and_then(|l| l.split(',').next())
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

impl Record for Influencer {
    type Status = CollaborationStatus;

    const TABLE: Table = Table::Influencers;
    const STATUS_COLUMN: &'static str = "collaboration_status";
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "handle", "content_niche"];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn status(&self) -> CollaborationStatus {
        self.collaboration_status
    }

    fn set_status(&mut self, status: CollaborationStatus) {
        self.collaboration_status = status;
    }

    fn search_text(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str(), self.handle.as_str()];
        if let Some(niche) = &self.content_niche {
            fields.push(niche);
        }
        fields
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Required("name"));
        }
        if self.handle.trim().is_empty() {
            return Err(ValidationError::Required("handle"));
        }
        if self.follower_count < 0 {
            return Err(ValidationError::Negative("follower_count"));
        }
        if self.engagement_rate < 0.0 {
            return Err(ValidationError::Negative("engagement_rate"));
        }
        Ok(())
    }

    fn fallback() -> Vec<Self> {
        crate::fallback::influencers()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
    pub status: CampaignStatus,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Record for Campaign {
    type Status = CampaignStatus;

    const TABLE: Table = Table::Campaigns;
    const STATUS_COLUMN: &'static str = "status";
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "description"];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn status(&self) -> CampaignStatus {
        self.status
    }

    fn set_status(&mut self, status: CampaignStatus) {
        self.status = status;
    }

    fn search_text(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        if let Some(desc) = &self.description {
            fields.push(desc);
        }
        fields
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Required("name"));
        }
        if self.budget.is_some_and(|b| b < 0.0) {
            return Err(ValidationError::Negative("budget"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(ValidationError::DateOrder {
                    start: start.to_string(),
                    end: end.to_string(),
                });
            }
        }
        Ok(())
    }

    fn fallback() -> Vec<Self> {
        crate::fallback::campaigns()
    }
}

/// Junction row linking one influencer to one campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignInfluencer {
    pub id: i64,
    pub campaign_id: i64,
    pub influencer_id: i64,
    pub rate: Option<f64>,
    pub deliverables: Option<String>,
    pub status: AssignmentStatus,
    pub created_at: Option<String>,
}

impl Record for CampaignInfluencer {
    type Status = AssignmentStatus;

    const TABLE: Table = Table::CampaignInfluencers;
    const STATUS_COLUMN: &'static str = "status";
    const SEARCH_COLUMNS: &'static [&'static str] = &["deliverables"];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn status(&self) -> AssignmentStatus {
        self.status
    }

    fn set_status(&mut self, status: AssignmentStatus) {
        self.status = status;
    }

    fn search_text(&self) -> Vec<&str> {
        self.deliverables.as_deref().into_iter().collect()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.campaign_id == 0 {
            return Err(ValidationError::Required("campaign_id"));
        }
        if self.influencer_id == 0 {
            return Err(ValidationError::Required("influencer_id"));
        }
        if self.rate.is_some_and(|r| r < 0.0) {
            return Err(ValidationError::Negative("rate"));
        }
        Ok(())
    }

    fn fallback() -> Vec<Self> {
        crate::fallback::assignments()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutreachLog {
    pub id: i64,
    pub influencer_id: i64,
    pub contact_date: String,
    pub contact_method: ContactMethod,
    pub message_content: Option<String>,
    pub response_status: ResponseStatus,
    pub follow_up_date: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<String>,
}

impl Record for OutreachLog {
    type Status = ResponseStatus;

    const TABLE: Table = Table::OutreachLog;
    const STATUS_COLUMN: &'static str = "response_status";
    const SEARCH_COLUMNS: &'static [&'static str] = &["message_content", "notes"];
    const ORDER_COLUMN: &'static str = "contact_date";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn status(&self) -> ResponseStatus {
        self.response_status
    }

    fn set_status(&mut self, status: ResponseStatus) {
        self.response_status = status;
    }

    fn search_text(&self) -> Vec<&str> {
        self.message_content
            .as_deref()
            .into_iter()
            .chain(self.notes.as_deref())
            .collect()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.influencer_id == 0 {
            return Err(ValidationError::Required("influencer_id"));
        }
        if self.contact_date.trim().is_empty() {
            return Err(ValidationError::Required("contact_date"));
        }
        Ok(())
    }

    fn fallback() -> Vec<Self> {
        crate::fallback::outreach()
    }
}

/// Deserializers for metrics that older rows store as display strings
/// ("150K", "4.2%").
mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrText {
        Int(i64),
        Float(f64),
        Text(String),
        Null(()),
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(match NumOrText::deserialize(d)? {
            NumOrText::Int(n) => n,
            NumOrText::Float(f) => whole(f).unwrap_or(0),
            NumOrText::Text(s) => parse_count(&s).unwrap_or(0),
            NumOrText::Null(()) => 0,
        })
    }

    pub fn rate<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(match NumOrText::deserialize(d)? {
            NumOrText::Int(n) => n as f64,
            NumOrText::Float(f) => f,
            NumOrText::Text(s) => s.trim().trim_end_matches('%').trim().parse().unwrap_or(0.0),
            NumOrText::Null(()) => 0.0,
        })
    }

    /// `None` for text that isn't a count, or one too large to hold.
    pub fn parse_count(s: &str) -> Option<i64> {
        let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
        let (digits, multiplier) = match cleaned.chars().last() {
            Some('k' | 'K') => (&cleaned[..cleaned.len() - 1], 1_000.0),
            Some('m' | 'M') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
            _ => (cleaned.as_str(), 1.0),
        };
        let n = digits.trim().parse::<f64>().ok()?;
        whole(n * multiplier)
    }

    fn whole(f: f64) -> Option<i64> {
        let rounded = f.round();
        // i64::MAX as f64 rounds up to 2^63, which is already out of range.
        (rounded.is_finite() && rounded.abs() < i64::MAX as f64).then(|| rounded as i64)
    }
}

pub use lenient::parse_count;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(
            "Negotiating".parse::<CollaborationStatus>().unwrap(),
            CollaborationStatus::Negotiating
        );
        assert_eq!(
            "no_response".parse::<ResponseStatus>().unwrap(),
            ResponseStatus::NoResponse
        );
        let err = "maybe".parse::<CampaignStatus>().unwrap_err();
        assert!(err.to_string().contains("draft, active, completed, paused"));
    }

    #[test]
    fn test_influencer_accepts_display_strings() {
        let inf: Influencer = serde_json::from_value(json!({
            "id": 7,
            "name": "Dr. Sarah Johnson",
            "platform": "Instagram",
            "handle": "@drsarahjohnson",
            "follower_count": "150K",
            "engagement_rate": "4.2%",
            "collaboration_status": "contacted"
        }))
        .unwrap();
        assert_eq!(inf.follower_count, 150_000);
        assert!((inf.engagement_rate - 4.2).abs() < f64::EPSILON);
        assert_eq!(inf.collaboration_status, CollaborationStatus::Contacted);
        assert_eq!(inf.content_niche, None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1.2M"), Some(1_200_000));
        assert_eq!(parse_count("45,000"), Some(45_000));
        assert_eq!(parse_count("95k"), Some(95_000));
        assert_eq!(parse_count("n/a"), None);
    }

    #[test]
    fn test_parse_count_rejects_out_of_range() {
        assert_eq!(parse_count("1e19"), None);
        assert_eq!(parse_count("9999999999999M"), None);
        assert_eq!(parse_count("inf"), None);
        assert_eq!(parse_count("NaN"), None);

        let inf: Influencer = serde_json::from_value(json!({
            "name": "Fit Saida", "platform": "Instagram", "handle": "@fitsaida_fit",
            "follower_count": "1e19"
        }))
        .unwrap();
        assert_eq!(inf.follower_count, 0);
        let inf: Influencer = serde_json::from_value(json!({
            "name": "Fit Saida", "platform": "Instagram", "handle": "@fitsaida_fit",
            "follower_count": 1e19
        }))
        .unwrap();
        assert_eq!(inf.follower_count, 0);
    }

    #[test]
    fn test_city_takes_first_segment() {
        let mut inf = Influencer::new("Dr. Manasa Mynepally", "Instagram", "@drmanasamynepally");
        inf.location = Some("Khajaguda, Hyderabad".to_string());
        assert_eq!(inf.city(), Some("Khajaguda"));
        inf.location = Some("  ".to_string());
        assert_eq!(inf.city(), None);
    }

    #[test]
    fn test_validation() {
        let inf = Influencer::new("", "Instagram", "@x");
        assert_eq!(inf.validate(), Err(ValidationError::Required("name")));

        let campaign = Campaign {
            name: "Diabetes Awareness Month".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2024, 11, 30),
            end_date: chrono::NaiveDate::from_ymd_opt(2024, 11, 1),
            ..Default::default()
        };
        assert!(matches!(
            campaign.validate(),
            Err(ValidationError::DateOrder { .. })
        ));
    }
}
