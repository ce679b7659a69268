//! Sample records shown when the store can't be reached (or, by policy, is
//! empty). Everything here is deterministic; ids are stable so the samples
//! reference each other consistently.

use chrono::NaiveDate;

use crate::models::{
    AssignmentStatus, Campaign, CampaignInfluencer, CampaignStatus, CollaborationStatus,
    ContactMethod, Influencer, OutreachLog, ResponseStatus,
};

#[allow(clippy::too_many_arguments)]
fn influencer(
    id: i64,
    name: &str,
    handle: &str,
    follower_count: i64,
    niche: &str,
    location: &str,
    engagement_rate: f64,
    notes: &str,
) -> Influencer {
    let local = name
        .trim_start_matches("Dr. ")
        .to_lowercase()
        .replace(' ', ".");
    Influencer {
        id,
        name: name.to_string(),
        platform: "Instagram".to_string(),
        handle: handle.to_string(),
        follower_count,
        engagement_rate,
        content_niche: Some(niche.to_string()),
        location: Some(location.to_string()),
        contact_info: Some(format!("{}@example.com", local)),
        notes: Some(notes.to_string()),
        collaboration_status: CollaborationStatus::Pending,
        ..Default::default()
    }
}

pub fn influencers() -> Vec<Influencer> {
    vec![
        influencer(1, "Dr. Sagari Ananda", "@dr.sagariananda", 45_000, "Family Medicine", "Hyderabad", 3.2, "Family physician, NDTV contributor"),
        influencer(2, "Dr. Rajender Ramagiri", "@doctor.rajender", 38_000, "Diabetes Care", "Hyderabad", 4.1, "Claims 3000+ reversed cases"),
        influencer(3, "Dr. Manasa Mynepally", "@drmanasamynepally", 25_000, "Endocrinology", "Khajaguda, Hyderabad", 3.8, "Diabetes/thyroid specialist"),
        influencer(4, "Dr. Prudwiraj S", "@drprudwiraj", 22_000, "General Medicine", "Gachibowli, Hyderabad", 2.9, "Magna Clinic & Arete Hospitals"),
        influencer(5, "Pooja Ganesh", "@nutritionist_inkannada", 632_000, "Nutrition", "Bangalore", 5.2, "Award-winning, strong South India presence"),
        influencer(6, "Fit Saida", "@fitsaida_fit", 527_000, "Fitness", "Hyderabad", 2.32, "Fitness athlete, major Hyderabad audience"),
    ]
}

pub fn campaigns() -> Vec<Campaign> {
    vec![
        Campaign {
            id: 1,
            name: "Diabetes Reversal Awareness".to_string(),
            description: Some("Educational reels on reversing type 2 diabetes through diet".to_string()),
            budget: Some(250_000.0),
            start_date: NaiveDate::from_ymd_opt(2024, 9, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 11, 30),
            status: CampaignStatus::Active,
            ..Default::default()
        },
        Campaign {
            id: 2,
            name: "World Diabetes Day Live".to_string(),
            description: Some("Live Q&A sessions with partner doctors on 14 November".to_string()),
            budget: Some(120_000.0),
            start_date: NaiveDate::from_ymd_opt(2024, 11, 14),
            end_date: NaiveDate::from_ymd_opt(2024, 11, 14),
            status: CampaignStatus::Draft,
            ..Default::default()
        },
    ]
}

pub fn assignments() -> Vec<CampaignInfluencer> {
    vec![
        CampaignInfluencer {
            id: 1,
            campaign_id: 1,
            influencer_id: 2,
            rate: Some(40_000.0),
            deliverables: Some("3 reels, 1 live session".to_string()),
            status: AssignmentStatus::Accepted,
            ..Default::default()
        },
        CampaignInfluencer {
            id: 2,
            campaign_id: 1,
            influencer_id: 5,
            rate: Some(90_000.0),
            deliverables: Some("Recipe series, 4 posts".to_string()),
            status: AssignmentStatus::Invited,
            ..Default::default()
        },
    ]
}

pub fn outreach() -> Vec<OutreachLog> {
    vec![OutreachLog {
        id: 1,
        influencer_id: 2,
        contact_date: "2024-08-12T10:00:00.000Z".to_string(),
        contact_method: ContactMethod::Email,
        message_content: Some("Introduced the diabetes reversal program".to_string()),
        response_status: ResponseStatus::Replied,
        ..Default::default()
    }]
}
