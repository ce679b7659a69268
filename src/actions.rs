//! Outbound actions that leave the app: compose an invitation email, open a
//! social profile.

use anyhow::{anyhow, Context, Result};
use std::process::Command;

use crate::models::Influencer;
use crate::stats::group_thousands;

/// Who invitations are sent from.
#[derive(Debug, Clone)]
pub struct Sender {
    pub name: String,
    pub organization: String,
}

pub trait ActionDispatcher {
    fn open(&self, url: &str) -> Result<()>;
}

/// Hands URLs to the desktop's opener (`xdg-open`, `open`, `start`).
pub struct SystemDispatcher;

impl ActionDispatcher for SystemDispatcher {
    fn open(&self, url: &str) -> Result<()> {
        let mut cmd = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        } else {
            Command::new("xdg-open")
        };
        let status = cmd
            .arg(url)
            .status()
            .context("Failed to launch the system URL opener")?;
        if !status.success() {
            return Err(anyhow!("URL opener exited with {}", status));
        }
        Ok(())
    }
}

/// Prints the URL instead of opening it.
pub struct PrintDispatcher;

impl ActionDispatcher for PrintDispatcher {
    fn open(&self, url: &str) -> Result<()> {
        println!("{}", url);
        Ok(())
    }
}

pub fn invitation_subject(sender: &Sender) -> String {
    format!("Collaboration Opportunity - {}", sender.name)
}

pub fn invitation_body(influencer: &Influencer, sender: &Sender) -> String {
    let niche = influencer.content_niche.as_deref().unwrap_or("health education");
    format!(
        "Dear {name},\n\n\
         I hope this message finds you well. I am {sender}, and I've been following your \
         excellent work in {niche}.\n\n\
         I would like to explore a potential collaboration opportunity that could benefit both \
         our audiences. Your expertise and reach of {followers} followers would be invaluable.\n\n\
         Would you be available for a brief call to discuss this further?\n\n\
         Best regards,\n{sender}\n{org}",
        name = influencer.name,
        sender = sender.name,
        niche = niche,
        followers = group_thousands(influencer.follower_count),
        org = sender.organization,
    )
}

/// `mailto:` link with the invitation pre-filled, or `None` when the
/// influencer has no email address on file.
pub fn invitation_mailto(influencer: &Influencer, sender: &Sender) -> Option<String> {
    let address = influencer
        .contact_info
        .as_deref()
        .map(str::trim)
        .filter(|c| c.contains('@') && !c.starts_with('@'))?;
    Some(format!(
        "mailto:{}?subject={}&body={}",
        address,
        urlencoding::encode(&invitation_subject(sender)),
        urlencoding::encode(&invitation_body(influencer, sender)),
    ))
}

/// Public profile URL for the stored handle on the influencer's platform.
pub fn profile_url(platform: &str, handle: &str) -> Option<String> {
    let handle = handle.trim().trim_start_matches('@');
    if handle.is_empty() {
        return None;
    }
    let url = match platform.trim().to_lowercase().as_str() {
        "instagram" => format!("https://instagram.com/{}", handle),
        "tiktok" => format!("https://www.tiktok.com/@{}", handle),
        "youtube" => format!("https://www.youtube.com/@{}", handle),
        "twitter" | "x" => format!("https://x.com/{}", handle),
        "linkedin" => format!("https://www.linkedin.com/in/{}", handle),
        "facebook" => format!("https://www.facebook.com/{}", handle),
        _ => return None,
    };
    Some(url)
}
