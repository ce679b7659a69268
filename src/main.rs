mod actions;
mod config;
mod crm;
mod fallback;
mod filter;
mod gateway;
mod models;
mod report;
mod stats;
mod tui;
mod view;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::sync::Arc;

use actions::{ActionDispatcher, PrintDispatcher, SystemDispatcher};
use config::{Backend, Config};
use crm::Crm;
use filter::StatusFilter;
use gateway::{ChangeKind, Gateway, Repository, Table};
use models::{
    Campaign, CampaignStatus, CollaborationStatus, ContactMethod, Influencer, OutreachLog, Record,
};
use report::{MemoryReporter, TracingReporter};
use view::ViewState;

#[derive(Parser)]
#[command(name = "outreach")]
#[command(about = "Track medical influencers, campaigns and outreach")]
struct Cli {
    /// Store to use (local or remote); overrides config and OUTREACH_BACKEND
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Print links instead of opening them
    #[arg(long, global = true)]
    print: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local database
    Init,

    #[command(flatten)]
    Store(StoreCommands),
}

/// Commands that work against the configured store.
#[derive(Subcommand)]
enum StoreCommands {
    /// List influencers
    List {
        /// Case-insensitive match on name, handle or niche
        #[arg(short, long)]
        search: Option<String>,

        /// Filter by status (pending, contacted, interested, negotiating, confirmed, declined)
        #[arg(long)]
        status: Option<String>,
    },

    /// Show influencer details
    Show {
        /// Influencer ID
        id: i64,
    },

    /// Add an influencer
    Add {
        name: String,

        /// Platform (Instagram, TikTok, YouTube, ...)
        platform: String,

        /// Handle, e.g. @dr.sagariananda
        handle: String,

        #[command(flatten)]
        details: InfluencerDetails,
    },

    /// Edit an influencer
    Edit {
        /// Influencer ID
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        platform: Option<String>,

        #[arg(long)]
        handle: Option<String>,

        #[command(flatten)]
        details: InfluencerDetails,
    },

    /// Set an influencer's collaboration status
    Status {
        /// Influencer ID
        id: i64,

        /// New status
        status: String,
    },

    /// Delete an influencer (and its outreach history and assignments)
    Delete {
        /// Influencer ID
        id: i64,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Record an outreach attempt
    Log {
        /// Influencer ID
        id: i64,

        /// Contact method (email, phone, dm, whatsapp)
        #[arg(short, long, default_value = "email")]
        method: String,

        /// What was sent
        #[arg(long)]
        message: Option<String>,
    },

    /// Show outreach history for an influencer
    History {
        /// Influencer ID
        id: i64,
    },

    /// Dashboard numbers
    Stats {
        /// Number of top performers to show
        #[arg(short, long, default_value = "5")]
        top: usize,
    },

    /// Compose an invitation email in the mail client
    Invite {
        /// Influencer ID
        id: i64,
    },

    /// Open the influencer's social profile
    Profile {
        /// Influencer ID
        id: i64,
    },

    /// Manage campaigns
    Campaign {
        #[command(subcommand)]
        command: CampaignCommands,
    },

    /// Interactive influencer browser
    Browse,

    /// Print changes to a table as they happen
    Watch {
        /// influencers, campaigns, campaign_influencers or outreach_log
        table: String,
    },

    /// Write the sample dataset into an empty store
    Seed,
}

#[derive(clap::Args, Default)]
struct InfluencerDetails {
    /// Follower count; accepts 45000, 45K, 1.2M
    #[arg(long, value_parser = parse_followers)]
    followers: Option<i64>,

    /// Engagement rate in percent
    #[arg(long)]
    engagement: Option<f64>,

    #[arg(long)]
    niche: Option<String>,

    #[arg(long)]
    location: Option<String>,

    /// Email or other contact
    #[arg(long)]
    contact: Option<String>,

    #[arg(long)]
    phone: Option<String>,

    #[arg(long)]
    website: Option<String>,

    #[arg(long)]
    notes: Option<String>,
}

fn parse_followers(s: &str) -> std::result::Result<i64, String> {
    models::parse_count(s).ok_or_else(|| format!("'{}' is not a follower count", s))
}

impl InfluencerDetails {
    fn apply(self, inf: &mut Influencer) {
        if let Some(followers) = self.followers {
            inf.follower_count = followers;
        }
        if let Some(engagement) = self.engagement {
            inf.engagement_rate = engagement;
        }
        let fields = [
            (self.niche, &mut inf.content_niche),
            (self.location, &mut inf.location),
            (self.contact, &mut inf.contact_info),
            (self.phone, &mut inf.phone),
            (self.website, &mut inf.website_url),
            (self.notes, &mut inf.notes),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                // An empty value clears the field.
                *field = Some(value).filter(|v| !v.trim().is_empty());
            }
        }
    }
}

#[derive(Subcommand)]
enum CampaignCommands {
    /// List campaigns
    List {
        /// Filter by status (draft, active, completed, paused)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Add a campaign
    Add {
        name: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        budget: Option<f64>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<chrono::NaiveDate>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<chrono::NaiveDate>,
    },

    /// Set a campaign's status
    Status {
        /// Campaign ID
        id: i64,

        /// New status
        status: String,
    },

    /// Add an influencer to a campaign
    Assign {
        campaign_id: i64,

        influencer_id: i64,

        /// Agreed rate
        #[arg(short, long)]
        rate: Option<f64>,

        #[arg(short, long)]
        deliverables: Option<String>,
    },

    /// Remove an influencer from a campaign
    Unassign {
        campaign_id: i64,

        influencer_id: i64,
    },

    /// Show campaigns with their influencers
    Roster,

    /// Delete a campaign
    Delete {
        /// Campaign ID
        id: i64,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Logs go to stderr so command output stays clean.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("OUTREACH_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn view_of<R: Record>(gateway: &Arc<dyn Gateway>, config: &Config) -> ViewState<R> {
    ViewState::new(Repository::new(Arc::clone(gateway)), Arc::new(TracingReporter))
        .with_empty_policy(config.empty_policy)
}

/// Loaded view for commands that only read; sample data is shown with a note.
async fn load_view<R: Record>(gateway: &Arc<dyn Gateway>, config: &Config) -> ViewState<R> {
    let mut view = view_of(gateway, config);
    view.load().await;
    if let Some(warning) = view.warning() {
        println!("Note: {}\n", warning);
    }
    view
}

/// Loaded view for commands that write; refuses to edit sample data.
async fn writable_view<R: Record>(gateway: &Arc<dyn Gateway>, config: &Config) -> Result<ViewState<R>> {
    let mut view = view_of(gateway, config);
    view.load().await;
    if view.using_fallback() {
        let warning = view.warning().unwrap_or_default();
        return Err(anyhow!("{}. Changes would not be saved.", warning));
    }
    Ok(view)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn parse_variant<S>(text: &str) -> Result<S>
where
    S: std::str::FromStr,
    S::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(text.parse::<S>()?)
}

fn dispatcher(print: bool) -> Box<dyn ActionDispatcher> {
    if print {
        Box::new(PrintDispatcher)
    } else {
        Box::new(SystemDispatcher)
    }
}

fn print_influencer(inf: &Influencer) {
    println!("Influencer #{}", inf.id);
    println!("Name: {}", inf.name);
    println!("Platform: {} ({})", inf.platform, inf.handle);
    println!("Status: {}", inf.collaboration_status);
    println!(
        "Followers: {}  Engagement: {:.2}%",
        stats::group_thousands(inf.follower_count),
        inf.engagement_rate
    );
    let fields = [
        ("Niche", &inf.content_niche),
        ("Location", &inf.location),
        ("Contact", &inf.contact_info),
        ("Phone", &inf.phone),
        ("Website", &inf.website_url),
        ("Last contact", &inf.last_contact),
        ("Created", &inf.created_at),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("{}: {}", label, value);
        }
    }
    if let Some(notes) = &inf.notes {
        println!("\n--- Notes ---\n{}", textwrap::fill(notes, 78));
    }
}

fn print_counts<K: std::fmt::Display>(title: &str, counts: impl IntoIterator<Item = (K, usize)>) {
    let mut counts: Vec<(K, usize)> = counts.into_iter().collect();
    if counts.is_empty() {
        return;
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    println!("\n{}:", title);
    for (key, count) in counts {
        println!("  {:<24} {:>4}", key.to_string(), count);
    }
}

async fn run_campaign(command: CampaignCommands, gateway: &Arc<dyn Gateway>, config: &Config) -> Result<()> {
    let crm = Crm::new(Arc::clone(gateway));
    match command {
        CampaignCommands::List { status } => {
            let mut view = load_view::<Campaign>(gateway, config).await;
            if let Some(status) = status {
                view.set_status_filter(parse_variant(&status)?);
            }
            let campaigns = view.visible();
            if campaigns.is_empty() {
                println!("No campaigns found.");
            } else {
                println!("{:<6} {:<10} {:<32} {:>12} {:<23}", "ID", "STATUS", "NAME", "BUDGET", "DATES");
                println!("{}", "-".repeat(87));
                for campaign in &campaigns {
                    let dates = match (campaign.start_date, campaign.end_date) {
                        (Some(start), Some(end)) => format!("{} - {}", start, end),
                        (Some(start), None) => format!("from {}", start),
                        (None, Some(end)) => format!("until {}", end),
                        (None, None) => "-".to_string(),
                    };
                    println!(
                        "{:<6} {:<10} {:<32} {:>12} {:<23}",
                        campaign.id,
                        campaign.status,
                        truncate(&campaign.name, 30),
                        campaign.budget.map_or("-".to_string(), |b| format!("{:.0}", b)),
                        dates
                    );
                }
                let stats = view.stats();
                println!("\n{} campaigns, total budget {:.0}", stats.total, stats.total_budget);
            }
        }

        CampaignCommands::Add { name, description, budget, start, end } => {
            let mut view = view_of::<Campaign>(gateway, config);
            let campaign = Campaign {
                name,
                description,
                budget,
                start_date: start,
                end_date: end,
                ..Default::default()
            };
            let id = view.create(campaign).await?;
            println!("Added campaign #{}", id);
        }

        CampaignCommands::Status { id, status } => {
            let status: CampaignStatus = parse_variant(&status)?;
            let mut view = writable_view::<Campaign>(gateway, config).await?;
            view.set_status(id, status).await?;
            println!("Campaign #{} is now {}.", id, status);
        }

        CampaignCommands::Assign { campaign_id, influencer_id, rate, deliverables } => {
            let assignment = crm
                .assign(campaign_id, influencer_id, rate, deliverables.as_deref())
                .await?;
            println!(
                "Invited influencer #{} to campaign #{} (assignment #{})",
                influencer_id, campaign_id, assignment.id
            );
        }

        CampaignCommands::Unassign { campaign_id, influencer_id } => {
            crm.unassign(campaign_id, influencer_id).await?;
            println!("Removed influencer #{} from campaign #{}", influencer_id, campaign_id);
        }

        CampaignCommands::Roster => {
            let rosters = crm.rosters().await.context("Failed to load campaign rosters")?;
            if rosters.is_empty() {
                println!("No campaigns found.");
            }
            for roster in rosters {
                println!(
                    "#{} {} ({}) - {} influencers, committed {:.0}",
                    roster.campaign.id,
                    roster.campaign.name,
                    roster.campaign.status,
                    roster.members.len(),
                    roster.committed_rate()
                );
                for (assignment, inf) in &roster.members {
                    println!(
                        "  #{:<4} {:<28} {:<10} {:>10}",
                        inf.id,
                        truncate(&inf.name, 26),
                        assignment.status,
                        assignment.rate.map_or("-".to_string(), |r| format!("{:.0}", r))
                    );
                }
            }
        }

        CampaignCommands::Delete { id, yes } => {
            let mut view = writable_view::<Campaign>(gateway, config).await?;
            let name = view
                .find(id)
                .map(|e| e.record.name.clone())
                .ok_or_else(|| anyhow!("Campaign #{} not found.", id))?;
            if !yes && !confirm(&format!("Delete campaign '{}' and its assignments?", name))? {
                println!("Cancelled.");
                return Ok(());
            }
            view.delete(id).await?;
            println!("Deleted campaign #{}", id);
        }
    }
    Ok(())
}

fn init_store(config: &Config) -> Result<()> {
    if config.backend == Backend::Remote {
        println!("Remote backend uses the hosted schema; nothing to initialize.");
        return Ok(());
    }
    let db = config.local_gateway()?;
    db.init()?;
    println!("Database initialized at {}", config.database_path().display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(backend) = &cli.backend {
        config.backend = backend.parse()?;
    }

    let command = match cli.command {
        Commands::Init => return init_store(&config),
        Commands::Store(command) => command,
    };

    let gateway = config.gateway()?;
    tracing::debug!(backend = gateway.backend_name(), "store ready");

    match command {
        StoreCommands::List { search, status } => {
            let status: StatusFilter<CollaborationStatus> = match status {
                Some(status) => parse_variant(&status)?,
                None => StatusFilter::All,
            };
            let mut view = view_of::<Influencer>(&gateway, &config);
            view.load_matching(search.as_deref().unwrap_or_default(), status).await;
            if let Some(warning) = view.warning() {
                println!("Note: {}\n", warning);
            }
            let entries = view.visible_entries();
            if entries.is_empty() {
                println!("No influencers found.");
            } else {
                println!(
                    "{:<6} {:<12} {:<26} {:<22} {:<10} {:>9} {:>6}",
                    "ID", "STATUS", "NAME", "HANDLE", "PLATFORM", "FOLLOWERS", "ENG%"
                );
                println!("{}", "-".repeat(97));
                for entry in entries {
                    let inf = &entry.record;
                    println!(
                        "{:<6} {:<12} {:<26} {:<22} {:<10} {:>9} {:>6.1}",
                        inf.id,
                        inf.collaboration_status,
                        truncate(&inf.name, 24),
                        truncate(&inf.handle, 20),
                        truncate(&inf.platform, 10),
                        stats::format_followers(inf.follower_count),
                        inf.engagement_rate
                    );
                }
            }
        }

        StoreCommands::Show { id } => {
            let crm = Crm::new(Arc::clone(&gateway));
            let inf = crm
                .influencers
                .get(id)
                .await
                .with_context(|| format!("Influencer #{} not found", id))?;
            print_influencer(&inf);
            let history = crm.history(id).await?;
            if !history.is_empty() {
                println!("\nOutreach ({}):", history.len());
                for log in history.iter().take(5) {
                    println!(
                        "  {} {:<9} {}",
                        date_part(&log.contact_date),
                        log.contact_method,
                        log.response_status
                    );
                }
            }
        }

        StoreCommands::Add { name, platform, handle, details } => {
            let mut inf = Influencer::new(&name, &platform, &handle);
            details.apply(&mut inf);
            let mut view = view_of::<Influencer>(&gateway, &config);
            let id = view.create(inf).await?;
            println!("Added influencer #{}", id);
        }

        StoreCommands::Edit { id, name, platform, handle, details } => {
            let mut view = writable_view::<Influencer>(&gateway, &config).await?;
            view.update(id, |inf| {
                if let Some(name) = name {
                    inf.name = name;
                }
                if let Some(platform) = platform {
                    inf.platform = platform;
                }
                if let Some(handle) = handle {
                    inf.handle = handle;
                }
                details.apply(inf);
            })
            .await?;
            println!("Updated influencer #{}", id);
        }

        StoreCommands::Status { id, status } => {
            let status: CollaborationStatus = parse_variant(&status)?;
            let mut view = writable_view::<Influencer>(&gateway, &config).await?;
            view.set_status(id, status).await?;
            println!("Influencer #{} is now {}.", id, status);
        }

        StoreCommands::Delete { id, yes } => {
            let mut view = writable_view::<Influencer>(&gateway, &config).await?;
            let name = view
                .find(id)
                .map(|e| e.record.name.clone())
                .ok_or_else(|| anyhow!("Influencer #{} not found.", id))?;
            if !yes && !confirm(&format!("Delete '{}' and their outreach history?", name))? {
                println!("Cancelled.");
                return Ok(());
            }
            view.delete(id).await?;
            println!("Deleted influencer #{}", id);
        }

        StoreCommands::Log { id, method, message } => {
            let method: ContactMethod = parse_variant(&method)?;
            let crm = Crm::new(Arc::clone(&gateway));
            let log = crm.log_outreach(id, method, message.as_deref()).await?;
            println!("Logged {} outreach #{} for influencer #{}", method, log.id, id);
        }

        StoreCommands::History { id } => {
            let crm = Crm::new(Arc::clone(&gateway));
            let history = crm.history(id).await?;
            if history.is_empty() {
                println!("No outreach logged for influencer #{}.", id);
            } else {
                println!("{:<6} {:<12} {:<9} {:<12} {:<40}", "ID", "DATE", "METHOD", "RESPONSE", "MESSAGE");
                println!("{}", "-".repeat(83));
                for log in history {
                    println!(
                        "{:<6} {:<12} {:<9} {:<12} {:<40}",
                        log.id,
                        date_part(&log.contact_date),
                        log.contact_method,
                        log.response_status,
                        truncate(log.message_content.as_deref().unwrap_or("-"), 38)
                    );
                }
            }
        }

        StoreCommands::Stats { top } => {
            let view = load_view::<Influencer>(&gateway, &config).await;
            let stats = view.stats();
            let mut contacts = view_of::<OutreachLog>(&gateway, &config);
            contacts.load().await;
            let recent = stats::recent_outreach(
                contacts.visible(),
                chrono::Utc::now(),
                stats::RECENT_OUTREACH_DAYS,
            );
            println!("Influencers:           {}", stats.total);
            println!("Total reach:           {}", stats::group_thousands(stats.total_followers));
            println!("Avg engagement:        {:.2}%", stats.avg_engagement);
            println!("Active collaborations: {}", stats.active_collaborations);
            println!("Pending outreach:      {}", stats.pending);
            println!("Contacted last {} days: {}", stats::RECENT_OUTREACH_DAYS, recent);
            println!("Niches / cities:       {} / {}", stats.distinct_niches(), stats.distinct_cities());

            print_counts("By status", stats.by_status.iter().map(|(s, n)| (*s, *n)));
            print_counts("By niche", stats.by_niche.iter().map(|(n, c)| (n.as_str(), *c)));
            print_counts("By platform", stats.by_platform.iter().map(|(p, n)| (p.as_str(), *n)));
            print_counts("By city", stats.by_city.iter().map(|(c, n)| (c.as_str(), *n)));

            let records: Vec<Influencer> = view.visible().into_iter().cloned().collect();
            let best = stats::top_performers(&records, top);
            if !best.is_empty() {
                println!("\nTop performers:");
                for (i, inf) in best.iter().enumerate() {
                    println!(
                        "  {}. {:<26} {:>5.1}% {:>8}",
                        i + 1,
                        truncate(&inf.name, 24),
                        inf.engagement_rate,
                        stats::format_followers(inf.follower_count)
                    );
                }
            }
        }

        StoreCommands::Invite { id } => {
            let view = load_view::<Influencer>(&gateway, &config).await;
            let inf = &view
                .find(id)
                .ok_or_else(|| anyhow!("Influencer #{} not found.", id))?
                .record;
            let url = actions::invitation_mailto(inf, &config.sender())
                .ok_or_else(|| anyhow!("No email address on file for {}", inf.name))?;
            dispatcher(cli.print).open(&url)?;
        }

        StoreCommands::Profile { id } => {
            let view = load_view::<Influencer>(&gateway, &config).await;
            let inf = &view
                .find(id)
                .ok_or_else(|| anyhow!("Influencer #{} not found.", id))?
                .record;
            let url = actions::profile_url(&inf.platform, &inf.handle)
                .ok_or_else(|| anyhow!("No profile link for {} on {}", inf.handle, inf.platform))?;
            dispatcher(cli.print).open(&url)?;
        }

        StoreCommands::Campaign { command } => run_campaign(command, &gateway, &config).await?,

        StoreCommands::Browse => {
            // Container events show in the footer instead of on stderr.
            let events = Arc::new(MemoryReporter::new());
            let mut view: ViewState<Influencer> =
                ViewState::new(Repository::new(Arc::clone(&gateway)), events.clone())
                    .with_empty_policy(config.empty_policy);
            view.load().await;
            let opener = dispatcher(cli.print);
            tui::run_browse(&mut view, &events, opener.as_ref(), &config.sender()).await?;
        }

        StoreCommands::Watch { table } => {
            let table: Table = table.parse()?;
            let mut changes = gateway.subscribe(table);
            println!("Watching {} on {} (ctrl-c to stop)", table, gateway.backend_name());
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    change = changes.next() => {
                        let Some(change) = change else { break };
                        let what = match change.kind {
                            ChangeKind::Insert => "insert",
                            ChangeKind::Update => "update",
                            ChangeKind::Delete => "delete",
                            ChangeKind::Refresh => "refresh",
                        };
                        match change.id {
                            Some(id) => println!("{} {} #{}", what, change.table, id),
                            None => println!("{} {}", what, change.table),
                        }
                    }
                }
            }
        }

        StoreCommands::Seed => {
            let crm = Crm::new(Arc::clone(&gateway));
            let summary = crm.seed().await?;
            println!(
                "Seeded {} influencers, {} campaigns, {} assignments, {} outreach entries",
                summary.influencers, summary.campaigns, summary.assignments, summary.outreach
            );
        }
    }

    Ok(())
}

/// "2024-08-12" from "2024-08-12T10:00:00.000Z".
fn date_part(timestamp: &str) -> &str {
    timestamp.split('T').next().unwrap_or(timestamp)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
