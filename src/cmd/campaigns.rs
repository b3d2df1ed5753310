//! Campaign inspection — `dialflow campaigns`.

use anyhow::Result;
use console::style;

use dialflow::config::Config;
use dialflow::store::{CampaignStatus, ContactStatus};

use super::open_db;

pub fn cmd_campaigns_list(config: &Config, tenant: &str) -> Result<()> {
    let db = open_db(config)?;
    let campaigns = db.lock_sync()?.list_campaigns(tenant)?;

    if campaigns.is_empty() {
        println!("No campaigns found");
        return Ok(());
    }

    for campaign in campaigns {
        println!(
            "{:>4}  {}  {}  cursor {}/{}  {}",
            style(campaign.id).bold(),
            status_badge(campaign.status),
            campaign.name,
            campaign.cursor,
            campaign.total_contacts,
            style(&campaign.prompt_title).dim()
        );
        if let Some(error) = &campaign.error {
            println!("      {}", style(error).red());
        }
    }
    Ok(())
}

pub fn cmd_campaigns_show(config: &Config, tenant: &str, campaign_id: i64) -> Result<()> {
    let db = open_db(config)?;
    let guard = db.lock_sync()?;
    let campaign = guard
        .get_campaign(campaign_id)?
        .filter(|c| c.tenant_id == tenant)
        .ok_or_else(|| anyhow::anyhow!("Campaign {} not found", campaign_id))?;

    println!("Campaign {} — {}", style(campaign.id).bold(), campaign.name);
    println!("  status:   {}", status_badge(campaign.status));
    println!("  prompt:   {} ({})", campaign.prompt_title, campaign.prompt_id);
    println!("  policy:   {}", campaign.failure_policy.as_str());
    println!("  progress: {}/{}", campaign.cursor, campaign.total_contacts);
    if let Some(started) = &campaign.started_at {
        println!("  started:  {}", started);
    }
    if let Some(completed) = &campaign.completed_at {
        println!("  finished: {}", completed);
    }
    if let Some(error) = &campaign.error {
        println!("  error:    {}", style(error).red());
    }

    println!();
    for contact in guard.campaign_contacts(campaign_id)? {
        let marker = match contact.status {
            ContactStatus::Initiated => style("✓").green(),
            ContactStatus::Failed => style("✗").red(),
            ContactStatus::Skipped => style("→").dim(),
            ContactStatus::Pending => style("·").dim(),
        };
        println!(
            "  {} {:<24} {:<16} {}",
            marker,
            contact.full_name,
            contact.phone,
            contact
                .message
                .as_deref()
                .map(|m| style(m).dim().to_string())
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn status_badge(status: CampaignStatus) -> console::StyledObject<&'static str> {
    match status {
        CampaignStatus::Pending => style("pending").dim(),
        CampaignStatus::Running => style("running").cyan(),
        CampaignStatus::Completed => style("completed").green(),
        CampaignStatus::Failed => style("failed").red(),
        CampaignStatus::Canceled => style("canceled").yellow(),
    }
}
