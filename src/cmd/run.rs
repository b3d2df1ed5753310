//! Campaign execution — `dialflow run`, `resume`, and `cancel`.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use console::style;

use dialflow::campaign::Sequencer;
use dialflow::config::Config;
use dialflow::contacts::parse_contacts;
use dialflow::gateway::HttpCallGateway;
use dialflow::store::{CampaignStatus, DbHandle, FailurePolicy, PromptSelection};
use dialflow::ui::CampaignUI;

use super::open_db;

pub async fn cmd_run(
    config: &Config,
    tenant: &str,
    file: &Path,
    prompt_id: Option<&str>,
    name: Option<&str>,
    policy: Option<&str>,
) -> Result<()> {
    let db = open_db(config)?;

    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read contact list {}", file.display()))?;
    let parsed = parse_contacts(&raw)?;
    println!(
        "{} leads loaded{}",
        style(parsed.loaded()).bold(),
        if parsed.skipped > 0 {
            format!(", {} rows skipped (missing name or phone)", parsed.skipped)
        } else {
            String::new()
        }
    );

    let policy = match policy {
        Some(raw) => FailurePolicy::from_str(raw).map_err(|e| anyhow::anyhow!(e))?,
        None => config.settings.campaign.failure_policy,
    };

    let selection = {
        let guard = db.lock_sync()?;
        let prompt = match prompt_id {
            Some(id) => guard
                .get_prompt(tenant, id)?
                .with_context(|| format!("Prompt {} not found", id))?,
            None => guard
                .get_default_prompt(tenant)?
                .context("No prompt selected and no default prompt configured")?,
        };
        PromptSelection::from_prompt(&prompt)
    };

    let name = name
        .map(str::to_string)
        .or_else(|| {
            file.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "Untitled campaign".to_string());

    let campaign = {
        let guard = db.lock_sync()?;
        guard.create_campaign(tenant, &name, &selection, policy, &parsed.contacts)?
    };
    println!(
        "Created campaign {} ({}) with prompt {}",
        style(campaign.id).bold(),
        campaign.name,
        style(&campaign.prompt_title).cyan()
    );

    drive(config, db, campaign.id, false).await
}

pub async fn cmd_resume(config: &Config, campaign_id: i64) -> Result<()> {
    let db = open_db(config)?;
    drive(config, db, campaign_id, true).await
}

pub fn cmd_cancel(config: &Config, campaign_id: i64) -> Result<()> {
    let db = open_db(config)?;
    let campaign = db.lock_sync()?.cancel_campaign(campaign_id)?;
    match campaign.status {
        CampaignStatus::Canceled => println!("Campaign {} canceled", campaign_id),
        status => println!(
            "Campaign {} already finished ({}), nothing to cancel",
            campaign_id, status
        ),
    }
    Ok(())
}

/// Run the sequencer in the foreground with the terminal UI attached.
async fn drive(config: &Config, db: DbHandle, campaign_id: i64, resume: bool) -> Result<()> {
    let total = {
        let guard = db.lock_sync()?;
        guard.campaign_contacts(campaign_id)?.len()
    };

    let gateway = Arc::new(HttpCallGateway::new(
        config.settings.bridge.base_url.clone(),
        config.gateway_timeout(),
    )?);
    let ui = Arc::new(CampaignUI::new(total as u64));
    let sequencer = Sequencer::new(db, gateway, config.pacing()).with_reporter(ui);

    let campaign = if resume {
        sequencer.resume(campaign_id).await?
    } else {
        sequencer.run(campaign_id).await?
    };

    if campaign.status == CampaignStatus::Failed {
        bail!(
            "Campaign {} failed: {}",
            campaign.id,
            campaign.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
