use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dialflow::config::Config;

mod cmd;

#[derive(Parser)]
#[command(name = "dialflow")]
#[command(version, about = "Outbound-calling campaign sequencer")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Data directory holding the database and dialflow.toml
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Tenant id for tenant-scoped commands
    #[arg(long, global = true, env = "DIALFLOW_TENANT")]
    pub tenant: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a campaign from a contact-list file and start dialing
    Run {
        /// Delimited contact-list file with a header row
        file: PathBuf,

        /// Prompt id to dial with (defaults to the tenant's default prompt)
        #[arg(short, long)]
        prompt: Option<String>,

        /// Campaign name (defaults to the file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Failure policy: halt or continue
        #[arg(long)]
        policy: Option<String>,
    },
    /// Continue an interrupted or failed campaign from its cursor
    Resume {
        campaign_id: i64,
    },
    /// Cancel a pending or running campaign
    Cancel {
        campaign_id: i64,
    },
    /// Inspect campaigns
    Campaigns {
        #[command(subcommand)]
        command: Option<CampaignsCommands>,
    },
    /// Manage call-script prompts
    Prompts {
        #[command(subcommand)]
        command: PromptsCommands,
    },
    /// Manage tenant subscription records
    Tenant {
        #[command(subcommand)]
        command: TenantCommands,
    },
    /// Start the HTTP API server
    Serve {
        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Enable dev mode (permissive CORS for a local frontend)
        #[arg(long)]
        dev: bool,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum CampaignsCommands {
    /// List campaigns for the tenant
    List,
    /// Show one campaign with its per-contact outcomes
    Show { campaign_id: i64 },
}

#[derive(Subcommand, Clone)]
pub enum PromptsCommands {
    /// List all prompts for the tenant
    List,
    /// Show the full body of a prompt
    Show { id: String },
    /// Create a new prompt
    Create {
        /// Prompt title
        #[arg(short, long)]
        title: String,
        /// Prompt body text
        #[arg(short, long)]
        body: Option<String>,
        /// Read the body from a file instead
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Mark as the tenant's default prompt
        #[arg(long)]
        default: bool,
    },
    /// Edit an existing prompt (save is skipped when nothing changed)
    Edit {
        id: String,
        /// New title (interactive prompt when omitted)
        #[arg(long)]
        title: Option<String>,
        /// New body (editor session when omitted)
        #[arg(long)]
        body: Option<String>,
    },
    /// Delete a prompt
    Delete {
        id: String,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Show or set the tenant's default prompt
    Default {
        /// Prompt id to mark as default
        #[arg(long)]
        set: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum TenantCommands {
    /// Record a tenant's subscription status
    Set {
        id: String,
        /// active | trialing | past_due | canceled | unpaid | incomplete | none
        #[arg(long)]
        status: String,
        #[arg(long)]
        plan: Option<String>,
    },
    /// Show a tenant's subscription record
    Show { id: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Write a starter dialflow.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.data_dir.clone())?;

    match &cli.command {
        Commands::Run {
            file,
            prompt,
            name,
            policy,
        } => {
            let tenant = cmd::require_tenant(cli.tenant.as_deref())?;
            cmd::cmd_run(
                &config,
                &tenant,
                file,
                prompt.as_deref(),
                name.as_deref(),
                policy.as_deref(),
            )
            .await?;
        }
        Commands::Resume { campaign_id } => {
            cmd::cmd_resume(&config, *campaign_id).await?;
        }
        Commands::Cancel { campaign_id } => {
            cmd::cmd_cancel(&config, *campaign_id)?;
        }
        Commands::Campaigns { command } => {
            let tenant = cmd::require_tenant(cli.tenant.as_deref())?;
            match command.clone().unwrap_or(CampaignsCommands::List) {
                CampaignsCommands::List => cmd::cmd_campaigns_list(&config, &tenant)?,
                CampaignsCommands::Show { campaign_id } => {
                    cmd::cmd_campaigns_show(&config, &tenant, campaign_id)?
                }
            }
        }
        Commands::Prompts { command } => {
            let tenant = cmd::require_tenant(cli.tenant.as_deref())?;
            cmd::cmd_prompts(&config, &tenant, command.clone())?;
        }
        Commands::Tenant { command } => {
            cmd::cmd_tenant(&config, command.clone())?;
        }
        Commands::Serve { port, host, dev } => {
            cmd::cmd_serve(&config, *port, host.clone(), *dev).await?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(&config, command.clone())?;
        }
    }

    Ok(())
}
