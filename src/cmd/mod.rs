//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled                |
//! |-------------|---------------------------------|
//! | `run`       | `Run`, `Resume`, `Cancel`       |
//! | `campaigns` | `Campaigns`                     |
//! | `prompts`   | `Prompts`                       |
//! | `tenant`    | `Tenant`                        |
//! | `serve`     | `Serve`                         |
//! | `config`    | `Config`                        |

pub mod campaigns;
pub mod config;
pub mod prompts;
pub mod run;
pub mod serve;
pub mod tenant;

pub use campaigns::{cmd_campaigns_list, cmd_campaigns_show};
pub use config::cmd_config;
pub use prompts::cmd_prompts;
pub use run::{cmd_cancel, cmd_resume, cmd_run};
pub use serve::cmd_serve;
pub use tenant::cmd_tenant;

use anyhow::{Context, Result};
use dialflow::config::Config;
use dialflow::store::{Database, DbHandle};

/// Tenant-scoped commands need an identity to act under.
pub fn require_tenant(tenant: Option<&str>) -> Result<String> {
    tenant
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            anyhow::anyhow!("User not authenticated. Pass --tenant or set DIALFLOW_TENANT.")
        })
}

/// Open (or create) the database under the configured data directory.
pub(crate) fn open_db(config: &Config) -> Result<DbHandle> {
    config.ensure_directories()?;
    let db = Database::open(&config.db_path).context("Failed to open dialflow database")?;
    Ok(DbHandle::new(db))
}
