//! Tenant subscription records — `dialflow tenant`.
//!
//! Billing itself lives with the payment provider; this command stands in
//! for its webhook, recording the subscription state the gate reads.

use std::str::FromStr;

use anyhow::Result;
use console::style;

use dialflow::config::Config;
use dialflow::store::SubscriptionStatus;
use dialflow::tenant::gate;

use super::open_db;
use crate::TenantCommands;

pub fn cmd_tenant(config: &Config, command: TenantCommands) -> Result<()> {
    match command {
        TenantCommands::Set { id, status, plan } => {
            let status =
                SubscriptionStatus::from_str(&status).map_err(|e| anyhow::anyhow!(e))?;
            let db = open_db(config)?;
            let tenant = db
                .lock_sync()?
                .upsert_tenant(&id, status, plan.as_deref())?;
            println!(
                "Tenant {} set to {} ({})",
                style(&tenant.id).bold(),
                tenant.subscription_status,
                tenant.plan_type.as_deref().unwrap_or("no plan")
            );
        }
        TenantCommands::Show { id } => {
            let db = open_db(config)?;
            match db.lock_sync()?.get_tenant(&id)? {
                Some(tenant) => {
                    println!("Tenant {}", style(&tenant.id).bold());
                    println!("  status: {}", tenant.subscription_status);
                    println!(
                        "  plan:   {}",
                        tenant.plan_type.as_deref().unwrap_or("none")
                    );
                    println!(
                        "  access: {}",
                        gate(tenant.subscription_status).reason()
                    );
                }
                None => println!("No record for tenant {} (no subscription)", id),
            }
        }
    }
    Ok(())
}
