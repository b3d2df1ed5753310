//! Configuration view and initialization — `dialflow config`.

use anyhow::{Context, Result};
use console::style;

use dialflow::config::Config;

use crate::ConfigCommands;

pub fn cmd_config(config: &Config, command: Option<ConfigCommands>) -> Result<()> {
    match command.unwrap_or(ConfigCommands::Show) {
        ConfigCommands::Show => {
            println!("{}", style("dialflow configuration").bold());
            println!("  data dir: {}", config.data_dir.display());
            println!("  database: {}", config.db_path.display());
            println!();
            let rendered = toml::to_string_pretty(&config.settings)
                .context("Failed to render settings")?;
            print!("{}", rendered);
        }
        ConfigCommands::Init => {
            let path = config.write_settings_file()?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
