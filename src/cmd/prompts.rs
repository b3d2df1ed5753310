//! Prompt library management — `dialflow prompts`.

use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::{Confirm, Editor, Input};

use dialflow::config::Config;
use dialflow::store::PromptBuffer;

use super::open_db;
use crate::PromptsCommands;

pub fn cmd_prompts(config: &Config, tenant: &str, command: PromptsCommands) -> Result<()> {
    match command {
        PromptsCommands::List => cmd_list(config, tenant),
        PromptsCommands::Show { id } => cmd_show(config, tenant, &id),
        PromptsCommands::Create {
            title,
            body,
            file,
            default,
        } => cmd_create(config, tenant, &title, body, file, default),
        PromptsCommands::Edit { id, title, body } => cmd_edit(config, tenant, &id, title, body),
        PromptsCommands::Delete { id, force } => cmd_delete(config, tenant, &id, force),
        PromptsCommands::Default { set } => cmd_default(config, tenant, set),
    }
}

fn cmd_list(config: &Config, tenant: &str) -> Result<()> {
    let db = open_db(config)?;
    let prompts = db.lock_sync()?.list_prompts(tenant)?;

    if prompts.is_empty() {
        println!("No prompts found. Create one with 'dialflow prompts create'.");
        return Ok(());
    }

    for prompt in prompts {
        let marker = if prompt.is_default {
            style("*").yellow().to_string()
        } else {
            " ".to_string()
        };
        let preview: String = prompt.prompt.chars().take(40).collect();
        println!(
            "{} {}  {}  {}",
            marker,
            style(&prompt.id).dim(),
            style(&prompt.title).bold(),
            style(preview).dim()
        );
    }
    Ok(())
}

fn cmd_show(config: &Config, tenant: &str, id: &str) -> Result<()> {
    let db = open_db(config)?;
    let prompt = db
        .lock_sync()?
        .get_prompt(tenant, id)?
        .with_context(|| format!("Prompt {} not found", id))?;

    println!("{} (v{})", style(&prompt.title).bold(), prompt.version);
    if let Some(description) = &prompt.description {
        println!("{}", style(description).dim());
    }
    println!();
    println!("{}", prompt.prompt);
    Ok(())
}

fn cmd_create(
    config: &Config,
    tenant: &str,
    title: &str,
    body: Option<String>,
    file: Option<std::path::PathBuf>,
    default: bool,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("Both title and prompt are required");
    }

    let body = match (body, file) {
        (Some(body), _) => body,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => Editor::new()
            .edit("")
            .context("Failed to open editor")?
            .unwrap_or_default(),
    };
    if body.trim().is_empty() {
        bail!("Both title and prompt are required");
    }

    let db = open_db(config)?;
    let prompt = {
        let guard = db.lock_sync()?;
        let prompt = guard.create_prompt(tenant, title.trim(), &body, None, default)?;
        if default {
            guard.set_default_prompt(tenant, &prompt.id)?
        } else {
            prompt
        }
    };
    println!("Prompt saved: {} ({})", style(&prompt.title).bold(), prompt.id);
    Ok(())
}

fn cmd_edit(
    config: &Config,
    tenant: &str,
    id: &str,
    title: Option<String>,
    body: Option<String>,
) -> Result<()> {
    let db = open_db(config)?;
    let prompt = db
        .lock_sync()?
        .get_prompt(tenant, id)?
        .with_context(|| format!("Prompt {} not found", id))?;

    let mut buffer = PromptBuffer::new(&prompt.title, &prompt.prompt);
    buffer.title = match title {
        Some(title) => title,
        None => Input::<String>::new()
            .with_prompt("Title")
            .with_initial_text(&prompt.title)
            .interact_text()
            .context("Failed to read title")?,
    };
    buffer.body = match body {
        Some(body) => body,
        None => Editor::new()
            .edit(&prompt.prompt)
            .context("Failed to open editor")?
            .unwrap_or_else(|| prompt.prompt.clone()),
    };

    if !buffer.is_dirty() {
        println!("No changes to save.");
        return Ok(());
    }
    if !buffer.can_save() {
        bail!("Both title and prompt are required");
    }

    let updated = db.lock_sync()?.update_prompt(
        tenant,
        id,
        buffer.title.trim(),
        &buffer.body,
        Some(prompt.version),
    )?;
    println!(
        "Prompt saved: {} (v{})",
        style(&updated.title).bold(),
        updated.version
    );
    Ok(())
}

fn cmd_delete(config: &Config, tenant: &str, id: &str, force: bool) -> Result<()> {
    let db = open_db(config)?;
    let prompt = db
        .lock_sync()?
        .get_prompt(tenant, id)?
        .with_context(|| format!("Prompt {} not found", id))?;

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete prompt '{}'?", prompt.title))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    db.lock_sync()?.delete_prompt(tenant, id)?;
    println!("Prompt '{}' deleted", prompt.title);
    Ok(())
}

fn cmd_default(config: &Config, tenant: &str, set: Option<String>) -> Result<()> {
    let db = open_db(config)?;
    match set {
        Some(id) => {
            let prompt = db.lock_sync()?.set_default_prompt(tenant, &id)?;
            println!("Default prompt set to {} ({})", prompt.title, prompt.id);
        }
        None => match db.lock_sync()?.get_default_prompt(tenant)? {
            Some(prompt) => println!("{} ({})", style(&prompt.title).bold(), prompt.id),
            None => println!("No default prompt configured"),
        },
    }
    Ok(())
}
