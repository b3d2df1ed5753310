use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::models::*;
use crate::contacts::Contact;
use crate::errors::StoreError;

/// Async-safe handle to the dialflow database.
///
/// Wraps `Database` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<Database>>,
}

impl DbHandle {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Database) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Used in contexts where
    /// blocking is acceptable: CLI commands and tests. Callers must ensure
    /// this is NOT called from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, Database>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS prompts (
                    id TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    prompt TEXT NOT NULL DEFAULT '',
                    description TEXT,
                    tags TEXT NOT NULL DEFAULT '[]',
                    is_default INTEGER NOT NULL DEFAULT 0,
                    version INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS campaigns (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    tenant_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    prompt_id TEXT NOT NULL,
                    prompt_title TEXT NOT NULL DEFAULT '',
                    prompt_body TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'pending',
                    cursor INTEGER NOT NULL DEFAULT 0,
                    total_contacts INTEGER NOT NULL DEFAULT 0,
                    failure_policy TEXT NOT NULL DEFAULT 'halt',
                    error TEXT,
                    started_at TEXT,
                    completed_at TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS campaign_contacts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    campaign_id INTEGER NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                    position INTEGER NOT NULL,
                    first_name TEXT NOT NULL,
                    full_name TEXT NOT NULL,
                    phone TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    message TEXT,
                    attempted_at TEXT,
                    UNIQUE(campaign_id, position)
                );

                CREATE TABLE IF NOT EXISTS tenants (
                    id TEXT PRIMARY KEY,
                    subscription_status TEXT NOT NULL DEFAULT 'none',
                    plan_type TEXT,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_prompts_tenant ON prompts(tenant_id);
                CREATE INDEX IF NOT EXISTS idx_campaigns_tenant ON campaigns(tenant_id);
                CREATE INDEX IF NOT EXISTS idx_contacts_campaign
                    ON campaign_contacts(campaign_id, position);
                ",
            )
            .context("Failed to create tables")?;

        // Additive migration: older deployments stored the prompt body under
        // `content`. The column is kept so those rows stay readable; reads
        // fall back to it when `prompt` is empty.
        // We only ignore "duplicate column" errors — any other error is propagated.
        match self
            .conn
            .execute("ALTER TABLE prompts ADD COLUMN content TEXT", [])
        {
            Ok(_) => {}
            Err(e) if e.to_string().contains("duplicate column") => {}
            Err(e) => return Err(anyhow::anyhow!("Failed to add content column: {}", e)),
        }

        Ok(())
    }

    // ── Prompt CRUD ───────────────────────────────────────────────────

    /// Effective-body expression: prefer `prompt`, fall back to legacy `content`.
    const PROMPT_COLUMNS: &'static str = "id, tenant_id, title, \
         CASE WHEN prompt IS NULL OR prompt = '' THEN COALESCE(content, '') ELSE prompt END, \
         description, tags, is_default, version, created_at, updated_at";

    pub fn create_prompt(
        &self,
        tenant_id: &str,
        title: &str,
        body: &str,
        description: Option<&str>,
        is_default: bool,
    ) -> Result<Prompt> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO prompts (id, tenant_id, title, prompt, description, is_default)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, tenant_id, title, body, description, is_default as i64],
            )
            .context("Failed to insert prompt")?;
        self.get_prompt(tenant_id, &id)?
            .context("Prompt not found after insert")
    }

    pub fn list_prompts(&self, tenant_id: &str) -> Result<Vec<Prompt>> {
        let sql = format!(
            "SELECT {} FROM prompts WHERE tenant_id = ?1 ORDER BY rowid",
            Self::PROMPT_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_prompts")?;
        let rows = stmt
            .query_map(params![tenant_id], prompt_row)
            .context("Failed to query prompts")?;
        let mut prompts = Vec::new();
        for row in rows {
            let raw = row.context("Failed to read prompt row")?;
            prompts.push(raw.into_prompt()?);
        }
        Ok(prompts)
    }

    pub fn get_prompt(&self, tenant_id: &str, id: &str) -> Result<Option<Prompt>> {
        let sql = format!(
            "SELECT {} FROM prompts WHERE tenant_id = ?1 AND id = ?2",
            Self::PROMPT_COLUMNS
        );
        let raw = self
            .conn
            .query_row(&sql, params![tenant_id, id], prompt_row)
            .optional()
            .context("Failed to query prompt")?;
        raw.map(|r| r.into_prompt()).transpose()
    }

    pub fn get_default_prompt(&self, tenant_id: &str) -> Result<Option<Prompt>> {
        let sql = format!(
            "SELECT {} FROM prompts WHERE tenant_id = ?1 AND is_default = 1 LIMIT 1",
            Self::PROMPT_COLUMNS
        );
        let raw = self
            .conn
            .query_row(&sql, params![tenant_id], prompt_row)
            .optional()
            .context("Failed to query default prompt")?;
        raw.map(|r| r.into_prompt()).transpose()
    }

    /// Full-record overwrite of title and body. Last write wins unless the
    /// caller supplies `expected_version`, in which case a stale version is
    /// rejected with `StoreError::PromptVersionConflict`.
    pub fn update_prompt(
        &self,
        tenant_id: &str,
        id: &str,
        title: &str,
        body: &str,
        expected_version: Option<i64>,
    ) -> Result<Prompt> {
        let current = self
            .get_prompt(tenant_id, id)?
            .ok_or_else(|| StoreError::PromptNotFound { id: id.to_string() })?;

        if let Some(expected) = expected_version
            && expected != current.version
        {
            return Err(StoreError::PromptVersionConflict {
                id: id.to_string(),
                expected,
                actual: current.version,
            }
            .into());
        }

        self.conn
            .execute(
                "UPDATE prompts
                 SET title = ?1, prompt = ?2, version = version + 1,
                     updated_at = datetime('now')
                 WHERE tenant_id = ?3 AND id = ?4",
                params![title, body, tenant_id, id],
            )
            .context("Failed to update prompt")?;
        self.get_prompt(tenant_id, id)?
            .context("Prompt not found after update")
    }

    /// Mark one prompt as the tenant default, clearing any previous default.
    pub fn set_default_prompt(&self, tenant_id: &str, id: &str) -> Result<Prompt> {
        if self.get_prompt(tenant_id, id)?.is_none() {
            return Err(StoreError::PromptNotFound { id: id.to_string() }.into());
        }
        self.conn
            .execute(
                "UPDATE prompts SET is_default = (id = ?1) WHERE tenant_id = ?2",
                params![id, tenant_id],
            )
            .context("Failed to set default prompt")?;
        self.get_prompt(tenant_id, id)?
            .context("Prompt not found after set_default")
    }

    pub fn delete_prompt(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM prompts WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, id],
            )
            .context("Failed to delete prompt")?;
        Ok(affected > 0)
    }

    // ── Campaign CRUD ─────────────────────────────────────────────────

    /// Insert a campaign and its contact list atomically.
    pub fn create_campaign(
        &self,
        tenant_id: &str,
        name: &str,
        selection: &PromptSelection,
        policy: FailurePolicy,
        contacts: &[Contact],
    ) -> Result<Campaign> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO campaigns
                 (tenant_id, name, prompt_id, prompt_title, prompt_body,
                  total_contacts, failure_policy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tenant_id,
                name,
                selection.id,
                selection.title,
                selection.prompt,
                contacts.len() as i64,
                policy.as_str()
            ],
        )
        .context("Failed to insert campaign")?;
        let id = tx.last_insert_rowid();

        for (position, contact) in contacts.iter().enumerate() {
            tx.execute(
                "INSERT INTO campaign_contacts
                     (campaign_id, position, first_name, full_name, phone)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    position as i64,
                    contact.first_name,
                    contact.full_name,
                    contact.phone
                ],
            )
            .context("Failed to insert campaign contact")?;
        }
        tx.commit().context("Failed to commit campaign insert")?;

        self.get_campaign(id)?
            .context("Campaign not found after insert")
    }

    pub fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, tenant_id, name, prompt_id, prompt_title, prompt_body,
                        status, cursor, total_contacts, failure_policy, error,
                        started_at, completed_at, created_at
                 FROM campaigns WHERE id = ?1",
                params![id],
                campaign_row,
            )
            .optional()
            .context("Failed to query campaign")?;
        raw.map(|r| r.into_campaign()).transpose()
    }

    pub fn list_campaigns(&self, tenant_id: &str) -> Result<Vec<Campaign>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, tenant_id, name, prompt_id, prompt_title, prompt_body,
                        status, cursor, total_contacts, failure_policy, error,
                        started_at, completed_at, created_at
                 FROM campaigns WHERE tenant_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_campaigns")?;
        let rows = stmt
            .query_map(params![tenant_id], campaign_row)
            .context("Failed to query campaigns")?;
        let mut campaigns = Vec::new();
        for row in rows {
            let raw = row.context("Failed to read campaign row")?;
            campaigns.push(raw.into_campaign()?);
        }
        Ok(campaigns)
    }

    pub fn campaign_contacts(&self, campaign_id: i64) -> Result<Vec<ContactRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, campaign_id, position, first_name, full_name, phone,
                        status, message, attempted_at
                 FROM campaign_contacts WHERE campaign_id = ?1 ORDER BY position",
            )
            .context("Failed to prepare campaign_contacts")?;
        let rows = stmt
            .query_map(params![campaign_id], contact_row)
            .context("Failed to query campaign contacts")?;
        let mut contacts = Vec::new();
        for row in rows {
            let raw = row.context("Failed to read contact row")?;
            contacts.push(raw.into_record()?);
        }
        Ok(contacts)
    }

    /// Transition a campaign's status. `Running` stamps `started_at` on first
    /// entry; terminal statuses stamp `completed_at`.
    pub fn set_campaign_status(
        &self,
        id: i64,
        status: CampaignStatus,
        error: Option<&str>,
    ) -> Result<Campaign> {
        match status {
            CampaignStatus::Running => {
                self.conn
                    .execute(
                        "UPDATE campaigns
                         SET status = ?1,
                             started_at = COALESCE(started_at, datetime('now')),
                             error = NULL
                         WHERE id = ?2",
                        params![status.as_str(), id],
                    )
                    .context("Failed to mark campaign running")?;
            }
            s if s.is_terminal() => {
                self.conn
                    .execute(
                        "UPDATE campaigns
                         SET status = ?1, error = ?2, completed_at = datetime('now')
                         WHERE id = ?3",
                        params![status.as_str(), error, id],
                    )
                    .context("Failed to finalize campaign")?;
            }
            _ => {
                self.conn
                    .execute(
                        "UPDATE campaigns SET status = ?1, error = ?2 WHERE id = ?3",
                        params![status.as_str(), error, id],
                    )
                    .context("Failed to update campaign status")?;
            }
        }
        self.get_campaign(id)?
            .ok_or_else(|| StoreError::CampaignNotFound { id }.into())
    }

    /// Persist the index of the next contact to attempt. Written before every
    /// gateway invocation so an interrupted run can resume.
    pub fn advance_cursor(&self, id: i64, cursor: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE campaigns SET cursor = ?1 WHERE id = ?2",
                params![cursor, id],
            )
            .context("Failed to advance campaign cursor")?;
        Ok(())
    }

    pub fn mark_contact_attempted(&self, contact_id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE campaign_contacts SET attempted_at = datetime('now') WHERE id = ?1",
                params![contact_id],
            )
            .context("Failed to mark contact attempted")?;
        Ok(())
    }

    pub fn record_contact_outcome(
        &self,
        contact_id: i64,
        status: ContactStatus,
        message: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE campaign_contacts SET status = ?1, message = ?2 WHERE id = ?3",
                params![status.as_str(), message, contact_id],
            )
            .context("Failed to record contact outcome")?;
        Ok(())
    }

    /// Flip a live campaign to `canceled`. The sequencer observes the flip at
    /// its next loop head. Finished campaigns are left untouched.
    pub fn cancel_campaign(&self, id: i64) -> Result<Campaign> {
        let campaign = self
            .get_campaign(id)?
            .ok_or_else(|| StoreError::CampaignNotFound { id })?;
        if campaign.status.is_terminal() {
            return Ok(campaign);
        }
        self.set_campaign_status(id, CampaignStatus::Canceled, None)
    }

    // ── Tenant records ────────────────────────────────────────────────

    pub fn upsert_tenant(
        &self,
        id: &str,
        status: SubscriptionStatus,
        plan_type: Option<&str>,
    ) -> Result<Tenant> {
        self.conn
            .execute(
                "INSERT INTO tenants (id, subscription_status, plan_type, updated_at)
                 VALUES (?1, ?2, ?3, datetime('now'))
                 ON CONFLICT(id) DO UPDATE SET
                     subscription_status = excluded.subscription_status,
                     plan_type = excluded.plan_type,
                     updated_at = datetime('now')",
                params![id, status.as_str(), plan_type],
            )
            .context("Failed to upsert tenant")?;
        self.get_tenant(id)?.context("Tenant not found after upsert")
    }

    pub fn get_tenant(&self, id: &str) -> Result<Option<Tenant>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, subscription_status, plan_type, updated_at
                 FROM tenants WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query tenant")?;
        raw.map(|(id, status, plan_type, updated_at)| {
            Ok(Tenant {
                id,
                subscription_status: SubscriptionStatus::from_str(&status)
                    .map_err(|e| anyhow::anyhow!(e))?,
                plan_type,
                updated_at,
            })
        })
        .transpose()
    }
}

// ── Row mapping ───────────────────────────────────────────────────────

struct PromptRow {
    id: String,
    tenant_id: String,
    title: String,
    prompt: String,
    description: Option<String>,
    tags: String,
    is_default: i64,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl PromptRow {
    fn into_prompt(self) -> Result<Prompt> {
        let tags: Vec<String> =
            serde_json::from_str(&self.tags).context("Invalid tags JSON in prompt row")?;
        Ok(Prompt {
            id: self.id,
            tenant_id: self.tenant_id,
            title: self.title,
            prompt: self.prompt,
            description: self.description,
            tags,
            is_default: self.is_default != 0,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn prompt_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PromptRow> {
    Ok(PromptRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        title: row.get(2)?,
        prompt: row.get(3)?,
        description: row.get(4)?,
        tags: row.get(5)?,
        is_default: row.get(6)?,
        version: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

struct CampaignRow {
    id: i64,
    tenant_id: String,
    name: String,
    prompt_id: String,
    prompt_title: String,
    prompt_body: String,
    status: String,
    cursor: i64,
    total_contacts: i64,
    failure_policy: String,
    error: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
}

impl CampaignRow {
    fn into_campaign(self) -> Result<Campaign> {
        Ok(Campaign {
            id: self.id,
            tenant_id: self.tenant_id,
            name: self.name,
            prompt_id: self.prompt_id,
            prompt_title: self.prompt_title,
            prompt_body: self.prompt_body,
            status: CampaignStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?,
            cursor: self.cursor,
            total_contacts: self.total_contacts,
            failure_policy: FailurePolicy::from_str(&self.failure_policy)
                .map_err(|e| anyhow::anyhow!(e))?,
            error: self.error,
            started_at: self.started_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
        })
    }
}

fn campaign_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CampaignRow> {
    Ok(CampaignRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        prompt_id: row.get(3)?,
        prompt_title: row.get(4)?,
        prompt_body: row.get(5)?,
        status: row.get(6)?,
        cursor: row.get(7)?,
        total_contacts: row.get(8)?,
        failure_policy: row.get(9)?,
        error: row.get(10)?,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
        created_at: row.get(13)?,
    })
}

struct ContactRow {
    id: i64,
    campaign_id: i64,
    position: i64,
    first_name: String,
    full_name: String,
    phone: String,
    status: String,
    message: Option<String>,
    attempted_at: Option<String>,
}

impl ContactRow {
    fn into_record(self) -> Result<ContactRecord> {
        Ok(ContactRecord {
            id: self.id,
            campaign_id: self.campaign_id,
            position: self.position,
            first_name: self.first_name,
            full_name: self.full_name,
            phone: self.phone,
            status: ContactStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?,
            message: self.message,
            attempted_at: self.attempted_at,
        })
    }
}

fn contact_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContactRow> {
    Ok(ContactRow {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        position: row.get(2)?,
        first_name: row.get(3)?,
        full_name: row.get(4)?,
        phone: row.get(5)?,
        status: row.get(6)?,
        message: row.get(7)?,
        attempted_at: row.get(8)?,
    })
}
