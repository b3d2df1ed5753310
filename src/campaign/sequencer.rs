use std::sync::Arc;
use std::time::Duration;

use crate::errors::SequencerError;
use crate::events::CallEvents;
use crate::gateway::{CallGateway, CallRequest};
use crate::store::{
    Campaign, CampaignStatus, ContactRecord, ContactStatus, DbHandle, FailurePolicy,
};

/// Inter-call pacing.
///
/// `call_spacing` is a hard floor between successive dials. When a
/// completion-event feed is attached, the sequencer additionally waits for
/// the previous call's `call_ended` event, bounded by `completion_timeout`,
/// so pacing is `max(spacing, time-to-event)` and never less than the floor.
#[derive(Debug, Clone, Copy)]
pub struct PacingConfig {
    pub call_spacing: Duration,
    pub completion_timeout: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            call_spacing: Duration::from_secs(30),
            completion_timeout: Duration::from_secs(120),
        }
    }
}

/// Progress sink for a running campaign. The CLI renders progress bars, the
/// server logs structured events, tests usually attach nothing.
pub trait StatusReporter: Send + Sync {
    fn campaign_started(&self, _campaign: &Campaign, _total: usize) {}
    fn calling(&self, _index: usize, _total: usize, _contact: &ContactRecord) {}
    fn call_initiated(&self, _contact: &ContactRecord) {}
    fn call_failed(&self, _contact: &ContactRecord, _message: &str) {}
    fn contact_skipped(&self, _contact: &ContactRecord) {}
    fn campaign_finished(&self, _campaign: &Campaign) {}
}

/// Reporter that swallows everything.
pub struct NullReporter;

impl StatusReporter for NullReporter {}

/// Reporter that emits `tracing` events; used by the HTTP server where no
/// terminal is attached.
pub struct TraceReporter;

impl StatusReporter for TraceReporter {
    fn campaign_started(&self, campaign: &Campaign, total: usize) {
        tracing::info!(campaign = campaign.id, total, "campaign started");
    }

    fn calling(&self, index: usize, total: usize, contact: &ContactRecord) {
        tracing::info!(
            campaign = contact.campaign_id,
            index,
            total,
            prospect = %contact.full_name,
            "placing call"
        );
    }

    fn call_initiated(&self, contact: &ContactRecord) {
        tracing::info!(
            campaign = contact.campaign_id,
            prospect = %contact.full_name,
            "call initiated"
        );
    }

    fn call_failed(&self, contact: &ContactRecord, message: &str) {
        tracing::warn!(
            campaign = contact.campaign_id,
            prospect = %contact.full_name,
            message,
            "call initiation failed"
        );
    }

    fn contact_skipped(&self, contact: &ContactRecord) {
        tracing::info!(
            campaign = contact.campaign_id,
            prospect = %contact.full_name,
            "contact already attempted, skipping"
        );
    }

    fn campaign_finished(&self, campaign: &Campaign) {
        tracing::info!(
            campaign = campaign.id,
            status = %campaign.status,
            "campaign finished"
        );
    }
}

/// Drives one campaign from its persisted cursor to a terminal status.
///
/// Progress is written to storage before every gateway invocation: the
/// cursor first, then the contact's attempt mark. An interrupted run can
/// therefore resume idempotently; contacts already marked attempted are
/// never re-dialed.
pub struct Sequencer {
    db: DbHandle,
    gateway: Arc<dyn CallGateway>,
    pacing: PacingConfig,
    events: Option<Arc<CallEvents>>,
    reporter: Arc<dyn StatusReporter>,
}

impl Sequencer {
    pub fn new(db: DbHandle, gateway: Arc<dyn CallGateway>, pacing: PacingConfig) -> Self {
        Self {
            db,
            gateway,
            pacing,
            events: None,
            reporter: Arc::new(NullReporter),
        }
    }

    /// Attach the completion-event feed (serve mode).
    pub fn with_events(mut self, events: Arc<CallEvents>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run a pending campaign from the start.
    pub async fn run(&self, campaign_id: i64) -> Result<Campaign, SequencerError> {
        self.execute(campaign_id, false).await
    }

    /// Continue an interrupted or failed campaign from its persisted cursor.
    pub async fn resume(&self, campaign_id: i64) -> Result<Campaign, SequencerError> {
        self.execute(campaign_id, true).await
    }

    async fn execute(&self, campaign_id: i64, resume: bool) -> Result<Campaign, SequencerError> {
        let campaign = self
            .db
            .call(move |db| db.get_campaign(campaign_id))
            .await?
            .ok_or(SequencerError::CampaignNotFound { id: campaign_id })?;

        match campaign.status {
            CampaignStatus::Pending => {}
            // A `running` row with nobody driving it is a crashed run;
            // only an explicit resume may take it over.
            CampaignStatus::Running if resume => {}
            CampaignStatus::Running => {
                return Err(SequencerError::AlreadyRunning { id: campaign_id });
            }
            CampaignStatus::Failed if resume => {}
            status => {
                return Err(SequencerError::AlreadyFinished {
                    id: campaign_id,
                    status: status.to_string(),
                });
            }
        }

        if campaign.prompt_id.trim().is_empty() {
            return Err(SequencerError::MissingPrompt { id: campaign_id });
        }

        let contacts = self
            .db
            .call(move |db| db.campaign_contacts(campaign_id))
            .await?;
        if contacts.is_empty() {
            return Err(SequencerError::NoContacts { id: campaign_id });
        }

        let tenant_id = campaign.tenant_id.clone();
        let prompt_id = campaign.prompt_id.clone();
        let policy = campaign.failure_policy;
        let total = contacts.len();
        let start = campaign.cursor.clamp(0, total as i64) as usize;

        let campaign = self
            .db
            .call(move |db| db.set_campaign_status(campaign_id, CampaignStatus::Running, None))
            .await?;
        self.reporter.campaign_started(&campaign, total);

        let mut halted: Option<String> = None;

        for index in start..total {
            // Observe cancellation between contacts.
            let current = self
                .db
                .call(move |db| db.get_campaign(campaign_id))
                .await?
                .ok_or(SequencerError::CampaignNotFound { id: campaign_id })?;
            if current.status == CampaignStatus::Canceled {
                self.reporter.campaign_finished(&current);
                return Ok(current);
            }

            let contact = contacts[index].clone();
            if contact.attempted_at.is_some() {
                self.reporter.contact_skipped(&contact);
                continue;
            }

            // Persist progress before dialing: cursor first, then the
            // attempt mark. A crash after this point leaves a row that
            // resume will skip rather than re-dial.
            let contact_id = contact.id;
            self.db
                .call(move |db| {
                    db.advance_cursor(campaign_id, index as i64)?;
                    db.mark_contact_attempted(contact_id)
                })
                .await?;

            self.reporter.calling(index + 1, total, &contact);

            let request = CallRequest {
                tenant_id: tenant_id.clone(),
                phone_number: contact.phone.clone(),
                prospect_name: contact.full_name.clone(),
                prompt_id: prompt_id.clone(),
            };

            let failure = match self.gateway.start_call(&request).await {
                Ok(acceptance) if acceptance.success => None,
                Ok(acceptance) => Some(
                    acceptance
                        .message
                        .unwrap_or_else(|| "Call service rejected the request".to_string()),
                ),
                Err(e) => Some(e.to_string()),
            };

            match failure {
                None => {
                    self.db
                        .call(move |db| {
                            db.record_contact_outcome(contact_id, ContactStatus::Initiated, None)
                        })
                        .await?;
                    self.reporter.call_initiated(&contact);
                }
                Some(message) => {
                    let recorded = message.clone();
                    self.db
                        .call(move |db| {
                            db.record_contact_outcome(
                                contact_id,
                                ContactStatus::Failed,
                                Some(&recorded),
                            )
                        })
                        .await?;
                    self.reporter.call_failed(&contact, &message);
                    if policy == FailurePolicy::Halt {
                        halted = Some(format!(
                            "Call to {} failed: {}",
                            contact.full_name, message
                        ));
                        break;
                    }
                }
            }

            if index + 1 < total {
                self.pace_after(&contact.phone).await;
            }
        }

        let final_campaign = match halted {
            Some(error) => {
                self.db
                    .call(move |db| {
                        db.set_campaign_status(campaign_id, CampaignStatus::Failed, Some(&error))
                    })
                    .await?
            }
            None => {
                self.db
                    .call(move |db| {
                        db.advance_cursor(campaign_id, total as i64)?;
                        db.set_campaign_status(campaign_id, CampaignStatus::Completed, None)
                    })
                    .await?
            }
        };
        self.reporter.campaign_finished(&final_campaign);
        Ok(final_campaign)
    }

    /// Wait out the inter-call gap. The spacing sleep always runs; when an
    /// event feed is attached we also wait (bounded) for the previous call's
    /// completion event, and proceed at whichever finishes later.
    async fn pace_after(&self, phone: &str) {
        let spacing = tokio::time::sleep(self.pacing.call_spacing);
        match &self.events {
            Some(events) => {
                let completion = events.wait_for(phone, self.pacing.completion_timeout);
                let (_, _) = tokio::join!(spacing, completion);
            }
            None => spacing.await,
        }
    }
}
