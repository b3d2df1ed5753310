use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A reusable call-script template, owned by a single tenant.
///
/// The `prompt` field always carries the effective body: records written by
/// older deployments stored it under a `content` column, and the store folds
/// that legacy value in at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    pub prompt: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_default: bool,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// The `{id, title, prompt}` triple a campaign snapshots at start time.
///
/// A selection may carry an unsaved draft body: the operator can edit the
/// script after picking it, and the campaign dials with the live text, not
/// only the persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSelection {
    pub id: String,
    pub title: String,
    pub prompt: String,
}

impl PromptSelection {
    pub fn from_prompt(prompt: &Prompt) -> Self {
        Self {
            id: prompt.id.clone(),
            title: prompt.title.clone(),
            prompt: prompt.prompt.clone(),
        }
    }

    /// Replace the body with a live draft, keeping id and title.
    pub fn with_draft_body(mut self, body: impl Into<String>) -> Self {
        self.prompt = body.into();
        self
    }
}

impl From<&Prompt> for PromptSelection {
    fn from(p: &Prompt) -> Self {
        Self::from_prompt(p)
    }
}

/// Edit buffer for a loaded prompt. The save action is gated on the buffer
/// actually differing from the last-loaded values.
#[derive(Debug, Clone)]
pub struct PromptBuffer {
    loaded_title: String,
    loaded_body: String,
    pub title: String,
    pub body: String,
}

impl PromptBuffer {
    pub fn new(loaded_title: impl Into<String>, loaded_body: impl Into<String>) -> Self {
        let loaded_title = loaded_title.into();
        let loaded_body = loaded_body.into();
        Self {
            title: loaded_title.clone(),
            body: loaded_body.clone(),
            loaded_title,
            loaded_body,
        }
    }

    /// True when either field differs from the loaded values.
    pub fn is_dirty(&self) -> bool {
        self.title != self.loaded_title || self.body != self.loaded_body
    }

    /// Saving requires a dirty buffer with both fields non-empty.
    pub fn can_save(&self) -> bool {
        self.is_dirty() && !self.title.trim().is_empty() && !self.body.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Terminal states can never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Pending,
    Initiated,
    Failed,
    Skipped,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Initiated => "initiated",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "initiated" => Ok(Self::Initiated),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Invalid contact status: {}", s)),
        }
    }
}

/// What a single contact's call failure means for the rest of the batch.
///
/// `Halt` ends the run at the first failure; `Continue` records the failure
/// and keeps dialing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    Halt,
    Continue,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Continue => "continue",
        }
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::Halt
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "halt" => Ok(Self::Halt),
            "continue" => Ok(Self::Continue),
            _ => Err(format!("Invalid failure policy: {}", s)),
        }
    }
}

/// A durable campaign record. The cursor is written before every gateway
/// invocation so an interrupted run resumes where it left off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub tenant_id: String,
    pub name: String,
    pub prompt_id: String,
    pub prompt_title: String,
    pub prompt_body: String,
    pub status: CampaignStatus,
    pub cursor: i64,
    pub total_contacts: i64,
    pub failure_policy: FailurePolicy,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
}

/// One row of the campaign's contact list, in file order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: i64,
    pub campaign_id: i64,
    pub position: i64,
    pub first_name: String,
    pub full_name: String,
    pub phone: String,
    pub status: ContactStatus,
    pub message: Option<String>,
    pub attempted_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
    None,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Unpaid => "unpaid",
            Self::Incomplete => "incomplete",
            Self::None => "none",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "trialing" => Ok(Self::Trialing),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            "unpaid" => Ok(Self::Unpaid),
            "incomplete" => Ok(Self::Incomplete),
            "none" => Ok(Self::None),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant record, kept in sync by whatever system owns billing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub subscription_status: SubscriptionStatus,
    pub plan_type: Option<String>,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_status_round_trips_through_str() {
        for status in [
            CampaignStatus::Pending,
            CampaignStatus::Running,
            CampaignStatus::Completed,
            CampaignStatus::Failed,
            CampaignStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<CampaignStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!CampaignStatus::Pending.is_terminal());
        assert!(!CampaignStatus::Running.is_terminal());
        assert!(CampaignStatus::Completed.is_terminal());
        assert!(CampaignStatus::Failed.is_terminal());
        assert!(CampaignStatus::Canceled.is_terminal());
    }

    #[test]
    fn failure_policy_defaults_to_halt() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Halt);
        assert_eq!("continue".parse::<FailurePolicy>().unwrap(), FailurePolicy::Continue);
    }

    #[test]
    fn subscription_status_round_trips_through_str() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::None,
        ] {
            assert_eq!(
                status.as_str().parse::<SubscriptionStatus>().unwrap(),
                status
            );
        }
    }

    #[test]
    fn untouched_buffer_is_clean_and_cannot_save() {
        let buf = PromptBuffer::new("Cold open", "Hi, this is...");
        assert!(!buf.is_dirty());
        assert!(!buf.can_save());
    }

    #[test]
    fn changing_either_field_enables_save() {
        let mut buf = PromptBuffer::new("Cold open", "Hi, this is...");
        buf.title = "Warm open".to_string();
        assert!(buf.is_dirty());
        assert!(buf.can_save());

        let mut buf = PromptBuffer::new("Cold open", "Hi, this is...");
        buf.body = "Hello there".to_string();
        assert!(buf.is_dirty());
        assert!(buf.can_save());
    }

    #[test]
    fn reverting_an_edit_disables_save_again() {
        let mut buf = PromptBuffer::new("Cold open", "Hi, this is...");
        buf.body = "edited".to_string();
        assert!(buf.can_save());
        buf.body = "Hi, this is...".to_string();
        assert!(!buf.is_dirty());
        assert!(!buf.can_save());
    }

    #[test]
    fn dirty_buffer_with_empty_field_cannot_save() {
        let mut buf = PromptBuffer::new("Cold open", "Hi, this is...");
        buf.title = "  ".to_string();
        assert!(buf.is_dirty());
        assert!(!buf.can_save());
    }

    #[test]
    fn selection_is_stable_across_repeated_builds() {
        let prompt = Prompt {
            id: "p1".into(),
            tenant_id: "t1".into(),
            title: "Cold open".into(),
            prompt: "Hi, this is...".into(),
            description: None,
            tags: vec![],
            is_default: false,
            version: 1,
            created_at: "2025-01-01".into(),
            updated_at: "2025-01-01".into(),
        };
        let first = PromptSelection::from_prompt(&prompt);
        let second = PromptSelection::from_prompt(&prompt);
        assert_eq!(first, second);
    }

    #[test]
    fn draft_body_overrides_persisted_value() {
        let selection = PromptSelection {
            id: "p1".into(),
            title: "Cold open".into(),
            prompt: "saved".into(),
        }
        .with_draft_body("unsaved edit");
        assert_eq!(selection.prompt, "unsaved edit");
        assert_eq!(selection.id, "p1");
    }
}
