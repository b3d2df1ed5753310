//! Tenant session and subscription gating.
//!
//! The session is an explicit per-request value: handlers receive it as an
//! argument instead of reading ambient global state. The gate maps the
//! tenant's subscription status to an access decision for plan-restricted
//! operations (campaign start, prompt mutation).

use serde::Serialize;

use crate::store::{Database, SubscriptionStatus};

/// What a plan-restricted operation is allowed to do for this tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    /// Subscription in good standing.
    Allow,
    /// Billing problem; the tenant must update their payment method.
    UpdatePayment,
    /// Subscription ended; the tenant must reactivate it.
    Reactivate,
    /// No subscription on record; the tenant must pick a plan.
    Upgrade,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Allow => "subscription active",
            Self::UpdatePayment => "subscription payment required",
            Self::Reactivate => "subscription canceled",
            Self::Upgrade => "subscription required",
        }
    }
}

/// Resolved per-request identity plus subscription state.
#[derive(Debug, Clone)]
pub struct TenantSession {
    pub tenant_id: String,
    pub subscription: SubscriptionStatus,
    pub plan_type: Option<String>,
}

impl TenantSession {
    /// Load the session for a tenant id. A tenant with no stored record has
    /// no subscription.
    pub fn load(db: &Database, tenant_id: &str) -> anyhow::Result<Self> {
        let tenant = db.get_tenant(tenant_id)?;
        Ok(match tenant {
            Some(t) => Self {
                tenant_id: t.id,
                subscription: t.subscription_status,
                plan_type: t.plan_type,
            },
            None => Self {
                tenant_id: tenant_id.to_string(),
                subscription: SubscriptionStatus::None,
                plan_type: None,
            },
        })
    }

    pub fn gate(&self) -> AccessDecision {
        gate(self.subscription)
    }
}

/// Map a subscription status to the action the tenant must take.
pub fn gate(status: SubscriptionStatus) -> AccessDecision {
    match status {
        SubscriptionStatus::Active | SubscriptionStatus::Trialing => AccessDecision::Allow,
        SubscriptionStatus::PastDue
        | SubscriptionStatus::Unpaid
        | SubscriptionStatus::Incomplete => AccessDecision::UpdatePayment,
        SubscriptionStatus::Canceled => AccessDecision::Reactivate,
        SubscriptionStatus::None => AccessDecision::Upgrade,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;

    #[test]
    fn active_and_trialing_are_allowed() {
        assert_eq!(gate(SubscriptionStatus::Active), AccessDecision::Allow);
        assert_eq!(gate(SubscriptionStatus::Trialing), AccessDecision::Allow);
        assert!(gate(SubscriptionStatus::Active).is_allowed());
    }

    #[test]
    fn billing_problems_require_payment_update() {
        for status in [
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Incomplete,
        ] {
            assert_eq!(gate(status), AccessDecision::UpdatePayment);
        }
    }

    #[test]
    fn canceled_and_missing_subscriptions_are_blocked() {
        assert_eq!(gate(SubscriptionStatus::Canceled), AccessDecision::Reactivate);
        assert_eq!(gate(SubscriptionStatus::None), AccessDecision::Upgrade);
    }

    #[test]
    fn unknown_tenant_loads_with_no_subscription() {
        let db = Database::open_in_memory().unwrap();
        let session = TenantSession::load(&db, "nobody").unwrap();
        assert_eq!(session.subscription, SubscriptionStatus::None);
        assert_eq!(session.gate(), AccessDecision::Upgrade);
    }

    #[test]
    fn stored_tenant_loads_with_its_subscription() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_tenant("t1", SubscriptionStatus::Active, Some("pro"))
            .unwrap();
        let session = TenantSession::load(&db, "t1").unwrap();
        assert_eq!(session.subscription, SubscriptionStatus::Active);
        assert_eq!(session.plan_type.as_deref(), Some("pro"));
        assert!(session.gate().is_allowed());
    }
}
