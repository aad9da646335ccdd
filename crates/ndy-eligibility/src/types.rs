use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// System-of-record value the app writes for tenants it is authoritative for.
pub const NDYRA_SYSTEM_OF_RECORD: &str = "ndyra";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Tenant (gym / business account) identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

/// User identity (member or staff).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

/// Scheduled class session identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassSessionId(pub Uuid);

macro_rules! uuid_display {
    ($($t:ty),*) => {
        $(
            impl fmt::Display for $t {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(f)
                }
            }
        )*
    };
}

uuid_display!(TenantId, UserId, ClassSessionId);

/// One member at one tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

// ---------------------------------------------------------------------------
// Tenant guardrails
// ---------------------------------------------------------------------------

/// Which admission operation is being gated. Selects the kill switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOperation {
    Checkin,
    Booking,
}

impl GateOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateOperation::Checkin => "checkin",
            GateOperation::Booking => "booking",
        }
    }
}

/// Tenant-level authority and kill-switch flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantGuardrails {
    pub system_of_record: String,
    #[serde(default)]
    pub kill_switch_disable_checkin: bool,
    #[serde(default)]
    pub kill_switch_disable_booking: bool,
}

impl TenantGuardrails {
    /// Guardrails for a tenant this app is authoritative for, no kill switches.
    pub fn authoritative() -> Self {
        Self {
            system_of_record: NDYRA_SYSTEM_OF_RECORD.to_string(),
            kill_switch_disable_checkin: false,
            kill_switch_disable_booking: false,
        }
    }

    /// Exact comparison against the marker; no case folding, no trimming.
    pub fn is_authoritative(&self, marker: &str) -> bool {
        self.system_of_record == marker
    }

    pub fn kill_switch_for(&self, op: GateOperation) -> bool {
        match op {
            GateOperation::Checkin => self.kill_switch_disable_checkin,
            GateOperation::Booking => self.kill_switch_disable_booking,
        }
    }
}

// ---------------------------------------------------------------------------
// Member facts
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiverFact {
    pub signed: bool,
}

impl WaiverFact {
    pub fn signed() -> Self {
        Self { signed: true }
    }

    pub fn unsigned() -> Self {
        Self { signed: false }
    }
}

/// Membership status as mirrored from billing. Unknown strings are preserved.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MembershipStatus {
    Active,
    Comp,
    Trialing,
    PastDue,
    Unpaid,
    Canceled,
    None,
    Other(String),
}

impl MembershipStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "active" => MembershipStatus::Active,
            "comp" => MembershipStatus::Comp,
            "trialing" => MembershipStatus::Trialing,
            "past_due" => MembershipStatus::PastDue,
            "unpaid" => MembershipStatus::Unpaid,
            "canceled" => MembershipStatus::Canceled,
            "none" => MembershipStatus::None,
            other => MembershipStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Comp => "comp",
            MembershipStatus::Trialing => "trialing",
            MembershipStatus::PastDue => "past_due",
            MembershipStatus::Unpaid => "unpaid",
            MembershipStatus::Canceled => "canceled",
            MembershipStatus::None => "none",
            MembershipStatus::Other(s) => s.as_str(),
        }
    }

    /// Fixed allow-set: `active` and `comp`. Everything else is ineligible.
    pub fn is_eligible(&self) -> bool {
        matches!(self, MembershipStatus::Active | MembershipStatus::Comp)
    }

    /// Billing problem the member can fix themselves.
    pub fn needs_payment_update(&self) -> bool {
        matches!(self, MembershipStatus::PastDue | MembershipStatus::Unpaid)
    }
}

impl From<String> for MembershipStatus {
    fn from(s: String) -> Self {
        MembershipStatus::parse(&s)
    }
}

impl From<MembershipStatus> for String {
    fn from(s: MembershipStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipFact {
    pub status: MembershipStatus,
}

impl MembershipFact {
    pub fn new(status: MembershipStatus) -> Self {
        Self { status }
    }
}

/// Staff-issued exception. Additional evidence, never a waiver bypass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideFact {
    pub active: bool,
    pub created_by: UserId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Session visibility; tokens may only book public sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionVisibility {
    Public,
    MembersOnly,
}

impl SessionVisibility {
    /// Anything other than `public` (including a missing value) is members-only.
    /// A missing value is stricter than the legacy booking page, which showed
    /// it as public.
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            Some("public") => SessionVisibility::Public,
            _ => SessionVisibility::MembersOnly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionVisibility::Public => "public",
            SessionVisibility::MembersOnly => "members_only",
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation input / output
// ---------------------------------------------------------------------------

/// Evaluator policy (the only configurable part of the rule).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EligibilityPolicy {
    /// Value of `system_of_record` that marks this app as authoritative.
    pub authoritative_marker: String,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            authoritative_marker: NDYRA_SYSTEM_OF_RECORD.to_string(),
        }
    }
}

/// Fully normalised inputs for one evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EligibilityInput {
    pub operation: GateOperation,
    pub guardrails: TenantGuardrails,
    pub waiver: WaiverFact,
    /// `None` means "no membership record".
    pub membership: Option<MembershipFact>,
    pub token_balance: u64,
    pub required_tokens: u32,
    pub override_fact: Option<OverrideFact>,
}

/// Why a result came out the way it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    ClearedByMembership,
    ClearedByTokens,
    ClearedByOverride,

    TenantNotAuthoritative,
    DisabledByTenant,
    WaiverRequired,
    NoEligiblePath,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::ClearedByMembership => "cleared_by_membership",
            ReasonCode::ClearedByTokens => "cleared_by_tokens",
            ReasonCode::ClearedByOverride => "cleared_by_override",
            ReasonCode::TenantNotAuthoritative => "tenant_not_authoritative",
            ReasonCode::DisabledByTenant => "disabled_by_tenant",
            ReasonCode::WaiverRequired => "waiver_required",
            ReasonCode::NoEligiblePath => "no_eligible_path",
        }
    }

    pub fn is_cleared(&self) -> bool {
        matches!(
            self,
            ReasonCode::ClearedByMembership
                | ReasonCode::ClearedByTokens
                | ReasonCode::ClearedByOverride
        )
    }

    /// Authority / kill-switch exits: no member fact was evaluated.
    pub fn is_short_circuit(&self) -> bool {
        matches!(
            self,
            ReasonCode::TenantNotAuthoritative | ReasonCode::DisabledByTenant
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transparent breakdown so callers can explain *why*, not just yes/no.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub cleared: bool,
    pub reason: ReasonCode,
    pub waiver_signed: bool,
    pub membership_eligible: bool,
    pub tokens_eligible: bool,
    pub override_active: bool,
    pub membership_status: Option<MembershipStatus>,
    pub token_balance: u64,
    pub required_tokens: u32,
}

impl EligibilityResult {
    /// Result for the authority / kill-switch exits: every fact at its safe default.
    pub(crate) fn short_circuit(reason: ReasonCode, required_tokens: u32) -> Self {
        Self {
            cleared: false,
            reason,
            waiver_signed: false,
            membership_eligible: false,
            tokens_eligible: false,
            override_active: false,
            membership_status: None,
            token_balance: 0,
            required_tokens,
        }
    }

    /// One actionable reason for a blocked result; `None` when cleared.
    pub fn denial(&self) -> Option<Denial> {
        if self.cleared {
            return None;
        }
        let d = match self.reason {
            ReasonCode::TenantNotAuthoritative => Denial::TenantNotAuthoritative,
            ReasonCode::DisabledByTenant => Denial::DisabledByTenant,
            ReasonCode::WaiverRequired => Denial::WaiverRequired,
            // Cleared reasons never reach here; NoEligiblePath implies tokens fell short.
            _ => match &self.membership_status {
                None | Some(MembershipStatus::None) => Denial::MembershipRequired,
                Some(s) if s.needs_payment_update() => Denial::UpdatePayment,
                Some(_) => Denial::InsufficientTokens {
                    short_by: u64::from(self.required_tokens).saturating_sub(self.token_balance),
                },
            },
        };
        Some(d)
    }
}

/// A single user-presentable reason for denial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Denial {
    TenantNotAuthoritative,
    DisabledByTenant,
    WaiverRequired,
    UpdatePayment,
    MembershipRequired,
    InsufficientTokens { short_by: u64 },
}

impl Denial {
    pub fn message(&self) -> String {
        match self {
            Denial::TenantNotAuthoritative => {
                "This gym is not managed here yet; check-in and booking are disabled.".to_string()
            }
            Denial::DisabledByTenant => "Temporarily disabled by the gym.".to_string(),
            Denial::WaiverRequired => "Waiver required before admission.".to_string(),
            Denial::UpdatePayment => "Membership payment is past due; update payment.".to_string(),
            Denial::MembershipRequired => "Membership required.".to_string(),
            Denial::InsufficientTokens { short_by } => {
                format!("Not enough tokens ({short_by} more needed).")
            }
        }
    }
}
