//! Booking fork: membership path vs token path for one class session.
//!
//! Built on top of an [`EligibilityResult`] for [`GateOperation::Booking`];
//! it never re-derives eligibility, it only decides which booking button a
//! cleared (or blocked) member gets and which single banner explains it.
//!
//! [`GateOperation::Booking`]: crate::GateOperation::Booking

use serde::{Deserialize, Serialize};

use crate::{EligibilityResult, MembershipStatus, ReasonCode, SessionVisibility};

/// Single banner shown above the booking buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingBanner {
    NotAuthoritative,
    DisabledByTenant,
    WaiverRequired,
    MembersOnlySession,
    MembershipRequired,
    UseMembership,
    NotEnoughTokens,
    None,
}

impl BookingBanner {
    pub fn message(&self) -> &'static str {
        match self {
            BookingBanner::NotAuthoritative => "Not authoritative. Booking is disabled.",
            BookingBanner::DisabledByTenant => "Booking disabled by tenant kill switch.",
            BookingBanner::WaiverRequired => "Waiver required before booking.",
            BookingBanner::MembersOnlySession => "Tokens are not allowed for members-only sessions.",
            BookingBanner::MembershipRequired => "Membership required.",
            BookingBanner::UseMembership => "Membership eligible: use membership booking.",
            BookingBanner::NotEnoughTokens => "Not enough tokens.",
            BookingBanner::None => "",
        }
    }
}

/// Which booking paths are open for this member and session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPaths {
    pub membership_path: bool,
    /// Only offered when a membership exists but is not eligible.
    pub token_path: bool,
    pub banner: BookingBanner,
    pub show_update_payment: bool,
    pub show_sign_waiver: bool,
}

/// Derive the booking fork from a booking evaluation.
///
/// `membership_exists` is whether a membership row exists at all (any status).
pub fn booking_paths(
    result: &EligibilityResult,
    membership_exists: bool,
    visibility: &SessionVisibility,
) -> BookingPaths {
    match result.reason {
        ReasonCode::TenantNotAuthoritative => return blocked(BookingBanner::NotAuthoritative),
        ReasonCode::DisabledByTenant => return blocked(BookingBanner::DisabledByTenant),
        _ => {}
    }

    let public = matches!(visibility, SessionVisibility::Public);
    let waiver = result.waiver_signed;

    let membership_path = waiver && membership_exists && result.membership_eligible;
    let token_path = waiver
        && public
        && membership_exists
        && !result.membership_eligible
        && result.tokens_eligible;

    let banner = if !waiver {
        BookingBanner::WaiverRequired
    } else if !public {
        BookingBanner::MembersOnlySession
    } else if !membership_exists {
        BookingBanner::MembershipRequired
    } else if result.membership_eligible {
        BookingBanner::UseMembership
    } else if !result.tokens_eligible {
        BookingBanner::NotEnoughTokens
    } else {
        BookingBanner::None
    };

    BookingPaths {
        membership_path,
        token_path,
        banner,
        show_update_payment: result
            .membership_status
            .as_ref()
            .is_some_and(MembershipStatus::needs_payment_update),
        show_sign_waiver: !waiver,
    }
}

fn blocked(banner: BookingBanner) -> BookingPaths {
    BookingPaths {
        membership_path: false,
        token_path: false,
        banner,
        show_update_payment: false,
        show_sign_waiver: false,
    }
}
