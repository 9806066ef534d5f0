use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity Provider Records (observed, never owned) ---

/// UserIdentity
///
/// The minimal slice of the provider's user record the access policy reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserIdentity {
    pub id: Uuid,
    // Compared case-insensitively by the verification gate, exactly by the admin guard.
    pub email: String,
}

/// Session
///
/// Proof of authentication carried in the provider's session cookie. The tokens never
/// leave the server: the struct is not part of any API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    // Unix seconds.
    pub expires_at: i64,
    pub user: UserIdentity,
}

// --- Application Records ---

/// VerificationStatus
///
/// Approval state of a student profile. A NULL column or anything that is not one of the
/// known values reads as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum VerificationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn from_db(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return VerificationStatus::Pending;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" => VerificationStatus::Approved,
            "rejected" => VerificationStatus::Rejected,
            _ => VerificationStatus::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn is_approved(self) -> bool {
        self == VerificationStatus::Approved
    }
}

/// Profile
///
/// Row of `public.profiles` keyed by the provider user id. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub verification_status: VerificationStatus,
}

// --- API Responses ---

/// AuthSnapshot
///
/// What a browser client needs to run the verification gate on its own navigations.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthSnapshot {
    pub user: Option<UserIdentity>,
    pub profile: Option<Profile>,
    pub is_super_admin: bool,
}

/// GateOutcomeKind
///
/// Wire form of a verification gate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum GateOutcomeKind {
    Loading,
    Render,
    Redirect,
}

/// GateDecision
///
/// Response of `GET /api/gate`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GateDecision {
    pub path: String,
    pub outcome: GateOutcomeKind,
    pub redirect_to: Option<String>,
}
