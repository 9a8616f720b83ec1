use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access::{Principal, PrincipalRole};
use super::domain::UserId;

/// Quality classification a reviewer assigns to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    CorrectlyDone,
    NotAskingAllQuestions,
    NotDoingItProperly,
    TakingFromFriendsOrTeammate,
    FakeOrEmptyAudio,
}

impl ApprovalStatus {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::Pending,
            Self::CorrectlyDone,
            Self::NotAskingAllQuestions,
            Self::NotDoingItProperly,
            Self::TakingFromFriendsOrTeammate,
            Self::FakeOrEmptyAudio,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::CorrectlyDone => "CORRECTLY_DONE",
            Self::NotAskingAllQuestions => "NOT_ASKING_ALL_QUESTIONS",
            Self::NotDoingItProperly => "NOT_DOING_IT_PROPERLY",
            Self::TakingFromFriendsOrTeammate => "TAKING_FROM_FRIENDS_OR_TEAMMATE",
            Self::FakeOrEmptyAudio => "FAKE_OR_EMPTY_AUDIO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|status| status.label() == raw.trim())
    }

    pub const fn is_approved(self) -> bool {
        matches!(self, Self::CorrectlyDone)
    }
}

/// Approval fields of a response. `is_approved` is derived from the status on every write and on
/// every load, so it cannot drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredApproval")]
pub struct ApprovalState {
    approval_status: ApprovalStatus,
    is_approved: bool,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredApproval {
    #[serde(default)]
    approval_status: ApprovalStatus,
    #[serde(default)]
    approved_by: Option<UserId>,
    #[serde(default)]
    approved_at: Option<DateTime<Utc>>,
}

impl From<StoredApproval> for ApprovalState {
    fn from(stored: StoredApproval) -> Self {
        Self {
            approval_status: stored.approval_status,
            is_approved: stored.approval_status.is_approved(),
            approved_by: stored.approved_by,
            approved_at: stored.approved_at,
        }
    }
}

impl Default for ApprovalState {
    fn default() -> Self {
        Self::pending()
    }
}

impl ApprovalState {
    pub fn pending() -> Self {
        Self {
            approval_status: ApprovalStatus::Pending,
            is_approved: false,
            approved_by: None,
            approved_at: None,
        }
    }

    pub fn status(&self) -> ApprovalStatus {
        self.approval_status
    }

    pub fn is_approved(&self) -> bool {
        self.is_approved
    }

    pub fn approved_by(&self) -> Option<&UserId> {
        self.approved_by.as_ref()
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    /// Move to `next`.
    ///
    /// Entering CORRECTLY_DONE stamps the time and the reviewer, each only when not already set,
    /// so a public approval is later attributed to the first reviewer who confirms it. Negative
    /// classifications keep the last stamp; resetting to PENDING clears it.
    pub fn transition(&mut self, next: ApprovalStatus, reviewer: Option<&UserId>, now: DateTime<Utc>) {
        match next {
            ApprovalStatus::Pending => {
                self.approved_by = None;
                self.approved_at = None;
            }
            ApprovalStatus::CorrectlyDone => {
                if self.approved_at.is_none() {
                    self.approved_at = Some(now);
                }
                if self.approved_by.is_none() {
                    self.approved_by = reviewer.cloned();
                }
            }
            ApprovalStatus::NotAskingAllQuestions
            | ApprovalStatus::NotDoingItProperly
            | ApprovalStatus::TakingFromFriendsOrTeammate
            | ApprovalStatus::FakeOrEmptyAudio => {}
        }

        self.approval_status = next;
        self.is_approved = next.is_approved();
    }
}

/// Path through which an approval change arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalChannel {
    /// Authenticated reviewer session; only quality engineers may use it.
    Reviewer(Principal),
    /// Unauthenticated field-verification link. Records no reviewer identity.
    Public,
}

impl ApprovalChannel {
    pub fn is_permitted(&self) -> bool {
        match self {
            Self::Reviewer(principal) => principal.role == PrincipalRole::QualityEngineer,
            Self::Public => true,
        }
    }

    pub fn reviewer(&self) -> Option<UserId> {
        match self {
            Self::Reviewer(principal) => Some(UserId(principal.subject.clone())),
            Self::Public => None,
        }
    }
}
