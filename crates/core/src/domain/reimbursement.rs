use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::{User, UserId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReimbursementId(pub String);

impl ReimbursementId {
    /// `RMB-<YYYYMM>-<rand>`.
    pub fn generate<R: Rng + ?Sized>(day: NaiveDate, rng: &mut R) -> Self {
        Self(format!("RMB-{}-{:04}", day.format("%Y%m"), rng.gen_range(0..10_000)))
    }
}

impl std::fmt::Display for ReimbursementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReimbursementCategory {
    Meals,
    Transport,
    Accommodation,
    Other,
}

impl ReimbursementCategory {
    pub const ALL: [Self; 4] = [Self::Meals, Self::Transport, Self::Accommodation, Self::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meals => "MEALS",
            Self::Transport => "TRANSPORT",
            Self::Accommodation => "ACCOMMODATION",
            Self::Other => "OTHER",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == raw)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Meals => "餐饮",
            Self::Transport => "交通",
            Self::Accommodation => "住宿",
            Self::Other => "其他",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReimbursementStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReimbursementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Submission payload for a new expense claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReimbursementClaim {
    pub amount: Decimal,
    pub category: ReimbursementCategory,
    pub description: String,
    pub date: NaiveDate,
    pub attachments: Vec<String>,
}

/// Admin decision on a pending claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Approve,
    Reject { reason: String },
}

impl Resolution {
    /// Builds a resolution from a requested target status; PENDING is never a valid target
    /// and REJECTED requires a non-blank reason.
    pub fn from_target(
        status: ReimbursementStatus,
        reason: Option<String>,
    ) -> Result<Self, DomainError> {
        match status {
            ReimbursementStatus::Approved => Ok(Self::Approve),
            ReimbursementStatus::Rejected => {
                let reason = reason.map(|value| value.trim().to_owned()).unwrap_or_default();
                if reason.is_empty() {
                    return Err(DomainError::Validation(
                        "a rejection reason is required".to_owned(),
                    ));
                }
                Ok(Self::Reject { reason })
            }
            ReimbursementStatus::Pending => Err(DomainError::Validation(
                "reimbursements can only be resolved to APPROVED or REJECTED".to_owned(),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reimbursement {
    pub id: ReimbursementId,
    pub user_id: UserId,
    pub user_name: String,
    pub amount: Decimal,
    pub category: ReimbursementCategory,
    pub description: String,
    pub date: NaiveDate,
    pub attachments: Vec<String>,
    pub status: ReimbursementStatus,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub version: u32,
}

impl Reimbursement {
    pub fn submit(
        id: ReimbursementId,
        owner: &User,
        claim: ReimbursementClaim,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if claim.amount <= Decimal::ZERO {
            return Err(DomainError::Validation("amount must be positive".to_owned()));
        }
        if claim.description.trim().is_empty() {
            return Err(DomainError::Validation("description is required".to_owned()));
        }

        Ok(Self {
            id,
            user_id: owner.id.clone(),
            user_name: owner.name.clone(),
            amount: claim.amount,
            category: claim.category,
            description: claim.description,
            date: claim.date,
            attachments: claim.attachments,
            status: ReimbursementStatus::Pending,
            created_at: now,
            approved_by: None,
            rejection_reason: None,
            version: 0,
        })
    }

    /// Resolves toward a requested status. A terminal claim reports `AlreadyResolved` before the
    /// target or reason is looked at.
    pub fn resolve_to(
        &mut self,
        status: ReimbursementStatus,
        reason: Option<String>,
        actor: &User,
    ) -> Result<(), DomainError> {
        self.ensure_pending()?;
        self.resolve(Resolution::from_target(status, reason)?, actor)
    }

    /// PENDING -> APPROVED | REJECTED; terminal afterwards.
    pub fn resolve(&mut self, resolution: Resolution, actor: &User) -> Result<(), DomainError> {
        self.ensure_pending()?;

        match resolution {
            Resolution::Approve => {
                self.status = ReimbursementStatus::Approved;
                self.approved_by = Some(actor.name.clone());
            }
            Resolution::Reject { reason } => {
                self.status = ReimbursementStatus::Rejected;
                self.rejection_reason = Some(reason);
            }
        }
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), DomainError> {
        if self.status != ReimbursementStatus::Pending {
            return Err(DomainError::AlreadyResolved { id: self.id.clone(), status: self.status });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{
        Reimbursement, ReimbursementCategory, ReimbursementClaim, ReimbursementId,
        ReimbursementStatus, Resolution,
    };
    use crate::domain::user::User;
    use crate::errors::DomainError;

    fn pending(amount: Decimal) -> Reimbursement {
        let employee = User::new_employee("王员工", "user@corp.com");
        Reimbursement::submit(
            ReimbursementId("RMB-202401-0001".to_owned()),
            &employee,
            ReimbursementClaim {
                amount,
                category: ReimbursementCategory::Meals,
                description: "客户晚餐".to_owned(),
                date: NaiveDate::from_ymd_opt(2024, 1, 12).expect("valid date"),
                attachments: vec!["receipt://1".to_owned()],
            },
            Utc::now(),
        )
        .expect("submit")
    }

    #[test]
    fn rejection_records_reason_only() {
        let admin = User::admin("admin");
        let mut claim = pending(Decimal::new(8850, 2));

        let resolution = Resolution::from_target(
            ReimbursementStatus::Rejected,
            Some("凭证模糊".to_owned()),
        )
        .expect("resolution");
        claim.resolve(resolution, &admin).expect("reject");

        assert_eq!(claim.status, ReimbursementStatus::Rejected);
        assert_eq!(claim.rejection_reason.as_deref(), Some("凭证模糊"));
        assert!(claim.approved_by.is_none());
    }

    #[test]
    fn approval_records_approver_only() {
        let admin = User::admin("admin");
        let mut claim = pending(Decimal::new(120, 0));

        claim.resolve(Resolution::Approve, &admin).expect("approve");

        assert_eq!(claim.status, ReimbursementStatus::Approved);
        assert_eq!(claim.approved_by.as_deref(), Some("系统管理员"));
        assert!(claim.rejection_reason.is_none());
    }

    #[test]
    fn resolved_claims_cannot_transition_again() {
        let admin = User::admin("admin");
        let mut claim = pending(Decimal::new(120, 0));
        claim.resolve(Resolution::Approve, &admin).expect("approve");

        let error = claim
            .resolve(Resolution::Reject { reason: "重复".to_owned() }, &admin)
            .expect_err("already approved");

        assert!(matches!(
            error,
            DomainError::AlreadyResolved { status: ReimbursementStatus::Approved, .. }
        ));
        assert!(claim.rejection_reason.is_none());
    }

    #[test]
    fn rejection_requires_reason_and_pending_is_not_a_target() {
        assert!(matches!(
            Resolution::from_target(ReimbursementStatus::Rejected, Some("  ".to_owned())),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            Resolution::from_target(ReimbursementStatus::Pending, None),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let employee = User::new_employee("王员工", "user@corp.com");
        let error = Reimbursement::submit(
            ReimbursementId("RMB-1".to_owned()),
            &employee,
            ReimbursementClaim {
                amount: Decimal::ZERO,
                category: ReimbursementCategory::Other,
                description: "打车".to_owned(),
                date: NaiveDate::from_ymd_opt(2024, 1, 12).expect("valid date"),
                attachments: Vec::new(),
            },
            Utc::now(),
        )
        .expect_err("zero amount");

        assert!(matches!(error, DomainError::Validation(_)));
    }

    #[test]
    fn terminal_claims_report_already_resolved_before_the_target_is_checked() {
        let admin = User::admin("admin");
        let mut claim = pending(Decimal::new(120, 0));
        claim.resolve_to(ReimbursementStatus::Approved, None, &admin).expect("approve");

        for (target, reason) in [
            (ReimbursementStatus::Rejected, None),
            (ReimbursementStatus::Pending, None),
            (ReimbursementStatus::Approved, None),
        ] {
            let error = claim.resolve_to(target, reason, &admin).expect_err("terminal");
            assert!(matches!(
                error,
                DomainError::AlreadyResolved { status: ReimbursementStatus::Approved, .. }
            ));
        }

        let mut fresh = pending(Decimal::new(120, 0));
        let missing_reason = fresh
            .resolve_to(ReimbursementStatus::Rejected, Some("  ".to_owned()), &admin)
            .expect_err("reason required");
        assert!(matches!(missing_reason, DomainError::Validation(_)));
        assert_eq!(fresh.status, ReimbursementStatus::Pending);
    }
}
