use serde::{Deserialize, Serialize};

/// Lifecycle status of a prescription. New records always start at
/// `Pending`; the caller never chooses the initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "prescription_status", rename_all = "lowercase")]
pub enum PrescriptionStatus {
    Pending,
    Approved,
    Dispensed,
    Delivered,
    Completed,
    Cancelled,
}

impl PrescriptionStatus {
    /// Terminal records reject all further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, PrescriptionStatus::Completed | PrescriptionStatus::Cancelled)
    }

    /// The workflow is a straight line pending → approved → dispensed →
    /// delivered → completed, with cancellation reachable from any
    /// non-terminal state. Everything else is rejected.
    pub fn can_transition_to(self, to: PrescriptionStatus) -> bool {
        use PrescriptionStatus::*;
        match (self, to) {
            (Pending, Approved)
            | (Approved, Dispensed)
            | (Dispensed, Delivered)
            | (Delivered, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrescriptionStatus::Pending => "pending",
            PrescriptionStatus::Approved => "approved",
            PrescriptionStatus::Dispensed => "dispensed",
            PrescriptionStatus::Delivered => "delivered",
            PrescriptionStatus::Completed => "completed",
            PrescriptionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
