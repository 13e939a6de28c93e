//! Data handed to the receipt renderer once a payment has gone through.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    error::FlowError,
    records::{CheckoutService, Money},
};
use uuid::Uuid;

use crate::session::SessionData;

/// A consistent, render-ready receipt: lines sum to `subtotal`, every line
/// names its student, and `total_with_fee = subtotal + service_fee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptDraft {
    pub school_name: String,
    pub lines: Vec<CheckoutService>,
    pub subtotal: Money,
    pub service_fee_bps: u32,
    pub service_fee: Money,
    pub total_with_fee: Money,
    pub reference: String,
    pub schedule_id: String,
    pub issued_at: DateTime<Utc>,
}

impl ReceiptDraft {
    pub fn prepare(
        session: &SessionData,
        fallback_school: &str,
        service_fee_bps: u32,
    ) -> Result<Self, FlowError> {
        Self::prepare_at(session, fallback_school, service_fee_bps, Utc::now())
    }

    pub fn prepare_at(
        session: &SessionData,
        fallback_school: &str,
        service_fee_bps: u32,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, FlowError> {
        if session.checkout_services.is_empty() {
            return Err(FlowError::validation("receipt has no service lines"));
        }
        if let Some(line) = session
            .checkout_services
            .iter()
            .find(|line| line.student_name.trim().is_empty())
        {
            return Err(FlowError::validation(format!(
                "receipt line {} has no student name",
                line.invoice_no
            )));
        }
        let subtotal = session
            .checkout_total()
            .ok_or_else(|| FlowError::validation("receipt total is too large"))?;
        if subtotal != session.payment_amount {
            return Err(FlowError::validation(format!(
                "receipt lines sum to {subtotal} but {} was paid",
                session.payment_amount
            )));
        }

        let service_fee = subtotal.basis_points(service_fee_bps);
        let total_with_fee = subtotal
            .checked_add(service_fee)
            .ok_or_else(|| FlowError::validation("receipt total is too large"))?;
        let school_name = session
            .selected_school
            .clone()
            .unwrap_or_else(|| fallback_school.to_string());

        let token = Uuid::new_v4().as_u128();
        Ok(Self {
            school_name,
            lines: session.checkout_services.clone(),
            subtotal,
            service_fee_bps,
            service_fee,
            total_with_fee,
            reference: format!("{:012}", token % 1_000_000_000_000),
            schedule_id: format!("#{:05}", (token >> 64) % 100_000),
            issued_at,
        })
    }

    /// `Receipt_<reference>_<unix seconds>.<extension>`
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "Receipt_{}_{}.{}",
            self.reference,
            self.issued_at.timestamp(),
            extension.trim_start_matches('.')
        )
    }
}

/// Produces the downloadable artifact for a receipt.
pub trait ReceiptRenderer {
    fn render(&self, draft: &ReceiptDraft) -> Result<Vec<u8>>;

    fn extension(&self) -> &'static str {
        "txt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::domain::ServiceId;

    fn paid_session(amounts: &[u64]) -> SessionData {
        let checkout_services: Vec<CheckoutService> = amounts
            .iter()
            .enumerate()
            .map(|(idx, kwacha)| CheckoutService {
                id: ServiceId::new(format!("svc-{idx}")),
                description: "Grade 3 - Term 1 2025".into(),
                amount: Money::from_kwacha(*kwacha),
                invoice_no: format!("INV-{:04}", idx + 1),
                student_name: "Talitha Kapambwe".into(),
            })
            .collect();
        let payment_amount =
            Money::checked_sum(checkout_services.iter().map(|line| line.amount)).expect("sum");
        SessionData {
            user_phone: "977123456".into(),
            checkout_services,
            payment_amount,
            ..SessionData::default()
        }
    }

    #[test]
    fn adds_service_fee_and_falls_back_to_default_school() {
        let issued_at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let draft = ReceiptDraft::prepare_at(
            &paid_session(&[1500, 1000]),
            "Twalumbu Educational Center",
            200,
            issued_at,
        )
        .expect("draft");

        assert_eq!(draft.school_name, "Twalumbu Educational Center");
        assert_eq!(draft.subtotal, Money::from_kwacha(2500));
        assert_eq!(draft.service_fee, Money::from_kwacha(50));
        assert_eq!(draft.total_with_fee, Money::from_kwacha(2550));
        assert_eq!(draft.reference.len(), 12);
        assert!(draft.schedule_id.starts_with('#'));
        assert_eq!(
            draft.file_name(".txt"),
            format!("Receipt_{}_{}.txt", draft.reference, issued_at.timestamp())
        );
    }

    #[test]
    fn rejects_lines_that_do_not_match_payment() {
        let mut session = paid_session(&[1500]);
        session.payment_amount = Money::from_kwacha(1000);
        let err = ReceiptDraft::prepare(&session, "School", 200).expect_err("mismatch");
        assert!(matches!(err, FlowError::Validation(_)));
    }

    #[test]
    fn rejects_lines_without_student() {
        let mut session = paid_session(&[300]);
        session.checkout_services[0].student_name = " ".into();
        assert!(ReceiptDraft::prepare(&session, "School", 200).is_err());
    }

    #[test]
    fn rejects_empty_receipt() {
        let session = SessionData::default();
        assert!(ReceiptDraft::prepare(&session, "School", 200).is_err());
    }
}
