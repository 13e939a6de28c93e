//! Cross-step session data. Only the controller mutates it; the rendering
//! layer reads [`SessionData`] or an owned snapshot of it.

use serde::Serialize;
use shared::{
    domain::StudentId,
    error::FlowError,
    records::{CheckoutService, Money, ReceiptContext, Student},
};

/// Strips everything but ASCII digits, so `0977 123-456` and `0977123456`
/// identify the same guardian.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionData {
    pub selected_school: Option<String>,
    pub user_name: String,
    pub user_phone: String,
    /// Students registered for `user_phone`, captured when details are submitted.
    pub roster: Vec<Student>,
    /// Ordered, duplicate-free.
    pub selected_student_ids: Vec<StudentId>,
    pub checkout_services: Vec<CheckoutService>,
    pub payment_amount: Money,
    pub receipt_context: Option<ReceiptContext>,
}

impl SessionData {
    pub fn has_identified_user(&self) -> bool {
        !self.user_phone.is_empty()
    }

    pub fn student(&self, id: &StudentId) -> Option<&Student> {
        self.roster.iter().find(|student| &student.id == id)
    }

    pub fn selected_students(&self) -> Vec<&Student> {
        self.selected_student_ids
            .iter()
            .filter_map(|id| self.student(id))
            .collect()
    }

    /// Sum of the checkout lines, or `None` if it does not fit.
    pub fn checkout_total(&self) -> Option<Money> {
        Money::checked_sum(self.checkout_services.iter().map(|service| service.amount))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    data: SessionData,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn snapshot(&self) -> SessionData {
        self.data.clone()
    }

    /// An empty or blank name clears the selection.
    pub(crate) fn set_school(&mut self, school: &str) {
        let school = school.trim();
        self.data.selected_school = if school.is_empty() {
            None
        } else {
            Some(school.to_string())
        };
    }

    pub(crate) fn set_user(
        &mut self,
        name: &str,
        phone: &str,
        roster: Vec<Student>,
    ) -> Result<(), FlowError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FlowError::validation("name is required"));
        }
        let phone = normalize_phone(phone);
        if phone.is_empty() {
            return Err(FlowError::validation("phone number must contain digits"));
        }

        if phone != self.data.user_phone {
            self.data.selected_student_ids.clear();
            self.data.receipt_context = None;
        }
        self.data.user_name = name.to_string();
        self.data.user_phone = phone;
        self.data.roster = roster;
        Ok(())
    }

    pub(crate) fn set_selected_students(&mut self, ids: &[StudentId]) -> Result<(), FlowError> {
        let mut selected: Vec<StudentId> = Vec::with_capacity(ids.len());
        for id in ids {
            if self.data.student(id).is_none() {
                return Err(FlowError::validation(format!(
                    "student {id} is not registered for this phone number"
                )));
            }
            if !selected.contains(id) {
                selected.push(id.clone());
            }
        }
        self.data.selected_student_ids = selected;
        Ok(())
    }

    /// Accepts an empty list; whether checkout may be entered with it is the
    /// step graph's call.
    pub(crate) fn set_checkout_services(
        &mut self,
        services: Vec<CheckoutService>,
    ) -> Result<(), FlowError> {
        for service in &services {
            if service.description.trim().is_empty() {
                return Err(FlowError::validation(format!(
                    "service {} has no description",
                    service.id
                )));
            }
            if service.student_name.trim().is_empty() {
                return Err(FlowError::validation(format!(
                    "service {} is not assigned to a student",
                    service.id
                )));
            }
        }
        if Money::checked_sum(services.iter().map(|service| service.amount)).is_none() {
            return Err(FlowError::validation("checkout total is too large"));
        }
        self.data.checkout_services = services;
        self.data.payment_amount = Money::ZERO;
        Ok(())
    }

    pub(crate) fn set_payment_amount(&mut self, amount: Money) -> Result<(), FlowError> {
        let total = self
            .data
            .checkout_total()
            .ok_or_else(|| FlowError::validation("checkout total is too large"))?;
        if amount != total {
            return Err(FlowError::validation(format!(
                "payment amount {amount} does not match checkout total {total}"
            )));
        }
        self.data.payment_amount = amount;
        Ok(())
    }

    pub(crate) fn set_receipt_context(&mut self, context: ReceiptContext) {
        self.data.receipt_context = Some(context);
    }

    /// Forgets everything; used whenever the flow lands on `search`.
    pub(crate) fn reset(&mut self) {
        self.data = SessionData::default();
    }

    /// Drops what a single checkout produced, keeping school and identity.
    pub(crate) fn clear_checkout(&mut self) {
        self.data.selected_student_ids.clear();
        self.data.checkout_services.clear();
        self.data.payment_amount = Money::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::ServiceId;

    fn student(id: &str, name: &str) -> Student {
        Student {
            name: name.to_string(),
            id: StudentId::new(id),
            grade: "Grade 3B".to_string(),
            balances: 0,
        }
    }

    fn service(amount: u64) -> CheckoutService {
        CheckoutService {
            id: ServiceId::new(format!("svc-{amount}")),
            description: "Grade 3 - Term 1 2025".to_string(),
            amount: Money::from_kwacha(amount),
            invoice_no: "INV-0001".to_string(),
            student_name: "Talitha Kapambwe".to_string(),
        }
    }

    fn identified_store() -> SessionStore {
        let mut store = SessionStore::new();
        store
            .set_user(
                "Mr Stephen Kapambwe",
                "977 123-456",
                vec![
                    student("C20012", "Talitha Kapambwe"),
                    student("C30013", "Isaiah Kapambwe"),
                ],
            )
            .expect("user");
        store
    }

    #[test]
    fn normalizes_phone_to_digits() {
        assert_eq!(normalize_phone("+260 (977) 123-456"), "260977123456");
        assert_eq!(normalize_phone("n/a"), "");
    }

    #[test]
    fn blank_school_clears_selection() {
        let mut store = SessionStore::new();
        store.set_school("  Twalumbu Educational Center ");
        assert_eq!(
            store.data().selected_school.as_deref(),
            Some("Twalumbu Educational Center")
        );
        store.set_school("   ");
        assert_eq!(store.data().selected_school, None);
    }

    #[test]
    fn rejects_user_without_phone_digits() {
        let mut store = SessionStore::new();
        let err = store.set_user("Alice", "---", Vec::new()).expect_err("phone");
        assert!(matches!(err, FlowError::Validation(_)));
        assert!(!store.data().has_identified_user());
    }

    #[test]
    fn selected_students_are_deduplicated_in_order() {
        let mut store = identified_store();
        store
            .set_selected_students(&[
                StudentId::new("C30013"),
                StudentId::new("C20012"),
                StudentId::new("C30013"),
            ])
            .expect("select");
        assert_eq!(
            store.data().selected_student_ids,
            vec![StudentId::new("C30013"), StudentId::new("C20012")]
        );
    }

    #[test]
    fn unknown_student_is_rejected_without_changing_selection() {
        let mut store = identified_store();
        store
            .set_selected_students(&[StudentId::new("C20012")])
            .expect("select");
        let err = store
            .set_selected_students(&[StudentId::new("C99999")])
            .expect_err("unknown");
        assert!(matches!(err, FlowError::Validation(_)));
        assert_eq!(
            store.data().selected_student_ids,
            vec![StudentId::new("C20012")]
        );
    }

    #[test]
    fn payment_amount_must_match_checkout_total() {
        let mut store = identified_store();
        store
            .set_checkout_services(vec![service(1500), service(1000)])
            .expect("services");
        let err = store
            .set_payment_amount(Money::from_kwacha(1500))
            .expect_err("mismatch");
        assert!(matches!(err, FlowError::Validation(_)));
        store
            .set_payment_amount(Money::from_kwacha(2500))
            .expect("match");
        assert_eq!(store.data().payment_amount, Money::from_kwacha(2500));
    }

    #[test]
    fn clear_checkout_keeps_identity_and_school() {
        let mut store = identified_store();
        store.set_school("Twalumbu Educational Center");
        store
            .set_selected_students(&[StudentId::new("C20012")])
            .expect("select");
        store.set_checkout_services(vec![service(300)]).expect("services");
        store
            .set_payment_amount(Money::from_kwacha(300))
            .expect("amount");

        store.clear_checkout();

        let data = store.data();
        assert!(data.selected_student_ids.is_empty());
        assert!(data.checkout_services.is_empty());
        assert_eq!(data.payment_amount, Money::ZERO);
        assert_eq!(data.user_phone, "977123456");
        assert!(data.selected_school.is_some());
    }

    #[test]
    fn switching_phone_drops_selection_and_receipts() {
        let mut store = identified_store();
        store
            .set_selected_students(&[StudentId::new("C20012")])
            .expect("select");
        store.set_receipt_context(ReceiptContext::default());
        store
            .set_user("Mrs Alice Mwamba", "966987654", Vec::new())
            .expect("user");
        assert!(store.data().selected_student_ids.is_empty());
        assert!(store.data().receipt_context.is_none());
    }
}
