//! Per-student service selection built up on the add-services step before it
//! is flattened into checkout lines.

use shared::{
    domain::{ServiceId, StudentId},
    error::FlowError,
    records::{CheckoutService, Money, ServiceQuote},
};
use uuid::Uuid;

use crate::session::SessionData;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub id: ServiceId,
    pub description: String,
    pub amount: Money,
    pub invoice_no: String,
}

#[derive(Debug, Clone)]
struct StudentLines {
    student_id: StudentId,
    student_name: String,
    lines: Vec<CartLine>,
}

#[derive(Debug, Clone)]
pub struct ServiceCart {
    students: Vec<StudentLines>,
    next_invoice: u32,
}

impl ServiceCart {
    /// Cart for the given `(id, name)` pairs, in selection order.
    pub fn for_students<I>(students: I) -> Self
    where
        I: IntoIterator<Item = (StudentId, String)>,
    {
        let students = students
            .into_iter()
            .map(|(student_id, student_name)| StudentLines {
                student_id,
                student_name,
                lines: Vec::new(),
            })
            .collect();
        Self {
            students,
            next_invoice: 1,
        }
    }

    /// Cart for the session's selected students. Unknown ids keep the id as
    /// their display name.
    pub fn from_session(session: &SessionData) -> Self {
        Self::for_students(session.selected_student_ids.iter().map(|id| {
            let name = session
                .student(id)
                .map(|student| student.name.clone())
                .unwrap_or_else(|| id.to_string());
            (id.clone(), name)
        }))
    }

    pub fn student_ids(&self) -> impl Iterator<Item = &StudentId> + '_ {
        self.students.iter().map(|entry| &entry.student_id)
    }

    fn entry_mut(&mut self, student: &StudentId) -> Result<&mut StudentLines, FlowError> {
        self.students
            .iter_mut()
            .find(|entry| &entry.student_id == student)
            .ok_or_else(|| FlowError::validation(format!("student {student} is not in the cart")))
    }

    pub fn add(
        &mut self,
        student: &StudentId,
        quote: ServiceQuote,
    ) -> Result<ServiceId, FlowError> {
        if quote.description.trim().is_empty() {
            return Err(FlowError::validation("service description is required"));
        }
        if quote.amount.is_zero() {
            return Err(FlowError::validation(format!(
                "service '{}' has no amount",
                quote.description
            )));
        }
        let invoice_no = format!("INV-{:04}", self.next_invoice);
        let entry = self.entry_mut(student)?;
        let id = ServiceId::new(Uuid::new_v4().to_string());
        entry.lines.push(CartLine {
            id: id.clone(),
            description: quote.description,
            amount: quote.amount,
            invoice_no,
        });
        self.next_invoice += 1;
        Ok(id)
    }

    /// Adds every quote or none of them.
    pub fn add_all<I>(
        &mut self,
        student: &StudentId,
        quotes: I,
    ) -> Result<Vec<ServiceId>, FlowError>
    where
        I: IntoIterator<Item = ServiceQuote>,
    {
        let mut staged = self.clone();
        let ids = quotes
            .into_iter()
            .map(|quote| staged.add(student, quote))
            .collect::<Result<Vec<_>, _>>()?;
        *self = staged;
        Ok(ids)
    }

    /// Returns whether a line was removed.
    pub fn remove(&mut self, service: &ServiceId) -> bool {
        for entry in &mut self.students {
            if let Some(pos) = entry.lines.iter().position(|line| &line.id == service) {
                entry.lines.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn lines_for(&self, student: &StudentId) -> &[CartLine] {
        self.students
            .iter()
            .find(|entry| &entry.student_id == student)
            .map(|entry| entry.lines.as_slice())
            .unwrap_or(&[])
    }

    pub fn student_total(&self, student: &StudentId) -> Option<Money> {
        Money::checked_sum(self.lines_for(student).iter().map(|line| line.amount))
    }

    pub fn total(&self) -> Option<Money> {
        Money::checked_sum(
            self.students
                .iter()
                .flat_map(|entry| entry.lines.iter().map(|line| line.amount)),
        )
    }

    pub fn has_services(&self) -> bool {
        self.students.iter().any(|entry| !entry.lines.is_empty())
    }

    /// Flattens the cart, student by student, into checkout lines.
    pub fn to_checkout_services(&self) -> Vec<CheckoutService> {
        self.students
            .iter()
            .flat_map(|entry| {
                let student_name = if entry.student_name.trim().is_empty() {
                    entry.student_id.to_string()
                } else {
                    entry.student_name.clone()
                };
                entry.lines.iter().map(move |line| CheckoutService {
                    id: line.id.clone(),
                    description: line.description.clone(),
                    amount: line.amount,
                    invoice_no: line.invoice_no.clone(),
                    student_name: student_name.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(description: &str, kwacha: u64) -> ServiceQuote {
        ServiceQuote {
            description: description.to_string(),
            amount: Money::from_kwacha(kwacha),
        }
    }

    fn cart() -> ServiceCart {
        ServiceCart::for_students([
            (StudentId::new("C20012"), "Talitha Kapambwe".to_string()),
            (StudentId::new("C30013"), String::new()),
        ])
    }

    #[test]
    fn totals_per_student_and_overall() {
        let mut cart = cart();
        let talitha = StudentId::new("C20012");
        let isaiah = StudentId::new("C30013");
        cart.add(&talitha, quote("Grade 3 - Term 1 2025", 1500))
            .expect("fees");
        cart.add(&isaiah, quote("Canteen (Lunch) - March", 1000))
            .expect("canteen");

        assert_eq!(cart.student_total(&talitha), Some(Money::from_kwacha(1500)));
        assert_eq!(cart.total(), Some(Money::from_kwacha(2500)));
        assert!(cart.has_services());
    }

    #[test]
    fn checkout_lines_resolve_names_and_number_invoices() {
        let mut cart = cart();
        cart.add(
            &StudentId::new("C20012"),
            quote("School Bus (Woodlands) - March", 1500),
        )
        .expect("bus");
        cart.add(&StudentId::new("C30013"), quote("Canteen (Snacks) - March", 300))
            .expect("snacks");

        let lines = cart.to_checkout_services();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].student_name, "Talitha Kapambwe");
        assert_eq!(lines[0].invoice_no, "INV-0001");
        assert_eq!(lines[1].student_name, "C30013");
        assert_eq!(lines[1].invoice_no, "INV-0002");
    }

    #[test]
    fn remove_by_service_id() {
        let mut cart = cart();
        let id = cart
            .add(&StudentId::new("C20012"), quote("Grade 3 - Term 2 2025", 1500))
            .expect("add");
        assert!(cart.remove(&id));
        assert!(!cart.remove(&id));
        assert!(!cart.has_services());
        assert_eq!(cart.total(), Some(Money::ZERO));
    }

    #[test]
    fn add_all_is_all_or_nothing() {
        let mut cart = cart();
        let err = cart
            .add_all(
                &StudentId::new("C20012"),
                [quote("Canteen (Lunch) - March", 1000), quote("", 500)],
            )
            .expect_err("blank description");
        assert!(matches!(err, FlowError::Validation(_)));
        assert!(!cart.has_services());
    }

    #[test]
    fn rejects_students_outside_the_cart() {
        let mut cart = cart();
        let err = cart
            .add(&StudentId::new("C99999"), quote("Grade 1 - Term 1 2025", 1200))
            .expect_err("unknown");
        assert!(matches!(err, FlowError::Validation(_)));
    }
}
