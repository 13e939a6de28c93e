use shared::domain::Step;

use crate::session::SessionData;

/// Static shape of the flow: which steps the in-app actions lead to from
/// each step, and what session data each step needs before it is entered.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepGraph;

impl StepGraph {
    /// Target of the "go home" action, reachable from anywhere past search.
    pub const HOME: Step = Step::Services;

    /// Forward targets the in-app actions offer from `step`.
    pub fn successors(self, step: Step) -> &'static [Step] {
        match step {
            Step::Search => &[Step::Details],
            Step::Details => &[Step::Services],
            Step::Services => &[Step::History, Step::PayFees],
            Step::History => &[Step::Receipts],
            Step::Receipts => &[],
            Step::PayFees => &[Step::AddServices],
            Step::AddServices => &[Step::Checkout],
            Step::Checkout => &[Step::Payment],
            Step::Payment => &[Step::Processing],
            Step::Processing => &[Step::Success, Step::Failed],
            Step::Failed => &[],
            Step::Success => &[Step::DownloadReceipt],
            Step::DownloadReceipt => &[Self::HOME],
        }
    }

    pub fn is_reachable(self, from: Step, to: Step) -> bool {
        (to == Self::HOME && from != Step::Search) || self.successors(from).contains(&to)
    }

    /// Data preconditions for entering `target` while on `current`.
    pub fn can_enter(self, target: Step, current: Step, session: &SessionData) -> bool {
        match target {
            Step::Success | Step::Failed => current == Step::Processing,
            Step::DownloadReceipt => current == Step::Success,
            _ => self.supports(target, session),
        }
    }

    /// Whether `session` still holds what `step` shows, however it is
    /// reached. Pops are checked against this.
    pub fn supports(self, step: Step, session: &SessionData) -> bool {
        let identified = session.has_identified_user();
        let has_checkout = !session.checkout_services.is_empty()
            && session
                .checkout_total()
                .is_some_and(|total| !total.is_zero());
        let has_payment = identified && has_checkout && !session.payment_amount.is_zero();

        match step {
            Step::Search => true,
            Step::Details => session.selected_school.is_some(),
            Step::Services | Step::History | Step::PayFees => identified,
            Step::Receipts => identified && session.receipt_context.is_some(),
            Step::AddServices => identified && !session.selected_student_ids.is_empty(),
            Step::Checkout => identified && has_checkout,
            Step::Payment
            | Step::Processing
            | Step::Success
            | Step::Failed
            | Step::DownloadReceipt => has_payment,
        }
    }

    /// Where a pop onto `landed` settles: `landed` itself when the session
    /// supports it, otherwise home when possible, otherwise `search`.
    pub fn settle(self, landed: Step, session: &SessionData) -> Step {
        if self.supports(landed, session) {
            landed
        } else if self.supports(Self::HOME, session) {
            Self::HOME
        } else {
            Step::Search
        }
    }

    /// Both reachable from `current` and enterable with `session`.
    pub fn allows(self, current: Step, target: Step, session: &SessionData) -> bool {
        self.is_reachable(current, target) && self.can_enter(target, current, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{
        domain::{ServiceId, StudentId},
        records::{CheckoutService, Money},
    };

    fn identified() -> SessionData {
        SessionData {
            selected_school: Some("Twalumbu Educational Center".into()),
            user_name: "Mr Stephen Kapambwe".into(),
            user_phone: "977123456".into(),
            ..SessionData::default()
        }
    }

    fn line(amount: Money) -> CheckoutService {
        CheckoutService {
            id: ServiceId::new("svc-1"),
            description: "Canteen (Lunch) - March".into(),
            amount,
            invoice_no: "INV-0001".into(),
            student_name: "Talitha Kapambwe".into(),
        }
    }

    #[test]
    fn details_requires_selected_school() {
        let graph = StepGraph;
        let mut session = SessionData::default();
        assert!(!graph.can_enter(Step::Details, Step::Search, &session));
        session.selected_school = Some("Twalumbu Educational Center".into());
        assert!(graph.can_enter(Step::Details, Step::Search, &session));
    }

    #[test]
    fn identified_steps_require_phone() {
        let graph = StepGraph;
        let anonymous = SessionData::default();
        for step in [Step::Services, Step::History, Step::PayFees] {
            assert!(!graph.can_enter(step, Step::Details, &anonymous), "{step}");
            assert!(graph.can_enter(step, Step::Details, &identified()), "{step}");
        }
    }

    #[test]
    fn checkout_requires_positive_total() {
        let graph = StepGraph;
        let mut session = identified();
        session.selected_student_ids = vec![StudentId::new("C20012")];
        assert!(!graph.can_enter(Step::Checkout, Step::AddServices, &session));

        session.checkout_services = vec![line(Money::ZERO)];
        assert!(!graph.can_enter(Step::Checkout, Step::AddServices, &session));

        session.checkout_services = vec![line(Money::from_kwacha(1000))];
        assert!(graph.can_enter(Step::Checkout, Step::AddServices, &session));
        assert!(!graph.can_enter(Step::Payment, Step::Checkout, &session));

        session.payment_amount = Money::from_kwacha(1000);
        assert!(graph.can_enter(Step::Payment, Step::Checkout, &session));
    }

    #[test]
    fn outcomes_only_follow_processing() {
        let graph = StepGraph;
        let session = identified();
        assert!(graph.can_enter(Step::Success, Step::Processing, &session));
        assert!(graph.can_enter(Step::Failed, Step::Processing, &session));
        assert!(!graph.can_enter(Step::Success, Step::Payment, &session));
        assert!(!graph.can_enter(Step::DownloadReceipt, Step::Failed, &session));
        assert!(graph.can_enter(Step::DownloadReceipt, Step::Success, &session));
    }

    #[test]
    fn pops_settle_on_the_nearest_supported_step() {
        let graph = StepGraph;
        let mut session = identified();
        assert_eq!(graph.settle(Step::Success, &session), Step::Services);
        assert_eq!(graph.settle(Step::Details, &session), Step::Details);

        session.checkout_services = vec![line(Money::from_kwacha(1000))];
        session.payment_amount = Money::from_kwacha(1000);
        assert_eq!(graph.settle(Step::Success, &session), Step::Success);

        let anonymous = SessionData::default();
        assert_eq!(graph.settle(Step::Services, &anonymous), Step::Search);
        assert_eq!(graph.settle(Step::Details, &anonymous), Step::Search);
    }

    #[test]
    fn home_is_reachable_from_every_step_but_search() {
        let graph = StepGraph;
        for step in Step::ALL {
            assert_eq!(
                graph.is_reachable(step, Step::Services),
                step != Step::Search,
                "{step}"
            );
        }
        assert!(!graph.is_reachable(Step::Search, Step::Checkout));
        assert!(graph.is_reachable(Step::Processing, Step::Failed));
    }
}
