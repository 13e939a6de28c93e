//! The flow façade: owns the session, the history binding and the transition
//! log, and is the only place that changes the current step.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
    sync::Arc,
};

use serde::Serialize;
use shared::{
    domain::{Direction, Step, StudentId},
    error::FlowError,
    records::{CheckoutService, Money, ReceiptContext},
};
use tracing::{debug, info, warn};

use crate::{
    cart::ServiceCart,
    history::{HistoryBackend, HistoryMode, HistorySynchronizer},
    receipt::ReceiptDraft,
    session::{normalize_phone, SessionData, SessionStore},
    step_graph::StepGraph,
    transition::{Transition, TransitionDirector, TransitionOrigin},
    tutorial::TutorialGate,
    FlowOptions, PreferenceStore, StudentDirectory,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    AwaitingTutorial,
    Active,
    ShutDown,
}

/// Every user intent the flow understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    /// Sets the school on `search`; blank clears it. No transition.
    SelectSchool(String),
    ProceedFromSearch,
    SubmitDetails { name: String, phone: String },
    ViewHistory,
    ViewAllReceipts(ReceiptContext),
    PayFees,
    SelectStudents(Vec<StudentId>),
    Checkout(Vec<CheckoutService>),
    ConfirmCheckout(Money),
    SubmitPayment,
    PaymentSucceeded,
    PaymentFailed,
    ViewReceipt,
    GoHome,
    /// From `failed`, back to `payment` through the platform stack.
    TryAgain,
    /// From `add-services` with nothing to check out, back to `pay-fees`.
    NextFromAddServices,
    Back,
    Forward,
}

impl FlowAction {
    pub fn name(&self) -> &'static str {
        match self {
            FlowAction::SelectSchool(_) => "select_school",
            FlowAction::ProceedFromSearch => "proceed_from_search",
            FlowAction::SubmitDetails { .. } => "submit_details",
            FlowAction::ViewHistory => "view_history",
            FlowAction::ViewAllReceipts(_) => "view_all_receipts",
            FlowAction::PayFees => "pay_fees",
            FlowAction::SelectStudents(_) => "select_students",
            FlowAction::Checkout(_) => "checkout",
            FlowAction::ConfirmCheckout(_) => "confirm_checkout",
            FlowAction::SubmitPayment => "submit_payment",
            FlowAction::PaymentSucceeded => "payment_succeeded",
            FlowAction::PaymentFailed => "payment_failed",
            FlowAction::ViewReceipt => "view_receipt",
            FlowAction::GoHome => "go_home",
            FlowAction::TryAgain => "try_again",
            FlowAction::NextFromAddServices => "next_from_add_services",
            FlowAction::Back => "back",
            FlowAction::Forward => "forward",
        }
    }
}

/// Everything the rendering layer reads, as one owned value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSnapshot {
    pub step: Step,
    pub direction: Direction,
    pub lifecycle: Lifecycle,
    pub history_mode: HistoryMode,
    pub can_go_back: bool,
    pub confirm_exit: bool,
    pub session: SessionData,
}

#[derive(Debug, Clone, Copy)]
enum StackOp {
    Advance,
    Replace,
}

pub struct FlowController {
    options: FlowOptions,
    graph: StepGraph,
    session: SessionStore,
    history: HistorySynchronizer,
    director: TransitionDirector,
    directory: Arc<dyn StudentDirectory>,
    tutorial: TutorialGate,
    lifecycle: Lifecycle,
}

impl FlowController {
    /// Builds the controller and initialises it right away unless the
    /// first-run tutorial still has to be shown.
    pub fn start(
        history: Arc<dyn HistoryBackend>,
        directory: Arc<dyn StudentDirectory>,
        prefs: Arc<dyn PreferenceStore>,
        options: FlowOptions,
    ) -> Result<Self, FlowError> {
        let mut controller = Self {
            history: HistorySynchronizer::new(history),
            tutorial: TutorialGate::new(prefs),
            graph: StepGraph,
            session: SessionStore::new(),
            director: TransitionDirector::new(),
            lifecycle: Lifecycle::AwaitingTutorial,
            directory,
            options,
        };

        if controller.options.skip_tutorial || !controller.tutorial.needs_tutorial() {
            controller.initialize()?;
        } else {
            info!("first run; waiting for tutorial before initializing the flow");
        }
        Ok(controller)
    }

    /// Records that the tutorial was seen and initialises the flow. A flag
    /// that cannot be persisted only means the tutorial shows again next time.
    pub fn complete_tutorial(&mut self) -> Result<Transition, FlowError> {
        match self.lifecycle {
            Lifecycle::ShutDown => return Err(FlowError::ShutDown),
            Lifecycle::Active => return Err(FlowError::AlreadyInitialized),
            Lifecycle::AwaitingTutorial => {}
        }
        if let Err(err) = self.tutorial.mark_completed() {
            warn!(error = %err, "failed to persist tutorial flag");
        }
        self.initialize()
    }

    /// Seeds history from the deep link (or `search`). Runs exactly once.
    pub fn initialize(&mut self) -> Result<Transition, FlowError> {
        if self.lifecycle == Lifecycle::ShutDown {
            return Err(FlowError::ShutDown);
        }
        let graph = self.graph;
        let strict = self.options.strict_deep_links;
        let empty = SessionData::default();
        let step = self
            .history
            .initialize_with(|step| !strict || graph.can_enter(step, Step::Search, &empty))?;

        self.lifecycle = Lifecycle::Active;
        let transition = self
            .director
            .record(Step::Search, step, TransitionOrigin::Initialize);
        self.after_transition(step);
        info!(%step, mode = ?self.history.mode(), "flow initialized");
        Ok(transition)
    }

    /// Detaches from the platform; every later action fails with `ShutDown`.
    pub fn shutdown(&mut self) {
        if self.lifecycle == Lifecycle::ShutDown {
            return;
        }
        self.history.detach();
        self.lifecycle = Lifecycle::ShutDown;
        info!(step = %self.current_step(), "flow shut down");
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn options(&self) -> &FlowOptions {
        &self.options
    }

    pub fn current_step(&self) -> Step {
        self.history.current()
    }

    /// Direction of the latest transition. Read it while rendering that
    /// transition; it changes with the next one.
    pub fn direction(&self) -> Direction {
        self.director.direction()
    }

    pub fn session(&self) -> &SessionData {
        self.session.data()
    }

    pub fn history_mode(&self) -> HistoryMode {
        self.history.mode()
    }

    pub fn history_depth(&self) -> usize {
        self.history.depth()
    }

    pub fn can_go_back(&self) -> bool {
        self.history.supports_traversal() && self.history.depth() > 1
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> + '_ {
        self.director.transitions()
    }

    pub fn last_transition(&self) -> Option<&Transition> {
        self.director.last()
    }

    pub fn successors(&self) -> &'static [Step] {
        self.graph.successors(self.current_step())
    }

    /// Whether `target` is reachable and enterable from the current step
    /// with the current session.
    pub fn can_enter(&self, target: Step) -> bool {
        self.graph
            .allows(self.current_step(), target, self.session.data())
    }

    /// Leaving the page mid-flow with a school chosen asks for confirmation.
    pub fn should_confirm_exit(&self) -> bool {
        self.current_step() != Step::Search && self.session.data().selected_school.is_some()
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            step: self.current_step(),
            direction: self.direction(),
            lifecycle: self.lifecycle,
            history_mode: self.history.mode(),
            can_go_back: self.can_go_back(),
            confirm_exit: self.should_confirm_exit(),
            session: self.session.snapshot(),
        }
    }

    /// Cart over the currently selected students, for the add-services step.
    pub fn cart(&self) -> ServiceCart {
        ServiceCart::from_session(self.session.data())
    }

    /// Receipt for the completed payment; available on `success` and
    /// `download-receipt`.
    pub fn prepare_receipt(&self) -> Result<ReceiptDraft, FlowError> {
        let current = self.current_step();
        if !matches!(current, Step::Success | Step::DownloadReceipt) {
            return Err(FlowError::PreconditionFailed {
                target: Step::DownloadReceipt,
                current,
            });
        }
        ReceiptDraft::prepare(
            self.session.data(),
            &self.options.fallback_school,
            self.options.service_fee_bps,
        )
    }

    pub fn on_pop(&mut self, handler: impl FnMut(Step) + 'static) {
        self.history.on_pop(handler);
    }

    fn ensure_active(&self) -> Result<(), FlowError> {
        match self.lifecycle {
            Lifecycle::Active => Ok(()),
            Lifecycle::AwaitingTutorial => Err(FlowError::AwaitingTutorial),
            Lifecycle::ShutDown => Err(FlowError::ShutDown),
        }
    }

    /// Applies queued platform pops in arrival order, one transition each. A
    /// pop onto a step the session can no longer show settles on home, or on
    /// `search` when even home is out of reach.
    pub fn process_platform_events(&mut self) -> Vec<Transition> {
        let mut applied = Vec::new();
        if self.lifecycle != Lifecycle::Active {
            return applied;
        }
        loop {
            let from = self.history.current();
            let graph = self.graph;
            let session = self.session.data();
            let Some(step) = self
                .history
                .next_pop_with(|landed| graph.settle(landed, session))
            else {
                break;
            };
            let transition = self.director.record(from, step, TransitionOrigin::Pop);
            self.after_transition(step);
            info!(%from, to = %step, direction = %transition.direction, "platform pop applied");
            applied.push(transition);
        }
        applied
    }

    /// Applies queued platform pops, then runs one action to completion.
    /// `Ok(None)` means the action changed no step (selecting a school, or a
    /// traversal whose pop has not been delivered yet). A rejected action
    /// changes nothing itself, though the pops applied before it stay.
    pub fn dispatch(&mut self, action: FlowAction) -> Result<Option<Transition>, FlowError> {
        self.ensure_active()?;
        self.process_platform_events();

        let name = action.name();
        debug!(action = name, step = %self.current_step(), "dispatching flow action");
        let result = self.apply(action);
        match &result {
            Ok(Some(transition)) => info!(
                action = name,
                from = %transition.from,
                to = %transition.to,
                direction = %transition.direction,
                "flow transition"
            ),
            Ok(None) => {}
            Err(err) => warn!(
                action = name,
                code = ?err.code(),
                step = %self.current_step(),
                error = %err,
                "flow action rejected"
            ),
        }
        result
    }

    fn apply(&mut self, action: FlowAction) -> Result<Option<Transition>, FlowError> {
        match action {
            FlowAction::SelectSchool(school) => {
                let current = self.current_step();
                if current != Step::Search {
                    return Err(FlowError::validation(format!(
                        "a school can only be chosen on search, not on {current}"
                    )));
                }
                self.session.set_school(&school);
                Ok(None)
            }
            FlowAction::ProceedFromSearch => {
                self.transition_with(Step::Details, StackOp::Advance, |_| Ok(()))
            }
            FlowAction::SubmitDetails { name, phone } => {
                let phone = normalize_phone(&phone);
                let roster = self.directory.students_for_phone(&phone);
                let name = if name.trim().is_empty() {
                    self.directory.guardian_name(&phone).unwrap_or_default()
                } else {
                    name
                };
                self.transition_with(Step::Services, StackOp::Advance, move |session| {
                    session.set_user(&name, &phone, roster)
                })
            }
            FlowAction::ViewHistory => {
                self.transition_with(Step::History, StackOp::Advance, |_| Ok(()))
            }
            FlowAction::ViewAllReceipts(context) => {
                self.transition_with(Step::Receipts, StackOp::Advance, move |session| {
                    session.set_receipt_context(context);
                    Ok(())
                })
            }
            FlowAction::PayFees => {
                self.transition_with(Step::PayFees, StackOp::Advance, |_| Ok(()))
            }
            FlowAction::SelectStudents(ids) => {
                self.transition_with(Step::AddServices, StackOp::Advance, move |session| {
                    session.set_selected_students(&ids)
                })
            }
            FlowAction::Checkout(services) => {
                self.transition_with(Step::Checkout, StackOp::Advance, move |session| {
                    session.set_checkout_services(services)
                })
            }
            FlowAction::ConfirmCheckout(amount) => {
                self.transition_with(Step::Payment, StackOp::Advance, move |session| {
                    session.set_payment_amount(amount)
                })
            }
            FlowAction::SubmitPayment => {
                self.transition_with(Step::Processing, StackOp::Advance, |_| Ok(()))
            }
            FlowAction::PaymentSucceeded => {
                self.transition_with(Step::Success, StackOp::Replace, |_| Ok(()))
            }
            FlowAction::PaymentFailed => {
                self.transition_with(Step::Failed, StackOp::Replace, |_| Ok(()))
            }
            FlowAction::ViewReceipt => {
                self.transition_with(Step::DownloadReceipt, StackOp::Advance, |_| Ok(()))
            }
            FlowAction::GoHome => {
                self.transition_with(StepGraph::HOME, StackOp::Replace, |session| {
                    session.clear_checkout();
                    Ok(())
                })
            }
            FlowAction::TryAgain => self.pop_from(Step::Failed, Step::Payment),
            FlowAction::NextFromAddServices => self.pop_from(Step::AddServices, Step::PayFees),
            FlowAction::Back => self.traverse(-1),
            FlowAction::Forward => self.traverse(1),
        }
    }

    /// Stages `mutate` on a copy of the session, checks the graph against the
    /// staged data and only then commits both session and step.
    fn transition_with<F>(
        &mut self,
        target: Step,
        op: StackOp,
        mutate: F,
    ) -> Result<Option<Transition>, FlowError>
    where
        F: FnOnce(&mut SessionStore) -> Result<(), FlowError>,
    {
        let current = self.current_step();
        let mut staged = self.session.clone();
        mutate(&mut staged)?;
        if !self.graph.allows(current, target, staged.data()) {
            return Err(FlowError::PreconditionFailed { target, current });
        }

        self.session = staged;
        let origin = match op {
            StackOp::Advance => {
                self.history.advance(target);
                TransitionOrigin::Advance
            }
            StackOp::Replace => {
                self.history.replace(target);
                TransitionOrigin::Replace
            }
        };
        let transition = self.director.record(current, target, origin);
        self.after_transition(target);
        Ok(Some(transition))
    }

    /// In-app "back" buttons that are only offered on one step.
    fn pop_from(&mut self, required: Step, target: Step) -> Result<Option<Transition>, FlowError> {
        let current = self.current_step();
        if current != required {
            return Err(FlowError::PreconditionFailed { target, current });
        }
        self.traverse(-1)
    }

    fn traverse(&mut self, delta: isize) -> Result<Option<Transition>, FlowError> {
        self.history.request_traversal(delta)?;
        Ok(self.process_platform_events().into_iter().last())
    }

    fn after_transition(&mut self, step: Step) {
        if step != Step::Search {
            return;
        }
        self.session.reset();
        self.history.guard_against_stack_exhaustion();
    }

    pub fn select_school(&mut self, school: &str) -> Result<(), FlowError> {
        self.dispatch(FlowAction::SelectSchool(school.to_string()))
            .map(|_| ())
    }

    pub fn proceed_from_search(&mut self) -> Result<Option<Transition>, FlowError> {
        self.dispatch(FlowAction::ProceedFromSearch)
    }

    pub fn submit_details(
        &mut self,
        name: &str,
        phone: &str,
    ) -> Result<Option<Transition>, FlowError> {
        self.dispatch(FlowAction::SubmitDetails {
            name: name.to_string(),
            phone: phone.to_string(),
        })
    }

    pub fn select_services_and_continue(
        &mut self,
        student_ids: &[StudentId],
    ) -> Result<Option<Transition>, FlowError> {
        self.dispatch(FlowAction::SelectStudents(student_ids.to_vec()))
    }

    pub fn checkout_cart(&mut self, cart: &ServiceCart) -> Result<Option<Transition>, FlowError> {
        self.dispatch(FlowAction::Checkout(cart.to_checkout_services()))
    }

    pub fn complete_checkout(&mut self, amount: Money) -> Result<Option<Transition>, FlowError> {
        self.dispatch(FlowAction::ConfirmCheckout(amount))
    }

    pub fn payment_succeeded(&mut self) -> Result<Option<Transition>, FlowError> {
        self.dispatch(FlowAction::PaymentSucceeded)
    }

    pub fn payment_failed(&mut self) -> Result<Option<Transition>, FlowError> {
        self.dispatch(FlowAction::PaymentFailed)
    }

    pub fn try_again(&mut self) -> Result<Option<Transition>, FlowError> {
        self.dispatch(FlowAction::TryAgain)
    }

    pub fn go_home(&mut self) -> Result<Option<Transition>, FlowError> {
        self.dispatch(FlowAction::GoHome)
    }

    pub fn back(&mut self) -> Result<Option<Transition>, FlowError> {
        self.dispatch(FlowAction::Back)
    }
}

impl Drop for FlowController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle the rendering layer shares between its views. A dispatch issued
/// while another one is running (e.g. from a pop observer) is rejected with
/// `ReentrantTransition` instead of being interleaved.
///
/// Pop observers stored in the controller must hold a [`WeakFlowController`]
/// from [`Self::downgrade`]; a strong handle there keeps the controller, and
/// its pop subscription, alive after every view has dropped its handle.
#[derive(Clone)]
pub struct SharedFlowController {
    inner: Rc<RefCell<FlowController>>,
}

/// Non-owning handle for pop observers.
#[derive(Clone)]
pub struct WeakFlowController {
    inner: Weak<RefCell<FlowController>>,
}

impl WeakFlowController {
    /// `None` once the last [`SharedFlowController`] is gone.
    pub fn upgrade(&self) -> Option<SharedFlowController> {
        self.inner
            .upgrade()
            .map(|inner| SharedFlowController { inner })
    }

    /// Dispatches through the controller if it is still alive.
    pub fn dispatch(&self, action: FlowAction) -> Result<Option<Transition>, FlowError> {
        self.upgrade()
            .ok_or(FlowError::ShutDown)?
            .dispatch(action)
    }
}

impl SharedFlowController {
    pub fn new(controller: FlowController) -> Self {
        Self {
            inner: Rc::new(RefCell::new(controller)),
        }
    }

    pub fn downgrade(&self) -> WeakFlowController {
        WeakFlowController {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn dispatch(&self, action: FlowAction) -> Result<Option<Transition>, FlowError> {
        let mut controller = self.inner.try_borrow_mut().map_err(|_| {
            warn!(action = action.name(), "rejected reentrant flow action");
            FlowError::ReentrantTransition
        })?;
        controller.dispatch(action)
    }

    pub fn complete_tutorial(&self) -> Result<Transition, FlowError> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| FlowError::ReentrantTransition)?
            .complete_tutorial()
    }

    pub fn process_platform_events(&self) -> Result<Vec<Transition>, FlowError> {
        let mut controller = self
            .inner
            .try_borrow_mut()
            .map_err(|_| FlowError::ReentrantTransition)?;
        Ok(controller.process_platform_events())
    }

    pub fn on_pop(&self, handler: impl FnMut(Step) + 'static) -> Result<(), FlowError> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| FlowError::ReentrantTransition)?
            .on_pop(handler);
        Ok(())
    }

    /// Read access; fails only while a transition holds the controller.
    pub fn read<R>(&self, read: impl FnOnce(&FlowController) -> R) -> Result<R, FlowError> {
        let controller = self
            .inner
            .try_borrow()
            .map_err(|_| FlowError::ReentrantTransition)?;
        Ok(read(&controller))
    }

    pub fn snapshot(&self) -> Result<FlowSnapshot, FlowError> {
        self.read(FlowController::snapshot)
    }

    pub fn shutdown(&self) -> Result<(), FlowError> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| FlowError::ReentrantTransition)?
            .shutdown();
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
