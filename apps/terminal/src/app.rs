use std::{collections::BTreeMap, fs, path::PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use flow_core::{FlowAction, FlowController, ReceiptRenderer, ServiceCart, Transition};
use shared::{
    domain::Step,
    records::{PaymentRecord, ReceiptContext},
};
use storage::{search_schools, FeeSchedule};

use crate::commands::{Command, HELP};

/// What the prompt loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue(Vec<String>),
    Exit,
}

pub struct App<R: ReceiptRenderer> {
    controller: FlowController,
    renderer: R,
    schedule: FeeSchedule,
    receipts_dir: PathBuf,
    cart: Option<ServiceCart>,
    /// Completed payments by student name, then by month label.
    ledger: BTreeMap<String, BTreeMap<String, Vec<PaymentRecord>>>,
    exit_requested: bool,
}

pub fn describe(transition: &Transition) -> String {
    format!(
        "step={} direction={} (from {})",
        transition.to, transition.direction, transition.from
    )
}

impl<R: ReceiptRenderer> App<R> {
    pub fn new(controller: FlowController, renderer: R, data_dir: PathBuf) -> Self {
        Self {
            controller,
            renderer,
            schedule: FeeSchedule::standard(),
            receipts_dir: data_dir.join("receipts"),
            cart: None,
            ledger: BTreeMap::new(),
            exit_requested: false,
        }
    }

    pub fn controller(&self) -> &FlowController {
        &self.controller
    }

    pub fn banner(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.controller.lifecycle() == flow_core::Lifecycle::AwaitingTutorial {
            lines.push("Welcome to Master-Fees.".to_string());
            lines.push("1. Search for your school and enter your phone number.".to_string());
            lines.push("2. Pick the students and the services you want to pay for.".to_string());
            lines.push("3. Check out, pay and download your receipt.".to_string());
            lines.push("Type 'tutorial' to begin.".to_string());
        } else {
            lines.push(format!(
                "step={} direction={}",
                self.controller.current_step(),
                self.controller.direction()
            ));
        }
        lines
    }

    /// Pops that arrived from outside the prompt (none for the in-memory
    /// history, but kept so the loop mirrors a real platform).
    pub fn drain_platform_events(&mut self) -> Vec<String> {
        let applied = self.controller.process_platform_events();
        self.sync_cart();
        applied.iter().map(describe).collect()
    }

    fn sync_cart(&mut self) {
        if self.controller.current_step() != Step::AddServices {
            if self.controller.current_step() != Step::Checkout {
                self.cart = None;
            }
            return;
        }
        let selected = &self.controller.session().selected_student_ids;
        let current = self
            .cart
            .as_ref()
            .map(|cart| cart.student_ids().cloned().collect::<Vec<_>>());
        if current.as_ref() != Some(selected) {
            self.cart = Some(self.controller.cart());
        }
    }

    fn cart_mut(&mut self) -> Result<&mut ServiceCart> {
        self.cart
            .as_mut()
            .ok_or_else(|| anyhow!("services can only be added after selecting students"))
    }

    fn dispatch(&mut self, action: FlowAction) -> Result<Vec<String>> {
        let transition = self.controller.dispatch(action)?;
        self.sync_cart();
        Ok(transition.iter().map(describe).collect())
    }

    fn record_payment(&mut self) {
        let now = Local::now();
        let month = now.format("%B %Y").to_string();
        for line in &self.controller.session().checkout_services {
            self.ledger
                .entry(line.student_name.clone())
                .or_default()
                .entry(month.clone())
                .or_default()
                .push(PaymentRecord {
                    date: now.format("%d").to_string(),
                    day: now.format("%a").to_string(),
                    title: line.description.clone(),
                    subtitle: format!("Invoice No. {}", line.invoice_no),
                    amount: line.amount,
                });
        }
    }

    fn cart_lines(&self) -> Vec<String> {
        let Some(cart) = &self.cart else {
            return vec!["cart is empty".to_string()];
        };
        let mut lines: Vec<String> = cart
            .to_checkout_services()
            .into_iter()
            .map(|line| {
                format!(
                    "{} {} | {} | {} | {}",
                    line.id, line.invoice_no, line.student_name, line.description, line.amount
                )
            })
            .collect();
        match cart.total() {
            Some(total) => lines.push(format!("Grand total: {total}")),
            None => lines.push("Grand total: overflow".to_string()),
        }
        lines
    }

    /// Writes the receipt first; the step only moves on once it is saved.
    fn save_receipt(&mut self) -> Result<Vec<String>> {
        let draft = self.controller.prepare_receipt()?;
        let bytes = self.renderer.render(&draft)?;
        fs::create_dir_all(&self.receipts_dir).with_context(|| {
            format!("failed to create '{}'", self.receipts_dir.display())
        })?;
        let path = self.receipts_dir.join(draft.file_name(self.renderer.extension()));
        fs::write(&path, bytes).with_context(|| format!("failed to write '{}'", path.display()))?;

        let mut lines = Vec::new();
        if self.controller.current_step() == Step::Success {
            lines.extend(self.dispatch(FlowAction::ViewReceipt)?);
        }
        lines.push(format!("receipt saved to {}", path.display()));
        Ok(lines)
    }

    pub fn execute(&mut self, command: Command) -> Result<Outcome> {
        if command != Command::Quit {
            self.exit_requested = false;
        }
        let lines = match command {
            Command::Help => HELP.lines().map(str::to_string).collect(),
            Command::Quit => {
                if self.controller.should_confirm_exit() && !self.exit_requested {
                    self.exit_requested = true;
                    vec!["a payment is in progress; type 'quit' again to leave".to_string()]
                } else {
                    return Ok(Outcome::Exit);
                }
            }
            Command::Show => {
                let snapshot = self.controller.snapshot();
                vec![serde_json::to_string_pretty(&snapshot).context("failed to encode snapshot")?]
            }
            Command::Log => self.controller.transitions().map(describe).collect(),
            Command::Tutorial => {
                let transition = self.controller.complete_tutorial()?;
                vec![describe(&transition)]
            }
            Command::Search(query) => {
                let found = search_schools(&query);
                if found.is_empty() {
                    vec!["No schools found".to_string()]
                } else {
                    found.into_iter().map(str::to_string).collect()
                }
            }
            Command::School(name) => self.dispatch(FlowAction::SelectSchool(name))?,
            Command::Proceed => self.dispatch(FlowAction::ProceedFromSearch)?,
            Command::Details { phone, name } => {
                self.dispatch(FlowAction::SubmitDetails { name, phone })?
            }
            Command::History => self.dispatch(FlowAction::ViewHistory)?,
            Command::Receipts(student_id) => {
                let student_name = self
                    .controller
                    .session()
                    .student(&student_id)
                    .map(|student| student.name.clone())
                    .ok_or_else(|| anyhow!("student {student_id} is not registered"))?;
                let payments_by_month = self.ledger.get(&student_name).cloned().unwrap_or_default();
                self.dispatch(FlowAction::ViewAllReceipts(ReceiptContext {
                    student_name,
                    student_id,
                    payments_by_month,
                }))?
            }
            Command::Pay => self.dispatch(FlowAction::PayFees)?,
            Command::Select(ids) => self.dispatch(FlowAction::SelectStudents(ids))?,
            Command::Fee {
                student,
                grade,
                term,
                year,
            } => {
                let quote = self.schedule.school_fee(grade, term, year)?;
                let id = self.cart_mut()?.add(&student, quote)?;
                vec![format!("added {id}")]
            }
            Command::Extras {
                student,
                month,
                bus,
                canteen,
            } => {
                let quotes = self.schedule.other_services(bus, canteen, &month)?;
                let ids = self.cart_mut()?.add_all(&student, quotes)?;
                ids.into_iter().map(|id| format!("added {id}")).collect()
            }
            Command::Remove(id) => {
                if !self.cart_mut()?.remove(&id) {
                    bail!("no service {id} in the cart");
                }
                vec![format!("removed {id}")]
            }
            Command::Cart => self.cart_lines(),
            Command::Checkout => {
                let services = self
                    .cart
                    .as_ref()
                    .map(ServiceCart::to_checkout_services)
                    .unwrap_or_default();
                self.dispatch(FlowAction::Checkout(services))?
            }
            Command::Confirm(amount) => {
                let amount = match amount {
                    Some(amount) => amount,
                    None => self
                        .controller
                        .session()
                        .checkout_total()
                        .ok_or_else(|| anyhow!("checkout total is too large"))?,
                };
                self.dispatch(FlowAction::ConfirmCheckout(amount))?
            }
            Command::Submit => self.dispatch(FlowAction::SubmitPayment)?,
            Command::Succeed => {
                let lines = self.dispatch(FlowAction::PaymentSucceeded)?;
                self.record_payment();
                lines
            }
            Command::Fail => self.dispatch(FlowAction::PaymentFailed)?,
            Command::Receipt => self.save_receipt()?,
            Command::Home => self.dispatch(FlowAction::GoHome)?,
            Command::Retry => self.dispatch(FlowAction::TryAgain)?,
            Command::Next => self.dispatch(FlowAction::NextFromAddServices)?,
            Command::Back => self.dispatch(FlowAction::Back)?,
            Command::Forward => self.dispatch(FlowAction::Forward)?,
        };
        Ok(Outcome::Continue(lines))
    }
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
