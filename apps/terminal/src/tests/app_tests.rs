use std::sync::Arc;

use flow_core::{EphemeralPreferences, FlowOptions, MemoryHistory, ReceiptDraft};
use shared::records::Money;
use storage::SeededDirectory;

use super::*;
use crate::{commands::parse_command, receipt::PlainTextReceipt};

struct BrokenPrinter;

impl ReceiptRenderer for BrokenPrinter {
    fn render(&self, _draft: &ReceiptDraft) -> Result<Vec<u8>> {
        bail!("printer offline")
    }
}

fn app(data_dir: PathBuf, skip_tutorial: bool) -> App<PlainTextReceipt> {
    app_with(PlainTextReceipt, data_dir, skip_tutorial)
}

fn app_with<R: ReceiptRenderer>(renderer: R, data_dir: PathBuf, skip_tutorial: bool) -> App<R> {
    let controller = FlowController::start(
        Arc::new(MemoryHistory::new()),
        Arc::new(SeededDirectory::demo()),
        Arc::new(EphemeralPreferences::default()),
        FlowOptions {
            skip_tutorial,
            ..FlowOptions::default()
        },
    )
    .expect("start");
    App::new(controller, renderer, data_dir)
}

fn run<R: ReceiptRenderer>(app: &mut App<R>, line: &str) -> Vec<String> {
    match app
        .execute(parse_command(line).expect("parse"))
        .unwrap_or_else(|err| panic!("{line}: {err:#}"))
    {
        Outcome::Continue(lines) => lines,
        Outcome::Exit => vec!["<exit>".to_string()],
    }
}

#[test]
fn pays_and_saves_a_receipt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut app = app(dir.path().to_path_buf(), true);

    for line in [
        "school Twalumbu Educational Center",
        "proceed",
        "details 977123456",
        "pay",
        "select C20012 C30013",
        "fee C20012 3 1 2025",
        "extras C30013 March bus=northmead",
        "checkout",
        "confirm",
        "submit",
        "succeed",
    ] {
        run(&mut app, line);
    }
    assert_eq!(app.controller().current_step(), Step::Success);
    assert_eq!(
        app.controller().session().payment_amount,
        Money::from_kwacha(2700)
    );

    let lines = run(&mut app, "receipt");
    assert_eq!(app.controller().current_step(), Step::DownloadReceipt);
    let saved = lines.last().expect("saved line");
    assert!(saved.starts_with("receipt saved to "), "{saved}");
    let receipts: Vec<_> = fs::read_dir(dir.path().join("receipts"))
        .expect("receipts dir")
        .collect();
    assert_eq!(receipts.len(), 1);

    run(&mut app, "home");
    run(&mut app, "history");
    run(&mut app, "receipts C20012");
    let context = app
        .controller()
        .session()
        .receipt_context
        .clone()
        .expect("context");
    let payments: usize = context.payments_by_month.values().map(Vec::len).sum();
    assert_eq!(payments, 1);
}

#[test]
fn failed_receipt_keeps_the_success_step() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut app = app_with(BrokenPrinter, dir.path().to_path_buf(), true);
    for line in [
        "school Twalumbu Educational Center",
        "proceed",
        "details 977123456",
        "pay",
        "select C20012",
        "fee C20012 3 1 2025",
        "checkout",
        "confirm",
        "submit",
        "succeed",
    ] {
        run(&mut app, line);
    }

    let err = app
        .execute(parse_command("receipt").expect("parse"))
        .expect_err("renderer fails");

    assert!(err.to_string().contains("printer offline"));
    assert_eq!(app.controller().current_step(), Step::Success);
    assert!(!dir.path().join("receipts").exists());
}

#[test]
fn cart_follows_selection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut app = app(dir.path().to_path_buf(), true);
    for line in ["school Twalumbu", "proceed", "details 977123456", "pay", "select C20012"] {
        run(&mut app, line);
    }
    run(&mut app, "fee C20012 3 1 2025");
    assert!(run(&mut app, "cart")
        .iter()
        .any(|line| line.contains("Grand total: ZMW 1,500.00")));

    let err = app
        .execute(parse_command("fee C30013 4 1 2025").expect("parse"))
        .expect_err("student not selected");
    assert!(err.to_string().contains("not in the cart"));

    run(&mut app, "home");
    assert_eq!(run(&mut app, "cart"), vec!["cart is empty".to_string()]);
}

#[test]
fn quit_asks_for_confirmation_mid_flow() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut app = app(dir.path().to_path_buf(), true);
    assert_eq!(run(&mut app, "quit"), vec!["<exit>".to_string()]);

    run(&mut app, "school Twalumbu Educational Center");
    run(&mut app, "proceed");
    let first = run(&mut app, "quit");
    assert!(first[0].contains("type 'quit' again"));
    assert_eq!(run(&mut app, "quit"), vec!["<exit>".to_string()]);
}

#[test]
fn tutorial_gates_commands() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut app = app(dir.path().to_path_buf(), false);
    assert!(app.banner().iter().any(|line| line.contains("tutorial")));

    let err = app
        .execute(parse_command("proceed").expect("parse"))
        .expect_err("gated");
    assert!(err.to_string().contains("tutorial"));

    let lines = run(&mut app, "tutorial");
    assert_eq!(lines, vec!["step=search direction=forward (from search)".to_string()]);
}

#[test]
fn back_reports_direction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut app = app(dir.path().to_path_buf(), true);
    run(&mut app, "school Twalumbu Educational Center");
    assert_eq!(
        run(&mut app, "proceed"),
        vec!["step=details direction=forward (from search)".to_string()]
    );
    assert_eq!(
        run(&mut app, "back"),
        vec!["step=search direction=back (from details)".to_string()]
    );
}
