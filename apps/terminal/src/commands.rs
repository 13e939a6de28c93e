//! Line commands typed at the `master-fees>` prompt.

use anyhow::{anyhow, bail, Context, Result};
use shared::{
    domain::{ServiceId, StudentId},
    records::Money,
};
use storage::{BusRoute, CanteenPlan, Term};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Show,
    Log,
    Tutorial,
    Search(String),
    School(String),
    Proceed,
    Details { phone: String, name: String },
    History,
    Receipts(StudentId),
    Pay,
    Select(Vec<StudentId>),
    Fee {
        student: StudentId,
        grade: u8,
        term: Term,
        year: u16,
    },
    Extras {
        student: StudentId,
        month: String,
        bus: Option<BusRoute>,
        canteen: Option<CanteenPlan>,
    },
    Remove(ServiceId),
    Cart,
    Checkout,
    /// Without an amount the cart total is confirmed.
    Confirm(Option<Money>),
    Submit,
    Succeed,
    Fail,
    Receipt,
    Home,
    Retry,
    Next,
    Back,
    Forward,
}

pub const HELP: &str = "\
commands:
  search <query>                    suggest schools
  school <name>                     choose a school (blank clears)
  proceed                           continue to details
  details <phone> [name]            identify the guardian
  history | receipts <student-id>   payment history and receipts
  pay                               start paying fees
  select <student-id>...            choose students
  fee <student-id> <grade> <term> <year>
  extras <student-id> <month> [bus=<route>] [canteen=<plan>]
  remove <service-id> | cart        edit and review the cart
  checkout | confirm [amount]       check out and confirm the total
  submit | succeed | fail           drive the payment
  receipt                           save the receipt
  home | retry | next | back | forward
  show | log | tutorial | help | quit";

/// Parses kwacha with up to two decimals, e.g. `1500` or `1,500.50`.
pub fn parse_amount(raw: &str) -> Result<Money> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("ZMW")
        .trim_start_matches('K')
        .trim()
        .chars()
        .filter(|ch| *ch != ',')
        .collect();
    let (whole, fraction) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));
    if whole.is_empty() || fraction.len() > 2 {
        bail!("invalid amount '{raw}'");
    }
    let whole: u64 = whole
        .parse()
        .with_context(|| format!("invalid amount '{raw}'"))?;
    let minor: u64 = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<2}")
            .parse()
            .with_context(|| format!("invalid amount '{raw}'"))?
    };
    whole
        .checked_mul(100)
        .and_then(|major| major.checked_add(minor))
        .map(Money)
        .ok_or_else(|| anyhow!("amount '{raw}' is too large"))
}

fn student_arg(args: &[&str], idx: usize, usage: &str) -> Result<StudentId> {
    args.get(idx)
        .map(|id| StudentId::new(*id))
        .ok_or_else(|| anyhow!("usage: {usage}"))
}

pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "show" => Command::Show,
        "log" => Command::Log,
        "tutorial" => Command::Tutorial,
        "search" => Command::Search(rest.to_string()),
        "school" => Command::School(rest.to_string()),
        "proceed" => Command::Proceed,
        "details" => {
            let phone = args
                .first()
                .ok_or_else(|| anyhow!("usage: details <phone> [name]"))?;
            Command::Details {
                phone: phone.to_string(),
                name: args[1..].join(" "),
            }
        }
        "history" => Command::History,
        "receipts" => Command::Receipts(student_arg(&args, 0, "receipts <student-id>")?),
        "pay" => Command::Pay,
        "select" => Command::Select(args.iter().map(|id| StudentId::new(*id)).collect()),
        "fee" => {
            const USAGE: &str = "fee <student-id> <grade> <term> <year>";
            if args.len() != 4 {
                bail!("usage: {USAGE}");
            }
            Command::Fee {
                student: student_arg(&args, 0, USAGE)?,
                grade: args[1]
                    .trim_start_matches("grade-")
                    .parse()
                    .with_context(|| format!("invalid grade '{}'", args[1]))?,
                term: args[2].parse()?,
                year: args[3]
                    .parse()
                    .with_context(|| format!("invalid year '{}'", args[3]))?,
            }
        }
        "extras" => {
            const USAGE: &str = "extras <student-id> <month> [bus=<route>] [canteen=<plan>]";
            let student = student_arg(&args, 0, USAGE)?;
            let month = args
                .get(1)
                .ok_or_else(|| anyhow!("usage: {USAGE}"))?
                .to_string();
            let mut bus = None;
            let mut canteen = None;
            for option in &args[2..] {
                match option.split_once('=') {
                    Some(("bus", route)) => bus = Some(route.parse()?),
                    Some(("canteen", plan)) => canteen = Some(plan.parse()?),
                    _ => bail!("unknown option '{option}'; usage: {USAGE}"),
                }
            }
            Command::Extras {
                student,
                month,
                bus,
                canteen,
            }
        }
        "remove" => {
            let id = args
                .first()
                .ok_or_else(|| anyhow!("usage: remove <service-id>"))?;
            Command::Remove(ServiceId::new(*id))
        }
        "cart" => Command::Cart,
        "checkout" => Command::Checkout,
        "confirm" => match args.first() {
            Some(amount) => Command::Confirm(Some(parse_amount(amount)?)),
            None => Command::Confirm(None),
        },
        "submit" => Command::Submit,
        "succeed" => Command::Succeed,
        "fail" => Command::Fail,
        "receipt" => Command::Receipt,
        "home" => Command::Home,
        "retry" => Command::Retry,
        "next" => Command::Next,
        "back" => Command::Back,
        "forward" => Command::Forward,
        "" => bail!("empty command; type 'help'"),
        other => bail!("unknown command '{other}'; type 'help'"),
    };
    Ok(command)
}
