use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use flow_core::{StudentDirectory, TUTORIAL_FLAG_KEY};
use storage::{
    search_schools, BusRoute, CanteenPlan, FeeSchedule, FilePreferences, SeededDirectory, Term,
};

#[derive(Parser, Debug)]
struct Cli {
    /// Defaults to the per-user data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Students {
        #[arg(long)]
        phone: String,
    },
    Schools {
        #[arg(long, default_value = "")]
        query: String,
    },
    Fees,
    ResetTutorial,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Students { phone } => {
            let directory = SeededDirectory::demo();
            let students = directory.students_for_phone(&phone);
            if students.is_empty() {
                println!("no students registered for {phone}");
            }
            if let Some(guardian) = directory.guardian_name(&phone) {
                println!("guardian: {guardian}");
            }
            for student in students {
                println!(
                    "{} {} ({}) balances={}",
                    student.id, student.name, student.grade, student.balances
                );
            }
        }
        Command::Schools { query } => {
            let schools = if query.trim().is_empty() {
                storage::SCHOOLS.to_vec()
            } else {
                search_schools(&query)
            };
            for school in schools {
                println!("{school}");
            }
        }
        Command::Fees => {
            let schedule = FeeSchedule::standard();
            for (grade, fee) in schedule.grades() {
                let terms: Vec<String> = Term::ALL.iter().map(Term::to_string).collect();
                println!("Grade {grade}: {fee} per term ({})", terms.join(", "));
            }
            for route in BusRoute::ALL {
                println!("School Bus ({}): {} per month", route.name(), route.monthly_fee());
            }
            for plan in CanteenPlan::ALL {
                println!("Canteen ({}): {} per month", plan.name(), plan.monthly_fee());
            }
            let years: Vec<String> = storage::catalog::YEARS.iter().map(u16::to_string).collect();
            println!("years: {}", years.join(", "));
        }
        Command::ResetTutorial => {
            let data_dir = match cli.data_dir {
                Some(dir) => dir,
                None => storage::default_data_dir()?,
            };
            let prefs = FilePreferences::open(&data_dir)?;
            if prefs.clear_flag(TUTORIAL_FLAG_KEY)? {
                println!("tutorial will show again ({})", prefs.path().display());
            } else {
                println!("tutorial flag was not set ({})", prefs.path().display());
            }
        }
    }

    Ok(())
}
