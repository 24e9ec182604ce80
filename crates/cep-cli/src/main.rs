mod report;
mod roster;

use std::path::{Path, PathBuf};
use std::time::Duration;

use cep_core::{ExactConfig, Mode, OptimizeConfig, Optimizer, RateSchedule};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use roster::Roster;

#[derive(Parser)]
#[command(name = "cep-optimizer")]
#[command(about = "Group schools to maximize CEP meal reimbursement", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find a grouping of the schools in a roster
    Optimize {
        /// CSV roster with ISP and enrollment columns
        file: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ModeArg::Greedy)]
        mode: ModeArg,
        /// Group count; the greedy floor, or the exact number of groups
        #[arg(short, long)]
        groups: Option<usize>,
        /// Only optimize schools of this district
        #[arg(long)]
        lea: Option<String>,
        #[arg(short, long, value_enum, default_value_t = ScheduleArg::TwoBranch)]
        schedule: ScheduleArg,
        /// Wall-clock budget for exact mode, in seconds
        #[arg(long, default_value_t = 60)]
        time_limit: u64,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },
    /// List the districts in a roster
    Leas {
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Greedy,
    Exact,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Greedy => Mode::Greedy,
            ModeArg::Exact => Mode::Exact,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScheduleArg {
    TwoBranch,
    ThreeBranch,
    Coverage,
}

impl From<ScheduleArg> for RateSchedule {
    fn from(arg: ScheduleArg) -> Self {
        match arg {
            ScheduleArg::TwoBranch => RateSchedule::TwoBranch,
            ScheduleArg::ThreeBranch => RateSchedule::ThreeBranch,
            ScheduleArg::Coverage => RateSchedule::Coverage,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

fn load_roster(file: &Path) -> Roster {
    match Roster::load(file) {
        Ok(roster) => roster,
        Err(e) => {
            eprintln!("Error loading {}: {}", file.display(), e);
            std::process::exit(1);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize {
            file,
            mode,
            groups,
            lea,
            schedule,
            time_limit,
            format,
        } => {
            let roster = load_roster(&file);
            let schools = match lea {
                Some(ref name) => match roster.for_lea(name) {
                    Ok(schools) => schools,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                },
                None => roster.into_schools(),
            };

            tracing::info!(schools = schools.len(), lea = lea.as_deref(), "optimizing roster");

            let config = OptimizeConfig::default()
                .with_schedule(schedule.into())
                .with_exact(ExactConfig::default().with_time_limit(Some(Duration::from_secs(time_limit))));
            let optimizer = Optimizer::new(config);

            let result = match optimizer.optimize(&schools, mode.into(), groups) {
                Ok(result) => result,
                Err(e) => {
                    eprintln!("Optimization failed: {}", e);
                    std::process::exit(1);
                }
            };

            let rendered = match format {
                Format::Pretty => report::render_pretty(&result).map_err(|e| e.to_string()),
                Format::Json => report::render_json(&result).map_err(|e| e.to_string()),
            };
            match rendered {
                Ok(text) => println!("{}", text.trim_end()),
                Err(e) => {
                    eprintln!("Error rendering result: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Leas { file } => {
            let roster = load_roster(&file);
            let leas = roster.leas();
            if leas.is_empty() {
                eprintln!("{} has no district column or no district values", file.display());
                std::process::exit(1);
            }
            for (i, lea) in leas.iter().enumerate() {
                let count = roster.schools().iter().filter(|s| &s.district == lea).count();
                println!("{:>3}. {} ({} schools)", i + 1, lea, count);
            }
        }
    }
}
