mod api;
mod profile;
mod schedule;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::api::{ApiServer, ApiServerConfig};
use crate::profile::codec::SleepLevel;
use crate::profile::model::Stage;
use crate::profile::remote::HttpProfileStore;
use crate::profile::session::{ProfileSession, SessionSnapshot};
use crate::profile::store::{FileProfileStore, ProfileStore};
use crate::schedule::time_of_day::TimeOfDay;
use crate::schedule::window::{ScheduleValidity, evaluate, format_duration};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliStage {
    Initial,
    Mid,
    Final,
}

impl From<CliStage> for Stage {
    fn from(value: CliStage) -> Self {
        match value {
            CliStage::Initial => Stage::Initial,
            CliStage::Mid => Stage::MidStage,
            CliStage::Final => Stage::Final,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "sleepcurve",
    version,
    about = "Nightly thermal comfort schedule editor"
)]
struct Cli {
    /// JSON file backing the profile store.
    #[arg(long, global = true, default_value = "sleep_profile.json")]
    profile: PathBuf,

    /// Base URL of a running `sleepcurve serve`; replaces the file store.
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a bed/wake pair and print the stage transitions.
    Evaluate {
        #[arg(long)]
        bed: TimeOfDay,
        #[arg(long)]
        wake: TimeOfDay,
    },
    /// Print the stored profile (or the defaults).
    Show,
    /// Edit fields of the profile and save it.
    Set(SetArgs),
    /// Nudge one sleep level by whole steps, clamped to [-10, 10], and save.
    Adjust {
        #[arg(long, value_enum)]
        stage: CliStage,
        #[arg(long, allow_hyphen_values = true)]
        steps: i32,
    },
    /// Remove the stored profile.
    Delete {
        #[arg(long)]
        yes: bool,
    },
    /// Serve the file-backed profile store over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        api_bind: String,
        #[arg(long, default_value_t = 8099)]
        api_port: u16,
    },
}

#[derive(Args, Debug)]
struct SetArgs {
    #[arg(long)]
    bed: Option<String>,
    #[arg(long)]
    wake: Option<String>,
    #[arg(long)]
    timezone: Option<String>,
    #[arg(long, allow_hyphen_values = true, value_parser = level_parser())]
    initial: Option<i8>,
    #[arg(long, allow_hyphen_values = true, value_parser = level_parser())]
    mid: Option<i8>,
    #[arg(long = "final", allow_hyphen_values = true, value_parser = level_parser())]
    final_level: Option<i8>,
}

fn level_parser() -> clap::builder::RangedI64ValueParser<i8> {
    clap::value_parser!(i8).range(-10..=10)
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Command::Evaluate { bed, wake } => {
            let validity = evaluate(bed, wake);
            print_validity(&validity);
            if let Some(reason) = validity.invalid_reason() {
                bail!("{reason}");
            }
            Ok(())
        }
        Command::Show => {
            let session = ProfileSession::load(open_store(&cli.profile, cli.remote.as_deref())?);
            print_snapshot(&session.snapshot());
            Ok(())
        }
        Command::Set(args) => {
            let session = ProfileSession::load(open_store(&cli.profile, cli.remote.as_deref())?);
            apply_edits(&session, args)?;
            session.submit().context("failed to save profile")?;
            println!("Profile saved.");
            print_snapshot(&session.snapshot());
            Ok(())
        }
        Command::Adjust { stage, steps } => {
            let session = ProfileSession::load(open_store(&cli.profile, cli.remote.as_deref())?);
            let level = session.adjust_level(stage.into(), steps);
            session.submit().context("failed to save profile")?;
            println!("{stage:?} sleep level is now {level}.");
            Ok(())
        }
        Command::Delete { yes } => {
            if !yes {
                bail!("refusing to delete the profile without --yes");
            }
            let session = ProfileSession::load(open_store(&cli.profile, cli.remote.as_deref())?);
            session.delete().context("failed to delete profile")?;
            println!("Profile deleted; defaults restored.");
            print_snapshot(&session.snapshot());
            Ok(())
        }
        Command::Serve { api_bind, api_port } => {
            let store = Arc::new(FileProfileStore::new(cli.profile.clone()));
            let served_path = store.path().display().to_string();
            let server = ApiServer::start(
                ApiServerConfig {
                    bind_addr: api_bind.clone(),
                    port: api_port,
                },
                store,
            )
            .with_context(|| format!("failed to start profile API at {api_bind}:{api_port}"))?;
            println!(
                "Serving {served_path} on http://{}",
                server
                    .local_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|| format!("{api_bind}:{api_port}"))
            );
            server.wait();
            Ok(())
        }
    }
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_store(path: &Path, remote: Option<&str>) -> Result<Arc<dyn ProfileStore>> {
    match remote {
        Some(base_url) => {
            let store = HttpProfileStore::new(base_url)
                .with_context(|| format!("failed to reach profile store at {base_url}"))?;
            debug!(url = store.profile_url(), "using remote profile store");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(FileProfileStore::new(path))),
    }
}

fn apply_edits(session: &ProfileSession, args: SetArgs) -> Result<()> {
    if let Some(bed) = args.bed {
        session.set_bed_time(&bed).context("invalid --bed")?;
    }
    if let Some(wake) = args.wake {
        session.set_wake_time(&wake).context("invalid --wake")?;
    }
    if let Some(timezone) = args.timezone {
        timezone
            .parse::<Tz>()
            .map_err(|err| anyhow::anyhow!("unknown timezone '{timezone}': {err}"))?;
        session.set_timezone(timezone);
    }
    for (stage, value) in [
        (Stage::Initial, args.initial),
        (Stage::MidStage, args.mid),
        (Stage::Final, args.final_level),
    ] {
        if let Some(value) = value {
            session.set_level(stage, SleepLevel::new(f64::from(value)));
        }
    }
    Ok(())
}

fn print_validity(validity: &ScheduleValidity) {
    match validity {
        ScheduleValidity::Valid {
            duration_minutes,
            stages,
        } => {
            println!("Sleep duration: {}", format_duration(*duration_minutes));
            println!("Mid-stage transition: {}", stages.mid_stage);
            println!("Final-stage transition: {}", stages.final_stage);
        }
        ScheduleValidity::Invalid { reason } => {
            println!("Invalid schedule: {reason}");
        }
    }
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    let profile = &snapshot.profile;
    println!(
        "Existing profile: {}",
        if snapshot.existing { "yes" } else { "no" }
    );
    println!("Bed time: {}", profile.bed_time);
    println!("Wake time: {}", profile.wakeup_time);
    println!("Timezone: {}", profile.timezone);
    for (label, stage) in [
        ("Initial", Stage::Initial),
        ("Mid-stage", Stage::MidStage),
        ("Final", Stage::Final),
    ] {
        println!("{label} sleep level: {}", profile.level(stage));
    }
    if snapshot.dirty {
        println!("Unsaved changes: yes");
    }
    print_validity(&snapshot.validity);
}
