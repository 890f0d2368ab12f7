mod cli;
mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{mpsc, Arc};

use chrono::{DateTime, Local, TimeZone};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use screensweep::state::StateStore;
use screensweep::{
    schedule, utils, DestinationSetting, ScheduleSpec, Scheduler, Settings, SweepError,
    SweepResult, Sweeper,
};

use cli::{Cli, Command, MatchArgs};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn format_instant<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%d %H:%M %Z").to_string()
}

fn apply_match_args(settings: &mut Settings, args: &MatchArgs) {
    if let Some(dir) = &args.dir {
        settings.watch_dir = Some(dir.clone());
    }
    if let Some(prefix) = &args.prefix {
        settings.prefix = prefix.clone();
    }
    if args.ignore_case {
        settings.case_sensitive = false;
    }
}

fn open_sweeper(settings: Settings, settings_path: Option<&Path>) -> SweepResult<Sweeper> {
    let store = match settings_path {
        Some(path) => StateStore::load(&StateStore::path_beside(path))?,
        None => StateStore::in_memory(),
    };
    Ok(Sweeper::new(settings, store))
}

fn print_preview(sweeper: &Sweeper) {
    let settings = sweeper.settings();
    let dir = settings
        .resolved_watch_dir()
        .map(|d| utils::display_path(&d))
        .unwrap_or_else(|| "<unknown>".to_string());
    output::print_scan_header(&format!("Matches for '{}' in {dir}", settings.prefix));

    let scan = sweeper.preview();
    if let Some(err) = &scan.unreadable {
        output::print_warning(&err.to_string());
        output::print_permission_hint();
        return;
    }

    let mut total = 0u64;
    for candidate in &scan.entries {
        let size = utils::file_size(&candidate.path);
        total += size;
        output::print_scan_entry(&utils::display_path(&candidate.path), &utils::format_size(size));
    }
    output::print_match_total(scan.len(), &utils::format_size(total));
}

fn watch(sweeper: Sweeper) -> SweepResult<()> {
    let sweeper = Arc::new(sweeper);
    let scheduler = Scheduler::new()?;

    match sweeper.arm(&scheduler.handle()) {
        Some(next) => output::print_info(&format!("Next cleanup at {}", format_instant(&next))),
        None => {
            output::print_warning("Scheduled cleanup is disabled in settings.");
            return Ok(());
        }
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| SweepError::Io(std::io::Error::other(e)))?;

    let _ = rx.recv();
    tracing::info!("Shutting down");
    scheduler.shutdown();
    Ok(())
}

fn run(cli: Cli) -> SweepResult<ExitCode> {
    let settings_path: Option<PathBuf> = cli.config.clone().or_else(Settings::default_path);
    let mut settings = match &settings_path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Command::Preview { matching } => {
            apply_match_args(&mut settings, &matching);
            let sweeper = open_sweeper(settings, None)?;
            print_preview(&sweeper);
        }

        Command::Clean {
            matching,
            to_folder,
            trash,
            confirm,
        } => {
            apply_match_args(&mut settings, &matching);
            if trash {
                settings.destination = DestinationSetting::Trash;
            } else if let Some(path) = to_folder {
                settings.destination = DestinationSetting::Folder { path };
            }
            let sweeper = open_sweeper(settings, settings_path.as_deref())?;

            if !confirm {
                output::print_no_confirm_warning();
                print_preview(&sweeper);
                output::print_dry_run_footer();
                return Ok(ExitCode::SUCCESS);
            }

            let destination = sweeper.destination();
            match sweeper.clean_now() {
                Ok(result) => output::print_clean_complete(
                    result.cleaned,
                    result.skipped,
                    &destination.label(),
                ),
                Err(e @ SweepError::PermissionDenied { .. }) => {
                    output::print_error(&e.to_string());
                    output::print_permission_hint();
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e),
            }
        }

        Command::NextRun { at } => {
            let spec = match at {
                Some(at) => at.parse::<ScheduleSpec>()?,
                None => settings.cleanup_time,
            };
            let next = schedule::next_run(spec.into(), &Local::now(), &Local);
            println!("{}", format_instant(&next));
        }

        Command::Status => {
            let sweeper = open_sweeper(settings, settings_path.as_deref())?;
            let settings = sweeper.settings();
            let state = sweeper.run_state();

            output::print_banner();
            output::print_scan_header("Settings");
            output::print_summary_row("Enabled", &settings.enabled.to_string());
            output::print_summary_row("Time", &settings.cleanup_time.to_string());
            output::print_summary_row("Prefix", &settings.prefix);
            output::print_summary_row("Case-sensitive", &settings.case_sensitive.to_string());
            output::print_summary_row("Destination", &sweeper.destination().label());
            println!();
            output::print_scan_header("Activity");
            output::print_summary_row("Total cleaned", &state.total_cleaned.to_string());
            let last_run = state
                .last_run
                .map(|t| format_instant(&t.with_timezone(&Local)))
                .unwrap_or_else(|| "Never".to_string());
            output::print_summary_row("Last run", &last_run);
            let next_run = sweeper
                .next_run_in(&Local)
                .map(|t| format_instant(&t))
                .unwrap_or_else(|| "Disabled".to_string());
            output::print_summary_row("Next run", &next_run);
            if let Some(previous) = sweeper.previous_run_in(&Local) {
                output::print_summary_row("Last scheduled slot", &format_instant(&previous));
            }
            output::print_summary_row("Waiting now", &sweeper.preview().len().to_string());
        }

        Command::Set {
            at,
            enabled,
            prefix,
            case_sensitive,
            destination,
        } => {
            let Some(path) = settings_path else {
                return Err(SweepError::Config {
                    path: PathBuf::from("settings.toml"),
                    message: "no config directory; pass --config".to_string(),
                });
            };
            if let Some(at) = at {
                settings.cleanup_time = at.parse()?;
            }
            if let Some(enabled) = enabled {
                settings.enabled = enabled;
            }
            if let Some(prefix) = prefix {
                settings.prefix = prefix;
            }
            if let Some(case_sensitive) = case_sensitive {
                settings.case_sensitive = case_sensitive;
            }
            if let Some(destination) = destination {
                settings.destination = if destination.eq_ignore_ascii_case("trash") {
                    DestinationSetting::Trash
                } else {
                    DestinationSetting::Folder {
                        path: PathBuf::from(destination),
                    }
                };
            }
            settings.save(&path)?;
            output::print_info(&format!("Saved {}", utils::display_path(&path)));
        }

        Command::Watch => {
            let sweeper = open_sweeper(settings, settings_path.as_deref())?;
            watch(sweeper)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
