pub mod calendar;
pub mod daemon_path;
pub mod habits;
pub mod process;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use calendar::{process_calendar_command, CalendarCommand};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use habits::{parse_weekday, NotificationsAction};
use process::{daemon_executable, kill_previous_servers, restart_server};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{
        start_daemon,
        storage::{entities::ReminderTime, habit_storage::JsonHabitStorage},
        DATA_DIR,
    },
    notification::{GenericNotificationBackend, NotificationBridge},
    tracker::HabitTracker,
    utils::{
        clock::DefaultClock,
        dir::prepare_application_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "habitrack", version, long_about = None)]
#[command(about = "Track daily habits and get reminded about them", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon that sends daily reminders")]
    Init {},
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Run a daemon directly in current console. Used for debugging")]
    Serve {},
    #[command(about = "Add a habit")]
    Add {
        name: String,
        #[arg(
            long,
            value_delimiter = ',',
            value_parser = parse_weekday,
            help = "Days the habit is due on, for example mon,wed,fri or 1,3,5. Daily when omitted"
        )]
        days: Vec<u8>,
    },
    #[command(about = "List all habits")]
    List {},
    #[command(about = "Show habits due today")]
    Today {},
    #[command(about = "Mark a habit as done")]
    Done {
        #[arg(help = "Habit id or name")]
        habit: String,
        #[arg(long, help = "Day in YYYY-MM-DD format. Today by default")]
        date: Option<NaiveDate>,
    },
    #[command(about = "Mark a habit as not done")]
    Undo {
        #[arg(help = "Habit id or name")]
        habit: String,
        #[arg(long, help = "Day in YYYY-MM-DD format. Today by default")]
        date: Option<NaiveDate>,
    },
    #[command(about = "Flip today's state of a habit")]
    Toggle {
        #[arg(help = "Habit id or name")]
        habit: String,
    },
    #[command(about = "Display a monthly calendar of completed days")]
    Calendar {
        #[command(flatten)]
        command: CalendarCommand,
    },
    #[command(about = "Show or change the time of the daily reminder")]
    Remind {
        #[arg(help = "New reminder time in HH:MM format")]
        time: Option<ReminderTime>,
    },
    #[command(about = "Enable, disable or check reminder notifications")]
    Notifications {
        #[arg(value_enum, default_value_t = NotificationsAction::Status)]
        action: NotificationsAction,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = prepare_application_path(args.dir)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => restart_server(Some(&app_dir)),
        Commands::Stop {} => {
            let stopped = kill_previous_servers(&daemon_executable()?)?;
            println!("Stopped {stopped} daemon(s)");
            Ok(())
        }
        Commands::Serve {} => start_daemon(app_dir).await,
        command => {
            let storage = Arc::new(JsonHabitStorage::new(app_dir.join(DATA_DIR))?);
            run_habit_command(storage, command).await
        }
    }
}

async fn run_habit_command(storage: Arc<JsonHabitStorage>, command: Commands) -> Result<()> {
    let tracker = HabitTracker::new(storage.clone(), Arc::new(DefaultClock));
    match command {
        Commands::Add { name, days } => habits::add_habit(&tracker, &name, days).await,
        Commands::List {} => habits::list_habits(&tracker).await,
        Commands::Today {} => habits::show_today(&tracker).await,
        Commands::Done { habit, date } => habits::set_done(&tracker, &habit, date, true).await,
        Commands::Undo { habit, date } => habits::set_done(&tracker, &habit, date, false).await,
        Commands::Toggle { habit } => habits::toggle_today(&tracker, &habit).await,
        Commands::Calendar { command } => process_calendar_command(&tracker, command).await,
        Commands::Remind { time } => habits::remind(&tracker, time).await,
        Commands::Notifications { action } => {
            let bridge =
                NotificationBridge::new(storage, Arc::new(GenericNotificationBackend::new()));
            habits::notifications(&bridge, action).await
        }
        Commands::Init {} | Commands::Stop {} | Commands::Serve {} => Ok(()),
    }
}
