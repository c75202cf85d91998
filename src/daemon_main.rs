use std::env::args;

use anyhow::Result;
use clap::Parser;
use habitrack::{
    daemon::{args::DaemonArgs, start_daemon},
    utils::{
        dir::prepare_application_path,
        logging::{enable_logging, DAEMON_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> Result<()> {
    run_service(args().collect::<Vec<_>>())
}

fn run_service(command_args: Vec<String>) -> Result<()> {
    let args = DaemonArgs::parse_from(&command_args);

    #[cfg(unix)]
    if !args.force {
        use daemonize::Daemonize;

        let daemonize = Daemonize::new()
            .stdout(daemonize::Stdio::devnull())
            .stderr(daemonize::Stdio::devnull())
            .execute();
        match daemonize {
            daemonize::Outcome::Parent(parent) => {
                parent?;
                println!("Created daemon");
                return Ok(());
            }
            daemonize::Outcome::Child(child) => {
                child?;
            }
        }
    }

    run(args)
}

fn run(args: DaemonArgs) -> Result<()> {
    let app_dir = prepare_application_path(args.dir)?;
    enable_logging(DAEMON_PREFIX, &app_dir, args.log, args.log_console)?;
    single_thread_runtime()?.block_on(async move { start_daemon(app_dir).await })?;
    Ok(())
}
