//! `dotstate` command-line entry point.
use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::io::Write as _;

use dotstate::cli::{self, Command, SecretCommand};
use dotstate::commands::{self, CommandSetup};
use dotstate::config::Dirs;
use dotstate::exec::HostRunner;
use dotstate::logging::{self, Logger};
use dotstate::reconcile::CancelToken;
use dotstate::secret::TerminalPrompt;

const fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Apply(_) => "apply",
        Command::Verify(_) => "verify",
        Command::Dump(_) => "dump",
        Command::Unmanaged => "unmanaged",
        Command::Secret(_) => "secret",
        Command::Completion(_) => "completion",
        Command::Version => "version",
    }
}

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    let mut stdout = std::io::stdout().lock();

    match &args.command {
        Command::Version => return Ok(commands::version::run(&mut stdout)?),
        Command::Completion(opts) => {
            clap_complete::generate(opts.shell, &mut cli::Cli::command(), "dotstate", &mut stdout);
            return Ok(());
        }
        _ => {}
    }

    let name = command_name(&args.command);
    logging::init_subscriber(args.verbose, name);
    let log = Logger::new(name);
    let cancel = CancelToken::new();
    if let Err(e) = cancel.cancel_on_ctrlc() {
        log.debug(&format!("cannot install Ctrl-C handler: {e}"));
    }

    match &args.command {
        Command::Apply(opts) => {
            let setup = CommandSetup::init(&args.global, &log)?;
            commands::apply::run(&setup, opts, &log, &cancel)?;
        }
        Command::Verify(opts) => {
            let setup = CommandSetup::init(&args.global, &log)?;
            if !commands::verify::run(&setup, opts, &log, &cancel)? {
                stdout.flush()?;
                std::process::exit(1);
            }
        }
        Command::Dump(opts) => {
            let setup = CommandSetup::init(&args.global, &log)?;
            commands::dump::run(&setup, opts, &cancel, &mut stdout)?;
        }
        Command::Unmanaged => {
            let setup = CommandSetup::init(&args.global, &log)?;
            commands::unmanaged::run(&setup, &mut stdout)?;
        }
        Command::Secret(SecretCommand::Keepassxc(opts)) => {
            let config = commands::load_config(&args.global, &Dirs::from_env()?)?;
            commands::secret::run_keepassxc(
                &config,
                opts,
                &HostRunner,
                Box::new(TerminalPrompt),
                &mut stdout,
            )?;
        }
        Command::Completion(_) | Command::Version => {}
    }
    Ok(())
}
