//! prjacl - Role-Based Permission Management for Project Storage
//!
//! Entry point for the CLI application. On a successful run (or when there
//! is nothing to do) the process exits 0; fatal setup failures exit 1; a
//! run stopped by a termination signal exits with the signal number.

use anyhow::{Context, Result};
use clap::Parser;
use prjacl::acl::roler::{Backends, MemoryRoler};
use prjacl::acl;
use prjacl::cancel::CancelFlag;
use prjacl::cli::{Cli, Command, SetArgs, ShowArgs};
use prjacl::context::resolve_target;
use prjacl::engine::{run_set, RunOutcome, SetRequest};
use prjacl::error::Error;
use prjacl::show::run_show;
use prjacl::userdb;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.output.verbose);

    if let Err(e) = cli.validate() {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // A signal stop is reported through the exit status, the way
            // batch schedulers expect it.
            if let Some(Error::Interrupted { signal }) = e.downcast_ref::<Error>() {
                warn!(signal, "stopped by signal");
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                return ExitCode::from(*signal as u8);
            }
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let cancel = CancelFlag::new();
    cancel
        .register_signals()
        .context("Failed to register signal handlers")?;

    match &cli.command {
        Command::Set(args) => run_set_command(args, cli.output.silent, &cancel),
        Command::Show(args) => run_show_command(args, &cancel),
    }
}

fn run_set_command(args: &SetArgs, silent: bool, cancel: &CancelFlag) -> Result<()> {
    let operator = userdb::current_username();
    let (roles, traverse_users) = acl::parse_role_spec(&args.roles.specs(), &operator)?;

    let target = resolve_target(&args.target, &args.location.base, &args.location.sub_path)?;
    info!(root = %target.root.display(), "operating on");

    let backends = if args.run.dry_run {
        info!("dry run: changes are resolved against an in-memory store");
        Backends::memory(MemoryRoler::new())
    } else {
        Backends::live()
    };

    let request = SetRequest {
        roles,
        traverse_users,
        base: args.location.base.clone(),
        propagate: !args.run.no_traverse,
        force: args.run.force,
        follow_links: args.run.follow_links,
        threads: args.run.threads,
        silent,
    };

    match run_set(&target, &request, &backends, cancel)? {
        RunOutcome::Completed(summary) if summary.errors > 0 => {
            warn!(errors = summary.errors, "run completed with skipped paths");
            Ok(())
        }
        RunOutcome::Completed(_) | RunOutcome::NothingToDo => Ok(()),
    }
}

fn run_show_command(args: &ShowArgs, cancel: &CancelFlag) -> Result<()> {
    let backends = Backends::live();
    let memberships = run_show(&args.user, &args.base, args.threads, &backends, cancel)?;
    for membership in &memberships {
        println!("{}: {}", membership.project, membership.role);
    }
    if memberships.is_empty() {
        info!(user = %args.user, "no project roles found");
    }
    Ok(())
}

fn setup_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::new("prjacl=info,warn"),
        1 => EnvFilter::new("prjacl=debug,warn"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
