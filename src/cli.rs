//! Command-line interface definitions
//!
//! Arguments are organized by functional usage: each group carries the
//! options consumed by one component of the run.

use crate::acl::Role;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Role-based permission management for project storage trees
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Operation to perform
    #[command(subcommand)]
    pub command: Command,

    /// Output and logging configuration
    #[command(flatten)]
    pub output: OutputConfig,
}

/// Supported operations
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Grant roles to users on a project tree
    Set(SetArgs),
    /// List the projects where a user holds a role
    Show(ShowArgs),
}

/// Arguments of the `set` operation
#[derive(clap::Args, Debug, Clone)]
pub struct SetArgs {
    /// Project number (7+ leading digits) or path of the target tree
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Requested role bindings
    #[command(flatten)]
    pub roles: RoleSpecConfig,

    /// Target location configuration
    #[command(flatten)]
    pub location: LocationConfig,

    /// Run behavior configuration
    #[command(flatten)]
    pub run: RunConfig,
}

/// Per-role user lists
///
/// Used by: role specification parsing
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Role Assignments")]
pub struct RoleSpecConfig {
    /// Users to grant the manager role, comma-separated
    #[arg(short = 'm', long, value_name = "USERS", default_value = "")]
    pub manager: String,

    /// Users to grant the contributor role, comma-separated
    #[arg(short = 'c', long, value_name = "USERS", default_value = "")]
    pub contributor: String,

    /// Users to grant the writer role, comma-separated
    #[arg(short = 'w', long, value_name = "USERS", default_value = "")]
    pub writer: String,

    /// Users to grant the viewer role, comma-separated
    #[arg(short = 'u', long, value_name = "USERS", default_value = "")]
    pub viewer: String,
}

impl RoleSpecConfig {
    /// Pair each assignable role with its raw user list.
    #[must_use]
    pub fn specs(&self) -> Vec<(Role, &str)> {
        vec![
            (Role::Manager, self.manager.as_str()),
            (Role::Contributor, self.contributor.as_str()),
            (Role::Writer, self.writer.as_str()),
            (Role::Viewer, self.viewer.as_str()),
        ]
    }
}

/// Target location configuration
///
/// Used by: target resolution
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Location Options")]
pub struct LocationConfig {
    /// Root path of the project storage
    #[arg(short = 'd', long, value_name = "DIR", default_value = "/project")]
    pub base: PathBuf,

    /// Subdirectory inside the project to operate on
    #[arg(short = 'p', long, value_name = "PATH", default_value = "")]
    pub sub_path: String,
}

/// Run behavior configuration
///
/// Used by: the run orchestrator
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Run Options")]
#[allow(clippy::struct_excessive_bools)]
pub struct RunConfig {
    /// Number of concurrent worker threads per stage
    #[arg(short = 'n', long, value_name = "N", default_value_t = default_threads())]
    pub threads: usize,

    /// Apply roles even when the target already carries them
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Follow symlinks during tree enumeration
    #[arg(short = 'l', long)]
    pub follow_links: bool,

    /// Skip traverse-permission backfill on parent directories
    #[arg(long)]
    pub no_traverse: bool,

    /// Resolve and report changes without touching the storage
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments of the `show` operation
#[derive(clap::Args, Debug, Clone)]
pub struct ShowArgs {
    /// User to look up
    #[arg(value_name = "USER")]
    pub user: String,

    /// Root path of the project storage
    #[arg(short = 'd', long, value_name = "DIR", default_value = "/project")]
    pub base: PathBuf,

    /// Number of concurrent scan threads
    #[arg(short = 'n', long, value_name = "N", default_value_t = default_threads())]
    pub threads: usize,
}

/// Output and logging configuration
///
/// Used by: `main()`, logging initialization, progress display
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Output Options")]
pub struct OutputConfig {
    /// Verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Replace per-path output with a progress counter
    #[arg(short, long, global = true)]
    pub silent: bool,
}

fn default_threads() -> usize {
    num_cpus::get().max(1)
}

impl Cli {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Thread count is outside valid bounds (1-256)
    /// - Both --silent and --verbose options are used
    pub fn validate(&self) -> Result<()> {
        let threads = match &self.command {
            Command::Set(args) => args.run.threads,
            Command::Show(args) => args.threads,
        };
        if threads < 1 || threads > 256 {
            anyhow::bail!("Thread count must be between 1 and 256, got: {threads}");
        }

        if self.output.silent && self.output.verbose > 0 {
            anyhow::bail!("Cannot use both --silent and --verbose options");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn set_defaults() {
        let cli = parse(&["prjacl", "set", "3010000.01", "-c", "alice,bob"]);
        let Command::Set(args) = cli.command else {
            panic!("expected the set command");
        };
        assert_eq!(args.target, "3010000.01");
        assert_eq!(args.roles.contributor, "alice,bob");
        assert_eq!(args.location.base, PathBuf::from("/project"));
        assert!(!args.run.no_traverse);
        assert!(!args.run.dry_run);
        assert!(args.run.threads >= 1);
    }

    #[test]
    fn role_specs_cover_all_assignable_roles() {
        let cli = parse(&["prjacl", "set", "x", "-m", "a", "-w", "b", "-u", "c"]);
        let Command::Set(args) = cli.command else {
            panic!("expected the set command");
        };
        let specs = args.roles.specs();
        assert_eq!(specs.len(), 4);
        assert!(specs.contains(&(Role::Manager, "a")));
        assert!(specs.contains(&(Role::Writer, "b")));
        assert!(specs.contains(&(Role::Viewer, "c")));
        assert!(specs.contains(&(Role::Contributor, "")));
    }

    #[test]
    fn show_takes_a_user_and_base() {
        let cli = parse(&["prjacl", "show", "alice", "-d", "/data/project"]);
        let Command::Show(args) = cli.command else {
            panic!("expected the show command");
        };
        assert_eq!(args.user, "alice");
        assert_eq!(args.base, PathBuf::from("/data/project"));
    }

    #[test]
    fn validate_rejects_bad_thread_counts() {
        let cli = parse(&["prjacl", "set", "x", "-n", "0"]);
        assert!(cli.validate().is_err());
        let cli = parse(&["prjacl", "set", "x", "-n", "300"]);
        assert!(cli.validate().is_err());
        let cli = parse(&["prjacl", "set", "x", "-n", "8"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn validate_rejects_silent_with_verbose() {
        let cli = parse(&["prjacl", "-s", "-v", "set", "x"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn global_output_flags_apply_after_subcommand() {
        let cli = parse(&["prjacl", "set", "x", "-s"]);
        assert!(cli.output.silent);
    }
}
