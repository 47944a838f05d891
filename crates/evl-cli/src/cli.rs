use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "evl",
    about = "Event Ledger: hash-chained, append-only event store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Ledger directory; created on first use.
    #[arg(long, global = true, default_value = ".evl")]
    pub data_dir: PathBuf,

    /// TOML file with ledger settings.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show event count, tail id and tail hash
    Status,
    /// List subjects, optionally under a base
    Subjects(SubjectsArgs),
    /// List event types in use
    Types,
    /// Read the events of a subject
    Stream(StreamArgs),
    /// Show one event by id
    Event(EventArgs),
    /// Append a batch of events read from a JSON file
    Commit(CommitArgs),
    /// Follow new events of a subject until interrupted
    Observe(ObserveArgs),
    /// Verify the hash chain
    Audit(AuditArgs),
    /// Erase the payloads of every event of a subject
    Erase(EraseArgs),
    /// Write a full backup
    Backup(BackupArgs),
    /// Load a backup into an empty ledger
    Restore(RestoreArgs),
}

impl Command {
    /// Whether the command changes the ledger and so needs exclusive access.
    pub fn mutates(&self) -> bool {
        matches!(self, Self::Commit(_) | Self::Erase(_) | Self::Restore(_))
    }
}

#[derive(Args, Debug)]
pub struct SubjectsArgs {
    #[arg(long)]
    pub base: Option<String>,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    pub subject: String,
    #[arg(long)]
    pub lower: Option<u64>,
    #[arg(long, requires = "lower")]
    pub exclusive_lower: bool,
    #[arg(long)]
    pub upper: Option<u64>,
    #[arg(long, requires = "upper")]
    pub exclusive_upper: bool,
    /// Only the newest event of this type.
    #[arg(long)]
    pub latest_type: Option<String>,
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args, Debug)]
pub struct EventArgs {
    pub id: u64,
}

#[derive(Args, Debug)]
pub struct CommitArgs {
    /// JSON array of event inputs.
    #[arg(short, long)]
    pub file: PathBuf,
    /// JSON array of `{ "type", "payload" }` preconditions.
    #[arg(short, long)]
    pub preconditions: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ObserveArgs {
    pub subject: String,
    #[arg(long)]
    pub interval_ms: Option<u64>,
    /// Replay from this id (inclusive) before following.
    #[arg(long)]
    pub from: Option<u64>,
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Audit one subject instead of the whole chain.
    #[arg(long)]
    pub subject: Option<String>,
}

#[derive(Args, Debug)]
pub struct EraseArgs {
    pub subject: String,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    #[arg(short, long)]
    pub out: PathBuf,
    /// Compress with zstd.
    #[arg(long)]
    pub compress: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    #[arg(short = 'i', long = "in")]
    pub input: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "evl", "status", "--data-dir", "/tmp/ledger", "--format", "json", "-v",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/ledger"));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn stream_bounds() {
        let cli = Cli::try_parse_from([
            "evl", "stream", "/books", "--lower", "3", "--exclusive-lower", "--upper", "9", "-r",
        ])
        .unwrap();
        let Command::Stream(args) = cli.command else {
            panic!("expected stream");
        };
        assert_eq!(args.subject, "/books");
        assert_eq!((args.lower, args.upper), (Some(3), Some(9)));
        assert!(args.exclusive_lower && !args.exclusive_upper);
        assert!(args.recursive);
    }

    #[test]
    fn exclusive_flag_needs_its_bound() {
        assert!(Cli::try_parse_from(["evl", "stream", "/a", "--exclusive-upper"]).is_err());
    }

    #[test]
    fn commit_requires_file() {
        assert!(Cli::try_parse_from(["evl", "commit"]).is_err());
        let cli = Cli::try_parse_from(["evl", "commit", "-f", "batch.json", "-p", "pre.json"]).unwrap();
        let Command::Commit(args) = cli.command else {
            panic!("expected commit");
        };
        assert_eq!(args.preconditions, Some(PathBuf::from("pre.json")));
    }

    #[test]
    fn restore_takes_in_flag() {
        let cli = Cli::try_parse_from(["evl", "restore", "--in", "b.json"]).unwrap();
        assert!(matches!(cli.command, Command::Restore(RestoreArgs { input }) if input == PathBuf::from("b.json")));
    }

    #[test]
    fn only_writing_commands_mutate() {
        let mutates = |args: &[&str]| Cli::try_parse_from(args).unwrap().command.mutates();
        assert!(mutates(&["evl", "commit", "-f", "b.json"]));
        assert!(mutates(&["evl", "erase", "/a"]));
        assert!(mutates(&["evl", "restore", "--in", "b.json"]));
        assert!(!mutates(&["evl", "observe", "/a"]));
        assert!(!mutates(&["evl", "status"]));
        assert!(!mutates(&["evl", "backup", "-o", "b.json"]));
        assert!(!mutates(&["evl", "audit"]));
    }

    #[test]
    fn unknown_format_rejected() {
        assert!(Cli::try_parse_from(["evl", "types", "--format", "yaml"]).is_err());
    }
}
