use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ggtool_formats::Game;

mod convert;
mod extract;
mod filter;
mod list;
mod pack;

pub use filter::GlobFilter;

/// Recovers the structured assets packed inside the content archives of
/// Thimbleweed Park, Delores, and Return to Monkey Island.
#[derive(Debug, Parser)]
#[command(name = "ggtool", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Number of worker threads for batch extraction/conversion (default:
    /// available hardware parallelism).
    #[arg(long, global = true)]
    pub jobs: Option<usize>,

    /// Suppress informational logging.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Abort the whole run on the first per-entry failure instead of
    /// collecting failures and reporting them at the end.
    #[arg(long, global = true)]
    pub fail_fast: bool,

    #[command(subcommand)]
    pub command: Action,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum GameArg {
    Twp,
    Delores,
    Rtmi,
}

impl From<GameArg> for Game {
    fn from(value: GameArg) -> Self {
        match value {
            GameArg::Twp => Game::ThimbleweedPark,
            GameArg::Delores => Game::Delores,
            GameArg::Rtmi => Game::ReturnToMonkeyIsland,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Action {
    /// List every entry in an archive.
    List { archive: PathBuf },

    /// Extract raw, post-cipher bytes for every matching entry.
    Extract {
        archive: PathBuf,

        /// Glob filter (`*` wildcard) applied to each entry's filename.
        #[arg(long)]
        filter: Option<String>,

        #[arg(long, default_value = "./extract")]
        out: PathBuf,
    },

    /// Convert every matching entry to its typed payload; unknown
    /// extensions are saved raw.
    Convert {
        archive: PathBuf,

        #[arg(long)]
        filter: Option<String>,

        #[arg(long, default_value = "./convert")]
        out: PathBuf,
    },

    /// Build a new archive from a directory of loose files.
    Pack {
        dir: PathBuf,
        out: PathBuf,

        #[arg(long, value_enum)]
        game: GameArg,
    },
}

/// Severity of the CLI's outcome, used to pick a process exit code:
/// `0` on full success, `1` on I/O trouble, `2` if any entry was malformed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitSeverity {
    Ok = 0,
    Io = 1,
    Malformed = 2,
}

/// Classify a [`ggtool_pack::Error`] for exit-code purposes: I/O failures
/// are severity `Io`, everything else (malformed header/tree/function,
/// out-of-bounds entries, ...) is `Malformed` per spec.md §7's taxonomy.
pub(crate) fn severity_of(err: &ggtool_pack::Error) -> ExitSeverity {
    use ggtool_pack::Error as PackError;
    match err {
        PackError::Io { .. } => ExitSeverity::Io,
        _ => ExitSeverity::Malformed,
    }
}

pub fn run(cli: Cli) -> ExitSeverity {
    if !cli.quiet {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .try_init();
    }

    let build_pool = |jobs: Option<usize>| {
        let jobs = jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .expect("failed to build worker pool")
    };

    let fail_fast = cli.fail_fast;
    match cli.command {
        Action::List { archive } => list::run(&archive),
        Action::Extract { archive, filter, out } => {
            let pool = build_pool(cli.jobs);
            pool.install(|| extract::run(&archive, filter.as_deref(), &out, fail_fast))
        }
        Action::Convert { archive, filter, out } => {
            let pool = build_pool(cli.jobs);
            pool.install(|| convert::run(&archive, filter.as_deref(), &out, fail_fast))
        }
        Action::Pack { dir, out, game } => pack::run(&dir, &out, game.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn pack_then_list_then_extract_round_trips_through_the_cli() {
        let workdir = tempfile::tempdir().unwrap();
        let input_dir = workdir.path().join("loose");
        fs::create_dir_all(&input_dir).unwrap();
        fs::write(input_dir.join("greeting.txt"), b"hi there").unwrap();

        let archive_path = workdir.path().join("Delores.pack");
        let severity = run(Cli {
            jobs: None,
            quiet: true,
            fail_fast: false,
            command: Action::Pack {
                dir: input_dir.clone(),
                out: archive_path.clone(),
                game: GameArg::Delores,
            },
        });
        assert_eq!(severity, ExitSeverity::Ok);
        assert!(archive_path.exists());

        let severity = run(Cli {
            jobs: None,
            quiet: true,
            fail_fast: false,
            command: Action::List {
                archive: archive_path.clone(),
            },
        });
        assert_eq!(severity, ExitSeverity::Ok);

        let out_dir = workdir.path().join("extracted");
        let severity = run(Cli {
            jobs: Some(2),
            quiet: true,
            fail_fast: false,
            command: Action::Extract {
                archive: archive_path.clone(),
                filter: None,
                out: out_dir.clone(),
            },
        });
        assert_eq!(severity, ExitSeverity::Ok);
        assert_eq!(fs::read(out_dir.join("greeting.txt")).unwrap(), b"hi there");

        let convert_dir = workdir.path().join("converted");
        let severity = run(Cli {
            jobs: Some(2),
            quiet: true,
            fail_fast: false,
            command: Action::Convert {
                archive: archive_path,
                filter: Some("*.txt".to_string()),
                out: convert_dir.clone(),
            },
        });
        assert_eq!(severity, ExitSeverity::Ok);
        assert_eq!(
            fs::read_to_string(convert_dir.join("greeting.txt")).unwrap(),
            "hi there"
        );
    }
}
