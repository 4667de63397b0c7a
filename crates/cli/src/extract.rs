use std::{
    fs,
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use ggtool_pack::Archive;
use indicatif::{ParallelProgressIterator, ProgressStyle};
use rayon::prelude::*;

use crate::filter::GlobFilter;
use crate::ExitSeverity;

enum Outcome {
    Extracted,
    Skipped,
    Failed(String),
}

pub fn run(archive_path: &Path, filter: Option<&str>, out_dir: &Path, fail_fast: bool) -> ExitSeverity {
    let archive = match Archive::open(archive_path) {
        Ok(archive) => archive,
        Err(err) => {
            tracing::error!(%err, archive = %archive_path.display(), "failed to open archive");
            return crate::severity_of(&err);
        }
    };

    let glob = filter.map(GlobFilter::new);
    let entries: Vec<_> = archive
        .entries()
        .iter()
        .filter(|e| glob.as_ref().map(|g| g.matches(&e.filename)).unwrap_or(true))
        .collect();

    let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos:>7}/{len:7} {msg}")
        .expect("progress bar template is valid");

    // Shared across worker threads so a failure observed on one thread stops
    // the others from starting new entries, instead of only trimming how much
    // of the post-hoc failure log gets printed (spec.md §7: "--fail-fast
    // toggles early exit").
    let stop = AtomicBool::new(false);

    let outcomes: Vec<Outcome> = entries
        .par_iter()
        .progress_with_style(style)
        .map(|entry| {
            if fail_fast && stop.load(Ordering::Relaxed) {
                return Outcome::Skipped;
            }

            let bytes = archive.extract(entry);
            let dest = out_dir.join(&entry.filename);
            let result = match dest.parent() {
                Some(parent) => fs::create_dir_all(parent).and_then(|_| fs::write(&dest, &bytes)),
                None => fs::write(&dest, &bytes),
            };

            match result {
                Ok(()) => Outcome::Extracted,
                Err(source) => {
                    if fail_fast {
                        stop.store(true, Ordering::Relaxed);
                    }
                    Outcome::Failed(format!("{}: {source}", entry.filename))
                }
            }
        })
        .collect();

    let extracted = outcomes.iter().filter(|o| matches!(o, Outcome::Extracted)).count();
    let failures: Vec<&String> = outcomes
        .iter()
        .filter_map(|o| match o {
            Outcome::Failed(message) => Some(message),
            _ => None,
        })
        .collect();

    println!("extracted {extracted} of {} matching entries", entries.len());
    if !failures.is_empty() {
        for failure in &failures {
            tracing::warn!(%failure, "entry extraction failed");
        }
        return ExitSeverity::Io;
    }

    ExitSeverity::Ok
}
