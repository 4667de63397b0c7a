use std::{
    fs,
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use ggtool_formats::decompile;
use ggtool_pack::{Archive, Payload};
use indicatif::{ParallelProgressIterator, ProgressStyle};
use rayon::prelude::*;

use crate::filter::GlobFilter;
use crate::ExitSeverity;

enum Outcome {
    Converted,
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
            let result = match ggtool_pack::convert(entry, &bytes) {
                Ok((payload, warnings)) => {
                    for warning in warnings {
                        tracing::warn!(%warning, file = %entry.filename, "decode warning");
                    }
                    write_payload(out_dir, &entry.filename, entry.game, &payload)
                        .map_err(|source| format!("{}: {source}", entry.filename))
                }
                Err(err) => Err(format!("{}: {err}", entry.filename)),
            };

            match result {
                Ok(()) => Outcome::Converted,
                Err(message) => {
                    if fail_fast {
                        stop.store(true, Ordering::Relaxed);
                    }
                    Outcome::Failed(message)
                }
            }
        })
        .collect();

    let converted = outcomes.iter().filter(|o| matches!(o, Outcome::Converted)).count();
    let failures: Vec<&String> = outcomes
        .iter()
        .filter_map(|o| match o {
            Outcome::Failed(message) => Some(message),
            _ => None,
        })
        .collect();

    println!("converted {converted} of {} matching entries", entries.len());

    if !failures.is_empty() {
        for failure in &failures {
            tracing::warn!(failure = failure.as_str(), "entry conversion failed");
        }
        return ExitSeverity::Malformed;
    }

    ExitSeverity::Ok
}

fn write_payload(
    out_dir: &Path,
    filename: &str,
    game: ggtool_formats::Game,
    payload: &Payload,
) -> std::io::Result<()> {
    let dest = out_dir.join(filename);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    match payload {
        Payload::RawBytes(bytes) | Payload::Image(bytes) | Payload::SoundBank(bytes) | Payload::Sound(bytes) => {
            fs::write(dest, bytes)
        }
        Payload::Utf8Text(text) => fs::write(dest, text),
        Payload::Json(value) => {
            let rendered = serde_json::to_string_pretty(value).unwrap_or_default();
            fs::write(dest.with_extension("json"), rendered)
        }
        Payload::ValueTree(node) => fs::write(dest.with_extension("txt"), format!("{node:#?}")),
        Payload::Table(rows) => {
            let rendered: String = rows
                .iter()
                .map(|row| row.join("\t"))
                .collect::<Vec<_>>()
                .join("\n");
            fs::write(dest, rendered)
        }
        Payload::Bytecode(scripts) => {
            let mut rendered = String::new();
            for script in scripts {
                for (_, function) in &script.functions_by_uid {
                    let (text, warnings) = decompile(function, game);
                    for warning in warnings {
                        tracing::warn!(%warning, "decompiler warning");
                    }
                    rendered.push_str(&text);
                    rendered.push('\n');
                }
            }
            fs::write(dest.with_extension("txt"), rendered)
        }
        Payload::Dialogue(statements) => {
            let rendered: String = statements
                .iter()
                .map(|s| format!("{}: {:?} {:?}", s.line_number, s.opcode, s.args))
                .collect::<Vec<_>>()
                .join("\n");
            fs::write(dest.with_extension("txt"), rendered)
        }
    }
}
