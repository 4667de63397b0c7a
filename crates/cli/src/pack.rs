use std::path::Path;

use ggtool_formats::Game;

use crate::ExitSeverity;

pub fn run(dir: &Path, out_path: &Path, game: Game) -> ExitSeverity {
    let files = match collect_files(dir) {
        Ok(files) => files,
        Err(source) => {
            tracing::error!(%source, dir = %dir.display(), "failed to read input directory");
            return ExitSeverity::Io;
        }
    };

    match ggtool_pack::pack(&files, out_path, game) {
        Ok(()) => {
            println!("packed {} files into {}", files.len(), out_path.display());
            ExitSeverity::Ok
        }
        Err(err) => {
            tracing::error!(%err, out = %out_path.display(), "failed to write archive");
            ExitSeverity::Io
        }
    }
}

/// Walk `dir` recursively, recording each file's path relative to `dir` as
/// its archive filename (using `/` separators so archives are portable
/// across platforms).
fn collect_files(dir: &Path) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::new();
    collect_files_into(dir, dir, &mut files)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn collect_files_into(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files_into(root, &path, out)?;
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let contents = std::fs::read(&path)?;
        out.push((relative, contents));
    }
    Ok(())
}
