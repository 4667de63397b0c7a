use std::path::Path;

use ggtool_pack::Archive;

use crate::ExitSeverity;

pub fn run(archive_path: &Path) -> ExitSeverity {
    let archive = match Archive::open(archive_path) {
        Ok(archive) => archive,
        Err(err) => {
            tracing::error!(%err, archive = %archive_path.display(), "failed to open archive");
            return crate::severity_of(&err);
        }
    };

    println!("game: {:?}", archive.game());
    println!("entries: {}", archive.entries().len());
    for entry in archive.entries() {
        println!("{}\t{}\t{}", entry.filename, entry.offset, entry.size);
    }

    ExitSeverity::Ok
}
