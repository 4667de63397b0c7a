use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Formats(#[from] ggtool_formats::Error),

    #[error("archive index is not a dict at its root")]
    IndexNotADict,

    #[error("archive index entry is missing required field '{field}'")]
    IndexEntryMissingField { field: &'static str },

    #[error("entry '{filename}' offset {offset} + size {size} exceeds archive length {archive_len}")]
    EntryOutOfBounds {
        filename: String,
        offset: u64,
        size: u64,
        archive_len: u64,
    },

    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
