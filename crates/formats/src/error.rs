use thiserror::Error;

use crate::game::Game;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("archive basename did not match a known game prefix: {archive_path}")]
    UnknownGame { archive_path: String },

    #[error("malformed header at offset {offset}: expected {expected:?}, found {actual:?}")]
    MalformedHeader {
        offset: usize,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    #[error("malformed value tree at offset {offset}: {reason}")]
    MalformedTree { offset: usize, reason: String },

    #[error("malformed bytecode function at offset {offset}: {reason}")]
    MalformedFunction { offset: usize, reason: String },
}

impl Error {
    pub fn unknown_game(game_like: &Game, archive_path: impl Into<String>) -> Self {
        debug_assert!(matches!(game_like, Game::Unknown));
        Error::UnknownGame {
            archive_path: archive_path.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal decode issue: an opcode or dialogue op the decompiler/decoder
/// doesn't know about. These are collected rather than propagated, per the
/// "never abort on an unknown opcode" rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    UnknownOpcode { game: Game, opcode: u8 },
    UnknownDialogueOp { opcode: i8, line: i32, file: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnknownOpcode { game, opcode } => {
                write!(f, "unknown opcode {opcode} for game {game:?}")
            }
            Warning::UnknownDialogueOp { opcode, line, file } => {
                write!(
                    f,
                    "unknown dialogue opcode {opcode} at line {line} of {file}"
                )
            }
        }
    }
}
