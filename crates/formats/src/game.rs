use std::path::Path;

/// Which of the three content archives an entry or payload originated from.
///
/// Drives the cipher variant (see [`crate::cipher`]), the `ValueTree`
/// string-index width (see [`crate::value_tree`]), and the bytecode opcode
/// table (see [`crate::bytecode::opcodes`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Game {
    ThimbleweedPark,
    Delores,
    ReturnToMonkeyIsland,
    Unknown,
}

impl Game {
    /// Determine a game from an archive's basename, matching the
    /// `ThimbleweedPark*`, `Delores*`, `Weird*` prefixes observed in shipped
    /// archives. Anything else resolves to [`Game::Unknown`].
    pub fn from_archive_path(path: impl AsRef<Path>) -> Self {
        let stem = path
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        Self::from_basename(stem)
    }

    pub fn from_basename(stem: &str) -> Self {
        if stem.starts_with("ThimbleweedPark") {
            Game::ThimbleweedPark
        } else if stem.starts_with("Delores") {
            Game::Delores
        } else if stem.starts_with("Weird") {
            Game::ReturnToMonkeyIsland
        } else {
            Game::Unknown
        }
    }

    /// `true` for Return to Monkey Island, which uses 16-bit string refs in
    /// its `ValueTree` encoding instead of the 32-bit refs used elsewhere.
    pub fn uses_short_string_refs(self) -> bool {
        matches!(self, Game::ReturnToMonkeyIsland)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_known_prefixes() {
        assert_eq!(
            Game::from_basename("ThimbleweedPark"),
            Game::ThimbleweedPark
        );
        assert_eq!(Game::from_basename("Delores"), Game::Delores);
        assert_eq!(
            Game::from_basename("Weird"),
            Game::ReturnToMonkeyIsland
        );
        assert_eq!(Game::from_basename("Weird2"), Game::ReturnToMonkeyIsland);
        assert_eq!(Game::from_basename("SomethingElse"), Game::Unknown);
    }

    #[test]
    fn only_rtmi_uses_short_refs() {
        assert!(Game::ReturnToMonkeyIsland.uses_short_string_refs());
        assert!(!Game::ThimbleweedPark.uses_short_string_refs());
        assert!(!Game::Delores.uses_short_string_refs());
    }
}
