//! Payload dispatcher: given an extracted entry and its post-cipher bytes,
//! picks the converter keyed on file extension and originating game
//! (spec.md §4.7). This is the one place that turns "some bytes that came
//! out of an archive" into something a caller can actually render.

use ggtool_formats::{bytecode, cipher, dialogue, value_tree, DialogueStatement, Game, Node, Script, Warning};

use crate::archive::FileEntry;
use crate::error::{Error, Result};

/// A converted payload, tagged by what [`convert`] decided it was.
///
/// `Image`, `SoundBank`, and `Sound` carry the raw bytes an external codec
/// (KTX1/BC7, FSB5, Vorbis) would need; decoding those formats is out of
/// scope here (spec.md §1).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    RawBytes(Vec<u8>),
    Utf8Text(String),
    Json(serde_json::Value),
    ValueTree(Node),
    Table(Vec<Vec<String>>),
    Image(Vec<u8>),
    SoundBank(Vec<u8>),
    Sound(Vec<u8>),
    Bytecode(Vec<Script>),
    Dialogue(Vec<DialogueStatement>),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::RawBytes(_) => "raw",
            Payload::Utf8Text(_) => "text",
            Payload::Json(_) => "json",
            Payload::ValueTree(_) => "value_tree",
            Payload::Table(_) => "table",
            Payload::Image(_) => "image",
            Payload::SoundBank(_) => "sound_bank",
            Payload::Sound(_) => "sound",
            Payload::Bytecode(_) => "bytecode",
            Payload::Dialogue(_) => "dialogue",
        }
    }
}

/// Extensions (as returned by [`FileEntry::extension`], i.e. without a
/// leading dot) that are always plain UTF-8 text.
const UTF8_TEXT_EXTENSIONS: &[&str] = &[
    "atlas", "attach", "blend", "byack", "dinky", "fnt", "lip", "nut", "txt",
];

/// Extensions whose content is ValueTree-or-JSON-or-text depending on the
/// first few bytes.
const SNIFFED_EXTENSIONS: &[&str] = &["emitter", "json", "wimpy"];

const FONT_EXTENSIONS: &[&str] = &["otf", "ttf"];
const SOUND_EXTENSIONS: &[&str] = &["ogg", "wav"];
const IMAGE_EXTENSIONS: &[&str] = &["ktx", "ktxbz"];

const SOUND_BANK_EXTENSION: &str = "assets.bank";

/// Dispatch `bytes` (already post-cipher, as returned by
/// [`crate::archive::Archive::extract`]) to the converter selected by
/// `entry`'s extension and game, per spec.md §4.7.
///
/// Returns the converted payload plus any non-fatal warnings collected
/// along the way (unknown opcodes, unknown dialogue ops) — these never
/// cause `convert` itself to fail.
pub fn convert(entry: &FileEntry, bytes: &[u8]) -> Result<(Payload, Vec<Warning>)> {
    let extension = entry.extension();

    if UTF8_TEXT_EXTENSIONS.contains(&extension) {
        return Ok((Payload::Utf8Text(decode_utf8_lossy_checked(bytes)?), Vec::new()));
    }

    if extension == "anim" {
        let json = parse_json(bytes)?;
        return Ok((Payload::Json(json), Vec::new()));
    }

    if SNIFFED_EXTENSIONS.contains(&extension) {
        return Ok((sniff_tree_json_or_text(bytes, entry.game)?, Vec::new()));
    }

    if extension == "dink" {
        let scripts = bytecode::parse_bytecode(bytes).map_err(Error::Formats)?;
        return Ok((Payload::Bytecode(scripts), Vec::new()));
    }

    if extension == "bnut" {
        let text = decode_bnut(bytes)?;
        return Ok((Payload::Utf8Text(text), Vec::new()));
    }

    if extension == "yack" {
        return match entry.game {
            Game::ReturnToMonkeyIsland => {
                let (statements, warnings) = dialogue::decode_dialogue(bytes, &entry.filename)
                    .map_err(Error::Formats)?;
                Ok((Payload::Dialogue(statements), warnings))
            }
            _ => Ok((Payload::Utf8Text(decode_utf8_lossy_checked(bytes)?), Vec::new())),
        };
    }

    if IMAGE_EXTENSIONS.contains(&extension) || extension == "png" {
        return Ok((Payload::Image(bytes.to_vec()), Vec::new()));
    }

    if extension == "tsv" {
        return Ok((Payload::Table(parse_tsv(bytes)?), Vec::new()));
    }

    if FONT_EXTENSIONS.contains(&extension) {
        return Ok((Payload::RawBytes(bytes.to_vec()), Vec::new()));
    }

    if SOUND_EXTENSIONS.contains(&extension) {
        return Ok((Payload::Sound(bytes.to_vec()), Vec::new()));
    }

    if extension == SOUND_BANK_EXTENSION {
        // The RTMI pre-pass runs on the raw (unciphered) bank bytes before
        // an external FSB5 reader goes looking for the embedded magic;
        // other games' banks are already plain FSB5 (spec.md §4.1, §4.7).
        let prepared = match entry.game {
            Game::ReturnToMonkeyIsland => cipher::decode_sound_bank(bytes),
            _ => bytes.to_vec(),
        };
        return Ok((Payload::SoundBank(prepared), Vec::new()));
    }

    Ok((Payload::RawBytes(bytes.to_vec()), Vec::new()))
}

fn decode_utf8_lossy_checked(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).or_else(|_| Ok(String::from_utf8_lossy(bytes).into_owned()))
}

fn parse_json(bytes: &[u8]) -> Result<serde_json::Value> {
    serde_json::from_slice(bytes).map_err(Error::Json)
}

/// `.emitter`/`.json`/`.wimpy` files are one of {ValueTree, JSON, UTF-8
/// text}; the first bytes decide which (spec.md §4.7).
fn sniff_tree_json_or_text(bytes: &[u8], game: Game) -> Result<Payload> {
    if value_tree::looks_like_value_tree(bytes) {
        let node = value_tree::parse(bytes, game).map_err(Error::Formats)?;
        return Ok(Payload::ValueTree(node));
    }
    if bytes.first() == Some(&b'{') {
        return Ok(Payload::Json(parse_json(bytes)?));
    }
    Ok(Payload::Utf8Text(decode_utf8_lossy_checked(bytes)?))
}

/// `.bnut` files get an XOR-with-rolling-key pre-pass, keyed by
/// `keyOffset = len & 0xFF`, before being treated as text (spec.md §4.7).
/// Uses its own dedicated key table, `KEY_BNUT` (see DESIGN.md), distinct
/// from the `.yack` dialogue key.
fn decode_bnut(bytes: &[u8]) -> Result<String> {
    let key = ggtool_formats::cipher::keys::KEY_BNUT;
    let key_offset = bytes.len() & 0xFF;
    let decoded: Vec<u8> = bytes
        .iter()
        .enumerate()
        .map(|(i, &b)| b ^ key[(key_offset + i) % key.len()])
        .collect();
    decode_utf8_lossy_checked(&decoded)
}

fn parse_tsv(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let text = decode_utf8_lossy_checked(bytes)?;
    Ok(text
        .lines()
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(filename: &str, game: Game) -> FileEntry {
        FileEntry {
            filename: filename.to_string(),
            offset: 0,
            size: 0,
            pack_path: PathBuf::new(),
            game,
        }
    }

    #[test]
    fn txt_is_utf8_text() {
        let e = entry("greeting.txt", Game::ThimbleweedPark);
        let (payload, warnings) = convert(&e, b"hello").unwrap();
        assert!(warnings.is_empty());
        assert_eq!(payload, Payload::Utf8Text("hello".to_string()));
    }

    #[test]
    fn emitter_sniffs_value_tree_header() {
        let tree = Node::Dict(vec![("a".to_string(), Node::Int(1))]);
        let bytes = value_tree::write(&tree, Game::ThimbleweedPark);
        let e = entry("fx.emitter", Game::ThimbleweedPark);
        let (payload, _) = convert(&e, &bytes).unwrap();
        assert_eq!(payload, Payload::ValueTree(tree));
    }

    #[test]
    fn emitter_sniffs_json() {
        let e = entry("fx.emitter", Game::ThimbleweedPark);
        let (payload, _) = convert(&e, br#"{"a":1}"#).unwrap();
        match payload {
            Payload::Json(v) => assert_eq!(v["a"], 1),
            other => panic!("expected Json, got {other:?}"),
        }
    }

    #[test]
    fn tsv_splits_lines_and_tabs() {
        let e = entry("strings.tsv", Game::Delores);
        let (payload, _) = convert(&e, b"a\tb\nc\td").unwrap();
        assert_eq!(
            payload,
            Payload::Table(vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string(), "d".to_string()],
            ])
        );
    }

    #[test]
    fn unknown_extension_falls_through_to_raw() {
        let e = entry("mystery.xyz", Game::Unknown);
        let (payload, _) = convert(&e, &[1, 2, 3]).unwrap();
        assert_eq!(payload, Payload::RawBytes(vec![1, 2, 3]));
    }

    #[test]
    fn assets_bank_distinguishable_from_strings_bank() {
        let bank = entry("voice.assets.bank", Game::ReturnToMonkeyIsland);
        assert_eq!(bank.extension(), "assets.bank");
        let strings = entry("voice.strings.bank", Game::ReturnToMonkeyIsland);
        assert_eq!(strings.extension(), "strings.bank");
    }

    #[test]
    fn bnut_round_trips_through_its_own_prepass() {
        let key = ggtool_formats::cipher::keys::KEY_BNUT;
        let plain = b"local x = 1";
        let key_offset = plain.len() & 0xFF;
        let ciphered: Vec<u8> = plain
            .iter()
            .enumerate()
            .map(|(i, &b)| b ^ key[(key_offset + i) % key.len()])
            .collect();
        let e = entry("logic.bnut", Game::Delores);
        let (payload, _) = convert(&e, &ciphered).unwrap();
        assert_eq!(payload, Payload::Utf8Text("local x = 1".to_string()));
    }
}
