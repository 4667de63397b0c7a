//! Codec for the self-describing tree format ("GGDict") used for archive
//! indices and many payload files (`.json`, `.wimpy`, `.emitter`, ...).
//!
//! Wire format (spec.md §4.2), all integers little-endian:
//!
//! ```text
//! header      : 0x01 0x02 0x03 0x04
//! version     : 0x01 0x00 0x00 0x00
//! idxOffset   : u32
//! <root value>
//! stringOffsetsMarker : 0x07
//! (u32 stringOffset) *
//! endOfOffsets        : 0xFF 0xFF 0xFF 0xFF
//! stringsMarker       : 0x08
//! (NUL-terminated UTF-8) *
//! ```

use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::game::Game;

pub const HEADER: [u8; 4] = [0x01, 0x02, 0x03, 0x04];
const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];
const STRING_OFFSETS_MARKER: u8 = 0x07;
const END_OF_OFFSETS: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const STRINGS_MARKER: u8 = 0x08;

const TAG_NULL: u8 = 0x01;
const TAG_DICT: u8 = 0x02;
const TAG_ARRAY: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_INT: u8 = 0x05;
const TAG_FLOAT: u8 = 0x06;
const TAG_VEC2: u8 = 0x09;
const TAG_VEC2_PAIR: u8 = 0x0A;
const TAG_VEC2_TRIPLET: u8 = 0x0B;

/// A node in the self-describing value tree.
///
/// Dict preserves insertion order to guarantee a byte-identical round trip;
/// the 2D-vector variants are preserved as their literal `{x,y}[,…]` string
/// form (structured decoding is explicitly deferred, spec.md §9).
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Dict(Vec<(String, Node)>),
    Array(Vec<Node>),
    String(String),
    Int(i64),
    Float(f64),
    Vec2(String),
    Vec2Pair(String),
    Vec2Triplet(String),
}

impl Node {
    pub fn as_dict(&self) -> Option<&[(String, Node)]> {
        match self {
            Node::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_dict()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Node::Int(i) => Some(*i),
            _ => None,
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    strings: Vec<&'a str>,
    short_refs: bool,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or_else(|| Error::MalformedTree {
            offset: self.pos,
            reason: "unexpected end of data".to_string(),
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.data.get(self.pos..self.pos + 4).ok_or_else(|| {
            Error::MalformedTree {
                offset: self.pos,
                reason: "unexpected end of data reading u32".to_string(),
            }
        })?;
        self.pos += 4;
        Ok(LittleEndian::read_u32(bytes))
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.data.get(self.pos..self.pos + 2).ok_or_else(|| {
            Error::MalformedTree {
                offset: self.pos,
                reason: "unexpected end of data reading u16".to_string(),
            }
        })?;
        self.pos += 2;
        Ok(LittleEndian::read_u16(bytes))
    }

    fn string_ref(&mut self) -> Result<&'a str> {
        let index = if self.short_refs {
            self.u16()? as usize
        } else {
            self.u32()? as usize
        };
        self.strings.get(index).copied().ok_or_else(|| Error::MalformedTree {
            offset: self.pos,
            reason: format!(
                "string ref {index} out of range ({} strings available)",
                self.strings.len()
            ),
        })
    }

    fn expect_close(&mut self, tag: u8) -> Result<()> {
        let close = self.u8()?;
        if close != tag {
            return Err(Error::MalformedTree {
                offset: self.pos - 1,
                reason: format!("block not closed: expected tag {tag:#x}, found {close:#x}"),
            });
        }
        Ok(())
    }

    fn value(&mut self) -> Result<Node> {
        let tag = self.u8()?;
        match tag {
            TAG_NULL => Ok(Node::Null),
            TAG_DICT => {
                let count = self.u32()? as usize;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = self.string_ref()?.to_string();
                    let value = self.value()?;
                    entries.push((key, value));
                }
                self.expect_close(TAG_DICT)?;
                Ok(Node::Dict(entries))
            }
            TAG_ARRAY => {
                let count = self.u32()? as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.value()?);
                }
                self.expect_close(TAG_ARRAY)?;
                Ok(Node::Array(items))
            }
            TAG_STRING => Ok(Node::String(self.string_ref()?.to_string())),
            TAG_INT => {
                let s = self.string_ref()?;
                s.parse::<i64>()
                    .map(Node::Int)
                    .map_err(|_| Error::MalformedTree {
                        offset: self.pos,
                        reason: format!("invalid integer literal '{s}'"),
                    })
            }
            TAG_FLOAT => {
                let s = self.string_ref()?;
                s.parse::<f64>()
                    .map(Node::Float)
                    .map_err(|_| Error::MalformedTree {
                        offset: self.pos,
                        reason: format!("invalid float literal '{s}'"),
                    })
            }
            TAG_VEC2 => Ok(Node::Vec2(self.string_ref()?.to_string())),
            TAG_VEC2_PAIR => Ok(Node::Vec2Pair(self.string_ref()?.to_string())),
            TAG_VEC2_TRIPLET => Ok(Node::Vec2Triplet(self.string_ref()?.to_string())),
            other => Err(Error::MalformedTree {
                offset: self.pos - 1,
                reason: format!("unknown value tag {other:#x}"),
            }),
        }
    }
}

/// Parse a value tree, threading the game-dependent string-ref width
/// (spec.md §4.2: u16 for Return to Monkey Island, u32 otherwise).
pub fn parse(data: &[u8], game: Game) -> Result<Node> {
    if data.len() < 12 || data[0..4] != HEADER || data[4..8] != VERSION {
        return Err(Error::MalformedHeader {
            offset: 0,
            expected: HEADER.iter().chain(VERSION.iter()).copied().collect(),
            actual: data.get(0..8.min(data.len())).unwrap_or(&[]).to_vec(),
        });
    }
    let idx_offset = LittleEndian::read_u32(&data[8..12]) as usize;
    let offsets_list_start = idx_offset + 1;
    if offsets_list_start >= data.len() {
        return Err(Error::MalformedTree {
            offset: 8,
            reason: format!(
                "string offsets start at {offsets_list_start} but data is only {} bytes",
                data.len()
            ),
        });
    }

    let mut strings: Vec<&str> = Vec::new();
    let mut cursor = offsets_list_start;
    while cursor + 4 <= data.len() {
        let string_offset = LittleEndian::read_i32(&data[cursor..cursor + 4]);
        if string_offset < 0 {
            break;
        }
        let start = string_offset as usize;
        let end = data[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|i| start + i)
            .ok_or_else(|| Error::MalformedTree {
                offset: start,
                reason: "unterminated string".to_string(),
            })?;
        let s = std::str::from_utf8(&data[start..end]).map_err(|_| Error::MalformedTree {
            offset: start,
            reason: "string is not valid utf-8".to_string(),
        })?;
        strings.push(s);
        cursor += 4;
    }
    if strings.is_empty() {
        return Err(Error::MalformedTree {
            offset: offsets_list_start,
            reason: "no strings found".to_string(),
        });
    }

    let mut reader = Reader {
        data,
        pos: 12,
        strings,
        short_refs: game.uses_short_string_refs(),
    };
    reader.value()
}

/// Serialize a value tree. Collects every string literal into an
/// insertion-ordered table so equal strings share one index, writes the
/// value section first, then patches `idxOffset` and appends the string
/// offsets and string bytes, as spec.md §4.2 describes.
pub fn write(root: &Node, game: Game) -> Vec<u8> {
    let short_refs = game.uses_short_string_refs();
    let mut strings: Vec<String> = Vec::new();
    let mut string_indices: HashMap<String, u32> = HashMap::new();
    let mut body = Vec::new();
    write_value(&mut body, &mut strings, &mut string_indices, short_refs, root);

    let idx_offset = HEADER.len() + VERSION.len() + 4 + body.len();

    let mut output = Vec::new();
    output.extend_from_slice(&HEADER);
    output.extend_from_slice(&VERSION);
    output.extend_from_slice(&(idx_offset as u32).to_le_bytes());
    output.extend_from_slice(&body);

    let mut string_bytes = Vec::new();
    let mut string_byte_offsets = Vec::with_capacity(strings.len());
    for s in &strings {
        string_byte_offsets.push(string_bytes.len());
        string_bytes.extend_from_slice(s.as_bytes());
        string_bytes.push(0);
    }

    let base_string_offset =
        idx_offset + strings.len() * 4 + END_OF_OFFSETS.len() + 1 /* marker */ + 1 /* marker */;
    output.push(STRING_OFFSETS_MARKER);
    for offset in &string_byte_offsets {
        output.extend_from_slice(&((base_string_offset + offset) as u32).to_le_bytes());
    }
    output.extend_from_slice(&END_OF_OFFSETS);
    output.push(STRINGS_MARKER);
    output.extend_from_slice(&string_bytes);
    output
}

fn intern(
    strings: &mut Vec<String>,
    indices: &mut HashMap<String, u32>,
    s: &str,
) -> u32 {
    if let Some(&index) = indices.get(s) {
        return index;
    }
    let index = strings.len() as u32;
    strings.push(s.to_string());
    indices.insert(s.to_string(), index);
    index
}

fn write_string_ref(
    output: &mut Vec<u8>,
    strings: &mut Vec<String>,
    indices: &mut HashMap<String, u32>,
    short_refs: bool,
    s: &str,
) {
    let index = intern(strings, indices, s);
    if short_refs {
        output.extend_from_slice(&(index as u16).to_le_bytes());
    } else {
        output.extend_from_slice(&index.to_le_bytes());
    }
}

fn write_value(
    output: &mut Vec<u8>,
    strings: &mut Vec<String>,
    indices: &mut HashMap<String, u32>,
    short_refs: bool,
    node: &Node,
) {
    match node {
        Node::Null => output.push(TAG_NULL),
        Node::Dict(entries) => {
            output.push(TAG_DICT);
            output.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            for (key, value) in entries {
                write_string_ref(output, strings, indices, short_refs, key);
                write_value(output, strings, indices, short_refs, value);
            }
            output.push(TAG_DICT);
        }
        Node::Array(items) => {
            output.push(TAG_ARRAY);
            output.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                write_value(output, strings, indices, short_refs, item);
            }
            output.push(TAG_ARRAY);
        }
        Node::String(s) => {
            output.push(TAG_STRING);
            write_string_ref(output, strings, indices, short_refs, s);
        }
        Node::Int(i) => {
            output.push(TAG_INT);
            write_string_ref(output, strings, indices, short_refs, &i.to_string());
        }
        Node::Float(f) => {
            output.push(TAG_FLOAT);
            write_string_ref(output, strings, indices, short_refs, &f.to_string());
        }
        Node::Vec2(s) => {
            output.push(TAG_VEC2);
            write_string_ref(output, strings, indices, short_refs, s);
        }
        Node::Vec2Pair(s) => {
            output.push(TAG_VEC2_PAIR);
            write_string_ref(output, strings, indices, short_refs, s);
        }
        Node::Vec2Triplet(s) => {
            output.push(TAG_VEC2_TRIPLET);
            write_string_ref(output, strings, indices, short_refs, s);
        }
    }
}

/// `true` if `data` begins with the value-tree header, used by the payload
/// dispatcher to distinguish value trees from plain JSON/text (spec.md §4.7).
pub fn looks_like_value_tree(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..4] == HEADER
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn sample_tree() -> Node {
        Node::Dict(vec![
            ("k".to_string(), Node::Int(42)),
            (
                "files".to_string(),
                Node::Array(vec![
                    Node::String("a.txt".to_string()),
                    Node::String("b.bin".to_string()),
                ]),
            ),
            ("nothing".to_string(), Node::Null),
            ("pi".to_string(), Node::Float(3.5)),
        ])
    }

    #[test]
    fn round_trips_rtmi() {
        let tree = sample_tree();
        let bytes = write(&tree, Game::ReturnToMonkeyIsland);
        let parsed = parse(&bytes, Game::ReturnToMonkeyIsland).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn round_trips_twp() {
        let tree = sample_tree();
        let bytes = write(&tree, Game::ThimbleweedPark);
        let parsed = parse(&bytes, Game::ThimbleweedPark).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn rewriting_parsed_bytes_is_byte_identical() {
        let tree = sample_tree();
        let bytes = write(&tree, Game::ReturnToMonkeyIsland);
        let parsed = parse(&bytes, Game::ReturnToMonkeyIsland).unwrap();
        let rewritten = write(&parsed, Game::ReturnToMonkeyIsland);
        assert_eq!(bytes, rewritten);
    }

    #[test]
    fn s2_minimal_rtmi_tree_matches_documented_layout() {
        let tree = Node::Dict(vec![("k".to_string(), Node::Int(42))]);
        let bytes = write(&tree, Game::ReturnToMonkeyIsland);

        assert_eq!(&bytes[0..4], &HEADER);
        assert_eq!(&bytes[4..8], &VERSION);
        // value section: DICT tag, count=1, key ref "k", INT tag, value ref "42", close DICT
        assert_eq!(bytes[12], TAG_DICT);
        let count = LittleEndian::read_u32(&bytes[13..17]);
        assert_eq!(count, 1);
        let key_ref = LittleEndian::read_u16(&bytes[17..19]);
        assert_eq!(key_ref, 0);
        assert_eq!(bytes[19], TAG_INT);
        let value_ref = LittleEndian::read_u16(&bytes[20..22]);
        assert_eq!(value_ref, 1);
        assert_eq!(bytes[22], TAG_DICT);

        let parsed = parse(&bytes, Game::ReturnToMonkeyIsland).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn string_ref_width_is_game_dependent() {
        let tree = Node::Dict(vec![("k".to_string(), Node::Int(1))]);
        let rtmi_bytes = write(&tree, Game::ReturnToMonkeyIsland);
        // Parsing RTMI-encoded (u16 refs) bytes as TWP (u32 refs) must fail or
        // at least not silently succeed with the right value.
        let wrong_width = parse(&rtmi_bytes, Game::ThimbleweedPark);
        assert!(wrong_width.is_err() || wrong_width.unwrap() != tree);
    }

    #[quickcheck]
    fn dict_with_repeated_values_round_trips(values: Vec<i32>) -> bool {
        let tree = Node::Dict(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("k{i}"), Node::Int(*v as i64)))
                .collect(),
        );
        let bytes = write(&tree, Game::ThimbleweedPark);
        parse(&bytes, Game::ThimbleweedPark).map(|p| p == tree).unwrap_or(false)
    }
}
