//! Container format for compiled script files (`.dink`): a stream of
//! function records, each holding a string pool, a typed constant pool, a
//! flat instruction stream, and a line-mapping table (spec.md §4.5).

pub mod decompile;
pub mod opcodes;

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::error::{Error, Result};
use crate::game::Game;
pub use opcodes::OpCode;

const FUNCTION_START: [u8; 4] = [0x9C, 0x78, 0x41, 0x34];
const FUNCTION_END: [u8; 4] = [0x1C, 0xA3, 0x0D, 0x47];
const MYSTERY: [u8; 4] = [0x25, 0xA1, 0x46, 0x7F];
const INFO: [u8; 4] = [0x62, 0x4B, 0xF9, 0x16];
const STRINGS: [u8; 4] = [0xFA, 0x1C, 0x3F, 0x98];
const VARIABLES: [u8; 4] = [0x3A, 0xC3, 0x4B, 0xFD];
const INSTRUCTIONS: [u8; 4] = [0x1D, 0x4D, 0xED, 0x55];
const LINES: [u8; 4] = [0x42, 0x40, 0xD3, 0x62];

const MYSTERY_VALUE_1: u32 = 1;
const MYSTERY_VALUE_2: u16 = 1025;

/// One typed constant-pool entry (the VARIABLES block).
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
    String(String),
}

/// A single packed 32-bit instruction word, decomposed per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub word: u32,
}

impl Instruction {
    pub fn opcode_number(self) -> u8 {
        (self.word & 0x3F) as u8
    }

    pub fn opcode(self, game: Game) -> OpCode {
        OpCode::decode(game, self.opcode_number())
    }

    pub fn p1(self) -> u32 {
        self.word >> 7
    }

    pub fn p2(self) -> u8 {
        ((self.word >> 16) & 0xFF) as u8
    }

    pub fn p3(self) -> u32 {
        self.word >> 23
    }

    /// The jump distance carried by jump opcodes: `p1` masked to 14 bits.
    pub fn jump_distance(self) -> u32 {
        self.p1() & 0x3FFF
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRange {
    pub line_number: u32,
    pub start_index: usize,
    pub end_index: usize,
}

/// One compiled routine. `strings` maps byte offset (within the STRINGS
/// block) to the string found there, used to resolve the `String` variant of
/// a constant. `info_extra` is the INFO block's trailing scalar bytes, whose
/// meaning is undocumented (spec.md §9 open question) — preserved verbatim
/// so a function round-trips byte-for-byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub uid: String,
    pub name: String,
    pub script_name: String,
    pub info_extra: Vec<u8>,
    pub strings: Vec<(u32, String)>,
    pub constants: Vec<Constant>,
    pub instructions: Vec<Instruction>,
    pub lines: Vec<LineRange>,
}

impl Function {
    pub fn string_at(&self, offset: u32) -> Option<&str> {
        self.strings
            .iter()
            .find(|(o, _)| *o == offset)
            .map(|(_, s)| s.as_str())
    }

    /// The constant at `index`, rendered as a string the way the decompiler
    /// wants it (spec.md §4.6): ints and floats print as their literal text,
    /// strings print bare (the decompiler itself adds quoting for PUSH_CONST).
    pub fn constant_display(&self, index: usize) -> String {
        match self.constants.get(index) {
            Some(Constant::Int(i)) => i.to_string(),
            Some(Constant::Float(f)) => f.to_string(),
            Some(Constant::String(s)) => s.clone(),
            None => format!("[[invalid constant index {index}]]"),
        }
    }
}

/// A named collection of functions loaded from one `.dink` file. The same
/// script name may appear across several function records; those group into
/// one `Script`, preserving first-seen order (spec.md §4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub name: String,
    pub functions_by_uid: Vec<(String, Function)>,
}

impl Script {
    pub fn function(&self, uid: &str) -> Option<&Function> {
        self.functions_by_uid.iter().find(|(u, _)| u == uid).map(|(_, f)| f)
    }

    pub fn root_function(&self) -> Option<&Function> {
        self.functions_by_uid
            .iter()
            .find(|(_, f)| f.name == "$root$")
            .map(|(_, f)| f)
    }
}

struct BlockHeader {
    tag: [u8; 4],
    size: u32,
}

fn read_tag(cursor: &mut Cursor<&[u8]>) -> Result<[u8; 4]> {
    let mut tag = [0u8; 4];
    cursor.read_exact(&mut tag).map_err(|e| Error::Io {
        path: "<bytecode>".to_string(),
        source: e,
    })?;
    Ok(tag)
}

fn read_block_header(cursor: &mut Cursor<&[u8]>, expected: [u8; 4]) -> Result<BlockHeader> {
    let offset = cursor.position() as usize;
    let tag = read_tag(cursor)?;
    if tag != expected {
        return Err(Error::MalformedFunction {
            offset,
            reason: format!("expected block tag {expected:?}, found {tag:?}"),
        });
    }
    let size = read_u32(cursor, offset)?;
    Ok(BlockHeader { tag, size })
}

fn read_u32(cursor: &mut Cursor<&[u8]>, context_offset: usize) -> Result<u32> {
    cursor.read_u32::<LittleEndian>().map_err(|_| Error::MalformedFunction {
        offset: context_offset,
        reason: "unexpected end of data reading u32".to_string(),
    })
}

fn read_u16(cursor: &mut Cursor<&[u8]>, context_offset: usize) -> Result<u16> {
    cursor.read_u16::<LittleEndian>().map_err(|_| Error::MalformedFunction {
        offset: context_offset,
        reason: "unexpected end of data reading u16".to_string(),
    })
}

fn read_f32(cursor: &mut Cursor<&[u8]>, context_offset: usize) -> Result<f32> {
    cursor.read_f32::<LittleEndian>().map_err(|_| Error::MalformedFunction {
        offset: context_offset,
        reason: "unexpected end of data reading f32".to_string(),
    })
}

fn read_nul_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let offset = cursor.position() as usize;
    let mut bytes = Vec::new();
    loop {
        let mut b = [0u8; 1];
        cursor.read_exact(&mut b).map_err(|_| Error::MalformedFunction {
            offset,
            reason: "unterminated string".to_string(),
        })?;
        if b[0] == 0 {
            break;
        }
        bytes.push(b[0]);
    }
    String::from_utf8(bytes).map_err(|_| Error::MalformedFunction {
        offset,
        reason: "string is not valid utf-8".to_string(),
    })
}

/// Parse every function record in `data`, grouping them into scripts by
/// script name in first-seen order (spec.md §4.5).
pub fn parse_bytecode(data: &[u8]) -> Result<Vec<Script>> {
    let mut cursor = Cursor::new(data);
    let mut scripts: Vec<Script> = Vec::new();

    loop {
        let start_of_record = cursor.position() as usize;
        if start_of_record == data.len() {
            break;
        }
        let tag = read_tag(&mut cursor)?;
        if tag != FUNCTION_START {
            return Err(Error::MalformedFunction {
                offset: start_of_record,
                reason: format!("expected FUNCTION_START, found {tag:?}"),
            });
        }
        let function_length = read_u32(&mut cursor, start_of_record)?;
        let function_end_offset = cursor.position() as usize + function_length as usize;

        let function = parse_function_body(&mut cursor)?;

        if cursor.position() as usize != function_end_offset {
            return Err(Error::MalformedFunction {
                offset: cursor.position() as usize,
                reason: format!(
                    "reached end of function data but {} bytes remain before the declared end",
                    function_end_offset as i64 - cursor.position() as i64
                ),
            });
        }

        match scripts.iter_mut().find(|s| s.name == function.script_name) {
            Some(script) => script.functions_by_uid.push((function.uid.clone(), function)),
            None => scripts.push(Script {
                name: function.script_name.clone(),
                functions_by_uid: vec![(function.uid.clone(), function)],
            }),
        }
    }

    Ok(scripts)
}

fn parse_function_body(cursor: &mut Cursor<&[u8]>) -> Result<Function> {
    // Mystery block: declared size is always 0, but it carries six bytes of
    // inline data that aren't counted toward that size (an original quirk).
    let mystery_offset = cursor.position() as usize;
    let mystery = read_block_header(cursor, MYSTERY)?;
    if mystery.size != 0 {
        return Err(Error::MalformedFunction {
            offset: mystery_offset,
            reason: format!("mystery block has non-zero size {}", mystery.size),
        });
    }
    let value1 = read_u32(cursor, mystery_offset)?;
    if value1 != MYSTERY_VALUE_1 {
        return Err(Error::MalformedFunction {
            offset: mystery_offset,
            reason: format!("unexpected mystery block value1 {value1}"),
        });
    }
    let value2 = read_u16(cursor, mystery_offset)?;
    if value2 != MYSTERY_VALUE_2 {
        return Err(Error::MalformedFunction {
            offset: mystery_offset,
            reason: format!("unexpected mystery block value2 {value2}"),
        });
    }

    // Info block.
    let info_offset = cursor.position() as usize;
    let info = read_block_header(cursor, INFO)?;
    let info_body_start = cursor.position() as usize;
    let uid = read_nul_string(cursor)?;
    let name = read_nul_string(cursor)?;
    let script_name = read_nul_string(cursor)?;
    let consumed = cursor.position() as usize - info_body_start;
    if consumed > info.size as usize {
        return Err(Error::MalformedFunction {
            offset: info_offset,
            reason: "info block strings overran declared block size".to_string(),
        });
    }
    let remaining = info.size as usize - consumed;
    let mut info_extra = vec![0u8; remaining];
    cursor.read_exact(&mut info_extra).map_err(|_| Error::MalformedFunction {
        offset: info_offset,
        reason: "unexpected end of data reading info block trailer".to_string(),
    })?;

    // Strings block.
    let strings_offset = cursor.position() as usize;
    let strings_header = read_block_header(cursor, STRINGS)?;
    let strings_block_start = cursor.position() as usize;
    let strings_end = strings_block_start + strings_header.size as usize;
    let mut strings = Vec::new();
    while (cursor.position() as usize) < strings_end {
        let offset_in_block = cursor.position() as usize - strings_block_start;
        let s = read_nul_string(cursor)?;
        strings.push((offset_in_block as u32, s));
    }
    if cursor.position() as usize != strings_end {
        return Err(Error::MalformedFunction {
            offset: strings_offset,
            reason: "strings block did not end on its declared boundary".to_string(),
        });
    }

    // Variables (constant pool) block.
    let variables_offset = cursor.position() as usize;
    let variables_header = read_block_header(cursor, VARIABLES)?;
    let variables_end = cursor.position() as usize + variables_header.size as usize;
    let mut constants = Vec::new();
    while (cursor.position() as usize) < variables_end {
        let type_offset = cursor.position() as usize;
        let variable_type = read_u32(cursor, type_offset)?;
        let constant = match variable_type {
            0x102 => Constant::Int(read_u32(cursor, type_offset)? as i32),
            0x103 => Constant::Float(read_f32(cursor, type_offset)?),
            0x204 => {
                let string_offset = read_u32(cursor, type_offset)?;
                let s = strings
                    .iter()
                    .find(|(o, _)| *o == string_offset)
                    .map(|(_, s)| s.clone())
                    .ok_or_else(|| Error::MalformedFunction {
                        offset: type_offset,
                        reason: format!("variable string offset {string_offset} not found"),
                    })?;
                Constant::String(s)
            }
            other => {
                return Err(Error::MalformedFunction {
                    offset: type_offset,
                    reason: format!("unknown variable type {other:#x}"),
                })
            }
        };
        constants.push(constant);
    }
    if cursor.position() as usize != variables_end {
        return Err(Error::MalformedFunction {
            offset: variables_offset,
            reason: "variables block did not end on its declared boundary".to_string(),
        });
    }

    // Instructions block.
    let instructions_offset = cursor.position() as usize;
    let instructions_header = read_block_header(cursor, INSTRUCTIONS)?;
    let instructions_end = cursor.position() as usize + instructions_header.size as usize;
    let mut instructions = Vec::new();
    while (cursor.position() as usize) < instructions_end {
        let word = read_u32(cursor, instructions_offset)?;
        instructions.push(Instruction { word });
    }
    if cursor.position() as usize != instructions_end {
        return Err(Error::MalformedFunction {
            offset: instructions_offset,
            reason: "instructions block did not end on its declared boundary".to_string(),
        });
    }

    // Lines block.
    let lines_offset = cursor.position() as usize;
    let lines_header = read_block_header(cursor, LINES)?;
    let lines_end = cursor.position() as usize + lines_header.size as usize;
    let mut lines = Vec::new();
    while (cursor.position() as usize) < lines_end {
        let line_number = read_u32(cursor, lines_offset)?;
        let start_index = read_u32(cursor, lines_offset)? as usize;
        let end_index = read_u32(cursor, lines_offset)? as usize;
        lines.push(LineRange {
            line_number,
            start_index,
            end_index,
        });
    }
    if cursor.position() as usize != lines_end {
        return Err(Error::MalformedFunction {
            offset: lines_offset,
            reason: "lines block did not end on its declared boundary".to_string(),
        });
    }

    // Function terminator.
    let end_offset = cursor.position() as usize;
    let end_header = read_block_header(cursor, FUNCTION_END)?;
    if end_header.size != 0 {
        return Err(Error::MalformedFunction {
            offset: end_offset,
            reason: format!(
                "function-end block has a size of {} instead of the expected 0",
                end_header.size
            ),
        });
    }

    Ok(Function {
        uid,
        name,
        script_name,
        info_extra,
        strings,
        constants,
        instructions,
        lines,
    })
}

/// Re-emit a single function record exactly as it was parsed (block tags,
/// sizes, and payloads), used to satisfy the block-level round-trip property
/// (spec.md §8 property 6).
pub fn write_function(function: &Function) -> Vec<u8> {
    let mut body = Vec::new();

    body.extend_from_slice(&MYSTERY);
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&MYSTERY_VALUE_1.to_le_bytes());
    body.extend_from_slice(&MYSTERY_VALUE_2.to_le_bytes());

    let mut info_body = Vec::new();
    info_body.extend_from_slice(function.uid.as_bytes());
    info_body.push(0);
    info_body.extend_from_slice(function.name.as_bytes());
    info_body.push(0);
    info_body.extend_from_slice(function.script_name.as_bytes());
    info_body.push(0);
    info_body.extend_from_slice(&function.info_extra);
    body.extend_from_slice(&INFO);
    body.extend_from_slice(&(info_body.len() as u32).to_le_bytes());
    body.extend_from_slice(&info_body);

    let mut strings_body = vec![0u8; strings_block_len(&function.strings)];
    for (offset, s) in &function.strings {
        let start = *offset as usize;
        strings_body[start..start + s.len()].copy_from_slice(s.as_bytes());
        strings_body[start + s.len()] = 0;
    }
    body.extend_from_slice(&STRINGS);
    body.extend_from_slice(&(strings_body.len() as u32).to_le_bytes());
    body.extend_from_slice(&strings_body);

    let mut variables_body = Vec::new();
    for constant in &function.constants {
        match constant {
            Constant::Int(i) => {
                variables_body.extend_from_slice(&0x102u32.to_le_bytes());
                variables_body.extend_from_slice(&(*i as u32).to_le_bytes());
            }
            Constant::Float(f) => {
                variables_body.extend_from_slice(&0x103u32.to_le_bytes());
                variables_body.extend_from_slice(&f.to_le_bytes());
            }
            Constant::String(s) => {
                let offset = function
                    .strings
                    .iter()
                    .find(|(_, candidate)| candidate == s)
                    .map(|(o, _)| *o)
                    .unwrap_or(0);
                variables_body.extend_from_slice(&0x204u32.to_le_bytes());
                variables_body.extend_from_slice(&offset.to_le_bytes());
            }
        }
    }
    body.extend_from_slice(&VARIABLES);
    body.extend_from_slice(&(variables_body.len() as u32).to_le_bytes());
    body.extend_from_slice(&variables_body);

    let mut instructions_body = Vec::new();
    for instruction in &function.instructions {
        instructions_body.extend_from_slice(&instruction.word.to_le_bytes());
    }
    body.extend_from_slice(&INSTRUCTIONS);
    body.extend_from_slice(&(instructions_body.len() as u32).to_le_bytes());
    body.extend_from_slice(&instructions_body);

    let mut lines_body = Vec::new();
    for line in &function.lines {
        lines_body.extend_from_slice(&line.line_number.to_le_bytes());
        lines_body.extend_from_slice(&(line.start_index as u32).to_le_bytes());
        lines_body.extend_from_slice(&(line.end_index as u32).to_le_bytes());
    }
    body.extend_from_slice(&LINES);
    body.extend_from_slice(&(lines_body.len() as u32).to_le_bytes());
    body.extend_from_slice(&lines_body);

    body.extend_from_slice(&FUNCTION_END);
    body.extend_from_slice(&0u32.to_le_bytes());

    let mut record = Vec::new();
    record.extend_from_slice(&FUNCTION_START);
    record.extend_from_slice(&(body.len() as u32).to_le_bytes());
    record.extend_from_slice(&body);
    record
}

fn strings_block_len(strings: &[(u32, String)]) -> usize {
    strings
        .iter()
        .map(|(offset, s)| *offset as usize + s.len() + 1)
        .max()
        .unwrap_or(0)
}

/// Re-emit every function of every script, in the order scripts and
/// functions were encountered while parsing.
pub fn write_bytecode(scripts: &[Script]) -> Vec<u8> {
    let mut out = Vec::new();
    for script in scripts {
        for (_, function) in &script.functions_by_uid {
            out.extend_from_slice(&write_function(function));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_function() -> Function {
        Function {
            uid: "uid-1".to_string(),
            name: "main".to_string(),
            script_name: "Boot".to_string(),
            info_extra: vec![0, 0, 0, 0, 0, 0, 0, 0],
            strings: vec![(0, "ping".to_string())],
            constants: vec![Constant::String("ping".to_string())],
            instructions: vec![
                Instruction { word: 1 | (0 << 23) },
                Instruction { word: 23 | (1 << 23) },
            ],
            lines: vec![LineRange {
                line_number: 1,
                start_index: 0,
                end_index: 2,
            }],
        }
    }

    #[test]
    fn function_round_trips_at_block_level() {
        let function = sample_function();
        let bytes = write_function(&function);
        let scripts = parse_bytecode(&bytes).unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].functions_by_uid[0].1, function);

        let rewritten = write_bytecode(&scripts);
        assert_eq!(rewritten, bytes);
    }

    #[test]
    fn s4_minimal_function_has_one_script_one_function_one_line() {
        let function = sample_function();
        let bytes = write_function(&function);
        let scripts = parse_bytecode(&bytes).unwrap();

        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].name, "Boot");
        assert_eq!(scripts[0].functions_by_uid.len(), 1);
        let parsed_function = &scripts[0].functions_by_uid[0].1;
        assert_eq!(parsed_function.lines.len(), 1);
        assert_eq!(parsed_function.instructions.len(), 2);
    }

    #[test]
    fn same_script_name_groups_functions_in_first_seen_order() {
        let mut f1 = sample_function();
        f1.uid = "a".to_string();
        let mut f2 = sample_function();
        f2.uid = "b".to_string();
        f2.name = "other".to_string();

        let mut bytes = write_function(&f1);
        bytes.extend_from_slice(&write_function(&f2));

        let scripts = parse_bytecode(&bytes).unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].functions_by_uid.len(), 2);
        assert_eq!(scripts[0].functions_by_uid[0].0, "a");
        assert_eq!(scripts[0].functions_by_uid[1].0, "b");
    }

    #[test]
    fn truncated_function_is_malformed() {
        let function = sample_function();
        let mut bytes = write_function(&function);
        bytes.truncate(bytes.len() - 4);
        assert!(parse_bytecode(&bytes).is_err());
    }

    #[test]
    fn mystery_block_wrong_value_is_malformed() {
        let function = sample_function();
        let mut bytes = write_function(&function);
        // Corrupt MYSTERY_VALUE_1, located right after FUNCTION_START(4) +
        // length(4) + MYSTERY tag(4) + MYSTERY size(4).
        bytes[16] = 0xFF;
        assert!(parse_bytecode(&bytes).is_err());
    }
}
