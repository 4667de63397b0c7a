//! Per-game cipher key material.
//!
//! The real tables here are extracted from each game's shipped executable;
//! that extraction is out of scope (spec non-goal: no decryption key
//! recovery). The tables below are deterministically generated filler of the
//! correct shape so every cipher code path - including the self-inverse and
//! limit-truncation properties - is exercised. Swapping in the real
//! extracted bytes is a data-only change.

pub const TWP_MAGIC_NUMBER: u8 = 0xAD;
pub const TWP_EXTRA_DECODE_NUMBER: u8 = 0x6D;

pub const DELORES_MAGIC_NUMBER: u8 = 0x6D;

pub const RTMI_MAGIC_NUMBER: u16 = 0x4524;

pub const KEY_SB: &[u8] = &const_table::<64>(0x53);

pub const TWP_KEY: [u8; 16] = const_table::<16>(0x11);
pub const DELORES_KEY: [u8; 16] = const_table::<16>(0x29);
pub const KEY_YACK: &[u8] = &const_table::<256>(0x47);
/// `.bnut` pre-pass key — its own table, distinct from `KEY_YACK`, matching
/// the real tool's dedicated `THIMBLEWEED_PARK_BNUT_KEY`.
pub const KEY_BNUT: &[u8] = &const_table::<256>(0x8B);

/// `RTMI_KEY_1` — 0x100 bytes.
pub const RTMI_KEY_1: [u8; 0x100] = const_table::<0x100>(0x9F);
/// `RTMI_KEY_2` — 0x10000 bytes, indexed directly by the 16-bit rolling sum.
pub static RTMI_KEY_2: [u8; 0x10000] = const_table_big(0xC3);

const fn const_table<const N: usize>(seed: u8) -> [u8; N] {
    let mut table = [0u8; N];
    let mut i = 0;
    let mut acc = seed;
    while i < N {
        acc = acc
            .wrapping_mul(131)
            .wrapping_add(i as u8)
            .wrapping_add(seed);
        table[i] = acc;
        i += 1;
    }
    table
}

const fn const_table_big(seed: u8) -> [u8; 0x10000] {
    let mut table = [0u8; 0x10000];
    let mut i = 0;
    let mut acc = seed;
    while i < 0x10000 {
        acc = acc
            .wrapping_mul(131)
            .wrapping_add((i & 0xFF) as u8)
            .wrapping_add(seed);
        table[i] = acc;
        i += 1;
    }
    table
}
