//! The replay header: a little-endian, self-delimiting binary format with a
//! recursive Lua-like `mods` value. Parsed once per match and
//! immutable afterward.

mod lua;
mod reader;

pub use lua::{LuaScalar, LuaValue};

use std::collections::HashMap;

use crate::connection::Connection;
use crate::error::ReplayError;
use lua::read_cstring;
use reader::GeneratorData;

/// The decoded replay header plus the exact bytes it was parsed from.
#[derive(Debug, Clone)]
pub struct ReplayHeader {
    /// Exact bytes the header was parsed from — what gets written to readers
    /// and persisted, bit-for-bit.
    pub raw_bytes: Vec<u8>,
    pub version: String,
    pub replay_version: String,
    pub map_name: String,
    pub mods: LuaValue,
    pub remaining_timeouts: HashMap<String, u32>,
    pub cheats_enabled: u8,
    pub random_seed: u32,
}

async fn read_u32(gen: &mut GeneratorData<'_>) -> Result<u32, ReplayError> {
    let bytes = gen.read_exactly(4).await?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

async fn read_i8(gen: &mut GeneratorData<'_>) -> Result<i8, ReplayError> {
    let bytes = gen.read_exactly(1).await?;
    Ok(bytes[0] as i8)
}

async fn read_u8(gen: &mut GeneratorData<'_>) -> Result<u8, ReplayError> {
    let bytes = gen.read_exactly(1).await?;
    Ok(bytes[0])
}

/// Parses one replay header from `conn`, bit-exactly per the documented parse
/// order. Returns the header plus any bytes read past it (the body bytes
/// that arrived in the same chunk as the header's tail), which the caller
/// must push into the canonical stream.
pub async fn parse_header(
    conn: &mut dyn Connection,
    max_len: usize,
) -> Result<(ReplayHeader, Vec<u8>), ReplayError> {
    let mut gen = GeneratorData::new(conn, max_len);

    let version = read_cstring(&mut gen).await?;
    gen.read_exactly(3).await?; // skip

    let replay_version_and_map = read_cstring(&mut gen).await?;
    let (replay_version, map_name) = replay_version_and_map
        .split_once("\r\n")
        .ok_or_else(|| ReplayError::MalformedData("missing replay version/map separator".into()))?;
    let replay_version = replay_version.to_owned();
    let map_name = map_name.to_owned();
    gen.read_exactly(4).await?; // skip

    read_u32(&mut gen).await?; // mod (data?) size, unused
    let mods = lua::read_lua_value(&mut gen, 1).await?;

    let scenario_size = read_u32(&mut gen).await? as usize;
    gen.read_exactly(scenario_size).await?; // scenario info, discarded

    let player_count = read_i8(&mut gen).await?;
    let mut remaining_timeouts = HashMap::new();
    for _ in 0..player_count.max(0) {
        let name = read_cstring(&mut gen).await?;
        let timeout = read_u32(&mut gen).await?;
        remaining_timeouts.insert(name, timeout);
    }

    let cheats_enabled = read_u8(&mut gen).await?;

    let army_count = read_u8(&mut gen).await?;
    for _ in 0..army_count {
        let army_size = read_u32(&mut gen).await? as usize;
        gen.read_exactly(army_size).await?; // army body, discarded
        let player_id = read_u8(&mut gen).await?;
        if player_id != 255 {
            gen.read_exactly(1).await?; // unknown skip
        }
    }

    let random_seed = read_u32(&mut gen).await?;

    let raw_bytes = gen.consumed().to_vec();
    let leftover = gen.leftover().to_vec();

    Ok((
        ReplayHeader {
            raw_bytes,
            version,
            replay_version,
            map_name,
            mods,
            remaining_timeouts,
            cheats_enabled,
            random_seed,
        },
        leftover,
    ))
}
