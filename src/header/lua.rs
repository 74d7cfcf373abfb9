//! The recursive Lua-like value embedded in the replay header.
//!
//! Tagged variant with scalar-only keys enforced at construction time; tables
//! are stored as an ordered association list so insertion order stays
//! observable.

use crate::error::ReplayError;

use super::reader::GeneratorData;

const MAX_TABLE_DEPTH: u32 = 30;

#[repr(u8)]
enum LuaTag {
    Number = 0,
    String = 1,
    Nil = 2,
    Bool = 3,
    Table = 4,
    TableEnd = 5,
}

impl TryFrom<u8> for LuaTag {
    type Error = ReplayError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LuaTag::Number),
            1 => Ok(LuaTag::String),
            2 => Ok(LuaTag::Nil),
            3 => Ok(LuaTag::Bool),
            4 => Ok(LuaTag::Table),
            5 => Ok(LuaTag::TableEnd),
            other => Err(ReplayError::MalformedData(format!(
                "unknown lua value tag {other}"
            ))),
        }
    }
}

/// A table key, which must be a scalar — tables cannot key other tables.
#[derive(Debug, Clone, PartialEq)]
pub enum LuaScalar {
    Number(f32),
    String(String),
    Nil,
    Bool(bool),
}

/// A decoded Lua-like value.
#[derive(Debug, Clone, PartialEq)]
pub enum LuaValue {
    Number(f32),
    String(String),
    Nil,
    Bool(bool),
    Table(Vec<(LuaScalar, LuaValue)>),
}

impl TryFrom<LuaValue> for LuaScalar {
    type Error = ReplayError;

    fn try_from(value: LuaValue) -> Result<Self, Self::Error> {
        match value {
            LuaValue::Number(n) => Ok(LuaScalar::Number(n)),
            LuaValue::String(s) => Ok(LuaScalar::String(s)),
            LuaValue::Nil => Ok(LuaScalar::Nil),
            LuaValue::Bool(b) => Ok(LuaScalar::Bool(b)),
            LuaValue::Table(_) => Err(ReplayError::MalformedData(
                "lua tables as table keys are not supported".into(),
            )),
        }
    }
}

async fn read_f32(gen: &mut GeneratorData<'_>) -> Result<f32, ReplayError> {
    let bytes = gen.read_exactly(4).await?;
    let arr: [u8; 4] = bytes.try_into().expect("read_exactly(4) returns 4 bytes");
    Ok(f32::from_le_bytes(arr))
}

async fn read_u8(gen: &mut GeneratorData<'_>) -> Result<u8, ReplayError> {
    let bytes = gen.read_exactly(1).await?;
    Ok(bytes[0])
}

/// Reads a null-terminated, UTF-8 C-string.
pub async fn read_cstring(gen: &mut GeneratorData<'_>) -> Result<String, ReplayError> {
    let bytes = gen.read_until(0).await?;
    let without_nul = &bytes[..bytes.len() - 1];
    String::from_utf8(without_nul.to_vec())
        .map_err(|e| ReplayError::MalformedData(format!("invalid utf-8 string: {e}")))
}

/// Reads one Lua value. `can_be_table_end` permits this call site to return
/// the `TableEnd` sentinel (used only for table keys, to detect the end of
/// the table); any other caller seeing `TableEnd` is a parse failure.
async fn read_lua_value_inner(
    gen: &mut GeneratorData<'_>,
    depth: u32,
    can_be_table_end: bool,
) -> Result<Option<LuaValue>, ReplayError> {
    let tag = LuaTag::try_from(read_u8(gen).await?)?;
    match tag {
        LuaTag::Number => Ok(Some(LuaValue::Number(read_f32(gen).await?))),
        LuaTag::String => Ok(Some(LuaValue::String(read_cstring(gen).await?))),
        LuaTag::Nil => Ok(Some(LuaValue::Nil)),
        // Not a typo: this matches the game's on-wire boolean convention.
        LuaTag::Bool => Ok(Some(LuaValue::Bool(read_u8(gen).await? == 0))),
        LuaTag::TableEnd => {
            if can_be_table_end {
                Ok(None)
            } else {
                Err(ReplayError::MalformedData(
                    "unexpected lua table end".into(),
                ))
            }
        }
        LuaTag::Table => {
            // `depth` is the 1-indexed nesting level of *this* table: a
            // lone table is depth 1, a table nested inside it is depth 2,
            // and so on. Depth 30 parses; depth 31 fails.
            if depth > MAX_TABLE_DEPTH {
                return Err(ReplayError::MalformedData(
                    "exceeded maximum lua table nesting".into(),
                ));
            }
            let mut entries = Vec::new();
            loop {
                let key = read_lua_value_inner(gen, depth + 1, true).await?;
                let Some(key) = key else {
                    return Ok(Some(LuaValue::Table(entries)));
                };
                let key = LuaScalar::try_from(key)?;
                let value = Box::pin(read_lua_value(gen, depth + 1)).await?;
                entries.push((key, value));
            }
        }
    }
}

/// Reads one top-level Lua value (never returns the `TableEnd` sentinel).
pub async fn read_lua_value(
    gen: &mut GeneratorData<'_>,
    depth: u32,
) -> Result<LuaValue, ReplayError> {
    match read_lua_value_inner(gen, depth, false).await? {
        Some(v) => Ok(v),
        None => unreachable!("can_be_table_end=false never yields None"),
    }
}
