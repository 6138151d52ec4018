//! Fixed-width property cell encoding
//!
//! Log records carry property values as text. They are parsed into a
//! `PropValue` once, then written little-endian into a cell of
//! `DataType::width()` bytes. String cells hold the string buffer surrogate.

use byteorder::{ByteOrder, LittleEndian};
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

use crate::error::{GraphError, Result};
use crate::types::{DataType, PropValue};

const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Bytes of a null bitmap covering `columns` cells
#[inline]
pub fn null_bitmap_bytes(columns: usize) -> usize {
  columns.div_ceil(8)
}

#[inline]
pub fn bitmap_get(bitmap: &[u8], index: usize) -> bool {
  bitmap[index / 8] & (1 << (index % 8)) != 0
}

#[inline]
pub fn bitmap_set(bitmap: &mut [u8], index: usize, value: bool) {
  if value {
    bitmap[index / 8] |= 1 << (index % 8);
  } else {
    bitmap[index / 8] &= !(1 << (index % 8));
  }
}

fn bad(dtype: DataType, text: &str) -> GraphError {
  GraphError::malformed(format!("cannot parse {text:?} as {dtype}"))
}

/// Parse a textual property value. Empty text is null.
pub fn parse_value(dtype: DataType, text: &str) -> Result<Option<PropValue>> {
  if text.is_empty() {
    return Ok(None);
  }
  let value = match dtype {
    DataType::Int => PropValue::Int(text.trim().parse().map_err(|_| bad(dtype, text))?),
    DataType::Long => PropValue::Long(text.trim().parse().map_err(|_| bad(dtype, text))?),
    DataType::Float => PropValue::Float(text.trim().parse().map_err(|_| bad(dtype, text))?),
    DataType::Double => PropValue::Double(text.trim().parse().map_err(|_| bad(dtype, text))?),
    DataType::String => PropValue::String(text.to_string()),
    DataType::Char => PropValue::Char(text.as_bytes()[0]),
    DataType::Date => PropValue::Date(parse_date(text).ok_or_else(|| bad(dtype, text))?),
    DataType::DateTime => {
      PropValue::DateTime(parse_datetime(text).ok_or_else(|| bad(dtype, text))?)
    }
    DataType::Time => PropValue::Time(parse_time(text).ok_or_else(|| bad(dtype, text))?),
    DataType::Timestamp => {
      PropValue::Timestamp(parse_datetime(text).ok_or_else(|| bad(dtype, text))?)
    }
  };
  Ok(Some(value))
}

fn parse_date(text: &str) -> Option<i32> {
  if let Ok(days) = text.trim().parse::<i32>() {
    return Some(days);
  }
  let date = Date::parse(text.trim(), format_description!("[year]-[month]-[day]")).ok()?;
  Some(date.to_julian_day() - UNIX_EPOCH_JULIAN_DAY)
}

fn parse_datetime(text: &str) -> Option<i64> {
  let text = text.trim();
  if let Ok(millis) = text.parse::<i64>() {
    return Some(millis);
  }
  let parsed = PrimitiveDateTime::parse(
    text,
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
  )
  .or_else(|_| {
    PrimitiveDateTime::parse(
      text,
      format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
  })
  .or_else(|_| {
    PrimitiveDateTime::parse(
      text,
      format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    )
  })
  .ok()?;
  let utc = parsed.assume_utc();
  Some(utc.unix_timestamp() * 1000 + utc.millisecond() as i64)
}

fn parse_time(text: &str) -> Option<i32> {
  let text = text.trim();
  if let Ok(millis) = text.parse::<i32>() {
    return Some(millis);
  }
  let time = Time::parse(text, format_description!("[hour]:[minute]:[second]")).ok()?;
  let millis = time.hour() as i64 * 3_600_000
    + time.minute() as i64 * 60_000
    + time.second() as i64 * 1000
    + time.millisecond() as i64;
  debug_assert!(millis < MILLIS_PER_DAY);
  Some(millis as i32)
}

/// Write `value` into `out`. String values write `surrogate` instead.
pub fn encode_cell(value: &PropValue, surrogate: u64, out: &mut [u8]) {
  match value {
    PropValue::Int(v) | PropValue::Date(v) | PropValue::Time(v) => LittleEndian::write_i32(out, *v),
    PropValue::Long(v) | PropValue::DateTime(v) | PropValue::Timestamp(v) => {
      LittleEndian::write_i64(out, *v)
    }
    PropValue::Float(v) => LittleEndian::write_f32(out, *v),
    PropValue::Double(v) => LittleEndian::write_f64(out, *v),
    PropValue::String(_) => LittleEndian::write_u64(out, surrogate),
    PropValue::Char(v) => out[0] = *v,
  }
}

/// Read one cell. String cells are resolved through `resolve`.
pub fn decode_cell(
  dtype: DataType,
  bytes: &[u8],
  resolve: impl FnOnce(u64) -> Option<String>,
) -> Option<PropValue> {
  let value = match dtype {
    DataType::Int => PropValue::Int(LittleEndian::read_i32(bytes)),
    DataType::Long => PropValue::Long(LittleEndian::read_i64(bytes)),
    DataType::Float => PropValue::Float(LittleEndian::read_f32(bytes)),
    DataType::Double => PropValue::Double(LittleEndian::read_f64(bytes)),
    DataType::String => PropValue::String(resolve(LittleEndian::read_u64(bytes))?),
    DataType::Char => PropValue::Char(bytes[0]),
    DataType::Date => PropValue::Date(LittleEndian::read_i32(bytes)),
    DataType::DateTime => PropValue::DateTime(LittleEndian::read_i64(bytes)),
    DataType::Time => PropValue::Time(LittleEndian::read_i32(bytes)),
    DataType::Timestamp => PropValue::Timestamp(LittleEndian::read_i64(bytes)),
  };
  Some(value)
}

/// Raw surrogate stored in a string cell
#[inline]
pub fn read_surrogate(bytes: &[u8]) -> u64 {
  LittleEndian::read_u64(bytes)
}
