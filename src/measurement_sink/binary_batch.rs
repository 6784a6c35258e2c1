use super::MeasurementsByPart;
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, MeasurementValue, PartIndex};
use crate::warn;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A value that cannot be packed into its declared field format.
#[derive(Debug, PartialEq)]
pub struct EncodeError {
    pub field: &'static str,
    pub format: FieldFormat,
    pub value: MeasurementValue,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot pack {:?} into field {} ({})", self.value, self.field, self.format.descriptor())
    }
}

impl std::error::Error for EncodeError {}

/// Sampling thinning factor: 1 keeps everything, `n` keeps about one row in `n`.
pub fn drop_rate(last_send_duration: Duration, target_period: Duration) -> f64 {
    if target_period.is_zero() {
        return 1.0;
    }
    (last_send_duration.as_secs_f64() / target_period.as_secs_f64()).max(1.0)
}

/// Indices (ascending) of the rows kept out of `count` at the given drop rate.
///
/// Rows are counted from the newest one, so the newest row always survives.
pub fn kept_indices(count: usize, drop_rate: f64) -> Vec<usize> {
    let mut kept: Vec<usize> = (0..count)
        .rev()
        .enumerate()
        .filter(|(k, _)| (*k as f64) % drop_rate < 1.0)
        .map(|(_, i)| i)
        .collect();
    kept.reverse();
    kept
}

fn interpolate(start: DateTime<Utc>, end: DateTime<Utc>, i: usize, n: usize) -> f64 {
    let start_s = start.timestamp_micros() as f64 / 1e6;
    let end_s = end.timestamp_micros() as f64 / 1e6;
    start_s + (end_s - start_s) * (i + 1) as f64 / n as f64
}

struct PartRows<'a> {
    shape: &'static [MeasurementField],
    rows: Vec<(f64, &'a MeasurementRow)>,
}

/// Packs accumulated ticks into one telemetry batch.
///
/// Per part with rows: `[u8 part index][u16 row count][rows]`, each row an
/// `f64` timestamp followed by its fields. All big-endian. Rows that fail to
/// pack are logged and left out of the count.
pub fn encode_batch(ticks: &[Arc<MeasurementsByPart>], drop_rate: f64) -> Vec<u8> {
    let mut by_part: BTreeMap<PartIndex, PartRows> = BTreeMap::new();
    for tick in ticks {
        for entry in tick.iter() {
            let n = entry.rows.len();
            let part = by_part.entry(entry.part).or_insert_with(|| PartRows { shape: entry.shape, rows: Vec::new() });
            for (i, row) in entry.rows.iter().enumerate() {
                part.rows.push((interpolate(entry.start, entry.end, i, n), row));
            }
        }
    }

    let mut out = Vec::new();
    for (index, part) in by_part {
        let Ok(index_byte) = u8::try_from(index) else {
            warn!("Part index {index} does not fit a telemetry batch, skipping.");
            continue;
        };
        let mut kept = kept_indices(part.rows.len(), drop_rate);
        if kept.len() > usize::from(u16::MAX) {
            kept.drain(..kept.len() - usize::from(u16::MAX));
        }

        let mut body = Vec::new();
        let mut count: u16 = 0;
        for i in kept {
            let (timestamp, row) = part.rows[i];
            let mut packed = timestamp.to_be_bytes().to_vec();
            match encode_row(part.shape, row, &mut packed) {
                Ok(()) => {
                    body.extend_from_slice(&packed);
                    count += 1;
                }
                Err(e) => warn!("Dropping row of part {index}: {e}"),
            }
        }
        if count == 0 {
            continue;
        }
        out.push(index_byte);
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(&body);
    }
    out
}

/// Appends one row packed per `shape`. Missing trailing fields are zero.
///
/// # Errors
/// Returns an [`EncodeError`] for values that do not fit their field.
pub fn encode_row(
    shape: &[MeasurementField],
    row: &[MeasurementValue],
    out: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    for (i, f) in shape.iter().enumerate() {
        match row.get(i) {
            Some(value) => encode_value(*f, value, out)?,
            None => out.extend(std::iter::repeat_n(0u8, f.format.width())),
        }
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn encode_value(f: MeasurementField, value: &MeasurementValue, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    let err = || EncodeError { field: f.name, format: f.format, value: value.clone() };
    let as_int = || -> Result<i128, EncodeError> {
        match value {
            MeasurementValue::Bool(b) => Ok(i128::from(*b)),
            MeasurementValue::Int(i) => Ok(i128::from(*i)),
            MeasurementValue::Float(x) if x.is_finite() => Ok(*x as i128),
            _ => Err(err()),
        }
    };
    let as_float = || -> Result<f64, EncodeError> {
        match value {
            MeasurementValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            MeasurementValue::Int(i) => Ok(*i as f64),
            MeasurementValue::Float(x) => Ok(*x),
            MeasurementValue::Text(_) => Err(err()),
        }
    };
    match f.format {
        FieldFormat::Bool => out.push(u8::from(as_int()? != 0)),
        FieldFormat::U8 => out.push(u8::try_from(as_int()?).map_err(|_| err())?),
        FieldFormat::I8 => out.extend(i8::try_from(as_int()?).map_err(|_| err())?.to_be_bytes()),
        FieldFormat::U16 => out.extend(u16::try_from(as_int()?).map_err(|_| err())?.to_be_bytes()),
        FieldFormat::I16 => out.extend(i16::try_from(as_int()?).map_err(|_| err())?.to_be_bytes()),
        FieldFormat::U32 => out.extend(u32::try_from(as_int()?).map_err(|_| err())?.to_be_bytes()),
        FieldFormat::I32 => out.extend(i32::try_from(as_int()?).map_err(|_| err())?.to_be_bytes()),
        FieldFormat::U64 => out.extend(u64::try_from(as_int()?).map_err(|_| err())?.to_be_bytes()),
        FieldFormat::I64 => out.extend(i64::try_from(as_int()?).map_err(|_| err())?.to_be_bytes()),
        FieldFormat::F32 => out.extend((as_float()? as f32).to_be_bytes()),
        FieldFormat::F64 => out.extend(as_float()?.to_be_bytes()),
        FieldFormat::Str(len) => {
            let MeasurementValue::Text(text) = value else { return Err(err()) };
            let bytes = text.as_bytes();
            let take = bytes.len().min(len);
            out.extend_from_slice(&bytes[..take]);
            out.extend(std::iter::repeat_n(0u8, len - take));
        }
    }
    Ok(())
}
