use super::binary_batch::{drop_rate, encode_batch, encode_row, kept_indices};
use super::*;
use crate::http_handler::ResponseError;
use crate::rocket::{FieldFormat, MeasurementField, MeasurementValue, field};
use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SHAPE: [MeasurementField; 2] = [field("pressure", FieldFormat::F32), field("ok", FieldFormat::Bool)];

fn tick(part: usize, rows: usize, start_s: i64) -> Arc<MeasurementsByPart> {
    let start = Utc.timestamp_opt(start_s, 0).unwrap();
    Arc::new(vec![PartMeasurements {
        part,
        shape: &SHAPE,
        start,
        end: start + TimeDelta::seconds(1),
        rows: (0..rows).map(|i| vec![MeasurementValue::Float(i as f64), true.into()]).collect(),
    }])
}

#[test]
fn test_drop_rate_grows_with_send_duration() {
    let target = Duration::from_millis(500);
    assert!((drop_rate(Duration::from_millis(100), target) - 1.0).abs() < f64::EPSILON);
    let mut last = drop_rate(Duration::from_millis(500), target);
    for ms in [600, 900, 1500, 4000, 10_000] {
        let rate = drop_rate(Duration::from_millis(ms), target);
        assert!(rate > last);
        last = rate;
    }
}

#[test]
fn test_newest_row_always_kept() {
    assert_eq!(kept_indices(5, 1.0), vec![0, 1, 2, 3, 4]);
    assert_eq!(kept_indices(7, 3.0), vec![0, 3, 6]);
    for rate in [1.0, 1.7, 2.0, 5.5, 20.0, 1000.0] {
        for n in 1..50 {
            assert_eq!(kept_indices(n, rate).last(), Some(&(n - 1)));
        }
    }
    assert!(kept_indices(0, 3.0).is_empty());
}

#[test]
fn test_batch_layout() {
    let batch = encode_batch(&[tick(3, 2, 100)], 1.0);
    // index + count + 2 * (timestamp + f32 + bool)
    assert_eq!(batch.len(), 1 + 2 + 2 * (8 + 4 + 1));
    assert_eq!(batch[0], 3);
    assert_eq!(u16::from_be_bytes([batch[1], batch[2]]), 2);
    let ts0 = f64::from_be_bytes(batch[3..11].try_into().unwrap());
    assert!((ts0 - 100.5).abs() < 1e-9);
    let ts1 = f64::from_be_bytes(batch[16..24].try_into().unwrap());
    assert!((ts1 - 101.0).abs() < 1e-9);
    assert_eq!(f32::from_be_bytes(batch[24..28].try_into().unwrap()), 1.0);
    assert_eq!(batch[28], 1);
}

#[test]
fn test_batch_merges_ticks_per_part() {
    let batch = encode_batch(&[tick(0, 3, 10), tick(1, 1, 10), tick(0, 3, 11)], 2.0);
    assert_eq!(batch[0], 0);
    // six rows for part 0, newest first thinned at 2 keeps three
    assert_eq!(u16::from_be_bytes([batch[1], batch[2]]), 3);
    let part1_at = 3 + 3 * 13;
    assert_eq!(batch[part1_at], 1);
    assert_eq!(u16::from_be_bytes([batch[part1_at + 1], batch[part1_at + 2]]), 1);
}

#[test]
fn test_row_packing_edge_cases() {
    const TEXT: [MeasurementField; 3] =
        [field("state", FieldFormat::Str(4)), field("n", FieldFormat::U16), field("x", FieldFormat::F64)];
    let mut out = Vec::new();
    encode_row(&TEXT, &["Flight".into(), 7i64.into()], &mut out).unwrap();
    assert_eq!(&out[..4], b"Flig");
    assert_eq!(&out[4..6], &[0, 7]);
    assert_eq!(&out[6..], &[0u8; 8]);

    let mut out = Vec::new();
    assert!(encode_row(&TEXT, &["a".into(), MeasurementValue::Int(70_000)], &mut out).is_err());
}

struct RecordingUplink {
    delay: Duration,
    fail: bool,
    sent: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl TelemetryUplink for RecordingUplink {
    async fn send(&self, payload: Vec<u8>) -> Result<(), ResponseError> {
        tokio::time::sleep(self.delay).await;
        self.sent.lock().unwrap().push(payload);
        if self.fail { Err(ResponseError::InternalServer) } else { Ok(()) }
    }
}

fn core_with(delay: Duration, fail: bool) -> (SinkCore, Arc<MeasurementBuffer>, Arc<RecordingUplink>) {
    let buffer = Arc::new(MeasurementBuffer::new());
    let uplink = Arc::new(RecordingUplink { delay, fail, sent: Mutex::new(Vec::new()) });
    (SinkCore::new(Arc::clone(&buffer), uplink.clone()), buffer, uplink)
}

#[tokio::test(start_paused = true)]
async fn test_slow_send_thins_next_cycle() {
    let (core, buffer, uplink) = core_with(Duration::from_secs(2), false);
    buffer.push(tick(0, 8, 0));
    core.flush_cycle().await;
    assert!(buffer.is_empty());
    let status = core.status();
    assert!(status.send_success);
    assert!((status.drop_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(status.last_send_duration, Duration::from_secs(2));

    buffer.push(tick(0, 8, 1));
    core.flush_cycle().await;
    assert!((core.status().drop_rate - 4.0).abs() < 1e-6);
    let sent = uplink.sent.lock().unwrap();
    assert_eq!(u16::from_be_bytes([sent[0][1], sent[0][2]]), 8);
    assert_eq!(u16::from_be_bytes([sent[1][1], sent[1][2]]), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_pins_duration() {
    let (core, buffer, _) = core_with(Duration::from_secs(60), false);
    buffer.push(tick(0, 1, 0));
    core.flush_cycle().await;
    let status = core.status();
    assert!(!status.send_success);
    assert_eq!(status.last_send_duration, ApiMeasurementSink::SEND_TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_counts_as_timeout() {
    let (core, buffer, uplink) = core_with(Duration::from_millis(10), true);
    buffer.push(tick(0, 1, 0));
    core.flush_cycle().await;
    assert!(!core.status().send_success);
    assert_eq!(core.status().last_send_duration, ApiMeasurementSink::SEND_TIMEOUT);

    buffer.push(tick(0, 40, 1));
    core.flush_cycle().await;
    assert!((core.status().drop_rate - 20.0).abs() < 1e-6);
    let sent = uplink.sent.lock().unwrap();
    assert_eq!(u16::from_be_bytes([sent[1][1], sent[1][2]]), 2);
}
