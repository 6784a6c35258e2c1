use chrono::{DateTime, TimeDelta, Utc};
use nalgebra::{UnitQuaternion, Vector3};

/// Three-axis sample (acceleration in m/s², angular rate in rad/s).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorReading {
    pub value: Vector3<f64>,
    pub time: DateTime<Utc>,
    /// Mean raw sample at rest, known once the sensor has been calibrated.
    pub rest: Option<Vector3<f64>>,
}

/// Device-to-world orientation at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub orientation: UnitQuaternion<f64>,
    pub time: DateTime<Utc>,
}

/// Coarse attitude derived from an orientation: `1` nose up, `-1` nose down,
/// `0` without data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttitudeReading {
    pub pointing_up: i8,
    pub data_time: Option<DateTime<Utc>>,
}

impl AttitudeReading {
    /// `true` if the underlying data is younger than `max_age` at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
        self.data_time.is_some_and(|t| now - t < max_age)
    }
}
