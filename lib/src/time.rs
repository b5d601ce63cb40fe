use std::{fmt, ops};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Julian date of the Unix epoch, 1970-01-01T00:00:00.
pub const UNIX_EPOCH_JD: f64 = 2_440_587.5;
/// Julian date of J2000.0, 2000-01-01T12:00:00.
pub const J2000_JD: f64 = 2_451_545.0;
pub const DAYS_PER_CENTURY: f64 = 36_525.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Simulation time, measured from the Unix epoch.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Epoch(Duration);

impl Epoch {
    pub const J2000: Epoch = Epoch(Duration::milliseconds(946_728_000_000));

    pub fn from_unix_millis(millis: i64) -> Self {
        Self(Duration::milliseconds(millis))
    }

    pub fn from_datetime(datetime: OffsetDateTime) -> Self {
        Self(datetime - OffsetDateTime::UNIX_EPOCH)
    }

    /// Milliseconds since the Unix epoch, saturating at the ends of `i64`.
    pub fn unix_millis(self) -> i64 {
        let millis = self.0.whole_milliseconds();
        i64::try_from(millis).unwrap_or(if millis < 0 { i64::MIN } else { i64::MAX })
    }

    pub fn julian_date(self) -> f64 {
        UNIX_EPOCH_JD + self.0.as_seconds_f64() / SECONDS_PER_DAY
    }

    /// Julian centuries elapsed since J2000.0, the `T` of the linear
    /// secular element models.
    pub fn julian_centuries_since_j2000(self) -> f64 {
        (self.julian_date() - J2000_JD) / DAYS_PER_CENTURY
    }

    pub fn into_duration(self) -> Duration {
        self.0
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }
}

impl ops::Sub<Epoch> for Epoch {
    type Output = Duration;

    fn sub(self, rhs: Epoch) -> Self::Output {
        self.0 - rhs.0
    }
}

impl ops::Add<Duration> for Epoch {
    type Output = Epoch;

    fn add(self, rhs: Duration) -> Self::Output {
        Epoch(self.0 + rhs)
    }
}

impl ops::AddAssign<Duration> for Epoch {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match OffsetDateTime::UNIX_EPOCH.checked_add(self.0) {
            Some(dt) => write!(f, "{dt}"),
            None => write!(f, "Epoch({}ms)", self.unix_millis()),
        }
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({}ms)", self.unix_millis())
    }
}

#[test]
fn j2000_is_century_zero() {
    assert_eq!(Epoch::J2000.julian_date(), J2000_JD);
    assert_eq!(Epoch::J2000.julian_centuries_since_j2000(), 0.0);
    let later = Epoch::J2000 + Duration::days(36_525);
    assert!((later.julian_centuries_since_j2000() - 1.0).abs() < 1e-12);
}

#[test]
fn datetime_round_trip() {
    let dt = OffsetDateTime::from_unix_timestamp(946_728_000).unwrap();
    assert_eq!(Epoch::from_datetime(dt), Epoch::J2000);
    assert_eq!(Epoch::J2000.unix_millis(), 946_728_000_000);
}

#[test]
fn unix_millis_saturates() {
    assert_eq!(Epoch::from_unix_millis(-1_500).unix_millis(), -1_500);
    assert_eq!(Epoch::from_duration(Duration::MAX).unix_millis(), i64::MAX);
    assert_eq!(Epoch::from_duration(Duration::MIN).unix_millis(), i64::MIN);
}
