use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schedule::time_of_day::{ParseError, TimeOfDay};

pub const SLEEP_LEVEL_MIN: f64 = -10.0;
pub const SLEEP_LEVEL_MAX: f64 = 10.0;
pub const STORED_LEVEL_MIN: i32 = -100;
pub const STORED_LEVEL_MAX: i32 = 100;
const STORED_SCALE: f64 = 10.0;
const MAX_USEFUL_PRESSES: u32 = 21;

/// Outbound times always carry zero seconds and a six-digit zero fraction.
pub const WIRE_TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// Thermal offset as shown to the user. Decoding can yield fractions, which
/// are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct SleepLevel(f64);

impl SleepLevel {
    pub const ZERO: SleepLevel = SleepLevel(0.0);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn increment(self) -> Self {
        Self((self.0 + 1.0).clamp(SLEEP_LEVEL_MIN, SLEEP_LEVEL_MAX))
    }

    pub fn decrement(self) -> Self {
        Self((self.0 - 1.0).clamp(SLEEP_LEVEL_MIN, SLEEP_LEVEL_MAX))
    }

    /// Applies `steps` single-unit presses. Past the width of the range every
    /// further press is a no-op, so the count is capped there.
    pub fn adjust(self, steps: i32) -> Self {
        let press = if steps < 0 {
            Self::decrement
        } else {
            Self::increment
        };
        let presses = steps.unsigned_abs().min(MAX_USEFUL_PRESSES);
        (0..presses).fold(self, |level, _| press(level))
    }
}

impl fmt::Display for SleepLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{}", self.0 as i64)
        } else {
            write!(f, "{:.1}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredSleepLevel(pub i32);

impl StoredSleepLevel {
    pub fn is_in_range(self) -> bool {
        (STORED_LEVEL_MIN..=STORED_LEVEL_MAX).contains(&self.0)
    }
}

pub fn decode(stored: StoredSleepLevel) -> SleepLevel {
    SleepLevel(f64::from(stored.0) / STORED_SCALE)
}

pub fn encode(level: SleepLevel) -> StoredSleepLevel {
    StoredSleepLevel((level.value() * STORED_SCALE).round() as i32)
}

pub fn encode_time(time: TimeOfDay) -> String {
    time.to_naive_time().format(WIRE_TIME_FORMAT).to_string()
}

/// Reads `HH:MM:SS[.ffffff]` by keeping only the leading `HH:MM`.
pub fn decode_time(raw: &str) -> Result<TimeOfDay, ParseError> {
    let clock = raw.get(..5).unwrap_or(raw);
    TimeOfDay::parse(clock).map_err(|_| ParseError::InvalidFormat(raw.to_string()))
}
