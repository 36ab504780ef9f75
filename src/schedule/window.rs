use serde::Serialize;

use crate::schedule::time_of_day::{MINUTES_PER_DAY, TimeOfDay};

pub const MIN_SLEEP_MINUTES: u16 = 240;
pub const MID_STAGE_OFFSET_MINUTES: u16 = 60;
pub const FINAL_STAGE_LEAD_MINUTES: u16 = 120;
pub const MIN_DURATION_REASON: &str = "Sleep duration must be at least 4 hours.";

// Mid-stage and final-stage transitions must not cross inside a valid window.
const _: () = assert!(MIN_SLEEP_MINUTES > MID_STAGE_OFFSET_MINUTES + FINAL_STAGE_LEAD_MINUTES);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepWindow {
    bed: TimeOfDay,
    wake: TimeOfDay,
    wake_is_next_day: bool,
    duration_minutes: u16,
}

impl SleepWindow {
    /// Builds the window, rolling the wake time over to the next day when it
    /// does not come after bed time. `bed == wake` is a zero-length window.
    pub fn new(bed: TimeOfDay, wake: TimeOfDay) -> Self {
        let wake_is_next_day = wake <= bed;
        let duration_minutes = if wake_is_next_day {
            (wake.minutes() + MINUTES_PER_DAY - bed.minutes()) % MINUTES_PER_DAY
        } else {
            wake.minutes() - bed.minutes()
        };
        Self {
            bed,
            wake,
            wake_is_next_day,
            duration_minutes,
        }
    }

    pub fn bed(&self) -> TimeOfDay {
        self.bed
    }

    pub fn wake(&self) -> TimeOfDay {
        self.wake
    }

    pub fn wake_is_next_day(&self) -> bool {
        self.wake_is_next_day
    }

    pub fn duration_minutes(&self) -> u16 {
        self.duration_minutes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTimes {
    pub mid_stage: TimeOfDay,
    pub final_stage: TimeOfDay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleValidity {
    Valid {
        duration_minutes: u16,
        stages: StageTimes,
    },
    Invalid {
        reason: String,
    },
}

impl ScheduleValidity {
    pub fn invalid_reason(&self) -> Option<&str> {
        match self {
            ScheduleValidity::Valid { .. } => None,
            ScheduleValidity::Invalid { reason } => Some(reason),
        }
    }
}

pub fn evaluate(bed: TimeOfDay, wake: TimeOfDay) -> ScheduleValidity {
    let window = SleepWindow::new(bed, wake);
    if window.duration_minutes() < MIN_SLEEP_MINUTES {
        return ScheduleValidity::Invalid {
            reason: MIN_DURATION_REASON.to_string(),
        };
    }

    ScheduleValidity::Valid {
        duration_minutes: window.duration_minutes(),
        stages: schedule(bed, wake, window.wake_is_next_day()),
    }
}

/// Transition clock times for a window that already passed `evaluate`.
pub fn schedule(bed: TimeOfDay, wake: TimeOfDay, wake_is_next_day: bool) -> StageTimes {
    let adjusted_wake = if wake_is_next_day {
        i32::from(wake.minutes()) + i32::from(MINUTES_PER_DAY)
    } else {
        i32::from(wake.minutes())
    };
    StageTimes {
        mid_stage: TimeOfDay::wrapping(
            i32::from(bed.minutes()) + i32::from(MID_STAGE_OFFSET_MINUTES),
        ),
        final_stage: TimeOfDay::wrapping(adjusted_wake - i32::from(FINAL_STAGE_LEAD_MINUTES)),
    }
}

pub fn format_duration(minutes: u16) -> String {
    format!("{}h {}m", minutes / 60, minutes % 60)
}
