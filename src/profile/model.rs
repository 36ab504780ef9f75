use serde::{Deserialize, Serialize};

use crate::profile::codec::{SleepLevel, StoredSleepLevel};
use crate::schedule::time_of_day::TimeOfDay;

pub const DEFAULT_BED_TIME: TimeOfDay = TimeOfDay::from_hour_minute(22, 0);
pub const DEFAULT_WAKE_TIME: TimeOfDay = TimeOfDay::from_hour_minute(6, 0);
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initial,
    MidStage,
    Final,
}

/// Editable copy of the thermal schedule. The durable copy lives in a
/// [`crate::profile::store::ProfileStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureProfile {
    pub bed_time: TimeOfDay,
    pub wakeup_time: TimeOfDay,
    pub timezone: String,
    pub initial: SleepLevel,
    pub mid_stage: SleepLevel,
    pub final_stage: SleepLevel,
}

impl TemperatureProfile {
    pub fn level(&self, stage: Stage) -> SleepLevel {
        match stage {
            Stage::Initial => self.initial,
            Stage::MidStage => self.mid_stage,
            Stage::Final => self.final_stage,
        }
    }

    pub fn level_mut(&mut self, stage: Stage) -> &mut SleepLevel {
        match stage {
            Stage::Initial => &mut self.initial,
            Stage::MidStage => &mut self.mid_stage,
            Stage::Final => &mut self.final_stage,
        }
    }
}

impl Default for TemperatureProfile {
    fn default() -> Self {
        Self {
            bed_time: DEFAULT_BED_TIME,
            wakeup_time: DEFAULT_WAKE_TIME,
            timezone: DEFAULT_TIMEZONE.to_string(),
            initial: SleepLevel::ZERO,
            mid_stage: SleepLevel::ZERO,
            final_stage: SleepLevel::ZERO,
        }
    }
}

/// Profile as exchanged with the profile store, in its wire field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(rename = "bedTime")]
    pub bed_time: String,
    #[serde(rename = "wakeupTime")]
    pub wakeup_time: String,
    #[serde(rename = "timezoneTZ")]
    pub timezone: String,
    #[serde(rename = "initialSleepLevel")]
    pub initial_sleep_level: StoredSleepLevel,
    #[serde(rename = "midStageSleepLevel")]
    pub mid_stage_sleep_level: StoredSleepLevel,
    #[serde(rename = "finalSleepLevel")]
    pub final_sleep_level: StoredSleepLevel,
}
