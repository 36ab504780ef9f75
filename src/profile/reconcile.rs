use crate::profile::codec::{decode, decode_time, encode, encode_time};
use crate::profile::model::{ProfileRecord, TemperatureProfile};
use crate::schedule::time_of_day::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub struct EditableState {
    pub profile: TemperatureProfile,
    /// True when the profile came from the store rather than from defaults.
    pub existing: bool,
}

impl EditableState {
    pub fn defaults() -> Self {
        Self {
            profile: TemperatureProfile::default(),
            existing: false,
        }
    }
}

pub fn from_stored(record: &ProfileRecord) -> Result<EditableState, ParseError> {
    Ok(EditableState {
        profile: TemperatureProfile {
            bed_time: decode_time(&record.bed_time)?,
            wakeup_time: decode_time(&record.wakeup_time)?,
            timezone: record.timezone.clone(),
            initial: decode(record.initial_sleep_level),
            mid_stage: decode(record.mid_stage_sleep_level),
            final_stage: decode(record.final_sleep_level),
        },
        existing: true,
    })
}

/// Callers must only build a payload while the schedule evaluates as valid.
pub fn to_write_payload(profile: &TemperatureProfile) -> ProfileRecord {
    ProfileRecord {
        bed_time: encode_time(profile.bed_time),
        wakeup_time: encode_time(profile.wakeup_time),
        timezone: profile.timezone.clone(),
        initial_sleep_level: encode(profile.initial),
        mid_stage_sleep_level: encode(profile.mid_stage),
        final_sleep_level: encode(profile.final_stage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::codec::{SleepLevel, StoredSleepLevel};

    fn sample_record() -> ProfileRecord {
        ProfileRecord {
            bed_time: "23:15:00.000000".to_string(),
            wakeup_time: "07:45:12".to_string(),
            timezone: "America/Chicago".to_string(),
            initial_sleep_level: StoredSleepLevel(-40),
            mid_stage_sleep_level: StoredSleepLevel(-10),
            final_sleep_level: StoredSleepLevel(30),
        }
    }

    #[test]
    fn stored_profile_becomes_existing_editable_state() {
        let state = from_stored(&sample_record()).expect("well-formed record");
        assert!(state.existing);
        assert_eq!(state.profile.bed_time.to_string(), "23:15");
        assert_eq!(state.profile.wakeup_time.to_string(), "07:45");
        assert_eq!(state.profile.timezone, "America/Chicago");
        assert_eq!(state.profile.initial, SleepLevel::new(-4.0));
        assert_eq!(state.profile.mid_stage, SleepLevel::new(-1.0));
        assert_eq!(state.profile.final_stage, SleepLevel::new(3.0));
    }

    #[test]
    fn malformed_stored_time_is_reported() {
        let mut record = sample_record();
        record.wakeup_time = "late".to_string();
        assert!(from_stored(&record).is_err());
    }

    #[test]
    fn payload_encodes_levels_and_wire_times() {
        let state = from_stored(&sample_record()).expect("well-formed record");
        let payload = to_write_payload(&state.profile);
        assert_eq!(payload.bed_time, "23:15:00.000000");
        assert_eq!(payload.wakeup_time, "07:45:00.000000");
        assert_eq!(payload.timezone, "America/Chicago");
        assert_eq!(payload.initial_sleep_level, StoredSleepLevel(-40));
        assert_eq!(payload.mid_stage_sleep_level, StoredSleepLevel(-10));
        assert_eq!(payload.final_sleep_level, StoredSleepLevel(30));
    }

    #[test]
    fn defaults_are_not_marked_existing() {
        let state = EditableState::defaults();
        assert!(!state.existing);
        assert_eq!(state.profile, TemperatureProfile::default());
    }
}
