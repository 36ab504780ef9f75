use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scopeguard::guard;
use thiserror::Error;
use tracing::{info, warn};

use crate::profile::codec::SleepLevel;
use crate::profile::model::{ProfileRecord, Stage, TemperatureProfile};
use crate::profile::reconcile::{EditableState, from_stored, to_write_payload};
use crate::profile::store::{ProfileStore, StoreError};
use crate::schedule::time_of_day::{ParseError, TimeOfDay};
use crate::schedule::window::{ScheduleValidity, evaluate};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    InvalidSchedule(String),
    #[error("a profile write is already in progress")]
    WriteInFlight,
    #[error("a profile delete is in progress")]
    DeleteInFlight,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub profile: TemperatureProfile,
    pub existing: bool,
    pub dirty: bool,
    pub validity: ScheduleValidity,
}

#[derive(Debug)]
struct SessionState {
    editable: EditableState,
    validity: ScheduleValidity,
    dirty: bool,
}

impl SessionState {
    fn new(editable: EditableState) -> Self {
        let validity = evaluate(editable.profile.bed_time, editable.profile.wakeup_time);
        Self {
            editable,
            validity,
            dirty: false,
        }
    }

    fn recompute(&mut self) {
        self.validity = evaluate(
            self.editable.profile.bed_time,
            self.editable.profile.wakeup_time,
        );
    }
}

/// One user's editing session against a profile store.
///
/// Field edits recompute the schedule immediately. Store calls run without the
/// state lock held, and a write and a delete never overlap.
pub struct ProfileSession {
    store: Arc<dyn ProfileStore>,
    state: Mutex<SessionState>,
    write_in_flight: AtomicBool,
    delete_in_flight: AtomicBool,
}

impl ProfileSession {
    /// Fetches the stored profile. Any fetch or decode failure falls back to
    /// defaults with `existing = false`.
    pub fn load(store: Arc<dyn ProfileStore>) -> Self {
        let editable = match store.fetch() {
            Ok(Some(record)) => match from_stored(&record) {
                Ok(editable) => {
                    info!("loaded stored sleep profile");
                    editable
                }
                Err(err) => {
                    warn!(%err, "stored profile is unreadable, starting from defaults");
                    EditableState::defaults()
                }
            },
            Ok(None) => {
                info!("no stored sleep profile, starting from defaults");
                EditableState::defaults()
            }
            Err(err) => {
                warn!(%err, "failed to fetch sleep profile, starting from defaults");
                EditableState::defaults()
            }
        };
        Self::with_state(store, editable)
    }

    pub fn with_state(store: Arc<dyn ProfileStore>, editable: EditableState) -> Self {
        Self {
            store,
            state: Mutex::new(SessionState::new(editable)),
            write_in_flight: AtomicBool::new(false),
            delete_in_flight: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock_state();
        SessionSnapshot {
            profile: state.editable.profile.clone(),
            existing: state.editable.existing,
            dirty: state.dirty,
            validity: state.validity.clone(),
        }
    }

    pub fn set_bed_time(&self, raw: &str) -> Result<ScheduleValidity, ParseError> {
        let bed_time = TimeOfDay::parse(raw)?;
        let mut state = self.lock_state();
        state.editable.profile.bed_time = bed_time;
        state.dirty = true;
        state.recompute();
        Ok(state.validity.clone())
    }

    pub fn set_wake_time(&self, raw: &str) -> Result<ScheduleValidity, ParseError> {
        let wakeup_time = TimeOfDay::parse(raw)?;
        let mut state = self.lock_state();
        state.editable.profile.wakeup_time = wakeup_time;
        state.dirty = true;
        state.recompute();
        Ok(state.validity.clone())
    }

    pub fn set_timezone(&self, timezone: impl Into<String>) {
        let mut state = self.lock_state();
        state.editable.profile.timezone = timezone.into();
        state.dirty = true;
    }

    pub fn set_level(&self, stage: Stage, level: SleepLevel) {
        let mut state = self.lock_state();
        *state.editable.profile.level_mut(stage) = level;
        state.dirty = true;
    }

    pub fn adjust_level(&self, stage: Stage, steps: i32) -> SleepLevel {
        let mut state = self.lock_state();
        let level = state.editable.profile.level_mut(stage);
        *level = level.adjust(steps);
        let adjusted = *level;
        state.dirty = true;
        adjusted
    }

    /// Writes the current profile. Rejected without touching the store while
    /// the schedule is invalid or another write or a delete is running.
    pub fn submit(&self) -> Result<ProfileRecord, SessionError> {
        if self
            .write_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::WriteInFlight);
        }
        let _release = guard(&self.write_in_flight, |flag| {
            flag.store(false, Ordering::SeqCst)
        });
        if self.delete_in_flight.load(Ordering::SeqCst) {
            return Err(SessionError::DeleteInFlight);
        }

        let payload = {
            let state = self.lock_state();
            if let Some(reason) = state.validity.invalid_reason() {
                return Err(SessionError::InvalidSchedule(reason.to_string()));
            }
            to_write_payload(&state.editable.profile)
        };

        if let Err(err) = self.store.write(&payload) {
            warn!(%err, "profile write failed; edits kept for resubmission");
            return Err(err.into());
        }

        let mut state = self.lock_state();
        state.editable.existing = true;
        if to_write_payload(&state.editable.profile) == payload {
            state.dirty = false;
        }
        info!(
            bed_time = %payload.bed_time,
            wakeup_time = %payload.wakeup_time,
            "sleep profile saved"
        );
        Ok(payload)
    }

    /// Deletes the stored profile and resets the editable state to defaults
    /// before another write can be accepted. Refused while a write is running.
    pub fn delete(&self) -> Result<(), SessionError> {
        if self
            .delete_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::DeleteInFlight);
        }
        let _release = guard(&self.delete_in_flight, |flag| {
            flag.store(false, Ordering::SeqCst)
        });
        // Each side raises its own flag before reading the other's, so a
        // write and a delete can never both proceed.
        if self.write_in_flight.load(Ordering::SeqCst) {
            return Err(SessionError::WriteInFlight);
        }

        if let Err(err) = self.store.delete() {
            warn!(%err, "profile delete failed; editable state left untouched");
            return Err(err.into());
        }

        *self.lock_state() = SessionState::new(EditableState::defaults());
        info!("sleep profile deleted, editable state reset to defaults");
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
