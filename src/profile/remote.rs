use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use tracing::{debug, warn};

use crate::profile::model::ProfileRecord;
use crate::profile::store::{ProfileStore, StoreError};

pub const PROFILE_PATH: &str = "/v1/profile";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Talks to a profile store exposed by `sleepcurve serve`.
pub struct HttpProfileStore {
    profile_url: String,
    client: Client,
}

impl HttpProfileStore {
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|err| StoreError::Transport(format!("failed to create HTTP client: {err}")))?;
        Ok(Self {
            profile_url: format!("{}{PROFILE_PATH}", base_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn profile_url(&self) -> &str {
        &self.profile_url
    }
}

impl ProfileStore for HttpProfileStore {
    fn fetch(&self) -> Result<Option<ProfileRecord>, StoreError> {
        let response = self
            .client
            .get(&self.profile_url)
            .send()
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(url = %self.profile_url, "remote store has no profile");
            return Ok(None);
        }
        let response = ensure_success(response)?;
        response
            .json::<ProfileRecord>()
            .map(Some)
            .map_err(|err| StoreError::Malformed(err.to_string()))
    }

    fn write(&self, payload: &ProfileRecord) -> Result<(), StoreError> {
        let response = self
            .client
            .put(&self.profile_url)
            .json(payload)
            .send()
            .map_err(transport_error)?;
        ensure_success(response)?;
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(&self.profile_url)
            .send()
            .map_err(transport_error)?;
        ensure_success(response)?;
        Ok(())
    }
}

fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_default();
    warn!(status = status.as_u16(), %message, "profile store rejected request");
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn transport_error(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}
