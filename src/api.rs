use std::io::Read;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::profile::codec::decode_time;
use crate::profile::model::ProfileRecord;
use crate::profile::remote::PROFILE_PATH;
use crate::profile::store::ProfileStore;
use crate::schedule::time_of_day::TimeOfDay;
use crate::schedule::window::{ScheduleValidity, SleepWindow, evaluate};

const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Clone, Serialize, Default)]
pub struct ApiCounters {
    pub total_requests: u64,
    pub profile_reads: u64,
    pub profile_writes: u64,
    pub profile_deletes: u64,
    pub rejected_writes: u64,
    pub last_write_unix_ms: Option<i64>,
    pub last_delete_unix_ms: Option<i64>,
}

pub struct ApiSharedState {
    store: Arc<dyn ProfileStore>,
    counters: ApiCounters,
    server_started_unix_ms: i64,
}

impl ApiSharedState {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            counters: ApiCounters::default(),
            server_started_unix_ms: Local::now().timestamp_millis(),
        }
    }

    pub fn counters(&self) -> &ApiCounters {
        &self.counters
    }

    pub fn server_started_unix_ms(&self) -> i64 {
        self.server_started_unix_ms
    }
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

pub struct ApiServer {
    pub state: Arc<Mutex<ApiSharedState>>,
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl ApiServer {
    pub fn start(config: ApiServerConfig, store: Arc<dyn ProfileStore>) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start API server on {bind}: {err}"))?;
        let local_addr = server.server_addr().to_ip();
        let state = Arc::new(Mutex::new(ApiSharedState::new(store)));
        let stop = Arc::new(AtomicBool::new(false));
        let state_for_thread = Arc::clone(&state);
        let stop_for_thread = Arc::clone(&stop);
        let http_join =
            thread::spawn(move || run_server_loop(server, state_for_thread, stop_for_thread));

        info!(addr = ?local_addr, "profile API listening");
        Ok(Self {
            state,
            stop,
            http_join: Some(http_join),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Blocks until the server loop exits.
    pub fn wait(mut self) {
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
        if let Ok(guard) = self.state.lock() {
            info!(counters = ?guard.counters(), "profile API stopped");
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop(server: Server, state: Arc<Mutex<ApiSharedState>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &state),
            Ok(None) => continue,
            Err(err) => {
                warn!(%err, "failed to receive API request");
                continue;
            }
        }
    }
}

fn handle_request(mut request: tiny_http::Request, state: &Arc<Mutex<ApiSharedState>>) {
    let Some(remote_addr) = request.remote_addr() else {
        let _ = send_text(request, StatusCode(400), "missing remote address");
        return;
    };
    if !is_local_network_ip(remote_addr.ip()) {
        let _ = send_text(request, StatusCode(403), "forbidden: local network only");
        return;
    }

    let method = request.method().clone();
    let url = request.url().to_string();
    let (path, query) = split_path_query(&url);
    let base_url = request_base_url(&request);
    debug!(%method, path, "API request");

    let mut guard = match state.lock() {
        Ok(guard) => guard,
        Err(_) => {
            let _ = send_text(request, StatusCode(500), "internal state lock error");
            return;
        }
    };
    guard.counters.total_requests += 1;

    match (&method, path) {
        (Method::Get, "/healthz") => {
            let _ = send_text(request, StatusCode(200), "ok");
        }
        (Method::Get, "/v1") => {
            #[derive(Serialize)]
            struct ApiIndexResponse {
                api_base: String,
                profile_url: String,
                schedule_url: String,
                state_url: String,
                health_url: String,
            }

            let payload = ApiIndexResponse {
                profile_url: format!("{base_url}{PROFILE_PATH}"),
                schedule_url: format!("{base_url}/v1/schedule"),
                state_url: format!("{base_url}/v1/state"),
                health_url: format!("{base_url}/healthz"),
                api_base: base_url,
            };
            let _ = send_json(request, StatusCode(200), &payload);
        }
        (Method::Get, "/v1/state") => {
            #[derive(Serialize)]
            struct StateResponse {
                counters: ApiCounters,
                server_started_unix_ms: i64,
                response_iso_local: String,
            }

            let payload = StateResponse {
                counters: guard.counters().clone(),
                server_started_unix_ms: guard.server_started_unix_ms(),
                response_iso_local: Local::now().to_rfc3339(),
            };
            let _ = send_json(request, StatusCode(200), &payload);
        }
        (Method::Get, "/v1/schedule") => {
            let bed = query_param(query, "bed").map(decode_query_value);
            let wake = query_param(query, "wake").map(decode_query_value);
            match (bed, wake) {
                (Some(bed), Some(wake)) => match schedule_response(&bed, &wake) {
                    Ok(payload) => {
                        let _ = send_json(request, StatusCode(200), &payload);
                    }
                    Err(message) => {
                        let _ = send_text(request, StatusCode(400), &message);
                    }
                },
                _ => {
                    let _ = send_text(
                        request,
                        StatusCode(400),
                        "query parameters 'bed' and 'wake' are required",
                    );
                }
            }
        }
        (Method::Get, PROFILE_PATH) => {
            guard.counters.profile_reads += 1;
            match guard.store.fetch() {
                Ok(Some(record)) => {
                    let _ = send_json(request, StatusCode(200), &record);
                }
                Ok(None) => {
                    let _ = send_text(request, StatusCode(404), "no profile stored");
                }
                Err(err) => {
                    warn!(%err, "profile fetch failed");
                    let _ = send_text(request, StatusCode(500), &err.to_string());
                }
            }
        }
        (Method::Put, PROFILE_PATH) => {
            let record = match read_record(&mut request) {
                Ok(record) => record,
                Err(message) => {
                    guard.counters.rejected_writes += 1;
                    let _ = send_text(request, StatusCode(400), &message);
                    return;
                }
            };
            match guard.store.write(&record) {
                Ok(()) => {
                    guard.counters.profile_writes += 1;
                    guard.counters.last_write_unix_ms = Some(Local::now().timestamp_millis());
                    let _ = send_json(request, StatusCode(200), &record);
                }
                Err(err) => {
                    warn!(%err, "profile write failed");
                    let _ = send_text(request, StatusCode(500), &err.to_string());
                }
            }
        }
        (Method::Delete, PROFILE_PATH) => match guard.store.delete() {
            Ok(()) => {
                guard.counters.profile_deletes += 1;
                guard.counters.last_delete_unix_ms = Some(Local::now().timestamp_millis());
                let _ = send_empty(request, StatusCode(204));
            }
            Err(err) => {
                warn!(%err, "profile delete failed");
                let _ = send_text(request, StatusCode(500), &err.to_string());
            }
        },
        (_, "/healthz" | "/v1" | "/v1/state" | "/v1/schedule" | PROFILE_PATH) => {
            let _ = send_text(request, StatusCode(405), "method not allowed");
        }
        _ => {
            let _ = send_text(request, StatusCode(404), "not found");
        }
    }
}

#[derive(Debug, Serialize)]
struct ScheduleResponse {
    bed: TimeOfDay,
    wake: TimeOfDay,
    wake_is_next_day: bool,
    #[serde(flatten)]
    validity: ScheduleValidity,
}

fn schedule_response(bed: &str, wake: &str) -> Result<ScheduleResponse, String> {
    let bed = TimeOfDay::parse(bed).map_err(|err| err.to_string())?;
    let wake = TimeOfDay::parse(wake).map_err(|err| err.to_string())?;
    let window = SleepWindow::new(bed, wake);
    Ok(ScheduleResponse {
        bed: window.bed(),
        wake: window.wake(),
        wake_is_next_day: window.wake_is_next_day(),
        validity: evaluate(bed, wake),
    })
}

fn read_record(request: &mut tiny_http::Request) -> Result<ProfileRecord, String> {
    let mut body = String::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES)
        .read_to_string(&mut body)
        .map_err(|err| format!("unable to read request body: {err}"))?;
    let record = serde_json::from_str::<ProfileRecord>(&body)
        .map_err(|err| format!("invalid profile JSON: {err}"))?;
    validate_record(&record)?;
    Ok(record)
}

fn validate_record(record: &ProfileRecord) -> Result<(), String> {
    decode_time(&record.bed_time).map_err(|err| format!("bedTime: {err}"))?;
    decode_time(&record.wakeup_time).map_err(|err| format!("wakeupTime: {err}"))?;
    if record.timezone.trim().is_empty() {
        return Err("timezoneTZ must not be empty".to_string());
    }
    for (field, level) in [
        ("initialSleepLevel", record.initial_sleep_level),
        ("midStageSleepLevel", record.mid_stage_sleep_level),
        ("finalSleepLevel", record.final_sleep_level),
    ] {
        if !level.is_in_range() {
            return Err(format!("{field} {} is outside [-100, 100]", level.0));
        }
    }
    Ok(())
}

fn send_json<T: Serialize>(
    request: tiny_http::Request,
    status: StatusCode,
    body: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_data(payload)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_empty(request: tiny_http::Request, status: StatusCode) -> Result<()> {
    request.respond(Response::empty(status))?;
    Ok(())
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

fn request_base_url(request: &tiny_http::Request) -> String {
    for header in request.headers() {
        if header.field.equiv("Host") {
            let host = header.value.as_str().trim();
            if !host.is_empty() {
                return format!("http://{host}");
            }
        }
    }
    "http://127.0.0.1:8099".to_string()
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        if k == key {
            return Some(v);
        }
    }
    None
}

// Clock values only ever need the colon unescaped.
fn decode_query_value(raw: &str) -> String {
    raw.replace("%3A", ":").replace("%3a", ":")
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || is_ipv4_mapped_local(v6)
        }
    }
}

fn is_ipv4_mapped_local(v6: Ipv6Addr) -> bool {
    match v6.to_ipv4_mapped() {
        Some(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        None => false,
    }
}
