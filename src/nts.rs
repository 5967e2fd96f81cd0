//! NTS (RFC 8915) measurements through an external key-exchange provider.
//!
//! The TLS key exchange and the authenticated NTPv4 query are performed by a
//! collaborator implementing [`NtsKeyExchange`] and [`NtsSession`]. This
//! module turns what it returns into a [`MeasurementResult`] and classifies
//! failures:
//!
//! | code | meaning                                         |
//! |------|-------------------------------------------------|
//! | 1    | key exchange failed                             |
//! | 2    | negotiated address could not be split          |
//! | 3    | query failed or timed out after key exchange    |
//! | 4    | response violates RFC 5905 sanity rules         |
//! | 5    | kiss code received                              |
//! | 6    | succeeded, but not on the preferred IP family   |
//!
//! Collaborators are blocking; async callers should run [`measure_nts`]
//! inside `tokio::task::spawn_blocking`.

use std::any::Any;
use std::fmt;
use std::net::IpAddr;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::packets::MODE_SERVER;
use crate::report::{HeaderFields, MeasurementResult, NtsFields};
use crate::time::time_to_ntp64;
use crate::timing::RoundTrip;

/// Pause before retrying with the preferred address family.
pub const FAMILY_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Longest acceptable gap between the server's reference time and transmit time (2^17 s).
pub const MAX_REFERENCE_AGE: i64 = 1 << 17;

/// Largest acceptable synchronization distance (root delay / 2 + root dispersion).
pub const MAX_DISPERSION: f64 = 16.0;

/// Stratum from which a server counts as unsynchronized.
pub const MAX_STRATUM: u8 = 16;

/// Leap indicator value for an unsynchronized clock.
pub const LEAP_NOT_IN_SYNC: u8 = 3;

/// Warning attached when the key exchange steers us to another address.
pub const KE_REDIRECT_WARNING: &str =
    "The measurement succeeded, but KE redirected us to another IP";

/// Error type returned by collaborators.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Address family the caller would like the NTP exchange to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "ipv4"),
            IpFamily::V6 => write!(f, "ipv6"),
        }
    }
}

/// Performs the NTS key exchange.
pub trait NtsKeyExchange {
    type Session: NtsSession;

    /// Establishes a session with `host`, preferring `family` when given.
    fn establish(
        &self,
        host: &str,
        family: Option<IpFamily>,
        timeout: Duration,
    ) -> Result<Self::Session, ProviderError>;
}

/// An authenticated NTP association produced by the key exchange.
pub trait NtsSession {
    /// Negotiated NTP server as `host:port` (`[v6]:port` for IPv6).
    fn address(&self) -> String;

    /// Sends one authenticated query and returns the decoded reply.
    fn query(&mut self, timeout: Duration) -> Result<NtsResponse, ProviderError>;
}

/// Decoded reply from an NTS-protected query.
#[derive(Debug, Clone, PartialEq)]
pub struct NtsResponse {
    /// t1, local time at send.
    pub client_sent: DateTime<Utc>,
    /// t2, server receive time.
    pub server_recv: DateTime<Utc>,
    /// t3, server transmit time.
    pub server_sent: DateTime<Utc>,
    /// t4, local time at receive.
    pub client_recv: DateTime<Utc>,
    pub version: u8,
    pub stratum: u8,
    pub leap: u8,
    /// Empty unless the server sent a kiss-o'-death.
    pub kiss_code: String,
    /// Seconds.
    pub root_delay: f64,
    /// Seconds.
    pub root_dispersion: f64,
    /// Seconds.
    pub precision: f64,
    /// Seconds.
    pub poll: f64,
    pub reference_id: u32,
    pub reference_time: DateTime<Utc>,
    /// Lower bound on the clock error, seconds.
    pub min_error: f64,
}

/// Sanity rule broken by an NTS response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseViolation {
    #[error("kiss of death received")]
    KissOfDeath,

    #[error("invalid stratum {0} in response")]
    InvalidStratum(u8),

    #[error("server clock not fresh: reference time is {0} s old")]
    StaleReference(i64),

    #[error("invalid dispersion: synchronization distance {0} s exceeds {MAX_DISPERSION} s")]
    InvalidDispersion(f64),

    #[error("invalid time reported: transmit time precedes reference time")]
    InvalidTime,

    #[error("invalid leap second indicator")]
    InvalidLeapSecond,
}

impl NtsResponse {
    fn round_trip(&self) -> RoundTrip {
        RoundTrip::from_ntp64(
            time_to_ntp64(self.client_sent),
            time_to_ntp64(self.server_recv),
            time_to_ntp64(self.server_sent),
            time_to_ntp64(self.client_recv),
        )
    }

    /// Half the total delay to the primary source plus its dispersion.
    pub fn root_distance(&self) -> f64 {
        (self.round_trip().rtt + self.root_delay) / 2.0 + self.root_dispersion
    }

    /// Applies the RFC 5905 client-side sanity checks.
    pub fn validate(&self) -> Result<(), ResponseViolation> {
        if self.stratum == 0 {
            return Err(ResponseViolation::KissOfDeath);
        }
        if self.stratum >= MAX_STRATUM {
            return Err(ResponseViolation::InvalidStratum(self.stratum));
        }

        let age = (self.server_sent - self.reference_time).num_seconds();
        if age > MAX_REFERENCE_AGE {
            return Err(ResponseViolation::StaleReference(age));
        }

        let lambda = self.root_delay / 2.0 + self.root_dispersion;
        if lambda > MAX_DISPERSION {
            return Err(ResponseViolation::InvalidDispersion(lambda));
        }

        if self.server_sent < self.reference_time {
            return Err(ResponseViolation::InvalidTime);
        }

        if self.leap == LEAP_NOT_IN_SYNC {
            return Err(ResponseViolation::InvalidLeapSecond);
        }

        Ok(())
    }

    /// Human-readable reference ID: ASCII for stratum 0 and 1, dotted quad otherwise.
    pub fn reference_string(&self) -> String {
        let bytes = self.reference_id.to_be_bytes();
        if self.stratum <= 1 {
            bytes
                .iter()
                .take_while(|&&b| b != 0)
                .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
                .collect()
        } else {
            format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
        }
    }
}

/// Errors that end an NTS measurement.
#[derive(Error, Debug)]
pub enum NtsError {
    #[error("NTS session could not be established: key exchange failure {0}")]
    KeyExchange(#[source] ProviderError),

    #[error("Could not deduct NTP host and port: {0}")]
    Address(String),

    #[error("KE succeeded, but measurement failed: {0}")]
    Query(String),

    #[error("Invalid NTP response received: {0}")]
    InvalidResponse(#[from] ResponseViolation),

    #[error("KE succeeded, but KissCode: {0}")]
    KissCode(String),
}

impl NtsError {
    pub fn code(&self) -> i32 {
        match self {
            NtsError::KeyExchange(_) => 1,
            NtsError::Address(_) => 2,
            NtsError::Query(_) => 3,
            NtsError::InvalidResponse(_) => 4,
            NtsError::KissCode(_) => 5,
        }
    }
}

/// Outcome of an NTS measurement.
#[derive(Debug)]
pub struct NtsProbe {
    pub outcome: Result<MeasurementResult, NtsError>,
    /// Set when the preferred address family could not be used and the
    /// result comes from the first, unrestricted measurement.
    pub family_fallback: bool,
}

impl NtsProbe {
    /// 0 on success, 6 on success without the preferred family, the error's
    /// code otherwise.
    pub fn code(&self) -> i32 {
        match &self.outcome {
            Ok(_) if self.family_fallback => 6,
            Ok(_) => 0,
            Err(e) => e.code(),
        }
    }
}

/// Splits `host:port` or `[v6]:port`.
pub fn split_host_port(address: &str) -> Option<(String, String)> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, port) = rest.split_once("]:")?;
        return (!port.is_empty()).then(|| (host.to_string(), port.to_string()));
    }

    let (host, port) = address.rsplit_once(':')?;
    if host.contains(':') || port.is_empty() {
        return None;
    }
    Some((host.to_string(), port.to_string()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs the collaborator's query, turning a panic into a query failure.
fn guarded_query<S: NtsSession>(
    session: &mut S,
    timeout: Duration,
) -> Result<NtsResponse, NtsError> {
    match panic::catch_unwind(AssertUnwindSafe(|| session.query(timeout))) {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(NtsError::Query(e.to_string())),
        Err(payload) => Err(NtsError::Query(format!(
            "NTS library panic: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn build_result(
    host: &str,
    measured_ip: String,
    measured_port: String,
    response: &NtsResponse,
    ke_redirect_warning: Option<String>,
) -> MeasurementResult {
    let timing = response.round_trip();

    MeasurementResult {
        host: Some(host.to_string()),
        measured_ip: Some(measured_ip),
        leap: response.leap,
        version: response.version,
        mode: MODE_SERVER,
        header: HeaderFields::Nts(NtsFields {
            measured_port,
            ref_id_raw: format!("0x{:08x}", response.reference_id),
            ref_id: response.reference_string(),
            server_recv_time: time_to_ntp64(response.server_recv),
            server_sent_time: time_to_ntp64(response.server_sent),
            precision: response.precision,
            stratum: response.stratum,
            root_delay: response.root_delay,
            poll: response.poll,
            root_disp: response.root_dispersion,
            ref_time: time_to_ntp64(response.reference_time),
            root_dist: response.root_distance(),
            kiss_code: response.kiss_code.clone(),
            min_error: response.min_error,
            ke_redirect_warning,
        }),
        extensions: None,
        client_sent_time: time_to_ntp64(response.client_sent),
        client_recv_time: time_to_ntp64(response.client_recv),
        rtt: timing.rtt,
        offset: timing.offset,
        anomaly: None,
    }
}

/// Performs one key exchange and one query.
pub fn measure_nts_once<K: NtsKeyExchange>(
    ke: &K,
    host: &str,
    family: Option<IpFamily>,
    timeout: Duration,
) -> Result<MeasurementResult, NtsError> {
    let mut session = ke
        .establish(host, family, timeout)
        .map_err(NtsError::KeyExchange)?;

    let address = session.address();
    let (measured_ip, measured_port) =
        split_host_port(&address).ok_or_else(|| NtsError::Address(address.clone()))?;
    log::debug!("NTS key exchange with {} negotiated {}", host, address);

    let ke_redirect_warning = match (host.parse::<IpAddr>(), measured_ip.parse::<IpAddr>()) {
        (Ok(wanted), Ok(got)) if wanted != got => {
            log::warn!("KE for {} redirected to {}", host, measured_ip);
            Some(KE_REDIRECT_WARNING.to_string())
        }
        _ => None,
    };

    let response = guarded_query(&mut session, timeout)?;

    if !response.kiss_code.is_empty() {
        return Err(NtsError::KissCode(response.kiss_code));
    }
    response.validate()?;

    Ok(build_result(
        host,
        measured_ip,
        measured_port,
        &response,
        ke_redirect_warning,
    ))
}

/// Measures `host` over NTS.
///
/// With a preferred `family`, the host is first measured without preference.
/// Only if that succeeds is a second measurement attempted on the preferred
/// family; should it fail, the first result is returned with code 6.
pub fn measure_nts<K: NtsKeyExchange>(
    ke: &K,
    host: &str,
    family: Option<IpFamily>,
    timeout: Duration,
) -> NtsProbe {
    let first = measure_nts_once(ke, host, None, timeout);

    let Some(family) = family else {
        return NtsProbe {
            outcome: first,
            family_fallback: false,
        };
    };
    if first.is_err() {
        return NtsProbe {
            outcome: first,
            family_fallback: false,
        };
    }

    thread::sleep(FAMILY_RETRY_DELAY);
    match measure_nts_once(ke, host, Some(family), timeout) {
        Ok(result) => NtsProbe {
            outcome: Ok(result),
            family_fallback: false,
        },
        Err(e) => {
            log::info!("NTS measurement of {} over {} failed: {}", host, family, e);
            NtsProbe {
                outcome: first,
                family_fallback: true,
            }
        }
    }
}
