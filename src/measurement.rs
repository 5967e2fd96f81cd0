//! Single NTP exchange: resolve, send, await one reply, decode.
//!
//! ```text
//! Idle -> Connected -> Sent -> AwaitingReply{deadline} -> Parsed
//!   \          \          \            \
//!    +----------+----------+------------+--> Failed(code)
//! ```
//!
//! The socket lives for the duration of one call and is dropped on every exit
//! path.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::Instant;

use crate::debug_log::DebugLog;
use crate::packets::ParseError;
use crate::parser::{parse_response, ClientState};
use crate::report::MeasurementResult;
use crate::request::build_request;
use crate::time::now_to_ntp64;
use crate::version::NtpVersion;

/// Well-known NTP server port.
pub const NTP_PORT: u16 = 123;

/// Largest datagram accepted from a server.
pub const RECV_BUFFER_SIZE: usize = 1024;

/// Default time to wait for a reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(7);

/// Per-call settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureOptions {
    /// How long to wait for the reply once the request is sent.
    pub timeout: Duration,
    /// NTPv5 draft hint, sent as an extension field and used to pick the
    /// response layout.
    pub draft: Option<String>,
    /// Server port.
    pub port: u16,
}

impl Default for MeasureOptions {
    fn default() -> Self {
        MeasureOptions {
            timeout: DEFAULT_TIMEOUT,
            draft: None,
            port: NTP_PORT,
        }
    }
}

/// Errors that end a measurement.
#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("error connecting: {0}")]
    Connect(#[source] io::Error),

    #[error("could not send data: {0}")]
    Send(#[source] io::Error),

    #[error("measurement timeout: no response within {0:?}")]
    Timeout(Duration),

    #[error("error reading bytes: {0}")]
    Receive(#[source] io::Error),

    #[error("error parsing response: {0}")]
    Parse(#[from] ParseError),
}

impl MeasureError {
    /// Stable numeric code: 1 connect, 2 send, 3 timeout or read, 4 parse.
    pub fn code(&self) -> i32 {
        match self {
            MeasureError::Connect(_) => 1,
            MeasureError::Send(_) => 2,
            MeasureError::Timeout(_) | MeasureError::Receive(_) => 3,
            MeasureError::Parse(_) => 4,
        }
    }
}

/// Outcome of one measurement together with its debug trace.
#[derive(Debug)]
pub struct Probe {
    pub outcome: Result<MeasurementResult, MeasureError>,
    pub debug_log: String,
}

impl Probe {
    /// 0 on success, otherwise the error's code.
    pub fn code(&self) -> i32 {
        match &self.outcome {
            Ok(_) => 0,
            Err(e) => e.code(),
        }
    }
}

/// Formats `host:port`, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Measures `host` with the given protocol version.
///
/// Never panics or returns early: every failure is folded into the returned
/// [`Probe`] with its code and a line in the debug log.
pub async fn measure(host: &str, version: NtpVersion, opts: &MeasureOptions) -> Probe {
    let mut rng = StdRng::from_os_rng();
    measure_with_rng(host, version, opts, &mut rng).await
}

/// Like [`measure`], with an explicit source for the NTPv5 client cookie.
pub async fn measure_with_rng<R: RngCore + Send + ?Sized>(
    host: &str,
    version: NtpVersion,
    opts: &MeasureOptions,
    rng: &mut R,
) -> Probe {
    let mut log = DebugLog::new();
    let outcome = exchange(host, version, opts, rng, &mut log).await;

    match &outcome {
        Ok(_) => log::info!("{} measurement of {} succeeded", version, host),
        Err(e) => {
            log::warn!("{} measurement of {} failed: {}", version, host, e);
            log.line(e);
        }
    }

    Probe {
        outcome,
        debug_log: log.into_string(),
    }
}

async fn connect(host: &str, port: u16) -> io::Result<UdpSocket> {
    let remote_addr = lookup_host((host, port)).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address found for {}", host),
        )
    })?;

    let local_addr: SocketAddr = if remote_addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local_addr).await?;
    socket.connect(remote_addr).await?;
    Ok(socket)
}

async fn exchange<R: RngCore + Send + ?Sized>(
    host: &str,
    version: NtpVersion,
    opts: &MeasureOptions,
    rng: &mut R,
    log: &mut DebugLog,
) -> Result<MeasurementResult, MeasureError> {
    let target = join_host_port(host, opts.port);

    let socket = connect(host, opts.port)
        .await
        .map_err(MeasureError::Connect)?;
    let peer = socket.peer_addr().map_err(MeasureError::Connect)?;
    log.line(format_args!("connected to {}", target));

    let request = build_request(version, opts.draft.as_deref(), rng, log);
    log.line(format_args!(
        "Packet {} size sent: {} bytes",
        version,
        request.bytes.len()
    ));
    socket
        .send(&request.bytes)
        .await
        .map_err(MeasureError::Send)?;

    let mut recv_buf = [0u8; RECV_BUFFER_SIZE];
    let recv = socket.recv(&mut recv_buf);
    // An unrepresentable deadline falls back to tokio's saturating timeout.
    let received = match Instant::now().checked_add(opts.timeout) {
        Some(deadline) => tokio::time::timeout_at(deadline, recv).await,
        None => tokio::time::timeout(opts.timeout, recv).await,
    };
    let len = match received {
        Ok(Ok(len)) => len,
        Ok(Err(e)) => return Err(MeasureError::Receive(e)),
        Err(_) => return Err(MeasureError::Timeout(opts.timeout)),
    };
    let t4 = now_to_ntp64();

    let client = ClientState {
        t1: request.t1,
        t4,
        client_cookie: request.client_cookie.unwrap_or(0),
    };
    let mut result = parse_response(&recv_buf[..len], &client, opts.draft.as_deref(), log)?;
    result.annotate(host, peer.ip());
    Ok(result)
}
