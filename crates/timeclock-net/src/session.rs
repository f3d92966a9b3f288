//! TCP session with one pull-protocol device.
//!
//! A [`DeviceSession`] owns exactly one live connection to one device for the
//! duration of a single operation and is never shared across concurrent
//! callers; per-device scheduling lives at a higher layer.
//!
//! # Architecture
//!
//! ```text
//! SyncService
//!     │
//!     └─> DeviceSession ───(TCP)───> Device
//!            │
//!            └─> PullCodec (framing + checksum)
//! ```
//!
//! # Design Principles
//!
//! - **No automatic retry**: a failed session is torn down and the error
//!   propagates; retry policy belongs to the caller
//! - **No connection pooling**: one short-lived connection per operation
//! - **Bounded I/O**: every network operation runs under the configured
//!   timeout
//!
//! Bulk reads buffer the full transfer and hand back a [`RecordIter`], a
//! lazy, finite, non-restartable iterator over decoded records. Each record
//! decodes on demand and yields its own `Result`, so one corrupt record never
//! hides the rest of the batch.

use bytes::{Bytes, BytesMut};
use chrono::NaiveDateTime;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

use timeclock_core::{
    CommKey, PunchRecord, UserRecord,
    constants::{DEFAULT_SESSION_TIMEOUT_MS, PULL_PUNCH_RECORD_LEN, PULL_USER_RECORD_LEN},
};
use timeclock_protocol::{
    CommandCode, Frame, PullCodec, decode_punch, decode_time_payload, decode_user,
    encode_time_payload,
};

/// Configuration for a device session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device address
    pub addr: SocketAddr,

    /// Timeout for every I/O operation (connect, send, recv)
    pub timeout: Duration,

    /// Communication key; zero means the device requires no auth
    pub comm_key: CommKey,
}

impl SessionConfig {
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS),
            comm_key: CommKey::new(0),
        }
    }
}

/// Errors from device session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session is not connected
    #[error("Not connected to device")]
    NotConnected,

    /// Connection attempt timed out
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Read operation timed out
    #[error("Read timeout after {0}ms")]
    ReadTimeout(u64),

    /// Write operation timed out
    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    /// Connection was lost during an operation
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Device rejected the communication key
    #[error("Device rejected authentication")]
    Unauthorized,

    /// Device answered a request with an error acknowledgment
    #[error("Device refused {command:?}")]
    Refused { command: CommandCode },

    /// Protocol-level error from the codec
    #[error("Protocol error: {0}")]
    Protocol(#[from] timeclock_core::Error),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Collapse session errors into the shared error taxonomy: everything that
/// prevented reaching or keeping the device maps to `DeviceUnreachable`,
/// everything the device said that made no sense maps to `Protocol`.
impl From<SessionError> for timeclock_core::Error {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Protocol(inner) => inner,
            SessionError::Refused { command } => timeclock_core::Error::Protocol {
                message: format!("Device refused {command:?}"),
            },
            SessionError::NotConnected
            | SessionError::ConnectionTimeout(_)
            | SessionError::ReadTimeout(_)
            | SessionError::WriteTimeout(_)
            | SessionError::ConnectionLost(_)
            | SessionError::Unauthorized => timeclock_core::Error::DeviceUnreachable {
                detail: e.to_string(),
            },
            SessionError::Io(inner) => timeclock_core::Error::DeviceUnreachable {
                detail: inner.to_string(),
            },
        }
    }
}

/// Record counts and capacities reported by the device.
///
/// The GetFreeSizes payload is six little-endian u32 fields: user count,
/// fingerprint count, punch count, then the matching capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub user_count: u32,
    pub fingerprint_count: u32,
    pub punch_count: u32,
    pub user_capacity: u32,
    pub fingerprint_capacity: u32,
    pub punch_capacity: u32,
}

impl DeviceInfo {
    fn parse(payload: &[u8]) -> Result<Self, SessionError> {
        if payload.len() < 24 {
            return Err(SessionError::Protocol(timeclock_core::Error::protocol(
                format!("Free-sizes payload truncated: {} bytes", payload.len()),
            )));
        }
        let field = |i: usize| {
            u32::from_le_bytes([
                payload[i * 4],
                payload[i * 4 + 1],
                payload[i * 4 + 2],
                payload[i * 4 + 3],
            ])
        };
        Ok(DeviceInfo {
            user_count: field(0),
            fingerprint_count: field(1),
            punch_count: field(2),
            user_capacity: field(3),
            fingerprint_capacity: field(4),
            punch_capacity: field(5),
        })
    }
}

/// Lazy iterator over fixed-size records decoded from a buffered bulk read.
///
/// Finite and non-restartable: records decode front to back and consumed
/// bytes are gone. A trailing partial record yields one final `Err`.
pub struct RecordIter<T> {
    buf: Bytes,
    record_len: usize,
    decode: fn(&[u8]) -> timeclock_core::Result<T>,
    done: bool,
}

impl<T> RecordIter<T> {
    fn new(buf: Bytes, record_len: usize, decode: fn(&[u8]) -> timeclock_core::Result<T>) -> Self {
        Self {
            buf,
            record_len,
            decode,
            done: false,
        }
    }

    /// Bytes not yet decoded.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }
}

impl<T> Iterator for RecordIter<T> {
    type Item = timeclock_core::Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.buf.is_empty() {
            self.done = true;
            return None;
        }
        if self.buf.len() < self.record_len {
            self.done = true;
            return Some(Err(timeclock_core::Error::InvalidRecord(format!(
                "Trailing partial record: {} of {} bytes",
                self.buf.len(),
                self.record_len
            ))));
        }
        let raw = self.buf.split_to(self.record_len);
        Some((self.decode)(&raw))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.buf.len() / self.record_len;
        (0, Some(n + usize::from(self.buf.len() % self.record_len != 0)))
    }
}

/// A live TCP session with one device.
///
/// # Connection Lifecycle
///
/// 1. Open with [`DeviceSession::connect`], which also authenticates
/// 2. Fetch data or send commands
/// 3. Close with [`DeviceSession::disconnect`]
///
/// The session is closed exactly once on any exit path: `disconnect` is
/// idempotent and dropping an open session closes the socket.
pub struct DeviceSession {
    addr: SocketAddr,
    framed: Option<Framed<TcpStream, PullCodec>>,
    timeout: Duration,
    session_id: u16,
    reply_id: u16,
}

impl DeviceSession {
    /// Connect to a device and open an authenticated session.
    ///
    /// # Errors
    /// - Connection refused or timed out: the caller sees this as
    ///   device-unreachable
    /// - Wrong communication key: [`SessionError::Unauthorized`]
    pub async fn connect(config: SessionConfig) -> Result<Self, SessionError> {
        info!("Connecting to device at {}", config.addr);

        let stream = match tokio::time::timeout(config.timeout, TcpStream::connect(config.addr))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("Connection to {} failed: {}", config.addr, e);
                return Err(e.into());
            }
            Err(_) => {
                warn!("Connection timeout after {}ms", config.timeout.as_millis());
                return Err(SessionError::ConnectionTimeout(
                    config.timeout.as_millis() as u64
                ));
            }
        };

        // Request/response exchanges are small and latency-bound
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let mut session = Self {
            addr: config.addr,
            framed: Some(Framed::new(stream, PullCodec::new())),
            timeout: config.timeout,
            session_id: 0,
            reply_id: 0,
        };

        session.handshake(&config.comm_key).await?;
        debug!(session_id = session.session_id, "Session established");
        Ok(session)
    }

    /// Connect exchange: the device assigns the session id in its first
    /// reply and may demand authentication before anything else.
    async fn handshake(&mut self, comm_key: &CommKey) -> Result<(), SessionError> {
        self.send_frame(Frame::new(CommandCode::Connect, 0, 0)).await?;
        let reply = self.recv_frame().await?;
        self.session_id = reply.session_id;

        match reply.command {
            CommandCode::AckOk => Ok(()),
            CommandCode::AckUnauth => {
                trace!("Device demands authentication");
                let payload = auth_payload(comm_key, self.session_id);
                let reply = self
                    .exchange(CommandCode::Auth, Bytes::copy_from_slice(&payload))
                    .await?;
                match reply.command {
                    CommandCode::AckOk => Ok(()),
                    _ => Err(SessionError::Unauthorized),
                }
            }
            other => Err(SessionError::Protocol(timeclock_core::Error::protocol(
                format!("Unexpected connect reply: {other:?}"),
            ))),
        }
    }

    /// Fetch the enrolled user table.
    pub async fn fetch_users(&mut self) -> Result<RecordIter<UserRecord>, SessionError> {
        let data = self.read_bulk(CommandCode::ReadUsers).await?;
        debug!(bytes = data.len(), "Fetched user table");
        Ok(RecordIter::new(data, PULL_USER_RECORD_LEN, decode_user))
    }

    /// Fetch all stored attendance records.
    ///
    /// Devices do not filter by date; the caller applies its reporting
    /// window to the decoded records.
    pub async fn fetch_attendance(&mut self) -> Result<RecordIter<PunchRecord>, SessionError> {
        let data = self.read_bulk(CommandCode::ReadAttLog).await?;
        debug!(bytes = data.len(), "Fetched attendance log");
        Ok(RecordIter::new(data, PULL_PUNCH_RECORD_LEN, decode_punch))
    }

    /// Read record counts and capacities.
    pub async fn device_info(&mut self) -> Result<DeviceInfo, SessionError> {
        let reply = self.expect_ok(CommandCode::GetFreeSizes, Bytes::new()).await?;
        DeviceInfo::parse(&reply.payload)
    }

    /// Read the device clock.
    pub async fn get_time(&mut self) -> Result<NaiveDateTime, SessionError> {
        let reply = self.expect_ok(CommandCode::GetTime, Bytes::new()).await?;
        Ok(decode_time_payload(&reply.payload)?)
    }

    /// Set the device clock.
    pub async fn set_time(&mut self, when: NaiveDateTime) -> Result<(), SessionError> {
        let payload = encode_time_payload(when)?;
        self.expect_ok(CommandCode::SetTime, payload.freeze()).await?;
        Ok(())
    }

    /// Send a command expecting a bare success acknowledgment.
    pub async fn send_command(
        &mut self,
        command: CommandCode,
        payload: Bytes,
    ) -> Result<(), SessionError> {
        self.expect_ok(command, payload).await?;
        Ok(())
    }

    /// Whether the session still holds a connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Close the session gracefully. Idempotent.
    ///
    /// Sends Exit best-effort, then flushes and shuts the socket down with
    /// a 500ms bound on each step so a dead network cannot hang the caller.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.framed.is_none() {
            return Ok(());
        }

        // Best effort; the device may already be gone
        let exit = Frame::new(CommandCode::Exit, self.session_id, self.next_reply_id());
        if let Err(e) = self.send_frame(exit).await {
            debug!("Exit not delivered during disconnect: {}", e);
        }

        if let Some(mut framed) = self.framed.take() {
            info!("Closing session with {}", self.addr);

            let close_timeout = Duration::from_millis(500);
            match tokio::time::timeout(close_timeout, framed.flush()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error flushing during disconnect: {}", e),
                Err(_) => warn!("Flush timeout during disconnect"),
            }

            let mut stream = framed.into_inner();
            match tokio::time::timeout(close_timeout, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error during shutdown: {}", e),
                Err(_) => warn!("Shutdown timeout during disconnect"),
            }
        }

        Ok(())
    }

    /// Send a request and receive its reply.
    async fn exchange(
        &mut self,
        command: CommandCode,
        payload: Bytes,
    ) -> Result<Frame, SessionError> {
        let reply_id = self.next_reply_id();
        self.send_frame(Frame::with_payload(command, self.session_id, reply_id, payload))
            .await?;
        self.recv_frame().await
    }

    /// Exchange and require a success acknowledgment.
    async fn expect_ok(
        &mut self,
        command: CommandCode,
        payload: Bytes,
    ) -> Result<Frame, SessionError> {
        let reply = self.exchange(command, payload).await?;
        match reply.command {
            CommandCode::AckOk => Ok(reply),
            CommandCode::AckUnauth => Err(SessionError::Unauthorized),
            CommandCode::AckError => Err(SessionError::Refused { command }),
            other => Err(SessionError::Protocol(timeclock_core::Error::protocol(
                format!("Unexpected reply to {command:?}: {other:?}"),
            ))),
        }
    }

    /// Run a bulk read: small result sets arrive inline in the success
    /// acknowledgment; larger ones are announced with PrepareData and
    /// streamed in Data chunks, terminated by the acknowledgment.
    async fn read_bulk(&mut self, command: CommandCode) -> Result<Bytes, SessionError> {
        let first = self.exchange(command, Bytes::new()).await?;

        match first.command {
            CommandCode::AckOk => Ok(first.payload),
            CommandCode::AckUnauth => Err(SessionError::Unauthorized),
            CommandCode::AckError => Err(SessionError::Refused { command }),
            CommandCode::PrepareData => {
                if first.payload.len() < 4 {
                    return Err(SessionError::Protocol(timeclock_core::Error::protocol(
                        "PrepareData payload truncated",
                    )));
                }
                let total = u32::from_le_bytes([
                    first.payload[0],
                    first.payload[1],
                    first.payload[2],
                    first.payload[3],
                ]) as usize;
                trace!(total, "Bulk transfer announced");

                let mut data = BytesMut::with_capacity(total);
                while data.len() < total {
                    let chunk = self.recv_frame().await?;
                    match chunk.command {
                        CommandCode::Data => data.extend_from_slice(&chunk.payload),
                        other => {
                            return Err(SessionError::Protocol(
                                timeclock_core::Error::protocol(format!(
                                    "Expected data chunk, got {other:?}"
                                )),
                            ));
                        }
                    }
                }
                if data.len() != total {
                    return Err(SessionError::Protocol(timeclock_core::Error::protocol(
                        format!("Bulk overrun: announced {total}, received {}", data.len()),
                    )));
                }

                // Trailing acknowledgment closes the transfer
                let done = self.recv_frame().await?;
                if done.command != CommandCode::AckOk {
                    return Err(SessionError::Protocol(timeclock_core::Error::protocol(
                        format!("Expected transfer acknowledgment, got {:?}", done.command),
                    )));
                }

                // Let the device release its transfer buffer
                let free = Frame::new(CommandCode::FreeData, self.session_id, self.next_reply_id());
                self.send_frame(free).await?;

                Ok(data.freeze())
            }
            other => Err(SessionError::Protocol(timeclock_core::Error::protocol(
                format!("Unexpected reply to {command:?}: {other:?}"),
            ))),
        }
    }

    fn next_reply_id(&mut self) -> u16 {
        self.reply_id = self.reply_id.wrapping_add(1);
        self.reply_id
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        trace!(command = ?frame.command, payload = frame.payload.len(), "Sending frame");
        let framed = self.framed.as_mut().ok_or(SessionError::NotConnected)?;

        match tokio::time::timeout(self.timeout, framed.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Failed to send frame: {}", e);
                Err(SessionError::Protocol(e))
            }
            Err(_) => {
                warn!("Send timeout after {}ms", self.timeout.as_millis());
                Err(SessionError::WriteTimeout(self.timeout.as_millis() as u64))
            }
        }
    }

    async fn recv_frame(&mut self) -> Result<Frame, SessionError> {
        let framed = self.framed.as_mut().ok_or(SessionError::NotConnected)?;

        match tokio::time::timeout(self.timeout, framed.next()).await {
            Ok(Some(Ok(frame))) => {
                trace!(command = ?frame.command, payload = frame.payload.len(), "Received frame");
                Ok(frame)
            }
            Ok(Some(Err(e))) => {
                error!("Failed to decode frame: {}", e);
                Err(SessionError::Protocol(e))
            }
            Ok(None) => {
                warn!("Connection closed by device");
                Err(SessionError::ConnectionLost(
                    "Device closed connection".to_string(),
                ))
            }
            Err(_) => {
                warn!("Receive timeout after {}ms", self.timeout.as_millis());
                Err(SessionError::ReadTimeout(self.timeout.as_millis() as u64))
            }
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.framed.is_some() {
            debug!("DeviceSession dropped while connected - socket will be closed");
        }
    }
}

/// Auth payload: the communication key mixed with the session id, so a
/// captured handshake cannot be replayed against a new session.
fn auth_payload(key: &CommKey, session_id: u16) -> [u8; 4] {
    (key.value() ^ u32::from(session_id)).to_le_bytes()
}
