use super::messages::{TelemetryRecord, TelemetryRequest, TelemetryResponse};
use async_trait::async_trait;
use std::{
    fmt::{Display, Formatter},
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

/// Faults on the per-vehicle telemetry channel.
///
/// The fleet monitor maps every variant into a communication failure for the
/// affected vehicle; nothing propagates above it.
#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    /// No reply arrived within the configured threshold.
    Timeout,
    /// The peer closed the channel.
    Closed,
    /// The reply could not be decoded or carried no telemetry.
    Malformed(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "telemetry I/O error: {e}"),
            TransportError::Timeout => write!(f, "telemetry request timed out"),
            TransportError::Closed => write!(f, "telemetry channel closed by peer"),
            TransportError::Malformed(detail) => write!(f, "malformed telemetry reply: {detail}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(value: std::io::Error) -> Self { TransportError::Io(value) }
}

impl From<serde_json::Error> for TransportError {
    fn from(value: serde_json::Error) -> Self { TransportError::Malformed(value.to_string()) }
}

/// Request/response telemetry channel to one vehicle.
///
/// Implementations must resolve every call within roughly the passed timeout
/// so the monitor's polling cadence stays bounded.
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    /// Requests one telemetry record, honoring `timeout`.
    async fn request_telemetry(&mut self, timeout: Duration)
    -> Result<TelemetryRecord, TransportError>;

    /// Closes the underlying channel. Subsequent requests fail.
    async fn close(&mut self);
}

/// Newline-delimited JSON telemetry channel over TCP.
pub struct TcpVehicleLink {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
}

impl TcpVehicleLink {
    /// Connects to a vehicle-side telemetry endpoint.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wraps an already-accepted connection.
    pub fn from_stream(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self { reader: BufReader::new(read_half), writer: write_half, next_request_id: 0 }
    }
}

#[async_trait]
impl TelemetryTransport for TcpVehicleLink {
    async fn request_telemetry(
        &mut self,
        timeout: Duration,
    ) -> Result<TelemetryRecord, TransportError> {
        self.next_request_id += 1;
        let mut line = serde_json::to_string(&TelemetryRequest::new(self.next_request_id))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;

        let mut reply = String::new();
        match tokio::time::timeout(timeout, self.reader.read_line(&mut reply)).await {
            Err(_) => Err(TransportError::Timeout),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Ok(Ok(0)) => Err(TransportError::Closed),
            Ok(Ok(_)) => {
                let response: TelemetryResponse = serde_json::from_str(reply.trim_end())?;
                if let Some(detail) = response.error() {
                    return Err(TransportError::Malformed(detail.to_string()));
                }
                response
                    .result()
                    .cloned()
                    .ok_or_else(|| TransportError::Malformed("reply without result".to_string()))
            }
        }
    }

    async fn close(&mut self) { self.writer.shutdown().await.ok(); }
}
