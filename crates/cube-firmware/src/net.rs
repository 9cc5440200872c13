//! Network side of the history service: SNTP time sync and the TCP command
//! server.

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, with_timeout};
use embedded_io_async::Read;
use log::{debug, error, warn};

use cube_core::commands::CommandHandler;
use cube_core::transport::FramedWriter;

use crate::app_state::AppError;
use crate::clock::WallClock;

/// TCP port dashboard clients connect to.
pub const COMMAND_PORT: u16 = 8080;

/// Longest accepted command line, in bytes.
pub const MAX_COMMAND_LEN: usize = 512;

pub const NTP_SERVER: &str = "pool.ntp.org";
const NTP_PORT: u16 = 123;
const NTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Seconds between the NTP era (1900) and the Unix epoch.
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

// ---------------------------------------------------------------------------
// SNTP
// ---------------------------------------------------------------------------

/// Client request: LI 0, version 3, mode 3.
fn ntp_request() -> [u8; 48] {
    let mut packet = [0u8; 48];
    packet[0] = 0x1B;
    packet
}

/// Unix milliseconds from a server reply's transmit timestamp.
fn parse_ntp_response(packet: &[u8]) -> Option<u64> {
    if packet.len() < 48 || packet[0] & 0x07 != 4 {
        return None;
    }
    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]) as u64;
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]) as u64;

    let unix_seconds = seconds.checked_sub(NTP_UNIX_OFFSET_SECS)?;
    Some(unix_seconds * 1000 + ((fraction * 1000) >> 32))
}

/// Ask [`NTP_SERVER`] for the current time, in Unix milliseconds.
pub async fn query_sntp(stack: Stack<'_>) -> Result<u64, AppError> {
    let addresses = stack
        .dns_query(NTP_SERVER, DnsQueryType::A)
        .await
        .map_err(|e| {
            error!("DNS lookup of {} failed: {:?}", NTP_SERVER, e);
            AppError::time_sync("DNS lookup failed")
        })?;
    let server = addresses
        .first()
        .copied()
        .ok_or_else(|| AppError::time_sync("No address for NTP server"))?;

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket
        .bind(0)
        .map_err(|_| AppError::time_sync("Could not bind UDP socket"))?;

    socket
        .send_to(&ntp_request(), IpEndpoint::new(server, NTP_PORT))
        .await
        .map_err(|_| AppError::time_sync("Could not send NTP request"))?;

    let mut reply = [0u8; 48];
    let (len, _) = with_timeout(NTP_TIMEOUT, socket.recv_from(&mut reply))
        .await
        .map_err(|_| AppError::time_sync("NTP server did not answer"))?
        .map_err(|_| AppError::time_sync("Could not receive NTP reply"))?;

    parse_ntp_response(&reply[..len]).ok_or_else(|| AppError::time_sync("Malformed NTP reply"))
}

// ---------------------------------------------------------------------------
// Command server
// ---------------------------------------------------------------------------

/// Serve newline-delimited JSON commands on an accepted connection until
/// the client disconnects.
///
/// Lines longer than [`MAX_COMMAND_LEN`] are dropped whole.
pub async fn serve_connection(
    socket: &mut TcpSocket<'_>,
    handler: &CommandHandler<'_>,
    clock: &WallClock,
) -> Result<(), AppError> {
    let (mut reader, writer) = socket.split();
    let mut sink = FramedWriter::new(writer);

    let mut line: heapless::Vec<u8, MAX_COMMAND_LEN> = heapless::Vec::new();
    let mut overflowed = false;
    let mut chunk = [0u8; 128];

    loop {
        let read = reader
            .read(&mut chunk)
            .await
            .map_err(|_| AppError::connection("read failed"))?;
        if read == 0 {
            debug!("Client closed connection");
            return Ok(());
        }

        for &byte in &chunk[..read] {
            if byte != b'\n' {
                if line.push(byte).is_err() {
                    overflowed = true;
                }
                continue;
            }

            if overflowed {
                warn!("Dropped command longer than {} bytes", MAX_COMMAND_LEN);
            } else if !line.is_empty() {
                let text = core::str::from_utf8(&line).unwrap_or("");
                let outcome = handler.handle(text.trim(), clock.now_ms(), &mut sink).await;
                if outcome.is_disconnected() {
                    return Err(AppError::connection("client went away mid-reply"));
                }
            }
            line.clear();
            overflowed = false;
        }
    }
}

