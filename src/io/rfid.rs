//! RFID serial reader
//!
//! Protocol:
//! - Baud: 9600, 8N1, receive only
//! - Frame: STX (0x02), 12 ASCII hex characters, ETX (0x03)
//! - The 12 characters decode to 6 bytes; XOR of all 6 must be 0
//! - Tag id: bytes 1..=4, big-endian
//!
//! Decoded reads go through the presence debouncer; the resulting edges are
//! forwarded to the listener (normally the momentary gate).

use crate::domain::types::TagId;
use crate::infra::config::Config;
use crate::infra::mailbox::fatal;
use crate::services::presence::{forward, PresenceDebouncer, PresenceListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

const STX: u8 = 0x02;
const ETX: u8 = 0x03;
/// Hex characters between STX and ETX
const FRAME_HEX_LEN: usize = 12;
/// A frame must complete within this long of its STX
const FRAME_TIMEOUT: Duration = Duration::from_millis(200);
/// Serial read poll; also the granularity of the quiet check
const READ_POLL: Duration = Duration::from_millis(100);

/// Byte-at-a-time frame decoder
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Set while inside a frame
    stx_at: Option<Instant>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(FRAME_HEX_LEN), stx_at: None }
    }

    /// Feed one byte; returns a tag id when it completes a valid frame
    pub fn push(&mut self, byte: u8, now: Instant) -> Option<TagId> {
        match byte {
            STX => {
                if !self.buf.is_empty() {
                    warn!(raw = %String::from_utf8_lossy(&self.buf), "rfid_frame_restarted");
                }
                self.buf.clear();
                self.stx_at = Some(now);
                None
            }
            ETX => {
                self.stx_at.take()?;
                let frame = std::mem::take(&mut self.buf);
                decode_frame(&frame)
            }
            _ if self.stx_at.is_none() => None,
            _ if self.buf.len() >= FRAME_HEX_LEN => {
                warn!(raw = %String::from_utf8_lossy(&self.buf), "rfid_frame_too_long");
                self.reset();
                None
            }
            _ => {
                self.buf.push(byte);
                None
            }
        }
    }

    /// Drop a frame that has been open for too long
    pub fn check_timeout(&mut self, now: Instant) {
        if let Some(stx_at) = self.stx_at {
            if now.saturating_duration_since(stx_at) >= FRAME_TIMEOUT {
                warn!(raw = %String::from_utf8_lossy(&self.buf), "rfid_frame_timeout");
                self.reset();
            }
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.stx_at = None;
    }
}

/// Decode and validate the hex payload of one frame
pub fn decode_frame(hex_chars: &[u8]) -> Option<TagId> {
    if hex_chars.len() != FRAME_HEX_LEN {
        warn!(
            len = hex_chars.len(),
            expected = FRAME_HEX_LEN,
            raw = %String::from_utf8_lossy(hex_chars),
            "rfid_frame_bad_length"
        );
        return None;
    }

    let mut bytes = [0u8; FRAME_HEX_LEN / 2];
    if let Err(e) = hex::decode_to_slice(hex_chars, &mut bytes) {
        warn!(error = %e, raw = %String::from_utf8_lossy(hex_chars), "rfid_frame_bad_hex");
        return None;
    }

    let crc = bytes.iter().fold(0u8, |acc, &b| acc ^ b);
    if crc != 0 {
        warn!(
            crc = %format_args!("{:02x}", crc),
            raw = %String::from_utf8_lossy(hex_chars),
            "rfid_frame_bad_crc"
        );
        return None;
    }

    let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Some(TagId(id))
}

/// Serial reader feeding the debouncer
pub struct RfidReader {
    device: String,
    baud: u32,
    decoder: FrameDecoder,
    debouncer: PresenceDebouncer,
    listener: Arc<dyn PresenceListener>,
}

impl RfidReader {
    pub fn new(config: &Config, listener: Arc<dyn PresenceListener>) -> Self {
        Self {
            device: config.rfid_device().to_string(),
            baud: config.rfid_baud(),
            decoder: FrameDecoder::new(),
            debouncer: PresenceDebouncer::new(config.rfid_quiet()),
            listener,
        }
    }

    /// Open the serial port and pump it until shutdown
    ///
    /// An empty device path disables the reader. Failing to open a
    /// configured port is fatal.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        if self.device.is_empty() {
            info!("rfid_reader_disabled");
            return;
        }

        let port = match tokio_serial::new(&self.device, self.baud).open_native_async() {
            Ok(port) => port,
            Err(e) => fatal("rfid", format_args!("open {}: {}", self.device, e)),
        };
        info!(device = %self.device, baud = %self.baud, "rfid_port_opened");

        self.pump(port, shutdown).await;
    }

    /// Read frames from any byte source
    pub async fn pump<R>(mut self, mut port: R, mut shutdown: watch::Receiver<bool>)
    where
        R: AsyncRead + Unpin,
    {
        let mut rx_buf = [0u8; 1 + FRAME_HEX_LEN + 1];
        let mut eof = false;

        loop {
            if *shutdown.borrow() {
                info!("rfid_shutdown");
                return;
            }

            if eof {
                // Source is gone; keep the quiet check running so a present tag
                // still gets its absent edge
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(READ_POLL) => {}
                }
            } else {
                match timeout(READ_POLL, port.read(&mut rx_buf)).await {
                    Ok(Ok(0)) => {
                        warn!("rfid_port_closed");
                        eof = true;
                    }
                    Ok(Ok(n)) => {
                        debug!(raw = %String::from_utf8_lossy(&rx_buf[..n]), "rfid_rx");
                        for &byte in &rx_buf[..n] {
                            if let Some(id) = self.decoder.push(byte, Instant::now()) {
                                self.on_read(id).await;
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "rfid_read_error");
                        tokio::time::sleep(READ_POLL).await;
                    }
                    Err(_) => {}
                }
            }

            let now = Instant::now();
            self.decoder.check_timeout(now);
            if let Some(event) = self.debouncer.check_quiet(now) {
                forward(self.listener.as_ref(), event).await;
            }
        }
    }

    async fn on_read(&mut self, id: TagId) {
        debug!(id = %id, "rfid_read");
        for event in self.debouncer.on_read(id, Instant::now()) {
            forward(self.listener.as_ref(), event).await;
        }
    }
}
