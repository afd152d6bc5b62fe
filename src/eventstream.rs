//! Binary event-stream framing.
//!
//! Bedrock's response streams are sequences of `application/vnd.amazon.eventstream`
//! messages:
//!
//! ```text
//! [total length: u32][headers length: u32][prelude crc: u32][headers][payload][message crc: u32]
//! ```
//!
//! [`EventStreamCodec`] splits a byte stream into [`Frame`]s; [`Frame::into_chunk`] unwraps
//! the base64 chunk carried by `chunk` events and turns `exception` messages into errors.
//! The CRCs are skipped, not verified.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Buf, Bytes, BytesMut};
use serde::Deserialize;
use tokio_util::codec::Decoder;

use crate::decoder::StreamChunk;
use crate::error::{Error, Result};

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A typed header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// Boolean, encoded in the type byte.
    Bool(bool),
    /// Signed 8-bit integer.
    Byte(i8),
    /// Signed 16-bit integer.
    Short(i16),
    /// Signed 32-bit integer.
    Int(i32),
    /// Signed 64-bit integer.
    Long(i64),
    /// Length-prefixed bytes.
    ByteArray(Bytes),
    /// Length-prefixed UTF-8 string.
    String(String),
    /// Milliseconds since the epoch.
    Timestamp(i64),
    /// 16 raw bytes.
    Uuid([u8; 16]),
}

impl HeaderValue {
    /// The string value, if this is a string header.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// One decoded event-stream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    headers: Vec<(String, HeaderValue)>,
    payload: Bytes,
}

impl Frame {
    /// Create a frame from its parts.
    pub fn new(headers: Vec<(String, HeaderValue)>, payload: Bytes) -> Self {
        Self { headers, payload }
    }

    /// Looks up a header by name.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Looks up a string header by name.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(HeaderValue::as_str)
    }

    /// The raw payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Converts the frame into the response chunk it carries.
    ///
    /// Returns `Ok(None)` for events that carry no chunk.
    ///
    /// # Errors
    ///
    /// Exception messages become the matching transport error; a chunk event whose payload is
    /// not `{"bytes": "<base64>"}` is a decode error.
    pub fn into_chunk(self) -> Result<Option<StreamChunk>> {
        let message_type = self.header_str(":message-type").map(str::to_string);
        match message_type.as_deref() {
            Some("exception") | Some("error") => Err(self.into_error()),
            Some("event") | None => {
                if self.header_str(":event-type").is_some_and(|t| t != "chunk") {
                    return Ok(None);
                }
                #[derive(Deserialize)]
                struct ChunkEnvelope {
                    bytes: String,
                }
                let envelope: ChunkEnvelope =
                    serde_json::from_slice(&self.payload).map_err(|err| {
                        Error::decode(
                            format!("malformed chunk envelope: {err}"),
                            Some(Box::new(err)),
                        )
                    })?;
                let bytes = STANDARD.decode(envelope.bytes.as_bytes())?;
                Ok(Some(StreamChunk::new(bytes)))
            }
            Some(_) => Ok(None),
        }
    }

    fn into_error(self) -> Error {
        #[derive(Deserialize)]
        struct ExceptionBody {
            #[serde(alias = "Message")]
            message: Option<String>,
        }
        let kind = self
            .header_str(":exception-type")
            .or_else(|| self.header_str(":error-code"))
            .unwrap_or("unknownException")
            .to_string();
        let message = serde_json::from_slice::<ExceptionBody>(&self.payload)
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| String::from_utf8_lossy(&self.payload).into_owned());
        exception_to_error(&kind, message)
    }
}

/// Maps a Bedrock exception name to the transport error it represents.
pub fn exception_to_error(kind: &str, message: String) -> Error {
    match kind.to_ascii_lowercase().as_str() {
        "throttlingexception" => Error::rate_limit(message, None),
        "validationexception" => Error::bad_request(message),
        "accessdeniedexception" => Error::permission(message),
        "modeltimeoutexception" => Error::timeout(message, None),
        "serviceunavailableexception" => Error::service_unavailable(message, None),
        "internalserverexception" | "modelstreamerrorexception" => {
            Error::api(500, Some(kind.to_string()), message, None)
        }
        _ => Error::streaming(format!("{kind}: {message}"), None),
    }
}

/// Splits a byte stream into [`Frame`]s.
#[derive(Debug, Default)]
pub struct EventStreamCodec;

impl Decoder for EventStreamCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < PRELUDE_LEN {
            return Ok(None);
        }
        let total_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        let headers_len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if total_len < PRELUDE_LEN + CRC_LEN || total_len > MAX_FRAME_LEN {
            return Err(Error::decode(
                format!("event-stream frame length {total_len} out of range"),
                None,
            ));
        }
        if headers_len > total_len - PRELUDE_LEN - CRC_LEN {
            return Err(Error::decode(
                format!("event-stream headers length {headers_len} exceeds frame"),
                None,
            ));
        }
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total_len).freeze();
        frame.advance(PRELUDE_LEN);
        let headers = parse_headers(frame.split_to(headers_len))?;
        let payload = frame.split_to(total_len - PRELUDE_LEN - CRC_LEN - headers_len);
        Ok(Some(Frame { headers, payload }))
    }
}

fn need(buf: &Bytes, n: usize) -> Result<()> {
    if buf.remaining() < n {
        Err(Error::decode("truncated event-stream header", None))
    } else {
        Ok(())
    }
}

fn parse_headers(mut buf: Bytes) -> Result<Vec<(String, HeaderValue)>> {
    let mut headers = Vec::new();
    while buf.has_remaining() {
        need(&buf, 1)?;
        let name_len = buf.get_u8() as usize;
        need(&buf, name_len + 1)?;
        let name = std::str::from_utf8(&buf.split_to(name_len))?.to_string();
        let value = match buf.get_u8() {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => {
                need(&buf, 1)?;
                HeaderValue::Byte(buf.get_i8())
            }
            3 => {
                need(&buf, 2)?;
                HeaderValue::Short(buf.get_i16())
            }
            4 => {
                need(&buf, 4)?;
                HeaderValue::Int(buf.get_i32())
            }
            5 => {
                need(&buf, 8)?;
                HeaderValue::Long(buf.get_i64())
            }
            6 => {
                need(&buf, 2)?;
                let len = buf.get_u16() as usize;
                need(&buf, len)?;
                HeaderValue::ByteArray(buf.split_to(len))
            }
            7 => {
                need(&buf, 2)?;
                let len = buf.get_u16() as usize;
                need(&buf, len)?;
                HeaderValue::String(std::str::from_utf8(&buf.split_to(len))?.to_string())
            }
            8 => {
                need(&buf, 8)?;
                HeaderValue::Timestamp(buf.get_i64())
            }
            9 => {
                need(&buf, 16)?;
                let mut uuid = [0u8; 16];
                buf.copy_to_slice(&mut uuid);
                HeaderValue::Uuid(uuid)
            }
            other => {
                return Err(Error::decode(
                    format!("unknown event-stream header type {other}"),
                    None,
                ));
            }
        };
        headers.push((name, value));
    }
    Ok(headers)
}
