use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::frame::{Flags, Frame, ResetStatus, Setting, MAX_STREAM_ID};
use crate::headers::HeaderMap;

/// Frame header: 4 bytes of type/stream info + flags (1) + length (3) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Protocol version written into every control frame.
pub const SPDY_VERSION: u16 = 2;

/// Largest payload a 24-bit length field can describe.
pub const MAX_FRAME_PAYLOAD: usize = 0x00ff_ffff;

/// Default maximum payload size accepted by readers and writers.
pub const DEFAULT_MAX_PAYLOAD: usize = MAX_FRAME_PAYLOAD;

const CONTROL_BIT: u8 = 0x80;

const TYPE_SYN_STREAM: u16 = 1;
const TYPE_SYN_REPLY: u16 = 2;
const TYPE_RST_STREAM: u16 = 3;
const TYPE_SETTINGS: u16 = 4;
const TYPE_NOOP: u16 = 5;
const TYPE_PING: u16 = 6;
const TYPE_GOAWAY: u16 = 7;
const TYPE_HEADERS: u16 = 8;

const VALUE_SEPARATOR: &str = "\0";

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// control: ┌─┬─────────────┬───────────┬─────────┬──────────────┬─────────┐
///          │1│ version (15)│ type (16) │flags (8)│ length (24)  │ body    │
///          └─┴─────────────┴───────────┴─────────┴──────────────┴─────────┘
/// data:    ┌─┬───────────────────────────┬─────────┬──────────────┬─────────┐
///          │0│ stream id (31)            │flags (8)│ length (24)  │ payload │
///          └─┴───────────────────────────┴─────────┴──────────────┴─────────┘
/// ```
///
/// Header blocks are a 16-bit pair count followed by 16-bit length-prefixed
/// names and values; multiple values for one name are joined with NUL.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let start = dst.len();
    let result = encode_into(frame, dst, start);
    if result.is_err() {
        dst.truncate(start);
    }
    result
}

fn encode_into(frame: &Frame, dst: &mut BytesMut, start: usize) -> Result<()> {
    match frame {
        Frame::Data {
            stream_id,
            flags,
            data,
        } => {
            check_stream_id(*stream_id)?;
            dst.reserve(HEADER_SIZE + data.len());
            dst.put_u32(*stream_id);
            dst.put_u8(flags.bits());
            dst.put_slice(&[0, 0, 0]);
            dst.put_slice(data);
        }
        Frame::SynStream {
            stream_id,
            flags,
            headers,
        } => {
            check_stream_id(*stream_id)?;
            put_control_header(dst, TYPE_SYN_STREAM, *flags);
            dst.put_u32(*stream_id);
            // Associated stream id and priority are not modelled.
            dst.put_u32(0);
            dst.put_u16(0);
            put_header_block(dst, headers)?;
        }
        Frame::SynReply {
            stream_id,
            flags,
            headers,
        } => {
            check_stream_id(*stream_id)?;
            put_control_header(dst, TYPE_SYN_REPLY, *flags);
            dst.put_u32(*stream_id);
            dst.put_u16(0);
            put_header_block(dst, headers)?;
        }
        Frame::Headers {
            stream_id,
            flags,
            headers,
        } => {
            check_stream_id(*stream_id)?;
            put_control_header(dst, TYPE_HEADERS, *flags);
            dst.put_u32(*stream_id);
            dst.put_u16(0);
            put_header_block(dst, headers)?;
        }
        Frame::RstStream { stream_id, status } => {
            check_stream_id(*stream_id)?;
            put_control_header(dst, TYPE_RST_STREAM, Flags::NONE);
            dst.put_u32(*stream_id);
            dst.put_u32(status.code());
        }
        Frame::Settings { flags, entries } => {
            put_control_header(dst, TYPE_SETTINGS, *flags);
            dst.put_u32(entries.len() as u32);
            for entry in entries {
                if entry.id > 0x00ff_ffff {
                    return Err(FrameError::InvalidFrame {
                        kind: "SETTINGS",
                        reason: format!("setting id {} exceeds 24 bits", entry.id),
                    });
                }
                dst.put_u8(entry.flags);
                put_u24(dst, entry.id as usize);
                dst.put_u32(entry.value);
            }
        }
        Frame::Noop => put_control_header(dst, TYPE_NOOP, Flags::NONE),
        Frame::Ping { id } => {
            put_control_header(dst, TYPE_PING, Flags::NONE);
            dst.put_u32(*id);
        }
        Frame::GoAway {
            last_good_stream_id,
        } => {
            check_stream_id(*last_good_stream_id)?;
            put_control_header(dst, TYPE_GOAWAY, Flags::NONE);
            dst.put_u32(*last_good_stream_id);
        }
    }

    let payload_len = dst.len() - start - HEADER_SIZE;
    if payload_len > MAX_FRAME_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: MAX_FRAME_PAYLOAD,
        });
    }
    let len_bytes = (payload_len as u32).to_be_bytes();
    dst[start + 5..start + HEADER_SIZE].copy_from_slice(&len_bytes[1..]);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. Control frames of
/// unknown type are consumed and skipped.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    loop {
        if src.len() < HEADER_SIZE {
            return Ok(None); // Need more data
        }

        let payload_len =
            ((src[5] as usize) << 16) | ((src[6] as usize) << 8) | (src[7] as usize);
        if payload_len > max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max: max_payload,
            });
        }

        if src.len() < HEADER_SIZE + payload_len {
            return Ok(None); // Need more data
        }

        let mut head = src.split_to(HEADER_SIZE).freeze();
        let body = src.split_to(payload_len).freeze();

        if head[0] & CONTROL_BIT == 0 {
            let stream_id = head.get_u32() & MAX_STREAM_ID;
            let flags = Flags::from_bits(head.get_u8());
            return Ok(Some(Frame::Data {
                stream_id,
                flags,
                data: body,
            }));
        }

        let version = head.get_u16() & 0x7fff;
        if version != SPDY_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let frame_type = head.get_u16();
        let flags = Flags::from_bits(head.get_u8());

        if let Some(frame) = decode_control(frame_type, flags, body)? {
            return Ok(Some(frame));
        }
        debug!(frame_type, payload_len, "skipping unknown control frame");
    }
}

fn decode_control(frame_type: u16, flags: Flags, mut body: Bytes) -> Result<Option<Frame>> {
    let frame = match frame_type {
        TYPE_SYN_STREAM => {
            need(&body, 10, "SYN_STREAM")?;
            let stream_id = body.get_u32() & MAX_STREAM_ID;
            let _associated = body.get_u32();
            let _priority = body.get_u16();
            Frame::SynStream {
                stream_id,
                flags,
                headers: read_header_block(&mut body, "SYN_STREAM")?,
            }
        }
        TYPE_SYN_REPLY => {
            need(&body, 6, "SYN_REPLY")?;
            let stream_id = body.get_u32() & MAX_STREAM_ID;
            let _unused = body.get_u16();
            Frame::SynReply {
                stream_id,
                flags,
                headers: read_header_block(&mut body, "SYN_REPLY")?,
            }
        }
        TYPE_HEADERS => {
            need(&body, 6, "HEADERS")?;
            let stream_id = body.get_u32() & MAX_STREAM_ID;
            let _unused = body.get_u16();
            Frame::Headers {
                stream_id,
                flags,
                headers: read_header_block(&mut body, "HEADERS")?,
            }
        }
        TYPE_RST_STREAM => {
            need(&body, 8, "RST_STREAM")?;
            Frame::RstStream {
                stream_id: body.get_u32() & MAX_STREAM_ID,
                status: ResetStatus::from_code(body.get_u32()),
            }
        }
        TYPE_SETTINGS => {
            need(&body, 4, "SETTINGS")?;
            let count = body.get_u32() as usize;
            if body.remaining() != count * 8 {
                return Err(FrameError::InvalidFrame {
                    kind: "SETTINGS",
                    reason: format!("{count} entries need {} bytes", count * 8),
                });
            }
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let flags = body.get_u8();
                let id = get_u24(&mut body);
                let value = body.get_u32();
                entries.push(Setting { id, flags, value });
            }
            Frame::Settings { flags, entries }
        }
        TYPE_NOOP => Frame::Noop,
        TYPE_PING => {
            need(&body, 4, "PING")?;
            Frame::Ping { id: body.get_u32() }
        }
        TYPE_GOAWAY => {
            need(&body, 4, "GOAWAY")?;
            Frame::GoAway {
                last_good_stream_id: body.get_u32() & MAX_STREAM_ID,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(frame))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default and ceiling: 16 MiB - 1.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

fn put_control_header(dst: &mut BytesMut, frame_type: u16, flags: Flags) {
    dst.reserve(HEADER_SIZE);
    dst.put_u16(0x8000 | SPDY_VERSION);
    dst.put_u16(frame_type);
    dst.put_u8(flags.bits());
    dst.put_slice(&[0, 0, 0]);
}

fn put_header_block(dst: &mut BytesMut, headers: &HeaderMap) -> Result<()> {
    let count = u16::try_from(headers.len()).map_err(|_| FrameError::InvalidFrame {
        kind: "header block",
        reason: format!("{} names exceed the 16-bit count", headers.len()),
    })?;
    dst.put_u16(count);
    for (name, values) in headers.iter() {
        put_string(dst, name)?;
        put_string(dst, &values.join(VALUE_SEPARATOR))?;
    }
    Ok(())
}

fn put_string(dst: &mut BytesMut, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| FrameError::InvalidFrame {
        kind: "header block",
        reason: format!("string of {} bytes exceeds the 16-bit length", value.len()),
    })?;
    dst.put_u16(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}

fn read_header_block(body: &mut Bytes, kind: &'static str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if !body.has_remaining() {
        return Ok(headers);
    }
    need(body, 2, kind)?;
    let count = body.get_u16();
    for _ in 0..count {
        let name = read_string(body, kind)?;
        if name.is_empty() {
            return Err(FrameError::InvalidFrame {
                kind,
                reason: "empty header name".to_string(),
            });
        }
        let values = read_string(body, kind)?
            .split(VALUE_SEPARATOR)
            .map(str::to_string)
            .collect();
        headers.insert_values(name.to_ascii_lowercase(), values);
    }
    if body.has_remaining() {
        return Err(FrameError::InvalidFrame {
            kind,
            reason: format!("{} trailing bytes after header block", body.remaining()),
        });
    }
    Ok(headers)
}

fn read_string(body: &mut Bytes, kind: &'static str) -> Result<String> {
    need(body, 2, kind)?;
    let len = body.get_u16() as usize;
    need(body, len, kind)?;
    let raw = body.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidFrame {
        kind,
        reason: "header text is not valid UTF-8".to_string(),
    })
}

fn need(body: &Bytes, len: usize, kind: &'static str) -> Result<()> {
    if body.remaining() < len {
        return Err(FrameError::InvalidFrame {
            kind,
            reason: format!("need {len} bytes, have {}", body.remaining()),
        });
    }
    Ok(())
}

fn check_stream_id(stream_id: u32) -> Result<()> {
    if stream_id > MAX_STREAM_ID {
        return Err(FrameError::InvalidStreamId(stream_id));
    }
    Ok(())
}

fn put_u24(dst: &mut BytesMut, value: usize) {
    dst.put_u8((value >> 16) as u8);
    dst.put_u8((value >> 8) as u8);
    dst.put_u8(value as u8);
}

fn get_u24(src: &mut Bytes) -> u32 {
    let hi = src.get_u8() as u32;
    let mid = src.get_u8() as u32;
    let lo = src.get_u8() as u32;
    (hi << 16) | (mid << 8) | lo
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        pairs.iter().copied().collect()
    }

    fn decode_one(buf: &mut BytesMut) -> Frame {
        decode_frame(buf, DEFAULT_MAX_PAYLOAD)
            .expect("decode should succeed")
            .expect("frame should be complete")
    }

    #[test]
    fn syn_stream_carries_headers_and_fin() {
        let frame = Frame::SynStream {
            stream_id: 1,
            flags: Flags::FIN,
            headers: headers(&[(":method", "GET"), (":path", "/")]),
        };
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();

        assert_eq!(buf[0], 0x80);
        assert_eq!(buf[1], SPDY_VERSION as u8);
        assert_eq!(decode_one(&mut buf), frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn data_frame_layout() {
        let frame = Frame::Data {
            stream_id: 5,
            flags: Flags::NONE,
            data: Bytes::from_static(b"body"),
        };
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();

        assert_eq!(&buf[..4], &[0, 0, 0, 5]);
        assert_eq!(&buf[5..8], &[0, 0, 4]);
        assert_eq!(buf.len(), HEADER_SIZE + 4);
        assert_eq!(decode_one(&mut buf), frame);
    }

    #[test]
    fn multi_valued_headers_survive() {
        let mut block = HeaderMap::new();
        block.append("accept", "text/plain");
        block.append("accept", "text/html");
        let frame = Frame::Headers {
            stream_id: 2,
            flags: Flags::NONE,
            headers: block,
        };
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();

        let decoded = decode_one(&mut buf);
        assert_eq!(
            decoded.headers().unwrap().get_all("accept"),
            ["text/plain", "text/html"]
        );
    }

    #[test]
    fn session_frames_decode() {
        let frames = vec![
            Frame::RstStream {
                stream_id: 7,
                status: ResetStatus::ProtocolError,
            },
            Frame::Settings {
                flags: Flags::NONE,
                entries: vec![Setting {
                    id: 4,
                    flags: 1,
                    value: 100,
                }],
            },
            Frame::Noop,
            Frame::Ping { id: 3 },
            Frame::GoAway {
                last_good_stream_id: 9,
            },
        ];
        let mut buf = BytesMut::new();
        for frame in &frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        for frame in &frames {
            assert_eq!(&decode_one(&mut buf), frame);
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_header_needs_more() {
        let mut buf = BytesMut::from(&[0x80, 0x02, 0x00][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn incomplete_payload_needs_more() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::Ping { id: 1 }, &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn wrong_version_rejected() {
        let mut buf = BytesMut::from(&[0x80, 0x03, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::UnsupportedVersion(3))));
    }

    #[test]
    fn payload_over_limit_rejected() {
        let mut buf = BytesMut::new();
        encode_frame(
            &Frame::Data {
                stream_id: 1,
                flags: Flags::NONE,
                data: Bytes::from(vec![0u8; 64]),
            },
            &mut buf,
        )
        .unwrap();

        let result = decode_frame(&mut buf, 16);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 64, max: 16 })
        ));
    }

    #[test]
    fn unknown_control_frame_skipped() {
        let mut buf = BytesMut::new();
        buf.put_u16(0x8000 | SPDY_VERSION);
        buf.put_u16(0x00ff);
        buf.put_u8(0);
        buf.put_slice(&[0, 0, 2]);
        buf.put_slice(b"zz");
        encode_frame(&Frame::Ping { id: 11 }, &mut buf).unwrap();

        assert_eq!(decode_one(&mut buf), Frame::Ping { id: 11 });
    }

    #[test]
    fn truncated_rst_body_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_u16(0x8000 | SPDY_VERSION);
        buf.put_u16(TYPE_RST_STREAM);
        buf.put_u8(0);
        buf.put_slice(&[0, 0, 4]);
        buf.put_u32(1);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(
            result,
            Err(FrameError::InvalidFrame {
                kind: "RST_STREAM",
                ..
            })
        ));
    }

    #[test]
    fn stream_id_beyond_31_bits_rejected() {
        let mut buf = BytesMut::new();
        let result = encode_frame(
            &Frame::Data {
                stream_id: MAX_STREAM_ID + 1,
                flags: Flags::NONE,
                data: Bytes::new(),
            },
            &mut buf,
        );
        assert!(matches!(result, Err(FrameError::InvalidStreamId(_))));
        assert!(buf.is_empty());
    }
}
