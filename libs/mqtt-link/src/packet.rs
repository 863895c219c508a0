//! MQTT 3.1.1 packet codec (the subset a client needs).
//!
//! [`decode`] works on a growing receive buffer: it returns `Ok(None)` until
//! a complete packet is available and reports how many bytes it consumed.

use bytes::{BufMut, BytesMut};

use crate::error::LinkError;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// Largest value the 4-byte remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

mod kind {
    pub const CONNECT: u8 = 1;
    pub const CONNACK: u8 = 2;
    pub const PUBLISH: u8 = 3;
    pub const PUBACK: u8 = 4;
    pub const SUBSCRIBE: u8 = 8;
    pub const SUBACK: u8 = 9;
    pub const PINGREQ: u8 = 12;
    pub const PINGRESP: u8 = 13;
    pub const DISCONNECT: u8 = 14;
}

/// SUBACK return code for a rejected subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
    pub dup: bool,
    /// Present iff `qos > 0`.
    pub packet_id: Option<u16>,
}

impl Publish {
    /// Fire-and-forget publish.
    pub fn qos0(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            qos: 0,
            retain: false,
            dup: false,
            packet_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck { session_present: bool, code: u8 },
    Publish(Publish),
    PubAck { packet_id: u16 },
    Subscribe { packet_id: u16, topics: Vec<(String, u8)> },
    SubAck { packet_id: u16, return_codes: Vec<u8> },
    PingReq,
    PingResp,
    Disconnect,
}

// ═══════════════════════════════════════════════════════════════
//  Encoding
// ═══════════════════════════════════════════════════════════════

/// Append the wire form of `packet` to `out`.
///
/// Only client → broker packets (plus PUBACK) are encodable.
pub fn encode(packet: &Packet, out: &mut BytesMut) -> Result<(), LinkError> {
    let mut body = BytesMut::new();
    let header = match packet {
        Packet::Connect(c) => {
            put_str(&mut body, PROTOCOL_NAME)?;
            body.put_u8(PROTOCOL_LEVEL);
            let mut flags = 0u8;
            if c.username.is_some() {
                flags |= 0x80;
            }
            if c.password.is_some() {
                flags |= 0x40;
            }
            if c.clean_session {
                flags |= 0x02;
            }
            body.put_u8(flags);
            body.put_u16(c.keep_alive);
            put_str(&mut body, &c.client_id)?;
            if let Some(username) = &c.username {
                put_str(&mut body, username)?;
            }
            if let Some(password) = &c.password {
                put_bytes(&mut body, password.as_bytes())?;
            }
            kind::CONNECT << 4
        }
        Packet::Publish(p) => {
            if p.qos > 2 {
                return Err(LinkError::Malformed(format!("invalid QoS {}", p.qos)));
            }
            put_str(&mut body, &p.topic)?;
            match (p.qos, p.packet_id) {
                (0, _) => {}
                (_, Some(id)) => body.put_u16(id),
                (_, None) => {
                    return Err(LinkError::Malformed("QoS > 0 publish needs a packet id".into()));
                }
            }
            body.put_slice(&p.payload);
            (kind::PUBLISH << 4) | (u8::from(p.dup) << 3) | (p.qos << 1) | u8::from(p.retain)
        }
        Packet::PubAck { packet_id } => {
            body.put_u16(*packet_id);
            kind::PUBACK << 4
        }
        Packet::Subscribe { packet_id, topics } => {
            body.put_u16(*packet_id);
            for (topic, qos) in topics {
                put_str(&mut body, topic)?;
                body.put_u8(*qos);
            }
            // Reserved flag bits of SUBSCRIBE must be 0010.
            (kind::SUBSCRIBE << 4) | 0x02
        }
        Packet::PingReq => kind::PINGREQ << 4,
        Packet::Disconnect => kind::DISCONNECT << 4,
        Packet::ConnAck { .. } | Packet::SubAck { .. } | Packet::PingResp => {
            return Err(LinkError::Malformed(
                "broker-side packet cannot be encoded by the client".into(),
            ));
        }
    };

    out.put_u8(header);
    put_remaining_length(out, body.len())?;
    out.put_slice(&body);
    Ok(())
}

fn put_remaining_length(out: &mut BytesMut, mut len: usize) -> Result<(), LinkError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(LinkError::PacketTooLarge(len));
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.put_u8(byte);
        if len == 0 {
            return Ok(());
        }
    }
}

fn put_str(out: &mut BytesMut, s: &str) -> Result<(), LinkError> {
    put_bytes(out, s.as_bytes())
}

fn put_bytes(out: &mut BytesMut, bytes: &[u8]) -> Result<(), LinkError> {
    let len = u16::try_from(bytes.len()).map_err(|_| LinkError::StringTooLong(bytes.len()))?;
    out.put_u16(len);
    out.put_slice(bytes);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
//  Decoding
// ═══════════════════════════════════════════════════════════════

/// Decode the first packet in `buf`.
///
/// `Ok(None)` means more bytes are needed; `Ok(Some((packet, n)))` means
/// the packet occupied the first `n` bytes.
pub fn decode(buf: &[u8]) -> Result<Option<(Packet, usize)>, LinkError> {
    let Some(&header) = buf.first() else {
        return Ok(None);
    };
    let Some((remaining, len_bytes)) = remaining_length(&buf[1..])? else {
        return Ok(None);
    };
    let total = 1 + len_bytes + remaining;
    if buf.len() < total {
        return Ok(None);
    }

    let body = &buf[1 + len_bytes..total];
    let packet = decode_body(header, body)?;
    Ok(Some((packet, total)))
}

/// `Ok(None)` while the length field is still incomplete.
fn remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, LinkError> {
    let mut value = 0usize;
    for (i, &byte) in buf.iter().take(4).enumerate() {
        value += ((byte & 0x7f) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= 4 {
        return Err(LinkError::Malformed("remaining length exceeds 4 bytes".into()));
    }
    Ok(None)
}

fn decode_body(header: u8, body: &[u8]) -> Result<Packet, LinkError> {
    let flags = header & 0x0f;
    let mut r = Reader::new(body);
    let packet = match header >> 4 {
        kind::CONNACK => {
            let ack_flags = r.u8()?;
            let code = r.u8()?;
            Packet::ConnAck {
                session_present: ack_flags & 0x01 != 0,
                code,
            }
        }
        kind::PUBLISH => {
            let qos = (flags >> 1) & 0x03;
            if qos > 2 {
                return Err(LinkError::Malformed("publish with QoS 3".into()));
            }
            let topic = r.string()?;
            let packet_id = if qos > 0 { Some(r.u16()?) } else { None };
            Packet::Publish(Publish {
                topic,
                payload: r.rest().to_vec(),
                qos,
                retain: flags & 0x01 != 0,
                dup: flags & 0x08 != 0,
                packet_id,
            })
        }
        kind::PUBACK => Packet::PubAck { packet_id: r.u16()? },
        kind::SUBACK => {
            let packet_id = r.u16()?;
            Packet::SubAck {
                packet_id,
                return_codes: r.rest().to_vec(),
            }
        }
        kind::PINGRESP => Packet::PingResp,
        kind::PINGREQ => Packet::PingReq,
        kind::DISCONNECT => Packet::Disconnect,
        other => return Err(LinkError::UnexpectedPacket(other)),
    };
    Ok(packet)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LinkError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(LinkError::Malformed(format!(
                "need {n} bytes at offset {}, packet has {}",
                self.pos,
                self.buf.len()
            )));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, LinkError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, LinkError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn string(&mut self) -> Result<String, LinkError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LinkError::Malformed(format!("topic is not UTF-8: {e}")))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}
