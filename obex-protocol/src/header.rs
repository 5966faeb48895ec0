//! Typed header container and its tag-length-value wire format.
//!
//! Each header is identified by a one-byte id whose top two bits select
//! the value encoding:
//!
//! ```text
//! +------+-------------------+----------------------------------------+
//! | bits | encoding          | wire layout                            |
//! +------+-------------------+----------------------------------------+
//! | 00   | unicode text      | id | len (2) | UTF-16BE + 0x00 0x00   |
//! | 01   | byte sequence     | id | len (2) | bytes                  |
//! | 10   | 1-byte integer    | id | value (1)                          |
//! | 11   | 4-byte integer    | id | value (4, big-endian)              |
//! +------+-------------------+----------------------------------------+
//! ```
//!
//! The two-byte length of variable-length headers includes the three
//! bytes of id and length.

use crate::auth::{self, AuthChallengeOptions};
use crate::error::ProtocolError;
use crate::time::HeaderTime;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use uuid::Uuid;

/// Standard header ids.
pub mod header_id {
    pub const COUNT: u8 = 0xC0;
    pub const NAME: u8 = 0x01;
    pub const TYPE: u8 = 0x42;
    pub const LENGTH: u8 = 0xC3;
    pub const TIME: u8 = 0x44;
    pub const DESCRIPTION: u8 = 0x05;
    pub const TARGET: u8 = 0x46;
    pub const HTTP: u8 = 0x47;
    pub const BODY: u8 = 0x48;
    pub const END_OF_BODY: u8 = 0x49;
    pub const WHO: u8 = 0x4A;
    pub const CONNECTION_ID: u8 = 0xCB;
    pub const APP_PARAMETERS: u8 = 0x4C;
    pub const AUTH_CHALLENGE: u8 = 0x4D;
    pub const AUTH_RESPONSE: u8 = 0x4E;
    pub const CREATOR_ID: u8 = 0xCF;
    pub const WAN_UUID: u8 = 0x50;
    pub const OBJECT_CLASS: u8 = 0x51;
    pub const SESSION_PARAMETERS: u8 = 0x52;
    pub const SESSION_SEQUENCE_NUMBER: u8 = 0x93;
}

/// Type value that triggers the legacy application-id companion header.
const VCALENDAR_TYPE: &str = "text/x-vCalendar";

/// Application id sent alongside vCalendar objects ("date").
const VCALENDAR_APP_ID: u32 = 0x6461_7465;

/// Value encoding selected by the top two bits of a header id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderEncoding {
    Unicode,
    ByteSequence,
    Byte,
    FourByte,
}

impl HeaderEncoding {
    pub const MASK: u8 = 0xC0;

    /// Returns the encoding implied by a header id.
    pub fn of(id: u8) -> Self {
        match id & Self::MASK {
            0x00 => HeaderEncoding::Unicode,
            0x40 => HeaderEncoding::ByteSequence,
            0x80 => HeaderEncoding::Byte,
            _ => HeaderEncoding::FourByte,
        }
    }
}

impl fmt::Display for HeaderEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeaderEncoding::Unicode => "unicode",
            HeaderEncoding::ByteSequence => "byte sequence",
            HeaderEncoding::Byte => "1-byte",
            HeaderEncoding::FourByte => "4-byte",
        };
        f.write_str(name)
    }
}

/// A header value. The variant must match the encoding of the id it is
/// stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Unicode(String),
    Bytes(Bytes),
    Byte(u8),
    FourByte(u32),
}

impl HeaderValue {
    pub fn encoding(&self) -> HeaderEncoding {
        match self {
            HeaderValue::Unicode(_) => HeaderEncoding::Unicode,
            HeaderValue::Bytes(_) => HeaderEncoding::ByteSequence,
            HeaderValue::Byte(_) => HeaderEncoding::Byte,
            HeaderValue::FourByte(_) => HeaderEncoding::FourByte,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Unicode(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            HeaderValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        match self {
            HeaderValue::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            HeaderValue::FourByte(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Unicode(s) => f.write_str(s),
            HeaderValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            HeaderValue::Byte(v) => write!(f, "{}", v),
            HeaderValue::FourByte(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Unicode(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Unicode(s)
    }
}

impl From<Bytes> for HeaderValue {
    fn from(b: Bytes) -> Self {
        HeaderValue::Bytes(b)
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(v: Vec<u8>) -> Self {
        HeaderValue::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for HeaderValue {
    fn from(v: &[u8]) -> Self {
        HeaderValue::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<u8> for HeaderValue {
    fn from(v: u8) -> Self {
        HeaderValue::Byte(v)
    }
}

impl From<u32> for HeaderValue {
    fn from(v: u32) -> Self {
        HeaderValue::FourByte(v)
    }
}

/// A header as it travels inside a packet: an id and the raw value bytes
/// (integers in network order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    pub id: u8,
    pub data: Bytes,
}

impl RawHeader {
    pub fn new(id: u8, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    pub fn byte(id: u8, value: u8) -> Self {
        Self::new(id, Bytes::copy_from_slice(&[value]))
    }

    pub fn four_byte(id: u8, value: u32) -> Self {
        Self::new(id, Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    /// Whether this header carries object body data.
    pub fn is_body(&self) -> bool {
        self.id == header_id::BODY || self.id == header_id::END_OF_BODY
    }

    /// Number of bytes this header occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match HeaderEncoding::of(self.id) {
            HeaderEncoding::Unicode | HeaderEncoding::ByteSequence => 3 + self.data.len(),
            HeaderEncoding::Byte => 2,
            HeaderEncoding::FourByte => 5,
        }
    }

    /// Appends the wire form of this header to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        match HeaderEncoding::of(self.id) {
            HeaderEncoding::Unicode | HeaderEncoding::ByteSequence => {
                let total = 3 + self.data.len();
                if total > u16::MAX as usize {
                    return Err(ProtocolError::HeaderTooLarge {
                        id: self.id,
                        size: self.data.len(),
                    });
                }
                buf.put_u8(self.id);
                buf.put_u16(total as u16);
                buf.put_slice(&self.data);
            }
            HeaderEncoding::Byte => {
                if self.data.len() != 1 {
                    return Err(ProtocolError::HeaderTypeMismatch {
                        id: self.id,
                        expected: HeaderEncoding::Byte,
                    });
                }
                buf.put_u8(self.id);
                buf.put_u8(self.data[0]);
            }
            HeaderEncoding::FourByte => {
                if self.data.len() != 4 {
                    return Err(ProtocolError::HeaderTypeMismatch {
                        id: self.id,
                        expected: HeaderEncoding::FourByte,
                    });
                }
                buf.put_u8(self.id);
                buf.put_slice(&self.data);
            }
        }
        Ok(())
    }

    /// Splits a block of packet header data into individual headers.
    pub fn decode_all(mut buf: &[u8]) -> Result<Vec<RawHeader>, ProtocolError> {
        let mut headers = Vec::new();
        while !buf.is_empty() {
            let id = buf[0];
            let (data, consumed) = match HeaderEncoding::of(id) {
                HeaderEncoding::Unicode | HeaderEncoding::ByteSequence => {
                    if buf.len() < 3 {
                        return Err(ProtocolError::TruncatedHeader { id });
                    }
                    let length = u16::from_be_bytes([buf[1], buf[2]]);
                    if length < 3 {
                        return Err(ProtocolError::InvalidHeaderLength { id, length });
                    }
                    let length = length as usize;
                    if buf.len() < length {
                        return Err(ProtocolError::TruncatedHeader { id });
                    }
                    (&buf[3..length], length)
                }
                HeaderEncoding::Byte => {
                    if buf.len() < 2 {
                        return Err(ProtocolError::TruncatedHeader { id });
                    }
                    (&buf[1..2], 2)
                }
                HeaderEncoding::FourByte => {
                    if buf.len() < 5 {
                        return Err(ProtocolError::TruncatedHeader { id });
                    }
                    (&buf[1..5], 5)
                }
            };
            headers.push(RawHeader::new(id, Bytes::copy_from_slice(data)));
            buf = &buf[consumed..];
        }
        Ok(headers)
    }
}

/// Converts a string to OBEX unicode: UTF-16 in network order followed by
/// two NUL bytes. An empty string produces no bytes at all.
pub fn unicode_bytes_from_string(s: &str) -> Vec<u8> {
    if s.is_empty() {
        return Vec::new();
    }
    let mut bytes = Vec::with_capacity(s.len() * 2 + 2);
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

/// Decodes OBEX unicode bytes. At most one trailing double-NUL is
/// stripped. Returns `None` for fewer than two bytes of input.
pub fn string_from_unicode_bytes(data: &[u8]) -> Option<String> {
    if data.len() < 2 {
        return None;
    }
    let mut units = data.len() / 2;
    if data[data.len() - 1] == 0 && data[data.len() - 2] == 0 {
        units -= 1;
    }
    let utf16: Vec<u16> = data
        .chunks_exact(2)
        .take(units)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    Some(String::from_utf16_lossy(&utf16))
}

/// Returns a readable name for a header id.
pub fn header_id_to_string(id: u8) -> String {
    let name = match id {
        header_id::COUNT => "Count",
        header_id::NAME => "Name",
        header_id::TYPE => "Type",
        header_id::LENGTH => "Length",
        header_id::TIME => "Time",
        header_id::DESCRIPTION => "Description",
        header_id::TARGET => "Target",
        header_id::HTTP => "Http",
        header_id::WHO => "Who",
        header_id::CONNECTION_ID => "Connection Id",
        header_id::APP_PARAMETERS => "App Parameters",
        header_id::AUTH_CHALLENGE => "Auth Challenge",
        header_id::AUTH_RESPONSE => "Auth Response",
        header_id::CREATOR_ID => "Creator Id",
        header_id::WAN_UUID => "WAN UUID",
        header_id::OBJECT_CLASS => "Object Class",
        header_id::SESSION_PARAMETERS => "Session Parameters",
        header_id::SESSION_SEQUENCE_NUMBER => "Session Sequence Number",
        other => return format!("<Unknown Header {:#04x}>", other),
    };
    name.to_string()
}

/// An ordered set of headers for one request or response.
///
/// At most one value is stored per id (the last set wins) and distinct
/// ids keep their insertion order. Equality compares values only, not
/// ordering.
#[derive(Debug, Clone, Default)]
pub struct HeaderSet {
    entries: Vec<(u8, HeaderValue)>,
    /// Nonce of the challenge created by `set_authentication_challenge`.
    challenge_nonce: Bytes,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value for `id`. Fails without modifying the set if the
    /// value's type does not match the encoding implied by `id`.
    pub fn set(&mut self, id: u8, value: impl Into<HeaderValue>) -> Result<(), ProtocolError> {
        let value = value.into();
        let expected = HeaderEncoding::of(id);
        if value.encoding() != expected {
            return Err(ProtocolError::HeaderTypeMismatch { id, expected });
        }
        self.insert(id, value);
        Ok(())
    }

    fn insert(&mut self, id: u8, value: HeaderValue) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((id, value)),
        }
    }

    pub fn get(&self, id: u8) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, value)| value)
    }

    /// Removes the value for `id`, returning whether one was present.
    /// Removing the Auth-Challenge also forgets its nonce.
    pub fn remove(&mut self, id: u8) -> bool {
        let Some(index) = self.entries.iter().position(|(existing, _)| *existing == id) else {
            return false;
        };
        if id == header_id::AUTH_CHALLENGE {
            self.challenge_nonce = Bytes::new();
        }
        self.entries.remove(index);
        true
    }

    pub fn contains(&self, id: u8) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.challenge_nonce = Bytes::new();
    }

    /// Header ids in insertion order.
    pub fn ids(&self) -> Vec<u8> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &HeaderValue)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }

    /// Nonce of the Auth-Challenge created on this set, or empty.
    pub fn challenge_nonce(&self) -> &Bytes {
        &self.challenge_nonce
    }

    // =========================================================================
    // Typed accessors
    // =========================================================================

    fn unicode(&self, id: u8) -> Option<&str> {
        self.get(id).and_then(HeaderValue::as_str)
    }

    fn bytes(&self, id: u8) -> Option<&Bytes> {
        self.get(id).and_then(HeaderValue::as_bytes)
    }

    fn four_byte(&self, id: u8) -> Option<u32> {
        self.get(id).and_then(HeaderValue::as_u32)
    }

    pub fn set_count(&mut self, count: u32) {
        self.insert(header_id::COUNT, HeaderValue::FourByte(count));
    }

    pub fn count(&self) -> Option<u32> {
        self.four_byte(header_id::COUNT)
    }

    pub fn set_name(&mut self, name: &str) {
        self.insert(header_id::NAME, HeaderValue::Unicode(name.to_string()));
    }

    pub fn name(&self) -> Option<&str> {
        self.unicode(header_id::NAME)
    }

    /// Sets the MIME type of the object (the Type header).
    pub fn set_mime_type(&mut self, mime: &str) {
        self.insert(
            header_id::TYPE,
            HeaderValue::Bytes(Bytes::copy_from_slice(mime.as_bytes())),
        );
    }

    pub fn mime_type(&self) -> Option<String> {
        self.bytes(header_id::TYPE)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn set_length(&mut self, length: u32) {
        self.insert(header_id::LENGTH, HeaderValue::FourByte(length));
    }

    pub fn length(&self) -> Option<u32> {
        self.four_byte(header_id::LENGTH)
    }

    /// Sets the Time header. Invalid times are ignored.
    pub fn set_time(&mut self, time: HeaderTime) {
        if !time.is_valid() {
            return;
        }
        self.insert(
            header_id::TIME,
            HeaderValue::Bytes(Bytes::from(time.format().into_bytes())),
        );
    }

    /// Returns the Time header, or [`HeaderTime::Invalid`] if it is absent
    /// or malformed.
    pub fn time(&self) -> HeaderTime {
        match self.bytes(header_id::TIME) {
            Some(b) => HeaderTime::parse(&String::from_utf8_lossy(b)),
            None => HeaderTime::Invalid,
        }
    }

    pub fn set_description(&mut self, description: &str) {
        self.insert(
            header_id::DESCRIPTION,
            HeaderValue::Unicode(description.to_string()),
        );
    }

    pub fn description(&self) -> Option<&str> {
        self.unicode(header_id::DESCRIPTION)
    }

    pub fn set_target(&mut self, target: impl Into<Bytes>) {
        self.insert(header_id::TARGET, HeaderValue::Bytes(target.into()));
    }

    pub fn target(&self) -> Option<&Bytes> {
        self.bytes(header_id::TARGET)
    }

    pub fn set_http(&mut self, http: impl Into<Bytes>) {
        self.insert(header_id::HTTP, HeaderValue::Bytes(http.into()));
    }

    pub fn http(&self) -> Option<&Bytes> {
        self.bytes(header_id::HTTP)
    }

    pub fn set_who(&mut self, who: impl Into<Bytes>) {
        self.insert(header_id::WHO, HeaderValue::Bytes(who.into()));
    }

    pub fn who(&self) -> Option<&Bytes> {
        self.bytes(header_id::WHO)
    }

    pub fn set_connection_id(&mut self, id: u32) {
        self.insert(header_id::CONNECTION_ID, HeaderValue::FourByte(id));
    }

    pub fn connection_id(&self) -> Option<u32> {
        self.four_byte(header_id::CONNECTION_ID)
    }

    pub fn set_app_parameters(&mut self, params: impl Into<Bytes>) {
        self.insert(header_id::APP_PARAMETERS, HeaderValue::Bytes(params.into()));
    }

    pub fn app_parameters(&self) -> Option<&Bytes> {
        self.bytes(header_id::APP_PARAMETERS)
    }

    pub fn set_creator_id(&mut self, id: u32) {
        self.insert(header_id::CREATOR_ID, HeaderValue::FourByte(id));
    }

    pub fn creator_id(&self) -> Option<u32> {
        self.four_byte(header_id::CREATOR_ID)
    }

    pub fn set_wan_uuid(&mut self, uuid: Uuid) {
        self.insert(
            header_id::WAN_UUID,
            HeaderValue::Bytes(Bytes::copy_from_slice(uuid.as_bytes())),
        );
    }

    /// Returns the WAN UUID, or `None` if absent or not 16 bytes long.
    pub fn wan_uuid(&self) -> Option<Uuid> {
        self.bytes(header_id::WAN_UUID)
            .and_then(|b| Uuid::from_slice(b).ok())
    }

    pub fn set_object_class(&mut self, class: impl Into<Bytes>) {
        self.insert(header_id::OBJECT_CLASS, HeaderValue::Bytes(class.into()));
    }

    pub fn object_class(&self) -> Option<&Bytes> {
        self.bytes(header_id::OBJECT_CLASS)
    }

    pub fn set_session_parameters(&mut self, params: impl Into<Bytes>) {
        self.insert(
            header_id::SESSION_PARAMETERS,
            HeaderValue::Bytes(params.into()),
        );
    }

    pub fn session_parameters(&self) -> Option<&Bytes> {
        self.bytes(header_id::SESSION_PARAMETERS)
    }

    pub fn set_session_sequence_number(&mut self, number: u8) {
        self.insert(
            header_id::SESSION_SEQUENCE_NUMBER,
            HeaderValue::Byte(number),
        );
    }

    pub fn session_sequence_number(&self) -> Option<u8> {
        self.get(header_id::SESSION_SEQUENCE_NUMBER)
            .and_then(HeaderValue::as_u8)
    }

    /// Generates a fresh nonce and stores an Auth-Challenge built from it,
    /// `options` and `realm`. The nonce is kept so the eventual response
    /// can be verified.
    pub fn set_authentication_challenge(
        &mut self,
        options: AuthChallengeOptions,
        realm: &str,
    ) -> Result<(), ProtocolError> {
        let nonce = auth::generate_nonce();
        let challenge = auth::write_challenge(&nonce, options, realm)?;
        self.insert(header_id::AUTH_CHALLENGE, HeaderValue::Bytes(challenge));
        self.challenge_nonce = nonce;
        Ok(())
    }

    // =========================================================================
    // Wire marshalling
    // =========================================================================

    /// Serializes the set into raw headers ready to be packed.
    ///
    /// Connection-Id (when there is no Target) and Target go first; every
    /// other header follows in insertion order. Any failure aborts the
    /// whole write.
    pub fn write_headers(&self) -> Result<Vec<RawHeader>, ProtocolError> {
        let mut out = Vec::with_capacity(self.entries.len() + 1);
        let has_target = self.contains(header_id::TARGET);

        if !has_target {
            if let Some(id) = self.connection_id() {
                out.push(RawHeader::four_byte(header_id::CONNECTION_ID, id));
            }
        }
        if let Some(target) = self.target() {
            out.push(RawHeader::new(header_id::TARGET, target.clone()));
        }

        for (id, value) in &self.entries {
            let id = *id;
            if id == header_id::TARGET || (id == header_id::CONNECTION_ID && !has_target) {
                continue;
            }
            match value {
                HeaderValue::Unicode(s) => {
                    out.push(RawHeader::new(id, unicode_bytes_from_string(s)));
                }
                HeaderValue::Bytes(b) if id == header_id::TYPE => {
                    let mut data = Vec::with_capacity(b.len() + 1);
                    data.extend_from_slice(b);
                    data.push(0);
                    out.push(RawHeader::new(id, data));

                    if !b.is_empty()
                        && !self.contains(header_id::CREATOR_ID)
                        && String::from_utf8_lossy(b).eq_ignore_ascii_case(VCALENDAR_TYPE)
                    {
                        out.push(RawHeader::four_byte(
                            header_id::CREATOR_ID,
                            VCALENDAR_APP_ID,
                        ));
                    }
                }
                HeaderValue::Bytes(b) => out.push(RawHeader::new(id, b.clone())),
                HeaderValue::Byte(v) => out.push(RawHeader::byte(id, *v)),
                HeaderValue::FourByte(v) => out.push(RawHeader::four_byte(id, *v)),
            }
        }

        for header in &out {
            if header.encoded_len() > u16::MAX as usize {
                return Err(ProtocolError::HeaderTooLarge {
                    id: header.id,
                    size: header.data.len(),
                });
            }
        }
        Ok(out)
    }

    /// Builds a set from raw headers received in a packet. Body headers
    /// are skipped.
    pub fn read_headers(raw: &[RawHeader]) -> Result<Self, ProtocolError> {
        let mut set = HeaderSet::new();
        for header in raw {
            if header.is_body() {
                continue;
            }
            let id = header.id;
            let data = &header.data;

            // Type is a NUL-terminated byte string.
            if id == header_id::TYPE {
                let trimmed = match data.last() {
                    Some(0) => data.slice(..data.len() - 1),
                    _ => data.clone(),
                };
                set.insert(id, HeaderValue::Bytes(trimmed));
                continue;
            }

            let value = match HeaderEncoding::of(id) {
                HeaderEncoding::Unicode => {
                    HeaderValue::Unicode(string_from_unicode_bytes(data).unwrap_or_default())
                }
                HeaderEncoding::ByteSequence => HeaderValue::Bytes(data.clone()),
                HeaderEncoding::Byte => match data.first() {
                    Some(v) if data.len() == 1 => HeaderValue::Byte(*v),
                    _ => return Err(ProtocolError::TruncatedHeader { id }),
                },
                HeaderEncoding::FourByte => match <[u8; 4]>::try_from(&data[..]) {
                    Ok(raw) => HeaderValue::FourByte(u32::from_be_bytes(raw)),
                    Err(_) => return Err(ProtocolError::TruncatedHeader { id }),
                },
            };
            set.insert(id, value);
        }
        Ok(set)
    }
}

impl PartialEq for HeaderSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(id, value)| other.get(*id) == Some(value))
    }
}

impl Eq for HeaderSet {}

impl fmt::Display for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HeaderSet({")?;
        for (i, (id, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", header_id_to_string(*id), value)?;
        }
        f.write_str("})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(set: &HeaderSet) -> HeaderSet {
        let raw = set.write_headers().unwrap();
        let mut buf = BytesMut::new();
        for header in &raw {
            header.encode(&mut buf).unwrap();
        }
        let decoded = RawHeader::decode_all(&buf).unwrap();
        HeaderSet::read_headers(&decoded).unwrap()
    }

    #[test]
    fn test_set_rejects_type_mismatch() {
        let mut set = HeaderSet::new();
        set.set_name("kept");

        let result = set.set(header_id::NAME, 5u32);
        assert!(matches!(
            result,
            Err(ProtocolError::HeaderTypeMismatch { id: 0x01, .. })
        ));
        assert_eq!(set.name(), Some("kept"));
        assert_eq!(set.len(), 1);

        assert!(set.set(header_id::LENGTH, "text").is_err());
        assert!(set.set(header_id::SESSION_SEQUENCE_NUMBER, 7u32).is_err());
        assert!(!set.contains(header_id::LENGTH));
    }

    #[test]
    fn test_last_set_wins_and_order_preserved() {
        let mut set = HeaderSet::new();
        set.set_name("a");
        set.set_length(10);
        set.set_description("desc");
        set.set_name("b");

        assert_eq!(set.name(), Some("b"));
        assert_eq!(
            set.ids(),
            vec![header_id::NAME, header_id::LENGTH, header_id::DESCRIPTION]
        );
    }

    #[test]
    fn test_remove_and_clear() {
        let mut set = HeaderSet::new();
        set.set_count(3);
        assert!(set.remove(header_id::COUNT));
        assert!(!set.remove(header_id::COUNT));
        assert!(set.is_empty());

        set.set_name("x");
        set.clear();
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_removing_challenge_clears_nonce() {
        let mut set = HeaderSet::new();
        set.set_authentication_challenge(AuthChallengeOptions::new(), "realm")
            .unwrap();
        assert_eq!(set.challenge_nonce().len(), auth::NONCE_SIZE);

        assert!(set.remove(header_id::AUTH_CHALLENGE));
        assert!(set.challenge_nonce().is_empty());
    }

    #[test]
    fn test_connection_id_and_target_first() {
        let mut set = HeaderSet::new();
        set.set_name("file.txt");
        set.set_length(42);
        set.set_connection_id(7);

        let ids: Vec<u8> = set.write_headers().unwrap().iter().map(|h| h.id).collect();
        assert_eq!(
            ids,
            vec![header_id::CONNECTION_ID, header_id::NAME, header_id::LENGTH]
        );

        let mut set = HeaderSet::new();
        set.set_name("file.txt");
        set.set_target(Bytes::from_static(b"F9EC7BC4"));
        let ids: Vec<u8> = set.write_headers().unwrap().iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![header_id::TARGET, header_id::NAME]);
    }

    #[test]
    fn test_connection_id_not_hoisted_with_target() {
        let mut set = HeaderSet::new();
        set.set_name("n");
        set.set_connection_id(1);
        set.set_target(Bytes::from_static(b"t"));

        let ids: Vec<u8> = set.write_headers().unwrap().iter().map(|h| h.id).collect();
        assert_eq!(
            ids,
            vec![header_id::TARGET, header_id::NAME, header_id::CONNECTION_ID]
        );
    }

    #[test]
    fn test_type_is_nul_terminated() {
        let mut set = HeaderSet::new();
        set.set_mime_type("text/x-vCard");
        let raw = set.write_headers().unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(&raw[0].data[..], b"text/x-vCard\0");

        assert_eq!(roundtrip(&set).mime_type().as_deref(), Some("text/x-vCard"));
    }

    #[test]
    fn test_vcalendar_adds_application_id() {
        let mut set = HeaderSet::new();
        set.set_mime_type("TEXT/X-VCALENDAR");
        let raw = set.write_headers().unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[1].id, header_id::CREATOR_ID);
        assert_eq!(&raw[1].data[..], &0x6461_7465u32.to_be_bytes());
    }

    #[test]
    fn test_vcalendar_keeps_caller_creator_id() {
        let mut set = HeaderSet::new();
        set.set_mime_type("text/x-vCalendar");
        set.set_creator_id(0x1234_5678);
        let raw = set.write_headers().unwrap();
        let creators: Vec<&RawHeader> = raw
            .iter()
            .filter(|h| h.id == header_id::CREATOR_ID)
            .collect();
        assert_eq!(creators.len(), 1);
        assert_eq!(&creators[0].data[..], &0x1234_5678u32.to_be_bytes());
    }

    #[test]
    fn test_read_type_variants() {
        let raw = vec![RawHeader::new(header_id::TYPE, Bytes::new())];
        let set = HeaderSet::read_headers(&raw).unwrap();
        assert_eq!(set.mime_type().as_deref(), Some(""));

        let raw = vec![RawHeader::new(header_id::TYPE, Bytes::from_static(b"text/plain"))];
        let set = HeaderSet::read_headers(&raw).unwrap();
        assert_eq!(set.mime_type().as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_unicode_marshalling() {
        assert!(unicode_bytes_from_string("").is_empty());
        assert_eq!(
            unicode_bytes_from_string("ab"),
            vec![0x00, b'a', 0x00, b'b', 0x00, 0x00]
        );

        assert_eq!(string_from_unicode_bytes(&[0x00]), None);
        assert_eq!(string_from_unicode_bytes(&[0x00, 0x00]).as_deref(), Some(""));
        // No terminator is tolerated
        assert_eq!(
            string_from_unicode_bytes(&[0x00, b'h', 0x00, b'i']).as_deref(),
            Some("hi")
        );
        // Only one terminator pair is stripped
        assert_eq!(
            string_from_unicode_bytes(&[0x00, b'x', 0x00, 0x00, 0x00, 0x00]).as_deref(),
            Some("x\0")
        );
    }

    #[test]
    fn test_empty_values_stay_present() {
        let mut set = HeaderSet::new();
        set.set_name("");
        set.set_who(Bytes::new());

        let decoded = roundtrip(&set);
        assert_eq!(decoded.name(), Some(""));
        assert_eq!(decoded.who().map(|b| b.len()), Some(0));
    }

    #[test]
    fn test_time_accessor() {
        let mut set = HeaderSet::new();
        set.set_time(HeaderTime::Invalid);
        assert!(!set.contains(header_id::TIME));

        let time = HeaderTime::parse("20080101T000102Z");
        set.set_time(time);
        assert_eq!(roundtrip(&set).time(), time);

        let raw = vec![RawHeader::new(header_id::TIME, Bytes::from_static(b"junk"))];
        let set = HeaderSet::read_headers(&raw).unwrap();
        assert!(set.contains(header_id::TIME));
        assert_eq!(set.time(), HeaderTime::Invalid);
    }

    #[test]
    fn test_wan_uuid() {
        let uuid = Uuid::new_v4();
        let mut set = HeaderSet::new();
        set.set_wan_uuid(uuid);
        assert_eq!(roundtrip(&set).wan_uuid(), Some(uuid));

        let mut set = HeaderSet::new();
        set.set(header_id::WAN_UUID, Bytes::from_static(b"short")).unwrap();
        assert_eq!(set.wan_uuid(), None);
    }

    #[test]
    fn test_decode_truncated() {
        let result = RawHeader::decode_all(&[header_id::NAME, 0x00]);
        assert!(matches!(result, Err(ProtocolError::TruncatedHeader { .. })));

        let result = RawHeader::decode_all(&[header_id::NAME, 0x00, 0x09, 0x00]);
        assert!(matches!(result, Err(ProtocolError::TruncatedHeader { .. })));

        let result = RawHeader::decode_all(&[header_id::LENGTH, 0x00, 0x01]);
        assert!(matches!(result, Err(ProtocolError::TruncatedHeader { .. })));

        let result = RawHeader::decode_all(&[header_id::WHO, 0x00, 0x02]);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidHeaderLength { length: 2, .. })
        ));
    }

    #[test]
    fn test_equality_ignores_order() {
        let mut a = HeaderSet::new();
        a.set_name("n");
        a.set_length(1);
        let mut b = HeaderSet::new();
        b.set_length(1);
        b.set_name("n");
        assert_eq!(a, b);

        b.set_length(2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_header_names() {
        assert_eq!(header_id_to_string(header_id::NAME), "Name");
        assert_eq!(header_id_to_string(header_id::WAN_UUID), "WAN UUID");
        assert_eq!(header_id_to_string(0x30), "<Unknown Header 0x30>");

        let mut set = HeaderSet::new();
        set.set_name("a");
        set.set_length(3);
        assert_eq!(set.to_string(), "HeaderSet({Name: a, Length: 3})");
    }

    // Ids that are not treated specially by the marshalling code.
    fn plain_id(mask: u8) -> impl Strategy<Value = u8> {
        (0u8..0x40).prop_map(move |low| mask | low).prop_filter(
            "special header",
            |id| {
                ![
                    header_id::TYPE,
                    header_id::TARGET,
                    header_id::CONNECTION_ID,
                    header_id::BODY,
                    header_id::END_OF_BODY,
                ]
                .contains(id)
            },
        )
    }

    proptest! {
        #[test]
        fn prop_unicode_roundtrip(id in plain_id(0x00), value in ".*") {
            let mut set = HeaderSet::new();
            set.set(id, value.clone()).unwrap();
            let back = roundtrip(&set);
            prop_assert_eq!(back.get(id), Some(&HeaderValue::Unicode(value)));
        }

        #[test]
        fn prop_bytes_roundtrip(id in plain_id(0x40), value in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut set = HeaderSet::new();
            set.set(id, value.clone()).unwrap();
            let back = roundtrip(&set);
            prop_assert_eq!(back.get(id), Some(&HeaderValue::Bytes(Bytes::from(value))));
        }

        #[test]
        fn prop_byte_roundtrip(id in plain_id(0x80), value in any::<u8>()) {
            let mut set = HeaderSet::new();
            set.set(id, value).unwrap();
            let back = roundtrip(&set);
            prop_assert_eq!(back.get(id), Some(&HeaderValue::Byte(value)));
        }

        #[test]
        fn prop_four_byte_roundtrip(id in plain_id(0xC0), value in any::<u32>()) {
            let mut set = HeaderSet::new();
            set.set(id, value).unwrap();
            let back = roundtrip(&set);
            prop_assert_eq!(back.get(id), Some(&HeaderValue::FourByte(value)));
        }

        #[test]
        fn prop_connection_id_and_target_lead(
            names in proptest::collection::vec("[a-z]{1,8}", 0..4),
            with_target in any::<bool>(),
            target_pos in 0usize..5,
        ) {
            let mut set = HeaderSet::new();
            for (i, name) in names.iter().enumerate() {
                if i == target_pos && with_target {
                    set.set_target(Bytes::from_static(b"target"));
                }
                set.set(header_id::DESCRIPTION, name.clone()).unwrap();
                set.set_count(i as u32);
            }
            set.set_connection_id(99);
            if with_target && !set.contains(header_id::TARGET) {
                set.set_target(Bytes::from_static(b"target"));
            }

            let ids: Vec<u8> = set.write_headers().unwrap().iter().map(|h| h.id).collect();
            if with_target {
                prop_assert_eq!(ids[0], header_id::TARGET);
            } else {
                prop_assert_eq!(ids[0], header_id::CONNECTION_ID);
            }
        }
    }
}
