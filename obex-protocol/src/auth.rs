//! MD5 digest challenge/response authentication.
//!
//! Both the Auth-Challenge and the Auth-Response header values are
//! sequences of tag-length-value triples with a one-byte tag and a
//! one-byte length:
//!
//! ```text
//! Challenge                         Response
//! +------+----------------------+   +------+-----------------------+
//! | 0x00 | nonce (16 bytes)     |   | 0x00 | digest (16 bytes)     |
//! | 0x01 | options (1 byte)     |   | 0x01 | user id (<= 20 bytes) |
//! | 0x02 | charset | realm      |   | 0x02 | nonce (16 bytes)      |
//! +------+----------------------+   +------+-----------------------+
//! ```
//!
//! Fields may appear in any order; unknown tags are skipped. The digest
//! is `MD5(nonce ":" password)`.

use crate::error::ProtocolError;
use crate::header::{string_from_unicode_bytes, unicode_bytes_from_string};
use bytes::{BufMut, Bytes, BytesMut};
use md5::{Digest, Md5};

/// Size of a challenge nonce.
pub const NONCE_SIZE: usize = 16;

/// Size of an MD5 digest.
pub const DIGEST_SIZE: usize = 16;

/// Longest user id that fits in a response.
pub const MAX_USER_ID_LEN: usize = 20;

const CHALLENGE_NONCE_TAG: u8 = 0x00;
const CHALLENGE_OPTIONS_TAG: u8 = 0x01;
const CHALLENGE_REALM_TAG: u8 = 0x02;

const RESPONSE_DIGEST_TAG: u8 = 0x00;
const RESPONSE_USER_ID_TAG: u8 = 0x01;
const RESPONSE_NONCE_TAG: u8 = 0x02;

/// Character set tag leading a realm value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RealmCharset {
    Ascii = 0x00,
    Latin1 = 0x01,
    Unicode = 0xFF,
}

impl RealmCharset {
    /// Picks the narrowest charset able to represent `realm`.
    pub fn for_realm(realm: &str) -> Self {
        if realm.chars().all(|c| (c as u32) < 0x80) {
            RealmCharset::Ascii
        } else if realm.chars().all(|c| (c as u32) <= 0xFF) {
            RealmCharset::Latin1
        } else {
            RealmCharset::Unicode
        }
    }
}

/// Options flags sent with a challenge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AuthChallengeOptions(u8);

impl AuthChallengeOptions {
    /// The responder must send a user id.
    pub const USER_ID_REQUIRED: u8 = 1 << 0;
    /// Access to the resource will be read-only.
    pub const READ_ONLY_ACCESS: u8 = 1 << 1;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_user_id_required(mut self) -> Self {
        self.0 |= Self::USER_ID_REQUIRED;
        self
    }

    pub fn with_read_only_access(mut self) -> Self {
        self.0 |= Self::READ_ONLY_ACCESS;
        self
    }

    pub fn user_id_required(&self) -> bool {
        self.0 & Self::USER_ID_REQUIRED != 0
    }

    pub fn read_only_access(&self) -> bool {
        self.0 & Self::READ_ONLY_ACCESS != 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }
}

/// Generates an unpredictable 16-byte nonce.
pub fn generate_nonce() -> Bytes {
    let mut hasher = Md5::new();
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hasher.update(chrono::Utc::now().to_rfc3339().as_bytes());
    Bytes::copy_from_slice(&hasher.finalize())
}

/// Computes `MD5(nonce ":" password)`. Characters of the password outside
/// Latin-1 are replaced by `?`.
pub fn compute_digest(nonce: &[u8], password: &str) -> [u8; DIGEST_SIZE] {
    let mut hasher = Md5::new();
    hasher.update(nonce);
    hasher.update(b":");
    hasher.update(latin1_bytes(password));
    let mut digest = [0u8; DIGEST_SIZE];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

fn latin1_bytes(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(c as u32).unwrap_or(b'?'))
        .collect()
}

fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Iterates the tag-length-value fields of an authentication header.
fn parse_fields(data: &[u8]) -> Result<Vec<(u8, &[u8])>, ProtocolError> {
    let mut fields = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let tag = data[pos];
        if pos + 2 > data.len() {
            return Err(ProtocolError::TruncatedAuthField { tag });
        }
        let len = data[pos + 1] as usize;
        let start = pos + 2;
        if start + len > data.len() {
            return Err(ProtocolError::TruncatedAuthField { tag });
        }
        fields.push((tag, &data[start..start + len]));
        pos = start + len;
    }
    Ok(fields)
}

fn put_field(buf: &mut BytesMut, tag: u8, value: &[u8]) {
    buf.put_u8(tag);
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
}

/// Serializes an Auth-Challenge header value.
pub(crate) fn write_challenge(
    nonce: &[u8],
    options: AuthChallengeOptions,
    realm: &str,
) -> Result<Bytes, ProtocolError> {
    if nonce.len() != NONCE_SIZE {
        return Err(ProtocolError::InvalidNonceLength(nonce.len()));
    }

    let mut buf = BytesMut::with_capacity(2 + NONCE_SIZE + 3 + 2 + realm.len() * 2);
    put_field(&mut buf, CHALLENGE_NONCE_TAG, nonce);

    if options.bits() != 0 {
        put_field(&mut buf, CHALLENGE_OPTIONS_TAG, &[options.bits()]);
    }

    if !realm.is_empty() {
        let charset = RealmCharset::for_realm(realm);
        let encoded = match charset {
            RealmCharset::Ascii | RealmCharset::Latin1 => latin1_bytes(realm),
            RealmCharset::Unicode => unicode_bytes_from_string(realm),
        };
        // One byte of the field length goes to the charset tag
        if encoded.len() + 1 > u8::MAX as usize {
            return Err(ProtocolError::RealmTooLong(encoded.len()));
        }
        buf.put_u8(CHALLENGE_REALM_TAG);
        buf.put_u8((encoded.len() + 1) as u8);
        buf.put_u8(charset as u8);
        buf.put_slice(&encoded);
    }

    Ok(buf.freeze())
}

/// An authentication challenge received from the peer.
///
/// The receiving side fills in the user and password before a response
/// is generated. The challenge counts as answered once either has been
/// set, even to an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    nonce: Bytes,
    options: AuthChallengeOptions,
    realm: String,
    user: String,
    password: String,
    modified: bool,
}

impl AuthChallenge {
    /// Parses an Auth-Challenge header value.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut nonce = None;
        let mut options = AuthChallengeOptions::new();
        let mut realm = String::new();

        for (tag, value) in parse_fields(data)? {
            match tag {
                CHALLENGE_NONCE_TAG => {
                    if value.len() != NONCE_SIZE {
                        return Err(ProtocolError::InvalidNonceLength(value.len()));
                    }
                    nonce = Some(Bytes::copy_from_slice(value));
                }
                CHALLENGE_OPTIONS_TAG => {
                    if let Some(&bits) = value.first() {
                        options = AuthChallengeOptions::from_bits(bits);
                    }
                }
                CHALLENGE_REALM_TAG => {
                    if let Some((&charset, text)) = value.split_first() {
                        realm = if charset == RealmCharset::Unicode as u8 {
                            string_from_unicode_bytes(text).unwrap_or_default()
                        } else {
                            latin1_string(text)
                        };
                    }
                }
                _ => {}
            }
        }

        let nonce = nonce.ok_or(ProtocolError::MissingNonce)?;
        Ok(Self {
            nonce,
            options,
            realm,
            user: String::new(),
            password: String::new(),
            modified: false,
        })
    }

    /// Serializes this challenge back into a header value.
    pub fn write(&self) -> Result<Bytes, ProtocolError> {
        write_challenge(&self.nonce, self.options, &self.realm)
    }

    pub fn nonce(&self) -> &Bytes {
        &self.nonce
    }

    pub fn options(&self) -> AuthChallengeOptions {
        self.options
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn set_user(&mut self, user: impl Into<String>) {
        self.user = user.into();
        self.modified = true;
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
        self.modified = true;
    }

    /// Whether a user or password has been supplied.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Builds the Auth-Response header value answering this challenge.
    ///
    /// `extra_nonce`, when non-empty, must be exactly 16 bytes and is
    /// sent as the Response-Nonce field.
    pub fn to_response(&self, extra_nonce: &[u8]) -> Result<Bytes, ProtocolError> {
        let user = latin1_bytes(&self.user);
        if user.len() > MAX_USER_ID_LEN {
            return Err(ProtocolError::UserIdTooLong(user.len()));
        }
        if !extra_nonce.is_empty() && extra_nonce.len() != NONCE_SIZE {
            return Err(ProtocolError::InvalidNonceLength(extra_nonce.len()));
        }

        let digest = compute_digest(&self.nonce, &self.password);
        let mut buf = BytesMut::with_capacity(2 + DIGEST_SIZE + 2 + user.len() + 2 + NONCE_SIZE);
        put_field(&mut buf, RESPONSE_DIGEST_TAG, &digest);
        if !user.is_empty() {
            put_field(&mut buf, RESPONSE_USER_ID_TAG, &user);
        }
        if !extra_nonce.is_empty() {
            put_field(&mut buf, RESPONSE_NONCE_TAG, extra_nonce);
        }
        Ok(buf.freeze())
    }
}

/// An authentication response received from the peer, bound to the nonce
/// this side sent in its challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    nonce: Bytes,
    digest: [u8; DIGEST_SIZE],
    user: String,
    response_nonce: Bytes,
}

impl AuthResponse {
    /// Parses an Auth-Response header value answering the challenge that
    /// carried `nonce`.
    pub fn parse(data: &[u8], nonce: Bytes) -> Result<Self, ProtocolError> {
        let mut digest = None;
        let mut user = String::new();
        let mut response_nonce = Bytes::new();

        for (tag, value) in parse_fields(data)? {
            match tag {
                RESPONSE_DIGEST_TAG => {
                    let bytes = <[u8; DIGEST_SIZE]>::try_from(value)
                        .map_err(|_| ProtocolError::InvalidDigestLength(value.len()))?;
                    digest = Some(bytes);
                }
                RESPONSE_USER_ID_TAG => user = latin1_string(value),
                RESPONSE_NONCE_TAG => response_nonce = Bytes::copy_from_slice(value),
                _ => {}
            }
        }

        let digest = digest.ok_or(ProtocolError::MissingDigest)?;
        Ok(Self {
            nonce,
            digest,
            user,
            response_nonce,
        })
    }

    /// The nonce this response is checked against. Never transmitted.
    pub fn nonce(&self) -> &Bytes {
        &self.nonce
    }

    pub fn digest(&self) -> &[u8; DIGEST_SIZE] {
        &self.digest
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Nonce supplied by the responder, if any. Not validated.
    pub fn response_nonce(&self) -> &Bytes {
        &self.response_nonce
    }

    /// Returns true if the digest was computed from `password`.
    pub fn matches(&self, password: &str) -> bool {
        compute_digest(&self.nonce, password) == self.digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn challenge_with(options: AuthChallengeOptions, realm: &str) -> (Bytes, AuthChallenge) {
        let nonce = generate_nonce();
        let raw = write_challenge(&nonce, options, realm).unwrap();
        (nonce, AuthChallenge::parse(&raw).unwrap())
    }

    #[test]
    fn test_nonce_is_unique() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), NONCE_SIZE);
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_known_value() {
        assert_eq!(
            hex::encode(compute_digest(b"abc", "")),
            "493e283d571a73056196f1a68efd0f66"
        );
        assert_eq!(
            hex::encode(compute_digest(b"abc", "secret")),
            "618a27cae7e1aa2610a9a3637331ca2e"
        );
    }

    #[test]
    fn test_minimal_challenge_layout() {
        let nonce = [7u8; NONCE_SIZE];
        let raw = write_challenge(&nonce, AuthChallengeOptions::new(), "").unwrap();
        assert_eq!(raw.len(), 2 + NONCE_SIZE);
        assert_eq!(raw[0], CHALLENGE_NONCE_TAG);
        assert_eq!(raw[1], NONCE_SIZE as u8);
    }

    #[test]
    fn test_challenge_fields() {
        let options = AuthChallengeOptions::new()
            .with_user_id_required()
            .with_read_only_access();
        let (nonce, challenge) = challenge_with(options, "obex");
        assert_eq!(challenge.nonce(), &nonce);
        assert!(challenge.options().user_id_required());
        assert!(challenge.options().read_only_access());
        assert_eq!(challenge.realm(), "obex");
        assert!(!challenge.is_modified());
    }

    #[test]
    fn test_realm_charsets() {
        assert_eq!(RealmCharset::for_realm("plain"), RealmCharset::Ascii);
        assert_eq!(RealmCharset::for_realm("caf\u{e9}"), RealmCharset::Latin1);
        assert_eq!(RealmCharset::for_realm("\u{4e16}\u{754c}"), RealmCharset::Unicode);

        for realm in ["caf\u{e9}", "\u{4e16}\u{754c}"] {
            let (_, challenge) = challenge_with(AuthChallengeOptions::new(), realm);
            assert_eq!(challenge.realm(), realm);
        }

        let raw = write_challenge(&[0u8; NONCE_SIZE], AuthChallengeOptions::new(), "caf\u{e9}")
            .unwrap();
        assert_eq!(&raw[18..], &[CHALLENGE_REALM_TAG, 5, 0x01, b'c', b'a', b'f', 0xE9]);
    }

    #[test]
    fn test_parse_challenge_errors() {
        assert_eq!(AuthChallenge::parse(&[]), Err(ProtocolError::MissingNonce));
        assert_eq!(
            AuthChallenge::parse(&[CHALLENGE_NONCE_TAG, 3, 1, 2, 3]),
            Err(ProtocolError::InvalidNonceLength(3))
        );
        assert_eq!(
            AuthChallenge::parse(&[CHALLENGE_NONCE_TAG, 16, 1, 2]),
            Err(ProtocolError::TruncatedAuthField { tag: 0 })
        );
        assert_eq!(
            AuthChallenge::parse(&[CHALLENGE_OPTIONS_TAG]),
            Err(ProtocolError::TruncatedAuthField { tag: 1 })
        );
    }

    #[test]
    fn test_parse_challenge_skips_unknown_tags() {
        let mut raw = vec![0x7A, 2, 9, 9];
        raw.extend_from_slice(&write_challenge(&[1u8; 16], AuthChallengeOptions::new(), "r").unwrap());
        let challenge = AuthChallenge::parse(&raw).unwrap();
        assert_eq!(challenge.realm(), "r");
    }

    #[test]
    fn test_setters_mark_modified() {
        let (_, mut challenge) = challenge_with(AuthChallengeOptions::new(), "");
        challenge.set_password("");
        assert!(challenge.is_modified());

        let (_, mut challenge) = challenge_with(AuthChallengeOptions::new(), "");
        challenge.set_user("");
        assert!(challenge.is_modified());
        assert_eq!(challenge.user(), "");
    }

    #[test]
    fn test_response_user_and_nonce() {
        let (nonce, mut challenge) = challenge_with(AuthChallengeOptions::new(), "");
        challenge.set_user("alice");
        challenge.set_password("secret");

        let extra = [5u8; NONCE_SIZE];
        let raw = challenge.to_response(&extra).unwrap();
        let response = AuthResponse::parse(&raw, nonce).unwrap();
        assert_eq!(response.user(), "alice");
        assert_eq!(&response.response_nonce()[..], &extra);
        assert!(response.matches("secret"));
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let (_, mut challenge) = challenge_with(AuthChallengeOptions::new(), "");
        challenge.set_password("pw");
        let raw = challenge.to_response(&[]).unwrap();
        assert_eq!(raw.len(), 2 + DIGEST_SIZE);
    }

    #[test]
    fn test_response_errors() {
        let (_, mut challenge) = challenge_with(AuthChallengeOptions::new(), "");
        challenge.set_user("a".repeat(21));
        assert_eq!(
            challenge.to_response(&[]),
            Err(ProtocolError::UserIdTooLong(21))
        );

        challenge.set_user("a".repeat(20));
        assert!(challenge.to_response(&[]).is_ok());
        assert_eq!(
            challenge.to_response(&[1, 2, 3]),
            Err(ProtocolError::InvalidNonceLength(3))
        );
    }

    #[test]
    fn test_parse_response_errors() {
        let nonce = Bytes::from_static(&[0u8; 16]);
        assert_eq!(
            AuthResponse::parse(&[RESPONSE_USER_ID_TAG, 1, b'a'], nonce.clone()),
            Err(ProtocolError::MissingDigest)
        );
        assert_eq!(
            AuthResponse::parse(&[RESPONSE_DIGEST_TAG, 2, 0, 0], nonce.clone()),
            Err(ProtocolError::InvalidDigestLength(2))
        );
        assert_eq!(
            AuthResponse::parse(&[RESPONSE_DIGEST_TAG, 16, 0], nonce),
            Err(ProtocolError::TruncatedAuthField { tag: 0 })
        );
    }

    #[test]
    fn test_non_latin1_password() {
        assert_eq!(compute_digest(b"n", "\u{4e16}"), compute_digest(b"n", "?"));
    }

    proptest! {
        #[test]
        fn prop_response_matches_password(password in ".{0,32}", other in ".{0,32}") {
            let (nonce, mut challenge) = challenge_with(AuthChallengeOptions::new(), "");
            challenge.set_password(password.clone());
            let raw = challenge.to_response(&[]).unwrap();
            let response = AuthResponse::parse(&raw, nonce).unwrap();

            prop_assert!(response.matches(&password));
            if latin1_bytes(&other) != latin1_bytes(&password) {
                prop_assert!(!response.matches(&other));
            }
        }

        #[test]
        fn prop_challenge_field_order_irrelevant(
            options in 1u8..4,
            realm in "[a-zA-Z0-9 ]{1,40}",
            order in Just(vec![0usize, 1, 2]).prop_shuffle(),
        ) {
            let nonce = [0x42u8; NONCE_SIZE];
            let mut fields: Vec<Vec<u8>> = Vec::new();
            let mut f = vec![CHALLENGE_NONCE_TAG, NONCE_SIZE as u8];
            f.extend_from_slice(&nonce);
            fields.push(f);
            fields.push(vec![CHALLENGE_OPTIONS_TAG, 1, options]);
            let mut f = vec![CHALLENGE_REALM_TAG, realm.len() as u8 + 1, 0];
            f.extend_from_slice(realm.as_bytes());
            fields.push(f);

            let canonical: Vec<u8> = fields.concat();
            let permuted: Vec<u8> = order.iter().flat_map(|&i| fields[i].clone()).collect();

            prop_assert_eq!(
                AuthChallenge::parse(&canonical).unwrap(),
                AuthChallenge::parse(&permuted).unwrap()
            );
        }
    }
}
