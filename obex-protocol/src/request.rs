//! Request kinds, opcodes, response codes and SetPath flags.

use std::fmt;

/// Raw OBEX opcodes as they appear in the first byte of a request packet.
pub mod opcode {
    pub const CONNECT: u8 = 0x80;
    pub const DISCONNECT: u8 = 0x81;
    pub const PUT: u8 = 0x02;
    pub const GET: u8 = 0x03;
    pub const SETPATH: u8 = 0x85;
    pub const ABORT: u8 = 0xFF;

    /// Set on the last packet of a request, and on every response.
    pub const FINAL_BIT: u8 = 0x80;

    /// Strips the final bit from a Put or Get opcode.
    pub fn base(code: u8) -> u8 {
        match code {
            CONNECT | DISCONNECT | SETPATH | ABORT => code,
            other => other & !FINAL_BIT,
        }
    }

    /// Length of the non-header data that follows the packet length
    /// in a request with the given opcode.
    pub fn request_prefix_len(code: u8) -> usize {
        match code {
            CONNECT => 4,
            SETPATH => 2,
            _ => 0,
        }
    }
}

/// An OBEX request kind.
///
/// `Put` and `PutDelete` share an opcode on the wire; a Put that carries
/// no body headers at all is a PutDelete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    Connect,
    Disconnect,
    Put,
    PutDelete,
    Get,
    SetPath,
}

impl Request {
    /// Returns the opcode used on the wire, without the final bit for
    /// multi-packet requests.
    pub fn opcode(&self) -> u8 {
        match self {
            Request::Connect => opcode::CONNECT,
            Request::Disconnect => opcode::DISCONNECT,
            Request::Put | Request::PutDelete => opcode::PUT,
            Request::Get => opcode::GET,
            Request::SetPath => opcode::SETPATH,
        }
    }

    /// Maps a wire opcode back to a request kind. `has_body` distinguishes
    /// Put from PutDelete.
    pub fn from_opcode(code: u8, has_body: bool) -> Option<Self> {
        match opcode::base(code) {
            opcode::CONNECT => Some(Request::Connect),
            opcode::DISCONNECT => Some(Request::Disconnect),
            opcode::PUT if has_body => Some(Request::Put),
            opcode::PUT => Some(Request::PutDelete),
            opcode::GET => Some(Request::Get),
            opcode::SETPATH => Some(Request::SetPath),
            _ => None,
        }
    }

    /// Whether all headers of this request must fit in a single packet.
    pub fn fits_one_packet(&self) -> bool {
        match self {
            Request::Connect | Request::Disconnect | Request::SetPath => true,
            Request::Put | Request::PutDelete | Request::Get => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Request::Connect => "Connect",
            Request::Disconnect => "Disconnect",
            Request::Put => "Put",
            Request::PutDelete => "PutDelete",
            Request::Get => "Get",
            Request::SetPath => "SetPath",
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An OBEX response code, including the final bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(u8);

impl ResponseCode {
    pub const CONTINUE: Self = Self(0x90);
    pub const SUCCESS: Self = Self(0xA0);
    pub const CREATED: Self = Self(0xA1);
    pub const ACCEPTED: Self = Self(0xA2);
    pub const NON_AUTHORITATIVE: Self = Self(0xA3);
    pub const NO_CONTENT: Self = Self(0xA4);
    pub const RESET_CONTENT: Self = Self(0xA5);
    pub const PARTIAL_CONTENT: Self = Self(0xA6);
    pub const MULTIPLE_CHOICES: Self = Self(0xB0);
    pub const MOVED_PERMANENTLY: Self = Self(0xB1);
    pub const MOVED_TEMPORARILY: Self = Self(0xB2);
    pub const SEE_OTHER: Self = Self(0xB3);
    pub const NOT_MODIFIED: Self = Self(0xB4);
    pub const USE_PROXY: Self = Self(0xB5);
    pub const BAD_REQUEST: Self = Self(0xC0);
    pub const UNAUTHORIZED: Self = Self(0xC1);
    pub const PAYMENT_REQUIRED: Self = Self(0xC2);
    pub const FORBIDDEN: Self = Self(0xC3);
    pub const NOT_FOUND: Self = Self(0xC4);
    pub const METHOD_NOT_ALLOWED: Self = Self(0xC5);
    pub const NOT_ACCEPTABLE: Self = Self(0xC6);
    pub const PROXY_AUTHENTICATION_REQUIRED: Self = Self(0xC7);
    pub const REQUEST_TIMEOUT: Self = Self(0xC8);
    pub const CONFLICT: Self = Self(0xC9);
    pub const GONE: Self = Self(0xCA);
    pub const LENGTH_REQUIRED: Self = Self(0xCB);
    pub const PRECONDITION_FAILED: Self = Self(0xCC);
    pub const REQUESTED_ENTITY_TOO_LARGE: Self = Self(0xCD);
    pub const REQUEST_URL_TOO_LARGE: Self = Self(0xCE);
    pub const UNSUPPORTED_MEDIA_TYPE: Self = Self(0xCF);
    pub const INTERNAL_SERVER_ERROR: Self = Self(0xD0);
    pub const NOT_IMPLEMENTED: Self = Self(0xD1);
    pub const BAD_GATEWAY: Self = Self(0xD2);
    pub const SERVICE_UNAVAILABLE: Self = Self(0xD3);
    pub const GATEWAY_TIMEOUT: Self = Self(0xD4);
    pub const HTTP_VERSION_NOT_SUPPORTED: Self = Self(0xD5);
    pub const DATABASE_FULL: Self = Self(0xE0);
    pub const DATABASE_LOCKED: Self = Self(0xE1);

    /// Builds a response code from its wire byte. The final bit is always
    /// set on responses, so it is forced here.
    pub fn from_u8(code: u8) -> Self {
        Self(code | opcode::FINAL_BIT)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    pub fn is_continue(&self) -> bool {
        *self == Self::CONTINUE
    }

    /// Human readable name of the code.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::CONTINUE => "Continue",
            Self::SUCCESS => "Success",
            Self::CREATED => "Created",
            Self::ACCEPTED => "Accepted",
            Self::NON_AUTHORITATIVE => "Non-Authoritative Information",
            Self::NO_CONTENT => "No Content",
            Self::RESET_CONTENT => "Reset Content",
            Self::PARTIAL_CONTENT => "Partial Content",
            Self::MULTIPLE_CHOICES => "Multiple Choices",
            Self::MOVED_PERMANENTLY => "Moved Permanently",
            Self::MOVED_TEMPORARILY => "Moved Temporarily",
            Self::SEE_OTHER => "See Other",
            Self::NOT_MODIFIED => "Not Modified",
            Self::USE_PROXY => "Use Proxy",
            Self::BAD_REQUEST => "Bad Request",
            Self::UNAUTHORIZED => "Unauthorized",
            Self::PAYMENT_REQUIRED => "Payment Required",
            Self::FORBIDDEN => "Forbidden",
            Self::NOT_FOUND => "Not Found",
            Self::METHOD_NOT_ALLOWED => "Method Not Allowed",
            Self::NOT_ACCEPTABLE => "Not Acceptable",
            Self::PROXY_AUTHENTICATION_REQUIRED => "Proxy Authentication Required",
            Self::REQUEST_TIMEOUT => "Request Timeout",
            Self::CONFLICT => "Conflict",
            Self::GONE => "Gone",
            Self::LENGTH_REQUIRED => "Length Required",
            Self::PRECONDITION_FAILED => "Precondition Failed",
            Self::REQUESTED_ENTITY_TOO_LARGE => "Requested Entity Too Large",
            Self::REQUEST_URL_TOO_LARGE => "Request URL Too Large",
            Self::UNSUPPORTED_MEDIA_TYPE => "Unsupported Media Type",
            Self::INTERNAL_SERVER_ERROR => "Internal Server Error",
            Self::NOT_IMPLEMENTED => "Not Implemented",
            Self::BAD_GATEWAY => "Bad Gateway",
            Self::SERVICE_UNAVAILABLE => "Service Unavailable",
            Self::GATEWAY_TIMEOUT => "Gateway Timeout",
            Self::HTTP_VERSION_NOT_SUPPORTED => "HTTP Version Not Supported",
            Self::DATABASE_FULL => "Database Full",
            Self::DATABASE_LOCKED => "Database Locked",
            _ => "Unknown Response",
        }
    }
}

impl Default for ResponseCode {
    fn default() -> Self {
        Self::SUCCESS
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.0)
    }
}

/// Flags carried in the first non-header byte of a SetPath request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetPathFlags(u8);

impl SetPathFlags {
    /// Go up one folder before applying the Name header.
    pub const BACK_UP_ONE_LEVEL: u8 = 1 << 0;
    /// Do not create the folder if it does not exist.
    pub const NO_PATH_CREATION: u8 = 1 << 1;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_back_up_one_level(mut self) -> Self {
        self.0 |= Self::BACK_UP_ONE_LEVEL;
        self
    }

    pub fn with_no_path_creation(mut self) -> Self {
        self.0 |= Self::NO_PATH_CREATION;
        self
    }

    pub fn backs_up_one_level(&self) -> bool {
        self.0 & Self::BACK_UP_ONE_LEVEL != 0
    }

    pub fn no_path_creation(&self) -> bool {
        self.0 & Self::NO_PATH_CREATION != 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Extracts the flags from SetPath non-header data. Fewer than two
    /// bytes yields no flags.
    pub fn from_non_header_data(data: &[u8]) -> Self {
        if data.len() < 2 {
            return Self(0);
        }
        Self(data[0] & (Self::BACK_UP_ONE_LEVEL | Self::NO_PATH_CREATION))
    }

    /// The two non-header bytes sent with a SetPath request.
    pub fn to_non_header_data(&self) -> [u8; 2] {
        [self.0, 0]
    }
}
