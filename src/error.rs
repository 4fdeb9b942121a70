use core::fmt;
use std::path::PathBuf;

/// Errors raised while validating or mutating session configuration, per
/// spec §7 "configuration" category.
#[derive(Debug)]
pub enum ConfigError {
    MissingDuid,
    MissingIana,
    InvalidLifetimes { preferred: u32, valid: u32 },
    InvalidT1T2 { t1: u32, t2: u32 },
    ZeroIaid,
    InvalidIAAddress,
    UnsupportedDuidType(u16),
    UnsupportedDuidHwType(u16),
    UnknownOptionName(String),
    AlreadyStarted,
    MutateWhileStarted,
    DomainNameTooLong(usize),
    Parsing { err: serde_json::Error, path: PathBuf },
    Io { err: std::io::Error, path: PathBuf },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingDuid => write!(f, "client DUID has not been created"),
            ConfigError::MissingIana => write!(f, "IA_NA has not been created"),
            ConfigError::InvalidLifetimes { preferred, valid } => write!(
                f,
                "preferred_lifetime ({preferred}) must be <= valid_lifetime ({valid})"
            ),
            ConfigError::InvalidT1T2 { t1, t2 } => {
                write!(f, "T1 ({t1}) must be <= T2 ({t2})")
            }
            ConfigError::ZeroIaid => write!(f, "IAID must be non-zero"),
            ConfigError::InvalidIAAddress => write!(f, "IA-Address must not be the unspecified address"),
            ConfigError::UnsupportedDuidType(t) => write!(f, "unsupported DUID type {t}"),
            ConfigError::UnsupportedDuidHwType(t) => write!(f, "unsupported DUID hardware type {t}"),
            ConfigError::UnknownOptionName(name) => write!(f, "unknown requestable option `{name}`"),
            ConfigError::AlreadyStarted => write!(f, "session has already been started"),
            ConfigError::MutateWhileStarted => {
                write!(f, "attempt to mutate configuration while started")
            }
            ConfigError::DomainNameTooLong(len) => {
                write!(f, "domain name length {len} exceeds 255 bytes")
            }
            ConfigError::Parsing { err, path } => {
                write!(f, "parsing `{}`: {err}", path.to_string_lossy())
            }
            ConfigError::Io { err, path } => write!(f, "`{}`: {err}", path.to_string_lossy()),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised by resource limits, per spec §7 "resource" category.
#[derive(Debug)]
pub enum ResourceError {
    BufferOverflow { needed: usize, remaining: usize },
    PacketAllocateFailed,
    ReachedMaxIaAddress,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::BufferOverflow { needed, remaining } => write!(
                f,
                "buffer overflow: needed {needed} bytes, {remaining} remaining"
            ),
            ResourceError::PacketAllocateFailed => write!(f, "packet allocation failed"),
            ResourceError::ReachedMaxIaAddress => write!(f, "reached max IA-Address slots"),
        }
    }
}

impl std::error::Error for ResourceError {}

/// Errors raised while decoding a wire message, per spec §7 "wire" category
/// and §4.1's decoder contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    IllegalMessageType(u8),
    BadTransactionId,
    InvalidOptionData,
    IncompleteOptionBlock,
    InvalidDataSize,
    InvalidIAData,
    InvalidIATime,
    InvalidClientDuid,
    InvalidServerDuid,
    InvalidPreferenceData,
    MissingIanaOption,
    UnknownOption(u16),
    ProcessingError(&'static str),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::IllegalMessageType(t) => write!(f, "illegal message type {t}"),
            WireError::BadTransactionId => write!(f, "transaction id mismatch"),
            WireError::InvalidOptionData => write!(f, "invalid option data"),
            WireError::IncompleteOptionBlock => write!(f, "incomplete option block"),
            WireError::InvalidDataSize => write!(f, "invalid data size"),
            WireError::InvalidIAData => write!(f, "invalid IA data"),
            WireError::InvalidIATime => write!(f, "invalid IA lifetime"),
            WireError::InvalidClientDuid => write!(f, "invalid or mismatched client DUID"),
            WireError::InvalidServerDuid => write!(f, "invalid or missing server DUID"),
            WireError::InvalidPreferenceData => write!(f, "invalid preference option data"),
            WireError::MissingIanaOption => write!(f, "missing IA_NA option"),
            WireError::UnknownOption(code) => write!(f, "unknown option code {code}"),
            WireError::ProcessingError(what) => write!(f, "processing error: {what}"),
        }
    }
}

impl std::error::Error for WireError {}

/// Errors raised by the retransmission/transaction layer, per spec §7
/// "protocol" category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    MaxRetransmitCountReached,
    MaxRetransmitDurationReached,
    ServerRejected { status: u16, message_type: u8 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MaxRetransmitCountReached => write!(f, "max retransmission count reached"),
            ProtocolError::MaxRetransmitDurationReached => {
                write!(f, "max retransmission duration reached")
            }
            ProtocolError::ServerRejected { status, message_type } => write!(
                f,
                "server rejected with status {status} in message type {message_type}"
            ),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Errors raised by operations that require a particular session state, per
/// spec §7 "state" category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    NotBound,
    IaAddressNotValid,
    IaAddressAlreadyExists,
    Unknown,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::NotBound => write!(f, "session is not bound to an address"),
            StateError::IaAddressNotValid => write!(f, "IA-Address is not in state Valid"),
            StateError::IaAddressAlreadyExists => write!(f, "IA-Address already exists"),
            StateError::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::error::Error for StateError {}

/// Top-level error returned at the public API surface, wrapping each
/// category above.
#[derive(Debug)]
pub enum ClientError {
    Config(ConfigError),
    Resource(ResourceError),
    Wire(WireError),
    Protocol(ProtocolError),
    State(StateError),
    Persist(PersistError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Config(e) => write!(f, "{e}"),
            ClientError::Resource(e) => write!(f, "{e}"),
            ClientError::Wire(e) => write!(f, "{e}"),
            ClientError::Protocol(e) => write!(f, "{e}"),
            ClientError::State(e) => write!(f, "{e}"),
            ClientError::Persist(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ConfigError> for ClientError {
    fn from(e: ConfigError) -> Self {
        ClientError::Config(e)
    }
}
impl From<ResourceError> for ClientError {
    fn from(e: ResourceError) -> Self {
        ClientError::Resource(e)
    }
}
impl From<WireError> for ClientError {
    fn from(e: WireError) -> Self {
        ClientError::Wire(e)
    }
}
impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        ClientError::Protocol(e)
    }
}
impl From<StateError> for ClientError {
    fn from(e: StateError) -> Self {
        ClientError::State(e)
    }
}
impl From<PersistError> for ClientError {
    fn from(e: PersistError) -> Self {
        ClientError::Persist(e)
    }
}

/// Errors from `src/persist.rs`'s snapshot/restore pair.
#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    MissingDuid,
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io(e) => write!(f, "{e}"),
            PersistError::Serde(e) => write!(f, "{e}"),
            PersistError::MissingDuid => write!(f, "cannot snapshot a session without a client DUID"),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        PersistError::Io(e)
    }
}
impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        PersistError::Serde(e)
    }
}
