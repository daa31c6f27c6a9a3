use thiserror::Error;

/// Everything that can go wrong while encoding or decoding a stream.
///
/// None of these are retried; after an error the writer or reader state is
/// corrupt and must be discarded.
#[derive(Debug, Error)]
pub enum JoltError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad stream header: {0}")]
    BadHeader(String),

    #[error("peer protocol version {peer} is newer than supported version {supported}")]
    VersionMismatch { peer: u8, supported: u8 },

    #[error("unknown wire tag {tag:#04x}")]
    UnknownTag { tag: u8 },

    #[error("back-reference to unassigned slot {slot}")]
    UnboundSlot { slot: u64 },

    #[error("stream desynchronized: {0}")]
    Desync(String),

    #[error("cannot serialize value: {0}")]
    Unsupported(String),

    #[error("unknown root module '{name}'")]
    UnknownModule { name: String },

    #[error("no binding named '{name}' in module '{module}'")]
    UnresolvedBinding { module: String, name: String },

    #[error("type '{name}' is still under construction")]
    TypeUnderConstruction { name: String },

    #[error("invalid UTF-8 in stream")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type JoltResult<T> = Result<T, JoltError>;
