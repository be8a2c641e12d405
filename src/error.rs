use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("neighbor cache full")]
    CacheFull,

    #[error("address context table full")]
    TableFull,

    #[error("address already registered to another EUI-64")]
    Duplicate,

    #[error("duplicate address detection failed")]
    DadFailed,

    #[error("malformed option: {0}")]
    MalformedOption(String),
}

pub type Result<T> = std::result::Result<T, Error>;
