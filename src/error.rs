use thiserror::Error;

pub use color_eyre::eyre::eyre;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors that stop the whole process (spec.md §7, "Capture-fatal").
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open capture interface {iface:?}: {source}")]
    OpenInterface {
        iface: String,
        #[source]
        source: pcap::Error,
    },

    #[error("failed to install BPF filter {filter:?}: {source}")]
    InstallFilter {
        filter: String,
        #[source]
        source: pcap::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a bug in mysql-sniff: {0}")]
    LibraryBug(color_eyre::Report),
}

/// Protocol-level trouble that never stops the process: a malformed packet
/// closes one half-stream, an unresolvable statement id drops one event.
/// Always logged (spec.md §7, "Stream-fatal" / "Protocol-skippable") and
/// never propagated as an `Error`, since a `Result::Err` here would abort a
/// connection the operator has no way to retry.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("short read or truncated packet header")]
    Truncated,

    #[error("packet payload too small for header: {0}")]
    InvalidPacket(String),

    /// Required by `tokio_util::codec::Decoder`, whose `Error` associated
    /// type must implement `From<std::io::Error>` (the teacher's own
    /// `protocol::packet::PacketDecoder` satisfies this the same way, via
    /// its crate-wide `Error`'s `IoError` variant).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn from_debug(err: impl std::fmt::Debug) -> Self {
        Self::LibraryBug(color_eyre::eyre::eyre!(format!("{:#?}", err)))
    }
}

impl<Src, Dst: ?Sized> From<zerocopy::CastError<Src, Dst>> for Error {
    fn from(err: zerocopy::CastError<Src, Dst>) -> Self {
        Self::LibraryBug(color_eyre::eyre::eyre!("{:#?}", err))
    }
}
