use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// Raw socket creation was refused by the OS.
    #[error("raw socket requires elevated privileges: {0}")]
    PermissionDenied(#[source] io::Error),

    /// Bind, socket option or ioctl configuration failed.
    #[error("capture setup failed ({step}): {source}")]
    SetupFailed {
        step: &'static str,
        #[source]
        source: io::Error,
    },

    /// Datagram too short or with an inconsistent header length.
    #[error("malformed datagram: {0}")]
    Malformed(String),

    #[error("capture interrupted")]
    Interrupted,

    /// A receive failed for a reason other than an interrupt.
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),
}

impl CaptureError {
    pub(crate) fn setup(step: &'static str, source: io::Error) -> Self {
        CaptureError::SetupFailed { step, source }
    }

    /// Classifies a socket creation failure.
    pub(crate) fn from_create(source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            CaptureError::PermissionDenied(source)
        } else {
            CaptureError::setup("socket", source)
        }
    }
}
