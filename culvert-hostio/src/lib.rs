//! Host-IO primitives: x86 LPC port I/O and `/dev/mem`/`/sys/bus/pci` mmap
//! helpers. Everything above this layer (the SuperIO client, the bridge
//! transports) is built only on the primitives exposed here.

pub mod mmap;
pub mod port;

use std::fmt;

#[derive(Debug, Clone)]
pub enum HostIoError {
    PermissionDenied(String),
    Io(String),
    InvalidArgument(String),
}

impl fmt::Display for HostIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostIoError::PermissionDenied(s) => write!(f, "PermissionDenied: {s}"),
            HostIoError::Io(s) => write!(f, "IOFailure: {s}"),
            HostIoError::InvalidArgument(s) => write!(f, "InvalidArgument: {s}"),
        }
    }
}

impl std::error::Error for HostIoError {}

impl From<std::io::Error> for HostIoError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                HostIoError::PermissionDenied(format!("{e}"))
            }
            _ => HostIoError::Io(format!("{e}")),
        }
    }
}
