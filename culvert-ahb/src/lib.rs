//! The AHB facade: a uniform read/write/readl/writel capability implemented
//! by every bridge transport, plus the handful of value types that the rest
//! of the workspace shares (physical addresses, bridge modes, range
//! descriptors).

use std::fmt;
use std::io::{Read, Write};

/// A 32-bit AHB byte address inside the BMC SoC.
pub type Phys = u32;

/// Semantic error kinds shared by every layer of the toolkit.
///
/// These are deliberately not 1:1 with `std::io::ErrorKind` or `errno`:
/// they describe *why* an AHB operation failed in terms a caller can act on
/// (retry, report "not supported", ask for root), with the OS-level detail
/// folded into the message.
#[derive(Debug, Clone)]
pub enum AhbError {
    /// Operation does not apply on this SoC generation or through this
    /// transport.
    NotSupported(String),
    /// Misaligned address for a 32-bit access, unknown bridge name, or a
    /// malformed value that reached the core.
    InvalidArgument(String),
    /// Caller needs root (or equivalent) for devmem or port I/O.
    PermissionDenied(String),
    /// Transport-layer failure: mmap failed, a file read short, a prompt
    /// was never found.
    IoFailure(String),
    /// Parse failure of a debug-UART reply line.
    ProtocolViolation(String),
    /// Readback after a write disagreed with what was written.
    VerifyMismatch(String),
    /// A poll or a blocking wait exceeded its budget.
    Timeout(String),
    /// The target is already in the requested state.
    AlreadyInState(String),
}

impl AhbError {
    pub fn not_supported(msg: impl Into<String>) -> Self {
        AhbError::NotSupported(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        AhbError::InvalidArgument(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        AhbError::IoFailure(msg.into())
    }

    /// True for [`AhbError::NotSupported`] — used by the discovery pipeline
    /// to downgrade a single transport's refusal into "this transport is
    /// absent" rather than failing the whole probe.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, AhbError::NotSupported(_))
    }

    fn tag(&self) -> &'static str {
        match self {
            AhbError::NotSupported(_) => "NotSupported",
            AhbError::InvalidArgument(_) => "InvalidArgument",
            AhbError::PermissionDenied(_) => "PermissionDenied",
            AhbError::IoFailure(_) => "IOFailure",
            AhbError::ProtocolViolation(_) => "ProtocolViolation",
            AhbError::VerifyMismatch(_) => "VerifyMismatch",
            AhbError::Timeout(_) => "Timeout",
            AhbError::AlreadyInState(_) => "AlreadyInState",
        }
    }

    fn detail(&self) -> &str {
        match self {
            AhbError::NotSupported(s)
            | AhbError::InvalidArgument(s)
            | AhbError::PermissionDenied(s)
            | AhbError::IoFailure(s)
            | AhbError::ProtocolViolation(s)
            | AhbError::VerifyMismatch(s)
            | AhbError::Timeout(s)
            | AhbError::AlreadyInState(s) => s,
        }
    }
}

impl fmt::Display for AhbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tag(), self.detail())
    }
}

impl std::error::Error for AhbError {}

impl From<std::io::Error> for AhbError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                AhbError::PermissionDenied(format!("{e}"))
            }
            std::io::ErrorKind::TimedOut => AhbError::Timeout(format!("{e}")),
            std::io::ErrorKind::UnexpectedEof => {
                AhbError::IoFailure(format!("short read: {e}"))
            }
            _ => AhbError::IoFailure(format!("{e}")),
        }
    }
}

/// Ordered bridge accessibility: `Permissive < Restricted < Disabled`.
///
/// Declaration order is the strictness order; derived `Ord` falls out of
/// it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BridgeMode {
    Permissive,
    Restricted,
    Disabled,
}

impl fmt::Display for BridgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BridgeMode::Permissive => "Read-write",
            BridgeMode::Restricted => "Read-only",
            BridgeMode::Disabled => "Disabled",
        };
        f.write_str(s)
    }
}

/// One of the five per-bridge interface states the probe pipeline reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    Unknown,
    Absent,
    Enabled,
    Disabled,
}

impl fmt::Display for InterfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterfaceState::Unknown => "Unknown",
            InterfaceState::Absent => "Absent",
            InterfaceState::Enabled => "Enabled",
            InterfaceState::Disabled => "Disabled",
        };
        f.write_str(s)
    }
}

/// A named sub-range of a bridge's address space, e.g. one of P2A's SCU
/// write-filter regions or the iLPC master window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeDescriptor {
    pub name: &'static str,
    pub start: Phys,
    pub length: u32,
    pub read_write: bool,
}

impl RangeDescriptor {
    pub const fn new(name: &'static str, start: Phys, length: u32, read_write: bool) -> Self {
        RangeDescriptor {
            name,
            start,
            length,
            read_write,
        }
    }

    pub fn end(&self) -> Phys {
        self.start.wrapping_add(self.length)
    }
}

/// The four primitive operations every bridge transport must implement,
/// plus the two optional reset-survival hooks (§4.1, §4.9).
///
/// Drivers that do not mirror any hardware state in software simply accept
/// the default, no-op `release`/`reinit`.
pub trait AhbOps: Send {
    fn read(&mut self, phys: Phys, buf: &mut [u8]) -> Result<usize, AhbError>;
    fn write(&mut self, phys: Phys, buf: &[u8]) -> Result<usize, AhbError>;
    fn readl(&mut self, phys: Phys) -> Result<u32, AhbError>;
    fn writel(&mut self, phys: Phys, value: u32) -> Result<(), AhbError>;

    /// Called immediately before a reset that will clobber this transport's
    /// mirror of its own window registers.
    fn release(&mut self) -> Result<(), AhbError> {
        Ok(())
    }

    /// Called after such a reset, to resynchronise any software-cached
    /// register mirror with hardware.
    fn reinit(&mut self) -> Result<(), AhbError> {
        Ok(())
    }
}

const SIPHON_CHUNK: usize = 1024 * 1024;

/// An active bridge transport: a driver's name, its "runs on the BMC
/// itself" flag, and the vtable of operations it implements.
///
/// Exactly one `AhbHandle` is "current" for a given SoC session. The
/// vtable (`ops`) is never null while the handle is live — in Rust terms,
/// `ops` is simply owned for the handle's whole lifetime.
pub struct AhbHandle {
    name: &'static str,
    local: bool,
    ops: Box<dyn AhbOps>,
}

impl AhbHandle {
    pub fn new(name: &'static str, local: bool, ops: Box<dyn AhbOps>) -> Self {
        AhbHandle { name, local, ops }
    }

    /// Driver name, e.g. `"ilpc"`, `"p2a"`, `"devmem"`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if this handle runs on the BMC itself (the `devmem` transport).
    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn read(&mut self, phys: Phys, buf: &mut [u8]) -> Result<usize, AhbError> {
        self.ops.read(phys, buf)
    }

    pub fn write(&mut self, phys: Phys, buf: &[u8]) -> Result<usize, AhbError> {
        self.ops.write(phys, buf)
    }

    pub fn readl(&mut self, phys: Phys) -> Result<u32, AhbError> {
        self.ops.readl(phys)
    }

    pub fn writel(&mut self, phys: Phys, value: u32) -> Result<(), AhbError> {
        self.ops.writel(phys, value)
    }

    pub fn release(&mut self) -> Result<(), AhbError> {
        self.ops.release()
    }

    pub fn reinit(&mut self) -> Result<(), AhbError> {
        self.ops.reinit()
    }

    /// Copies `len` bytes from BMC memory starting at `phys` to `sink`, in
    /// 1 MiB chunks. Every delivered byte is written to completion even if
    /// the sink reports short writes. Fails on the first transport error or
    /// sink error; progress made before the failure is not rolled back.
    pub fn siphon_in(
        &mut self,
        phys: Phys,
        len: u64,
        sink: &mut dyn Write,
    ) -> Result<u64, AhbError> {
        let mut addr = phys;
        let mut remaining = len;
        let mut total = 0u64;
        let mut buf = vec![0u8; SIPHON_CHUNK];
        while remaining > 0 {
            let chunk = remaining.min(SIPHON_CHUNK as u64) as usize;
            let got = self.read(addr, &mut buf[..chunk])?;
            if got == 0 {
                return Err(AhbError::io("transport returned zero bytes"));
            }
            let mut written = 0;
            while written < got {
                let n = sink.write(&buf[written..got])?;
                if n == 0 {
                    return Err(AhbError::io("sink accepted zero bytes"));
                }
                written += n;
            }
            addr = addr.wrapping_add(got as u32);
            remaining -= got as u64;
            total += got as u64;
        }
        Ok(total)
    }

    /// Reads from `source` in 1 MiB chunks until EOF, writing each chunk to
    /// BMC memory starting at `phys`.
    pub fn siphon_out(&mut self, phys: Phys, source: &mut dyn Read) -> Result<u64, AhbError> {
        let mut addr = phys;
        let mut total = 0u64;
        let mut buf = vec![0u8; SIPHON_CHUNK];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.write(addr, &buf[..n])?;
            addr = addr.wrapping_add(n as u32);
            total += n as u64;
        }
        Ok(total)
    }
}

impl fmt::Debug for AhbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AhbHandle")
            .field("name", &self.name)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct MemAhb {
        mem: Vec<u8>,
    }

    impl AhbOps for MemAhb {
        fn read(&mut self, phys: Phys, buf: &mut [u8]) -> Result<usize, AhbError> {
            let start = phys as usize;
            let n = buf.len().min(self.mem.len().saturating_sub(start));
            buf[..n].copy_from_slice(&self.mem[start..start + n]);
            Ok(n)
        }

        fn write(&mut self, phys: Phys, buf: &[u8]) -> Result<usize, AhbError> {
            let start = phys as usize;
            if start + buf.len() > self.mem.len() {
                self.mem.resize(start + buf.len(), 0);
            }
            self.mem[start..start + buf.len()].copy_from_slice(buf);
            Ok(buf.len())
        }

        fn readl(&mut self, phys: Phys) -> Result<u32, AhbError> {
            let mut b = [0u8; 4];
            self.read(phys, &mut b)?;
            Ok(u32::from_le_bytes(b))
        }

        fn writel(&mut self, phys: Phys, value: u32) -> Result<(), AhbError> {
            self.write(phys, &value.to_le_bytes())?;
            Ok(())
        }
    }

    fn handle(len: usize) -> AhbHandle {
        AhbHandle::new("mem", true, Box::new(MemAhb { mem: vec![0; len] }))
    }

    #[test]
    fn readl_writel_round_trip() {
        let mut h = handle(64);
        h.writel(0x10, 0xdead_beef).unwrap();
        assert_eq!(h.readl(0x10).unwrap(), 0xdead_beef);
    }

    #[test]
    fn siphon_in_copies_all_bytes_in_chunks_larger_than_source() {
        let mut h = handle(16);
        h.write(0, b"0123456789abcdef").unwrap();
        let mut out = Cursor::new(Vec::new());
        let n = h.siphon_in(0, 16, &mut out).unwrap();
        assert_eq!(n, 16);
        assert_eq!(out.into_inner(), b"0123456789abcdef");
    }

    #[test]
    fn siphon_out_reads_until_eof() {
        let mut h = handle(16);
        let mut src = Cursor::new(b"0123456789abcdef".to_vec());
        let n = h.siphon_out(0, &mut src).unwrap();
        assert_eq!(n, 16);
        let mut buf = [0u8; 16];
        h.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"0123456789abcdef");
    }

    #[test]
    fn bridge_mode_strictness_ordering() {
        assert!(BridgeMode::Permissive < BridgeMode::Restricted);
        assert!(BridgeMode::Restricted < BridgeMode::Disabled);
    }
}
