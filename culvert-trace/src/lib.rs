//! The `trace` command's orchestration: validate the watch parameters,
//! start the AHBC bus recorder, and on request stop it and dump its
//! contents. Grounded on `src/cmd/trace.c`'s `cmd_trace`.
//!
//! The actual SIGINT wait belongs to the CLI layer (`culvert-cli`, which
//! carries `ctrlc`): this crate only exposes the three phases `cmd_trace`
//! sequences around it — `start`, then (after whatever the caller is
//! waiting on) `stop_and_dump`.

use std::fmt;
use std::io::Write;

use culvert_soc::{Soc, SocError, Trace, TraceMode};

#[derive(Debug, Clone)]
pub struct TraceError(SocError);

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TraceError {}

impl From<SocError> for TraceError {
    fn from(e: SocError) -> Self {
        TraceError(e)
    }
}

/// The width/alignment check `cmd_trace` runs before calling
/// `trace_start`. Parsing the CLI's `WIDTH:OFFSET` argument itself is the
/// caller's job; `width` arrives already split out here.
fn validate(addr: u32, width: u32) -> Result<(), TraceError> {
    if width != 1 && width != 2 && width != 4 {
        return Err(SocError::InvalidArgument(format!("invalid trace access width: {width}")).into());
    }
    if addr & (width - 1) != 0 {
        return Err(SocError::InvalidArgument("trace address must be aligned to the access width".into()).into());
    }
    Ok(())
}

/// A started trace, holding the driver handle needed to stop and dump it.
pub struct TraceSession {
    trace: Trace,
}

impl TraceSession {
    /// Looks up the SoC's trace driver and arms it to watch `addr` for
    /// `width`-byte accesses in `mode`.
    pub fn start(soc: &mut Soc, addr: u32, width: u32, mode: TraceMode) -> Result<Self, TraceError> {
        validate(addr, width)?;

        let trace = soc
            .driver_get_drvdata::<Trace>("trace")
            .copied()
            .ok_or_else(|| SocError::NoDriver("trace".into()))?;

        trace.start(soc, addr, width, mode)?;

        Ok(TraceSession { trace })
    }

    /// Stops the recorder and writes its captured contents to `sink` in
    /// little-endian byte order, returning the byte count written.
    pub fn stop_and_dump(self, soc: &mut Soc, sink: &mut dyn Write) -> Result<u64, TraceError> {
        self.trace.stop(soc)?;
        Ok(self.trace.dump(soc, sink)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_widths() {
        assert!(validate(0, 3).is_err());
        assert!(validate(0, 1).is_ok());
        assert!(validate(0, 2).is_ok());
        assert!(validate(0, 4).is_ok());
    }

    #[test]
    fn rejects_misaligned_address() {
        assert!(validate(0x1e788002, 4).is_err());
        assert!(validate(0x1e788002, 2).is_ok());
    }
}
