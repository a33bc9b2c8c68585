//! The discovery & enablement pipeline (§4.8): find a usable AHB transport,
//! probe the SoC over it, and report (or require) the bridge controllers'
//! aggregate protection level.
//!
//! Grounded on `src/cmd/probe.c`'s `cmd_probe`: `host_init` to attach every
//! available bridge transport, take the first one, `soc_probe` over it, then
//! either list the registered controllers or probe/report them and compare
//! the discovered mode against a caller-supplied requirement.

use std::fmt;

use culvert_ahb::{AhbError, BridgeMode};
use culvert_bridge::{HostRegistry, ProbeArgs};
use culvert_soc::{Soc, SocError};

#[derive(Debug, Clone)]
pub enum DiscoveryError {
    NoTransport,
    Ahb(AhbError),
    Soc(SocError),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NoTransport => write!(f, "failed to acquire an AHB interface"),
            DiscoveryError::Ahb(e) => write!(f, "{e}"),
            DiscoveryError::Soc(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<AhbError> for DiscoveryError {
    fn from(e: AhbError) -> Self {
        DiscoveryError::Ahb(e)
    }
}

impl From<SocError> for DiscoveryError {
    fn from(e: SocError) -> Self {
        DiscoveryError::Soc(e)
    }
}

/// A probed SoC session: every bridge transport that attached, plus the
/// driver framework built against whichever one was selected.
pub struct Discovery {
    host: HostRegistry,
    soc: Soc,
}

impl Discovery {
    /// Attaches every bridge transport that's present (§4.2), picks one
    /// (`prefer` selects by name, e.g. `"p2a"`; `None` takes the first that
    /// attached), and probes the SoC's driver framework over it.
    ///
    /// `devicetree` is the flattened devicetree blob describing this SoC's
    /// peripherals. The original links one compiled-in blob per silicon
    /// generation at build time; this crate has no equivalent build step; the
    /// caller (`culvert-cli`) is responsible for supplying the right blob,
    /// typically read from a file path or `CULVERT_DTB` at startup.
    pub fn probe(args: &ProbeArgs, prefer: Option<&str>, devicetree: Vec<u8>) -> Result<Self, DiscoveryError> {
        let mut host = HostRegistry::init(args);

        let ahb = host.take_ahb(prefer).ok_or(DiscoveryError::NoTransport)?;
        let soc = Soc::probe(ahb, devicetree)?;

        Ok(Discovery { host, soc })
    }

    pub fn soc(&mut self) -> &mut Soc {
        &mut self.soc
    }

    pub fn host(&mut self) -> &mut HostRegistry {
        &mut self.host
    }

    /// Names of every registered bridge controller, for `probe
    /// --list-interfaces`.
    pub fn list_bridge_controllers(&self) -> Vec<&'static str> {
        self.soc.bridge_controllers().iter().map(|b| b.name()).collect()
    }

    /// Logs each bridge controller's status (`BridgeController::report`) and
    /// returns the weakest (most permissive) mode across all of them — the
    /// same "worst protected bridge wins" aggregation
    /// [`culvert_soc::P2aCtl`]/[`culvert_soc::XdmaCtl`] use across their own
    /// per-endpoint state.
    pub fn probe_bridge_controllers(&mut self) -> Result<BridgeMode, DiscoveryError> {
        let reports = self.soc.report_bridge_controllers()?;
        let discovered = reports
            .into_iter()
            .map(|(_, mode)| mode)
            .min()
            .unwrap_or(BridgeMode::Disabled);
        Ok(discovered)
    }

    pub fn destroy(self) {
        self.soc.destroy();
        let mut host = self.host;
        host.destroy();
    }
}

/// Whether `discovered` satisfies `required` (`required <= discovered` in
/// the original): the discovered mode must be at least as strict.
pub fn satisfies(required: BridgeMode, discovered: BridgeMode) -> bool {
    required <= discovered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_requirement_is_always_satisfied() {
        assert!(satisfies(BridgeMode::Permissive, BridgeMode::Permissive));
        assert!(satisfies(BridgeMode::Permissive, BridgeMode::Restricted));
        assert!(satisfies(BridgeMode::Permissive, BridgeMode::Disabled));
    }

    #[test]
    fn confidentiality_requires_disabled() {
        assert!(!satisfies(BridgeMode::Disabled, BridgeMode::Permissive));
        assert!(!satisfies(BridgeMode::Disabled, BridgeMode::Restricted));
        assert!(satisfies(BridgeMode::Disabled, BridgeMode::Disabled));
    }

    #[test]
    fn integrity_rejects_permissive_only() {
        assert!(!satisfies(BridgeMode::Restricted, BridgeMode::Permissive));
        assert!(satisfies(BridgeMode::Restricted, BridgeMode::Restricted));
        assert!(satisfies(BridgeMode::Restricted, BridgeMode::Disabled));
    }
}
