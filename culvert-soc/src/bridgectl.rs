//! The bridge-controller registry: the uniform surface `culvert-discovery`'s
//! probe/enforce pipeline and `culvert-reset` drive to lock AHB access down
//! before handing control to the host. Grounded on `src/soc/bridgectl.c`/`.h`.
//!
//! The original logs status lines with ANSI colour keyed off `bridge_mode`
//! (red/yellow/green for permissive/restricted/disabled); the rest of this
//! codebase reports state through `log` levels instead of colour codes, so
//! `log_status` follows that convention rather than carrying the colour
//! table over.

use culvert_ahb::BridgeMode;

use crate::{Soc, SocError};

/// A single bridge transport's access-control surface. `culvert_ahb::BridgeMode`
/// is reused directly — its three variants and ordering match `bm_permissive`/
/// `bm_restricted`/`bm_disabled` exactly.
pub trait BridgeController: Send + Sync {
    fn name(&self) -> &'static str;
    fn enforce(&self, soc: &mut Soc, mode: BridgeMode) -> Result<(), SocError>;
    fn status(&self, soc: &mut Soc) -> Result<BridgeMode, SocError>;

    /// Logs a human-readable summary of the current access-control state.
    /// Delegates to [`log_status`] by default; controllers needing extra
    /// detail (the P2A/XDMA region tables, e.g.) override this.
    fn report(&self, soc: &mut Soc) -> Result<BridgeMode, SocError> {
        let mode = self.status(soc)?;
        log_status(self.name(), mode);
        Ok(mode)
    }
}

pub fn log_status(name: &str, mode: BridgeMode) {
    match mode {
        BridgeMode::Permissive => log::warn!("{name}:\t{mode}"),
        BridgeMode::Restricted => log::info!("{name}:\t{mode}"),
        BridgeMode::Disabled => log::debug!("{name}:\t{mode}"),
    }
}
