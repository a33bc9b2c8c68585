//! Bridge controller for the legacy iLPC-to-AHB bridge: disabling it means
//! disabling SuperIO decode altogether, and re-enabling always routes
//! decoding to the fixed 0x2e port (the original's `FIXME` on configurable
//! routing is carried over unchanged). Grounded on `src/soc/ilpcctl.c`.

use culvert_dt::DtNodeRef;

use crate::bridgectl::{log_status, BridgeController};
use crate::sioctl::{Sioctl, SioctlDecode};
use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};
use culvert_ahb::BridgeMode;

const LPC_HICRB: u32 = 0x100;
const LPC_HICRB_ILPC_RO: u32 = 1 << 6;

pub struct IlpcCtl {
    lpc: SocRegion,
    sioctl: Sioctl,
}

impl BridgeController for IlpcCtl {
    fn name(&self) -> &'static str {
        "ilpc"
    }

    fn enforce(&self, soc: &mut Soc, mode: BridgeMode) -> Result<(), SocError> {
        if mode == BridgeMode::Disabled {
            return self.sioctl.configure(soc, SioctlDecode::Disable);
        }

        let mut hicrb = soc.readl(self.lpc.start + LPC_HICRB)?;
        if mode == BridgeMode::Restricted {
            hicrb |= LPC_HICRB_ILPC_RO;
        } else {
            hicrb &= !LPC_HICRB_ILPC_RO;
        }
        soc.writel(self.lpc.start + LPC_HICRB, hicrb)?;

        // Configurable routing isn't wired up yet; 0x2e is hardcoded.
        self.sioctl.configure(soc, SioctlDecode::Port0x2e)
    }

    fn status(&self, soc: &mut Soc) -> Result<BridgeMode, SocError> {
        if self.sioctl.status(soc)? == SioctlDecode::Disable {
            return Ok(BridgeMode::Disabled);
        }

        let hicrb = soc.readl(self.lpc.start + LPC_HICRB)?;
        Ok(if hicrb & LPC_HICRB_ILPC_RO != 0 {
            BridgeMode::Restricted
        } else {
            BridgeMode::Permissive
        })
    }

    fn report(&self, soc: &mut Soc) -> Result<BridgeMode, SocError> {
        let mode = self.status(soc)?;
        log_status(self.name(), mode);
        Ok(mode)
    }
}

pub struct IlpcCtlDriver;

impl SocDriver for IlpcCtlDriver {
    fn name(&self) -> &'static str {
        "ilpcctl"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2400-ilpc-ahb-bridge", "aspeed,ast2500-ilpc-ahb-bridge"]
    }

    fn init(
        &self,
        soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let lpc = device_memory(node)?;
        let sioctl = soc
            .driver_get_drvdata::<Sioctl>("sioctl")
            .copied()
            .ok_or_else(|| SocError::NoDriver("sioctl".into()))?;

        soc.register_bridge_controller(Box::new(IlpcCtl { lpc, sioctl }));

        Ok(Box::new(()))
    }
}
