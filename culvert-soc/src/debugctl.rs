//! Bridge controller for the debug UART's AHB access. The debug UART has no
//! restricted mode — anything short of disabled is treated as permissive.
//! Grounded on `src/soc/debugctl.c`.

use culvert_dt::DtNodeRef;

use crate::bridgectl::{log_status, BridgeController};
use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};
use culvert_ahb::BridgeMode;

const SCU_MISC: u32 = 0x02c;
const SCU_MISC_UART_DBG: u32 = 1 << 10;
const SCU_STRAP: u32 = 0x070;
const SCU_STRAP_DBG_SEL: u32 = 1 << 29;

pub struct DebugCtl {
    scu: SocRegion,
}

impl BridgeController for DebugCtl {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn enforce(&self, soc: &mut Soc, mode: BridgeMode) -> Result<(), SocError> {
        let mut misc = soc.readl(self.scu.start + SCU_MISC)?;

        if mode == BridgeMode::Disabled {
            misc |= SCU_MISC_UART_DBG;
        } else {
            misc &= !SCU_MISC_UART_DBG;
        }

        soc.writel(self.scu.start + SCU_MISC, misc)
    }

    fn status(&self, soc: &mut Soc) -> Result<BridgeMode, SocError> {
        let misc = soc.readl(self.scu.start + SCU_MISC)?;
        Ok(if misc & SCU_MISC_UART_DBG != 0 {
            BridgeMode::Disabled
        } else {
            BridgeMode::Permissive
        })
    }

    fn report(&self, soc: &mut Soc) -> Result<BridgeMode, SocError> {
        let mode = self.status(soc)?;
        log_status(self.name(), mode);

        if mode == BridgeMode::Disabled {
            return Ok(mode);
        }

        let strap = soc.readl(self.scu.start + SCU_STRAP)?;
        let port = if strap & SCU_STRAP_DBG_SEL != 0 { "UART5" } else { "UART1" };
        log::info!("\tDebug UART port: {port}");

        Ok(mode)
    }
}

pub struct DebugCtlDriver;

impl SocDriver for DebugCtlDriver {
    fn name(&self) -> &'static str {
        "debugctl"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2500-debug-ahb-bridge"]
    }

    fn init(
        &self,
        soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let scu = device_memory(node)?;
        soc.register_bridge_controller(Box::new(DebugCtl { scu }));
        Ok(Box::new(()))
    }
}
