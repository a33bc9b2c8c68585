//! The host-facing virtual UART's TX-discard control. Grounded on
//! `src/uart/vuart.c`.

use culvert_dt::DtNodeRef;

use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

const VUART_GCRA: u32 = 0x20;
const VUART_GCRA_TX_DISCARD: u32 = 1 << 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VuartDiscard {
    Enable,
    Disable,
}

#[derive(Clone, Copy)]
pub struct Vuart {
    iomem: SocRegion,
}

impl Vuart {
    pub fn set_host_tx_discard(&self, soc: &mut Soc, state: VuartDiscard) -> Result<(), SocError> {
        let mut val = soc.readl(self.iomem.start + VUART_GCRA)?;
        match state {
            VuartDiscard::Enable => val &= !VUART_GCRA_TX_DISCARD,
            VuartDiscard::Disable => val |= VUART_GCRA_TX_DISCARD,
        }
        soc.writel(self.iomem.start + VUART_GCRA, val)
    }
}

pub struct VuartDriver;

impl SocDriver for VuartDriver {
    fn name(&self) -> &'static str {
        "vuart"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2400-vuart", "aspeed,ast2500-vuart", "aspeed,ast2600-vuart"]
    }

    fn init(
        &self,
        _soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let iomem = device_memory(node)?;
        Ok(Box::new(Vuart { iomem }))
    }
}
