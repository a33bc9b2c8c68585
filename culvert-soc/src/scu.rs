//! The system control unit register block. Almost every other peripheral
//! driver depends on `Scu` for cross-cutting register access. Grounded on
//! `src/soc/scu.c`.

use culvert_dt::DtNodeRef;

use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

/// Copy so dependents can pull their own value out of
/// [`Soc::driver_get_drvdata`] before taking the `&mut Soc` borrow its
/// methods need.
#[derive(Debug, Clone, Copy)]
pub struct Scu {
    regs: SocRegion,
}

impl Scu {
    pub fn readl(&self, soc: &mut Soc, reg: u32) -> Result<u32, SocError> {
        soc.readl(self.regs.start + reg)
    }

    pub fn writel(&self, soc: &mut Soc, reg: u32, value: u32) -> Result<(), SocError> {
        soc.writel(self.regs.start + reg, value)
    }
}

pub struct ScuDriver;

impl SocDriver for ScuDriver {
    fn name(&self) -> &'static str {
        "scu"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2400-scu", "aspeed,ast2500-scu", "aspeed,ast2600-scu"]
    }

    fn init(
        &self,
        _soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let regs = device_memory(node)?;
        Ok(Box::new(Scu { regs }))
    }
}
