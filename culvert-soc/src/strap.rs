//! HW-strapping register access, generation-specific because AST2400 uses
//! two strap registers (read-modify-write) while AST2500 treats the second
//! register as write-1-to-clear. Grounded on `src/soc/strap.c`.

use culvert_dt::DtNodeRef;

use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

const AST2400_SCU_HW_STRAP1: u32 = 0x070;
const AST2400_SCU_HW_STRAP2: u32 = 0x0d0;
const AST2500_SCU_HW_STRAP: u32 = 0x070;
const AST2500_SCU_SILICON_ID: u32 = 0x07c;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrapKind {
    Ast2400,
    Ast2500,
}

/// Copy so dependents can pull their own value out of [`Soc::driver_get_drvdata`]
/// (`let strap = *soc.driver_get_drvdata::<Strap>("strap")?;`) before taking
/// the `&mut Soc` borrow its methods need — holding the borrowed reference
/// across that call would conflict with it.
#[derive(Debug, Clone, Copy)]
pub struct Strap {
    scu: SocRegion,
    kind: StrapKind,
}

impl Strap {
    fn readl(&self, soc: &mut Soc, reg: u32) -> Result<u32, SocError> {
        soc.readl(self.scu.start + reg)
    }

    fn writel(&self, soc: &mut Soc, reg: u32, value: u32) -> Result<(), SocError> {
        soc.writel(self.scu.start + reg, value)
    }

    fn valid_reg(&self, reg: u32) -> bool {
        match self.kind {
            StrapKind::Ast2400 => reg == AST2400_SCU_HW_STRAP1 || reg == AST2400_SCU_HW_STRAP2,
            StrapKind::Ast2500 => reg == AST2500_SCU_HW_STRAP,
        }
    }

    pub fn read(&self, soc: &mut Soc, reg: u32) -> Result<u32, SocError> {
        if !self.valid_reg(reg) {
            return Err(SocError::InvalidArgument(format!("unsupported strap register {reg:#x}")));
        }
        self.readl(soc, reg)
    }

    pub fn set(&self, soc: &mut Soc, reg: u32, update: u32, mask: u32) -> Result<(), SocError> {
        if !self.valid_reg(reg) || (update & !mask) != 0 {
            return Err(SocError::InvalidArgument("invalid strap update/mask".into()));
        }
        match self.kind {
            StrapKind::Ast2400 => {
                let mut val = self.readl(soc, reg)?;
                val |= update;
                self.writel(soc, reg, val)
            }
            StrapKind::Ast2500 => self.writel(soc, reg, update),
        }
    }

    pub fn clear(&self, soc: &mut Soc, reg: u32, update: u32, mask: u32) -> Result<(), SocError> {
        if !self.valid_reg(reg) || (update & !mask) != 0 {
            return Err(SocError::InvalidArgument("invalid strap update/mask".into()));
        }
        match self.kind {
            StrapKind::Ast2400 => {
                let mut val = self.readl(soc, reg)?;
                val &= !update;
                self.writel(soc, reg, val)
            }
            // The silicon-ID register is write-1-to-clear for the strap bits.
            StrapKind::Ast2500 => self.writel(soc, AST2500_SCU_SILICON_ID, update),
        }
    }
}

pub struct StrapDriver;

impl SocDriver for StrapDriver {
    fn name(&self) -> &'static str {
        "strap"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2400-strapping", "aspeed,ast2500-strapping"]
    }

    fn init(
        &self,
        _soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let scu = device_memory(node)?;
        let kind = if node.name().contains("2400") || node_is(node, "aspeed,ast2400-strapping") {
            StrapKind::Ast2400
        } else {
            StrapKind::Ast2500
        };
        Ok(Box::new(Strap { scu, kind }))
    }
}

fn node_is(node: &DtNodeRef, compatible: &str) -> bool {
    node.property_str("compatible").map(|s| s == compatible).unwrap_or(false)
}
