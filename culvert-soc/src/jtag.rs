//! Software (bitbang) JTAG master control, with the AST2400/2500-vs-AST2600
//! reset/routing register split factored into a small per-generation
//! vtable. Grounded on `src/soc/jtag.c`.
//!
//! The original reference-counts `struct jtag *` handles returned by
//! `jtag_get`/`jtag_put` since C callers each hold a raw pointer into the
//! same heap allocation; `Jtag` here is `Copy` (it only carries register
//! addresses and an enum), so callers each get their own value and there is
//! nothing to reference-count.

use culvert_dt::DtNodeRef;

use crate::scu::Scu;
use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

const AST_JTAG_EC: u32 = 0x08;
const AST_JTAG_EC_ENG_EN: u32 = 1 << 31;
const AST_JTAG_EC_ENG_OUT_EN: u32 = 1 << 30;
const AST_JTAG_EC_FORCE_TMS: u32 = 1 << 29;

const AST_JTAG_SW_MODE: u32 = 0x10;
const AST_JTAG_SW_MODE_EN: u32 = 1 << 19;
const AST_JTAG_SW_MODE_TCK: u32 = 1 << 18;
const AST_JTAG_SW_MODE_TMS: u32 = 1 << 17;
const AST_JTAG_SW_MODE_TDIO: u32 = 1 << 16;

const AST2400_SCU_RESET_CTRL: u32 = 0x04;
const AST2600_SCU_RESET_CTRL: u32 = 0x40;
const SCU_RESET_CTRL_JTAG_MASTER: u32 = 1 << 22;

const AST2400_SCU_MISC_CTRL: u32 = 0x2c;
const AST2600_SCU_MISC_CTRL: u32 = 0xc0;
const SCU_MISC_CTRL_JTAG_MASK: u32 = (1 << 15) | (1 << 14);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JtagKind {
    Ast2400,
    Ast2600,
}

#[derive(Clone, Copy)]
pub struct Jtag {
    regs: SocRegion,
    scu: Scu,
    kind: JtagKind,
}

impl Jtag {
    fn readl(&self, soc: &mut Soc, reg: u32) -> Result<u32, SocError> {
        soc.readl(self.regs.start + reg)
    }

    fn writel(&self, soc: &mut Soc, reg: u32, value: u32) -> Result<(), SocError> {
        soc.writel(self.regs.start + reg, value)
    }

    fn release(&self, soc: &mut Soc) -> Result<(), SocError> {
        match self.kind {
            JtagKind::Ast2400 => {
                let mut reg = self.scu.readl(soc, AST2400_SCU_RESET_CTRL)?;
                reg &= !SCU_RESET_CTRL_JTAG_MASTER;
                self.scu.writel(soc, AST2400_SCU_RESET_CTRL, reg)
            }
            // The peripheral clears the reset bit itself via the
            // write-1-to-set/auto-clear register at +4.
            JtagKind::Ast2600 => {
                self.scu.writel(soc, AST2600_SCU_RESET_CTRL + 4, SCU_RESET_CTRL_JTAG_MASTER)
            }
        }
    }

    fn route_register(&self) -> u32 {
        match self.kind {
            JtagKind::Ast2400 => AST2400_SCU_MISC_CTRL,
            JtagKind::Ast2600 => AST2600_SCU_MISC_CTRL,
        }
    }

    pub fn route(&self, soc: &mut Soc, route: u32) -> Result<(), SocError> {
        if route & !SCU_MISC_CTRL_JTAG_MASK != 0 {
            return Err(SocError::InvalidArgument("jtag route bits outside mask".into()));
        }

        let reg_off = self.route_register();
        let mut reg = self.scu.readl(soc, reg_off)?;
        reg &= !SCU_MISC_CTRL_JTAG_MASK;
        reg |= route;
        self.scu.writel(soc, reg_off, reg)
    }

    pub fn bitbang_set(&self, soc: &mut Soc, tck: bool, tms: bool, tdi: bool) -> Result<(), SocError> {
        let mut val = AST_JTAG_SW_MODE_EN;
        if tck {
            val |= AST_JTAG_SW_MODE_TCK;
        }
        if tms {
            val |= AST_JTAG_SW_MODE_TMS;
        }
        if tdi {
            val |= AST_JTAG_SW_MODE_TDIO;
        }
        self.writel(soc, AST_JTAG_SW_MODE, val)
    }

    pub fn bitbang_get(&self, soc: &mut Soc) -> Result<bool, SocError> {
        let reg = self.readl(soc, AST_JTAG_SW_MODE)?;
        Ok(reg & AST_JTAG_SW_MODE_TDIO != 0)
    }
}

pub struct JtagDriver;

impl SocDriver for JtagDriver {
    fn name(&self) -> &'static str {
        "jtag"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2400-jtag", "aspeed,ast2500-jtag", "aspeed,ast2600-jtag"]
    }

    fn multi_instance(&self) -> bool {
        true
    }

    fn init(
        &self,
        soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let compatible = node
            .property_str("compatible")
            .ok_or_else(|| SocError::InvalidArgument("jtag node missing compatible".into()))?;
        let kind = match compatible {
            "aspeed,ast2400-jtag" | "aspeed,ast2500-jtag" => JtagKind::Ast2400,
            "aspeed,ast2600-jtag" => JtagKind::Ast2600,
            other => return Err(SocError::InvalidArgument(format!("unrecognised jtag compatible '{other}'"))),
        };

        let regs = device_memory(node)?;
        let scu = soc
            .driver_get_drvdata::<Scu>("scu")
            .copied()
            .ok_or_else(|| SocError::NoDriver("scu".into()))?;

        let jtag = Jtag { regs, scu, kind };

        jtag.release(soc)?;
        jtag.writel(soc, AST_JTAG_EC, AST_JTAG_EC_ENG_EN | AST_JTAG_EC_ENG_OUT_EN)?;
        // Reset the JTAG master controller; the peripheral clears the bit
        // itself.
        jtag.writel(
            soc,
            AST_JTAG_EC,
            AST_JTAG_EC_ENG_EN | AST_JTAG_EC_ENG_OUT_EN | AST_JTAG_EC_FORCE_TMS,
        )?;
        jtag.writel(soc, AST_JTAG_SW_MODE, AST_JTAG_SW_MODE_EN)?;

        Ok(Box::new(jtag))
    }
}
