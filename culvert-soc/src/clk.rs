//! Clock source queries and the ARM CPU clock-gate toggle. Grounded on
//! `clk.c`: like the original, this driver matches the SCU node directly
//! rather than going through [`crate::Scu`] — it only ever touches the
//! HW-strapping and silicon-revision registers.

use culvert_dt::DtNodeRef;

use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

const SCU_HW_STRAP: u32 = 0x070;
const SCU_HW_STRAP_ARM_CLK: u32 = 1 << 0;
const SCU_SILICON_REVISION: u32 = 0x07c;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClkSource {
    Ahb,
    Arm,
}

/// Copy so dependents (`wdt`) can pull their own value out of
/// [`Soc::driver_get_drvdata`] before taking the `&mut Soc` borrow its
/// methods need.
#[derive(Debug, Clone, Copy)]
pub struct Clk {
    scu: SocRegion,
}

impl Clk {
    fn readl(&self, soc: &mut Soc, reg: u32) -> Result<u32, SocError> {
        soc.readl(self.scu.start + reg)
    }

    /// Derives the AHB bus clock from the HW-strapping register: CPU
    /// frequency selected by strap bits [9:8] (two tables depending on the
    /// 24/48 MHz vs 25 MHz reference bit), divided by the AHB divisor in
    /// bits [11:10].
    pub fn rate(&self, soc: &mut Soc, src: ClkSource) -> Result<i64, SocError> {
        if src != ClkSource::Ahb {
            return Err(SocError::NotSupported("only clk_ahb rate queries are supported".into()));
        }

        const CPU_FREQS_24_48: [u32; 4] = [384_000_000, 360_000_000, 336_000_000, 408_000_000];
        const CPU_FREQS_25: [u32; 4] = [400_000_000, 375_000_000, 350_000_000, 425_000_000];
        const AHB_DIV: [u32; 4] = [1, 2, 4, 3];

        let strap = self.readl(soc, SCU_HW_STRAP)?;
        let cpu_clk = if strap & 0x0080_0000 != 0 {
            CPU_FREQS_25[((strap >> 8) & 3) as usize]
        } else {
            CPU_FREQS_24_48[((strap >> 8) & 3) as usize]
        };
        let div = AHB_DIV[((strap >> 10) & 3) as usize];

        Ok((cpu_clk / div) as i64)
    }

    pub fn disable(&self, soc: &mut Soc, src: ClkSource) -> Result<(), SocError> {
        if src != ClkSource::Arm {
            return Err(SocError::NotSupported("only clk_arm can be gated".into()));
        }
        soc.writel(self.scu.start + SCU_HW_STRAP, SCU_HW_STRAP_ARM_CLK)
    }

    /// Clears the (sticky-on-reset) ARM clock gate.
    pub fn enable(&self, soc: &mut Soc, src: ClkSource) -> Result<(), SocError> {
        if src != ClkSource::Arm {
            return Err(SocError::NotSupported("only clk_arm can be gated".into()));
        }
        soc.writel(self.scu.start + SCU_SILICON_REVISION, SCU_HW_STRAP_ARM_CLK)
    }
}

pub struct ClkDriver;

impl SocDriver for ClkDriver {
    fn name(&self) -> &'static str {
        "clk"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2400-scu", "aspeed,ast2500-scu", "aspeed,ast2600-scu"]
    }

    fn init(
        &self,
        _soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let scu = device_memory(node)?;
        Ok(Box::new(Clk { scu }))
    }
}
