//! Watchdog-timer driven SoC reset, and the `wdt_prevent_reset` dance that
//! stops every instance so a session doesn't get its AHB bridge yanked out
//! from under it. Grounded on `src/soc/wdt.c`.
//!
//! `WDT_RESET_MASK` (`0x1c`) is a register *offset* — the reset-domain
//! control register — not a named constant for the value written to it;
//! `0x23ffffb` is the literal "reset everything except SPI/XDMA/MCTP/SDRAM"
//! mask the original writes there.

use std::thread;
use std::time::Duration;

use culvert_dt::DtNodeRef;

use crate::clk::{Clk, ClkSource};
use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

const WDT_RELOAD: u32 = 0x04;
const WDT_RESTART: u32 = 0x08;
const WDT_RESTART_MAGIC: u32 = 0x4755;
const WDT_CTRL: u32 = 0x0c;
const WDT_CTRL_ALT_BOOT: u32 = 1 << 7;
const WDT_CTRL_RESET_SOC: u32 = 0b00 << 5;
const WDT_CTRL_CLK_1MHZ: u32 = 1 << 4;
const WDT_CTRL_SYS_RESET: u32 = 1 << 1;
const WDT_CTRL_ENABLE: u32 = 1 << 0;
const WDT_RESET_MASK: u32 = 0x1c;
const WDT_RESET_DOMAIN: u32 = 0x023f_ffb;

const AST_WDT_MAX: usize = 3;

/// Copy so `prevent_reset` can hold its own value of each instance rather
/// than borrowing `Soc::driver_get_drvdata_by_name`'s reference across
/// `&mut Soc` calls.
#[derive(Clone, Copy)]
pub struct Wdt {
    iomem: SocRegion,
    clk: Clk,
}

impl Wdt {
    fn readl(&self, soc: &mut Soc, reg: u32) -> Result<u32, SocError> {
        let val = soc.readl(self.iomem.start + reg)?;
        log::trace!("wdt_readl: base {:#010x}, reg {reg:#04x}, val {val:#010x}", self.iomem.start);
        Ok(val)
    }

    fn writel(&self, soc: &mut Soc, reg: u32, val: u32) -> Result<(), SocError> {
        log::trace!("wdt_writel: base {:#010x}, reg {reg:#04x}, val {val:#010x}", self.iomem.start);
        soc.writel(self.iomem.start + reg, val)
    }

    pub fn stop(&self, soc: &mut Soc) -> Result<(), SocError> {
        let mut val = self.readl(soc, WDT_CTRL)?;
        val &= !WDT_CTRL_ENABLE;
        self.writel(soc, WDT_CTRL, val)
    }

    fn config_clksrc(&self, soc: &mut Soc) -> Result<(), SocError> {
        let mut val = self.readl(soc, WDT_CTRL)?;
        val |= WDT_CTRL_CLK_1MHZ;
        self.writel(soc, WDT_CTRL, val)
    }

    /// Only the 1MHz clock source is supported — no PCLK scraping via SCU.
    fn usecs_to_ticks(&self, soc: &mut Soc, usecs: u32) -> Result<u32, SocError> {
        let val = self.readl(soc, WDT_CTRL)?;
        if val & WDT_CTRL_CLK_1MHZ == 0 {
            return Err(SocError::NotSupported("wdt: PCLK source unsupported".into()));
        }
        Ok(usecs)
    }

    /// Stops the timer, reprograms it to reset everything except SPI/XDMA/
    /// MCTP/SDRAM, releases the AHB bridge for the duration of the reset,
    /// waits it out, then reinitializes the bridge and clears the ARM clock
    /// gate left stuck by the reset.
    pub fn perform_reset(&self, soc: &mut Soc) -> Result<(), SocError> {
        self.stop(soc)?;
        self.config_clksrc(soc)?;

        // Reset everything except SPI, X-DMA, MCTP and SDRAM; explicitly
        // resets the AHB bridges.
        self.writel(soc, WDT_RESET_MASK, WDT_RESET_DOMAIN)?;

        // Wait enough time to cover using the debug UART for a reset.
        let wait = self.usecs_to_ticks(soc, 5_000_000)?;

        self.writel(soc, WDT_RELOAD, wait)?;
        self.writel(soc, WDT_RESTART, WDT_RESTART_MAGIC)?;

        let mut mode = self.readl(soc, WDT_CTRL)?;
        mode |= WDT_CTRL_RESET_SOC | WDT_CTRL_SYS_RESET | WDT_CTRL_ENABLE;
        mode &= !WDT_CTRL_ALT_BOOT;
        self.writel(soc, WDT_CTRL, mode)?;

        soc.ahb().release()?;

        // Allow a little extra time for reset to occur (we're timing this
        // asynchronously after all) before reinitializing the bridge.
        let wait = wait as u64 + 1_000_000;
        log::debug!("Waiting {wait} microseconds for watchdog timer to expire");
        thread::sleep(Duration::from_micros(wait));

        soc.ahb().reinit()?;

        // The ARM clock gate is sticky on reset?! Ensure it's clear.
        self.clk.enable(soc, ClkSource::Arm)?;

        self.writel(soc, WDT_RELOAD, 0)
    }
}

pub struct WdtDriver;

impl SocDriver for WdtDriver {
    fn name(&self) -> &'static str {
        "wdt"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2500-wdt"]
    }

    fn multi_instance(&self) -> bool {
        true
    }

    fn init(
        &self,
        soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let iomem = device_memory(node)?;
        let clk = soc
            .driver_get_drvdata::<Clk>("clk")
            .copied()
            .ok_or_else(|| SocError::NoDriver("clk".into()))?;
        Ok(Box::new(Wdt { iomem, clk }))
    }
}

/// Stops every `wdt1`..`wdt3` instance so a discovery session's control of
/// the AHB bridge can't be cut out from under it by a stray watchdog.
pub fn prevent_reset(soc: &mut Soc) -> Result<(), SocError> {
    for i in 1..=AST_WDT_MAX {
        let name = format!("wdt{i}");
        let wdt = soc
            .driver_get_drvdata_by_name::<Wdt>("wdt", &name)
            .copied()
            .ok_or_else(|| SocError::NoDriver(name.clone()))?;
        wdt.stop(soc)?;
    }
    Ok(())
}
