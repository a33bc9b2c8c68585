//! The SPI flash controller shim: register-level `cmd_rd`/`cmd_wr`/
//! `set_4b`/`direct_read` primitives over an AHB-mapped controller block
//! and a flash-aperture AHB window. Grounded on `src/sfc.c`.
//!
//! Unlike the peripheral drivers in `culvert-soc`, the controller isn't
//! looked up through the generic devicetree-match driver table: the
//! original's `sfc_init` resolves its node by name and checks its
//! compatible string directly rather than going through the
//! `soc_driver`/`AUTODATA_TYPE` registration the other peripherals use, so
//! this does the same with [`culvert_soc::Soc::dt`].

use culvert_soc::{Soc, SocError, SocRegion};

const FMC_CE_TYPE: u32 = 0x00;
const FMC_CE_TYPE_CE0_WP: u32 = 1 << 16;
const FMC_CE_TYPE_CE1_WP: u32 = 1 << 17;
const FMC_CE_TYPE_CE2_WP: u32 = 1 << 18;
const FMC_CE_CTRL: u32 = 0x04;
const FMC_CE0_CTRL: u32 = 0x10;
const FMC_TIMING: u32 = 0x94;

const SMC_CONF: u32 = 0x00;
const SMC_CE0_CTRL: u32 = 0x10;
const SMC_TIMING: u32 = 0x94;

/// Flash commands (§4.10's `flash_chip` discipline layer issues these
/// through [`Sfc::cmd_rd`]/[`Sfc::cmd_wr`]).
pub const CMD_WREN: u8 = 0x06;
pub const CMD_RDSR: u8 = 0x05;
pub const CMD_WRSR: u8 = 0x01;
pub const CMD_READ: u8 = 0x03;
pub const CMD_PP: u8 = 0x02;
pub const CMD_SE: u8 = 0x20;
pub const CMD_BE32K: u8 = 0x52;
pub const CMD_BE: u8 = 0xd8;
pub const CMD_CE: u8 = 0x60;
pub const CMD_RDID: u8 = 0x9f;
pub const CMD_EN4B: u8 = 0xb7;
pub const CMD_EX4B: u8 = 0xe9;
pub const CMD_MIC_BULK_ERASE: u8 = 0xc7;
pub const CMD_MIC_RDFLST: u8 = 0x70;

pub const STAT_WIP: u8 = 0x01;
pub const STAT_WEN: u8 = 0x02;

/// Two physical controller instances exist: the BMC's own firmware flash
/// (`fmc`) and the host's PNOR/SPI flash bridged through the BMC (`smc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SfcType {
    Fmc,
    Smc,
}

/// The flash controller handle. Owns the live control-register mirrors
/// (`ctl_val`/`ctl_read_val`/`mode_4b`) the way `AhbHandle` owns its own
/// hardware mirrors — these must track the controller's actual state
/// across calls, so unlike the `culvert-soc` peripherals this isn't a
/// `Copy` snapshot of static config.
pub struct Sfc {
    soc_flash: SocRegion,
    iomem: SocRegion,
    ty: SfcType,
    type_reg: u32,
    type_wp_mask: u32,
    ctl_reg: u32,
    fread_timing_reg: u32,
    ctl_val: u32,
    ctl_read_val: u32,
    mode_4b: bool,
}

impl Sfc {
    /// Resolves `name` in the devicetree, matches its compatible string
    /// against the FMC/SMC controller kinds, reads its two memory
    /// regions (`reg[0]` the controller block, `reg[1]` the flash
    /// aperture), and snapshots the control register into a known-safe
    /// single-bit/HCLK-8/no-dummy-cycle/normal-read configuration —
    /// `sfc_init_device`.
    pub fn probe(soc: &mut Soc, name: &str) -> Result<Self, SocError> {
        let (ty, iomem, soc_flash) = {
            let dt = soc.dt()?;
            let node = dt.find_by_name(name)?;
            let compatible = node.property_str("compatible").unwrap_or("");
            let ty = if compatible.split('\0').any(|c| c == "aspeed,ast2500-spi") {
                SfcType::Smc
            } else if compatible.split('\0').any(|c| c == "aspeed,ast2500-fmc") {
                SfcType::Fmc
            } else {
                return Err(SocError::NoDriver(name.into()));
            };
            let (s0, l0) = node.reg(0)?;
            let (s1, l1) = node.reg(1)?;
            (ty, SocRegion { start: s0, length: l0 }, SocRegion { start: s1, length: l1 })
        };

        // Both kinds key their write-protect register off FMC_CE_TYPE —
        // preserved verbatim from the original, which never gave the SMC
        // controller its own type register.
        let (type_reg, type_wp_mask, ctl_reg, fread_timing_reg) = match ty {
            SfcType::Smc => (
                FMC_CE_TYPE,
                FMC_CE_TYPE_CE0_WP | FMC_CE_TYPE_CE1_WP | FMC_CE_TYPE_CE2_WP,
                SMC_CE0_CTRL,
                SMC_TIMING,
            ),
            SfcType::Fmc => (
                FMC_CE_TYPE,
                FMC_CE_TYPE_CE0_WP | FMC_CE_TYPE_CE1_WP,
                FMC_CE0_CTRL,
                FMC_TIMING,
            ),
        };

        let mut sfc = Sfc {
            soc_flash,
            iomem,
            ty,
            type_reg,
            type_wp_mask,
            ctl_reg,
            fread_timing_reg,
            ctl_val: 0,
            ctl_read_val: 0,
            mode_4b: false,
        };
        sfc.init_device(soc)?;
        Ok(sfc)
    }

    pub fn kind(&self) -> SfcType {
        self.ty
    }

    fn ctrl_readl(&self, soc: &mut Soc, offset: u32) -> Result<u32, SocError> {
        soc.readl(self.iomem.start + offset)
    }

    fn ctrl_writel(&self, soc: &mut Soc, offset: u32, val: u32) -> Result<(), SocError> {
        soc.writel(self.iomem.start + offset, val)
    }

    fn flash_read(&self, soc: &mut Soc, offset: u32, buf: &mut [u8]) -> Result<usize, SocError> {
        soc.read(self.soc_flash.start + offset, buf)
    }

    fn flash_write(&self, soc: &mut Soc, offset: u32, buf: &[u8]) -> Result<usize, SocError> {
        soc.write(self.soc_flash.start + offset, buf)
    }

    fn init_device(&mut self, soc: &mut Soc) -> Result<(), SocError> {
        let ctl_val = self.ctrl_readl(soc, self.ctl_reg)?;
        if ctl_val == 0xffff_ffff {
            return Err(SocError::IoFailure("sfc: controller control register unreadable".into()));
        }

        let ce_type = self.ctrl_readl(soc, self.type_reg)?;
        self.ctrl_writel(soc, self.type_reg, ce_type | (7 << 16))?;

        self.ctl_val = (0x04 << 8) | 0x00; // HCLK/8, single-bit, normal read, no dummy
        self.ctl_read_val = self.ctl_val;
        self.mode_4b = false;

        self.ctrl_writel(soc, self.ctl_reg, self.ctl_read_val)?;
        self.ctrl_writel(soc, self.fread_timing_reg, 0)
    }

    fn start_cmd(&self, soc: &mut Soc, cmd: u8) -> Result<(), SocError> {
        self.ctrl_writel(soc, self.ctl_reg, self.ctl_val | 7)?;
        self.ctrl_writel(soc, self.ctl_reg, self.ctl_val | 3)?;
        self.flash_write(soc, 0, &[cmd])?;
        Ok(())
    }

    fn end_cmd(&self, soc: &mut Soc) -> Result<(), SocError> {
        self.ctrl_writel(soc, self.ctl_reg, self.ctl_val | 7)?;
        self.ctrl_writel(soc, self.ctl_reg, self.ctl_read_val)
    }

    fn send_addr(&self, soc: &mut Soc, addr: u32) -> Result<(), SocError> {
        let be = addr.to_be_bytes();
        if self.mode_4b {
            self.flash_write(soc, 0, &be)?;
        } else {
            self.flash_write(soc, 0, &be[1..])?;
        }
        Ok(())
    }

    /// Issues `cmd` (with an optional address phase), then reads `size`
    /// bytes of reply. Reads always go through a 4-byte-wide MMIO access
    /// and are split into bytes afterwards: several bridges (P2A, the
    /// debug UART) widen sub-word reads to 4 bytes regardless of what was
    /// asked for, which would otherwise lose data in user-command mode.
    pub fn cmd_rd(&self, soc: &mut Soc, cmd: u8, addr: Option<u32>, buffer: &mut [u8]) -> Result<(), SocError> {
        let result = (|| {
            self.start_cmd(soc, cmd)?;
            if let Some(addr) = addr {
                self.send_addr(soc, addr)?;
            }
            let mut i = 0;
            let mut remaining = buffer.len();
            while remaining > 0 {
                let val = soc.readl(self.soc_flash.start)?;
                for byte in val.to_le_bytes() {
                    if remaining == 0 {
                        break;
                    }
                    buffer[i] = byte;
                    i += 1;
                    remaining -= 1;
                }
            }
            Ok(())
        })();
        self.end_cmd(soc)?;
        result
    }

    pub fn cmd_wr(&self, soc: &mut Soc, cmd: u8, addr: Option<u32>, buffer: &[u8]) -> Result<(), SocError> {
        let result = (|| {
            self.start_cmd(soc, cmd)?;
            if let Some(addr) = addr {
                self.send_addr(soc, addr)?;
            }
            if !buffer.is_empty() {
                self.flash_write(soc, 0, buffer)?;
            }
            Ok(())
        })();
        self.end_cmd(soc)?;
        result
    }

    /// Switches the controller (and, via the caller's `CMD_EN4B`/`CMD_EX4B`
    /// at the chip layer, the flash chip itself) between 3-byte and
    /// 4-byte addressing. Only meaningful on the FMC controller with a
    /// flash chip larger than 16 MiB; a no-op on SMC.
    pub fn set_4b(&mut self, soc: &mut Soc, enable: bool, flash_over_16m: bool) -> Result<(), SocError> {
        let mut ce_ctrl = 0u32;
        match self.ty {
            SfcType::Fmc if flash_over_16m => {
                ce_ctrl = self.ctrl_readl(soc, FMC_CE_CTRL)?;
            }
            SfcType::Smc => {}
            SfcType::Fmc => {
                return if enable { Err(SocError::IoFailure("sfc: flash too small for 4B mode".into())) } else { Ok(()) };
            }
        }

        if enable {
            self.ctl_val |= 0x2000;
            self.ctl_read_val |= 0x2000;
            ce_ctrl |= 1;
        } else {
            self.ctl_val &= !0x2000;
            self.ctl_read_val &= !0x2000;
            ce_ctrl &= !1;
        }
        self.mode_4b = enable;

        self.ctrl_writel(soc, self.ctl_reg, self.ctl_read_val)?;

        if ce_ctrl != 0 && self.ty == SfcType::Fmc {
            self.ctrl_writel(soc, FMC_CE_CTRL, ce_ctrl)?;
        }
        Ok(())
    }

    /// Reads directly through the flash-mapped AHB aperture, bypassing
    /// user-command mode entirely. No fast-read/dual/quad mode support.
    pub fn direct_read(&self, soc: &mut Soc, pos: u32, buf: &mut [u8]) -> Result<(), SocError> {
        let n = self.flash_read(soc, pos, buf)?;
        if n != buf.len() {
            return Err(SocError::IoFailure("sfc: short direct read".into()));
        }
        Ok(())
    }

    pub fn write_protect_save(&self, soc: &mut Soc, enable: bool) -> Result<u32, SocError> {
        let old = self.ctrl_readl(soc, self.type_reg)?;
        let new = if enable { old | self.type_wp_mask } else { old & !self.type_wp_mask };
        self.ctrl_writel(soc, self.type_reg, new)?;
        Ok(old & self.type_wp_mask)
    }

    pub fn write_protect_restore(&self, soc: &mut Soc, save: u32) -> Result<(), SocError> {
        let tsr = self.ctrl_readl(soc, self.type_reg)?;
        let tsr = (tsr & !self.type_wp_mask) | (save & self.type_wp_mask);
        self.ctrl_writel(soc, self.type_reg, tsr)
    }

    pub fn flash_region(&self) -> SocRegion {
        self.soc_flash
    }

    /// Restores the control register to read mode and, for SMC, clears
    /// the controller-enable bit — `sfc_destroy`.
    pub fn destroy(&self, soc: &mut Soc) -> Result<(), SocError> {
        self.ctrl_writel(soc, self.ctl_reg, self.ctl_read_val)?;
        if self.ty == SfcType::Smc {
            let reg = self.ctrl_readl(soc, SMC_CONF)?;
            if reg != 0xffff_ffff {
                self.ctrl_writel(soc, SMC_CONF, reg & !1)?;
            }
        }
        Ok(())
    }
}
