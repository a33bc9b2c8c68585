//! One-time-programmable fuse array access: reading configuration/strap
//! fuses, and the soak-timed programming sequence for writing them.
//! Grounded on `src/soc/otp.c`; only shipped on AST2600 (secure-boot
//! controller).

use std::io::{self, Write as _};
use std::time::{Duration, Instant};

use culvert_dt::DtNodeRef;

use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

const OTP_PASSWD: u32 = 0x349f_e38a;
const OTP_TRIGGER_PROGRAM: u32 = 0x23b1_e364;
const OTP_TRIGGER_READ: u32 = 0x23b1_e361;
const OTP_TRIGGER_WRITE_REG: u32 = 0x23b1_e362;

const OTP_PROTECT_KEY: u32 = 0x00;
const OTP_COMMAND: u32 = 0x04;
const OTP_TIMING: u32 = 0x08;
const OTP_ADDR: u32 = 0x10;
const OTP_STATUS: u32 = 0x14;
const OTP_STATUS_IDLE: u32 = 0x6;
const OTP_COMPARE_1: u32 = 0x20;

const NUM_OTP_CONF: usize = 16;
const NUM_PROG_TRIES: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpRegion {
    Strap,
    Config,
}

/// Copy, like the other peripheral drivers, so callers can pull their own
/// value out of [`Soc::driver_get_drvdata`] before taking the `&mut Soc`
/// borrow its methods need.
#[derive(Clone, Copy)]
pub struct Otp {
    iomem: SocRegion,
    timings: [u32; 3],
    soak_parameters: [[u32; 3]; 3],
}

impl Otp {
    fn readl(&self, soc: &mut Soc, offset: u32) -> Result<u32, SocError> {
        soc.readl(self.iomem.start + offset)
    }

    fn writel(&self, soc: &mut Soc, offset: u32, val: u32) -> Result<(), SocError> {
        soc.writel(self.iomem.start + offset, val)
    }

    fn wait_complete(&self, soc: &mut Soc) -> Result<(), SocError> {
        let start = Instant::now();
        loop {
            let status = self.readl(soc, OTP_STATUS)?;
            if status & OTP_STATUS_IDLE == OTP_STATUS_IDLE {
                return Ok(());
            }

            std::thread::sleep(Duration::from_millis(1));

            if start.elapsed() >= Duration::from_millis(500) {
                return Err(SocError::Timeout("otp: wait for idle timed out".into()));
            }
        }
    }

    fn program(&self, soc: &mut Soc, addr: u32, val: u32) -> Result<(), SocError> {
        self.writel(soc, OTP_ADDR, addr)?;
        self.writel(soc, OTP_COMPARE_1, val)?;
        self.writel(soc, OTP_COMMAND, OTP_TRIGGER_PROGRAM)?;
        self.wait_complete(soc)
    }

    fn read_reg(&self, soc: &mut Soc, addr: u32) -> Result<u32, SocError> {
        self.writel(soc, OTP_ADDR, addr)?;
        self.writel(soc, OTP_COMMAND, OTP_TRIGGER_READ)?;
        self.wait_complete(soc)?;
        self.readl(soc, OTP_COMPARE_1)
    }

    fn read_config(&self, soc: &mut Soc, offset: u32) -> Result<u32, SocError> {
        let mut config_offset = 0x800;
        config_offset |= (offset / 8) * 0x200;
        config_offset |= (offset % 8) * 2;
        self.read_reg(soc, config_offset)
    }

    fn write_reg(&self, soc: &mut Soc, addr: u32, val: u32) -> Result<(), SocError> {
        self.writel(soc, OTP_ADDR, addr)?;
        self.writel(soc, OTP_COMPARE_1, val)?;
        self.writel(soc, OTP_COMMAND, OTP_TRIGGER_WRITE_REG)?;
        self.wait_complete(soc)
    }

    fn set_soak(&self, soc: &mut Soc, soak: usize) -> Result<(), SocError> {
        if soak > 2 {
            return Err(SocError::InvalidArgument("soak level out of range".into()));
        }
        self.write_reg(soc, 0x3000, self.soak_parameters[soak][0])?;
        self.write_reg(soc, 0x5000, self.soak_parameters[soak][1])?;
        self.write_reg(soc, 0x1000, self.soak_parameters[soak][2])?;
        self.writel(soc, OTP_TIMING, self.timings[soak])
    }

    fn confirm() -> Result<(), SocError> {
        print!("Is this acceptable? If so, type YES: ");
        io::stdout().flush().ok();

        let mut input = String::new();
        io::stdin()
            .read_line(&mut input)
            .map_err(|e| SocError::InvalidArgument(format!("failed to read confirmation: {e}")))?;

        if input.trim() != "YES" {
            return Err(SocError::InvalidArgument("strap write unconfirmed".into()));
        }
        Ok(())
    }

    fn write(&self, soc: &mut Soc, address: u32, bitmask: u32) -> Result<(), SocError> {
        self.set_soak(soc, 1)?;

        let prog = !bitmask;
        let result = (|| -> Result<(), SocError> {
            self.program(soc, address, prog)?;

            let mut tries = 0;
            loop {
                let readback = self.read_reg(soc, address)?;
                if readback & bitmask != 0 {
                    log::info!("Success!");
                    return Ok(());
                }

                self.set_soak(soc, if tries % 2 != 0 { 1 } else { 2 })?;
                self.program(soc, address, prog)?;

                tries += 1;
                if tries >= NUM_PROG_TRIES {
                    log::error!("Failed to program OTP");
                    return Err(SocError::IoFailure("otp: programming did not take".into()));
                }
            }
        })();

        self.set_soak(soc, 0)?;
        result
    }

    /// Logs the strap or configuration fuse contents; returns nothing
    /// since the original's only output is the log itself.
    pub fn read(&self, soc: &mut Soc, region: OtpRegion) -> Result<(), SocError> {
        self.writel(soc, OTP_PROTECT_KEY, OTP_PASSWD)?;
        let result = self.read_inner(soc, region);
        self.writel(soc, OTP_PROTECT_KEY, 0)?;
        result
    }

    fn read_inner(&self, soc: &mut Soc, region: OtpRegion) -> Result<(), SocError> {
        match region {
            OtpRegion::Strap => {
                let scu_protect = [self.read_config(soc, 28)?, self.read_config(soc, 29)?];
                let protect = [self.read_config(soc, 30)?, self.read_config(soc, 31)?];

                let mut strap = [[0u32; 2]; 6];
                let mut res = [0u32; 2];
                for (i, slot) in strap.iter_mut().enumerate() {
                    let o = 16 + (i as u32 * 2);
                    slot[0] = self.read_config(soc, o)?;
                    slot[1] = self.read_config(soc, o + 1)?;
                    res[0] ^= slot[0];
                    res[1] ^= slot[1];
                }

                log::info!("OTP straps:\t\t63    32 31     0");
                log::info!("Protect SCU:\t{:08x} {:08x}", scu_protect[1], scu_protect[0]);
                log::info!("Protect:\t\t{:08x} {:08x}", protect[1], protect[0]);
                for (i, slot) in strap.iter().enumerate() {
                    log::info!("Option {i}:\t\t{:08x} {:08x}", slot[1], slot[0]);
                }
                log::info!("Result:\t\t{:08x} {:08x}", res[1], res[0]);
            }
            OtpRegion::Config => {
                let mut conf = [0u32; NUM_OTP_CONF];
                for (i, slot) in conf.iter_mut().enumerate() {
                    *slot = self.read_config(soc, i as u32)?;
                }

                log::info!("OTP configuration:");
                for (i, val) in conf.iter().enumerate() {
                    log::info!("{i:02}: {val:08x}");
                }
            }
        }
        Ok(())
    }

    pub fn write_conf(&self, soc: &mut Soc, word: u32, bit: u32) -> Result<(), SocError> {
        if word as usize >= NUM_OTP_CONF || bit >= 32 {
            return Err(SocError::InvalidArgument("otp conf word/bit out of range".into()));
        }
        let bitmask = 1 << bit;

        self.writel(soc, OTP_PROTECT_KEY, OTP_PASSWD)?;
        let result = (|| -> Result<(), SocError> {
            let conf = self.read_config(soc, word)?;
            if conf & bitmask != 0 {
                return Err(SocError::AlreadyDone("configuration bit already set".into()));
            }

            let mut address = 0x800;
            address |= (word / 8) * 0x200;
            address |= (word % 8) * 2;

            log::info!("Writing configuration at OTP {address:04x} with {bitmask:08x}");
            Self::confirm()?;

            self.write(soc, address, bitmask)
        })();
        self.writel(soc, OTP_PROTECT_KEY, 0)?;
        result
    }

    pub fn write_strap(&self, soc: &mut Soc, bit: u32, val: u32) -> Result<(), SocError> {
        if bit >= 64 || val > 1 {
            return Err(SocError::InvalidArgument("otp strap bit/val out of range".into()));
        }

        self.writel(soc, OTP_PROTECT_KEY, OTP_PASSWD)?;
        let result = self.write_strap_inner(soc, bit, val);
        self.writel(soc, OTP_PROTECT_KEY, 0)?;
        result
    }

    fn write_strap_inner(&self, soc: &mut Soc, bit: u32, val: u32) -> Result<(), SocError> {
        let (word, bit) = if bit > 31 { (1, bit - 32) } else { (0, bit) };
        let bitmask = 1u32 << bit;

        let protect = self.read_config(soc, 30 + word)?;
        if protect & bitmask != 0 {
            return Err(SocError::PermissionDenied("strap bit is protected".into()));
        }

        let mut strap = [0u32; 6];
        let mut res = 0u32;
        let mut free_option = None;
        for (i, slot) in strap.iter_mut().enumerate() {
            let o = 16 + (i as u32 * 2);
            *slot = self.read_config(soc, o + word)?;
            res ^= *slot;
            if free_option.is_none() && *slot & bitmask == 0 {
                free_option = Some(i);
            }
        }

        let Some(option) = free_option else {
            return Err(SocError::NotSupported("strap cannot be configured further".into()));
        };

        let desired = res & bitmask != 0;
        if (desired && val != 0) || (!desired && val == 0) {
            return Err(SocError::AlreadyDone("strap already in desired configuration".into()));
        }

        let i = (16 + option as u32 * 2) + word;
        let mut address = 0x800;
        address |= (i / 8) * 0x200;
        address |= (i % 8) * 2;

        log::info!("Writing strap at OTP {address:04x} with {bitmask:08x}");
        Self::confirm()?;

        self.write(soc, address, bitmask)
    }
}

const AST2600_A2_TIMINGS: [u32; 3] = [0x0419_0760, 0x0419_1388, 0x0419_3a98];
const AST2600_A2_SOAK: [[u32; 3]; 3] = [
    [0x0210, 0x2000, 0x0],
    [0x1200, 0x107f, 0x1024],
    [0x1220, 0x2074, 0x08a4],
];

const AST2600_A0_A1_TIMINGS: [u32; 3] = [0x0419_0760, 0x0419_0760, 0x0419_30d4];
const AST2600_A0_A1_SOAK: [[u32; 3]; 3] = [
    [0x0, 0x0, 0x0],
    [0x4021, 0x302f, 0x4020],
    [0x4021, 0x1027, 0x4820],
];

pub struct OtpDriver;

impl SocDriver for OtpDriver {
    fn name(&self) -> &'static str {
        "otp"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2600-secure-boot-controller"]
    }

    fn init(
        &self,
        soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let iomem = device_memory(node)?;

        let (timings, soak_parameters) = if soc.stepping() >= 2 {
            log::info!("Detected AST2600 A2");
            (AST2600_A2_TIMINGS, AST2600_A2_SOAK)
        } else {
            log::info!("Detected AST2600 A0/A1");
            (AST2600_A0_A1_TIMINGS, AST2600_A0_A1_SOAK)
        };

        Ok(Box::new(Otp { iomem, timings, soak_parameters }))
    }
}
