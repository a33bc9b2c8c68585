//! Indirect-LPC-to-AHB bridge (`ilpcb`), mediated entirely through the
//! SuperIO indirect-LPC logical device (0x0d). Grounded on
//! `src/bridge/ilpc.c` and `src/sio.c` in the original source tree.
//!
//! Byte-at-a-time and extremely slow; used primarily for bootstrapping the
//! faster transports (`l2ab`, `p2ab`) that piggyback on it.

use culvert_ahb::{AhbError, AhbHandle, AhbOps};
use culvert_sio::{LogicalDevice, Sio};

use crate::{BridgeDriver, ProbeArgs};

const REG_ENABLE: u8 = 0x30;
const REG_WIDTH: u8 = 0xf8;
const REG_ADDR0: u8 = 0xf0;
const REG_DATA0: u8 = 0xf4;
const REG_DATA_BYTE: u8 = 0xf7;
const REG_TRIGGER: u8 = 0xfe;
const TRIGGER_WRITE: u8 = 0xcf;

const WIDTH_BYTE: u8 = 0x00;
const WIDTH_WORD: u8 = 0x02;

pub struct IlpcBridge {
    sio: Sio,
}

impl IlpcBridge {
    pub fn new(sio: Sio) -> Self {
        IlpcBridge { sio }
    }

    fn load_address(sio: &Sio, width: u8, addr: u32) {
        sio.write_reg(REG_ENABLE, 0x01);
        sio.write_reg(REG_WIDTH, width);
        let b = addr.to_be_bytes();
        sio.write_reg(REG_ADDR0, b[0]);
        sio.write_reg(REG_ADDR0 + 1, b[1]);
        sio.write_reg(REG_ADDR0 + 2, b[2]);
        sio.write_reg(REG_ADDR0 + 3, b[3]);
    }

    fn read_byte(&self, addr: u32) -> u8 {
        self.sio.with_device(LogicalDevice::Ilpc, |sio| {
            Self::load_address(sio, WIDTH_BYTE, addr);
            let _ = sio.read_reg(REG_TRIGGER);
            sio.read_reg(REG_DATA_BYTE)
        })
    }

    fn write_byte(&self, addr: u32, value: u8) {
        self.sio.with_device(LogicalDevice::Ilpc, |sio| {
            Self::load_address(sio, WIDTH_BYTE, addr);
            sio.write_reg(REG_DATA_BYTE, value);
            sio.write_reg(REG_TRIGGER, TRIGGER_WRITE);
        })
    }

    fn read_word(&self, addr: u32) -> u32 {
        self.sio.with_device(LogicalDevice::Ilpc, |sio| {
            Self::load_address(sio, WIDTH_WORD, addr);
            let _ = sio.read_reg(REG_TRIGGER);
            let b = [
                sio.read_reg(REG_DATA0),
                sio.read_reg(REG_DATA0 + 1),
                sio.read_reg(REG_DATA0 + 2),
                sio.read_reg(REG_DATA0 + 3),
            ];
            u32::from_be_bytes(b)
        })
    }

    fn write_word(&self, addr: u32, value: u32) {
        self.sio.with_device(LogicalDevice::Ilpc, |sio| {
            Self::load_address(sio, WIDTH_WORD, addr);
            let b = value.to_be_bytes();
            sio.write_reg(REG_DATA0, b[0]);
            sio.write_reg(REG_DATA0 + 1, b[1]);
            sio.write_reg(REG_DATA0 + 2, b[2]);
            sio.write_reg(REG_DATA0 + 3, b[3]);
            sio.write_reg(REG_TRIGGER, TRIGGER_WRITE);
        })
    }
}

impl AhbOps for IlpcBridge {
    fn read(&mut self, phys: u32, buf: &mut [u8]) -> Result<usize, AhbError> {
        for (i, addr) in (phys..).take(buf.len()).enumerate() {
            buf[i] = self.read_byte(addr);
        }
        Ok(buf.len())
    }

    fn write(&mut self, phys: u32, buf: &[u8]) -> Result<usize, AhbError> {
        for (i, addr) in (phys..).take(buf.len()).enumerate() {
            self.write_byte(addr, buf[i]);
        }
        Ok(buf.len())
    }

    fn readl(&mut self, phys: u32) -> Result<u32, AhbError> {
        Ok(self.read_word(phys))
    }

    fn writel(&mut self, phys: u32, value: u32) -> Result<(), AhbError> {
        self.write_word(phys, value);
        Ok(())
    }
}

pub struct IlpcDriver;

impl BridgeDriver for IlpcDriver {
    fn name(&self) -> &'static str {
        "ilpc"
    }

    fn probe(&self, _args: &ProbeArgs) -> Result<Option<AhbHandle>, AhbError> {
        match Sio::probe() {
            Ok(sio) => Ok(Some(AhbHandle::new(
                self.name(),
                false,
                Box::new(IlpcBridge::new(sio)),
            ))),
            Err(e) => {
                log::debug!("ilpc: SuperIO probe failed: {e}");
                Ok(None)
            }
        }
    }
}
