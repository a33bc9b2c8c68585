//! PCIe-to-AHB bridge (`p2ab`): a 64 KiB sliding window exposed through
//! BAR1 of the BMC's VGA (or management) PCI function. Grounded on
//! `src/p2a.c`/`src/p2a.h`.

use culvert_ahb::{AhbError, AhbHandle, AhbOps};
use culvert_hostio::mmap::MmapWindow;

use crate::pci;
use crate::{BridgeDriver, ProbeArgs};

const AST_PCI_VID: u32 = 0x1a03;
const AST_PCI_DID_VGA: u32 = 0x2000;
const AST_PCI_DID_BMC: u32 = 0x2402;
const AST_MMIO_BAR: u32 = 1;

/// Which PCIe function to bridge through: the VGA function (the common
/// case, always present) or the separate BMC management function some
/// boards expose. Selected on the CLI by `p2a vga|bmc ...` (`src/cmd/p2a.c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P2aTarget {
    Vga,
    Bmc,
}
const AST_MMIO_LEN: usize = 128 * 1024;

const P2AB_PKR: usize = 0xf000;
const P2AB_RBAR: usize = 0xf004;
const P2AB_RBAR_REMAP_MASK: u32 = 0xffff_0000;
const P2AB_WINDOW_BASE: usize = 0x1_0000;
const P2AB_WINDOW_LEN: u32 = 0x1_0000;

pub struct P2aBridge {
    bar: MmapWindow,
    rbar: u32,
    locked: bool,
}

impl P2aBridge {
    /// Opens the bridge through the PCIe function `target` selects.
    pub fn open_target(target: P2aTarget) -> Result<Self, AhbError> {
        let device = match target {
            P2aTarget::Vga => AST_PCI_DID_VGA,
            P2aTarget::Bmc => AST_PCI_DID_BMC,
        };
        Self::open(AST_PCI_VID, device)
    }

    pub fn open(vendor: u32, device: u32) -> Result<Self, AhbError> {
        let resource = pci::find_resource(vendor, device, AST_MMIO_BAR)?;
        let path = resource
            .to_str()
            .ok_or_else(|| AhbError::io("non-UTF8 PCI resource path"))?;
        let bar = MmapWindow::open(path, 0, AST_MMIO_LEN)
            .map_err(|e| AhbError::io(format!("mmap BAR{AST_MMIO_BAR}: {e}")))?;
        let mut this = P2aBridge {
            bar,
            rbar: 0,
            locked: true,
        };
        // Force the software and hardware rbar mirrors into sync, then
        // unlock the window-control key.
        this.bar.writel_at(P2AB_RBAR, 0);
        this.unlock();
        Ok(this)
    }

    fn unlock(&mut self) {
        self.bar.writel_at(P2AB_PKR, 1);
        self.locked = false;
    }

    fn lock(&mut self) {
        self.bar.writel_at(P2AB_PKR, 0);
        self.locked = true;
    }

    /// Reprograms the remap register if the requested base isn't already
    /// the current window, returning the in-window byte offset.
    fn map(&mut self, phys: u32) -> u32 {
        let rbar = phys & P2AB_RBAR_REMAP_MASK;
        let offset = phys & !P2AB_RBAR_REMAP_MASK;
        if self.rbar != rbar {
            self.bar.writel_at(P2AB_RBAR, rbar);
            self.rbar = rbar;
        }
        offset
    }

    fn chunked<F>(&mut self, phys: u32, len: usize, mut op: F) -> Result<(), AhbError>
    where
        F: FnMut(&mut Self, usize, u32, usize),
    {
        let mut addr = phys;
        let mut remaining = len;
        let mut done = 0;
        while remaining > 0 {
            let window_off = self.map(addr) as usize;
            let chunk = remaining.min(P2AB_WINDOW_LEN as usize - window_off);
            op(self, done, (P2AB_WINDOW_BASE + window_off) as u32, chunk);
            addr = addr.wrapping_add(chunk as u32);
            remaining -= chunk;
            done += chunk;
        }
        Ok(())
    }
}

impl AhbOps for P2aBridge {
    fn read(&mut self, phys: u32, buf: &mut [u8]) -> Result<usize, AhbError> {
        let len = buf.len();
        self.chunked(phys, len, |this, done, bar_off, chunk| {
            this.bar.read_at(bar_off as usize, &mut buf[done..done + chunk]);
        })?;
        Ok(len)
    }

    fn write(&mut self, phys: u32, buf: &[u8]) -> Result<usize, AhbError> {
        let len = buf.len();
        self.chunked(phys, len, |this, done, bar_off, chunk| {
            this.bar.write_at(bar_off as usize, &buf[done..done + chunk]);
        })?;
        Ok(len)
    }

    fn readl(&mut self, phys: u32) -> Result<u32, AhbError> {
        if phys & 0x3 != 0 {
            return Err(AhbError::invalid_argument(format!(
                "p2a readl requires 4-byte alignment, got {phys:#x}"
            )));
        }
        let window_off = self.map(phys);
        Ok(self.bar.readl_at(P2AB_WINDOW_BASE + window_off as usize))
    }

    fn writel(&mut self, phys: u32, value: u32) -> Result<(), AhbError> {
        if phys & 0x3 != 0 {
            return Err(AhbError::invalid_argument(format!(
                "p2a writel requires 4-byte alignment, got {phys:#x}"
            )));
        }
        let window_off = self.map(phys);
        self.bar
            .writel_at(P2AB_WINDOW_BASE + window_off as usize, value);
        Ok(())
    }

    fn release(&mut self) -> Result<(), AhbError> {
        Ok(())
    }

    fn reinit(&mut self) -> Result<(), AhbError> {
        // Resync the software mirror of the remap register with hardware.
        self.rbar = self.bar.readl_at(P2AB_RBAR) & P2AB_RBAR_REMAP_MASK;
        Ok(())
    }
}

impl Drop for P2aBridge {
    fn drop(&mut self) {
        if !self.locked {
            self.lock();
        }
    }
}

pub struct P2aDriver;

impl BridgeDriver for P2aDriver {
    fn name(&self) -> &'static str {
        "p2a"
    }

    fn probe(&self, _args: &ProbeArgs) -> Result<Option<AhbHandle>, AhbError> {
        match P2aBridge::open(AST_PCI_VID, AST_PCI_DID_VGA) {
            Ok(bridge) => Ok(Some(AhbHandle::new(self.name(), false, Box::new(bridge)))),
            Err(e) if e.is_not_supported() => Ok(None),
            Err(_) => Ok(None),
        }
    }
}
