//! Direct `/dev/mem` access (`devmem`). Only useful when the process runs
//! on the BMC itself — the handle's `local` flag is set. Grounded on
//! `src/devmem.c`.

use culvert_ahb::{AhbError, AhbHandle, AhbOps};
use culvert_hostio::mmap::MmapWindow;

use crate::{BridgeDriver, ProbeArgs};

const AST_SOC_IO: u32 = 0x1e60_0000;
const AST_SOC_IO_LEN: usize = 0x0020_0000;
const DEV_MEM: &str = "/dev/mem";

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

pub struct DevmemBridge {
    io: MmapWindow,
    window: Option<(u32, MmapWindow)>,
}

impl DevmemBridge {
    pub fn open() -> Result<Self, AhbError> {
        let io = MmapWindow::open(DEV_MEM, AST_SOC_IO as u64, AST_SOC_IO_LEN)
            .map_err(|e| AhbError::not_supported(format!("{DEV_MEM}: {e}")))?;
        Ok(DevmemBridge { io, window: None })
    }

    fn in_permanent_aperture(phys: u32, len: usize) -> bool {
        let start = AST_SOC_IO as u64;
        let end = start + AST_SOC_IO_LEN as u64;
        let p = phys as u64;
        p >= start && p + len as u64 <= end
    }

    /// Ensures a sliding window covers `[phys, phys+len)`, returning the
    /// in-window byte offset. Reuses the existing window if it already
    /// contains the range; otherwise remaps.
    fn setup_window(&mut self, phys: u32, len: usize) -> Result<usize, AhbError> {
        if let Some((base, win)) = &self.window {
            if phys >= *base && (phys as u64 + len as u64) <= (*base as u64 + win.len() as u64) {
                return Ok((phys - base) as usize);
            }
        }
        let pgsize = page_size() as u64;
        let aligned = phys as u64 & !(pgsize - 1);
        let offset = phys as u64 - aligned;
        let map_len = offset + len as u64;
        let win = MmapWindow::open(DEV_MEM, aligned, map_len as usize)?;
        self.window = Some((aligned as u32, win));
        Ok(offset as usize)
    }
}

impl AhbOps for DevmemBridge {
    fn read(&mut self, phys: u32, buf: &mut [u8]) -> Result<usize, AhbError> {
        let off = self.setup_window(phys, buf.len())?;
        let (_, win) = self.window.as_ref().unwrap();
        win.read_at(off, buf);
        Ok(buf.len())
    }

    fn write(&mut self, phys: u32, buf: &[u8]) -> Result<usize, AhbError> {
        let off = self.setup_window(phys, buf.len())?;
        let (_, win) = self.window.as_ref().unwrap();
        win.write_at(off, buf);
        Ok(buf.len())
    }

    fn readl(&mut self, phys: u32) -> Result<u32, AhbError> {
        if Self::in_permanent_aperture(phys, 4) {
            return Ok(self.io.readl_at((phys - AST_SOC_IO) as usize));
        }
        let off = self.setup_window(phys, 4)?;
        let (_, win) = self.window.as_ref().unwrap();
        Ok(win.readl_at(off))
    }

    fn writel(&mut self, phys: u32, value: u32) -> Result<(), AhbError> {
        if Self::in_permanent_aperture(phys, 4) {
            self.io.writel_at((phys - AST_SOC_IO) as usize, value);
            return Ok(());
        }
        let off = self.setup_window(phys, 4)?;
        let (_, win) = self.window.as_ref().unwrap();
        win.writel_at(off, value);
        Ok(())
    }
}

pub struct DevmemDriver;

impl BridgeDriver for DevmemDriver {
    fn name(&self) -> &'static str {
        "devmem"
    }

    fn local(&self) -> bool {
        true
    }

    fn probe(&self, _args: &ProbeArgs) -> Result<Option<AhbHandle>, AhbError> {
        match DevmemBridge::open() {
            Ok(bridge) => Ok(Some(AhbHandle::new(self.name(), true, Box::new(bridge)))),
            Err(e) if e.is_not_supported() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_aperture_bounds() {
        assert!(DevmemBridge::in_permanent_aperture(AST_SOC_IO, 4));
        assert!(DevmemBridge::in_permanent_aperture(
            AST_SOC_IO + AST_SOC_IO_LEN as u32 - 4,
            4
        ));
        assert!(!DevmemBridge::in_permanent_aperture(
            AST_SOC_IO + AST_SOC_IO_LEN as u32,
            4
        ));
        assert!(!DevmemBridge::in_permanent_aperture(0x1000_0000, 4));
    }
}
