//! The flash-chip discipline layer: JEDEC identification, erase-size
//! selection, page programming, and the erase-avoiding "smart write".
//! Grounded on `src/flash.c`.

use bitflags::bitflags;
use culvert_soc::{Soc, SocError};

use crate::sfc::{
    Sfc, CMD_BE, CMD_BE32K, CMD_CE, CMD_EN4B, CMD_EX4B, CMD_MIC_BULK_ERASE, CMD_MIC_RDFLST, CMD_PP, CMD_RDID,
    CMD_RDSR, CMD_READ, CMD_SE, CMD_WREN, STAT_WEN, STAT_WIP,
};

bitflags! {
    /// Chip capability flags, straight off `struct flash_info.flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlashFlags: u32 {
        const ERASE_4K = 0x0000_0001;
        const ERASE_32K = 0x0000_0002;
        const ERASE_64K = 0x0000_0004;
        const ERASE_CHIP = 0x0000_0008;
        const ERASE_BULK = 0x0000_0010;
        const MICRON_BUGS = 0x0000_0020;
        const CAN_4B = 0x0000_0040;
    }
}

/// One entry in the known-chips table keyed by 3-byte JEDEC ID.
struct FlashInfo {
    id: u32,
    size: u32,
    flags: FlashFlags,
    name: &'static str,
}

const FLASH_INFO: &[FlashInfo] = &[
    FlashInfo { id: 0xc22018, size: 0x0100_0000, flags: FlashFlags::ERASE_4K | FlashFlags::ERASE_32K | FlashFlags::ERASE_64K | FlashFlags::ERASE_CHIP | FlashFlags::CAN_4B, name: "Macronix MXxxL12835F" },
    FlashInfo { id: 0xc22019, size: 0x0200_0000, flags: FlashFlags::ERASE_4K | FlashFlags::ERASE_32K | FlashFlags::ERASE_64K | FlashFlags::ERASE_CHIP | FlashFlags::CAN_4B, name: "Macronix MXxxL25635F" },
    FlashInfo { id: 0xc2201a, size: 0x0400_0000, flags: FlashFlags::ERASE_4K | FlashFlags::ERASE_32K | FlashFlags::ERASE_64K | FlashFlags::ERASE_CHIP | FlashFlags::CAN_4B, name: "Macronix MXxxL51235F" },
    FlashInfo { id: 0xc2201b, size: 0x0800_0000, flags: FlashFlags::ERASE_4K | FlashFlags::ERASE_32K | FlashFlags::ERASE_64K | FlashFlags::ERASE_CHIP | FlashFlags::CAN_4B, name: "Macronix MX66L1G45G" },
    FlashInfo { id: 0xef4018, size: 0x0100_0000, flags: FlashFlags::ERASE_4K | FlashFlags::ERASE_32K | FlashFlags::ERASE_64K | FlashFlags::ERASE_CHIP, name: "Winbond W25Q128BV" },
    FlashInfo { id: 0xef4019, size: 0x0200_0000, flags: FlashFlags::ERASE_4K | FlashFlags::ERASE_32K | FlashFlags::ERASE_64K | FlashFlags::ERASE_CHIP | FlashFlags::CAN_4B | FlashFlags::ERASE_BULK, name: "Winbond W25Q256BV" },
    FlashInfo { id: 0x20ba20, size: 0x0400_0000, flags: FlashFlags::ERASE_4K | FlashFlags::ERASE_64K | FlashFlags::CAN_4B | FlashFlags::ERASE_BULK | FlashFlags::MICRON_BUGS, name: "Micron N25Qx512Ax" },
    FlashInfo { id: 0x20ba19, size: 0x0200_0000, flags: FlashFlags::ERASE_4K | FlashFlags::ERASE_64K | FlashFlags::CAN_4B | FlashFlags::ERASE_BULK | FlashFlags::MICRON_BUGS, name: "Micron N25Q256Ax" },
    FlashInfo { id: 0x1940ef, size: 0x0200_0000, flags: FlashFlags::ERASE_4K | FlashFlags::ERASE_64K | FlashFlags::CAN_4B | FlashFlags::ERASE_BULK | FlashFlags::MICRON_BUGS, name: "Micron N25Qx256Ax" },
];

/// An identified, configured flash chip sitting behind an [`Sfc`]
/// controller.
pub struct FlashChip {
    flags: FlashFlags,
    size: u32,
    name: &'static str,
    min_erase_mask: u32,
    mode_4b: bool,
}

impl FlashChip {
    /// `flash_init`: reads the JEDEC ID, looks it up, derives the
    /// erase granularity, and configures 3B/4B addressing to match the
    /// chip's size.
    pub fn probe(soc: &mut Soc, ctrl: &mut Sfc) -> Result<Self, SocError> {
        Self::wait_idle(soc, ctrl, FlashFlags::empty())?;

        let mut id_buf = [0u8; 3];
        ctrl.cmd_rd(soc, CMD_RDID, None, &mut id_buf)?;
        let iid = u32::from_be_bytes([0, id_buf[0], id_buf[1], id_buf[2]]);

        let info = FLASH_INFO
            .iter()
            .find(|i| i.id == iid)
            .ok_or_else(|| SocError::NotSupported(format!("sfc: unrecognized flash ID {iid:06x}")))?;

        let flags = info.flags;
        let min_erase_mask = if flags.contains(FlashFlags::ERASE_4K) {
            0xfff
        } else if flags.contains(FlashFlags::ERASE_32K) {
            0x7fff
        } else if flags.contains(FlashFlags::ERASE_64K) {
            0xffff
        } else {
            return Err(SocError::NotSupported("sfc: flash chip has no known erase size".into()));
        };

        let mut chip = FlashChip {
            flags,
            size: info.size,
            name: info.name,
            min_erase_mask,
            mode_4b: false,
        };

        chip.configure(soc, ctrl)?;

        log::info!(
            "flash: found {} size {}M erase granule {}K",
            chip.name,
            chip.size >> 20,
            (chip.min_erase_mask + 1) >> 10
        );

        Ok(chip)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn erase_granule(&self) -> u32 {
        self.min_erase_mask + 1
    }

    /// Crops the size to 16 MiB if the chip can't do 4-byte addressing,
    /// then enables/disables 3B vs 4B mode on both chip and controller.
    fn configure(&mut self, soc: &mut Soc, ctrl: &mut Sfc) -> Result<(), SocError> {
        const SIZE_16M: u32 = 0x0100_0000;

        if self.size > SIZE_16M && !self.flags.contains(FlashFlags::CAN_4B) {
            log::warn!("flash: {} cropped to 16M, no 4B mode", self.name);
            self.size = SIZE_16M;
        }

        let want_4b = self.size > SIZE_16M;
        if want_4b {
            log::debug!("flash: >16M, enabling 4B mode");
            Self::chip_set_4b(soc, ctrl, true)?;
            ctrl.set_4b(soc, true, true)?;
        } else {
            log::debug!("flash: <=16M, disabling 4B mode");
            if self.flags.contains(FlashFlags::CAN_4B) {
                Self::chip_set_4b(soc, ctrl, false)?;
            }
            ctrl.set_4b(soc, false, false)?;
        }
        self.mode_4b = want_4b;
        Ok(())
    }

    fn chip_set_4b(soc: &mut Soc, ctrl: &Sfc, enable: bool) -> Result<(), SocError> {
        // Tolerate write-enable failure (e.g. a write-protected chip) the
        // way the original does: ignore the error and attempt the mode
        // switch regardless.
        let _ = Self::write_enable(soc, ctrl);
        ctrl.cmd_wr(soc, if enable { CMD_EN4B } else { CMD_EX4B }, None, &[])
    }

    fn read_status(soc: &mut Soc, ctrl: &Sfc) -> Result<u8, SocError> {
        let mut stat = [0u8; 1];
        ctrl.cmd_rd(soc, CMD_RDSR, None, &mut stat)?;
        Ok(stat[0])
    }

    fn wait_idle(soc: &mut Soc, ctrl: &Sfc, flags: FlashFlags) -> Result<(), SocError> {
        loop {
            let stat = Self::read_status(soc, ctrl)?;
            if stat & STAT_WIP == 0 {
                if flags.contains(FlashFlags::MICRON_BUGS) {
                    let mut flst = [0u8; 1];
                    let _ = ctrl.cmd_rd(soc, CMD_MIC_RDFLST, None, &mut flst);
                }
                return Ok(());
            }
        }
    }

    fn write_enable(soc: &mut Soc, ctrl: &Sfc) -> Result<(), SocError> {
        for _ in 0..1000 {
            ctrl.cmd_wr(soc, CMD_WREN, None, &[])?;
            let stat = Self::read_status(soc, ctrl)?;
            if stat & STAT_WIP != 0 {
                Self::wait_idle(soc, ctrl, FlashFlags::empty())?;
                continue;
            }
            if stat & STAT_WEN != 0 {
                return Ok(());
            }
        }
        Err(SocError::Timeout("sfc: WREN never took effect".into()))
    }

    pub fn read(&self, soc: &mut Soc, ctrl: &Sfc, pos: u32, buf: &mut [u8]) -> Result<(), SocError> {
        if !self.mode_4b {
            return ctrl.direct_read(soc, pos, buf);
        }
        ctrl.cmd_rd(soc, CMD_READ, Some(pos), buf)
    }

    fn best_erase(&self, dst: u32, size: u32) -> (u32, u8) {
        if dst & 0x7fff != 0 || size < 0x8000 {
            return (0x1000, CMD_SE);
        }
        if self.flags.contains(FlashFlags::ERASE_32K) && (dst & 0xffff != 0 || size < 0x10000) {
            return (0x8000, CMD_BE32K);
        }
        if !self.flags.contains(FlashFlags::ERASE_64K) {
            return if self.flags.contains(FlashFlags::ERASE_32K) { (0x8000, CMD_BE32K) } else { (0x1000, CMD_SE) };
        }
        (0x10000, CMD_BE)
    }

    /// Erases `[dst, dst+size)`, which must be aligned to the chip's
    /// minimum erase granule.
    pub fn erase(&self, soc: &mut Soc, ctrl: &Sfc, dst: u32, size: u32) -> Result<(), SocError> {
        if size == 0 || dst.checked_add(size).map(|e| e > self.size).unwrap_or(true) {
            return Err(SocError::InvalidArgument("sfc: erase range out of bounds".into()));
        }
        if (dst | size) & self.min_erase_mask != 0 {
            return Err(SocError::InvalidArgument("sfc: erase range misaligned to erase granule".into()));
        }

        let mut dst = dst;
        let mut remaining = size;
        while remaining > 0 {
            let (chunk, cmd) = self.best_erase(dst, remaining);
            Self::write_enable(soc, ctrl)?;
            ctrl.cmd_wr(soc, cmd, Some(dst), &[])?;
            Self::wait_idle(soc, ctrl, self.flags)?;
            remaining -= chunk;
            dst += chunk;
        }
        Ok(())
    }

    pub fn erase_chip(&self, soc: &mut Soc, ctrl: &Sfc) -> Result<(), SocError> {
        if !self.flags.contains(FlashFlags::ERASE_CHIP) && !self.flags.contains(FlashFlags::ERASE_BULK) {
            return Err(SocError::NotSupported("sfc: chip has no whole-chip erase command".into()));
        }
        Self::write_enable(soc, ctrl)?;
        let cmd = if self.flags.contains(FlashFlags::ERASE_CHIP) { CMD_CE } else { CMD_MIC_BULK_ERASE };
        ctrl.cmd_wr(soc, cmd, None, &[])?;
        Self::wait_idle(soc, ctrl, self.flags)
    }

    fn write_page(&self, soc: &mut Soc, ctrl: &Sfc, dst: u32, src: &[u8]) -> Result<(), SocError> {
        if src.is_empty() || src.len() > 0x100 {
            return Err(SocError::InvalidArgument("sfc: page write size out of range".into()));
        }
        Self::write_enable(soc, ctrl)?;
        ctrl.cmd_wr(soc, CMD_PP, Some(dst), src)?;
        Self::wait_idle(soc, ctrl, self.flags)
    }

    /// Page-programs `src` at `dst`, optionally reading it back to
    /// verify. A mismatch after verification reports
    /// [`SocError::IoFailure`]; the caller ([`Self::smart_write`]) is
    /// responsible for retrying via an erase.
    pub fn write(&self, soc: &mut Soc, ctrl: &Sfc, dst: u32, src: &[u8], verify: bool) -> Result<(), SocError> {
        if src.is_empty() || dst.checked_add(src.len() as u32).map(|e| e > self.size).unwrap_or(true) {
            return Err(SocError::InvalidArgument("sfc: write range out of bounds".into()));
        }

        let mut d = dst;
        let mut off = 0usize;
        while off < src.len() {
            let chunk = ((0x100 - (d & 0xff)) as usize).min(src.len() - off);
            self.write_page(soc, ctrl, d, &src[off..off + chunk])?;
            d += chunk as u32;
            off += chunk;
        }

        if !verify {
            return Ok(());
        }

        let mut vbuf = vec![0u8; src.len().min(0x100)];
        let mut pos = dst;
        let mut off = 0usize;
        while off < src.len() {
            let chunk = vbuf.len().min(src.len() - off);
            self.read(soc, ctrl, pos, &mut vbuf[..chunk])?;
            if vbuf[..chunk] != src[off..off + chunk] {
                return Err(SocError::IoFailure(format!("sfc: verify mismatch at {pos:#010x}")));
            }
            pos += chunk as u32;
            off += chunk;
        }
        Ok(())
    }

    /// Writes `src` to `[dst, dst+len)`, erasing only the erase-granule
    /// blocks whose content would otherwise need bits *set* that are
    /// currently clear — skipping unaffected blocks (`sm_no_change`) and
    /// avoiding an erase where the new content is a strict subset of the
    /// old one (`sm_need_write`).
    pub fn smart_write(&self, soc: &mut Soc, ctrl: &Sfc, dst: u32, src: &[u8]) -> Result<(), SocError> {
        let end = dst as u64 + src.len() as u64;
        if src.is_empty() || end > self.size as u64 {
            return Err(SocError::InvalidArgument("sfc: smart-write range out of bounds".into()));
        }

        let er_size = self.min_erase_mask + 1;
        let mut cur = dst;
        let mut off_src = 0usize;

        while (cur as u64) < end {
            let page = cur & !self.min_erase_mask;
            let page_off = (cur & self.min_erase_mask) as usize;

            let mut page_buf = vec![0u8; er_size as usize];
            self.read(soc, ctrl, page, &mut page_buf)?;

            let chunk = (er_size as usize - page_off).min(src.len() - off_src);
            let new_chunk = &src[off_src..off_src + chunk];
            let old_chunk = &page_buf[page_off..page_off + chunk];

            match smart_compare(old_chunk, new_chunk) {
                SmartAction::NoChange => {}
                SmartAction::Write => {
                    self.write(soc, ctrl, cur, new_chunk, true)?;
                }
                SmartAction::Erase => {
                    self.erase(soc, ctrl, page, er_size)?;
                    page_buf[page_off..page_off + chunk].copy_from_slice(new_chunk);
                    self.write(soc, ctrl, page, &page_buf, true)?;
                }
            }

            cur += chunk as u32;
            off_src += chunk;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SmartAction {
    NoChange,
    Write,
    Erase,
}

/// NOR flash program-bit semantics: a bit can only be cleared (1→0) by a
/// program operation, and only set (0→1) by an erase. So if any bit the
/// new content needs set is currently clear, an erase is unavoidable;
/// otherwise a plain program suffices, or nothing at all if unchanged.
fn smart_compare(old: &[u8], new: &[u8]) -> SmartAction {
    let mut same = true;
    for (o, n) in old.iter().zip(new.iter()) {
        if n & !o != 0 {
            return SmartAction::Erase;
        }
        if o != n {
            same = false;
        }
    }
    if same {
        SmartAction::NoChange
    } else {
        SmartAction::Write
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn identical_content_needs_no_change() {
        assert_eq!(smart_compare(&[0xaa, 0x55], &[0xaa, 0x55]), SmartAction::NoChange);
    }

    #[test]
    fn clearing_bits_only_needs_a_write() {
        // 0xff -> 0x0f only clears bits, never needs a 0 turned into a 1.
        assert_eq!(smart_compare(&[0xff], &[0x0f]), SmartAction::Write);
    }

    #[test]
    fn setting_a_clear_bit_needs_an_erase() {
        assert_eq!(smart_compare(&[0x00], &[0x01]), SmartAction::Erase);
    }

    proptest! {
        #[test]
        fn erase_subsumes_any_content(old in proptest::collection::vec(any::<u8>(), 1..64)) {
            // Erased flash is all-ones, so any new content can be written
            // over it without a further erase.
            let erased = vec![0xffu8; old.len()];
            prop_assert_eq!(smart_compare(&erased, &old), if old.iter().all(|&b| b == 0xff) {
                SmartAction::NoChange
            } else {
                SmartAction::Write
            });
        }

        #[test]
        fn any_bit_set_over_clear_forces_erase(
            old in proptest::collection::vec(any::<u8>(), 1..32),
            new in proptest::collection::vec(any::<u8>(), 1..32),
        ) {
            let len = old.len().min(new.len());
            let old = &old[..len];
            let new = &new[..len];
            let needs_erase = old.iter().zip(new.iter()).any(|(o, n)| n & !o != 0);
            prop_assert_eq!(smart_compare(old, new) == SmartAction::Erase, needs_erase);
        }
    }
}
