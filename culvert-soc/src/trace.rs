//! AHB bus tracing via the AHB controller's built-in bus-cycle recorder:
//! program a watchpoint address/width/mode, let the SRAM ring buffer fill,
//! then siphon it out. Grounded on `src/trace.c`.

use std::io::Write;

use culvert_dt::DtNodeRef;

use crate::{device_memory, device_memory_named, Soc, SocDriver, SocError, SocRegion};

const R_AHBC_BCR_CSR: u32 = 0x40;
const AHBC_BCR_CSR_BUF_LEN_SHIFT: u32 = 8;
const AHBC_BCR_CSR_BUF_LEN_MASK: u32 = 0b111 << AHBC_BCR_CSR_BUF_LEN_SHIFT;
const AHBC_BCR_CSR_BUF_LEN_32K: u32 = 0b011;

const AHBC_BCR_CSR_POLL_DATA_SHIFT: u32 = 4;
const AHBC_BCR_CSR_POLL_DATA_1_0: u32 = 0b000;
const AHBC_BCR_CSR_POLL_DATA_1_1: u32 = 0b001;
const AHBC_BCR_CSR_POLL_DATA_1_2: u32 = 0b010;
const AHBC_BCR_CSR_POLL_DATA_1_3: u32 = 0b011;
const AHBC_BCR_CSR_POLL_DATA_2_0: u32 = 0b100;
const AHBC_BCR_CSR_POLL_DATA_2_2: u32 = 0b101;
const AHBC_BCR_CSR_POLL_DATA_4_0: u32 = 0b110;

const AHBC_BCR_CSR_FLUSH: u32 = 1 << 2;
const AHBC_BCR_CSR_POLL_MODE: u32 = 1 << 1;
const AHBC_BCR_CSR_POLL_EN: u32 = 1 << 0;

const R_AHBC_BCR_BUF: u32 = 0x44;
const AHBC_BCR_BUF_WRAP: u32 = 1 << 0;
const R_AHBC_BCR_ADDR: u32 = 0x48;
const R_AHBC_BCR_FIFO_MERGE: u32 = 0x5c;

const AHBC_BCR_BUF_LEN: [usize; 8] = [
    4 * 1024,
    8 * 1024,
    16 * 1024,
    32 * 1024,
    128 * 1024,
    256 * 1024,
    512 * 1024,
    1024 * 1024,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    Read = 0,
    Write = 1,
}

fn trace_style(width: u32, offset: u32) -> Result<u32, SocError> {
    if !(width == 1 || width == 2 || width == 4) {
        return Err(SocError::InvalidArgument("trace width must be 1, 2 or 4".into()));
    }
    if offset >= 4 || (offset & (width - 1)) != 0 {
        return Err(SocError::InvalidArgument("trace offset misaligned for width".into()));
    }

    Ok(match width {
        1 => match offset {
            0 => AHBC_BCR_CSR_POLL_DATA_1_0,
            1 => AHBC_BCR_CSR_POLL_DATA_1_1,
            2 => AHBC_BCR_CSR_POLL_DATA_1_2,
            _ => AHBC_BCR_CSR_POLL_DATA_1_3,
        },
        2 => {
            if offset == 0 {
                AHBC_BCR_CSR_POLL_DATA_2_0
            } else {
                AHBC_BCR_CSR_POLL_DATA_2_2
            }
        }
        _ => AHBC_BCR_CSR_POLL_DATA_4_0,
    })
}

/// Copy, like the other peripheral drivers, so callers (e.g. the CLI-facing
/// trace command) can pull their own value out of
/// [`Soc::driver_get_drvdata`] before taking the `&mut Soc` borrow `start`/
/// `stop`/`dump` need.
#[derive(Clone, Copy)]
pub struct Trace {
    ahbc: SocRegion,
    sram: SocRegion,
}

impl Trace {
    fn readl(&self, soc: &mut Soc, off: u32) -> Result<u32, SocError> {
        soc.readl(self.ahbc.start + off)
    }

    fn writel(&self, soc: &mut Soc, off: u32, val: u32) -> Result<(), SocError> {
        soc.writel(self.ahbc.start + off, val)
    }

    pub fn start(&self, soc: &mut Soc, addr: u32, width: u32, mode: TraceMode) -> Result<(), SocError> {
        if self.sram.length < 32 * 1024 {
            return Err(SocError::NotSupported("trace buffer smaller than 32K".into()));
        }

        let mut csr = AHBC_BCR_CSR_BUF_LEN_32K << AHBC_BCR_CSR_BUF_LEN_SHIFT;
        csr |= AHBC_BCR_CSR_POLL_MODE * (mode as u32);
        self.writel(soc, R_AHBC_BCR_CSR, csr)?;
        self.writel(soc, R_AHBC_BCR_ADDR, addr & !3)?;

        log::info!(
            "Zeroing trace buffer [{:#010x} - {:#010x}]",
            self.sram.start,
            self.sram.start + self.sram.length
        );
        for i in 0..(self.sram.length / 4) {
            soc.writel(4 * i + self.sram.start, 0)?;
        }

        let buf = self.sram.start | AHBC_BCR_BUF_WRAP;
        self.writel(soc, R_AHBC_BCR_BUF, buf)?;

        let style = trace_style(width, addr & 3)?;
        csr |= style << AHBC_BCR_CSR_POLL_DATA_SHIFT;
        csr |= AHBC_BCR_CSR_FLUSH;
        csr |= AHBC_BCR_CSR_POLL_EN;
        self.writel(soc, R_AHBC_BCR_CSR, csr)?;

        log::info!("Started AHB trace for {addr:#010x}");
        Ok(())
    }

    pub fn stop(&self, soc: &mut Soc) -> Result<(), SocError> {
        let mut csr = self.readl(soc, R_AHBC_BCR_CSR)?;
        if csr & AHBC_BCR_CSR_POLL_EN == 0 {
            return Ok(());
        }

        // Note: this won't flush the tail values if they don't form a full word.
        csr |= AHBC_BCR_CSR_FLUSH;
        self.writel(soc, R_AHBC_BCR_CSR, csr)?;

        csr &= !(AHBC_BCR_CSR_POLL_EN | AHBC_BCR_CSR_FLUSH);
        self.writel(soc, R_AHBC_BCR_CSR, csr)?;

        log::info!("Stopped AHB trace");
        Ok(())
    }

    pub fn dump(&self, soc: &mut Soc, sink: &mut dyn Write) -> Result<u64, SocError> {
        let csr = self.readl(soc, R_AHBC_BCR_CSR)?;

        let mut buf = self.readl(soc, R_AHBC_BCR_BUF)?;

        // 1 and 2 byte trace entries accumulate in the merge FIFO; once it
        // holds 4 bytes they move into the real FIFO and eventually flush to
        // the trace buffer. Tracing byte accesses may leave data sitting
        // here without anything reaching the buffer yet.
        if let Ok(merge) = self.readl(soc, R_AHBC_BCR_FIFO_MERGE) {
            log::info!("partial trace reg: {merge:#010x}");
        }

        let wrapped = buf & AHBC_BCR_BUF_WRAP != 0;
        buf &= !AHBC_BCR_BUF_WRAP;

        let buf_len_idx = ((csr & AHBC_BCR_CSR_BUF_LEN_MASK) >> AHBC_BCR_CSR_BUF_LEN_SHIFT) as usize;
        let buf_len = AHBC_BCR_BUF_LEN[buf_len_idx] as u32;
        let write_ptr = buf & (((1u32 << (12 + buf_len_idx)) - 1) & !3);
        let base = buf & !(write_ptr | 3);

        let mut total = 0u64;
        if wrapped {
            let len = (base + buf_len) - write_ptr;
            log::debug!("Ring buffer has wrapped, dumping trace buffer from write pointer at {buf:#010x} for {len}");
            total += soc.ahb().siphon_in(buf, len as u64, sink)?;
        }

        let len = buf - base;
        log::debug!("Dumping from trace buffer at {base:#010x} for {len}");
        total += soc.ahb().siphon_in(base, len as u64, sink)?;

        Ok(total)
    }
}

pub struct TraceDriver;

impl SocDriver for TraceDriver {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2500-ahb-controller", "aspeed,ast2600-ahb-controller"]
    }

    fn init(
        &self,
        _soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let ahbc = device_memory(node)?;
        let sram = device_memory_named(node, "trace-buffer", 1)?;

        log::info!("Found AHBC at {:#010x} and SRAM at {:#010x}", ahbc.start, sram.start);

        Ok(Box::new(Trace { ahbc, sram }))
    }
}
