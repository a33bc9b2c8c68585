//! The AST2500 LPC SuperIO-side UART/IO-port routing crossbar. Grounded on
//! `src/uart/mux.c`; the sparse lookup table is transcribed as four static
//! 2D arrays (uart-uart, uart-io, io-uart, io-io) rather than the original's
//! single over-sized `mux_io_count`-square array, since Rust enums don't
//! need the shared array dimension C used to store two differently-sized
//! lookup spaces in one type.

use culvert_dt::DtNodeRef;

use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

const LPC_HICR9: u32 = 0x98;
const LPC_HICR9_SEL6IO: u32 = 0b1111 << 8;
const LPC_HICRA: u32 = 0x9c;
const LPC_HICRA_SEL5DW: u32 = 0b1111 << 28;
const LPC_HICRA_SEL4DW: u32 = 0b111 << 25;
const LPC_HICRA_SEL3DW: u32 = 0b111 << 22;
const LPC_HICRA_SEL2DW: u32 = 0b111 << 19;
const LPC_HICRA_SEL1DW: u32 = 0b111 << 16;
const LPC_HICRA_SEL5IO: u32 = 0b111 << 12;
const LPC_HICRA_SEL4IO: u32 = 0b111 << 9;
const LPC_HICRA_SEL3IO: u32 = 0b111 << 6;
const LPC_HICRA_SEL2IO: u32 = 0b111 << 3;
const LPC_HICRA_SEL1IO: u32 = 0b111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uart {
    Uart1,
    Uart2,
    Uart3,
    Uart4,
    Uart5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Io {
    Io1,
    Io2,
    Io3,
    Io4,
    Io5,
    Io6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxObj {
    Uart(Uart),
    Io(Io),
}

type Entry = Option<(u32, u32, u32)>;

const UART_UART: [[Entry; 5]; 5] = [
    [None, Some((LPC_HICRA, LPC_HICRA_SEL2DW, 0b110)), Some((LPC_HICRA, LPC_HICRA_SEL3DW, 0b101)), Some((LPC_HICRA, LPC_HICRA_SEL4DW, 0b100)), Some((LPC_HICRA, LPC_HICRA_SEL5DW, 0b0101))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1DW, 0b100)), None, Some((LPC_HICRA, LPC_HICRA_SEL3DW, 0b110)), Some((LPC_HICRA, LPC_HICRA_SEL4DW, 0b101)), Some((LPC_HICRA, LPC_HICRA_SEL5DW, 0b0110))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1DW, 0b101)), Some((LPC_HICRA, LPC_HICRA_SEL2DW, 0b100)), None, Some((LPC_HICRA, LPC_HICRA_SEL4DW, 0b110)), Some((LPC_HICRA, LPC_HICRA_SEL5DW, 0b0111))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1DW, 0b110)), Some((LPC_HICRA, LPC_HICRA_SEL2DW, 0b101)), Some((LPC_HICRA, LPC_HICRA_SEL3DW, 0b100)), None, Some((LPC_HICRA, LPC_HICRA_SEL5DW, 0b0111))],
    [None, None, None, None, None],
];

const UART_IO: [[Entry; 6]; 5] = [
    [Some((LPC_HICRA, LPC_HICRA_SEL1IO, 0b000)), Some((LPC_HICRA, LPC_HICRA_SEL2IO, 0b100)), Some((LPC_HICRA, LPC_HICRA_SEL3IO, 0b011)), Some((LPC_HICRA, LPC_HICRA_SEL4IO, 0b010)), Some((LPC_HICRA, LPC_HICRA_SEL5IO, 0b001)), Some((LPC_HICR9, LPC_HICR9_SEL6IO, 0b0000))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1IO, 0b001)), Some((LPC_HICRA, LPC_HICRA_SEL2IO, 0b000)), Some((LPC_HICRA, LPC_HICRA_SEL3IO, 0b100)), Some((LPC_HICRA, LPC_HICRA_SEL4IO, 0b011)), Some((LPC_HICRA, LPC_HICRA_SEL5IO, 0b010)), Some((LPC_HICR9, LPC_HICR9_SEL6IO, 0b0001))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1IO, 0b010)), Some((LPC_HICRA, LPC_HICRA_SEL2IO, 0b001)), Some((LPC_HICRA, LPC_HICRA_SEL3IO, 0b000)), Some((LPC_HICRA, LPC_HICRA_SEL4IO, 0b100)), Some((LPC_HICRA, LPC_HICRA_SEL5IO, 0b011)), Some((LPC_HICR9, LPC_HICR9_SEL6IO, 0b0010))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1IO, 0b011)), Some((LPC_HICRA, LPC_HICRA_SEL2IO, 0b010)), Some((LPC_HICRA, LPC_HICRA_SEL3IO, 0b001)), Some((LPC_HICRA, LPC_HICRA_SEL4IO, 0b000)), Some((LPC_HICRA, LPC_HICRA_SEL5IO, 0b100)), Some((LPC_HICR9, LPC_HICR9_SEL6IO, 0b0011))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1IO, 0b100)), Some((LPC_HICRA, LPC_HICRA_SEL2IO, 0b011)), Some((LPC_HICRA, LPC_HICRA_SEL3IO, 0b010)), Some((LPC_HICRA, LPC_HICRA_SEL4IO, 0b001)), Some((LPC_HICRA, LPC_HICRA_SEL5IO, 0b000)), Some((LPC_HICR9, LPC_HICR9_SEL6IO, 0b0100))],
];

const IO_UART: [[Entry; 5]; 6] = [
    [Some((LPC_HICRA, LPC_HICRA_SEL1DW, 0b000)), Some((LPC_HICRA, LPC_HICRA_SEL2DW, 0b011)), Some((LPC_HICRA, LPC_HICRA_SEL3DW, 0b010)), Some((LPC_HICRA, LPC_HICRA_SEL4DW, 0b001)), Some((LPC_HICRA, LPC_HICRA_SEL5DW, 0b0001))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1DW, 0b001)), Some((LPC_HICRA, LPC_HICRA_SEL2DW, 0b000)), Some((LPC_HICRA, LPC_HICRA_SEL3DW, 0b011)), Some((LPC_HICRA, LPC_HICRA_SEL4DW, 0b010)), Some((LPC_HICRA, LPC_HICRA_SEL5DW, 0b0010))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1DW, 0b010)), Some((LPC_HICRA, LPC_HICRA_SEL2DW, 0b001)), Some((LPC_HICRA, LPC_HICRA_SEL3DW, 0b000)), Some((LPC_HICRA, LPC_HICRA_SEL4DW, 0b011)), Some((LPC_HICRA, LPC_HICRA_SEL5DW, 0b0011))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1DW, 0b011)), Some((LPC_HICRA, LPC_HICRA_SEL2DW, 0b010)), Some((LPC_HICRA, LPC_HICRA_SEL3DW, 0b001)), Some((LPC_HICRA, LPC_HICRA_SEL4DW, 0b000)), Some((LPC_HICRA, LPC_HICRA_SEL5DW, 0b0100))],
    [None, None, None, None, Some((LPC_HICRA, LPC_HICRA_SEL5DW, 0b0000))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1DW, 0b111)), Some((LPC_HICRA, LPC_HICRA_SEL2DW, 0b111)), Some((LPC_HICRA, LPC_HICRA_SEL3DW, 0b111)), Some((LPC_HICRA, LPC_HICRA_SEL4DW, 0b111)), Some((LPC_HICRA, LPC_HICRA_SEL5DW, 0b1001))],
];

const IO_IO: [[Entry; 6]; 6] = [
    [None, None, Some((LPC_HICRA, LPC_HICRA_SEL3IO, 0b101)), Some((LPC_HICRA, LPC_HICRA_SEL4IO, 0b101)), Some((LPC_HICRA, LPC_HICRA_SEL5IO, 0b101)), Some((LPC_HICR9, LPC_HICR9_SEL6IO, 0b0101))],
    [None, None, Some((LPC_HICRA, LPC_HICRA_SEL3IO, 0b110)), Some((LPC_HICRA, LPC_HICRA_SEL4IO, 0b110)), None, Some((LPC_HICR9, LPC_HICR9_SEL6IO, 0b0110))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1IO, 0b101)), Some((LPC_HICRA, LPC_HICRA_SEL2IO, 0b101)), None, None, Some((LPC_HICRA, LPC_HICRA_SEL5IO, 0b110)), Some((LPC_HICR9, LPC_HICR9_SEL6IO, 0b0111))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1IO, 0b110)), Some((LPC_HICRA, LPC_HICRA_SEL2IO, 0b110)), None, None, None, Some((LPC_HICR9, LPC_HICR9_SEL6IO, 0b1000))],
    [None, None, None, None, None, Some((LPC_HICR9, LPC_HICR9_SEL6IO, 0b1001))],
    [Some((LPC_HICRA, LPC_HICRA_SEL1IO, 0b111)), Some((LPC_HICRA, LPC_HICRA_SEL2IO, 0b111)), Some((LPC_HICRA, LPC_HICRA_SEL3IO, 0b111)), Some((LPC_HICRA, LPC_HICRA_SEL4IO, 0b111)), Some((LPC_HICRA, LPC_HICRA_SEL5IO, 0b111)), None],
];

fn lookup(src: MuxObj, dst: MuxObj) -> Entry {
    match (src, dst) {
        (MuxObj::Uart(s), MuxObj::Uart(d)) => UART_UART[s as usize][d as usize],
        (MuxObj::Uart(s), MuxObj::Io(d)) => UART_IO[s as usize][d as usize],
        (MuxObj::Io(s), MuxObj::Uart(d)) => IO_UART[s as usize][d as usize],
        (MuxObj::Io(s), MuxObj::Io(d)) => IO_IO[s as usize][d as usize],
    }
}

#[derive(Clone, Copy)]
pub struct UartMux {
    lpc: SocRegion,
    hicr9: u32,
    hicra: u32,
}

impl UartMux {
    fn readl(&self, soc: &mut Soc, offset: u32) -> Result<u32, SocError> {
        soc.readl(self.lpc.start + offset)
    }

    fn writel(&self, soc: &mut Soc, offset: u32, val: u32) -> Result<(), SocError> {
        soc.writel(self.lpc.start + offset, val)
    }

    pub fn restore(&self, soc: &mut Soc) -> Result<(), SocError> {
        self.writel(soc, LPC_HICR9, self.hicr9)?;
        self.writel(soc, LPC_HICRA, self.hicra)
    }

    pub fn route(&self, soc: &mut Soc, src: MuxObj, dst: MuxObj) -> Result<(), SocError> {
        let (reg, mask, val) = lookup(src, dst)
            .ok_or_else(|| SocError::InvalidArgument("no routing between those endpoints".into()))?;

        let mut reg_val = self.readl(soc, reg)?;
        reg_val &= !mask;
        reg_val |= val << mask.trailing_zeros();
        self.writel(soc, reg, reg_val)
    }

    pub fn connect(&self, soc: &mut Soc, a: MuxObj, b: MuxObj) -> Result<(), SocError> {
        self.route(soc, a, b)?;
        self.route(soc, b, a)
    }
}

pub struct UartMuxDriver;

impl SocDriver for UartMuxDriver {
    fn name(&self) -> &'static str {
        "uart-mux"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2500-lpc-v2"]
    }

    fn init(
        &self,
        soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let lpc = device_memory(node)?;
        let hicr9 = soc.readl(lpc.start + LPC_HICR9)?;
        let hicra = soc.readl(lpc.start + LPC_HICRA)?;
        Ok(Box::new(UartMux { lpc, hicr9, hicra }))
    }
}
