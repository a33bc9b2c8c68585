//! Shared `read ADDRESS` / `write ADDRESS VALUE` dispatch for the commands
//! that talk straight to an [`AhbHandle`] without going through the SoC
//! driver framework. Grounded on `ast_ahb_access` (`src/ast.c`).

use anyhow::Result;
use culvert_ahb::AhbHandle;

use crate::interface::parse_u32;

#[derive(Debug, clap::Subcommand)]
pub enum Action {
    /// Reads a 32-bit word
    Read {
        /// Address to read, e.g. 0x1e6e2000
        address: String,
    },
    /// Writes a 32-bit word
    Write {
        /// Address to write, e.g. 0x1e6e2000
        address: String,
        /// Value to write, e.g. 0xdeadbeef
        value: String,
    },
}

pub fn run(ahb: &mut AhbHandle, action: &Action) -> Result<()> {
    match action {
        Action::Read { address } => {
            let address = parse_u32(address)?;
            let data = ahb.readl(address)?;
            println!("{address:#010x}: {data:#010x}");
        }
        Action::Write { address, value } => {
            let address = parse_u32(address)?;
            let value = parse_u32(value)?;
            ahb.writel(address, value)?;
        }
    }
    Ok(())
}
