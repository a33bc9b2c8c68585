//! `culvert sfc fmc read|write|erase` — direct flash-controller access
//! bypassing the erase-avoiding smart-write discipline. Grounded on
//! `src/cmd/sfc.c`'s `cmd_sfc`.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use culvert_bridge::HostRegistry;
use culvert_flash::{FlashChip, Sfc};
use culvert_soc::Soc;

use crate::interface::{load_devicetree, parse_probe_args};

const SFC_FLASH_WIN: usize = 64 << 10;

pub fn run(
    kind: &str,
    op: &str,
    offset: u32,
    len: u32,
    interface: &[String],
    dtb: &Option<PathBuf>,
) -> Result<()> {
    if kind != "fmc" {
        bail!("unsupported sfc type '{kind}'");
    }

    let args = parse_probe_args(interface)?;
    let devicetree = load_devicetree(dtb)?;

    let mut host = HostRegistry::init(&args);
    let ahb = host
        .take_ahb(None)
        .context("failed to acquire an AHB interface")?;
    let mut soc = Soc::probe(ahb, devicetree)?;

    let mut ctrl = Sfc::probe(&mut soc, "fmc")?;
    let chip = FlashChip::probe(&mut soc, &mut ctrl)?;

    match op {
        "read" => {
            let mut buf = vec![0u8; len as usize];
            chip.read(&mut soc, &ctrl, offset, &mut buf)?;
            std::io::stdout().write_all(&buf)?;
        }
        "write" => {
            let mut buf = vec![0u8; SFC_FLASH_WIN];
            let mut offset = offset;
            loop {
                let n = std::io::stdin().read(&mut buf)?;
                if n == 0 {
                    break;
                }
                chip.write(&mut soc, &ctrl, offset, &buf[..n], true)?;
                offset += n as u32;
            }
        }
        "erase" => {
            chip.erase(&mut soc, &ctrl, offset, len)?;
        }
        other => bail!("unsupported sfc operation '{other}'"),
    }

    soc.destroy();
    Ok(())
}
