//! `culvert replace ram MATCH REPLACE` — scan BMC DRAM for a substring and
//! overwrite it in place. Grounded on `src/cmd/replace.c`'s `cmd_replace`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use culvert_bridge::HostRegistry;
use culvert_soc::{Sdmc, Soc};

use crate::interface::{load_devicetree, parse_probe_args};

/// Window the DRAM scan proceeds in. Matches straddling a window boundary
/// are missed — the original carries the same limitation unfixed.
const DUMP_RAM_WIN: usize = 8 << 20;

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn run(
    space: &str,
    pattern: &str,
    replacement: &str,
    interface: &[String],
    dtb: &Option<PathBuf>,
) -> Result<()> {
    if space != "ram" {
        bail!("unsupported replace space '{space}'");
    }
    if replacement.len() > pattern.len() {
        bail!(
            "REPLACE length {} overruns MATCH length {}, bailing",
            replacement.len(),
            pattern.len(),
        );
    }

    let args = parse_probe_args(interface)?;
    let devicetree = load_devicetree(dtb)?;

    let mut host = HostRegistry::init(&args);
    let ahb = host
        .take_ahb(None)
        .context("failed to acquire an AHB interface")?;
    let mut soc = Soc::probe(ahb, devicetree)?;

    let result = (|| -> Result<()> {
        let sdmc = soc
            .driver_get_drvdata::<Sdmc>("sdmc")
            .copied()
            .context("this SoC has no SDRAM memory controller")?;

        let dram = sdmc.get_dram(&mut soc)?;
        let vram = sdmc.get_vram(&mut soc)?;
        let accessible = dram.length - vram.length;

        let needle = pattern.as_bytes();
        let replace = replacement.as_bytes();
        let mut chunk = vec![0u8; DUMP_RAM_WIN];
        let mut cursor = dram.start;
        let end = dram.start + accessible;

        while cursor < end {
            log::info!(
                "Scanning BMC RAM in range {:#010x}-{:#010x}",
                cursor,
                cursor + DUMP_RAM_WIN as u32 - 1,
            );
            let n = soc.ahb().read(cursor, &mut chunk)?;
            if n != DUMP_RAM_WIN {
                bail!("short read: {n}");
            }

            let mut pos = 0;
            while let Some(idx) = find(&chunk[pos..], needle) {
                let abs = pos + idx;
                log::info!("{:#010x}: Replacing '{pattern}' with '{replacement}'", cursor + abs as u32);
                let n = soc.ahb().write(cursor + abs as u32, replace)?;
                if n != replace.len() {
                    bail!("short write: {n}");
                }

                if abs + needle.len() > chunk.len() {
                    break;
                }
                pos = abs + needle.len();
            }

            cursor += DUMP_RAM_WIN as u32;
        }

        Ok(())
    })();

    soc.destroy();
    result
}
