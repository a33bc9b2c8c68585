//! `culvert read firmware|ram` — exfiltrate BMC flash or DRAM to stdout.
//! Grounded on `src/cmd/read.c`'s `cmd_dump_firmware`/`cmd_dump_ram`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use culvert_bridge::HostRegistry;
use culvert_soc::{Sdmc, Soc};

use crate::interface::{load_devicetree, parse_probe_args};

/// Firmware window base for the AST2500 family's `p2ab_fw` mapping.
const AST_G5_BMC_FLASH: u32 = 0x2000_0000;
const BMC_FLASH_LEN: u64 = 32 << 20;

const SFC_TSR: u32 = 0x1e62_0000;
const SFC_WAFCR: u32 = 0x1e62_00a4;
const SFC_TSR_CE0_WRITE: u32 = 1 << 16;

fn dump_firmware(soc: &mut Soc) -> Result<()> {
    log::info!("Testing BMC SFC write filter configuration");
    let wafcr = soc.readl(SFC_WAFCR)?;
    if wafcr != 0 {
        bail!("BMC has selective write filtering enabled (WAFCR={wafcr:#010x}), bailing");
    }

    log::info!("Write-protecting BMC SFC");
    let restore_tsr = soc.readl(SFC_TSR)?;
    soc.writel(SFC_TSR, restore_tsr & !SFC_TSR_CE0_WRITE)?;

    log::info!("Exfiltrating BMC flash to stdout");
    let mut stdout = std::io::stdout();
    let result = soc.ahb().siphon_in(AST_G5_BMC_FLASH, BMC_FLASH_LEN, &mut stdout);

    log::info!("Clearing BMC SFC write protect state");
    soc.writel(SFC_TSR, restore_tsr)?;

    result.context("siphoning BMC flash")?;
    Ok(())
}

fn dump_ram(soc: &mut Soc) -> Result<()> {
    let sdmc = soc
        .driver_get_drvdata::<Sdmc>("sdmc")
        .copied()
        .context("this SoC has no SDRAM memory controller")?;

    let dram = sdmc.get_dram(soc)?;
    let vram = sdmc.get_vram(soc)?;
    let accessible = dram.length - vram.length;

    log::info!(
        "{}MiB DRAM with {}MiB VRAM; dumping {}MiB ({:#010x}-{:#010x})",
        dram.length >> 20,
        vram.length >> 20,
        accessible >> 20,
        dram.start,
        dram.start + accessible - 1,
    );

    let mut stdout = std::io::stdout();
    soc.ahb()
        .siphon_in(dram.start, accessible as u64, &mut stdout)
        .context("siphoning BMC DRAM")?;
    Ok(())
}

pub fn run(kind: &str, interface: &[String], dtb: &Option<PathBuf>) -> Result<()> {
    let args = parse_probe_args(interface)?;
    let devicetree = load_devicetree(dtb)?;

    let mut host = HostRegistry::init(&args);
    let ahb = host
        .take_ahb(None)
        .context("failed to acquire an AHB interface")?;
    let mut soc = Soc::probe(ahb, devicetree)?;

    let result = match kind {
        "firmware" => dump_firmware(&mut soc),
        "ram" => dump_ram(&mut soc),
        other => bail!("unsupported read type '{other}'"),
    };

    soc.destroy();
    result
}
