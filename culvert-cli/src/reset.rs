//! `culvert reset soc WDT` — reset the SoC via a named watchdog instance.
//! Grounded on `src/cmd/reset.c`'s `cmd_reset`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use culvert_bridge::HostRegistry;
use culvert_reset::reset_soc;
use culvert_soc::Soc;

use crate::interface::{load_devicetree, parse_probe_args};

pub fn run(kind: &str, wdt: &str, interface: &[String], dtb: &Option<PathBuf>) -> Result<()> {
    if kind != "soc" {
        bail!("unsupported reset type '{kind}'");
    }

    let args = parse_probe_args(interface)?;
    let devicetree = load_devicetree(dtb)?;

    let mut host = HostRegistry::init(&args);
    let ahb = host
        .take_ahb(None)
        .context("failed to acquire an AHB interface")?;
    let mut soc = Soc::probe(ahb, devicetree)?;

    reset_soc(&mut soc, wdt)?;

    soc.destroy();
    Ok(())
}
