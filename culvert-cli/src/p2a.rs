//! `culvert p2a vga|bmc read|write` — direct access over the PCIe-to-AHB
//! bridge. Grounded on `src/cmd/p2a.c`'s `do_p2a`.

use anyhow::{bail, Context, Result};
use culvert_ahb::AhbHandle;
use culvert_bridge::p2a::{P2aBridge, P2aTarget};

use crate::direct::{self, Action};

/// `device` is `"vga"` or `"bmc"`, matching the original's bare strcmp
/// dispatch rather than a typed enum.
pub fn run(device: &str, action: &Action) -> Result<()> {
    let target = match device {
        "vga" => P2aTarget::Vga,
        "bmc" => P2aTarget::Bmc,
        other => bail!("unknown PCIe device: {other}"),
    };
    let bridge = P2aBridge::open_target(target).context("opening the PCIe-to-AHB bridge")?;
    let mut ahb = AhbHandle::new("p2a", false, Box::new(bridge));
    direct::run(&mut ahb, action)
}
