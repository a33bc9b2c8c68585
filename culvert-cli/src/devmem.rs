//! `culvert devmem read|write` — direct `/dev/mem` access, only meaningful
//! when run on the BMC itself. Grounded on `src/devmem.c`.

use anyhow::{Context, Result};
use culvert_ahb::AhbHandle;
use culvert_bridge::devmem::DevmemBridge;

use crate::direct::{self, Action};

pub fn run(action: &Action) -> Result<()> {
    let bridge = DevmemBridge::open().context("opening /dev/mem")?;
    let mut ahb = AhbHandle::new("devmem", true, Box::new(bridge));
    direct::run(&mut ahb, action)
}
