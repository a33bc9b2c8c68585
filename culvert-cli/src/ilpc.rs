//! `culvert ilpc read|write` — direct access over the indirect-LPC bridge.
//! Grounded on `src/cmd/ilpc.c`'s `do_ilpc`, which constructs the bridge
//! itself rather than going through the host registry.

use anyhow::{Context, Result};
use culvert_ahb::AhbHandle;
use culvert_bridge::ilpc::IlpcBridge;
use culvert_sio::Sio;

use crate::direct::{self, Action};

pub fn run(action: &Action) -> Result<()> {
    let sio = Sio::probe().context("probing SuperIO for the indirect-LPC bridge")?;
    let mut ahb = AhbHandle::new("ilpc", false, Box::new(IlpcBridge::new(sio)));
    direct::run(&mut ahb, action)
}
