//! `culvert probe` — attach a transport, probe the SoC, and report (or
//! require) the aggregate bridge-controller protection level. Grounded on
//! `src/cmd/probe.c`'s `cmd_probe`.

use std::path::PathBuf;

use anyhow::{bail, Result};
use culvert_ahb::BridgeMode;
use culvert_discovery::{satisfies, Discovery};

use crate::interface::{load_devicetree, parse_probe_args};

pub fn run(
    interface: &[String],
    prefer: Option<&str>,
    list_interfaces: bool,
    require: Option<&str>,
    dtb: &Option<PathBuf>,
) -> Result<()> {
    let args = parse_probe_args(interface)?;
    let devicetree = load_devicetree(dtb)?;

    let mut discovery = Discovery::probe(&args, prefer, devicetree)?;

    if list_interfaces {
        for name in discovery.list_bridge_controllers() {
            println!("{name}");
        }
        discovery.destroy();
        return Ok(());
    }

    let required = match require {
        None => BridgeMode::Permissive,
        Some("confidentiality") => BridgeMode::Disabled,
        Some("integrity") => BridgeMode::Restricted,
        Some(other) => bail!("unrecognised requirement: {other} (expected integrity or confidentiality)"),
    };

    let discovered = discovery.probe_bridge_controllers()?;
    log::info!("discovered bridge mode: {discovered}");
    discovery.destroy();

    if !satisfies(required, discovered) {
        bail!("bridge controllers do not satisfy the required protection level");
    }
    Ok(())
}
