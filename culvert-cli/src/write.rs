//! `culvert write firmware [--live]` — flash a firmware image from stdin,
//! optionally halting and resetting a running BMC around the write.
//! Grounded on `src/cmd/write.c`'s `cmd_write`.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use culvert_bridge::HostRegistry;
use culvert_flash::{FlashChip, Sfc};
use culvert_soc::{Clk, ClkSource, Soc, SocError, Vuart, VuartDiscard, Wdt};

use crate::interface::{load_devicetree, parse_probe_args};

const SFC_FLASH_WIN: usize = 64 << 10;

/// Halts the host side of a live BMC before the flash is touched: stop
/// every watchdog, gate the ARM clock, and have the VUART swallow whatever
/// the host tries to send while it thinks it still owns the bus.
fn quiesce(soc: &mut Soc) -> Result<(Clk, Vuart)> {
    log::info!("Preventing system reset");
    culvert_soc::prevent_reset(soc)?;

    log::info!("Gating ARM clock");
    let clk = soc
        .driver_get_drvdata::<Clk>("clk")
        .copied()
        .ok_or_else(|| SocError::NoDriver("clk".into()))?;
    clk.disable(soc, ClkSource::Arm)?;

    let vuart = soc
        .driver_get_drvdata::<Vuart>("vuart")
        .copied()
        .ok_or_else(|| SocError::NoDriver("vuart".into()))?;
    log::info!("Configuring VUART for host Tx discard");
    vuart.set_host_tx_discard(soc, VuartDiscard::Enable)?;

    Ok((clk, vuart))
}

fn write_image(soc: &mut Soc) -> Result<()> {
    log::info!("Initialising flash subsystem");
    let mut ctrl = Sfc::probe(soc, "fmc")?;
    let chip = FlashChip::probe(soc, &mut ctrl)?;

    let mut buf = vec![0u8; SFC_FLASH_WIN];
    let mut phys = 0u32;

    log::info!("Writing firmware image");
    loop {
        let n = std::io::stdin().read(&mut buf)?;
        if n == 0 {
            break;
        }
        if n < SFC_FLASH_WIN {
            bail!("unexpected ingress value: {n:#x}");
        }

        chip.erase(soc, &ctrl, phys, n as u32)?;
        loop {
            match chip.write(soc, &ctrl, phys, &buf[..n], true) {
                Ok(()) => break,
                Err(SocError::IoFailure(_)) => {
                    chip.erase(soc, &ctrl, phys, n as u32)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        phys += n as u32;
    }

    Ok(())
}

pub fn run(kind: &str, live: bool, interface: &[String], dtb: &Option<PathBuf>) -> Result<()> {
    if kind != "firmware" {
        bail!("unsupported write type '{kind}'");
    }

    let args = parse_probe_args(interface)?;
    let devicetree = load_devicetree(dtb)?;

    let mut host = HostRegistry::init(&args);
    let ahb = host
        .take_ahb(None)
        .context("failed to acquire an AHB interface")?;
    let mut soc = Soc::probe(ahb, devicetree)?;

    let local = soc.ahb().is_local();
    let quiesced = if local {
        log::warn!("I hope you know what you are doing");
        None
    } else if live {
        Some(quiesce(&mut soc)?)
    } else {
        None
    };

    let result = write_image(&mut soc);

    if live && !local && result.is_ok() {
        log::info!("Performing SoC reset");
        match soc
            .driver_get_drvdata_by_name::<Wdt>("wdt", "wdt2")
            .copied()
            .ok_or_else(|| SocError::NoDriver("wdt2".into()))
            .map_err(anyhow::Error::from)
            .and_then(|wdt| wdt.perform_reset(&mut soc).map_err(anyhow::Error::from))
        {
            Ok(()) => {}
            Err(e) => {
                if let Some((clk, _)) = &quiesced {
                    log::info!("Ungating ARM clock");
                    let _ = clk.enable(&mut soc, ClkSource::Arm);
                }
                soc.destroy();
                return Err(e);
            }
        }
    }

    if let Some((clk, vuart)) = quiesced {
        log::info!("Deconfiguring VUART host Tx discard");
        if let Err(e) = vuart.set_host_tx_discard(&mut soc, VuartDiscard::Disable) {
            log::error!("vuart_set_host_tx_discard: {e}");
        }
        if result.is_err() {
            log::info!("Ungating ARM clock");
            let _ = clk.enable(&mut soc, ClkSource::Arm);
        }
    }

    soc.destroy();
    result
}
