//! `culvert otp read|write conf|strap` — one-time-programmable fuse access.
//! Grounded on `src/cmd/otp.c`'s `cmd_otp`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use culvert_bridge::HostRegistry;
use culvert_soc::{Otp, OtpRegion, Soc};

use crate::interface::{load_devicetree, parse_probe_args, parse_u32};

pub fn run(
    action: &str,
    region: &str,
    values: &[String],
    interface: &[String],
    dtb: &Option<PathBuf>,
) -> Result<()> {
    let region = match region {
        "conf" => OtpRegion::Config,
        "strap" => OtpRegion::Strap,
        other => bail!("unsupported otp region '{other}'"),
    };

    let args = parse_probe_args(interface)?;
    let devicetree = load_devicetree(dtb)?;

    let mut host = HostRegistry::init(&args);
    let ahb = host
        .take_ahb(None)
        .context("failed to acquire an AHB interface")?;
    let mut soc = Soc::probe(ahb, devicetree)?;

    let otp = soc
        .driver_get_drvdata::<Otp>("otp")
        .copied()
        .context("this SoC has no OTP controller")?;

    match action {
        "read" => otp.read(&mut soc, region)?,
        "write" => {
            let [a, b] = values else {
                bail!("otp write needs two numeric arguments");
            };
            match region {
                OtpRegion::Strap => otp.write_strap(&mut soc, parse_u32(a)?, parse_u32(b)?)?,
                OtpRegion::Config => otp.write_conf(&mut soc, parse_u32(a)?, parse_u32(b)?)?,
            }
        }
        other => bail!("unsupported command '{other}'"),
    }

    soc.destroy();
    Ok(())
}
