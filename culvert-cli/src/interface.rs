//! Parses the trailing `[interface [ip port username password]]` CLI block
//! (spec §6) that every command accepting remote access shares, and
//! resolves the devicetree blob every full-framework command needs.
//!
//! Grounded on `ast_ahb_from_args` (`src/ast.c`): zero trailing arguments
//! means "probe the local transports"; one means a local debug-UART device
//! path; five means a remote Digi Portserver TS-16 debug-UART.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use culvert_bridge::{DebugParams, ProbeArgs};

pub fn parse_probe_args(rest: &[String]) -> Result<ProbeArgs> {
    match rest.len() {
        0 => Ok(ProbeArgs::default()),
        1 => Ok(ProbeArgs {
            debug: Some(DebugParams::Tty(rest[0].clone())),
        }),
        5 => {
            let port = rest[2]
                .parse()
                .with_context(|| format!("invalid port '{}'", rest[2]))?;
            Ok(ProbeArgs {
                debug: Some(DebugParams::Ts16 {
                    ip: rest[1].clone(),
                    port,
                    username: rest[3].clone(),
                    password: rest[4].clone(),
                }),
            })
        }
        n => bail!("expected 0, 1 or 5 trailing interface arguments, got {n}"),
    }
}

/// Reads the devicetree blob a full-framework command probes against.
///
/// The original links one blob per silicon generation in at build time;
/// this CLI has no such build step, so the blob is supplied at runtime via
/// `--dtb PATH`, which also accepts the `CULVERT_DTB` environment variable
/// (see the `env` attribute on [`crate::Cli::dtb`]).
pub fn load_devicetree(dtb: &Option<PathBuf>) -> Result<Vec<u8>> {
    let path = dtb
        .as_ref()
        .context("no devicetree blob given: pass --dtb PATH or set CULVERT_DTB")?;
    std::fs::read(path).with_context(|| format!("reading devicetree blob at {}", path.display()))
}

pub fn parse_u32(s: &str) -> Result<u32> {
    let s = s.trim();
    let (s, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else {
        (s, 10)
    };
    u32::from_str_radix(s, radix).with_context(|| format!("invalid integer '{s}'"))
}
