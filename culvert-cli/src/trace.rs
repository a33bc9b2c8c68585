//! `culvert trace ADDRESS WIDTH MODE` — watch an AHB address for accesses
//! until interrupted, then dump the captured record to stdout. Grounded on
//! `src/cmd/trace.c`'s `cmd_trace`; the SIGINT wait itself is this CLI's
//! job (`culvert_trace::TraceSession` only exposes the phases either side
//! of it).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use culvert_bridge::HostRegistry;
use culvert_soc::{Soc, TraceMode};
use culvert_trace::TraceSession;

use crate::interface::{load_devicetree, parse_probe_args, parse_u32};

pub fn run(
    address: &str,
    width: &str,
    mode: &str,
    interface: &[String],
    dtb: &Option<PathBuf>,
) -> Result<()> {
    let address = parse_u32(address)?;
    let width = parse_u32(width)?;
    let mode = match mode {
        "read" => TraceMode::Read,
        "write" => TraceMode::Write,
        other => bail!("unrecognised trace mode: {other}"),
    };

    let args = parse_probe_args(interface)?;
    let devicetree = load_devicetree(dtb)?;

    let mut host = HostRegistry::init(&args);
    let ahb = host
        .take_ahb(None)
        .ok_or_else(|| anyhow::anyhow!("failed to acquire an AHB interface"))?;
    let mut soc = Soc::probe(ahb, devicetree)?;

    let session = TraceSession::start(&mut soc, address, width, mode)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    log::info!("watching {address:#010x} ({width} bytes, {mode:?}) — press Ctrl-C to stop");
    while !interrupted.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    let mut stdout = std::io::stdout();
    let written = session.stop_and_dump(&mut soc, &mut stdout)?;
    log::info!("wrote {written} bytes");

    soc.destroy();
    Ok(())
}
