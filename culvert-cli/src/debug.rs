//! `culvert debug read|write` — direct access over the debug-UART bridge,
//! coercing the BMC's boot ROM into its debug monitor first. Grounded on
//! `src/cmd/debug.c`'s `cmd_debug`.

use anyhow::{bail, Context, Result};
use culvert_ahb::{AhbHandle, AhbOps};
use culvert_bridge::debug::{DebugBridge, Ts16Console, TtyConsole};
use culvert_bridge::DebugParams;

use crate::direct::{self, Action};
use crate::interface::parse_probe_args;

pub fn run(action: &Action, interface: &[String]) -> Result<()> {
    let args = parse_probe_args(interface)?;
    let Some(params) = args.debug else {
        bail!("debug requires an interface argument: INTERFACE [IP PORT USERNAME PASSWORD]");
    };

    log::info!("Initialising debug interface");
    let ops: Box<dyn AhbOps> = match params {
        DebugParams::Tty(path) => {
            let console = TtyConsole::open(&path).context("opening debug-UART device")?;
            Box::new(DebugBridge::enter(console).context("entering the BMC debug monitor")?)
        }
        DebugParams::Ts16 {
            ip,
            port,
            username,
            password,
        } => {
            let console = Ts16Console::connect(&ip, port, &username, &password)
                .context("connecting to the debug-UART terminal server")?;
            Box::new(DebugBridge::enter(console).context("entering the BMC debug monitor")?)
        }
    };

    let mut ahb = AhbHandle::new("debug", false, ops);
    direct::run(&mut ahb, action)
}
