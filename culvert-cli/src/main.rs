//! `culvert` — a toolkit for driving the AHB bus of ASPEED AST24xx/25xx/
//! 26xx BMC SoCs over whichever bridge is available: the indirect-LPC
//! bridge, a PCIe-to-AHB bridge, the debug UART, or `/dev/mem` when run on
//! the BMC itself. Grounded on `src/culvert.c`'s dispatch table; `console`
//! is out of scope here (see `DESIGN.md`).

mod debug;
mod devmem;
mod direct;
mod ilpc;
mod interface;
mod otp;
mod p2a;
mod probe;
mod read;
mod replace;
mod reset;
mod sfc;
mod trace;
mod write;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::direct::Action;

#[derive(Debug, Parser)]
#[clap(max_term_width = 80, about = "Drive the AHB bus of an ASPEED BMC SoC")]
struct Cli {
    /// Suppress all log output
    #[clap(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (may be repeated)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Devicetree blob describing the target SoC, for commands that probe
    /// the full SoC driver framework
    #[clap(long, global = true, env = "CULVERT_DTB")]
    dtb: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Direct access over the indirect-LPC bridge
    Ilpc {
        #[clap(subcommand)]
        action: Action,
    },
    /// Direct access over the PCIe-to-AHB bridge
    P2a {
        /// PCIe device to bridge through: vga or bmc
        device: String,
        #[clap(subcommand)]
        action: Action,
    },
    /// Direct `/dev/mem` access; only meaningful on the BMC itself
    Devmem {
        #[clap(subcommand)]
        action: Action,
    },
    /// Direct access over the debug-UART bridge
    Debug {
        #[clap(subcommand)]
        action: Action,
        /// INTERFACE [IP PORT USERNAME PASSWORD]
        interface: Vec<String>,
    },
    /// Exfiltrate BMC flash or DRAM to stdout
    Read {
        /// firmware or ram
        kind: String,
        interface: Vec<String>,
    },
    /// Flash a firmware image read from stdin
    Write {
        /// only "firmware" is supported
        kind: String,
        /// Halt and reset a running BMC around the write
        #[clap(long)]
        live: bool,
        interface: Vec<String>,
    },
    /// Scan BMC DRAM for a substring and overwrite it in place
    Replace {
        /// only "ram" is supported
        space: String,
        /// Substring to search for
        match_: String,
        /// Substring to write in its place; must not be longer than MATCH
        replace: String,
        interface: Vec<String>,
    },
    /// Attach a transport and report (or require) the bridge protection level
    Probe {
        /// Restrict bridge-controller probing to a single named controller
        #[clap(short = 'i', long = "interface")]
        interface_name: Option<String>,
        #[clap(short, long)]
        list_interfaces: bool,
        /// integrity or confidentiality
        #[clap(short, long)]
        require: Option<String>,
        interface: Vec<String>,
    },
    /// Reset the SoC via a named watchdog instance
    Reset {
        /// only "soc" is supported
        kind: String,
        wdt: String,
        interface: Vec<String>,
    },
    /// Direct SPI-flash-controller access
    Sfc {
        /// only "fmc" is supported
        kind: String,
        /// read, write or erase
        op: String,
        address: String,
        length: String,
        interface: Vec<String>,
    },
    /// One-time-programmable fuse access
    Otp {
        /// read or write
        action: String,
        /// conf or strap
        region: String,
        /// write: two numeric arguments, then the trailing interface block
        rest: Vec<String>,
    },
    /// Watch an AHB address for accesses until interrupted
    Trace {
        address: String,
        width: String,
        /// read or write
        mode: String,
        interface: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        log::LevelFilter::Off
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new().filter_level(level).init();

    match &cli.command {
        Command::Ilpc { action } => ilpc::run(action),
        Command::P2a { device, action } => p2a::run(device, action),
        Command::Devmem { action } => devmem::run(action),
        Command::Debug { action, interface } => debug::run(action, interface),
        Command::Read { kind, interface } => read::run(kind, interface, &cli.dtb),
        Command::Write { kind, live, interface } => write::run(kind, *live, interface, &cli.dtb),
        Command::Replace { space, match_, replace, interface } => {
            replace::run(space, match_, replace, interface, &cli.dtb)
        }
        Command::Probe {
            interface_name,
            list_interfaces,
            require,
            interface,
        } => probe::run(
            interface,
            interface_name.as_deref(),
            *list_interfaces,
            require.as_deref(),
            &cli.dtb,
        ),
        Command::Reset { kind, wdt, interface } => reset::run(kind, wdt, interface, &cli.dtb),
        Command::Sfc { kind, op, address, length, interface } => {
            let offset = interface::parse_u32(address)?;
            let len = interface::parse_u32(length)?;
            sfc::run(kind, op, offset, len, interface, &cli.dtb)
        }
        Command::Otp { action, region, rest } => {
            let (values, interface): (&[String], &[String]) = if action == "write" {
                if rest.len() < 2 {
                    bail!("otp write needs two numeric arguments");
                }
                (&rest[..2], &rest[2..])
            } else {
                (&[], &rest[..])
            };
            otp::run(action, region, values, interface, &cli.dtb)
        }
        Command::Trace { address, width, mode, interface } => {
            trace::run(address, width, mode, interface, &cli.dtb)
        }
    }
}
