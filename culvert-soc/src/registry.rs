//! The driver descriptor table, the Rust replacement for the original's
//! linker-section `REGISTER_SOC_DRIVER`/`AUTODATA_TYPE` registration.
//! Ordering matters: [`Soc::probe`](crate::Soc::probe) walks this table in
//! order, and a driver whose `init` looks up a sibling's drvdata (`sioctl`
//! needs `strap`, `ilpcctl` needs `sioctl`, `jtag` needs `scu`, `wdt` needs
//! `clk`, `pciectl` needs `sdmc`) must come after it.

use std::sync::LazyLock;

use crate::SocDriver;

static DRIVERS: LazyLock<Vec<Box<dyn SocDriver>>> = LazyLock::new(|| {
    vec![
        Box::new(crate::scu::ScuDriver),
        Box::new(crate::clk::ClkDriver),
        Box::new(crate::strap::StrapDriver),
        Box::new(crate::sioctl::SioctlDriver),
        Box::new(crate::sdmc::SdmcDriver),
        Box::new(crate::ilpcctl::IlpcCtlDriver),
        Box::new(crate::jtag::JtagDriver),
        Box::new(crate::wdt::WdtDriver),
        Box::new(crate::otp::OtpDriver),
        Box::new(crate::uart_mux::UartMuxDriver),
        Box::new(crate::vuart::VuartDriver),
        Box::new(crate::debugctl::DebugCtlDriver),
        Box::new(crate::pciectl::PciectlDriver),
        Box::new(crate::trace::TraceDriver),
    ]
});

pub fn drivers() -> &'static [Box<dyn SocDriver>] {
    &DRIVERS
}
