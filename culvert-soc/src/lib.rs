//! The SoC driver framework (§4.6/§4.7): a static descriptor table of
//! per-peripheral drivers, probed against a devicetree blob once the
//! silicon revision has been identified, plus the bridge-controller
//! registry the discovery pipeline (§4.8) and `culvert-reset` drive.
//!
//! Grounded on `src/soc.c`/`src/soc.h` (the `soc_device_*` helpers and the
//! `REGISTER_SOC_DRIVER` table) and `src/soc/bridgectl.c`/`.h` (the bridge
//! controller registry). The original's linker-section `AUTODATA_TYPE`
//! registration is reimplemented as a `LazyLock`-backed registry, the same
//! redesign already applied to the bridge-driver table in `culvert-bridge`.

mod bridgectl;
mod clk;
mod debugctl;
mod ilpcctl;
mod jtag;
mod otp;
mod pciectl;
mod registry;
mod rev;
mod scu;
mod sdmc;
mod sioctl;
mod strap;
mod trace;
mod uart_mux;
mod vuart;
mod wdt;

use std::any::Any;
use std::fmt;

use culvert_ahb::{AhbError, AhbHandle, BridgeMode};
use culvert_dt::{Dt, DtError, DtNodeRef};

pub use bridgectl::BridgeController;
pub use clk::{Clk, ClkSource};
pub use debugctl::DebugCtl;
pub use ilpcctl::IlpcCtl;
pub use jtag::Jtag;
pub use otp::{Otp, OtpRegion};
pub use pciectl::{DeviceFunction, P2aCtl, XdmaCtl};
pub use rev::{generation, is_supported, name as rev_name, stepping, SocGeneration};
pub use scu::Scu;
pub use sdmc::Sdmc;
pub use sioctl::{Sioctl, SioctlDecode};
pub use strap::Strap;
pub use trace::{Trace, TraceMode};
pub use uart_mux::{MuxObj, UartMux};
pub use vuart::{Vuart, VuartDiscard};
pub use wdt::{prevent_reset, Wdt};

#[derive(Debug, Clone)]
pub enum SocError {
    Ahb(AhbError),
    Dt(DtError),
    NotSupported(String),
    InvalidArgument(String),
    NoDriver(String),
    PermissionDenied(String),
    Timeout(String),
    IoFailure(String),
    /// The target is already in the requested state (`EALREADY` in the
    /// original) — distinct from an error in the sense that the caller's
    /// goal is already met, but still needs to short-circuit the caller.
    AlreadyDone(String),
}

impl fmt::Display for SocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocError::Ahb(e) => write!(f, "{e}"),
            SocError::Dt(e) => write!(f, "{e}"),
            SocError::NotSupported(s) => write!(f, "not supported: {s}"),
            SocError::InvalidArgument(s) => write!(f, "invalid argument: {s}"),
            SocError::NoDriver(s) => write!(f, "driver not found: {s}"),
            SocError::PermissionDenied(s) => write!(f, "permission denied: {s}"),
            SocError::Timeout(s) => write!(f, "timed out: {s}"),
            SocError::IoFailure(s) => write!(f, "I/O failure: {s}"),
            SocError::AlreadyDone(s) => write!(f, "already done: {s}"),
        }
    }
}

impl std::error::Error for SocError {}

impl From<AhbError> for SocError {
    fn from(e: AhbError) -> Self {
        SocError::Ahb(e)
    }
}

impl From<DtError> for SocError {
    fn from(e: DtError) -> Self {
        SocError::Dt(e)
    }
}

/// A physical AHB sub-range, the Rust analogue of `struct soc_region`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocRegion {
    pub start: u32,
    pub length: u32,
}

/// One initialized peripheral driver instance, keyed by driver name (for
/// drivers with multiple matching nodes, e.g. `wdt1`/`wdt2`/`wdt3`, also by
/// node name).
struct SocDevice {
    driver_name: &'static str,
    node_name: String,
    drvdata: Box<dyn Any + Send + Sync>,
}

/// A peripheral driver descriptor, analogous to `struct soc_driver`. `init`
/// receives the matched devicetree node and may look up sibling drivers via
/// [`Soc::driver_get_drvdata`] before they are removed from scope.
pub trait SocDriver: Send + Sync {
    fn name(&self) -> &'static str;
    fn compatible(&self) -> &'static [&'static str];

    /// Set for drivers with several sibling nodes sharing one compatible
    /// string (`wdt1`..`wdt3`): every matching node gets its own `init`
    /// call and its own [`SocDevice`], distinguished by node name via
    /// [`Soc::driver_get_drvdata_by_name`]. Singleton peripherals (the
    /// common case) leave this `false` and only the first match is used.
    fn multi_instance(&self) -> bool {
        false
    }

    fn init(
        &self,
        soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn Any + Send + Sync>, SocError>;
    fn destroy(&self, _drvdata: Box<dyn Any + Send + Sync>) {}
}

/// A probed SoC: its silicon revision, its devicetree blob, the bridge
/// transport beneath it, and the live peripheral drivers and bridge
/// controllers built on top of it.
pub struct Soc {
    rev: u32,
    blob: Vec<u8>,
    ahb: AhbHandle,
    devices: Vec<SocDevice>,
    bridges: Vec<Box<dyn BridgeController>>,
}

impl Soc {
    /// Identifies the silicon revision over `ahb`, then builds every
    /// peripheral driver whose `compatible` list matches a node in `blob`.
    /// Drivers are probed in registry order (dependencies — `scu`, `clk`,
    /// `sdmc`, ... — precede their dependents) and, on failure, already
    /// initialized drivers are torn down in reverse order before the error
    /// is returned.
    pub fn probe(mut ahb: AhbHandle, blob: Vec<u8>) -> Result<Self, SocError> {
        let rev = rev::probe(&mut ahb)?;
        if !rev::is_supported(rev) {
            log::warn!("soc: unrecognised silicon revision {rev:#010x}, proceeding anyway");
        }

        let mut soc = Soc {
            rev,
            blob,
            ahb,
            devices: Vec::new(),
            bridges: Vec::new(),
        };

        for driver in registry::drivers() {
            // Parsed from a local copy of the blob, not from `soc.blob`
            // directly: `node` below borrows from it, and `driver.init`
            // needs a concurrent `&mut soc`.
            let blob = soc.blob.clone();
            let dt = Dt::from_bytes(&blob)?;

            let nodes: Vec<_> = if driver.multi_instance() {
                driver.compatible().iter().flat_map(|c| dt.find_all_compatible(c)).collect()
            } else {
                match driver.compatible().iter().find_map(|c| dt.find_compatible(c).ok()) {
                    Some(node) => vec![node],
                    None => continue,
                }
            };

            for node in nodes {
                let node_name = node.name().to_string();
                match driver.init(&mut soc, &node) {
                    Ok(drvdata) => soc.devices.push(SocDevice {
                        driver_name: driver.name(),
                        node_name,
                        drvdata,
                    }),
                    Err(e) => {
                        log::error!("soc: driver '{}' failed to initialize: {e}", driver.name());
                        soc.unwind();
                        return Err(e);
                    }
                }
            }
        }

        Ok(soc)
    }

    fn unwind(&mut self) {
        while let Some(dev) = self.devices.pop() {
            driver_destroy_erased(dev.driver_name, dev.drvdata);
        }
    }

    pub fn destroy(mut self) {
        self.unwind();
    }

    pub fn rev(&self) -> u32 {
        self.rev
    }

    pub fn generation(&self) -> SocGeneration {
        rev::generation(self.rev)
    }

    pub fn stepping(&self) -> i32 {
        rev::stepping(self.rev)
    }

    pub fn dt(&self) -> Result<Dt<'_>, SocError> {
        Ok(Dt::from_bytes(&self.blob)?)
    }

    pub fn ahb(&mut self) -> &mut AhbHandle {
        &mut self.ahb
    }

    pub fn read(&mut self, phys: u32, buf: &mut [u8]) -> Result<usize, SocError> {
        Ok(self.ahb.read(phys, buf)?)
    }

    pub fn write(&mut self, phys: u32, buf: &[u8]) -> Result<usize, SocError> {
        Ok(self.ahb.write(phys, buf)?)
    }

    pub fn readl(&mut self, phys: u32) -> Result<u32, SocError> {
        Ok(self.ahb.readl(phys)?)
    }

    pub fn writel(&mut self, phys: u32, value: u32) -> Result<(), SocError> {
        Ok(self.ahb.writel(phys, value)?)
    }

    /// Looks up a driver's context by driver name, downcasting to `T`. Used
    /// by dependent drivers (`wdt` needing `clk`, `jtag` needing `scu`, ...)
    /// during their own `init`.
    pub fn driver_get_drvdata<T: 'static>(&self, driver_name: &str) -> Option<&T> {
        self.devices
            .iter()
            .find(|d| d.driver_name == driver_name)
            .and_then(|d| d.drvdata.downcast_ref::<T>())
    }

    /// Like [`Soc::driver_get_drvdata`] but also matches on the devicetree
    /// node name, for drivers with multiple instances (`wdt1`..`wdt3`).
    pub fn driver_get_drvdata_by_name<T: 'static>(
        &self,
        driver_name: &str,
        node_name: &str,
    ) -> Option<&T> {
        self.devices
            .iter()
            .find(|d| d.driver_name == driver_name && d.node_name == node_name)
            .and_then(|d| d.drvdata.downcast_ref::<T>())
    }

    pub fn register_bridge_controller(&mut self, bridge: Box<dyn BridgeController>) {
        self.bridges.push(bridge);
    }

    pub fn bridge_controllers(&self) -> &[Box<dyn BridgeController>] {
        &self.bridges
    }

    pub fn bridge_controller(&self, name: &str) -> Option<&dyn BridgeController> {
        self.bridges.iter().find(|b| b.name() == name).map(|b| b.as_ref())
    }

    /// Calls [`BridgeController::report`] on every registered controller,
    /// returning each one's name and discovered mode.
    ///
    /// The controllers are temporarily taken out of `self.bridges` so that
    /// `report`'s `&mut Soc` doesn't conflict with the `&dyn
    /// BridgeController` borrow the loop holds — mirroring the "take
    /// ownership, operate, put back" pattern `HostRegistry::take_ahb` uses
    /// for the same reason on the transport side.
    pub fn report_bridge_controllers(&mut self) -> Result<Vec<(&'static str, BridgeMode)>, SocError> {
        let bridges = std::mem::take(&mut self.bridges);
        let mut results = Vec::with_capacity(bridges.len());
        let mut failure = None;
        for bridge in &bridges {
            match bridge.report(self) {
                Ok(mode) => results.push((bridge.name(), mode)),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        self.bridges = bridges;

        match failure {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    /// Calls [`BridgeController::enforce`] on every registered controller
    /// with `mode`. Same take-out/put-back borrow pattern as
    /// [`Soc::report_bridge_controllers`].
    pub fn enforce_bridge_controllers(&mut self, mode: BridgeMode) -> Result<(), SocError> {
        let bridges = std::mem::take(&mut self.bridges);
        let mut failure = None;
        for bridge in &bridges {
            if let Err(e) = bridge.enforce(self, mode) {
                failure = Some(e);
                break;
            }
        }
        self.bridges = bridges;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Erases the driver-destroy call through the registry lookup by name,
/// since `SocDevice::destroy` is a plain fn pointer (the trait object
/// itself isn't stored per-device).
fn driver_destroy_erased(driver_name: &'static str, drvdata: Box<dyn Any + Send + Sync>) {
    if let Some(driver) = registry::drivers().iter().find(|d| d.name() == driver_name) {
        driver.destroy(drvdata);
    }
}

/// Extracts the `index`-th memory region named by a node's `reg-names`
/// property, falling back to positional lookup when `reg-names` is absent
/// — mirrors the fallback `soc_device_get_memory_region_named` needs since
/// not every node bothers naming single-region `reg` properties.
pub fn device_memory_named(
    node: &DtNodeRef,
    name: &str,
    index: usize,
) -> Result<SocRegion, SocError> {
    if let Some(names) = node.property_str("reg-names") {
        if let Some(pos) = names.split('\0').position(|n| n == name) {
            let (start, length) = node.reg(pos)?;
            return Ok(SocRegion { start, length });
        }
    }
    let (start, length) = node.reg(index)?;
    Ok(SocRegion { start, length })
}

pub fn device_memory(node: &DtNodeRef) -> Result<SocRegion, SocError> {
    let (start, length) = node.reg(0)?;
    Ok(SocRegion { start, length })
}
