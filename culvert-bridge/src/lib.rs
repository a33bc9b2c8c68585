//! Bridge transports and the host registry that probes them.
//!
//! Five independent transports (`ilpc`, `l2a`, `p2a`, `devmem`, `debug`)
//! each implement [`culvert_ahb::AhbOps`]. The registry in [`registry`]
//! lists them in probe order; [`HostRegistry`] is the runtime session that
//! walks that list.

pub mod debug;
pub mod devmem;
pub mod ilpc;
pub mod l2a;
pub mod p2a;
mod pci;
pub mod registry;

use culvert_ahb::{AhbError, AhbHandle};

/// Arguments passed to every driver's `probe`. Only the `debug` transport
/// consumes `debug`; every other driver rejects a non-empty `debug` the
/// way the original rejected any nonzero argc (it doesn't take CLI args).
#[derive(Debug, Clone, Default)]
pub struct ProbeArgs {
    pub debug: Option<DebugParams>,
}

/// Parameters for the `[interface [ip port username password]]` CLI block
/// (§6). `Tty` is a local serial device; `Ts16` is a Digi Portserver
/// TS-16 terminal server reached over TCP.
#[derive(Debug, Clone)]
pub enum DebugParams {
    Tty(String),
    Ts16 {
        ip: String,
        port: u16,
        username: String,
        password: String,
    },
}

/// One registered bridge driver: a name, a "runs on the BMC itself" flag,
/// and a probe function that either attaches (returning an [`AhbHandle`])
/// or declines.
pub trait BridgeDriver: Send + Sync {
    fn name(&self) -> &'static str;

    fn local(&self) -> bool {
        false
    }

    fn probe(&self, args: &ProbeArgs) -> Result<Option<AhbHandle>, AhbError>;
}

/// The runtime session produced by [`host_init`]: every transport that
/// attached, in probe order.
pub struct HostRegistry {
    attached: Vec<AhbHandle>,
}

impl HostRegistry {
    /// Probes every registered driver in order via `driver.probe(args)`,
    /// keeping every `(driver, ahb)` pair that attached. A driver
    /// returning `NotSupported` is treated as "this transport is absent"
    /// and does not abort the scan.
    pub fn init(args: &ProbeArgs) -> Self {
        let mut attached = Vec::new();
        for driver in registry::drivers() {
            match driver.probe(args) {
                Ok(Some(ahb)) => {
                    log::info!("bridge '{}' attached", driver.name());
                    attached.push(ahb);
                }
                Ok(None) => {
                    log::debug!("bridge '{}' not present", driver.name());
                }
                Err(e) if e.is_not_supported() => {
                    log::debug!("bridge '{}' not supported here: {e}", driver.name());
                }
                Err(e) => {
                    log::warn!("bridge '{}' probe failed: {e}", driver.name());
                }
            }
        }
        HostRegistry { attached }
    }

    /// Returns the first attached handle, or the first whose name matches
    /// `prefer` if given.
    pub fn get_ahb(&mut self, prefer: Option<&str>) -> Option<&mut AhbHandle> {
        if let Some(name) = prefer {
            if let Some(pos) = self.attached.iter().position(|a| a.name() == name) {
                return self.attached.get_mut(pos);
            }
        }
        self.attached.first_mut()
    }

    /// Removes and returns the first attached handle, or the first whose
    /// name matches `prefer` if given. Used by callers (the SoC probe
    /// pipeline) that need to take ownership of a single transport rather
    /// than borrow it.
    pub fn take_ahb(&mut self, prefer: Option<&str>) -> Option<AhbHandle> {
        if let Some(name) = prefer {
            if let Some(pos) = self.attached.iter().position(|a| a.name() == name) {
                return Some(self.attached.remove(pos));
            }
        }
        if self.attached.is_empty() {
            None
        } else {
            Some(self.attached.remove(0))
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AhbHandle> {
        self.attached.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }

    /// Tears down every attached transport. Each handle's `Drop`
    /// implementation performs the driver-specific teardown (HICR7/HICR8
    /// restore, key re-lock, unlocking, ...); this simply drops them in
    /// registration order.
    pub fn destroy(&mut self) {
        self.attached.clear();
    }
}

/// Dispatches the `release()` hook through the driver descriptor carried
/// in the handle — in this implementation that's just the vtable method.
pub fn release_from_ahb(ahb: &mut AhbHandle) -> Result<(), AhbError> {
    ahb.release()
}

/// Dispatches the `reinit()` hook.
pub fn reinit_from_ahb(ahb: &mut AhbHandle) -> Result<(), AhbError> {
    ahb.reinit()
}
