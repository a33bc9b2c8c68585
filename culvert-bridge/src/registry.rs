//! The process-wide bridge-driver registry.
//!
//! The original source built this table from linker sections
//! (`AUTODATA_TYPE`/`REGISTER_BRIDGE_DRIVER`); per §9 this is reimplemented
//! as an ordinary registry populated once at first use via
//! [`std::sync::LazyLock`] — plugin-style, not an ABI trick.
//!
//! Probe order matters: devmem is tried first (fastest, and the only
//! local-only transport), then P2A, then iLPC, matching the design note
//! that the fastest working transport should be selected first since the
//! SoC-revision read depends on it.

use std::sync::LazyLock;

use crate::debug::DebugDriver;
use crate::devmem::DevmemDriver;
use crate::ilpc::IlpcDriver;
use crate::l2a::L2aDriver;
use crate::p2a::P2aDriver;
use crate::BridgeDriver;

static DRIVERS: LazyLock<Vec<Box<dyn BridgeDriver>>> = LazyLock::new(|| {
    vec![
        Box::new(DevmemDriver),
        Box::new(P2aDriver),
        Box::new(IlpcDriver),
        Box::new(L2aDriver),
        Box::new(DebugDriver),
    ]
});

/// Every registered bridge driver, in probe order.
pub fn drivers() -> &'static [Box<dyn BridgeDriver>] {
    &DRIVERS
}
