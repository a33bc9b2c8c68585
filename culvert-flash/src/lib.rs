//! The SPI flash controller shim and flash-chip discipline layer (§4.10).
//! [`sfc`] is the thin register-level shim over the AHB-mapped controller
//! block and flash aperture; [`chip`] is the chip-identification and
//! erase/write discipline built on top of it. Grounded on `src/sfc.c` and
//! `src/flash.c`.

pub mod chip;
pub mod sfc;

pub use chip::{FlashChip, FlashFlags};
pub use sfc::{Sfc, SfcType};
