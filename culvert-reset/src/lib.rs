//! The `reset soc <wdt-name>` choreography. Grounded on `src/cmd/reset.c`'s
//! `cmd_reset`: gate the ARM clock if the transport isn't `devmem` (devmem
//! runs on the BMC itself, so there's no host-side CPU to gate), prevent
//! every other watchdog from firing mid-reset, then let the named instance
//! perform the reset.

use std::fmt;

use culvert_soc::{Soc, SocError};

#[derive(Debug, Clone)]
pub struct ResetError(SocError);

impl fmt::Display for ResetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ResetError {}

impl From<SocError> for ResetError {
    fn from(e: SocError) -> Self {
        ResetError(e)
    }
}

/// Resets the SoC via the named watchdog instance (e.g. `"wdt1"`).
///
/// Mirrors `cmd_reset`'s cleanup ordering: the ARM clock is gated before
/// the reset is armed (skipped over `devmem`, which has no separate host
/// CPU to gate) and ungated again if anything fails before the watchdog
/// itself fires — a successful reset ungates it as the last step of
/// [`culvert_soc::Wdt::perform_reset`] instead, once the BMC is back.
pub fn reset_soc(soc: &mut Soc, wdt_name: &str) -> Result<(), ResetError> {
    let gate_clk = soc.ahb().name() != "devmem";
    let clk = soc
        .driver_get_drvdata::<culvert_soc::Clk>("clk")
        .copied()
        .ok_or_else(|| SocError::NoDriver("clk".into()))?;

    if gate_clk {
        log::info!("Gating ARM clock");
        clk.disable(soc, culvert_soc::ClkSource::Arm)?;
    }

    log::info!("Preventing system reset");
    if let Err(e) = culvert_soc::prevent_reset(soc) {
        if gate_clk {
            log::info!("Ungating ARM clock");
            let _ = clk.enable(soc, culvert_soc::ClkSource::Arm);
        }
        return Err(e.into());
    }

    log::info!("Performing SoC reset via {wdt_name}");
    let wdt = match soc
        .driver_get_drvdata_by_name::<culvert_soc::Wdt>("wdt", wdt_name)
        .copied()
        .ok_or_else(|| SocError::NoDriver(wdt_name.into()))
    {
        Ok(wdt) => wdt,
        Err(e) => {
            if gate_clk {
                log::info!("Ungating ARM clock");
                let _ = clk.enable(soc, culvert_soc::ClkSource::Arm);
            }
            return Err(e.into());
        }
    };

    if let Err(e) = wdt.perform_reset(soc) {
        if gate_clk {
            log::info!("Ungating ARM clock");
            let _ = clk.enable(soc, culvert_soc::ClkSource::Arm);
        }
        return Err(e.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_passes_through() {
        let err: ResetError = SocError::NoDriver("wdt9".into()).into();
        assert!(err.to_string().contains("wdt9"));
    }
}
