//! Controls whether the BMC decodes SuperIO I/O-port cycles at all, and if
//! so on which base port — the devicetree-driven counterpart to the
//! host-side client in `culvert-sio`. Grounded on `src/soc/sioctl.c`.

use culvert_dt::DtNodeRef;

use crate::strap::Strap;
use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

const SCU_HW_STRAP: u32 = 0x070;
const SCU_HW_STRAP_SIO_DEC: u32 = 1 << 20;
const SCU_HW_STRAP_SIO_4E: u32 = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SioctlDecode {
    Disable,
    Port0x2e,
    Port0x4e,
}

#[derive(Debug, Clone, Copy)]
pub struct Sioctl {
    #[allow(dead_code)]
    scu: SocRegion,
}

impl Sioctl {
    fn strap(soc: &Soc) -> Result<Strap, SocError> {
        soc.driver_get_drvdata::<Strap>("strap")
            .copied()
            .ok_or_else(|| SocError::NoDriver("strap".into()))
    }

    pub fn configure(&self, soc: &mut Soc, mode: SioctlDecode) -> Result<(), SocError> {
        if mode == SioctlDecode::Disable {
            let strap = Self::strap(soc)?;
            return strap.clear(soc, SCU_HW_STRAP, SCU_HW_STRAP_SIO_DEC, SCU_HW_STRAP_SIO_DEC);
        }

        let strap = Self::strap(soc)?;
        if mode == SioctlDecode::Port0x4e {
            strap.set(soc, SCU_HW_STRAP, SCU_HW_STRAP_SIO_4E, SCU_HW_STRAP_SIO_4E)?;
        } else {
            strap.clear(soc, SCU_HW_STRAP, SCU_HW_STRAP_SIO_4E, SCU_HW_STRAP_SIO_4E)?;
        }

        let strap = Self::strap(soc)?;
        strap.set(soc, SCU_HW_STRAP, SCU_HW_STRAP_SIO_DEC, SCU_HW_STRAP_SIO_DEC)
    }

    pub fn status(&self, soc: &mut Soc) -> Result<SioctlDecode, SocError> {
        let strap = Self::strap(soc)?;
        let strap_val = strap.read(soc, SCU_HW_STRAP)?;

        if strap_val & SCU_HW_STRAP_SIO_DEC == 0 {
            return Ok(SioctlDecode::Disable);
        }

        Ok(if strap_val & SCU_HW_STRAP_SIO_4E != 0 {
            SioctlDecode::Port0x4e
        } else {
            SioctlDecode::Port0x2e
        })
    }
}

pub struct SioctlDriver;

impl SocDriver for SioctlDriver {
    fn name(&self) -> &'static str {
        "sioctl"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2400-superio", "aspeed,ast2500-superio"]
    }

    fn init(
        &self,
        soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let scu = device_memory(node)?;
        Sioctl::strap(soc)?;
        Ok(Box::new(Sioctl { scu }))
    }
}
