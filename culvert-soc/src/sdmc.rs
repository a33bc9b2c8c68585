//! DRAM/VRAM sizing and the XDMA access-constraint latch in the SDRAM
//! memory controller's general security register. Grounded on
//! `src/soc/sdmc.c`; the per-generation size tables and `gmp_xdma_mask`
//! constants are copied verbatim.

use culvert_dt::DtNodeRef;

use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

const MCR_CONFIG: u32 = 0x04;
const MCR_GMP: u32 = 0x08;

const VRAM_SIZES: [u32; 4] = [8 << 20, 16 << 20, 32 << 20, 64 << 20];

const AST2400_DRAM_SIZES: [u32; 4] = [64 << 20, 128 << 20, 256 << 20, 512 << 20];
const AST2500_DRAM_SIZES: [u32; 4] = [128 << 20, 256 << 20, 512 << 20, 1024 << 20];
const AST2600_DRAM_SIZES: [u32; 4] = [256 << 20, 512 << 20, 1024 << 20, 2048 << 20];

const AST2400_GMP_XDMA_MASK: u32 = 1 << 16;
const AST2500_GMP_XDMA_MASK: u32 = 1 << 17;
const AST2600_GMP_XDMA_MASK: u32 = (1 << 18) | (1 << 25);

#[derive(Debug, Clone, Copy)]
struct SdmcPdata {
    dram_sizes: [u32; 4],
    gmp_xdma_mask: u32,
}

/// Copy so `pciectl`'s XDMA controller can hold its own value rather than
/// borrowing `Soc::driver_get_drvdata`'s reference across `&mut Soc` calls.
#[derive(Clone, Copy)]
pub struct Sdmc {
    iomem: SocRegion,
    dram: SocRegion,
    pdata: SdmcPdata,
}

impl Sdmc {
    fn readl(&self, soc: &mut Soc, off: u32) -> Result<u32, SocError> {
        soc.readl(self.iomem.start + off)
    }

    fn writel(&self, soc: &mut Soc, off: u32, val: u32) -> Result<(), SocError> {
        soc.writel(self.iomem.start + off, val)
    }

    fn dram_region(&self, mcr_conf: u32) -> SocRegion {
        SocRegion {
            start: self.dram.start,
            length: self.pdata.dram_sizes[(mcr_conf & 3) as usize],
        }
    }

    pub fn get_dram(&self, soc: &mut Soc) -> Result<SocRegion, SocError> {
        let mcr_conf = self.readl(soc, MCR_CONFIG)?;
        Ok(self.dram_region(mcr_conf))
    }

    pub fn get_vram(&self, soc: &mut Soc) -> Result<SocRegion, SocError> {
        let mcr_conf = self.readl(soc, MCR_CONFIG)?;
        let dram = self.dram_region(mcr_conf);
        let length = VRAM_SIZES[((mcr_conf >> 2) & 3) as usize];
        Ok(SocRegion {
            start: dram.start + dram.length - length,
            length,
        })
    }

    pub fn constrains_xdma(&self, soc: &mut Soc) -> Result<bool, SocError> {
        let mcr_gmp = self.readl(soc, MCR_GMP)?;
        Ok(mcr_gmp & self.pdata.gmp_xdma_mask != 0)
    }

    pub fn configure_xdma(&self, soc: &mut Soc, constrain: bool) -> Result<(), SocError> {
        let mut mcr_gmp = self.readl(soc, MCR_GMP)?;
        mcr_gmp &= !self.pdata.gmp_xdma_mask;
        if constrain {
            mcr_gmp |= self.pdata.gmp_xdma_mask;
        }
        self.writel(soc, MCR_GMP, mcr_gmp)
    }
}

pub struct SdmcDriver;

impl SocDriver for SdmcDriver {
    fn name(&self) -> &'static str {
        "sdmc"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &[
            "aspeed,ast2400-sdram-controller",
            "aspeed,ast2500-sdram-controller",
            "aspeed,ast2600-sdram-controller",
        ]
    }

    fn init(
        &self,
        soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let iomem = device_memory(node)?;

        let compatible = node
            .property_str("compatible")
            .ok_or_else(|| SocError::InvalidArgument("sdmc node missing compatible".into()))?;
        let pdata = match compatible {
            "aspeed,ast2400-sdram-controller" => SdmcPdata {
                dram_sizes: AST2400_DRAM_SIZES,
                gmp_xdma_mask: AST2400_GMP_XDMA_MASK,
            },
            "aspeed,ast2500-sdram-controller" => SdmcPdata {
                dram_sizes: AST2500_DRAM_SIZES,
                gmp_xdma_mask: AST2500_GMP_XDMA_MASK,
            },
            "aspeed,ast2600-sdram-controller" => SdmcPdata {
                dram_sizes: AST2600_DRAM_SIZES,
                gmp_xdma_mask: AST2600_GMP_XDMA_MASK,
            },
            other => {
                return Err(SocError::InvalidArgument(format!(
                    "unrecognised sdmc compatible '{other}'"
                )))
            }
        };

        let dram_node = soc.dt()?.find_device_type("memory")?;
        let dram = device_memory(&dram_node)?;

        Ok(Box::new(Sdmc { iomem, dram, pdata }))
    }
}
