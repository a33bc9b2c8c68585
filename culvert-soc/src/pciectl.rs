//! PCIe endpoint enablement and the P2A/XDMA bridge controllers layered on
//! top of it. Two `BridgeController`s share the same underlying PCIe device
//! configuration register, the way the original's `p2actl`/`xdmactl` share
//! one `struct pciectl` through two embedded `bridgectl` views — here as two
//! structs each holding their own `Copy` of the shared register state, since
//! Rust doesn't have the container_of trick to get back from one embedded
//! struct to a sibling. Grounded on `src/soc/pciectl.c`.

use culvert_ahb::BridgeMode;
use culvert_dt::DtNodeRef;

use crate::bridgectl::{log_status, BridgeController};
use crate::sdmc::Sdmc;
use crate::{device_memory, Soc, SocDriver, SocError, SocRegion};

const SCU_MISC: u32 = 0x02c;
const SCU_PCIE_CONFIG: u32 = 0x180;
const SCU_PCIE_CONFIG_BMC_XDMA: u32 = 1 << 14;
const SCU_PCIE_CONFIG_BMC_MMIO: u32 = 1 << 9;
const SCU_PCIE_CONFIG_BMC: u32 = 1 << 8;
const SCU_PCIE_CONFIG_VGA_XDMA: u32 = 1 << 6;
const SCU_PCIE_CONFIG_VGA_MMIO: u32 = 1 << 1;
const SCU_PCIE_CONFIG_VGA: u32 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcieDevice {
    Vga,
    Bmc,
}

impl PcieDevice {
    fn label(self) -> &'static str {
        match self {
            PcieDevice::Vga => "VGA",
            PcieDevice::Bmc => "BMC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFunction {
    None,
    Mmio,
    Xdma,
}

impl DeviceFunction {
    fn label(self) -> &'static str {
        match self {
            DeviceFunction::None => "none",
            DeviceFunction::Mmio => "MMIO",
            DeviceFunction::Xdma => "XDMA",
        }
    }
}

struct P2aRegion {
    name: &'static str,
    mask: u32,
    start: u32,
    length: u32,
}

struct Endpoint {
    device: PcieDevice,
    device_mask: u32,
    function: DeviceFunction,
    function_mask: u32,
}

struct Pdata {
    endpoints: &'static [Endpoint],
    regions: &'static [P2aRegion],
}

const AST2400_P2A_REGIONS: &[P2aRegion] = &[
    P2aRegion { name: "Firmware", mask: 1 << 22, start: 0x0000_0000, length: 0x1800_0000 },
    P2aRegion { name: "SoC IO", mask: 1 << 23, start: 0x1800_0000, length: 0x0800_0000 },
    P2aRegion { name: "BMC Flash", mask: 1 << 22, start: 0x2000_0000, length: 0x1000_0000 },
    P2aRegion { name: "Host Flash", mask: 1 << 24, start: 0x3000_0000, length: 0x1000_0000 },
    P2aRegion { name: "DRAM", mask: 1 << 25, start: 0x4000_0000, length: 0x2000_0000 },
    P2aRegion { name: "LPC Host", mask: 1 << 23, start: 0x6000_0000, length: 0x2000_0000 },
    P2aRegion { name: "Reserved", mask: 1 << 23, start: 0x8000_0000, length: 0x8000_0000 },
];

const AST2400_PCIE_BRIDGES: &[Endpoint] = &[
    Endpoint {
        device: PcieDevice::Bmc,
        device_mask: SCU_PCIE_CONFIG_BMC,
        function: DeviceFunction::Mmio,
        function_mask: SCU_PCIE_CONFIG_BMC_MMIO,
    },
    Endpoint {
        device: PcieDevice::Vga,
        device_mask: SCU_PCIE_CONFIG_VGA,
        function: DeviceFunction::Mmio,
        function_mask: SCU_PCIE_CONFIG_VGA_MMIO,
    },
    Endpoint {
        device: PcieDevice::Bmc,
        device_mask: SCU_PCIE_CONFIG_BMC,
        function: DeviceFunction::Xdma,
        function_mask: SCU_PCIE_CONFIG_BMC_XDMA,
    },
    Endpoint {
        device: PcieDevice::Vga,
        device_mask: SCU_PCIE_CONFIG_VGA,
        function: DeviceFunction::Xdma,
        function_mask: SCU_PCIE_CONFIG_VGA_XDMA,
    },
];

const AST2400_PDATA: Pdata = Pdata { endpoints: AST2400_PCIE_BRIDGES, regions: AST2400_P2A_REGIONS };

const AST2500_P2A_REGIONS: &[P2aRegion] = &[
    P2aRegion { name: "Firmware", mask: 1 << 22, start: 0x0000_0000, length: 0x1000_0000 },
    P2aRegion { name: "SoC IO", mask: 1 << 23, start: 0x1000_0000, length: 0x1000_0000 },
    P2aRegion { name: "BMC Flash", mask: 1 << 22, start: 0x2000_0000, length: 0x1000_0000 },
    P2aRegion { name: "Host Flash", mask: 1 << 22, start: 0x3000_0000, length: 0x1000_0000 },
    P2aRegion { name: "Reserved", mask: 1 << 23, start: 0x4000_0000, length: 0x2000_0000 },
    P2aRegion { name: "LPC Host", mask: 1 << 24, start: 0x6000_0000, length: 0x2000_0000 },
    P2aRegion { name: "DRAM", mask: 1 << 25, start: 0x8000_0000, length: 0x8000_0000 },
];

const AST2500_PDATA: Pdata = Pdata { endpoints: AST2400_PCIE_BRIDGES, regions: AST2500_P2A_REGIONS };

fn collect_region_mask(pdata: &Pdata, ep: &Endpoint) -> u32 {
    if ep.function != DeviceFunction::Mmio {
        return 0;
    }
    pdata.regions.iter().fold(0, |mask, r| mask | r.mask)
}

#[derive(Clone, Copy)]
struct PciectlShared {
    scu: SocRegion,
    pdata: &'static Pdata,
    sdmc: Sdmc,
}

impl PciectlShared {
    fn device_enforce(&self, soc: &mut Soc, ep: &Endpoint, mode: BridgeMode) -> Result<(), SocError> {
        let mut pcie = soc.readl(self.scu.start + SCU_PCIE_CONFIG)?;

        if mode == BridgeMode::Disabled {
            pcie &= !ep.function_mask;
            return soc.writel(self.scu.start + SCU_PCIE_CONFIG, pcie);
        }

        let mut misc = soc.readl(self.scu.start + SCU_MISC)?;
        let mask = collect_region_mask(self.pdata, ep);
        if mask == 0 {
            return Ok(());
        }

        if mode == BridgeMode::Restricted {
            misc |= mask;
        } else {
            misc &= !mask;
        }
        soc.writel(self.scu.start + SCU_MISC, misc)?;

        pcie |= ep.device_mask | ep.function_mask;
        soc.writel(self.scu.start + SCU_PCIE_CONFIG, pcie)
    }

    fn device_status(&self, soc: &mut Soc, ep: &Endpoint) -> Result<BridgeMode, SocError> {
        let pcie = soc.readl(self.scu.start + SCU_PCIE_CONFIG)?;
        let device_mask = ep.device_mask | ep.function_mask;
        if pcie & device_mask != device_mask {
            return Ok(BridgeMode::Disabled);
        }

        let mask = collect_region_mask(self.pdata, ep);
        if mask == 0 {
            return Ok(BridgeMode::Permissive);
        }

        let misc = soc.readl(self.scu.start + SCU_MISC)?;
        Ok(if misc & mask == mask {
            BridgeMode::Restricted
        } else {
            BridgeMode::Permissive
        })
    }

    fn device_report(&self, soc: &mut Soc, ep: &Endpoint) -> Result<(), SocError> {
        let pcie = soc.readl(self.scu.start + SCU_PCIE_CONFIG)?;

        let device_enabled = pcie & ep.device_mask != 0;
        log::info!("\t{}: {}", ep.device.label(), if device_enabled { "Enabled" } else { "Disabled" });
        if !device_enabled {
            return Ok(());
        }

        let function_enabled = pcie & ep.function_mask != 0;
        log::info!(
            "\t{} on {}: {}",
            ep.function.label(),
            ep.device.label(),
            if function_enabled { "Enabled" } else { "Disabled" }
        );

        Ok(())
    }

    fn enforce(&self, soc: &mut Soc, mode: BridgeMode, function: DeviceFunction) -> Result<(), SocError> {
        for ep in self.pdata.endpoints.iter().filter(|ep| ep.function == function) {
            self.device_enforce(soc, ep, mode)?;
        }
        Ok(())
    }

    fn status(&self, soc: &mut Soc, function: DeviceFunction) -> Result<BridgeMode, SocError> {
        let mut aggregate = BridgeMode::Disabled;
        for ep in self.pdata.endpoints.iter().filter(|ep| ep.function == function) {
            let mode = self.device_status(soc, ep)?;
            if mode < aggregate {
                aggregate = mode;
            }
        }
        Ok(aggregate)
    }

    fn report(&self, soc: &mut Soc, function: DeviceFunction) -> Result<(), SocError> {
        for ep in self.pdata.endpoints.iter().filter(|ep| ep.function == function) {
            self.device_report(soc, ep)?;
        }
        Ok(())
    }
}

pub struct P2aCtl {
    shared: PciectlShared,
}

impl BridgeController for P2aCtl {
    fn name(&self) -> &'static str {
        "p2a"
    }

    fn enforce(&self, soc: &mut Soc, mode: BridgeMode) -> Result<(), SocError> {
        self.shared.enforce(soc, mode, DeviceFunction::Mmio)
    }

    fn status(&self, soc: &mut Soc) -> Result<BridgeMode, SocError> {
        self.shared.status(soc, DeviceFunction::Mmio)
    }

    fn report(&self, soc: &mut Soc) -> Result<BridgeMode, SocError> {
        let mode = self.status(soc)?;
        log_status(self.name(), mode);
        if mode == BridgeMode::Disabled {
            return Ok(mode);
        }

        self.shared.report(soc, DeviceFunction::Mmio)?;

        let misc = soc.readl(self.shared.scu.start + SCU_MISC)?;
        for region in self.shared.pdata.regions {
            let permission = if misc & region.mask != 0 { "Readable" } else { "Writable" };
            let end = region.start + (region.length - 1);
            log::info!("\t[{:#010x} - {:#010x}] {:>10}: {permission}", region.start, end, region.name);
        }

        Ok(mode)
    }
}

pub struct XdmaCtl {
    shared: PciectlShared,
}

impl BridgeController for XdmaCtl {
    fn name(&self) -> &'static str {
        "xdma"
    }

    fn enforce(&self, soc: &mut Soc, mode: BridgeMode) -> Result<(), SocError> {
        self.shared.sdmc.configure_xdma(soc, mode == BridgeMode::Permissive)?;
        self.shared.enforce(soc, mode, DeviceFunction::Xdma)
    }

    fn status(&self, soc: &mut Soc) -> Result<BridgeMode, SocError> {
        let mut mode = self.shared.status(soc, DeviceFunction::Xdma)?;
        if mode == BridgeMode::Permissive && self.shared.sdmc.constrains_xdma(soc)? {
            mode = BridgeMode::Restricted;
        }
        Ok(mode)
    }

    fn report(&self, soc: &mut Soc) -> Result<BridgeMode, SocError> {
        let mode = self.status(soc)?;
        log_status(self.name(), mode);
        if mode == BridgeMode::Disabled {
            return Ok(mode);
        }

        self.shared.report(soc, DeviceFunction::Xdma)?;
        let constrained = self.shared.sdmc.constrains_xdma(soc)?;
        log::info!("\tXDMA is constrained: {}", if constrained { "Yes" } else { "No" });

        Ok(mode)
    }
}

pub struct PciectlDriver;

impl SocDriver for PciectlDriver {
    fn name(&self) -> &'static str {
        "pciectl"
    }

    fn compatible(&self) -> &'static [&'static str] {
        &["aspeed,ast2400-pcie-device-controller", "aspeed,ast2500-pcie-device-controller"]
    }

    fn init(
        &self,
        soc: &mut Soc,
        node: &DtNodeRef,
    ) -> Result<Box<dyn std::any::Any + Send + Sync>, SocError> {
        let scu = device_memory(node)?;
        let sdmc = soc
            .driver_get_drvdata::<Sdmc>("sdmc")
            .copied()
            .ok_or_else(|| SocError::NoDriver("sdmc".into()))?;

        let compatible = node
            .property_str("compatible")
            .ok_or_else(|| SocError::InvalidArgument("pciectl node missing compatible".into()))?;
        let pdata = match compatible {
            "aspeed,ast2400-pcie-device-controller" => &AST2400_PDATA,
            "aspeed,ast2500-pcie-device-controller" => &AST2500_PDATA,
            other => {
                return Err(SocError::InvalidArgument(format!(
                    "unrecognised pciectl compatible '{other}'"
                )))
            }
        };

        let shared = PciectlShared { scu, pdata, sdmc };
        soc.register_bridge_controller(Box::new(P2aCtl { shared }));
        soc.register_bridge_controller(Box::new(XdmaCtl { shared }));

        Ok(Box::new(()))
    }
}
