//! PCI device discovery via `/sys/bus/pci/devices`, matching the original
//! `pci_open()`: scan every device directory, read its `vendor`/`device`
//! sysfs files, and open the matching device's `resourceN` file.

use std::fs;
use std::path::PathBuf;

use culvert_ahb::AhbError;

const SYSFS_PCI_DEVICES: &str = "/sys/bus/pci/devices";

fn read_sysfs_id(path: &std::path::Path) -> Option<u32> {
    let text = fs::read_to_string(path).ok()?;
    let text = text.trim();
    let hex = text.strip_prefix("0x").unwrap_or(text);
    u32::from_str_radix(hex, 16).ok()
}

/// Finds the PCI device directory whose `vendor`/`device` match, and
/// returns the path to its `resource<bar>` file.
pub fn find_resource(vendor: u32, device: u32, bar: u32) -> Result<PathBuf, AhbError> {
    let entries = fs::read_dir(SYSFS_PCI_DEVICES)
        .map_err(|e| AhbError::io(format!("reading {SYSFS_PCI_DEVICES}: {e}")))?;
    for entry in entries.flatten() {
        let dir = entry.path();
        let Some(v) = read_sysfs_id(&dir.join("vendor")) else {
            continue;
        };
        let Some(d) = read_sysfs_id(&dir.join("device")) else {
            continue;
        };
        if v == vendor && d == device {
            let resource = dir.join(format!("resource{bar}"));
            if resource.exists() {
                return Ok(resource);
            }
        }
    }
    Err(AhbError::not_supported(format!(
        "no PCI device {vendor:04x}:{device:04x} with resource{bar}"
    )))
}

/// Triggers a PCI bus rescan (§4.8 step 4a), used after opportunistically
/// flipping config bits that expose a previously-hidden function.
pub fn rescan() -> Result<(), AhbError> {
    fs::write("/sys/bus/pci/rescan", b"1")
        .map_err(|e| AhbError::io(format!("writing /sys/bus/pci/rescan: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_0x_prefixed_hex_ids() {
        let dir = std::env::temp_dir().join(format!("culvert-pci-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let f = dir.join("vendor");
        std::fs::write(&f, "0x1a03\n").unwrap();
        assert_eq!(read_sysfs_id(&f), Some(0x1a03));
        std::fs::remove_dir_all(&dir).ok();
    }
}
