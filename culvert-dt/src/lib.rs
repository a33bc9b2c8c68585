//! The devicetree query layer (§4.5).
//!
//! The blob *format* itself is out of scope: callers hand us the raw FDT
//! bytes for whichever SoC generation they have already identified (by
//! silicon revision word), and this crate only answers queries against it —
//! node lookup by compatible string, by `device_type`, by alias/path, by
//! phandle, and `reg` extraction. Parsing is delegated to the `fdt` crate;
//! everything here is the matching semantics the original `soc_device_*`
//! helpers implemented on top of it.

use std::fmt;

use fdt::node::FdtNode;
use fdt::Fdt;

#[derive(Debug, Clone)]
pub enum DtError {
    /// The blob failed to parse at all — bad magic, truncated, version
    /// mismatch.
    Corrupt(String),
    /// The blob parsed fine but the query found nothing.
    NotFound(String),
}

impl fmt::Display for DtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DtError::Corrupt(s) => write!(f, "corrupt FDT: {s}"),
            DtError::NotFound(s) => write!(f, "not found: {s}"),
        }
    }
}

impl std::error::Error for DtError {}

/// A parsed devicetree blob, borrowed for the lifetime of the bytes the
/// caller supplied.
pub struct Dt<'a> {
    fdt: Fdt<'a>,
}

/// A handle to one node in a [`Dt`], cheap to copy (it just borrows back
/// into the blob).
pub struct DtNodeRef<'a> {
    node: FdtNode<'a, 'a>,
}

impl<'a> Dt<'a> {
    /// Parses `bytes` as a flattened devicetree blob.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, DtError> {
        let fdt = Fdt::new(bytes).map_err(|e| DtError::Corrupt(format!("{e:?}")))?;
        Ok(Dt { fdt })
    }

    /// Finds a node whose `compatible` property contains `compatible`,
    /// checking the root node itself before walking the tree depth-first —
    /// mirroring `soc_device_match_node`, which treats the root as a valid
    /// (if unusual) match target before recursing into children.
    pub fn find_compatible(&self, compatible: &str) -> Result<DtNodeRef<'a>, DtError> {
        let root = self.fdt.root();
        if node_is_compatible(&root, compatible) {
            return Ok(DtNodeRef { node: root });
        }
        self.fdt
            .find_compatible(&[compatible])
            .map(|node| DtNodeRef { node })
            .ok_or_else(|| DtError::NotFound(format!("compatible {compatible:?}")))
    }

    /// Finds a direct child of the root node whose `device_type` property
    /// equals `device_type`. Deliberately non-recursive — ports
    /// `soc_device_from_type`, which only ever looked at the top-level bus
    /// children (`soc`, `memory`, ...), never the whole tree.
    pub fn find_device_type(&self, device_type: &str) -> Result<DtNodeRef<'a>, DtError> {
        self.fdt
            .root()
            .children()
            .find(|n| {
                n.property("device_type")
                    .and_then(|p| p.as_str())
                    .map(|s| s == device_type)
                    .unwrap_or(false)
            })
            .map(|node| DtNodeRef { node })
            .ok_or_else(|| DtError::NotFound(format!("device_type {device_type:?}")))
    }

    /// Finds every node whose `compatible` property contains `compatible`,
    /// root included — the multi-instance counterpart to
    /// [`Dt::find_compatible`], needed where several nodes share one
    /// compatible string (e.g. `wdt1`..`wdt3`).
    pub fn find_all_compatible(&self, compatible: &str) -> Vec<DtNodeRef<'a>> {
        let mut out = Vec::new();
        let root = self.fdt.root();
        if node_is_compatible(&root, compatible) {
            out.push(DtNodeRef { node: root });
        }
        collect_compatible(root, compatible, &mut out);
        out
    }

    /// Resolves `name` as an alias first (`/aliases/<name>`), falling back
    /// to treating it as an absolute node path — matching
    /// `soc_device_from_name`'s alias-first precedence.
    pub fn find_by_name(&self, name: &str) -> Result<DtNodeRef<'a>, DtError> {
        if let Some(aliases) = self.fdt.aliases() {
            if let Some(path) = aliases.resolve(name) {
                if let Some(node) = self.fdt.find_node(path) {
                    return Ok(DtNodeRef { node });
                }
            }
        }
        self.fdt
            .find_node(name)
            .map(|node| DtNodeRef { node })
            .ok_or_else(|| DtError::NotFound(format!("node {name:?}")))
    }

    /// Finds the node with the given `phandle` value.
    pub fn find_phandle(&self, phandle: u32) -> Result<DtNodeRef<'a>, DtError> {
        self.fdt
            .find_phandle(phandle)
            .map(|node| DtNodeRef { node })
            .ok_or_else(|| DtError::NotFound(format!("phandle {phandle:#x}")))
    }
}

fn node_is_compatible(node: &FdtNode, compatible: &str) -> bool {
    node.compatible()
        .map(|c| c.all().any(|s| s == compatible))
        .unwrap_or(false)
}

fn collect_compatible<'a>(node: FdtNode<'a, 'a>, compatible: &str, out: &mut Vec<DtNodeRef<'a>>) {
    for child in node.children() {
        if node_is_compatible(&child, compatible) {
            out.push(DtNodeRef { node: child });
        }
        collect_compatible(child, compatible, out);
    }
}

impl<'a> DtNodeRef<'a> {
    pub fn name(&self) -> &'a str {
        self.node.name
    }

    /// Extracts the `index`-th `(address, size)` pair from this node's
    /// `reg` property, assuming `#address-cells == #size-cells == 1` (true
    /// for every AST24xx/25xx/26xx node this toolkit cares about).
    pub fn reg(&self, index: usize) -> Result<(u32, u32), DtError> {
        let regions: Vec<_> = self
            .node
            .reg()
            .ok_or_else(|| DtError::NotFound(format!("reg property on {}", self.node.name)))?
            .collect();
        let region = regions
            .get(index)
            .ok_or_else(|| DtError::NotFound(format!("reg[{index}] on {}", self.node.name)))?;
        let size = region
            .size
            .ok_or_else(|| DtError::Corrupt(format!("reg[{index}] on {} has no size", self.node.name)))?;
        Ok((region.starting_address as usize as u32, size as u32))
    }

    pub fn property_u32(&self, name: &str) -> Option<u32> {
        self.node.property(name).and_then(|p| p.as_usize()).map(|v| v as u32)
    }

    pub fn property_str(&self, name: &str) -> Option<&'a str> {
        self.node.property(name).and_then(|p| p.as_str())
    }

    pub fn children(&self) -> impl Iterator<Item = DtNodeRef<'a>> + '_ {
        self.node.children().map(|node| DtNodeRef { node })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A hand-built minimal FDT: a root node `compatible = "aspeed,ast2600"`
    // with one child `soc` (`device_type = "soc"`, `reg = <0x1e600000 0x200000>`)
    // and one alias `wdt -> /soc`. No production blob ships with this crate
    // (none exist in the original corpus to compile from); this fixture only
    // exercises the query logic above.
    fn build_fixture() -> Vec<u8> {
        fdt_fixture::build()
    }

    #[test]
    fn finds_root_by_compatible() {
        let bytes = build_fixture();
        let dt = Dt::from_bytes(&bytes).unwrap();
        let root = dt.find_compatible("aspeed,ast2600").unwrap();
        assert_eq!(root.name(), "");
    }

    #[test]
    fn finds_child_by_device_type() {
        let bytes = build_fixture();
        let dt = Dt::from_bytes(&bytes).unwrap();
        let soc = dt.find_device_type("soc").unwrap();
        assert_eq!(soc.name(), "soc");
    }

    #[test]
    fn resolves_alias_before_path() {
        let bytes = build_fixture();
        let dt = Dt::from_bytes(&bytes).unwrap();
        let soc = dt.find_by_name("wdt").unwrap();
        assert_eq!(soc.name(), "soc");
    }

    #[test]
    fn finds_every_matching_node() {
        let bytes = build_fixture();
        let dt = Dt::from_bytes(&bytes).unwrap();
        let matches = dt.find_all_compatible("aspeed,ast2600");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name(), "");
    }

    #[test]
    fn missing_compatible_is_not_found() {
        let bytes = build_fixture();
        let dt = Dt::from_bytes(&bytes).unwrap();
        assert!(matches!(
            dt.find_compatible("no,such-device"),
            Err(DtError::NotFound(_))
        ));
    }

    #[test]
    fn reg_extraction_reads_address_and_size() {
        let bytes = build_fixture();
        let dt = Dt::from_bytes(&bytes).unwrap();
        let soc = dt.find_device_type("soc").unwrap();
        assert_eq!(soc.reg(0).unwrap(), (0x1e60_0000, 0x0020_0000));
    }

    /// A tiny, dependency-free FDT encoder used only to build the test
    /// fixture above — not a general-purpose devicetree compiler.
    mod fdt_fixture {
        const FDT_BEGIN_NODE: u32 = 1;
        const FDT_END_NODE: u32 = 2;
        const FDT_PROP: u32 = 3;
        const FDT_END: u32 = 9;

        fn pad4(buf: &mut Vec<u8>) {
            while buf.len() % 4 != 0 {
                buf.push(0);
            }
        }

        struct Strings {
            blob: Vec<u8>,
        }

        impl Strings {
            fn new() -> Self {
                Strings { blob: Vec::new() }
            }

            fn offset(&mut self, s: &str) -> u32 {
                let off = self.blob.len() as u32;
                self.blob.extend_from_slice(s.as_bytes());
                self.blob.push(0);
                off
            }
        }

        fn push_prop(buf: &mut Vec<u8>, strings: &mut Strings, name: &str, value: &[u8]) {
            buf.extend_from_slice(&FDT_PROP.to_be_bytes());
            buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
            buf.extend_from_slice(&strings.offset(name).to_be_bytes());
            buf.extend_from_slice(value);
            pad4(buf);
        }

        fn push_name(buf: &mut Vec<u8>, name: &str) {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
            pad4(buf);
        }

        pub fn build() -> Vec<u8> {
            let mut strings = Strings::new();
            let mut structure = Vec::new();

            structure.extend_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
            push_name(&mut structure, "");
            push_prop(&mut structure, &mut strings, "compatible", b"aspeed,ast2600\0");

            structure.extend_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
            push_name(&mut structure, "aliases");
            push_prop(&mut structure, &mut strings, "wdt", b"/soc\0");
            structure.extend_from_slice(&FDT_END_NODE.to_be_bytes());

            structure.extend_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
            push_name(&mut structure, "soc");
            push_prop(&mut structure, &mut strings, "device_type", b"soc\0");
            let mut reg = Vec::new();
            reg.extend_from_slice(&0x1e60_0000u32.to_be_bytes());
            reg.extend_from_slice(&0x0020_0000u32.to_be_bytes());
            push_prop(&mut structure, &mut strings, "reg", &reg);
            structure.extend_from_slice(&FDT_END_NODE.to_be_bytes());

            structure.extend_from_slice(&FDT_END_NODE.to_be_bytes());
            structure.extend_from_slice(&FDT_END.to_be_bytes());

            const HEADER_LEN: u32 = 40;
            const RSVMAP_LEN: u32 = 16;
            let off_mem_rsvmap = HEADER_LEN;
            let off_dt_struct = off_mem_rsvmap + RSVMAP_LEN;
            let off_dt_strings = off_dt_struct + structure.len() as u32;
            let totalsize = off_dt_strings + strings.blob.len() as u32;

            let mut out = Vec::new();
            out.extend_from_slice(&0xd00d_feedu32.to_be_bytes());
            out.extend_from_slice(&totalsize.to_be_bytes());
            out.extend_from_slice(&off_dt_struct.to_be_bytes());
            out.extend_from_slice(&off_dt_strings.to_be_bytes());
            out.extend_from_slice(&off_mem_rsvmap.to_be_bytes());
            out.extend_from_slice(&17u32.to_be_bytes()); // version
            out.extend_from_slice(&16u32.to_be_bytes()); // last_comp_version
            out.extend_from_slice(&0u32.to_be_bytes()); // boot_cpuid_phys
            out.extend_from_slice(&(strings.blob.len() as u32).to_be_bytes());
            out.extend_from_slice(&(structure.len() as u32).to_be_bytes());
            debug_assert_eq!(out.len() as u32, HEADER_LEN);
            out.extend_from_slice(&0u64.to_be_bytes());
            out.extend_from_slice(&0u64.to_be_bytes());
            debug_assert_eq!(out.len() as u32, off_dt_struct);
            out.extend_from_slice(&structure);
            out.extend_from_slice(&strings.blob);
            out
        }
    }
}
