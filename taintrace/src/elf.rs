use object::{File, Object, ObjectSegment, ObjectSymbol, SymbolKind};
use serde_derive::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub address: u64,
    pub bytes: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub address: u64,
    #[serde(default)]
    pub size: u64,
    pub name: String,
}

impl Symbol {
    pub fn contains(&self, address: u64) -> bool {
        address == self.address || (address > self.address && address < self.address + self.size)
    }
}

/// File-backed contents of every loadable segment, at its link address.
pub fn load_segments(data: &[u8]) -> Result<Vec<MemoryRegion>> {
    let binfile = File::parse(data)?;
    let mut regions = Vec::new();
    for segment in binfile.segments() {
        let bytes = segment.data()?;
        if bytes.is_empty() {
            continue;
        }
        regions.push(MemoryRegion {
            address: segment.address(),
            bytes: bytes.to_vec(),
        });
    }
    Ok(regions)
}

/// Named functions from the static and dynamic symbol tables, by address.
pub fn function_symbols(data: &[u8]) -> Result<Vec<Symbol>> {
    let binfile = File::parse(data)?;
    let mut symbols = binfile
        .symbols()
        .chain(binfile.dynamic_symbols())
        .filter(|s| s.kind() == SymbolKind::Text && s.address() != 0)
        .filter_map(|s| {
            let name = s.name().ok()?;
            if name.is_empty() {
                return None;
            }
            Some(Symbol {
                address: s.address(),
                size: s.size(),
                name: name.to_string(),
            })
        })
        .collect::<Vec<_>>();
    symbols.sort_by_key(|s| s.address);
    symbols.dedup_by_key(|s| s.address);
    Ok(symbols)
}
