// Axel '0vercl0k' Souchet - October 10 2026
//! Put names on addresses, without a symbol database.
//!
//! In order: a symbol out of a text symbol index (if one was loaded), the
//! module whose range contains the address, then the closest identifier
//! looking string preceding the address in the dump.
use std::collections::BTreeMap;

use tracing::debug;

use crate::modules::ModuleInfo;
use crate::patterns::{parse_hex, RE_IDENTIFIER, RE_INDEX_LINE};
use crate::strings::ScannedStrings;

/// A symbol further than this from an address isn't the one containing it.
const MAX_SYMBOL_DISTANCE: u64 = 0x1_0000;

/// How far back we look for an identifier string.
const MAX_STRING_DISTANCE: u64 = 0x400;

/// How many strings we look at on the way back.
const MAX_STRING_CANDIDATES: usize = 8;

/// A parsed text symbol index: `<address> <module!function>` lines.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SymbolIndex {
    symbols: BTreeMap<u64, String>,
    /// Lines that didn't parse.
    pub rejected: usize,
}

impl SymbolIndex {
    /// Parse a text symbol index. Blank lines and `#` comments are skipped;
    /// lines that don't look like `fffff803`1d4a2000 nt!KeBugCheckEx` are
    /// counted in [`SymbolIndex::rejected`]. When an address shows up twice,
    /// the first name wins.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut index = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parsed = RE_INDEX_LINE.captures(line).and_then(|caps| {
                let address = parse_hex(caps[1].as_bytes())?;

                Some((address, caps[2].to_string()))
            });

            match parsed {
                Some((address, name)) => {
                    index.symbols.entry(address).or_insert(name);
                }
                None => index.rejected += 1,
            }
        }

        debug!(
            "{} symbols in the index, {} lines rejected",
            index.symbols.len(),
            index.rejected
        );

        index
    }

    pub fn insert(&mut self, address: u64, name: impl Into<String>) {
        self.symbols.insert(address, name.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The closest symbol at or below `address`.
    fn lookup(&self, address: u64) -> Option<(u64, &str)> {
        self.symbols
            .range(..=address)
            .next_back()
            .map(|(&start, name)| (start, name.as_str()))
    }
}

#[derive(Debug, Clone)]
struct ModuleRange {
    base: u64,
    end: u64,
    /// Name without its extension, the way debuggers show it.
    name: String,
}

/// Resolves addresses to `module!function+0xoffset` like strings.
#[derive(Debug, Default, Clone)]
pub struct SymbolResolver<'a> {
    index: SymbolIndex,
    /// Sorted by `base`.
    modules: Vec<ModuleRange>,
    strings: Option<&'a ScannedStrings>,
}

fn with_offset(name: &str, offset: u64) -> String {
    if offset == 0 {
        name.to_string()
    } else {
        format!("{name}+{offset:#x}")
    }
}

impl<'a> SymbolResolver<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_index(mut self, index: SymbolIndex) -> Self {
        self.index = index;
        self
    }

    /// Register the ranges of the modules whose base and size are known.
    #[must_use]
    pub fn with_modules(mut self, modules: &[ModuleInfo]) -> Self {
        self.modules.extend(modules.iter().filter_map(|m| {
            let (base, end) = m.range()?;
            let name = m
                .name
                .rsplit_once('.')
                .map_or(m.name.as_str(), |(stem, _)| stem);

            Some(ModuleRange {
                base,
                end,
                name: name.to_string(),
            })
        }));
        self.modules.sort_by_key(|m| m.base);
        self
    }

    #[must_use]
    pub fn with_strings(mut self, strings: &'a ScannedStrings) -> Self {
        self.strings = Some(strings);
        self
    }

    fn module(&self, address: u64) -> Option<&ModuleRange> {
        let idx = self.modules.partition_point(|m| m.base <= address);

        idx.checked_sub(1)
            .map(|idx| &self.modules[idx])
            .filter(|m| address < m.end)
    }

    /// Resolve `address`. `file_offset` is where the address' content is in
    /// the dump, if known; it is only used for the string fallback.
    #[must_use]
    pub fn resolve(&self, address: u64, file_offset: Option<u64>) -> Option<String> {
        let module = self.module(address);
        if let Some((start, name)) = self.index.lookup(address) {
            // A symbol has to be in the same module as the address, when we
            // know the module.
            let same_module = module.map_or(true, |m| start >= m.base);
            if same_module && address - start < MAX_SYMBOL_DISTANCE {
                return Some(with_offset(name, address - start));
            }
        }

        if let Some(module) = module {
            return Some(format!("{}+{:#x}", module.name, address - module.base));
        }

        self.nearest_identifier(file_offset?)
    }

    fn nearest_identifier(&self, offset: u64) -> Option<String> {
        let strings = &self.strings?.strings;
        let end = strings.partition_point(|s| s.offset <= offset);

        strings[..end]
            .iter()
            .rev()
            .take(MAX_STRING_CANDIDATES)
            .take_while(|s| offset - s.offset <= MAX_STRING_DISTANCE)
            .find(|s| RE_IDENTIFIER.is_match(&s.text))
            .map(|s| s.text.clone())
    }
}
