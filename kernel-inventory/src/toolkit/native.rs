//! Self-contained [`KernelToolkit`] for DAF and text kernels.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::clock::Sclk01;
use super::daf::{read_id_word, DafFile};
use super::text_kernel::{parse_text_kernel, KernelPool};
use super::{FaultFlag, KernelFileKind, KernelToolkit, ToolkitFault};
use crate::intervals::{union_windows, Interval};

/// Native kernel toolkit.
///
/// Text kernels passed to [`furnish`](KernelToolkit::furnish) are parsed
/// into a variable pool; meta-kernels furnish the kernels they list. CK tick
/// conversion uses whichever SCLK01 clocks are in the pool.
#[derive(Debug, Default)]
pub struct NativeToolkit {
    pool: RwLock<KernelPool>,
    furnished: RwLock<Vec<PathBuf>>,
    fault: FaultFlag,
}

impl NativeToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths furnished so far, in load order.
    pub fn furnished(&self) -> Vec<PathBuf> {
        self.furnished.read().clone()
    }

    /// Number of variables in the pool.
    pub fn pool_len(&self) -> usize {
        self.pool.read().len()
    }

    fn load_text(&self, path: &Path, id_word: &str) -> Result<(), ToolkitFault> {
        let text = std::fs::read_to_string(path).map_err(|e| ToolkitFault {
            short: "SPICE(FILEREADFAILED)".to_string(),
            long: format!("Could not read {}: {}", path.display(), e),
        })?;
        let assignments = parse_text_kernel(&text).map_err(|e| ToolkitFault {
            short: "SPICE(BADVARIABLESYNTAX)".to_string(),
            long: format!("{} {}", path.display(), e),
        })?;
        let meta = assignments.iter().any(|a| a.name == "KERNELS_TO_LOAD") || id_word == "KPL/MK";

        self.pool.write().apply(assignments);
        trace!(path = %path.display(), "Loaded text kernel into pool");

        if meta {
            self.load_listed_kernels(path)?;
        }
        Ok(())
    }

    fn load_listed_kernels(&self, meta_path: &Path) -> Result<(), ToolkitFault> {
        let (listed, symbols, values) = {
            let pool = self.pool.read();
            (
                pool.strings("KERNELS_TO_LOAD").unwrap_or_default(),
                pool.strings("PATH_SYMBOLS").unwrap_or_default(),
                pool.strings("PATH_VALUES").unwrap_or_default(),
            )
        };
        if symbols.len() != values.len() {
            return Err(ToolkitFault {
                short: "SPICE(PATHMISMATCH)".to_string(),
                long: format!(
                    "{} has {} PATH_SYMBOLS but {} PATH_VALUES.",
                    meta_path.display(),
                    symbols.len(),
                    values.len()
                ),
            });
        }

        for entry in listed {
            let expanded = symbols
                .iter()
                .zip(&values)
                .fold(entry, |acc, (sym, val)| acc.replace(&format!("${}", sym), val));
            let path = match meta_path.parent() {
                Some(dir) if Path::new(&expanded).is_relative() => dir.join(&expanded),
                _ => PathBuf::from(&expanded),
            };
            self.furnish(&path);
            if self.fault.is_raised() {
                return Ok(());
            }
        }
        Ok(())
    }

    fn daf(&self, path: &Path) -> Option<DafFile> {
        match DafFile::open(path) {
            Ok(daf) => Some(daf),
            Err(e) => {
                self.fault.raise(
                    "SPICE(DAFREADFAIL)",
                    format!("Could not read DAF {}: {}", path.display(), e),
                );
                None
            }
        }
    }

    fn clock(&self, spacecraft: i32) -> Option<Sclk01> {
        match Sclk01::from_pool(&self.pool.read(), spacecraft) {
            Ok(clock) => Some(clock),
            Err(fault) => {
                self.fault.raise(fault.short, fault.long);
                None
            }
        }
    }
}

impl KernelToolkit for NativeToolkit {
    fn furnish(&self, path: &Path) {
        let id_word = match read_id_word(path) {
            Ok(word) => word,
            Err(e) => {
                self.fault.raise(
                    "SPICE(NOSUCHFILE)",
                    format!("The file {} could not be opened: {}", path.display(), e),
                );
                return;
            }
        };

        if id_word.starts_with("KPL/") {
            if let Err(fault) = self.load_text(path, &id_word) {
                self.fault.raise(fault.short, fault.long);
                return;
            }
        } else if !id_word.starts_with("DAF/") && id_word != "NAIF/DAF" {
            self.fault.raise(
                "SPICE(IDWORDNOTKNOWN)",
                format!("The file {} has unrecognised id word '{}'.", path.display(), id_word),
            );
            return;
        }

        self.furnished.write().push(path.to_path_buf());
        debug!(path = %path.display(), id_word = %id_word, "Furnished kernel");
    }

    fn file_kind(&self, path: &Path) -> Option<KernelFileKind> {
        let id_word = match read_id_word(path) {
            Ok(word) => word,
            Err(e) => {
                self.fault.raise(
                    "SPICE(NOSUCHFILE)",
                    format!("The file {} could not be opened: {}", path.display(), e),
                );
                return None;
            }
        };

        match id_word.as_str() {
            "DAF/SPK" => Some(KernelFileKind::Spk),
            "DAF/CK" => Some(KernelFileKind::Ck),
            word if word.starts_with("KPL/") => Some(KernelFileKind::Text(word[4..].to_string())),
            word if word.starts_with("DAF/") || word.starts_with("DAS/") || word == "NAIF/DAF" => {
                Some(KernelFileKind::Other(word.to_string()))
            }
            word => {
                self.fault.raise(
                    "SPICE(IDWORDNOTKNOWN)",
                    format!("The file {} has unrecognised id word '{}'.", path.display(), word),
                );
                None
            }
        }
    }

    fn objects(&self, path: &Path, kind: &KernelFileKind) -> Vec<i32> {
        if !kind.has_coverage() {
            self.fault.raise(
                "SPICE(INVALIDFILETYPE)",
                format!("{} is a {} kernel, which has no segment objects.", path.display(), kind),
            );
            return Vec::new();
        }
        let Some(daf) = self.daf(path) else {
            return Vec::new();
        };

        daf.summaries()
            .iter()
            .filter_map(|s| s.ints.first().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn coverage(&self, path: &Path, kind: &KernelFileKind, object: i32) -> Vec<Interval> {
        let Some(daf) = self.daf(path) else {
            return Vec::new();
        };
        let segments = daf
            .summaries()
            .iter()
            .filter(|s| s.ints.first() == Some(&object) && s.doubles.len() >= 2);

        let windows: Vec<Interval> = match kind {
            KernelFileKind::Spk => segments
                .map(|s| Interval::new(s.doubles[0], s.doubles[1]))
                .collect(),
            KernelFileKind::Ck => {
                // Instrument ids are spacecraft id * 1000 minus an offset.
                let Some(clock) = self.clock(object / 1000) else {
                    return Vec::new();
                };
                segments
                    .map(|s| {
                        Interval::new(
                            clock.ticks_to_et(s.doubles[0]),
                            clock.ticks_to_et(s.doubles[1]),
                        )
                    })
                    .collect()
            }
            other => {
                self.fault.raise(
                    "SPICE(INVALIDFILETYPE)",
                    format!("{} is a {} kernel, which has no coverage.", path.display(), other),
                );
                return Vec::new();
            }
        };

        union_windows(windows)
    }

    fn take_fault(&self) -> Option<ToolkitFault> {
        self.fault.take()
    }
}
