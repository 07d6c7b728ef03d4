//! Seam to the kernel-reading toolkit.
//!
//! The inventory never parses kernel contents itself; it asks a
//! [`KernelToolkit`] for the file kind, the objects a file describes and
//! each object's coverage windows. Toolkits report failures the way
//! ephemeris toolkits traditionally do: by raising a fault flag holding a
//! short and a long message. Callers must poll [`KernelToolkit::take_fault`]
//! after every call; [`check`] turns a raised flag into a [`ToolkitError`].
//!
//! [`NativeToolkit`] is a self-contained implementation for DAF (SPK, CK)
//! and text kernels.

mod clock;
mod daf;
mod native;
mod text_kernel;

pub use clock::Sclk01;
pub use daf::{DafFile, DafSummary};
pub use native::NativeToolkit;
pub use text_kernel::{parse_text_kernel, Assignment, KernelPool, PoolValue};

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::intervals::Interval;

/// Kind of kernel file, from its identification word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KernelFileKind {
    /// Binary SPK (ephemeris).
    Spk,
    /// Binary CK (orientation).
    Ck,
    /// Text kernel; holds the `KPL/` subtype (`LSK`, `SCLK`, `FK`, ...).
    Text(String),
    /// Any other recognised kernel (binary PCK, DSK, EK, ...).
    Other(String),
}

impl KernelFileKind {
    /// Whether coverage windows can be read from this kind.
    pub fn has_coverage(&self) -> bool {
        matches!(self, KernelFileKind::Spk | KernelFileKind::Ck)
    }
}

impl fmt::Display for KernelFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelFileKind::Spk => f.write_str("SPK"),
            KernelFileKind::Ck => f.write_str("CK"),
            KernelFileKind::Text(sub) => write!(f, "TEXT/{}", sub),
            KernelFileKind::Other(id) => f.write_str(id),
        }
    }
}

/// A raised toolkit fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolkitFault {
    /// Short symbolic message, e.g. `SPICE(NOSUCHFILE)`.
    pub short: String,
    /// Long human-readable explanation.
    pub long: String,
}

/// Errors surfaced from toolkit calls.
#[derive(Debug, Error)]
pub enum ToolkitError {
    /// The toolkit raised its fault flag.
    #[error("{short}: {long}")]
    Fault { short: String, long: String },

    /// The file is a kernel kind without coverage windows.
    #[error("unsupported kernel type {kind} for {}", path.display())]
    UnsupportedKernel { path: PathBuf, kind: String },

    /// The file has no windows for any negative object id.
    #[error("no coverage found in {}", .0.display())]
    NoCoverage(PathBuf),
}

impl From<ToolkitFault> for ToolkitError {
    fn from(fault: ToolkitFault) -> Self {
        ToolkitError::Fault {
            short: fault.short,
            long: fault.long,
        }
    }
}

/// Operations the inventory needs from a kernel toolkit.
///
/// Methods do not return errors. On failure they raise the fault flag and
/// return an empty or placeholder value.
pub trait KernelToolkit: Send + Sync {
    /// Load a kernel into the toolkit's pool (clock, leapseconds, meta).
    fn furnish(&self, path: &Path);

    /// Identify the kind of kernel at `path`.
    fn file_kind(&self, path: &Path) -> Option<KernelFileKind>;

    /// Object ids (bodies or instruments) described by the file.
    fn objects(&self, path: &Path, kind: &KernelFileKind) -> Vec<i32>;

    /// Coverage windows of `object` in ephemeris seconds, merged and sorted.
    fn coverage(&self, path: &Path, kind: &KernelFileKind, object: i32) -> Vec<Interval>;

    /// Take and clear the fault flag.
    fn take_fault(&self) -> Option<ToolkitFault>;
}

/// Poll `toolkit` for a fault raised by the previous call.
pub fn check(toolkit: &dyn KernelToolkit) -> Result<(), ToolkitError> {
    match toolkit.take_fault() {
        Some(fault) => Err(fault.into()),
        None => Ok(()),
    }
}

/// Fault flag shared by toolkit implementations.
///
/// Only the first fault is kept until the flag is taken.
#[derive(Debug, Default)]
pub struct FaultFlag {
    fault: Mutex<Option<ToolkitFault>>,
}

impl FaultFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag unless a fault is already pending.
    pub fn raise(&self, short: impl Into<String>, long: impl Into<String>) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(ToolkitFault {
                short: short.into(),
                long: long.into(),
            });
        }
    }

    pub fn is_raised(&self) -> bool {
        self.fault.lock().is_some()
    }

    pub fn take(&self) -> Option<ToolkitFault> {
        self.fault.lock().take()
    }
}
