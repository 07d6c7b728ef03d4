//! Type 1 spacecraft clock (SCLK01) conversion.
//!
//! CK segment bounds are encoded spacecraft clock ticks. The SCLK kernel for
//! the spacecraft maps ticks to a parallel time system through piecewise
//! linear coefficient records `(ticks, parallel_time, rate)`, where `rate` is
//! seconds per count of the most significant clock field.

use super::text_kernel::KernelPool;
use super::ToolkitFault;

/// Parallel time system of an SCLK01 clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelTime {
    Tdb,
    Tdt,
}

/// A loaded SCLK01 clock model.
#[derive(Debug, Clone, PartialEq)]
pub struct Sclk01 {
    spacecraft: i32,
    ticks_per_count: f64,
    parallel: ParallelTime,
    coefficients: Vec<[f64; 3]>,
}

impl Sclk01 {
    /// Read the clock for `spacecraft` (a negative NAIF id) from `pool`.
    pub fn from_pool(pool: &KernelPool, spacecraft: i32) -> Result<Self, ToolkitFault> {
        let n = spacecraft.unsigned_abs();

        if let Some(data_type) = pool.number(&format!("SCLK_DATA_TYPE_{}", n)) {
            if data_type != 1.0 {
                return Err(ToolkitFault {
                    short: "SPICE(NOTSUPPORTED)".to_string(),
                    long: format!(
                        "SCLK data type {} for spacecraft {} is not supported.",
                        data_type, spacecraft
                    ),
                });
            }
        }

        let moduli = require(pool, &format!("SCLK01_MODULI_{}", n), spacecraft)?;
        let raw = require(pool, &format!("SCLK01_COEFFICIENTS_{}", n), spacecraft)?;
        if raw.is_empty() || raw.len() % 3 != 0 {
            return Err(ToolkitFault {
                short: "SPICE(INVALIDCOUNT)".to_string(),
                long: format!(
                    "SCLK01_COEFFICIENTS_{} holds {} values; expected a non-empty multiple of 3.",
                    n,
                    raw.len()
                ),
            });
        }

        let parallel = match pool.number(&format!("SCLK01_TIME_SYSTEM_{}", n)) {
            Some(v) if v == 2.0 => ParallelTime::Tdt,
            _ => ParallelTime::Tdb,
        };

        let ticks_per_count = moduli.iter().skip(1).product::<f64>().max(1.0);
        let coefficients = raw.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();

        Ok(Self {
            spacecraft,
            ticks_per_count,
            parallel,
            coefficients,
        })
    }

    pub fn spacecraft(&self) -> i32 {
        self.spacecraft
    }

    pub fn parallel_time(&self) -> ParallelTime {
        self.parallel
    }

    /// Convert encoded ticks to ephemeris seconds past J2000 (TDB).
    pub fn ticks_to_et(&self, ticks: f64) -> f64 {
        let idx = self
            .coefficients
            .partition_point(|record| record[0] <= ticks)
            .saturating_sub(1);
        let [base_ticks, base_time, rate] = self.coefficients[idx];
        let parallel = base_time + (ticks - base_ticks) * rate / self.ticks_per_count;

        match self.parallel {
            ParallelTime::Tdb => parallel,
            ParallelTime::Tdt => tdt_to_tdb(parallel),
        }
    }
}

fn require(pool: &KernelPool, name: &str, spacecraft: i32) -> Result<Vec<f64>, ToolkitFault> {
    pool.numbers(name).ok_or_else(|| ToolkitFault {
        short: "SPICE(KERNELVARNOTFOUND)".to_string(),
        long: format!(
            "Kernel variable {} for spacecraft {} was not found; has an SCLK kernel been loaded?",
            name, spacecraft
        ),
    })
}

const TDB_K: f64 = 1.657e-3;
const TDB_EB: f64 = 1.671e-2;
const TDB_M0: f64 = 6.239996;
const TDB_M1: f64 = 1.990_968_71e-7;

/// Terrestrial dynamical time to barycentric dynamical time, both in seconds
/// past J2000.
pub fn tdt_to_tdb(tdt: f64) -> f64 {
    let m = TDB_M0 + TDB_M1 * tdt;
    let e = m + TDB_EB * m.sin();
    tdt + TDB_K * e.sin()
}
