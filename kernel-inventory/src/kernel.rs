//! Kernel types, quality tiers and filename version handling.
//!
//! Kernel files are grouped by [`KernelType`]; the time-varying types (`ck`,
//! `spk`) are additionally tiered by [`Quality`]. Files that are revisions of
//! the same logical kernel carry a version token in their name (`_v02`,
//! `naif0012`) which [`collapse_latest`] uses to keep only the newest revision.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// Kind of kernel file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KernelType {
    /// Pointing (orientation) kernel. Time-varying.
    Ck,
    /// Ephemeris kernel. Time-varying.
    Spk,
    /// Text ephemeris kernel.
    Tspk,
    /// Leap-second kernel.
    Lsk,
    /// Meta kernel.
    Mk,
    /// Spacecraft clock kernel.
    Sclk,
    /// Instrument addendum kernel.
    Iak,
    /// Instrument kernel.
    Ik,
    /// Frame kernel.
    Fk,
    /// Digital shape kernel.
    Dsk,
    /// Planetary constants kernel.
    Pck,
    /// Events kernel.
    Ek,
}

impl KernelType {
    /// All kernel types, in canonical order.
    pub const ALL: [KernelType; 12] = [
        KernelType::Ck,
        KernelType::Spk,
        KernelType::Tspk,
        KernelType::Lsk,
        KernelType::Mk,
        KernelType::Sclk,
        KernelType::Iak,
        KernelType::Ik,
        KernelType::Fk,
        KernelType::Dsk,
        KernelType::Pck,
        KernelType::Ek,
    ];

    /// Config key / result key for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            KernelType::Ck => "ck",
            KernelType::Spk => "spk",
            KernelType::Tspk => "tspk",
            KernelType::Lsk => "lsk",
            KernelType::Mk => "mk",
            KernelType::Sclk => "sclk",
            KernelType::Iak => "iak",
            KernelType::Ik => "ik",
            KernelType::Fk => "fk",
            KernelType::Dsk => "dsk",
            KernelType::Pck => "pck",
            KernelType::Ek => "ek",
        }
    }

    /// Whether files of this type are only valid within time windows.
    pub fn is_time_varying(&self) -> bool {
        matches!(self, KernelType::Ck | KernelType::Spk)
    }
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KernelType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        KernelType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| InventoryError::UnknownKernelType(s.to_string()))
    }
}

/// Precision tier of a time-varying kernel.
///
/// Variants are declared from least to most preferred, so the derived
/// ordering matches the default preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    NoQuality,
    Predicted,
    Nadir,
    Reconstructed,
    Smithed,
}

impl Quality {
    /// All tiers, least preferred first.
    pub const ALL: [Quality; 5] = [
        Quality::NoQuality,
        Quality::Predicted,
        Quality::Nadir,
        Quality::Reconstructed,
        Quality::Smithed,
    ];

    /// Config key / result value for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::NoQuality => "noquality",
            Quality::Predicted => "predicted",
            Quality::Nadir => "nadir",
            Quality::Reconstructed => "reconstructed",
            Quality::Smithed => "smithed",
        }
    }

    /// Default preference order: most precise tier first.
    pub fn preferred_order() -> Vec<Quality> {
        Quality::ALL.iter().rev().copied().collect()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Quality::ALL
            .iter()
            .copied()
            .find(|q| q.as_str() == lower)
            .ok_or_else(|| InventoryError::UnknownQuality(s.to_string()))
    }
}

/// Version token parsed from a kernel filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelVersion {
    /// Numeric value of the token.
    pub number: u64,
    /// Digits as written (leading zeros preserved).
    pub token: String,
}

impl Ord for KernelVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then_with(|| self.token.cmp(&other.token))
    }
}

impl PartialOrd for KernelVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A kernel path split into its logical name and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedName {
    /// Path with the version token removed; revisions of one kernel share it.
    pub logical: String,
    /// Parsed version, if the filename carries one.
    pub version: Option<KernelVersion>,
}

/// `v`/`V` followed by digits, not glued to a preceding letter.
fn v_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^A-Za-z])([vV]([0-9]+))").expect("version pattern is valid")
    })
}

/// Trailing digit run glued to a letter, e.g. `naif0012`.
fn trailing_digits_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[A-Za-z]([0-9]+)$").expect("trailing digits pattern is valid")
    })
}

/// Split a kernel path into its logical name and version token.
///
/// # Examples
///
/// ```
/// use kernel_inventory::kernel::parse_version;
///
/// let parsed = parse_version("/data/lro/lro_frames_2012255_v02.tf");
/// assert_eq!(parsed.logical, "/data/lro/lro_frames_2012255_.tf");
/// assert_eq!(parsed.version.unwrap().number, 2);
///
/// let lsk = parse_version("naif0012.tls");
/// assert_eq!(lsk.logical, "naif.tls");
/// assert_eq!(lsk.version.unwrap().token, "0012");
///
/// assert!(parse_version("mro_sc_psp_090526_090601.bc").version.is_none());
/// ```
pub fn parse_version(path: &str) -> VersionedName {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let file_name = &path[name_start..];
    let stem_len = match file_name.rfind('.') {
        Some(dot) if dot > 0 => dot,
        _ => file_name.len(),
    };
    let stem = &file_name[..stem_len];

    // (token span to remove, digits span)
    let spans = v_token_pattern()
        .captures_iter(stem)
        .last()
        .and_then(|c| Some((c.get(1)?.range(), c.get(2)?.range())))
        .or_else(|| {
            trailing_digits_pattern()
                .captures(stem)
                .and_then(|c| c.get(1))
                .map(|m| (m.range(), m.range()))
        });

    match spans {
        Some((token_span, digit_span)) => {
            let digits = &stem[digit_span];
            let number = digits.parse::<u64>().unwrap_or(u64::MAX);
            let cut_start = name_start + token_span.start;
            let cut_end = name_start + token_span.end;
            let logical = format!("{}{}", &path[..cut_start], &path[cut_end..]);
            VersionedName {
                logical,
                version: Some(KernelVersion {
                    number,
                    token: digits.to_string(),
                }),
            }
        }
        None => VersionedName {
            logical: path.to_string(),
            version: None,
        },
    }
}

/// Keep only the newest revision of each logical kernel in `group`.
///
/// Output order follows the first discovery of each logical kernel; on equal
/// versions the earliest discovered file wins.
///
/// # Examples
///
/// ```
/// use kernel_inventory::kernel::collapse_latest;
///
/// let group = vec![
///     "lro_frames_2012255_v01.tf".to_string(),
///     "lro_frames_2012255_v02.tf".to_string(),
///     "lro_instruments_v11.ti".to_string(),
/// ];
/// assert_eq!(
///     collapse_latest(&group),
///     vec!["lro_frames_2012255_v02.tf", "lro_instruments_v11.ti"]
/// );
/// ```
pub fn collapse_latest(group: &[String]) -> Vec<String> {
    let mut order: Vec<(String, Option<KernelVersion>)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for path in group {
        let parsed = parse_version(path);
        match slots.get(&parsed.logical) {
            Some(&slot) => {
                let current = &order[slot].1;
                if parsed.version > *current {
                    order[slot] = (path.clone(), parsed.version);
                }
            }
            None => {
                slots.insert(parsed.logical, order.len());
                order.push((path.clone(), parsed.version));
            }
        }
    }

    order.into_iter().map(|(path, _)| path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_type_roundtrip_strings() {
        for t in KernelType::ALL {
            assert_eq!(t.as_str().parse::<KernelType>().unwrap(), t);
        }
        assert_eq!("CK".parse::<KernelType>().unwrap(), KernelType::Ck);
    }

    #[test]
    fn test_unknown_kernel_type() {
        let err = "bogus".parse::<KernelType>().unwrap_err();
        assert!(matches!(err, InventoryError::UnknownKernelType(s) if s == "bogus"));
    }

    #[test]
    fn test_time_varying_types() {
        let varying: Vec<_> = KernelType::ALL
            .iter()
            .filter(|t| t.is_time_varying())
            .collect();
        assert_eq!(varying, vec![&KernelType::Ck, &KernelType::Spk]);
    }

    #[test]
    fn test_quality_preference_order() {
        assert_eq!(
            Quality::preferred_order(),
            vec![
                Quality::Smithed,
                Quality::Reconstructed,
                Quality::Nadir,
                Quality::Predicted,
                Quality::NoQuality
            ]
        );
    }

    #[test]
    fn test_unknown_quality() {
        assert!(matches!(
            "best".parse::<Quality>(),
            Err(InventoryError::UnknownQuality(_))
        ));
    }

    #[test]
    fn test_parse_version_v_token() {
        let parsed = parse_version("lro_clkcor_2020184_v00.tsc");
        assert_eq!(parsed.logical, "lro_clkcor_2020184_.tsc");
        let version = parsed.version.unwrap();
        assert_eq!(version.number, 0);
        assert_eq!(version.token, "00");
    }

    #[test]
    fn test_parse_version_uses_last_v_token() {
        let parsed = parse_version("msgr_v1_mdis_v160.ti");
        assert_eq!(parsed.version.unwrap().number, 160);
        assert_eq!(parsed.logical, "msgr_v1_mdis_.ti");
    }

    #[test]
    fn test_parse_version_ignores_directories() {
        let parsed = parse_version("/data/v2/kernels/fk/frames.tf");
        assert!(parsed.version.is_none());
        assert_eq!(parsed.logical, "/data/v2/kernels/fk/frames.tf");
    }

    #[test]
    fn test_parse_version_without_extension() {
        let parsed = parse_version("kernel_v7");
        assert_eq!(parsed.logical, "kernel_");
        assert_eq!(parsed.version.unwrap().number, 7);
    }

    #[test]
    fn test_version_ordering_numeric_then_lexicographic() {
        let v9 = KernelVersion {
            number: 9,
            token: "9".into(),
        };
        let v10 = KernelVersion {
            number: 10,
            token: "10".into(),
        };
        let v010 = KernelVersion {
            number: 10,
            token: "010".into(),
        };
        assert!(v10 > v9);
        assert!(v10 > v010);
    }

    #[test]
    fn test_collapse_latest_keeps_distinct_kernels() {
        let group = vec![
            "lrolc_2009181_2009212_v01.bc".to_string(),
            "lrolc_2009212_2009243_v01.bc".to_string(),
        ];
        assert_eq!(collapse_latest(&group), group);
    }

    #[test]
    fn test_collapse_latest_picks_highest_version() {
        let group = vec![
            "naif0010.tls".to_string(),
            "naif0012.tls".to_string(),
            "naif0011.tls".to_string(),
        ];
        assert_eq!(collapse_latest(&group), vec!["naif0012.tls"]);
    }

    #[test]
    fn test_collapse_latest_tie_keeps_first_discovered() {
        let group = vec!["a/frames_v1.tf".to_string(), "a/frames_v01.tf".to_string()];
        // Equal number, "1" > "01" lexicographically, so the first stays.
        assert_eq!(collapse_latest(&group), vec!["a/frames_v1.tf"]);

        let same = vec!["a/frames_v1.tf".to_string(), "a/frames_v1.tf".to_string()];
        assert_eq!(collapse_latest(&same), vec!["a/frames_v1.tf"]);
    }

    #[test]
    fn test_collapse_latest_versioned_beats_unversioned() {
        let group = vec!["frames.tf".to_string(), "frames_v1.tf".to_string()];
        // Different logical names ("frames.tf" vs "frames_.tf"), both kept.
        assert_eq!(collapse_latest(&group).len(), 2);
    }
}
