//! Minimal reader for Double precision Array Files (DAF).
//!
//! Binary SPK and CK kernels are DAFs: a 1024-byte file record followed by a
//! doubly linked list of summary records. Each summary holds `ND` doubles and
//! `NI` integers describing one segment. Only the file record and the summary
//! list are read; segment data is never touched.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// DAF record length in bytes.
pub const RECORD_LEN: usize = 1024;

const MAX_ND: usize = 124;
const MAX_NI: usize = 250;

/// One segment summary.
#[derive(Debug, Clone, PartialEq)]
pub struct DafSummary {
    pub doubles: Vec<f64>,
    pub ints: Vec<i32>,
}

/// A DAF's identification word and segment summaries.
#[derive(Debug, Clone)]
pub struct DafFile {
    id_word: String,
    nd: usize,
    ni: usize,
    little_endian: bool,
    summaries: Vec<DafSummary>,
}

impl DafFile {
    /// Read the file record and every summary of the DAF at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut record = [0u8; RECORD_LEN];
        file.read_exact(&mut record)?;

        let id_word = String::from_utf8_lossy(&record[0..8]).trim().to_string();
        if !id_word.starts_with("DAF/") && id_word != "NAIF/DAF" {
            return Err(invalid(format!("not a DAF (id word '{}')", id_word)));
        }

        let little_endian = match &record[88..96] {
            b"LTL-IEEE" => true,
            b"BIG-IEEE" => false,
            // Pre-FTP-validation files carry no format string; guess from ND.
            _ => {
                let nd = i32::from_le_bytes([record[8], record[9], record[10], record[11]]);
                (1..=MAX_ND as i32).contains(&nd)
            }
        };
        let reader = Endian(little_endian);

        let nd = reader.i32_at(&record, 8);
        let ni = reader.i32_at(&record, 12);
        if !(0..=MAX_ND as i32).contains(&nd) || !(2..=MAX_NI as i32).contains(&ni) {
            return Err(invalid(format!("implausible ND/NI ({}, {})", nd, ni)));
        }
        let (nd, ni) = (nd as usize, ni as usize);
        let summary_doubles = nd + (ni + 1) / 2;

        let mut summaries = Vec::new();
        let mut next = reader.i32_at(&record, 76);
        let mut visited = HashSet::new();

        while next > 0 {
            if !visited.insert(next) {
                return Err(invalid(format!("summary record {} visited twice", next)));
            }
            file.seek(SeekFrom::Start((next as u64 - 1) * RECORD_LEN as u64))?;
            file.read_exact(&mut record)?;

            let following = reader.f64_at(&record, 0);
            let count = reader.f64_at(&record, 16);
            if !(0.0..=RECORD_LEN as f64).contains(&count) {
                return Err(invalid(format!("bad summary count {} in record {}", count, next)));
            }
            let count = count as usize;
            if 24 + count * summary_doubles * 8 > RECORD_LEN {
                return Err(invalid(format!("summary record {} overflows", next)));
            }

            for i in 0..count {
                let base = 24 + i * summary_doubles * 8;
                let doubles = (0..nd).map(|d| reader.f64_at(&record, base + d * 8)).collect();
                let ints = (0..ni)
                    .map(|n| reader.i32_at(&record, base + nd * 8 + n * 4))
                    .collect();
                summaries.push(DafSummary { doubles, ints });
            }

            next = following as i32;
        }

        Ok(Self {
            id_word,
            nd,
            ni,
            little_endian,
            summaries,
        })
    }

    pub fn id_word(&self) -> &str {
        &self.id_word
    }

    pub fn nd(&self) -> usize {
        self.nd
    }

    pub fn ni(&self) -> usize {
        self.ni
    }

    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    pub fn summaries(&self) -> &[DafSummary] {
        &self.summaries
    }
}

/// First whitespace-delimited token of the first eight bytes of `path`.
///
/// This is the identification word of both binary (`DAF/SPK`) and text
/// (`KPL/LSK`) kernels.
pub fn read_id_word(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut head = [0u8; 8];
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let text = String::from_utf8_lossy(&head[..filled]);
    Ok(text.split_whitespace().next().unwrap_or_default().to_string())
}

#[derive(Clone, Copy)]
struct Endian(bool);

impl Endian {
    fn i32_at(self, buf: &[u8], offset: usize) -> i32 {
        let bytes = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        if self.0 {
            i32::from_le_bytes(bytes)
        } else {
            i32::from_be_bytes(bytes)
        }
    }

    fn f64_at(self, buf: &[u8], offset: usize) -> f64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[offset..offset + 8]);
        if self.0 {
            f64::from_le_bytes(bytes)
        } else {
            f64::from_be_bytes(bytes)
        }
    }
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// Write a DAF with ND=2, NI=6 and the given summaries in one summary record.
#[cfg(test)]
pub(crate) fn write_test_daf(
    path: &Path,
    id_word: &str,
    little_endian: bool,
    summaries: &[([f64; 2], [i32; 6])],
) {
    fn put_i32(buf: &mut [u8], at: usize, v: i32, le: bool) {
        let b = if le { v.to_le_bytes() } else { v.to_be_bytes() };
        buf[at..at + 4].copy_from_slice(&b);
    }
    fn put_f64(buf: &mut [u8], at: usize, v: f64, le: bool) {
        let b = if le { v.to_le_bytes() } else { v.to_be_bytes() };
        buf[at..at + 8].copy_from_slice(&b);
    }

    let mut file_record = vec![b' '; RECORD_LEN];
    file_record[0..8].copy_from_slice(format!("{:<8}", id_word).as_bytes());
    put_i32(&mut file_record, 8, 2, little_endian);
    put_i32(&mut file_record, 12, 6, little_endian);
    put_i32(&mut file_record, 76, 2, little_endian);
    put_i32(&mut file_record, 80, 2, little_endian);
    let fmt: &[u8; 8] = if little_endian { b"LTL-IEEE" } else { b"BIG-IEEE" };
    file_record[88..96].copy_from_slice(fmt);

    let mut summary_record = vec![0u8; RECORD_LEN];
    put_f64(&mut summary_record, 0, 0.0, little_endian);
    put_f64(&mut summary_record, 8, 0.0, little_endian);
    put_f64(&mut summary_record, 16, summaries.len() as f64, little_endian);
    for (i, (doubles, ints)) in summaries.iter().enumerate() {
        let base = 24 + i * 5 * 8;
        put_f64(&mut summary_record, base, doubles[0], little_endian);
        put_f64(&mut summary_record, base + 8, doubles[1], little_endian);
        for (n, v) in ints.iter().enumerate() {
            put_i32(&mut summary_record, base + 16 + n * 4, *v, little_endian);
        }
    }

    let mut bytes = file_record;
    bytes.extend_from_slice(&summary_record);
    std::fs::write(path, bytes).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_little_endian_spk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.bsp");
        write_test_daf(
            &path,
            "DAF/SPK",
            true,
            &[
                ([100.0, 200.0], [-85, 301, 1, 9, 641, 1000]),
                ([150.0, 400.0], [301, 3, 1, 2, 1001, 2000]),
            ],
        );

        let daf = DafFile::open(&path).unwrap();
        assert_eq!(daf.id_word(), "DAF/SPK");
        assert_eq!((daf.nd(), daf.ni()), (2, 6));
        assert!(daf.is_little_endian());
        assert_eq!(daf.summaries().len(), 2);
        assert_eq!(daf.summaries()[0].doubles, vec![100.0, 200.0]);
        assert_eq!(daf.summaries()[1].ints[0], 301);
    }

    #[test]
    fn test_read_big_endian_ck() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.bc");
        write_test_daf(&path, "DAF/CK", false, &[([1e9, 2e9], [-85600, 1, 3, 1, 641, 900])]);

        let daf = DafFile::open(&path).unwrap();
        assert_eq!(daf.id_word(), "DAF/CK");
        assert!(!daf.is_little_endian());
        assert_eq!(daf.summaries()[0].ints[0], -85600);
        assert_eq!(daf.summaries()[0].doubles[1], 2e9);
    }

    #[test]
    fn test_rejects_text_kernel() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("naif0012.tls");
        std::fs::write(&path, format!("KPL/LSK\n{}", " ".repeat(2048))).unwrap();
        let err = DafFile::open(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_read_id_word() {
        let temp = TempDir::new().unwrap();
        let lsk = temp.path().join("naif0012.tls");
        std::fs::write(&lsk, "KPL/LSK\n\nstuff").unwrap();
        assert_eq!(read_id_word(&lsk).unwrap(), "KPL/LSK");

        let short = temp.path().join("short");
        std::fs::write(&short, "KPL").unwrap();
        assert_eq!(read_id_word(&short).unwrap(), "KPL");

        assert!(read_id_word(&temp.path().join("missing")).is_err());
    }
}
