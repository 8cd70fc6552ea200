//! Dataset file header.
//!
//! Datasets written by the cluster generator start with a fixed 24-byte
//! header of three little-endian `u64`s:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | feature count |
//! | 8 | cluster count |
//! | 16 | point count |
//!
//! The payload that follows holds `clusters` centroids and then `points`
//! points as little-endian `f32`, stored feature-major: all values of
//! feature 0, then all values of feature 1, and so on.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const HEADER_SIZE: usize = 24;

const MIB: f64 = (1u64 << 20) as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    pub features: u64,
    pub clusters: u64,
    pub points: u64,
}

impl BinaryHeader {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            bail!(
                "header needs {} bytes, only {} available",
                HEADER_SIZE,
                bytes.len()
            );
        }
        let field = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            u64::from_le_bytes(buf)
        };
        Ok(Self {
            features: field(0),
            clusters: field(1),
            points: field(2),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&self.features.to_le_bytes());
        out[8..16].copy_from_slice(&self.clusters.to_le_bytes());
        out[16..24].copy_from_slice(&self.points.to_le_bytes());
        out
    }

    /// Payload size implied by the header, or `None` on overflow.
    pub fn expected_payload_bytes(&self) -> Option<u64> {
        self.clusters
            .checked_add(self.points)?
            .checked_mul(self.features)?
            .checked_mul(std::mem::size_of::<f32>() as u64)
    }
}

/// Header plus on-disk size of a dataset file.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub header: BinaryHeader,
    pub file_size: u64,
}

impl FileInfo {
    pub fn read(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let file_size = file
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        let mut raw = Vec::with_capacity(HEADER_SIZE);
        (&mut file)
            .take(HEADER_SIZE as u64)
            .read_to_end(&mut raw)
            .with_context(|| format!("Failed to read header of {}", path.display()))?;
        let header = BinaryHeader::decode(&raw)
            .with_context(|| format!("Failed to decode header of {}", path.display()))?;

        Ok(Self { header, file_size })
    }

    pub fn payload_bytes(&self) -> u64 {
        self.file_size.saturating_sub(HEADER_SIZE as u64)
    }

    pub fn payload_mib(&self) -> f64 {
        self.payload_bytes() as f64 / MIB
    }

    pub fn payload_matches_header(&self) -> bool {
        self.header.expected_payload_bytes() == Some(self.payload_bytes())
    }
}

/// Read the first `limit` points of a dataset as rows of `features` values.
pub fn read_points(path: &Path, limit: u64) -> Result<Vec<Vec<f32>>> {
    let info = FileInfo::read(path)?;
    let h = info.header;
    if !info.payload_matches_header() {
        bail!(
            "{}: payload is {} bytes but header describes {:?}",
            path.display(),
            info.payload_bytes(),
            h.expected_payload_bytes()
        );
    }

    if h.features == 0 {
        return Ok(Vec::new());
    }

    // The payload check bounds every offset below by the file size.
    let n = limit.min(h.points);
    let width = std::mem::size_of::<f32>() as u64;
    let column_bytes = n
        .checked_mul(width)
        .and_then(|b| usize::try_from(b).ok())
        .with_context(|| format!("{}: {} points do not fit in memory", path.display(), n))?;
    let points_start = h
        .clusters
        .checked_mul(h.features)
        .and_then(|v| v.checked_mul(width))
        .and_then(|v| v.checked_add(HEADER_SIZE as u64))
        .with_context(|| format!("{}: centroid block size overflows", path.display()))?;

    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rows = vec![Vec::with_capacity(h.features as usize); column_bytes / 4];
    let mut column = vec![0u8; column_bytes];
    for f in 0..h.features {
        file.seek(SeekFrom::Start(points_start + f * h.points * width))?;
        file.read_exact(&mut column)
            .with_context(|| format!("Failed to read feature {} of {}", f, path.display()))?;
        for (row, chunk) in rows.iter_mut().zip(column.chunks_exact(4)) {
            row.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
    }
    Ok(rows)
}

/// Shortest round-trip form with a `.0` on integral values and a signed,
/// two-digit exponent (`9.5367431640625e-07`, `1e+16`) in exponent form.
pub fn format_float(value: f64) -> String {
    let repr = format!("{:?}", value);
    match repr.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}

/// Arguments for `pct info`.
#[derive(Debug, Clone)]
pub struct InfoArgs {
    pub file: PathBuf,
    /// Fail unless the payload size matches the header.
    pub check: bool,
    /// Also print this many leading points.
    pub points: Option<u64>,
}

pub fn run_info(args: &InfoArgs, out: &mut dyn Write) -> Result<()> {
    let info = FileInfo::read(&args.file)?;

    writeln!(out, "Num Features: {}", info.header.features)?;
    writeln!(out, "Num Clusters: {}", info.header.clusters)?;
    writeln!(out, "Num Points:   {}", info.header.points)?;
    writeln!(out, "Size (MiB):   {}", format_float(info.payload_mib()))?;

    if args.check {
        match info.header.expected_payload_bytes() {
            Some(expected) if expected == info.payload_bytes() => {
                writeln!(out, "Payload:      ok")?;
            }
            expected => bail!(
                "payload is {} bytes, header implies {}",
                info.payload_bytes(),
                expected.map_or_else(|| "an overflowing size".to_string(), |e| e.to_string())
            ),
        }
    }

    if let Some(limit) = args.points {
        for (i, row) in read_points(&args.file, limit)?.iter().enumerate() {
            writeln!(out, "{:>6}: {:?}", i, row)?;
        }
    }

    Ok(())
}
