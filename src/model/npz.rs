//! NumPy `.npy` / `.npz` reader for voice style matrices.
//!
//! Only what voice files need is supported: NPY 1.x / 2.x, `float32`
//! (either byte order), C order, any rank.  An NPZ file is a ZIP archive of
//! NPY members; the member name minus `.npy` is the array name.

use std::{collections::HashMap, io::Read, path::Path};

use anyhow::{bail, ensure, Context, Result};
use zip::ZipArchive;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// A float32 array: shape plus row-major data.
#[derive(Debug, Clone)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl NpyArray {
    /// Parse an in-memory `.npy` file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Header::parse(bytes)?;
        let nbytes = element_count(&header.shape)
            .and_then(|n| n.checked_mul(4))
            .with_context(|| format!("NPY shape {:?} is too large", header.shape))?;
        let body = &bytes[header.data_offset..];
        ensure!(
            body.len() >= nbytes,
            "NPY data section too short: expected {} bytes, got {}",
            nbytes,
            body.len()
        );

        let data = body[..nbytes]
            .chunks_exact(4)
            .map(|b| {
                let b = [b[0], b[1], b[2], b[3]];
                if header.big_endian {
                    f32::from_be_bytes(b)
                } else {
                    f32::from_le_bytes(b)
                }
            })
            .collect();
        Ok(Self { shape: header.shape, data })
    }

    /// Number of rows (first dimension).
    pub fn nrows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Row width: product of every dimension after the first (1 for vectors).
    /// `None` if the product does not fit in `usize`.
    pub fn ncols(&self) -> Option<usize> {
        element_count(self.shape.get(1..).unwrap_or_default())
    }
}

/// Product of `dims`, or `None` on overflow.
fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

// ─────────────────────────────────────────────────────────────────────────────
// Header
// ─────────────────────────────────────────────────────────────────────────────

struct Header {
    shape: Vec<usize>,
    big_endian: bool,
    data_offset: usize,
}

impl Header {
    fn parse(bytes: &[u8]) -> Result<Self> {
        ensure!(bytes.len() >= 10 && &bytes[..6] == MAGIC, "Not a valid NPY file (bad magic)");

        // Header length field is u16 in v1, u32 in v2/v3.
        let (len, start) = match bytes[6] {
            1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
            2 | 3 => {
                ensure!(bytes.len() >= 12, "NPY v{} file too short", bytes[6]);
                (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
            }
            v => bail!("Unsupported NPY version {}.{}", v, bytes[7]),
        };
        let end = start + len;
        ensure!(bytes.len() >= end, "NPY file truncated in header");
        let dict = std::str::from_utf8(&bytes[start..end]).context("NPY header is not UTF-8")?;

        let descr = dict_value(dict, "descr").context("NPY header missing 'descr'")?;
        let big_endian = match descr {
            "<f4" | "=f4" | "|f4" => false,
            ">f4" => true,
            other => bail!("Unsupported dtype '{}', only float32 is supported", other),
        };

        if dict_value(dict, "fortran_order").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            bail!("Fortran-order arrays are not supported");
        }

        let shape = dict_value(dict, "shape").context("NPY header missing 'shape'")?;
        let shape = shape
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| d.parse::<usize>().with_context(|| format!("Bad shape dim: '{}'", d)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { shape, big_endian, data_offset: end })
    }
}

/// Value of `key` in a Python dict literal such as
/// `{'descr': '<f4', 'fortran_order': False, 'shape': (2, 3), }`.
/// Quotes are stripped from strings; tuples keep their parentheses.
fn dict_value<'a>(dict: &'a str, key: &str) -> Option<&'a str> {
    let at = [format!("'{}':", key), format!("\"{}\":", key)]
        .iter()
        .find_map(|k| dict.find(k.as_str()).map(|p| p + k.len()))?;
    let rest = dict[at..].trim_start();

    match rest.chars().next()? {
        '(' => rest.find(')').map(|e| &rest[..=e]),
        q @ ('\'' | '"') => {
            let inner = &rest[1..];
            inner.find(q).map(|e| &inner[..e])
        }
        _ => {
            let e = rest.find([',', '}']).unwrap_or(rest.len());
            Some(rest[..e].trim())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Files
// ─────────────────────────────────────────────────────────────────────────────

/// Load a single `.npy` file.
pub fn load_npy(path: &Path) -> Result<NpyArray> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Cannot read NPY file: {}", path.display()))?;
    NpyArray::from_bytes(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load every array in an `.npz` archive, keyed by name.
pub fn load_npz(path: &Path) -> Result<HashMap<String, NpyArray>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open NPZ file: {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Cannot open ZIP archive: {}", path.display()))?;

    let mut arrays = HashMap::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("Failed to read ZIP entry")?;
        let name = entry.name().trim_end_matches(".npy").to_string();
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).context("Failed to read NPY entry")?;
        let array = NpyArray::from_bytes(&buf)
            .with_context(|| format!("Failed to parse NPY entry '{}'", name))?;
        arrays.insert(name, array);
    }
    Ok(arrays)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
