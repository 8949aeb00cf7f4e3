//! Part range type and chunk planning.

use std::fmt;

/// Protocol floor for every part except the last: 5 MiB.
pub const MIN_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// One planned part: byte range `[offset, offset + size)`, 1-based part number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub part_number: u32,
    pub offset: u64,
    pub size: u64,
}

impl PartRange {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Why a file cannot be split into the requested number of parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    EmptyFile,
    NoUrls,
    /// `(url_count - 1) * MIN_CHUNK_SIZE` exceeds the file size.
    TooSmall { total_bytes: u64, url_count: usize, required: u64 },
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::EmptyFile => write!(f, "file is empty"),
            PlanError::NoUrls => write!(f, "no upload URLs given"),
            PlanError::TooSmall {
                total_bytes,
                url_count,
                required,
            } => write!(
                f,
                "file of {} bytes is too small for {} parts (needs at least {} bytes)",
                total_bytes, url_count, required
            ),
        }
    }
}

impl std::error::Error for PlanError {}

/// Plans `url_count` parts covering `[0, total_bytes)`.
///
/// `chunk = max(MIN_CHUNK_SIZE, ceil(total_bytes / url_count))`; parts
/// `1..url_count-1` get `chunk` bytes, the last part gets the remainder.
pub fn plan_parts(total_bytes: u64, url_count: usize) -> Result<Vec<PartRange>, PlanError> {
    if url_count == 0 {
        return Err(PlanError::NoUrls);
    }
    if total_bytes == 0 {
        return Err(PlanError::EmptyFile);
    }

    let count = url_count as u64;
    let required = (count - 1).saturating_mul(MIN_CHUNK_SIZE);
    if total_bytes < required {
        return Err(PlanError::TooSmall {
            total_bytes,
            url_count,
            required,
        });
    }

    let chunk = MIN_CHUNK_SIZE.max(total_bytes.div_ceil(count));
    let mut out = Vec::with_capacity(url_count);
    for i in 0..count {
        let offset = i * chunk;
        let size = if i + 1 == count {
            total_bytes - offset
        } else {
            chunk
        };
        out.push(PartRange {
            part_number: (i + 1) as u32,
            offset,
            size,
        });
    }

    // Exactly (count - 1) * MIN_CHUNK_SIZE leaves nothing for the final part.
    if out.last().map(|p| p.size == 0).unwrap_or(true) {
        return Err(PlanError::TooSmall {
            total_bytes,
            url_count,
            required: required + 1,
        });
    }

    Ok(out)
}
