//! Array selections
//!
//! A selection is a half-open index range per dimension, written as
//! `[100:101]` or `[1000:5000, 1000:5000]`. Helpers copy rectangular
//! regions between row-major buffers.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Rectangular, half-open selection over an N-dimensional array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selection {
    ranges: Vec<Range<u64>>,
}

impl Selection {
    /// Create a selection from explicit ranges
    pub fn new(ranges: Vec<Range<u64>>) -> Self {
        Self { ranges }
    }

    /// Selection covering a whole array of the given shape (`:` in every dimension)
    pub fn all(shape: &[u64]) -> Self {
        Self {
            ranges: shape.iter().map(|&len| 0..len).collect(),
        }
    }

    /// Single-element selection at `index`
    pub fn cell(index: &[u64]) -> Self {
        Self {
            ranges: index.iter().map(|&i| i..i + 1).collect(),
        }
    }

    pub fn ranges(&self) -> &[Range<u64>] {
        &self.ranges
    }

    pub fn ndim(&self) -> usize {
        self.ranges.len()
    }

    /// Start index in every dimension
    pub fn start(&self) -> Vec<u64> {
        self.ranges.iter().map(|r| r.start).collect()
    }

    /// Extent of the selection in every dimension
    pub fn shape(&self) -> Vec<u64> {
        self.ranges
            .iter()
            .map(|r| r.end.saturating_sub(r.start))
            .collect()
    }

    pub fn num_elements(&self) -> u64 {
        self.shape().iter().product()
    }

    /// Check that the selection is non-empty and lies inside an array of `shape`
    pub fn check_bounds(&self, shape: &[u64]) -> std::result::Result<(), String> {
        if self.ranges.len() != shape.len() {
            return Err(format!(
                "selection {} has {} dimensions, array has {}",
                self,
                self.ranges.len(),
                shape.len()
            ));
        }
        for (range, &len) in self.ranges.iter().zip(shape) {
            if range.start >= range.end {
                return Err(format!("selection {} is empty", self));
            }
            if range.end > len {
                return Err(format!(
                    "selection {} exceeds array shape {:?}",
                    self, shape
                ));
            }
        }
        Ok(())
    }

    /// Intersection with another box, `None` when they do not overlap
    pub fn intersect(&self, other: &[Range<u64>]) -> Option<Selection> {
        let mut ranges = Vec::with_capacity(self.ranges.len());
        for (a, b) in self.ranges.iter().zip(other) {
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            if start >= end {
                return None;
            }
            ranges.push(start..end);
        }
        Some(Selection { ranges })
    }

    /// Short label used in report headers, e.g. `1000:5000,1000:5000`
    pub fn label(&self) -> String {
        self.ranges
            .iter()
            .map(|r| format!("{}:{}", r.start, r.end))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|r| format!("{}:{}", r.start, r.end))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

impl FromStr for Selection {
    type Err = String;

    fn from_str(input: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = input.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(trimmed);

        if inner.trim().is_empty() {
            return Err("Empty selection".to_string());
        }

        let mut ranges = Vec::new();
        for part in inner.split(',') {
            let (start, end) = part
                .trim()
                .split_once(':')
                .ok_or_else(|| format!("Invalid range '{}': expected start:end", part.trim()))?;
            let start: u64 = start
                .trim()
                .parse()
                .map_err(|_| format!("Invalid range start: {}", start.trim()))?;
            let end: u64 = end
                .trim()
                .parse()
                .map_err(|_| format!("Invalid range end: {}", end.trim()))?;
            if end <= start {
                return Err(format!("Empty range {}:{}", start, end));
            }
            ranges.push(start..end);
        }

        Ok(Self { ranges })
    }
}

impl TryFrom<String> for Selection {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Selection> for String {
    fn from(selection: Selection) -> Self {
        selection.to_string()
    }
}

/// Row-major strides for `shape`
pub fn row_major_strides(shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Copy a rectangular `region` between two row-major buffers.
///
/// `src_start` and `dst_start` are the region's origin in the local
/// coordinates of the source and destination buffers.
pub fn copy_region(
    src: &[f64],
    src_shape: &[u64],
    src_start: &[u64],
    dst: &mut [f64],
    dst_shape: &[u64],
    dst_start: &[u64],
    region: &[u64],
) {
    let ndim = region.len();
    if ndim == 0 || region.iter().any(|&len| len == 0) {
        return;
    }

    let src_strides = row_major_strides(src_shape);
    let dst_strides = row_major_strides(dst_shape);
    let run = region[ndim - 1] as usize;
    let mut index = vec![0u64; ndim - 1];

    loop {
        let mut src_offset = src_start[ndim - 1];
        let mut dst_offset = dst_start[ndim - 1];
        for (d, &i) in index.iter().enumerate() {
            src_offset += (src_start[d] + i) * src_strides[d];
            dst_offset += (dst_start[d] + i) * dst_strides[d];
        }
        let (s, t) = (src_offset as usize, dst_offset as usize);
        dst[t..t + run].copy_from_slice(&src[s..s + run]);

        // Advance the odometer over the outer dimensions
        let mut d = ndim - 1;
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            index[d] += 1;
            if index[d] < region[d] {
                break;
            }
            index[d] = 0;
        }
    }
}

/// Visit every index of the box `ranges` in row-major order
pub fn for_each_index(ranges: &[Range<u64>], mut f: impl FnMut(&[u64])) {
    if ranges.is_empty() || ranges.iter().any(|r| r.start >= r.end) {
        return;
    }

    let mut index: Vec<u64> = ranges.iter().map(|r| r.start).collect();
    loop {
        f(&index);

        let mut d = ranges.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            index[d] += 1;
            if index[d] < ranges[d].end {
                break;
            }
            index[d] = ranges[d].start;
        }
    }
}

/// Extract the elements of `selection` from a row-major array of `shape`
pub fn extract(src: &[f64], shape: &[u64], selection: &Selection) -> Vec<f64> {
    let region = selection.shape();
    let mut out = vec![0.0; selection.num_elements() as usize];
    let origin = vec![0u64; region.len()];
    copy_region(
        src,
        shape,
        &selection.start(),
        &mut out,
        &region,
        &origin,
        &region,
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let sel: Selection = "[1000:5000, 1000:5000]".parse().unwrap();
        assert_eq!(sel.ranges(), &[1000..5000, 1000..5000]);
        assert_eq!(sel.to_string(), "[1000:5000, 1000:5000]");
        assert_eq!(sel.label(), "1000:5000,1000:5000");

        let cell: Selection = "100:101".parse().unwrap();
        assert_eq!(cell, Selection::cell(&[100]));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("".parse::<Selection>().is_err());
        assert!("[5]".parse::<Selection>().is_err());
        assert!("[5:5]".parse::<Selection>().is_err());
        assert!("[a:3]".parse::<Selection>().is_err());
    }

    #[test]
    fn test_check_bounds() {
        let sel = Selection::new(vec![2..5, 2..5]);
        assert!(sel.check_bounds(&[10, 10]).is_ok());
        assert!(sel.check_bounds(&[4, 10]).is_err());
        assert!(sel.check_bounds(&[10]).is_err());
        assert_eq!(sel.num_elements(), 9);
    }

    #[test]
    fn test_intersect() {
        let sel = Selection::new(vec![2..8]);
        assert_eq!(sel.intersect(&[5..20]), Some(Selection::new(vec![5..8])));
        assert_eq!(sel.intersect(&[8..20]), None);
    }

    #[test]
    fn test_extract_2d_block() {
        let src: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let sel = Selection::new(vec![2..5, 2..5]);
        let block = extract(&src, &[10, 10], &sel);
        assert_eq!(
            block,
            vec![22.0, 23.0, 24.0, 32.0, 33.0, 34.0, 42.0, 43.0, 44.0]
        );
    }

    #[test]
    fn test_extract_1d() {
        let src: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let block = extract(&src, &[100], &Selection::cell(&[5]));
        assert_eq!(block, vec![5.0]);
    }

    #[test]
    fn test_for_each_index_row_major() {
        let mut visited = Vec::new();
        for_each_index(&[1..3, 4..6], |idx| visited.push(idx.to_vec()));
        assert_eq!(
            visited,
            vec![vec![1, 4], vec![1, 5], vec![2, 4], vec![2, 5]]
        );

        let mut count = 0;
        for_each_index(&[0..0], |_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_copy_region_into_offset() {
        // 2x2 block from a 3x3 source into the corner of a 4x4 destination
        let src: Vec<f64> = (0..9).map(|v| v as f64).collect();
        let mut dst = vec![0.0; 16];
        copy_region(&src, &[3, 3], &[1, 1], &mut dst, &[4, 4], &[2, 2], &[2, 2]);
        assert_eq!(dst[10], 4.0);
        assert_eq!(dst[11], 5.0);
        assert_eq!(dst[14], 7.0);
        assert_eq!(dst[15], 8.0);
        assert_eq!(dst[0], 0.0);
    }
}
