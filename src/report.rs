//! Fixed-width result tables
//!
//! Each chunk extent gets two tables: creation time, size and file count per
//! store, then the median read times per read shape. Failed stores show
//! `NaN` in every cell and a reason line below the tables.

use std::io::Write;

use crate::data::SyntheticArray;
use crate::models::{ChunkExtent, Operation, RunReport};
use crate::Result;

const LABEL_WIDTH: usize = 10;
const VALUE_WIDTH: usize = 25;

/// Column heading for a read operation
fn read_heading(operation: Operation, subarray_label: Option<&str>) -> String {
    match operation {
        Operation::ReadWholeArray => "Read whole array (sec)".to_string(),
        Operation::ReadOneCell => "Read 1 cell (sec)".to_string(),
        Operation::ReadSubarray => format!("Slice {} (sec)", subarray_label.unwrap_or("")),
        Operation::Creation => "Creation time (sec)".to_string(),
    }
}

fn header_row(headings: &[String]) -> String {
    let mut line = format!("{:>width$}", "", width = LABEL_WIDTH);
    for heading in headings {
        line.push_str(&format!("{:>width$}", heading, width = VALUE_WIDTH));
    }
    line.push('\n');
    line
}

/// Render the header printed once before any configuration
pub fn render_header(array: &SyntheticArray) -> String {
    format!(
        "Total uncompressed array data size: {:.2} MB.\n",
        array.size_mb()
    )
}

/// Render both tables for one chunk extent
pub fn render_configuration(report: &RunReport, extent: &ChunkExtent) -> String {
    let mut out = format!("Array tile extent {}\n\n", extent);

    out.push_str(&header_row(&[
        "Creation time (sec)".to_string(),
        "Size (MB)".to_string(),
        "# files".to_string(),
    ]));
    for store in &report.stores {
        let size = report.size(extent, store);
        let files = size
            .file_count
            .map(|count| count.to_string())
            .unwrap_or_else(|| "NaN".to_string());
        out.push_str(&format!(
            "{:>lw$}{:>vw$.3}{:>vw$.2}{:>vw$}\n",
            store,
            report.timing(extent, store, Operation::Creation),
            size.size_mb,
            files,
            lw = LABEL_WIDTH,
            vw = VALUE_WIDTH
        ));
    }
    out.push('\n');

    let subarray_label = report.subarray_label.as_deref();
    let headings: Vec<String> = report
        .reads
        .iter()
        .map(|&operation| read_heading(operation, subarray_label))
        .collect();
    out.push_str(&header_row(&headings));
    for store in &report.stores {
        out.push_str(&format!("{:>width$}", store, width = LABEL_WIDTH));
        for &operation in &report.reads {
            out.push_str(&format!(
                "{:>width$.3}",
                report.timing(extent, store, operation),
                width = VALUE_WIDTH
            ));
        }
        out.push('\n');
    }
    out.push('\n');

    for store in &report.stores {
        if let Some(reason) = report.failure(extent, store) {
            out.push_str(&format!("{} failed: {}\n", store, reason));
        }
    }
    let cache_failures = report.cache_failures(extent);
    if cache_failures > 0 {
        out.push_str(&format!(
            "warning: {} cache command(s) failed; timings may reflect a warm page cache\n",
            cache_failures
        ));
    }

    out
}

/// Writes the report tables to an output stream
pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_header(&mut self, array: &SyntheticArray) -> Result<()> {
        self.out.write_all(render_header(array).as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    pub fn write_configuration(&mut self, report: &RunReport, extent: &ChunkExtent) -> Result<()> {
        self.out
            .write_all(render_configuration(report, extent).as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
