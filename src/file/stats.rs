use std::io::{self, Write};

/// Counters for file layer activity
///
/// Logical counters track page accesses at the file API; physical counters
/// track actual disk transfers. `input_count`/`output_count` mirror the
/// physical counters so results can be compared against textbook I/O cost
/// formulas directly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub logical_reads: u64,
    pub logical_writes: u64,
    pub physical_reads: u64,
    pub physical_writes: u64,
    pub input_count: u64,
    pub output_count: u64,
    pub page_fixes: u64,
    pub dirty_marks: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all counters to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Get a point-in-time copy of the counters
    pub fn snapshot(&self) -> Stats {
        *self
    }

    pub(crate) fn record_logical_read(&mut self) {
        self.logical_reads += 1;
    }

    pub(crate) fn record_logical_write(&mut self) {
        self.logical_writes += 1;
    }

    pub(crate) fn record_physical_read(&mut self) {
        self.physical_reads += 1;
        self.input_count += 1;
    }

    pub(crate) fn record_physical_write(&mut self) {
        self.physical_writes += 1;
        self.output_count += 1;
    }

    pub(crate) fn record_page_fix(&mut self) {
        self.page_fixes += 1;
    }

    pub(crate) fn record_dirty_mark(&mut self) {
        self.dirty_marks += 1;
    }

    /// Write the counters in a human-readable block
    pub fn print_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "PF statistics:")?;
        writeln!(out, "  logical reads   : {}", self.logical_reads)?;
        writeln!(out, "  logical writes  : {}", self.logical_writes)?;
        writeln!(out, "  physical reads  : {}", self.physical_reads)?;
        writeln!(out, "  physical writes : {}", self.physical_writes)?;
        writeln!(out, "  input count     : {}", self.input_count)?;
        writeln!(out, "  output count    : {}", self.output_count)?;
        writeln!(out, "  page fixes      : {}", self.page_fixes)?;
        writeln!(out, "  dirty marks     : {}", self.dirty_marks)?;
        Ok(())
    }
}
