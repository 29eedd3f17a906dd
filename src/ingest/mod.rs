//! The ingestion pipeline (spec §4.4, "L3"): Stage A builds the identifier
//! dictionary and redirects from the SQL dumps, Stage B projects the JSON
//! entity dump into columnar buffers, Stage C scans `claims` to build the
//! inverted index.

pub mod dump_reader;
pub mod stage_a;
pub mod stage_b;
pub mod stage_c;

/// Best-effort counters accumulated across a full [`crate::Store::build`]
/// run (spec §4.6, §7: "ingestion completes best-effort, counting skipped
/// records").
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    pub pages_parsed: u64,
    pub redirects_written: u64,
    pub entities_parsed: u64,
    pub entities_skipped_malformed: u64,
    pub entities_skipped_structural: u64,
    pub entities_written: u64,
    pub postings_written: u64,
}

impl IngestReport {
    fn merge(&mut self, other: IngestReport) {
        self.pages_parsed += other.pages_parsed;
        self.redirects_written += other.redirects_written;
        self.entities_parsed += other.entities_parsed;
        self.entities_skipped_malformed += other.entities_skipped_malformed;
        self.entities_skipped_structural += other.entities_skipped_structural;
        self.entities_written += other.entities_written;
        self.postings_written += other.postings_written;
    }
}
