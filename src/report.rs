/// Console and JSON reporting of buckets and summaries.
use crate::aggregate::{Bucket, Summary};
use crate::pipeline::{FollowSink, PipelineStats};
use serde::Serialize;
use std::io::Write;

const RULE_WIDTH: usize = 50;

fn rule() -> String {
    "-".repeat(RULE_WIDTH)
}

/// One live line, e.g. `2025-11-08 00:13:23: 1 req/s`.
pub fn bucket_line(bucket: &Bucket) -> String {
    format!("{}: {} req/s", bucket.label(), bucket.count)
}

/// Print the per-second table followed by the summary block.
pub fn write_text<W: Write>(out: &mut W, buckets: &[Bucket], summary: &Summary) -> std::io::Result<()> {
    if buckets.is_empty() {
        writeln!(out, "No data to display")?;
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "Requests Per Second:")?;
    writeln!(out, "{}", rule())?;
    for bucket in buckets {
        writeln!(out, "{}", bucket_line(bucket))?;
    }
    write_summary(out, summary)
}

/// The summary block on its own.
pub fn write_summary<W: Write>(out: &mut W, summary: &Summary) -> std::io::Result<()> {
    writeln!(out, "{}", rule())?;
    writeln!(out, "Total requests: {}", summary.total_requests)?;
    writeln!(out, "Average RPS: {:.2}", summary.average_rps)?;
    writeln!(out, "Max RPS: {}", summary.max_rps)?;
    writeln!(out, "Min RPS: {}", summary.min_rps)
}

#[derive(Serialize)]
struct JsonReport<'a> {
    buckets: &'a [Bucket],
    summary: &'a Summary,
    lines: &'a PipelineStats,
}

/// Machine-readable report: buckets, summary and line accounting.
pub fn write_json<W: Write>(
    out: &mut W,
    buckets: &[Bucket],
    summary: &Summary,
    stats: &PipelineStats,
) -> Result<(), serde_json::Error> {
    let report = JsonReport {
        buckets,
        summary,
        lines: stats,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out).map_err(serde_json::Error::io)
}

/// Banner printed before following starts.
pub fn write_follow_banner<W: Write>(out: &mut W) -> std::io::Result<()> {
    writeln!(out, "Following log file... (Ctrl+C to stop)")?;
    writeln!(out, "{}", rule())
}

/// Printed after cancellation, before the final summary.
pub fn write_follow_stopped<W: Write>(out: &mut W) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Stopped following log file.")
}

/// Streams follow-mode output to a writer, flushing each line.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FollowSink for ConsoleSink<W> {
    fn caught_up(&mut self, requests: u64, summary: &Summary) -> std::io::Result<()> {
        if summary.is_empty() {
            return Ok(());
        }
        writeln!(
            self.out,
            "Initial: {} requests, Avg RPS: {:.2}",
            requests, summary.average_rps
        )?;
        writeln!(self.out, "{}", rule())?;
        self.out.flush()
    }

    fn bucket(&mut self, bucket: &Bucket) -> std::io::Result<()> {
        writeln!(self.out, "{}", bucket_line(bucket))?;
        self.out.flush()
    }
}
