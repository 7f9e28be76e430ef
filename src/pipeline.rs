/// The processing pipeline: line → parse → date filter → aggregate.
///
/// Batch mode reads its source to exhaustion and finalizes every bucket.
/// Follow mode runs a small state machine (reading, processing, emitting)
/// until the shutdown future resolves.
use crate::aggregate::{summarize, Bucket, RpsAggregator, RunningSummary, Summary};
use crate::filter::DateRange;
use crate::parser::parse_line;
use crate::source::{FollowReader, LineSource, SourceError, TailEvent};
use serde::Serialize;
use std::future::Future;

/// Per-run line accounting, used for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub lines_read: u64,
    pub blank: u64,
    pub unparseable: u64,
    pub filtered_out: u64,
    /// Dropped in follow mode because their second was already reported.
    pub late: u64,
    pub accepted: u64,
}

/// Parser, filter and aggregator for one run.
#[derive(Debug)]
pub struct Pipeline {
    range: DateRange,
    aggregator: RpsAggregator,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            aggregator: RpsAggregator::new(),
            stats: PipelineStats::default(),
        }
    }

    /// Feed one raw line. Returns true when it was counted in a bucket.
    pub fn feed(&mut self, line: &str) -> bool {
        self.stats.lines_read += 1;
        if line.trim().is_empty() {
            self.stats.blank += 1;
            return false;
        }
        let Some(record) = parse_line(line) else {
            self.stats.unparseable += 1;
            tracing::trace!(line, "skipping unparseable line");
            return false;
        };
        if !self.range.contains(&record.timestamp) {
            self.stats.filtered_out += 1;
            return false;
        }
        if !self.aggregator.observe(record.timestamp) {
            self.stats.late += 1;
            return false;
        }
        tracing::trace!(
            host = %record.host,
            request = %record.request,
            status = record.status,
            bytes = ?record.bytes,
            referer = ?record.referer,
            user_agent = ?record.user_agent,
            "counted request"
        );
        self.stats.accepted += 1;
        true
    }

    pub fn drain_ready_buckets(&mut self) -> Vec<Bucket> {
        self.aggregator.drain_ready_buckets()
    }

    pub fn pending(&self) -> Vec<Bucket> {
        self.aggregator.pending()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Finish the run, returning every bucket in chronological order.
    pub fn finalize(self) -> (Vec<Bucket>, PipelineStats) {
        tracing::debug!(
            observed = self.aggregator.observed(),
            late = self.aggregator.late(),
            "finalizing buckets"
        );
        (self.aggregator.finalize(), self.stats)
    }
}

/// Result of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub buckets: Vec<Bucket>,
    pub summary: Summary,
    pub stats: PipelineStats,
}

/// Read `source` to the end, then finalize and summarize.
pub async fn run_batch(
    source: &mut LineSource,
    range: DateRange,
) -> Result<BatchOutcome, SourceError> {
    let mut pipeline = Pipeline::new(range);
    while let Some(line) = source.next_line().await? {
        pipeline.feed(&line);
    }
    tracing::debug!(lines = source.lines_read(), "end of input");
    let (buckets, stats) = pipeline.finalize();
    let summary = summarize(&buckets);
    log_stats(&stats);
    Ok(BatchOutcome {
        buckets,
        summary,
        stats,
    })
}

fn log_stats(stats: &PipelineStats) {
    tracing::info!(
        lines = stats.lines_read,
        accepted = stats.accepted,
        unparseable = stats.unparseable,
        filtered_out = stats.filtered_out,
        late = stats.late,
        blank = stats.blank,
        "input processed"
    );
}

/// Receives follow-mode output as it becomes final.
pub trait FollowSink {
    /// Called once, when the backlog of existing lines has been consumed.
    /// `requests` counts every accepted line so far, including open seconds.
    fn caught_up(&mut self, requests: u64, summary: &Summary) -> std::io::Result<()>;

    /// Called for each bucket finalized after catching up.
    fn bucket(&mut self, bucket: &Bucket) -> std::io::Result<()>;
}

/// Errors that end a follow run early.
#[derive(Debug)]
pub enum FollowError {
    Source(SourceError),
    Sink(std::io::Error),
}

impl std::fmt::Display for FollowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FollowError::Source(e) => write!(f, "{e}"),
            FollowError::Sink(e) => write!(f, "failed to write live output: {e}"),
        }
    }
}

impl std::error::Error for FollowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FollowError::Source(e) => Some(e),
            FollowError::Sink(e) => Some(e),
        }
    }
}

/// Follow-mode loop states.
#[derive(Debug)]
enum FollowState {
    /// Waiting for the next line from the reader.
    Reading,
    /// A line arrived.
    Processing(String),
    /// Buckets became final and are being reported.
    Emitting(Vec<Bucket>),
}

/// Result of a follow run, after cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowOutcome {
    /// Every finalized bucket, backlog included.
    pub buckets: Vec<Bucket>,
    /// Summary over `buckets` only.
    pub summary: Summary,
    /// Open buckets dropped at shutdown.
    pub discarded: usize,
    pub stats: PipelineStats,
}

/// Tail `reader` until `shutdown` resolves.
///
/// Buckets finalized while replaying existing content are collected but only
/// reported to the sink through `caught_up`. Open buckets at shutdown are
/// discarded.
pub async fn run_follow<S, F>(
    reader: &mut FollowReader,
    range: DateRange,
    sink: &mut S,
    shutdown: F,
) -> Result<FollowOutcome, FollowError>
where
    S: FollowSink,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut pipeline = Pipeline::new(range);
    let mut running = RunningSummary::default();
    let mut finalized: Vec<Bucket> = Vec::new();
    let mut live = false;
    let mut state = FollowState::Reading;

    loop {
        state = match state {
            FollowState::Reading => tokio::select! {
                biased;
                _ = &mut shutdown => break,
                event = reader.next_event() => match event.map_err(FollowError::Source)? {
                    TailEvent::Line(line) => FollowState::Processing(line),
                    TailEvent::CaughtUp => {
                        live = true;
                        let mut backlog = running;
                        for bucket in pipeline.pending() {
                            backlog.record(&bucket);
                        }
                        sink.caught_up(pipeline.stats().accepted, &backlog.snapshot())
                            .map_err(FollowError::Sink)?;
                        FollowState::Reading
                    }
                },
            },
            FollowState::Processing(line) => {
                if pipeline.feed(&line) {
                    let ready = pipeline.drain_ready_buckets();
                    if ready.is_empty() {
                        FollowState::Reading
                    } else {
                        FollowState::Emitting(ready)
                    }
                } else {
                    FollowState::Reading
                }
            }
            FollowState::Emitting(ready) => {
                for bucket in ready {
                    running.record(&bucket);
                    if live {
                        sink.bucket(&bucket).map_err(FollowError::Sink)?;
                    }
                    finalized.push(bucket);
                }
                FollowState::Reading
            }
        };
    }

    let discarded = pipeline.pending().len();
    let stats = pipeline.stats();
    tracing::info!(
        finalized = finalized.len(),
        discarded,
        "follow stopped"
    );
    log_stats(&stats);

    Ok(FollowOutcome {
        summary: running.snapshot(),
        buckets: finalized,
        discarded,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InputSpec;
    use std::io::Write;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn line(hms: &str, path: &str) -> String {
        format!(r#"1.2.3.4 - - [08/Nov/2025:{hms} +0000] "GET {path} HTTP/1.1" 200 512"#)
    }

    #[test]
    fn test_feed_counts_each_outcome() {
        let range = DateRange::parse(Some("2025-11-08"), None).unwrap();
        let mut pipeline = Pipeline::new(range);
        assert!(pipeline.feed(&line("00:00:01", "/")));
        assert!(!pipeline.feed("garbage"));
        assert!(!pipeline.feed("   "));
        assert!(!pipeline.feed(
            r#"1.2.3.4 - - [07/Nov/2025:23:59:59 +0000] "GET / HTTP/1.1" 200 1"#
        ));
        assert_eq!(
            pipeline.stats(),
            PipelineStats {
                lines_read: 4,
                blank: 1,
                unparseable: 1,
                filtered_out: 1,
                late: 0,
                accepted: 1,
            }
        );
    }

    #[test]
    fn test_unparseable_lines_do_not_change_counts() {
        let mut clean = Pipeline::new(DateRange::default());
        let mut noisy = Pipeline::new(DateRange::default());
        for hms in ["00:00:01", "00:00:01", "00:00:02"] {
            clean.feed(&line(hms, "/"));
            noisy.feed("\\x16\\x03\\x01 garbage");
            noisy.feed(&line(hms, "/"));
            noisy.feed("1.2.3.4 - - [08/Nov/2025:00:0");
        }
        assert_eq!(clean.finalize().0, noisy.finalize().0);
    }

    #[test]
    fn test_date_filter_drops_out_of_range_records() {
        let range = DateRange::parse(Some("2025-11-01"), Some("2025-11-07")).unwrap();
        let mut pipeline = Pipeline::new(range);
        for ts in [
            "31/Oct/2025:23:59:59",
            "01/Nov/2025:00:00:00",
            "05/Nov/2025:10:00:00",
            "07/Nov/2025:23:59:59",
            "08/Nov/2025:00:00:00",
        ] {
            pipeline.feed(&format!(
                r#"1.2.3.4 - - [{ts} +0000] "GET / HTTP/1.1" 200 1"#
            ));
        }
        let (buckets, stats) = pipeline.finalize();
        assert_eq!(buckets.len(), 3);
        assert_eq!(stats.filtered_out, 2);
        for bucket in &buckets {
            assert!(range.contains(&bucket.second));
        }
    }

    #[tokio::test]
    async fn test_batch_end_to_end() {
        let input = format!(
            "{}\n{}\n{}\n",
            line("00:13:23", "/"),
            line("00:13:23", "/a"),
            line("00:14:05", "/b")
        );
        let mut source = LineSource::from_reader(std::io::Cursor::new(input.into_bytes()));
        let outcome = run_batch(&mut source, DateRange::default()).await.unwrap();

        let labels: Vec<(String, u64)> = outcome
            .buckets
            .iter()
            .map(|b| (b.label(), b.count))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("2025-11-08 00:13:23".to_string(), 2),
                ("2025-11-08 00:14:05".to_string(), 1)
            ]
        );
        assert_eq!(outcome.summary.total_requests, 3);
        assert_eq!(outcome.summary.max_rps, 2);
        assert_eq!(outcome.summary.min_rps, 1);
        assert!((outcome.summary.average_rps - 1.5).abs() < f64::EPSILON);
        assert_eq!(outcome.stats.accepted, 3);
    }

    #[tokio::test]
    async fn test_batch_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, format!("{}\nnot a log line\n", line("00:00:01", "/"))).unwrap();

        let mut source = LineSource::open(&InputSpec::File(path)).await.unwrap();
        let outcome = run_batch(&mut source, DateRange::default()).await.unwrap();
        assert_eq!(outcome.buckets.len(), 1);
        assert_eq!(outcome.stats.unparseable, 1);
    }

    #[derive(Default)]
    struct RecordingSink {
        caught_up: Vec<(u64, Summary)>,
        buckets: Vec<Bucket>,
    }

    impl FollowSink for RecordingSink {
        fn caught_up(&mut self, requests: u64, summary: &Summary) -> std::io::Result<()> {
            self.caught_up.push((requests, *summary));
            Ok(())
        }

        fn bucket(&mut self, bucket: &Bucket) -> std::io::Result<()> {
            self.buckets.push(*bucket);
            Ok(())
        }
    }

    fn append(path: &std::path::Path, lines: &[String]) {
        let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
    }

    #[tokio::test]
    async fn test_follow_emits_only_closed_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, "").unwrap();

        let mut reader = FollowReader::open(&path, Duration::from_millis(10), true)
            .await
            .unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            append(
                &writer_path,
                &[line("00:00:10", "/"), line("00:00:10", "/"), line("00:00:11", "/")],
            );
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = tx.send(());
        });

        let mut sink = RecordingSink::default();
        let outcome = run_follow(&mut reader, DateRange::default(), &mut sink, async {
            let _ = rx.await;
        })
        .await
        .unwrap();
        writer.await.unwrap();

        assert_eq!(sink.caught_up.len(), 1);
        assert_eq!(sink.caught_up[0].0, 0);
        assert_eq!(sink.buckets.len(), 1);
        assert_eq!(sink.buckets[0].label(), "2025-11-08 00:00:10");
        assert_eq!(sink.buckets[0].count, 2);

        // Second 11 was still open and is dropped.
        assert_eq!(outcome.discarded, 1);
        assert_eq!(outcome.buckets, sink.buckets);
        assert_eq!(outcome.summary.total_requests, 2);
        assert_eq!(outcome.stats.accepted, 3);
    }

    #[tokio::test]
    async fn test_follow_backlog_reported_through_caught_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, "").unwrap();
        append(
            &path,
            &[line("00:00:01", "/"), line("00:00:02", "/"), line("00:00:02", "/")],
        );

        let mut reader = FollowReader::open(&path, Duration::from_millis(10), true)
            .await
            .unwrap();
        let mut sink = RecordingSink::default();
        let outcome = run_follow(
            &mut reader,
            DateRange::default(),
            &mut sink,
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        // Backlog buckets are not streamed one by one.
        assert!(sink.buckets.is_empty());
        let (requests, initial) = sink.caught_up[0];
        assert_eq!(requests, 3);
        assert_eq!(initial.total_requests, 3);
        assert!((initial.average_rps - 1.5).abs() < f64::EPSILON);

        // Only second 1 was finalized; second 2 is discarded.
        assert_eq!(outcome.buckets.len(), 1);
        assert_eq!(outcome.summary.total_requests, 1);
        assert_eq!(outcome.discarded, 1);
    }

    #[tokio::test]
    async fn test_follow_applies_date_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, "").unwrap();
        append(
            &path,
            &[
                line("00:00:01", "/"),
                r#"1.2.3.4 - - [09/Nov/2025:00:00:02 +0000] "GET / HTTP/1.1" 200 1"#.to_string(),
                line("00:00:03", "/"),
            ],
        );

        let range = DateRange::parse(None, Some("2025-11-08")).unwrap();
        let mut reader = FollowReader::open(&path, Duration::from_millis(10), true)
            .await
            .unwrap();
        let mut sink = RecordingSink::default();
        let outcome = run_follow(
            &mut reader,
            range,
            &mut sink,
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        assert_eq!(outcome.stats.filtered_out, 1);
        assert_eq!(outcome.buckets.len(), 1);
        assert_eq!(outcome.buckets[0].label(), "2025-11-08 00:00:01");
    }

    #[tokio::test]
    async fn test_follow_late_line_does_not_repeat_second() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, "").unwrap();
        append(
            &path,
            &[
                line("00:00:10", "/"),
                line("00:00:11", "/"),
                line("00:00:10", "/late"),
                line("00:00:12", "/"),
            ],
        );

        let mut reader = FollowReader::open(&path, Duration::from_millis(10), true)
            .await
            .unwrap();
        let mut sink = RecordingSink::default();
        let outcome = run_follow(
            &mut reader,
            DateRange::default(),
            &mut sink,
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        let labels: Vec<String> = outcome.buckets.iter().map(Bucket::label).collect();
        assert_eq!(labels, vec!["2025-11-08 00:00:10", "2025-11-08 00:00:11"]);
        assert_eq!(outcome.stats.late, 1);
        assert_eq!(outcome.stats.accepted, 3);
        assert_eq!(outcome.summary.active_seconds, 2);
        assert!((outcome.summary.average_rps - 1.0).abs() < f64::EPSILON);
    }
}
