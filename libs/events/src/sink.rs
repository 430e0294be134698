//! Destinations for the record stream.

use std::io::Write;

use privpack_id::{RecordSeq, SimTime};

use crate::{DecisionRecord, EventError, MetricsSnapshot, Record, RecordEnvelope, RunSummary};

/// Receives records in stream order.
pub trait RecordSink {
    /// Writes one record.
    fn write(&mut self, envelope: &RecordEnvelope<Record>) -> Result<(), EventError>;

    /// Flushes buffered output.
    fn flush(&mut self) -> Result<(), EventError> {
        Ok(())
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn write(&mut self, envelope: &RecordEnvelope<Record>) -> Result<(), EventError> {
        serde_json::to_writer(&mut self.writer, envelope)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EventError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Vec<RecordEnvelope<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[RecordEnvelope<Record>] {
        &self.records
    }

    pub fn decisions(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.records.iter().filter_map(|r| r.payload.as_decision())
    }

    pub fn metrics(&self) -> impl Iterator<Item = &MetricsSnapshot> {
        self.records.iter().filter_map(|r| match &r.payload {
            Record::Metrics(metrics) => Some(metrics),
            _ => None,
        })
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.records.iter().rev().find_map(|r| match &r.payload {
            Record::Summary(summary) => Some(summary),
            _ => None,
        })
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, envelope: &RecordEnvelope<Record>) -> Result<(), EventError> {
        self.records.push(envelope.clone());
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn write(&mut self, envelope: &RecordEnvelope<Record>) -> Result<(), EventError> {
        (**self).write(envelope)
    }

    fn flush(&mut self) -> Result<(), EventError> {
        (**self).flush()
    }
}

/// Stamps records with sequence numbers and forwards them to a sink.
#[derive(Debug)]
pub struct Recorder<S> {
    sink: S,
    next_seq: RecordSeq,
}

impl<S: RecordSink> Recorder<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            next_seq: RecordSeq::FIRST,
        }
    }

    /// Emits a record at `sim_time` and returns its sequence number.
    pub fn emit(&mut self, sim_time: SimTime, record: Record) -> Result<RecordSeq, EventError> {
        let seq = self.next_seq;
        self.sink.write(&RecordEnvelope::wrap(seq, sim_time, record))?;
        self.next_seq = seq.next();
        Ok(seq)
    }

    pub fn flush(&mut self) -> Result<(), EventError> {
        self.sink.flush()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Outcome, RejectReason};
    use privpack_id::{BlockId, TaskId};

    fn rejected(task: u64) -> Record {
        Record::Decision(DecisionRecord {
            task_id: TaskId::new(task),
            task_name: Some("count".into()),
            outcome: Outcome::Rejected(RejectReason::InsufficientBudget),
            policy: "fcfs".into(),
            arrival_time: SimTime::ZERO,
            decision_time: SimTime::ZERO,
            profit: 1.0,
            demand: vec![6.0],
            block_ids: vec![BlockId::new(0)],
            allocations: vec![],
            attempts: 1,
        })
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_record() {
        let mut recorder = Recorder::new(JsonLinesSink::new(Vec::new()));
        recorder.emit(SimTime::ZERO, rejected(0)).unwrap();
        recorder.emit(SimTime::ZERO, rejected(1)).unwrap();
        recorder.flush().unwrap();

        let sink = recorder.into_sink();
        assert_eq!(sink.written(), 2);
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["seq"], 1);
        assert_eq!(first["kind"], "task.rejected");
        assert_eq!(first["payload"]["outcome"]["reason"], "insufficient_budget");
        assert_eq!(first["payload"]["block_ids"][0], 0);
    }

    #[test]
    fn test_recorder_sequence_is_monotonic() {
        let mut recorder = Recorder::new(MemorySink::new());
        let a = recorder.emit(SimTime::ZERO, rejected(0)).unwrap();
        let b = recorder.emit(SimTime::ZERO, rejected(1)).unwrap();
        assert!(a < b);
        assert_eq!(recorder.sink().decisions().count(), 2);
        assert!(recorder.sink().summary().is_none());
    }

    #[test]
    fn test_boxed_sink_forwards() {
        let mut sink: Box<dyn RecordSink> = Box::new(MemorySink::new());
        let envelope = RecordEnvelope::wrap(RecordSeq::FIRST, SimTime::ZERO, rejected(0));
        sink.write(&envelope).unwrap();
        sink.flush().unwrap();
    }
}
