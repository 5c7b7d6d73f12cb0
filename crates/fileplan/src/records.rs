//! Record sources for the matcher.
//!
//! A walker thread pushes records through a bounded crossbeam channel; the
//! matcher pulls them as an iterator. Dropping the consumer makes the next
//! send fail, which is the producer's signal to stop.

use std::io;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::types::FileRecord;

pub type RecordIter = Box<dyn Iterator<Item = FileRecord> + Send>;

/// Something that can produce a fresh pass over its records.
pub trait RecordSource: Send + Sync {
    fn records(&self) -> RecordIter;
}

impl<F, I> RecordSource for F
where
    F: Fn() -> I + Send + Sync,
    I: IntoIterator<Item = FileRecord>,
    I::IntoIter: Send + 'static,
{
    fn records(&self) -> RecordIter {
        Box::new(self().into_iter())
    }
}

/// An in-memory snapshot of records.
#[derive(Debug, Clone, Default)]
pub struct RecordSnapshot {
    records: Arc<[FileRecord]>,
}

impl RecordSnapshot {
    pub fn new(records: impl Into<Arc<[FileRecord]>>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn as_slice(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for RecordSnapshot {
    fn records(&self) -> RecordIter {
        let records = Arc::clone(&self.records);
        Box::new((0..records.len()).map(move |index| records[index].clone()))
    }
}

/// Producer half handed to the walker closure.
pub struct RecordSender {
    sender: Sender<FileRecord>,
}

impl RecordSender {
    /// Sends one record, blocking while the channel is full. Returns `false`
    /// once the consumer is gone.
    pub fn send(&self, record: FileRecord) -> bool {
        self.sender.send(record).is_ok()
    }
}

/// Consumer half: yields records until the producer finishes.
pub struct BoundedRecords {
    receiver: Receiver<FileRecord>,
}

impl Iterator for BoundedRecords {
    type Item = FileRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

/// Runs `producer` on its own thread, feeding at most `capacity` buffered
/// records to the returned iterator.
pub fn bounded_records<F>(capacity: usize, producer: F) -> io::Result<BoundedRecords>
where
    F: FnOnce(RecordSender) + Send + 'static,
{
    let (sender, receiver) = bounded(capacity.max(1));
    thread::Builder::new()
        .name("fileplan-records".to_string())
        .spawn(move || {
            producer(RecordSender { sender });
            tracing::trace!("record producer finished");
        })?;
    Ok(BoundedRecords { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn snapshot_replays_records() {
        let snapshot = RecordSnapshot::new(vec![
            FileRecord::file("/a.txt", 1),
            FileRecord::file("/b.txt", 2),
        ]);
        assert_eq!(snapshot.records().count(), 2);
        assert_eq!(snapshot.records().count(), 2);
    }

    #[test]
    fn closures_are_sources() {
        let source = || vec![FileRecord::file("/a.txt", 1)];
        assert_eq!(source.records().count(), 1);
    }

    #[test]
    fn channel_delivers_in_order() {
        let records = bounded_records(2, |sender| {
            for index in 0..10 {
                if !sender.send(FileRecord::file(format!("/f{index}.txt"), index)) {
                    return;
                }
            }
        })
        .unwrap();
        let sizes = records.map(|record| record.size).collect::<Vec<_>>();
        assert_eq!(sizes, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn dropping_the_consumer_stops_the_producer() {
        let sent = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = bounded::<()>(1);
        let counter = Arc::clone(&sent);
        let mut records = bounded_records(1, move |sender| {
            for index in 0..1_000 {
                if !sender.send(FileRecord::file(format!("/f{index}"), 0)) {
                    break;
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
            let _ = done_tx.send(());
        })
        .unwrap();

        assert!(records.next().is_some());
        drop(records);
        done_rx.recv().unwrap();
        assert!(sent.load(Ordering::SeqCst) < 1_000);
    }
}
