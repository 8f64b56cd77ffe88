use tracing::trace;

use crate::error::{MarshalError, Result};
use crate::snapshot::{decode_snapshot, Decoded};
use crate::table::TypeTable;

/// Resumable record decoder.
///
/// Decodes whole records only. When a buffer ends mid-record the caller
/// re-supplies the undecoded tail together with more data.
#[derive(Debug)]
pub struct Unmarshaller {
    table: TypeTable,
    consumed: usize,
    records: usize,
    finished: bool,
}

impl Unmarshaller {
    pub fn new(table: TypeTable) -> Self {
        Self {
            table,
            consumed: 0,
            records: 0,
            finished: false,
        }
    }

    /// Decode the next unit at the front of `src`.
    ///
    /// Returns `Ok(None)` if `src` holds no complete record yet.
    pub fn decode(&mut self, src: &[u8]) -> Result<Option<(Decoded, usize)>> {
        if self.finished {
            if src.is_empty() {
                return Ok(None);
            }
            return Err(MarshalError::DataAfterTerminator(src.len()));
        }

        let Some((decoded, size)) = decode_snapshot(src, &self.table)? else {
            return Ok(None);
        };

        self.consumed += size;
        match &decoded {
            Decoded::Record(snapshot) => {
                self.records += 1;
                trace!(
                    tag = %snapshot.tag(),
                    name = self.table.name(snapshot.tag()),
                    size,
                    "decoded record"
                );
            }
            Decoded::EndOfStream => {
                self.finished = true;
                trace!(records = self.records, "decoded end of stream");
            }
        }
        Ok(Some((decoded, size)))
    }

    /// Iterate the complete records in `src`.
    pub fn records<'a>(&'a mut self, src: &'a [u8]) -> Records<'a> {
        Records {
            unmarshaller: self,
            src,
            consumed: 0,
            failed: false,
        }
    }

    /// Total bytes consumed across every call.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Number of records decoded so far.
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// True once the end-of-stream marker was decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Borrow the type table.
    pub fn table(&self) -> &TypeTable {
        &self.table
    }
}

/// Lazy iterator over the complete records of one input buffer.
///
/// Stops at the first incomplete record or after the first error.
/// [`consumed`](Records::consumed) reports the bytes covered by whole records.
pub struct Records<'a> {
    unmarshaller: &'a mut Unmarshaller,
    src: &'a [u8],
    consumed: usize,
    failed: bool,
}

impl Records<'_> {
    /// Bytes of the input consumed by whole records.
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Decoded>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.unmarshaller.decode(&self.src[self.consumed..]) {
            Ok(Some((decoded, size))) => {
                self.consumed += size;
                Some(Ok(decoded))
            }
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::marshaller::{Marshaller, OutBuf};
    use crate::snapshot::ConnectionSnapshot;
    use crate::table::TypeDescriptor;
    use crate::tag::TypeTag;

    const DEVICE: TypeTag = TypeTag::new(0x10);
    const CHANNEL: TypeTag = TypeTag::new(0x11);

    fn table() -> TypeTable {
        TypeTable::new(&[
            TypeDescriptor::new(DEVICE, "DEVICE"),
            TypeDescriptor::new(CHANNEL, "CHANNEL"),
        ])
        .unwrap()
    }

    fn device(id: u8) -> ConnectionSnapshot {
        ConnectionSnapshot::builder(DEVICE)
            .put_addr(&[id, 0, 0, 0, 0, 1])
            .put_u8(id)
            .put_bool(id % 2 == 0)
            .finish()
            .unwrap()
    }

    fn encode_all(snapshots: &[ConnectionSnapshot], chunks: &[usize]) -> Vec<u8> {
        let mut marshaller = Marshaller::new(table());
        let mut wire = Vec::new();
        let mut next = snapshots.iter();
        let mut chunk_sizes = chunks.iter().copied().cycle();
        let mut current: Option<&ConnectionSnapshot> = next.next();

        loop {
            let mut storage = vec![0u8; chunk_sizes.next().unwrap_or(64)];
            let mut out = OutBuf::new(&mut storage);
            let mut done = false;
            if marshaller.flush(&mut out).unwrap() {
                loop {
                    match current {
                        Some(snapshot) => {
                            current = next.next();
                            if !marshaller.encode(snapshot, &mut out).unwrap() {
                                break;
                            }
                        }
                        None => {
                            done = marshaller.finish(&mut out).unwrap();
                            break;
                        }
                    }
                }
            }
            wire.extend_from_slice(out.filled());
            if done {
                return wire;
            }
        }
    }

    #[test]
    fn decodes_records_then_terminator() {
        let wire = encode_all(&[device(1), device(2)], &[256]);
        let mut unmarshaller = Unmarshaller::new(table());

        let mut records = unmarshaller.records(&wire);
        let decoded: Vec<Decoded> = records.by_ref().map(Result::unwrap).collect();
        let consumed = records.consumed();

        assert_eq!(
            decoded,
            vec![
                Decoded::Record(device(1)),
                Decoded::Record(device(2)),
                Decoded::EndOfStream,
            ]
        );
        assert_eq!(consumed, wire.len());
        assert!(unmarshaller.is_finished());
        assert_eq!(unmarshaller.record_count(), 2);
    }

    #[test]
    fn partial_record_reports_whole_records_only() {
        let wire = encode_all(&[device(1), device(2)], &[256]);
        let first = device(1).wire_size();
        let cut = first + 4;

        let mut unmarshaller = Unmarshaller::new(table());
        let mut records = unmarshaller.records(&wire[..cut]);
        assert_eq!(records.next().unwrap().unwrap(), Decoded::Record(device(1)));
        assert!(records.next().is_none());
        assert_eq!(records.consumed(), first);

        // Re-supply the tail with the rest of the stream.
        let mut records = unmarshaller.records(&wire[first..]);
        assert_eq!(records.next().unwrap().unwrap(), Decoded::Record(device(2)));
        assert_eq!(records.next().unwrap().unwrap(), Decoded::EndOfStream);
        assert_eq!(unmarshaller.consumed(), wire.len());
    }

    #[test]
    fn unknown_tag_stops_iteration() {
        let wire = [0x99u8, 0, 0, DEVICE.get()];
        let mut unmarshaller = Unmarshaller::new(table());
        let mut records = unmarshaller.records(&wire);

        let err = records.next().unwrap().unwrap_err();
        assert!(err.is_corrupt_stream());
        assert!(records.next().is_none());
    }

    #[test]
    fn data_after_terminator_is_rejected() {
        let mut unmarshaller = Unmarshaller::new(table());
        unmarshaller.decode(&[0, 0, 0]).unwrap().unwrap();

        assert!(unmarshaller.decode(&[]).unwrap().is_none());
        assert!(matches!(
            unmarshaller.decode(&[DEVICE.get()]),
            Err(MarshalError::DataAfterTerminator(1))
        ));
    }

    #[test]
    fn channel_records_interleave_with_devices() {
        let channel = ConnectionSnapshot::builder(CHANNEL)
            .put_u16(0x0041)
            .put_blob(&[0xAA; 20])
            .finish()
            .unwrap();
        let wire = encode_all(&[device(3), channel.clone(), device(4)], &[24, 31]);

        let mut unmarshaller = Unmarshaller::new(table());
        let decoded: Vec<Decoded> = unmarshaller
            .records(&wire)
            .map(Result::unwrap)
            .collect();
        assert_eq!(decoded[1], Decoded::Record(channel));
        assert_eq!(decoded.len(), 4);
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_the_stream(
            ids in proptest::collection::vec(any::<u8>(), 0..12),
            chunks in proptest::collection::vec(6usize..40, 1..8),
        ) {
            let snapshots: Vec<ConnectionSnapshot> = ids.iter().copied().map(device).collect();

            let single = encode_all(&snapshots, &[4096]);
            let chunked = encode_all(&snapshots, &chunks);
            prop_assert_eq!(&single, &chunked);

            let mut unmarshaller = Unmarshaller::new(table());
            let decoded: Vec<Decoded> = unmarshaller
                .records(&chunked)
                .map(Result::unwrap)
                .collect();
            let mut expected: Vec<Decoded> = snapshots.into_iter().map(Decoded::Record).collect();
            expected.push(Decoded::EndOfStream);
            prop_assert_eq!(decoded, expected);
        }
    }
}
