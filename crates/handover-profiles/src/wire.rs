//! Record types and field helpers shared by the profile adapters.

use std::collections::BTreeMap;

use handover_coordinator::BdAddr;
use handover_marshal::{MarshalError, SnapshotReader, TypeDescriptor, TypeTag};

/// One record per ACL link to the handset.
pub const ACL_LINK: TypeTag = TypeTag::new(0x01);
/// One record per stream-transport remote device.
pub const STREAM_DEVICE: TypeTag = TypeTag::new(0x10);
/// One record per media channel of a stream-transport device.
pub const MEDIA_CHANNEL: TypeTag = TypeTag::new(0x11);
/// Codec configuration blocks of a stream-transport device.
pub const STREAM_DATA_BLOCKS: TypeTag = TypeTag::new(0x12);
/// One record per remote-control connection.
pub const CONTROL_CONNECTION: TypeTag = TypeTag::new(0x20);
/// Profile-wide voice-call state.
pub const VOICE_TASK: TypeTag = TypeTag::new(0x30);
/// The handset's voice-call service link.
pub const VOICE_LINK: TypeTag = TypeTag::new(0x31);

/// Largest codec configuration blob a device may carry.
pub const MAX_DATA_BLOCKS: usize = 128;

/// Data blocks travel as length-prefixed segments of at most this many bytes,
/// so no field of the record outgrows a device address.
pub const DATA_BLOCK_SEGMENT: usize = 4;

const MAX_DATA_BLOCK_SEGMENTS: usize = MAX_DATA_BLOCKS / DATA_BLOCK_SEGMENT;

pub(crate) const ACL_LINK_TYPE: TypeDescriptor =
    TypeDescriptor::new(ACL_LINK, "ACL_LINK").with_max_payload(16);
pub(crate) const STREAM_DEVICE_TYPE: TypeDescriptor =
    TypeDescriptor::new(STREAM_DEVICE, "STREAM_DEVICE").with_max_payload(16);
pub(crate) const MEDIA_CHANNEL_TYPE: TypeDescriptor =
    TypeDescriptor::new(MEDIA_CHANNEL, "MEDIA_CHANNEL").with_max_payload(16);
pub(crate) const STREAM_DATA_BLOCKS_TYPE: TypeDescriptor =
    TypeDescriptor::new(STREAM_DATA_BLOCKS, "STREAM_DATA_BLOCKS")
        .with_max_payload(7 + MAX_DATA_BLOCK_SEGMENTS * (2 + DATA_BLOCK_SEGMENT));
pub(crate) const CONTROL_CONNECTION_TYPE: TypeDescriptor =
    TypeDescriptor::new(CONTROL_CONNECTION, "CONTROL_CONNECTION").with_max_payload(16);
pub(crate) const VOICE_TASK_TYPE: TypeDescriptor =
    TypeDescriptor::new(VOICE_TASK, "VOICE_TASK").with_max_payload(8);
pub(crate) const VOICE_LINK_TYPE: TypeDescriptor =
    TypeDescriptor::new(VOICE_LINK, "VOICE_LINK").with_max_payload(8);

/// Declares a `u8`-backed protocol state enum with wire conversions.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub(crate) fn to_wire(self) -> u8 {
                self as u8
            }

            pub(crate) fn from_wire(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

pub(crate) use wire_enum;

/// Read a `u8` and convert it with `decode`, rejecting unknown values.
pub(crate) fn get_enum<T>(
    reader: &mut SnapshotReader,
    field: &'static str,
    decode: fn(u8) -> Option<T>,
) -> Result<T, MarshalError> {
    let raw = reader.get_u8()?;
    decode(raw).ok_or_else(|| reader.invalid(field, u64::from(raw)))
}

pub(crate) fn get_addr(reader: &mut SnapshotReader) -> Result<BdAddr, MarshalError> {
    reader.get_addr().map(BdAddr::new)
}

/// Per-attempt bookkeeping: where each record type's walk stands, and
/// whether the adapter is taking part in an attempt.
#[derive(Debug, Default)]
pub(crate) struct Attempt {
    cursors: BTreeMap<TypeTag, usize>,
    active: bool,
}

impl Attempt {
    /// Position of the next object of `tag`, advancing the walk.
    pub(crate) fn advance(&mut self, tag: TypeTag) -> usize {
        self.active = true;
        let position = self.cursors.entry(tag).or_insert(0);
        let current = *position;
        *position += 1;
        current
    }

    pub(crate) fn begin(&mut self) {
        self.active = true;
    }

    pub(crate) fn end(&mut self) {
        self.cursors.clear();
        self.active = false;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use handover_marshal::ConnectionSnapshot;

    use super::*;

    wire_enum! {
        pub enum Sample {
            Off = 0,
            On = 1,
        }
    }

    #[test]
    fn wire_enum_round_trip() {
        assert_eq!(Sample::from_wire(Sample::On.to_wire()), Some(Sample::On));
        assert_eq!(Sample::from_wire(7), None);
    }

    #[test]
    fn get_enum_reports_field() {
        let snapshot = ConnectionSnapshot::from_payload(ACL_LINK, vec![9u8]);
        let mut reader = snapshot.reader();
        let err = get_enum(&mut reader, "mode", Sample::from_wire).unwrap_err();
        assert!(matches!(
            err,
            MarshalError::InvalidValue {
                field: "mode",
                value: 9,
                ..
            }
        ));
    }

    #[test]
    fn attempt_walks_each_type_independently() {
        let mut attempt = Attempt::default();
        assert!(!attempt.is_active());
        assert_eq!(attempt.advance(STREAM_DEVICE), 0);
        assert_eq!(attempt.advance(STREAM_DEVICE), 1);
        assert_eq!(attempt.advance(MEDIA_CHANNEL), 0);
        assert!(attempt.is_active());

        attempt.end();
        assert!(!attempt.is_active());
        assert_eq!(attempt.advance(STREAM_DEVICE), 0);
    }
}
