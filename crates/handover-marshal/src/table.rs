use std::collections::BTreeMap;

use crate::config::MarshalConfig;
use crate::error::{MarshalError, Result};
use crate::tag::{TypeTag, END_OF_STREAM};

/// Static description of one record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Wire tag of the record.
    pub tag: TypeTag,
    /// Human-readable record name.
    pub name: &'static str,
    /// Per-type payload bound. Falls back to [`MarshalConfig::max_payload`].
    pub max_payload: Option<usize>,
}

impl TypeDescriptor {
    /// Describe a record type bounded by the table-wide payload limit.
    pub const fn new(tag: TypeTag, name: &'static str) -> Self {
        Self {
            tag,
            name,
            max_payload: None,
        }
    }

    /// Override the payload bound for this type.
    pub const fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = Some(max_payload);
        self
    }
}

/// Tag-keyed table of every record type both devices agree on.
#[derive(Debug, Clone)]
pub struct TypeTable {
    entries: BTreeMap<TypeTag, TypeDescriptor>,
    config: MarshalConfig,
}

impl TypeTable {
    /// Build a table with default config.
    pub fn new(descriptors: &[TypeDescriptor]) -> Result<Self> {
        Self::with_config(descriptors, MarshalConfig::default())
    }

    /// Build a table with explicit config.
    ///
    /// Rejects the reserved end-of-stream tag and duplicate tags.
    pub fn with_config(descriptors: &[TypeDescriptor], config: MarshalConfig) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for descriptor in descriptors {
            if descriptor.tag.is_reserved() {
                return Err(MarshalError::ReservedType(descriptor.tag));
            }
            if entries.insert(descriptor.tag, *descriptor).is_some() {
                return Err(MarshalError::DuplicateType(descriptor.tag));
            }
        }
        Ok(Self { entries, config })
    }

    /// Look up a descriptor.
    pub fn get(&self, tag: TypeTag) -> Option<&TypeDescriptor> {
        self.entries.get(&tag)
    }

    /// Check if a tag is registered.
    pub fn contains(&self, tag: TypeTag) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Effective payload bound for a registered tag.
    pub fn max_payload(&self, tag: TypeTag) -> Option<usize> {
        self.entries.get(&tag).map(|descriptor| {
            descriptor
                .max_payload
                .unwrap_or(self.config.max_payload)
                .min(u16::MAX as usize)
        })
    }

    /// Returns a human-readable name for a tag.
    pub fn name(&self, tag: TypeTag) -> &'static str {
        if tag == END_OF_STREAM {
            return "END_OF_STREAM";
        }
        self.entries
            .get(&tag)
            .map(|descriptor| descriptor.name)
            .unwrap_or("UNKNOWN")
    }

    /// Registered tags in ascending order.
    pub fn tags(&self) -> impl Iterator<Item = TypeTag> + '_ {
        self.entries.keys().copied()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get table configuration.
    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: TypeDescriptor = TypeDescriptor::new(TypeTag::new(1), "A");
    const B: TypeDescriptor = TypeDescriptor::new(TypeTag::new(2), "B").with_max_payload(16);

    #[test]
    fn lookup_and_bounds() {
        let table = TypeTable::new(&[A, B]).unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.contains(TypeTag::new(1)));
        assert_eq!(table.max_payload(TypeTag::new(1)), Some(512));
        assert_eq!(table.max_payload(TypeTag::new(2)), Some(16));
        assert_eq!(table.max_payload(TypeTag::new(9)), None);
        assert_eq!(table.name(TypeTag::new(2)), "B");
        assert_eq!(table.name(END_OF_STREAM), "END_OF_STREAM");
        assert_eq!(table.name(TypeTag::new(9)), "UNKNOWN");
    }

    #[test]
    fn rejects_duplicates() {
        let dup = TypeDescriptor::new(TypeTag::new(1), "A2");
        assert!(matches!(
            TypeTable::new(&[A, dup]),
            Err(MarshalError::DuplicateType(tag)) if tag == TypeTag::new(1)
        ));
    }

    #[test]
    fn rejects_reserved_tag() {
        let reserved = TypeDescriptor::new(END_OF_STREAM, "EOS");
        assert!(matches!(
            TypeTable::new(&[reserved]),
            Err(MarshalError::ReservedType(_))
        ));
    }

    #[test]
    fn config_bound_is_clamped_to_wire_limit() {
        let table = TypeTable::with_config(
            &[A],
            MarshalConfig {
                max_payload: 1 << 20,
            },
        )
        .unwrap();
        assert_eq!(table.max_payload(A.tag), Some(u16::MAX as usize));
        assert_eq!(table.tags().collect::<Vec<_>>(), vec![A.tag]);
    }
}
