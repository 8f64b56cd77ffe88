use std::collections::BTreeMap;

use serde::Serialize;

use handover_marshal::{MarshalConfig, TypeDescriptor, TypeTable, TypeTag};

use crate::adapter::HandoverAdapter;
use crate::error::{HandoverError, Result};

/// One adapter together with the record types it owns, in marshalling order.
#[derive(Debug)]
pub struct AdapterRegistration<A> {
    pub adapter: A,
    pub types: Vec<TypeDescriptor>,
}

impl<A> AdapterRegistration<A> {
    pub fn new(adapter: A, types: impl Into<Vec<TypeDescriptor>>) -> Self {
        Self {
            adapter,
            types: types.into(),
        }
    }
}

/// One row of the registration table, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeEntry {
    pub tag: u8,
    pub name: &'static str,
    pub subsystem: &'static str,
    pub max_payload: usize,
}

/// Ordered adapter table with a verified tag-to-adapter bijection.
///
/// Registration order is marshalling order and must match on both devices.
#[derive(Debug)]
pub struct AdapterRegistry<A> {
    entries: Vec<AdapterRegistration<A>>,
    owners: BTreeMap<TypeTag, usize>,
    table: TypeTable,
}

impl<A: HandoverAdapter> AdapterRegistry<A> {
    /// Build a registry with default marshal config.
    pub fn new(registrations: Vec<AdapterRegistration<A>>) -> Result<Self> {
        Self::with_config(registrations, MarshalConfig::default())
    }

    /// Build a registry with explicit marshal config.
    ///
    /// Fails if two adapters share a name, two registrations claim the same
    /// tag, or a registration claims the reserved end-of-stream tag.
    pub fn with_config(
        registrations: Vec<AdapterRegistration<A>>,
        config: MarshalConfig,
    ) -> Result<Self> {
        let mut owners: BTreeMap<TypeTag, usize> = BTreeMap::new();
        let mut descriptors = Vec::new();

        for (index, registration) in registrations.iter().enumerate() {
            let name = registration.adapter.name();
            if registrations[..index]
                .iter()
                .any(|earlier| earlier.adapter.name() == name)
            {
                return Err(HandoverError::Registration(format!(
                    "subsystem {name} registered twice"
                )));
            }

            for descriptor in &registration.types {
                if descriptor.tag.is_reserved() {
                    return Err(HandoverError::Registration(format!(
                        "{name} claims reserved record type {}",
                        descriptor.tag
                    )));
                }
                if let Some(&owner) = owners.get(&descriptor.tag) {
                    let other = registrations[owner].adapter.name();
                    return Err(HandoverError::Registration(format!(
                        "record type {} claimed by both {other} and {name}",
                        descriptor.tag
                    )));
                }
                owners.insert(descriptor.tag, index);
                descriptors.push(*descriptor);
            }
        }

        let table = TypeTable::with_config(&descriptors, config)
            .map_err(|err| HandoverError::Registration(err.to_string()))?;

        Ok(Self {
            entries: registrations,
            owners,
            table,
        })
    }

    /// Index of the adapter owning `tag`.
    pub fn owner(&self, tag: TypeTag) -> Option<usize> {
        self.owners.get(&tag).copied()
    }

    /// Record types owned by the adapter at `index`, in declaration order.
    pub fn types(&self, index: usize) -> &[TypeDescriptor] {
        self.entries
            .get(index)
            .map(|entry| entry.types.as_slice())
            .unwrap_or(&[])
    }

    pub fn adapter(&self, index: usize) -> Option<&A> {
        self.entries.get(index).map(|entry| &entry.adapter)
    }

    pub fn adapter_mut(&mut self, index: usize) -> Option<&mut A> {
        self.entries.get_mut(index).map(|entry| &mut entry.adapter)
    }

    /// Find an adapter by subsystem name.
    pub fn find(&self, name: &str) -> Option<&A> {
        self.adapters().find(|adapter| adapter.name() == name)
    }

    /// Find an adapter by subsystem name, mutably.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut A> {
        self.adapters_mut().find(|adapter| adapter.name() == name)
    }

    /// Adapters in registration order.
    pub fn adapters(&self) -> impl Iterator<Item = &A> {
        self.entries.iter().map(|entry| &entry.adapter)
    }

    /// Adapters in registration order, mutably.
    pub fn adapters_mut(&mut self) -> impl Iterator<Item = &mut A> {
        self.entries.iter_mut().map(|entry| &mut entry.adapter)
    }

    /// Every registered record type in marshalling order.
    pub fn describe(&self) -> Vec<TypeEntry> {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry.types.iter().map(move |descriptor| TypeEntry {
                    tag: descriptor.tag.get(),
                    name: descriptor.name,
                    subsystem: entry.adapter.name(),
                    max_payload: self.table.max_payload(descriptor.tag).unwrap_or(0),
                })
            })
            .collect()
    }

    /// The shared type table built from every registration.
    pub fn table(&self) -> &TypeTable {
        &self.table
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
