//! Per-client cache of compiled method descriptors.

use crate::descriptor::{compile, DescriptorError, MethodDescriptor, MethodId};
use crate::metadata::MethodMetadata;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Compiled {
    source: MethodMetadata,
    descriptor: Arc<MethodDescriptor>,
}

impl Compiled {
    fn shared(
        &self,
        id: &MethodId,
        meta: &MethodMetadata,
    ) -> Result<Arc<MethodDescriptor>, DescriptorError> {
        if self.source != *meta {
            return Err(DescriptorError::ConflictingDeclaration { method: id.clone() });
        }
        Ok(Arc::clone(&self.descriptor))
    }
}

/// Maps a [`MethodId`] to its descriptor.
///
/// Each method is compiled at most once, even when first used by several
/// threads at the same time; every caller then shares the same instance.
/// Failed compilations are not cached. Declaring an already compiled method
/// differently is an error.
#[derive(Debug, Default)]
pub struct Registry {
    descriptors: DashMap<MethodId, Compiled>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor for `service`.`meta`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// Returns the [`DescriptorError`] if the method is invalid, or
    /// [`DescriptorError::ConflictingDeclaration`] if the method was compiled
    /// before from a different declaration.
    pub fn get_or_compile(
        &self,
        service: &str,
        meta: &MethodMetadata,
    ) -> Result<Arc<MethodDescriptor>, DescriptorError> {
        let id = MethodId::new(service, meta.name());
        if let Some(compiled) = self.descriptors.get(&id) {
            return compiled.shared(&id, meta);
        }

        // The shard lock is held while compiling, so racers wait for the winner.
        match self.descriptors.entry(id) {
            Entry::Occupied(entry) => entry.get().shared(entry.key(), meta),
            Entry::Vacant(entry) => {
                let descriptor = Arc::new(compile(service, meta)?);
                entry.insert(Compiled {
                    source: meta.clone(),
                    descriptor: Arc::clone(&descriptor),
                });
                Ok(descriptor)
            }
        }
    }

    /// Returns the cached descriptor for `id`, if compiled.
    pub fn get(&self, id: &MethodId) -> Option<Arc<MethodDescriptor>> {
        self.descriptors.get(id).map(|c| Arc::clone(&c.descriptor))
    }

    /// The number of cached descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
