//! Registration snapshot
//!
//! The [`Registry`] is the frozen view of a container's registrations that
//! validation runs against. It is built once when the container finishes
//! building and is never mutated afterwards; clones share storage.

use crate::activator::ConstructionStrategy;
use crate::types::TypeRef;
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Lifetime
// =============================================================================

/// How long a component instance lives.
///
/// Ordered by duration: `PerDependency < PerScope < Singleton`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Lifetime {
    /// New instance for every request
    #[default]
    PerDependency,
    /// One instance per scope
    PerScope,
    /// One instance for the container's life
    Singleton,
}

impl Lifetime {
    /// Whether a component with this lifetime outlives one with `other`,
    /// i.e. holding it would make it captive.
    #[inline]
    pub fn outlives(self, other: Lifetime) -> bool {
        self > other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerDependency => "PerDependency",
            Self::PerScope => "PerScope",
            Self::Singleton => "Singleton",
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Registration
// =============================================================================

/// One component registration.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Position in registration order
    pub ordinal: usize,
    /// Declared service types
    pub services: Vec<TypeRef>,
    /// Implementation type
    pub limit_type: TypeRef,
    pub lifetime: Lifetime,
    pub strategy: ConstructionStrategy,
}

impl Registration {
    /// The type the component is resolved as: its first declared service,
    /// or the implementation type when it declares none.
    pub fn resolved_type(&self) -> &TypeRef {
        self.services.first().unwrap_or(&self.limit_type)
    }

    /// Whether the registration provides `service`.
    pub fn provides(&self, service: &TypeRef) -> bool {
        self.services.iter().any(|s| s == service)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Immutable registry snapshot with a service index.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    registrations: Arc<[Registration]>,
    by_service: Arc<AHashMap<TypeRef, Vec<usize>>>,
}

impl Registry {
    /// Freeze `registrations` into a snapshot.
    ///
    /// A registration with no declared services is indexed under its
    /// implementation type.
    pub fn new(registrations: Vec<Registration>) -> Self {
        let mut by_service: AHashMap<TypeRef, Vec<usize>> = AHashMap::new();
        for (index, registration) in registrations.iter().enumerate() {
            if registration.services.is_empty() {
                by_service
                    .entry(registration.limit_type.clone())
                    .or_default()
                    .push(index);
            }
            for service in &registration.services {
                let entries = by_service.entry(service.clone()).or_default();
                if entries.last() != Some(&index) {
                    entries.push(index);
                }
            }
        }

        Self {
            registrations: Arc::from(registrations),
            by_service: Arc::new(by_service),
        }
    }

    #[inline]
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Registration> {
        self.registrations.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Explicit registrations providing `service`, in registration order.
    pub fn registrations_for<'a>(&'a self, service: &TypeRef) -> impl Iterator<Item = &'a Registration> + 'a {
        self.by_service
            .get(service)
            .map(|indices| indices.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|&index| self.registrations.get(index))
    }

    /// Whether resolving `service` can succeed.
    ///
    /// Collections (sequences and arrays) are always resolvable: the
    /// container supplies them, empty if nothing provides the element type.
    pub fn is_registered(&self, service: &TypeRef) -> bool {
        service.is_sequence() || self.by_service.contains_key(service)
    }

    /// Every explicitly registered service type.
    pub fn services(&self) -> impl Iterator<Item = &TypeRef> {
        self.by_service.keys()
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a Registration;
    type IntoIter = std::slice::Iter<'a, Registration>;

    fn into_iter(self) -> Self::IntoIter {
        self.registrations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{deps, enumerable};

    fn registration(ordinal: usize, services: Vec<TypeRef>, limit: &str, lifetime: Lifetime) -> Registration {
        Registration {
            ordinal,
            services,
            limit_type: TypeRef::class("App", limit),
            lifetime,
            strategy: ConstructionStrategy::FixedInstance,
        }
    }

    #[test]
    fn test_lifetime_order() {
        assert!(Lifetime::Singleton.outlives(Lifetime::PerScope));
        assert!(Lifetime::Singleton.outlives(Lifetime::PerDependency));
        assert!(Lifetime::PerScope.outlives(Lifetime::PerDependency));
        assert!(!Lifetime::PerScope.outlives(Lifetime::PerScope));
        assert!(!Lifetime::PerDependency.outlives(Lifetime::Singleton));
        assert_eq!(Lifetime::default(), Lifetime::PerDependency);
        assert_eq!(Lifetime::PerScope.to_string(), "PerScope");
    }

    #[test]
    fn test_resolved_type() {
        let with_service = registration(0, vec![deps("IDeps1")], "Deps1", Lifetime::Singleton);
        assert_eq!(with_service.resolved_type(), &deps("IDeps1"));

        let bare = registration(1, Vec::new(), "Deps1", Lifetime::Singleton);
        assert_eq!(bare.resolved_type(), &TypeRef::class("App", "Deps1"));
    }

    #[test]
    fn test_registrations_for_keeps_order_and_duplicates() {
        let registry = Registry::new(vec![
            registration(0, vec![deps("IDeps1")], "A", Lifetime::PerScope),
            registration(1, vec![deps("IDeps2")], "B", Lifetime::Singleton),
            registration(2, vec![deps("IDeps1"), deps("IDeps1")], "C", Lifetime::Singleton),
            registration(3, Vec::new(), "D", Lifetime::PerDependency),
        ]);

        let ordinals: Vec<_> = registry.registrations_for(&deps("IDeps1")).map(|r| r.ordinal).collect();
        assert_eq!(ordinals, [0, 2]);
        assert_eq!(registry.registrations_for(&TypeRef::class("App", "D")).count(), 1);
        assert_eq!(registry.registrations_for(&deps("IDeps3")).count(), 0);
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.services().count(), 3);
    }

    #[test]
    fn test_collections_are_implicitly_registered() {
        let registry = Registry::new(vec![registration(0, vec![deps("IDeps1")], "A", Lifetime::Singleton)]);

        assert!(registry.is_registered(&deps("IDeps1")));
        assert!(!registry.is_registered(&deps("IDeps2")));
        assert!(registry.is_registered(&enumerable(deps("IDeps2"))));
        assert!(registry.is_registered(&TypeRef::array(deps("IDeps2"))));
        assert_eq!(registry.registrations_for(&enumerable(deps("IDeps1"))).count(), 0);
    }
}
