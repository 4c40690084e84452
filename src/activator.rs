//! Construction strategies and required-type discovery
//!
//! Every registration carries exactly one [`ConstructionStrategy`]. The
//! [`RequiredTypeResolver`] dispatches on it to find out which types the
//! component will request from the container while being built.

use crate::config::ValidatorConfig;
use crate::constructor::ReflectionActivator;
use crate::decoder::CilDecoder;
use crate::detector::ResolveCallDetector;
use crate::error::{DiError, Result};
use crate::image::{Closure, Image};
use crate::registry::{Registration, Registry};
use crate::types::TypeSet;
use crate::walker::CallGraphWalker;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

// =============================================================================
// Result model
// =============================================================================

/// Outcome of required-type discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredTypesStatus {
    Success,
    /// The type exposes no usable constructor
    NoAvailableConstructors,
    /// No constructor can be satisfied by the current registrations
    NotEnoughRegistrationsToUseAnyConstructors,
    /// The container's tie-break would refuse to pick a constructor
    SelectConstructorError,
}

impl RequiredTypesStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::NoAvailableConstructors => "NoAvailableConstructors",
            Self::NotEnoughRegistrationsToUseAnyConstructors => "NotEnoughRegistrationsToUseAnyConstructors",
            Self::SelectConstructorError => "SelectConstructorError",
        }
    }
}

impl fmt::Display for RequiredTypesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus the types a component requests.
///
/// `types` is empty unless the status is `Success` or
/// `NotEnoughRegistrationsToUseAnyConstructors`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredTypes {
    pub status: RequiredTypesStatus,
    pub types: TypeSet,
}

impl RequiredTypes {
    #[inline]
    pub fn new(status: RequiredTypesStatus, types: TypeSet) -> Self {
        Self { status, types }
    }

    #[inline]
    pub fn success(types: TypeSet) -> Self {
        Self::new(RequiredTypesStatus::Success, types)
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == RequiredTypesStatus::Success
    }
}

// =============================================================================
// Strategies
// =============================================================================

/// Component built by invoking a registered factory callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackActivator {
    /// The compiled callback: method plus captured environment
    pub entry: Closure,
}

impl CallbackActivator {
    pub fn new(entry: Closure) -> Self {
        Self { entry }
    }
}

/// How a registration produces its instance.
#[derive(Debug, Clone)]
pub enum ConstructionStrategy {
    /// Constructor discovery and autowiring
    Introspective(ReflectionActivator),
    /// Factory callback
    Callback(CallbackActivator),
    /// Pre-built instance
    FixedInstance,
    /// Strategy the validator knows nothing about
    Custom(Arc<str>),
}

impl ConstructionStrategy {
    /// Introspective construction with the container's default pipeline.
    pub fn introspective() -> Self {
        Self::Introspective(ReflectionActivator::default())
    }

    pub fn callback(entry: Closure) -> Self {
        Self::Callback(CallbackActivator::new(entry))
    }

    pub fn kind_name(&self) -> &str {
        match self {
            Self::Introspective(_) => "introspective",
            Self::Callback(_) => "callback",
            Self::FixedInstance => "fixed_instance",
            Self::Custom(name) => name,
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Computes the required types of a registration against a fixed image and
/// registry snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RequiredTypeResolver<'a> {
    image: &'a Image,
    registry: &'a Registry,
    config: &'a ValidatorConfig,
}

impl<'a> RequiredTypeResolver<'a> {
    pub fn new(image: &'a Image, registry: &'a Registry, config: &'a ValidatorConfig) -> Self {
        Self {
            image,
            registry,
            config,
        }
    }

    /// Required types of `registration`.
    ///
    /// Fails only when a callback's compiled entry point is missing or one
    /// of the methods it reaches cannot be decoded.
    pub fn resolve(&self, registration: &Registration) -> Result<RequiredTypes> {
        let result = match &registration.strategy {
            ConstructionStrategy::Introspective(activator) => {
                activator.required_types(&registration.limit_type, self.image, self.registry)
            }
            ConstructionStrategy::Callback(callback) => self.callback_types(registration, callback)?,
            ConstructionStrategy::FixedInstance | ConstructionStrategy::Custom(_) => {
                RequiredTypes::success(TypeSet::new())
            }
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "dependency_validator",
            service = %registration.resolved_type(),
            strategy = registration.strategy.kind_name(),
            status = %result.status,
            required = result.types.len(),
            "Required types resolved"
        );

        Ok(result)
    }

    fn callback_types(&self, registration: &Registration, callback: &CallbackActivator) -> Result<RequiredTypes> {
        let entry = callback.entry;
        if self.image.method(entry.method).is_none() {
            return Err(DiError::entry_point_not_found(
                registration.resolved_type().full_name(),
                entry.method,
            ));
        }

        let decoder = CilDecoder::new(self.image).with_system_namespaces(self.config.system_namespaces.iter().cloned());
        let walker = CallGraphWalker::with_decoder(self.image, decoder).with_options(self.config.callback_walk);
        let types = ResolveCallDetector::collect(&self.config.resolve_entry_point, &walker, entry)?;
        Ok(RequiredTypes::success(types))
    }
}
