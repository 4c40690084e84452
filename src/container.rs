//! Container builder and build-completion hook
//!
//! The [`ContainerBuilder`] collects registrations against an analyzed
//! [`Image`]. [`ContainerBuilder::build`] freezes them into an immutable
//! [`Registry`] and then runs the registered build callbacks, which is
//! where validation attaches.

use crate::activator::ConstructionStrategy;
use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::image::{Closure, Image};
use crate::registry::{Lifetime, Registration, Registry};
use crate::types::TypeRef;
use crate::validation::{ContainerValidationResult, GraphValidator};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

type BuildCallback = Box<dyn FnOnce(&Container) -> Result<()> + Send>;

// =============================================================================
// ContainerBuilder
// =============================================================================

/// Registration not yet frozen into the registry.
#[derive(Debug, Clone)]
struct PendingRegistration {
    services: Vec<TypeRef>,
    limit_type: TypeRef,
    lifetime: Lifetime,
    strategy: ConstructionStrategy,
}

/// Collects registrations and build callbacks.
///
/// ```rust
/// use dependency_validator::{ContainerBuilder, ImageBuilder, TypeRef};
///
/// let mut builder = ContainerBuilder::new(ImageBuilder::new().build());
/// builder
///     .register_instance(TypeRef::class("App", "Clock"))
///     .as_service(TypeRef::interface("App", "IClock"))
///     .single_instance();
///
/// let container = builder.build().unwrap();
/// // the container's own context registration comes first
/// assert_eq!(container.registry().len(), 2);
/// ```
pub struct ContainerBuilder {
    image: Arc<Image>,
    registrations: Vec<PendingRegistration>,
    callbacks: Vec<BuildCallback>,
    config: ValidatorConfig,
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("registrations", &self.registrations.len())
            .field("callbacks", &self.callbacks.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ContainerBuilder {
    /// Create a builder for components of `image`.
    pub fn new(image: impl Into<Arc<Image>>) -> Self {
        Self {
            image: image.into(),
            registrations: Vec::new(),
            callbacks: Vec::new(),
            config: ValidatorConfig::default(),
        }
    }

    /// Replace the validator configuration.
    pub fn with_validator_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn validator_config(&self) -> &ValidatorConfig {
        &self.config
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Register a component with an explicit construction strategy.
    pub fn register(&mut self, limit_type: TypeRef, strategy: ConstructionStrategy) -> RegistrationBuilder<'_> {
        let index = self.registrations.len();
        self.registrations.push(PendingRegistration {
            services: Vec::new(),
            limit_type,
            lifetime: Lifetime::default(),
            strategy,
        });
        RegistrationBuilder {
            registration: &mut self.registrations[index],
        }
    }

    /// Register a type built through constructor discovery.
    pub fn register_type(&mut self, limit_type: TypeRef) -> RegistrationBuilder<'_> {
        self.register(limit_type, ConstructionStrategy::introspective())
    }

    /// Register a factory callback producing `limit_type`.
    pub fn register_callback(&mut self, limit_type: TypeRef, entry: Closure) -> RegistrationBuilder<'_> {
        self.register(limit_type, ConstructionStrategy::callback(entry))
    }

    /// Register a pre-built instance.
    pub fn register_instance(&mut self, limit_type: TypeRef) -> RegistrationBuilder<'_> {
        self.register(limit_type, ConstructionStrategy::FixedInstance)
    }

    /// Run `callback` once the container is built, in registration order.
    /// The first failing callback fails the build.
    pub fn register_build_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&Container) -> Result<()> + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Number of registrations so far, excluding the container's own.
    #[inline]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Freeze the registrations and run the build callbacks.
    pub fn build(self) -> Result<Container> {
        let Self {
            image,
            registrations,
            callbacks,
            config,
        } = self;

        let mut frozen = Vec::with_capacity(registrations.len() + 1);
        frozen.push(context_registration());
        frozen.extend(
            registrations
                .into_iter()
                .enumerate()
                .map(|(index, pending)| Registration {
                    ordinal: index + 1,
                    services: pending.services,
                    limit_type: pending.limit_type,
                    lifetime: pending.lifetime,
                    strategy: pending.strategy,
                }),
        );

        let container = Container {
            image,
            registry: Registry::new(frozen),
            config: Arc::new(config),
        };

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_validator",
            registrations = container.registry.len(),
            callbacks = callbacks.len(),
            "Building DI container"
        );

        for callback in callbacks {
            callback(&container)?;
        }

        Ok(container)
    }
}

/// The container's own context registration, always at ordinal 0.
fn context_registration() -> Registration {
    Registration {
        ordinal: 0,
        services: vec![
            TypeRef::interface("Injector", "ILifetimeScope"),
            TypeRef::interface("Injector", "IComponentContext"),
        ],
        limit_type: TypeRef::class("Injector", "LifetimeScope"),
        lifetime: Lifetime::Singleton,
        strategy: ConstructionStrategy::FixedInstance,
    }
}

/// Fluent configuration of the registration just added.
#[derive(Debug)]
pub struct RegistrationBuilder<'a> {
    registration: &'a mut PendingRegistration,
}

impl<'a> RegistrationBuilder<'a> {
    /// Expose the component as `service`.
    pub fn as_service(self, service: TypeRef) -> Self {
        self.registration.services.push(service);
        self
    }

    pub fn with_lifetime(self, lifetime: Lifetime) -> Self {
        self.registration.lifetime = lifetime;
        self
    }

    /// One instance for the container's life
    pub fn single_instance(self) -> Self {
        self.with_lifetime(Lifetime::Singleton)
    }

    /// One instance per scope
    pub fn instance_per_scope(self) -> Self {
        self.with_lifetime(Lifetime::PerScope)
    }

    /// New instance for every request
    pub fn instance_per_dependency(self) -> Self {
        self.with_lifetime(Lifetime::PerDependency)
    }
}

// =============================================================================
// Container
// =============================================================================

/// A built container: the image plus the frozen registry snapshot.
///
/// Cheap to clone; all state is shared.
#[derive(Debug, Clone)]
pub struct Container {
    image: Arc<Image>,
    registry: Registry,
    config: Arc<ValidatorConfig>,
}

impl Container {
    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn validator_config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Whether resolving `service` can succeed.
    #[inline]
    pub fn is_registered(&self, service: &TypeRef) -> bool {
        self.registry.is_registered(service)
    }

    /// Validate the registry snapshot.
    pub fn validate(&self) -> Result<ContainerValidationResult> {
        GraphValidator::for_container(self).validate()
    }
}
