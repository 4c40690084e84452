//! Graph validation
//!
//! Cross-checks the required types of every registration against the
//! registry snapshot and reports three kinds of problems:
//!
//! - **RequiredTypesUnknown**: the component's requirements cannot be
//!   determined (no usable constructor, ambiguous selection, ...)
//! - **MissingRegistration**: a required type has no registration
//! - **CaptiveDependency**: a component outlives a dependency it holds
//!
//! Validation is usually attached to a [`ContainerBuilder`] and runs once
//! when the container is built:
//!
//! ```rust
//! use dependency_validator::{ContainerBuilder, ImageBuilder, TypeRef, ValidateOnBuild};
//!
//! let image = ImageBuilder::new().build();
//! let mut builder = ContainerBuilder::new(image);
//! builder.register_instance(TypeRef::class("App", "Clock")).single_instance();
//! builder.validate_on_build();
//!
//! assert!(builder.build().is_ok());
//! ```

use crate::activator::{RequiredTypeResolver, RequiredTypes, RequiredTypesStatus};
use crate::config::ValidatorConfig;
use crate::container::{Container, ContainerBuilder};
use crate::error::{DiError, Result};
use crate::image::Image;
use crate::registry::{Lifetime, Registration, Registry};
use crate::types::{TypeRef, TypeSet};
use std::fmt;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

// =============================================================================
// Errors
// =============================================================================

/// The registration an error is about.
///
/// Equality ignores the ordinal, which only helps locate the registration.
#[derive(Debug, Clone, Eq)]
pub struct ComponentRef {
    /// Type the component is resolved as
    pub resolved_type: TypeRef,
    /// Implementation type
    pub actual_type: TypeRef,
    /// Position of the registration in the registry
    pub ordinal: usize,
}

impl ComponentRef {
    pub fn new(resolved_type: TypeRef, actual_type: TypeRef, ordinal: usize) -> Self {
        Self {
            resolved_type,
            actual_type,
            ordinal,
        }
    }

    pub fn of(registration: &Registration) -> Self {
        Self::new(
            registration.resolved_type().clone(),
            registration.limit_type.clone(),
            registration.ordinal,
        )
    }
}

impl PartialEq for ComponentRef {
    fn eq(&self, other: &Self) -> bool {
        self.resolved_type == other.resolved_type && self.actual_type == other.actual_type
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    RequiredTypesUnknown,
    MissingRegistration,
    CaptiveDependency,
}

impl ValidationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequiredTypesUnknown => "RequiredTypesUnknown",
            Self::MissingRegistration => "MissingRegistration",
            Self::CaptiveDependency => "CaptiveDependency",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem found in one registration.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Required types could not be determined
    RequiredTypesUnknown {
        component: ComponentRef,
        status: RequiredTypesStatus,
        /// Required types that are not registered yet
        suggested_types: TypeSet,
    },
    /// Required types with no registration
    MissingRegistration {
        component: ComponentRef,
        dependencies: TypeSet,
    },
    /// Shorter-lived dependencies held by a longer-lived component
    CaptiveDependency {
        component: ComponentRef,
        lifetime: Lifetime,
        /// One entry per offending dependency registration
        dependencies: Vec<(TypeRef, Lifetime)>,
    },
}

impl ValidationError {
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            Self::RequiredTypesUnknown { .. } => ValidationErrorKind::RequiredTypesUnknown,
            Self::MissingRegistration { .. } => ValidationErrorKind::MissingRegistration,
            Self::CaptiveDependency { .. } => ValidationErrorKind::CaptiveDependency,
        }
    }

    pub fn component(&self) -> &ComponentRef {
        match self {
            Self::RequiredTypesUnknown { component, .. }
            | Self::MissingRegistration { component, .. }
            | Self::CaptiveDependency { component, .. } => component,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequiredTypesUnknown {
                component,
                status,
                suggested_types,
            } => {
                write!(f, "{} registration has error: {}.", component.actual_type, status)?;
                if !suggested_types.is_empty() {
                    f.write_str(" Try add: ")?;
                    for (i, ty) in suggested_types.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{ty}")?;
                    }
                }
                f.write_str("\n")
            }
            Self::MissingRegistration {
                component,
                dependencies,
            } => {
                writeln!(
                    f,
                    "{} requires the following types which are not registered:",
                    component.actual_type
                )?;
                for ty in dependencies {
                    writeln!(f, "\t{ty}")?;
                }
                Ok(())
            }
            Self::CaptiveDependency {
                component,
                lifetime,
                dependencies,
            } => {
                writeln!(
                    f,
                    "{} with lifetime {} captures the following types:",
                    component.actual_type, lifetime
                )?;
                for (ty, dependency_lifetime) in dependencies {
                    writeln!(f, "\t{ty} with lifetime {dependency_lifetime}")?;
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// ContainerValidationResult
// =============================================================================

/// Immutable list of validation errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerValidationResult {
    errors: Vec<ValidationError>,
}

impl ContainerValidationResult {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    #[inline]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Errors of one kind, in report order.
    pub fn errors_of_kind(&self, kind: ValidationErrorKind) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |err| err.kind() == kind)
    }

    #[inline]
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fail with [`DiError::Validation`] if any error was found.
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_successful() {
            Ok(())
        } else {
            Err(DiError::Validation(self.clone()))
        }
    }

    /// A new result without the errors matching `should_skip`.
    pub fn filter_errors<F>(&self, mut should_skip: F) -> Self
    where
        F: FnMut(&ValidationError) -> bool,
    {
        Self::new(self.errors.iter().filter(|err| !should_skip(*err)).cloned().collect())
    }
}

impl fmt::Display for ContainerValidationResult {
    /// Human-readable report, grouped by error kind in order of first
    /// appearance.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("DI container validation completed successfully!");
        }

        let mut kinds: Vec<ValidationErrorKind> = Vec::new();
        for err in &self.errors {
            if !kinds.contains(&err.kind()) {
                kinds.push(err.kind());
            }
        }

        f.write_str("DI container validation errors:\n")?;
        for kind in kinds {
            writeln!(f, "{kind}:")?;
            for err in self.errors_of_kind(kind) {
                write!(f, "\t{}", err.to_string().replace('\t', "\t\t"))?;
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

// =============================================================================
// GraphValidator
// =============================================================================

/// Single pass over a registry snapshot.
#[derive(Debug, Clone, Copy)]
pub struct GraphValidator<'a> {
    registry: &'a Registry,
    config: &'a ValidatorConfig,
    resolver: RequiredTypeResolver<'a>,
}

impl<'a> GraphValidator<'a> {
    pub fn new(image: &'a Image, registry: &'a Registry, config: &'a ValidatorConfig) -> Self {
        Self {
            registry,
            config,
            resolver: RequiredTypeResolver::new(image, registry, config),
        }
    }

    pub fn for_container(container: &'a Container) -> Self {
        Self::new(container.image(), container.registry(), container.validator_config())
    }

    /// Validate every registration.
    ///
    /// Framework registrations are skipped silently. Fails only if the
    /// required types of a registration cannot be computed at all.
    pub fn validate(&self) -> Result<ContainerValidationResult> {
        let mut errors = Vec::new();
        #[cfg(feature = "logging")]
        let mut skipped = 0usize;

        for registration in self.registry {
            if self.config.is_excluded(&registration.limit_type) {
                #[cfg(feature = "logging")]
                {
                    skipped += 1;
                }
                continue;
            }
            self.validate_registration(registration, &mut errors)?;
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_validator",
            registrations = self.registry.len(),
            skipped = skipped,
            errors = errors.len(),
            "Container validation completed"
        );

        Ok(ContainerValidationResult::new(errors))
    }

    fn validate_registration(&self, registration: &Registration, errors: &mut Vec<ValidationError>) -> Result<()> {
        let RequiredTypes { status, mut types } = self.resolver.resolve(registration)?;
        types.retain(|ty| !self.config.is_excluded(ty));
        let component = ComponentRef::of(registration);

        #[cfg(feature = "logging")]
        trace!(
            target: "dependency_validator",
            ordinal = registration.ordinal,
            service = %component.resolved_type,
            lifetime = %registration.lifetime,
            status = %status,
            required = types.len(),
            "Validating registration"
        );

        let unregistered = types.filtered(|ty| !self.registry.is_registered(ty));

        if status != RequiredTypesStatus::Success {
            errors.push(ValidationError::RequiredTypesUnknown {
                component,
                status,
                suggested_types: unregistered,
            });
            return Ok(());
        }

        if !unregistered.is_empty() {
            errors.push(ValidationError::MissingRegistration {
                component: component.clone(),
                dependencies: unregistered,
            });
        }

        let captured = self.captive_dependencies(registration.lifetime, &types);
        if !captured.is_empty() {
            errors.push(ValidationError::CaptiveDependency {
                component,
                lifetime: registration.lifetime,
                dependencies: captured,
            });
        }

        Ok(())
    }

    /// Every registration of a required type (collections unwrapped to
    /// their element type) that `lifetime` outlives.
    fn captive_dependencies(&self, lifetime: Lifetime, required: &TypeSet) -> Vec<(TypeRef, Lifetime)> {
        let dependencies: TypeSet = required
            .iter()
            .map(|ty| if ty.is_sequence() { ty.element_type() } else { ty.clone() })
            .collect();

        let mut captured = Vec::new();
        for ty in &dependencies {
            for dependency in self.registry.registrations_for(ty) {
                if lifetime.outlives(dependency.lifetime) {
                    captured.push((ty.clone(), dependency.lifetime));
                }
            }
        }
        captured
    }
}

// =============================================================================
// Attachment points
// =============================================================================

/// Runs graph validation when the container is built.
pub trait ValidateOnBuild {
    /// Fail the build if validation finds any error.
    fn validate_on_build(&mut self) -> &mut Self;

    /// Fail the build unless every error matches `should_skip`.
    fn validate_on_build_filtered<F>(&mut self, should_skip: F) -> &mut Self
    where
        F: FnMut(&ValidationError) -> bool + Send + 'static;

    /// Hand the full result to `handler`; the build never fails on
    /// validation errors.
    fn validate_on_build_with<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnOnce(ContainerValidationResult) + Send + 'static;
}

impl ValidateOnBuild for ContainerBuilder {
    fn validate_on_build(&mut self) -> &mut Self {
        self.register_build_callback(|container| container.validate()?.ensure_success())
    }

    fn validate_on_build_filtered<F>(&mut self, should_skip: F) -> &mut Self
    where
        F: FnMut(&ValidationError) -> bool + Send + 'static,
    {
        self.register_build_callback(move |container| {
            container.validate()?.filter_errors(should_skip).ensure_success()
        })
    }

    fn validate_on_build_with<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnOnce(ContainerValidationResult) + Send + 'static,
    {
        self.register_build_callback(move |container| {
            handler(container.validate()?);
            Ok(())
        })
    }
}
