//! # Dependency Validator - Static Object-Graph Validation for DI Containers
//!
//! Checks a dependency-injection container's registrations before the
//! container is put into service, catching configuration errors that would
//! otherwise surface at first use.
//!
//! ## What it finds
//!
//! - **RequiredTypesUnknown** - no usable constructor, no constructor that
//!   current registrations can satisfy, or an ambiguous constructor choice
//! - **MissingRegistration** - a component requests a type nothing provides
//! - **CaptiveDependency** - a long-lived component holds a shorter-lived one
//!
//! ## How
//!
//! For every registration the validator computes the exact set of types it
//! will request while being constructed:
//!
//! - **Introspective** components: the container's constructor selection is
//!   emulated step by step (candidate discovery, parameter binding against
//!   known registrations, then the tie-break rule)
//! - **Callback** components: the compiled callback is decoded and its call
//!   graph walked, closures included, collecting every `Resolve<T>` call
//! - **Fixed instances** request nothing
//!
//! The analyzed program is described by an [`Image`]: modules with symbol
//! tables, methods with CIL bodies, heap objects holding closures, and type
//! definitions with their constructors.
//!
//! ## Quick Start
//!
//! ```rust
//! use dependency_validator::prelude::*;
//!
//! let mut image = ImageBuilder::new();
//! let orders = TypeRef::class("App", "OrderService");
//! image.define_type(
//!     orders.clone(),
//!     vec![ConstructorInfo::public(vec![ParameterInfo::new(
//!         "repository",
//!         TypeRef::interface("App", "IOrderRepository"),
//!     )])],
//! );
//!
//! let mut builder = ContainerBuilder::new(image.build());
//! builder.register_type(orders).single_instance();
//! builder.validate_on_build();
//!
//! let err = builder.build().unwrap_err();
//! assert!(err.to_string().contains("Try add: IOrderRepository"));
//! ```
//!
//! ## Attaching validation
//!
//! - [`ValidateOnBuild::validate_on_build`] - fail the build on any error
//! - [`ValidateOnBuild::validate_on_build_filtered`] - fail unless every
//!   error matches a skip predicate
//! - [`ValidateOnBuild::validate_on_build_with`] - hand the result to a
//!   handler, never fail
//!
//! ## Precision
//!
//! Callback analysis over-approximates: calls in dead branches and calls
//! whose result is discarded still count. `Resolve(Type)` calls taking a
//! runtime type are not detected.

mod activator;
mod config;
mod constructor;
mod container;
mod decoder;
mod detector;
mod emit;
mod error;
mod image;
#[cfg(feature = "logging")]
pub mod logging;
pub mod opcode;
mod registry;
mod types;
mod validation;
mod walker;

#[cfg(test)]
mod fixtures;

pub use activator::*;
pub use config::*;
pub use constructor::*;
pub use container::*;
pub use decoder::*;
pub use detector::*;
pub use emit::*;
pub use error::*;
pub use image::*;
pub use registry::*;
pub use types::*;
pub use validation::*;
pub use walker::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Closure, ConstructionStrategy, ConstructorInfo, Container, ContainerBuilder, ContainerValidationResult,
        DiError, IlEmitter, Image, ImageBuilder, Lifetime, ParameterInfo, Result, TypeRef, ValidateOnBuild,
        ValidationError, ValidationErrorKind, ValidatorConfig,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Host, deps};

    #[test]
    fn test_successful_round_trip() {
        let mut host = Host::new();
        host.builder
            .define_type(TypeRef::class("App", "Deps1"), vec![ConstructorInfo::public(Vec::new())]);
        host.builder.define_type(
            TypeRef::class("App", "SingleDeps"),
            vec![ConstructorInfo::public(vec![ParameterInfo::new("deps1", deps("IDeps1"))])],
        );
        let settings = host.resolve_of(TypeRef::class("App", "Settings"));
        let callback = host.lambda(
            "<Register>b__0_0",
            IlEmitter::new().ldarg_1().call(settings).pop().ret().to_bytes(),
        );

        let mut builder = ContainerBuilder::new(host.build());
        builder
            .register_type(TypeRef::class("App", "Deps1"))
            .as_service(deps("IDeps1"))
            .single_instance();
        builder
            .register_type(TypeRef::class("App", "SingleDeps"))
            .as_service(deps("ISingleDeps"))
            .instance_per_scope();
        builder.register_callback(TypeRef::class("App", "Clock"), callback);
        builder.register_instance(TypeRef::class("App", "Settings")).single_instance();
        builder.validate_on_build();

        let container = builder.build().unwrap();
        let result = container.validate().unwrap();
        assert!(result.is_successful());
        assert!(result.ensure_success().is_ok());
        assert_eq!(result.to_string(), "DI container validation completed successfully!");
    }

    #[test]
    fn test_prelude_covers_common_flow() {
        use crate::prelude::*;

        let mut builder = ContainerBuilder::new(ImageBuilder::new().build());
        builder.register_type(TypeRef::class("App", "Orphan")).single_instance();
        let container = builder.build().unwrap();

        let result: ContainerValidationResult = container.validate().unwrap();
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].kind(), ValidationErrorKind::RequiredTypesUnknown);
        assert!(matches!(result.ensure_success(), Err(DiError::Validation(_))));
    }
}
