//! Constructor selection emulation
//!
//! Predicts which constructor the container would use to build an
//! introspectively constructed component, and therefore which types it
//! will request. The container's own pipeline is reproduced step by step:
//! candidate discovery, parameter binding, then the selection tie-break.

use crate::activator::{RequiredTypes, RequiredTypesStatus};
use crate::error::{IntrospectionError, SelectionError};
use crate::image::{ConstructorInfo, Image, ParameterInfo};
use crate::registry::Registry;
use crate::types::{TypeKind, TypeRef, TypeSet};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

// =============================================================================
// Pipeline stages
// =============================================================================

/// Enumerates the constructors the container may choose from.
pub trait ConstructorFinder: fmt::Debug + Send + Sync {
    fn find_constructors<'i>(
        &self,
        image: &'i Image,
        ty: &TypeRef,
    ) -> Result<Vec<&'i ConstructorInfo>, IntrospectionError>;
}

/// Decides whether a parameter can be supplied at construction time.
pub trait ParameterStrategy: fmt::Debug + Send + Sync {
    fn can_supply(&self, parameter: &ParameterInfo, registry: &Registry) -> bool;
}

/// Picks one constructor among the bindable candidates.
pub trait ConstructorSelector: fmt::Debug + Send + Sync {
    fn select<'b, 'i>(
        &self,
        bindings: &'b [ConstructorBinding<'i>],
    ) -> Result<&'b ConstructorBinding<'i>, SelectionError>;
}

/// Public constructors of the type definition, in declaration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicConstructorFinder;

impl ConstructorFinder for PublicConstructorFinder {
    fn find_constructors<'i>(
        &self,
        image: &'i Image,
        ty: &TypeRef,
    ) -> Result<Vec<&'i ConstructorInfo>, IntrospectionError> {
        match image.type_definition(ty) {
            Some(definition) => Ok(definition.constructors.iter().filter(|c| c.is_public).collect()),
            None => match ty.kind() {
                Some(TypeKind::Interface | TypeKind::Delegate | TypeKind::Sequence) | None => {
                    Err(IntrospectionError::NotConstructible(ty.to_string()))
                }
                _ => Err(IntrospectionError::UnknownType(ty.to_string())),
            },
        }
    }
}

/// Supplies parameters whose type the registry can resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutowiringParameter;

impl ParameterStrategy for AutowiringParameter {
    fn can_supply(&self, parameter: &ParameterInfo, registry: &Registry) -> bool {
        registry.is_registered(&parameter.ty)
    }
}

/// Supplies parameters that declare a default value.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueParameter;

impl ParameterStrategy for DefaultValueParameter {
    fn can_supply(&self, parameter: &ParameterInfo, _registry: &Registry) -> bool {
        parameter.has_default_value()
    }
}

/// Chooses the bindable constructor with the most parameters; a tie is an
/// error.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostParametersSelector;

impl ConstructorSelector for MostParametersSelector {
    fn select<'b, 'i>(
        &self,
        bindings: &'b [ConstructorBinding<'i>],
    ) -> Result<&'b ConstructorBinding<'i>, SelectionError> {
        let most = bindings
            .iter()
            .map(|b| b.constructor.parameters.len())
            .max()
            .ok_or(SelectionError::NoCandidates)?;

        let mut best = bindings.iter().filter(|b| b.constructor.parameters.len() == most);
        let first = best.next().ok_or(SelectionError::NoCandidates)?;
        let ties = best.count();
        if ties > 0 {
            return Err(SelectionError::Ambiguous {
                parameters: most,
                candidates: ties + 1,
            });
        }
        Ok(first)
    }
}

/// Outcome of binding one candidate constructor.
#[derive(Debug, Clone, Copy)]
pub struct ConstructorBinding<'i> {
    pub constructor: &'i ConstructorInfo,
    /// Every parameter is supplied by some strategy
    pub can_instantiate: bool,
}

impl<'i> ConstructorBinding<'i> {
    /// Bind `constructor`, trying `strategies` in order for each parameter.
    pub fn bind(
        constructor: &'i ConstructorInfo,
        strategies: &[Arc<dyn ParameterStrategy>],
        registry: &Registry,
    ) -> Self {
        let can_instantiate = constructor
            .parameters
            .iter()
            .all(|p| strategies.iter().any(|s| s.can_supply(p, registry)));
        Self {
            constructor,
            can_instantiate,
        }
    }
}

fn required_parameter_types(constructor: &ConstructorInfo) -> TypeSet {
    constructor.required_parameter_types().cloned().collect()
}

// =============================================================================
// Reflection activator
// =============================================================================

/// Introspective construction: the container discovers and calls a
/// constructor of the implementation type.
#[derive(Debug, Clone)]
pub struct ReflectionActivator {
    pub finder: Arc<dyn ConstructorFinder>,
    pub parameters: Vec<Arc<dyn ParameterStrategy>>,
    pub selector: Arc<dyn ConstructorSelector>,
}

impl Default for ReflectionActivator {
    /// Public constructors, autowiring then default values, most parameters.
    fn default() -> Self {
        Self {
            finder: Arc::new(PublicConstructorFinder),
            parameters: vec![Arc::new(AutowiringParameter), Arc::new(DefaultValueParameter)],
            selector: Arc::new(MostParametersSelector),
        }
    }
}

impl ReflectionActivator {
    pub fn new(
        finder: Arc<dyn ConstructorFinder>,
        parameters: Vec<Arc<dyn ParameterStrategy>>,
        selector: Arc<dyn ConstructorSelector>,
    ) -> Self {
        Self {
            finder,
            parameters,
            selector,
        }
    }

    /// Predict the types requested when constructing `limit_type`.
    pub fn required_types(&self, limit_type: &TypeRef, image: &Image, registry: &Registry) -> RequiredTypes {
        let candidates = match self.finder.find_constructors(image, limit_type) {
            Ok(candidates) => candidates,
            Err(_err) => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "dependency_validator",
                    limit_type = %limit_type,
                    error = %_err,
                    "Constructor discovery failed"
                );
                Vec::new()
            }
        };

        let Some(first) = candidates.first() else {
            return RequiredTypes::new(RequiredTypesStatus::NoAvailableConstructors, TypeSet::new());
        };

        let bindable: Vec<_> = candidates
            .iter()
            .map(|&c| ConstructorBinding::bind(c, &self.parameters, registry))
            .filter(|b| b.can_instantiate)
            .collect();

        if bindable.is_empty() {
            #[cfg(feature = "logging")]
            debug!(
                target: "dependency_validator",
                limit_type = %limit_type,
                candidates = candidates.len(),
                "No bindable constructor, reporting the first candidate"
            );
            return RequiredTypes::new(
                RequiredTypesStatus::NotEnoughRegistrationsToUseAnyConstructors,
                required_parameter_types(first),
            );
        }

        match self.selector.select(&bindable) {
            Ok(selected) => RequiredTypes::success(required_parameter_types(selected.constructor)),
            Err(_err) => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "dependency_validator",
                    limit_type = %limit_type,
                    error = %_err,
                    "Constructor selection failed"
                );
                RequiredTypes::new(RequiredTypesStatus::SelectConstructorError, TypeSet::new())
            }
        }
    }
}
