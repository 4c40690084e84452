//! Validator configuration
//!
//! ```rust
//! use dependency_validator::{ValidatorConfig, WalkOptions};
//!
//! let config = ValidatorConfig::new()
//!     .exclude_type("App.Infrastructure.IClock")
//!     .reserve_namespace("ThirdParty")
//!     .with_callback_walk(WalkOptions::new(50, true));
//!
//! assert!(config.excluded_types.iter().any(|t| t == "App.Infrastructure.IClock"));
//! ```

use crate::detector::ResolveEntryPoint;
use crate::types::TypeRef;
use crate::walker::WalkOptions;

/// Knobs for graph validation, carried by the container builder.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Framework types never validated nor reported as requirements
    pub excluded_types: Vec<String>,
    /// Namespaces whose types are skipped like excluded ones
    pub reserved_namespaces: Vec<String>,
    /// Namespaces whose method bodies are never decoded
    pub system_namespaces: Vec<String>,
    /// Method recognized as "resolve a service" inside callbacks
    pub resolve_entry_point: ResolveEntryPoint,
    /// Walk policy for callback analysis
    pub callback_walk: WalkOptions,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            excluded_types: vec![
                "Injector.IComponentContext".to_string(),
                "Injector.ILifetimeScope".to_string(),
                "Injector.LifetimeScope".to_string(),
                "System.IServiceProvider".to_string(),
            ],
            reserved_namespaces: vec!["Microsoft".to_string()],
            system_namespaces: vec!["System".to_string()],
            resolve_entry_point: ResolveEntryPoint::default(),
            callback_walk: WalkOptions::new(20, true),
        }
    }
}

impl ValidatorConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the type with this full name
    pub fn exclude_type(mut self, full_name: impl Into<String>) -> Self {
        self.excluded_types.push(full_name.into());
        self
    }

    /// Skip every type in this namespace
    pub fn reserve_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.reserved_namespaces.push(namespace.into());
        self
    }

    /// Replace the namespaces the decoder never enters
    pub fn with_system_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.system_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Recognize a different resolve method
    pub fn with_resolve_entry_point(mut self, entry_point: ResolveEntryPoint) -> Self {
        self.resolve_entry_point = entry_point;
        self
    }

    pub fn with_callback_walk(mut self, options: WalkOptions) -> Self {
        self.callback_walk = options;
        self
    }

    /// Whether `ty` is a framework type that validation ignores.
    pub fn is_excluded(&self, ty: &TypeRef) -> bool {
        let full_name = ty.full_name();
        self.excluded_types.iter().any(|excluded| *excluded == full_name)
            || self.reserved_namespaces.iter().any(|ns| ty.is_in_namespace(ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    #[test]
    fn test_defaults() {
        let config = ValidatorConfig::default();
        assert_eq!(config.excluded_types.len(), 4);
        assert_eq!(config.callback_walk, WalkOptions::new(20, true));
        assert_eq!(config.resolve_entry_point, ResolveEntryPoint::default());
        assert_eq!(config.system_namespaces, ["System"]);
    }

    #[test]
    fn test_exclusion() {
        let config = ValidatorConfig::default();
        assert!(config.is_excluded(&TypeRef::interface("Injector", "IComponentContext")));
        assert!(config.is_excluded(&TypeRef::class("Injector", "LifetimeScope")));
        assert!(config.is_excluded(&TypeRef::interface("System", "IServiceProvider")));
        assert!(config.is_excluded(&TypeRef::class("Microsoft.Extensions.Logging", "Logger")));
        assert!(!config.is_excluded(&TypeRef::class("MicrosoftX", "Logger")));
        assert!(!config.is_excluded(&TypeRef::interface("App", "IDeps1")));
        assert!(!config.is_excluded(&TypeRef::named("System", "Object", TypeKind::Class)));
    }

    #[test]
    fn test_builder_chain() {
        let config = ValidatorConfig::new()
            .exclude_type("App.IClock")
            .reserve_namespace("Vendor")
            .with_system_namespaces(["System", "Mono"])
            .with_callback_walk(WalkOptions::new(5, false));

        assert!(config.is_excluded(&TypeRef::interface("App", "IClock")));
        assert!(config.is_excluded(&TypeRef::class("Vendor.Sdk", "Client")));
        assert_eq!(config.system_namespaces.len(), 2);
        assert_eq!(config.callback_walk.max_depth, 5);
        assert!(!config.callback_walk.memoize);
    }
}
