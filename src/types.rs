//! Type identities for the program under analysis
//!
//! A [`TypeRef`] names a type of the host program: a named (possibly generic)
//! type, an array, or an unresolved generic placeholder that is substituted
//! when a symbol is resolved inside a generic context.

use ahash::AHashSet;
use std::fmt;
use std::sync::Arc;

/// Broad category of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Reference type
    Class,
    /// Interface (service contract)
    Interface,
    /// Value type
    Struct,
    /// Invocable type; calls to its `Invoke` dispatch to a bound closure
    Delegate,
    /// Enumerable collection; its first generic argument is the element type
    Sequence,
}

/// A named type with its namespace and generic arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedType {
    pub namespace: Arc<str>,
    pub name: Arc<str>,
    pub kind: TypeKind,
    pub args: Vec<TypeRef>,
}

/// Reference to a type of the analyzed program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// Named type, possibly instantiated with generic arguments
    Named(Arc<NamedType>),
    /// Single-dimensional array
    Array(Arc<TypeRef>),
    /// Generic parameter of the declaring type (`!n`)
    TypeParam(u16),
    /// Generic parameter of the method (`!!n`)
    MethodParam(u16),
}

impl TypeRef {
    /// Create a named type of the given kind.
    pub fn named(namespace: &str, name: &str, kind: TypeKind) -> Self {
        Self::generic(namespace, name, kind, Vec::new())
    }

    /// Create an instantiated generic type.
    pub fn generic(namespace: &str, name: &str, kind: TypeKind, args: Vec<TypeRef>) -> Self {
        Self::Named(Arc::new(NamedType {
            namespace: Arc::from(namespace),
            name: Arc::from(name),
            kind,
            args,
        }))
    }

    #[inline]
    pub fn class(namespace: &str, name: &str) -> Self {
        Self::named(namespace, name, TypeKind::Class)
    }

    #[inline]
    pub fn interface(namespace: &str, name: &str) -> Self {
        Self::named(namespace, name, TypeKind::Interface)
    }

    /// Create a delegate type, optionally generic (e.g. `Func<IComponentContext, T>`).
    #[inline]
    pub fn delegate(namespace: &str, name: &str, args: Vec<TypeRef>) -> Self {
        Self::generic(namespace, name, TypeKind::Delegate, args)
    }

    /// Create a generic sequence type over `element`.
    #[inline]
    pub fn sequence(namespace: &str, name: &str, element: TypeRef) -> Self {
        Self::generic(namespace, name, TypeKind::Sequence, vec![element])
    }

    #[inline]
    pub fn array(element: TypeRef) -> Self {
        Self::Array(Arc::new(element))
    }

    #[inline]
    pub fn type_param(index: u16) -> Self {
        Self::TypeParam(index)
    }

    #[inline]
    pub fn method_param(index: u16) -> Self {
        Self::MethodParam(index)
    }

    /// Namespace of a named type.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Named(named) => Some(&named.namespace),
            _ => None,
        }
    }

    /// Kind of a named type; arrays report [`TypeKind::Sequence`].
    pub fn kind(&self) -> Option<TypeKind> {
        match self {
            Self::Named(named) => Some(named.kind),
            Self::Array(_) => Some(TypeKind::Sequence),
            _ => None,
        }
    }

    /// Generic arguments of a named type (empty for everything else).
    pub fn generic_args(&self) -> &[TypeRef] {
        match self {
            Self::Named(named) => &named.args,
            _ => &[],
        }
    }

    #[inline]
    pub fn is_delegate(&self) -> bool {
        self.kind() == Some(TypeKind::Delegate)
    }

    /// True for arrays and enumerable collection types.
    #[inline]
    pub fn is_sequence(&self) -> bool {
        self.kind() == Some(TypeKind::Sequence)
    }

    /// Unwrap one level of collection.
    ///
    /// Generic sequences yield their first generic argument, arrays their
    /// element type. Anything else (including a non-generic sequence) is
    /// returned unchanged.
    pub fn element_type(&self) -> TypeRef {
        match self {
            Self::Array(element) => element.as_ref().clone(),
            Self::Named(named) if named.kind == TypeKind::Sequence => {
                named.args.first().cloned().unwrap_or_else(|| self.clone())
            }
            _ => self.clone(),
        }
    }

    /// Dotted-prefix namespace match: `System` matches `System` and
    /// `System.Collections`, but not `SystemTools`.
    pub fn is_in_namespace(&self, prefix: &str) -> bool {
        match self.namespace() {
            Some(ns) => {
                ns == prefix
                    || (ns.len() > prefix.len()
                        && ns.starts_with(prefix)
                        && ns.as_bytes()[prefix.len()] == b'.')
            }
            None => false,
        }
    }

    /// Fully qualified name without generic arguments (`Namespace.Name`).
    pub fn full_name(&self) -> String {
        match self {
            Self::Named(named) if named.namespace.is_empty() => named.name.to_string(),
            Self::Named(named) => format!("{}.{}", named.namespace, named.name),
            other => other.to_string(),
        }
    }

    /// Replace generic placeholders with the arguments of `context`.
    ///
    /// Placeholders without a matching argument are kept as-is.
    pub fn substitute(&self, context: &GenericContext) -> TypeRef {
        match self {
            Self::TypeParam(index) => context
                .type_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Self::MethodParam(index) => context
                .method_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Self::Array(element) => Self::array(element.substitute(context)),
            Self::Named(named) if named.args.is_empty() => self.clone(),
            Self::Named(named) => Self::Named(Arc::new(NamedType {
                namespace: Arc::clone(&named.namespace),
                name: Arc::clone(&named.name),
                kind: named.kind,
                args: named.args.iter().map(|arg| arg.substitute(context)).collect(),
            })),
        }
    }
}

impl fmt::Display for TypeRef {
    /// Short display name, e.g. `IEnumerable<IDeps1>` or `IDeps1[]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(named) => {
                f.write_str(&named.name)?;
                if !named.args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in named.args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            Self::Array(element) => write!(f, "{element}[]"),
            Self::TypeParam(index) => write!(f, "!{index}"),
            Self::MethodParam(index) => write!(f, "!!{index}"),
        }
    }
}

/// Generic arguments in scope while decoding a method body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GenericContext {
    /// Arguments of the declaring type
    pub type_args: Vec<TypeRef>,
    /// Arguments of the method itself
    pub method_args: Vec<TypeRef>,
}

impl GenericContext {
    pub fn new(type_args: Vec<TypeRef>, method_args: Vec<TypeRef>) -> Self {
        Self {
            type_args,
            method_args,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.type_args.is_empty() && self.method_args.is_empty()
    }
}

/// Insertion-ordered set of types.
///
/// Iteration follows first insertion, which keeps error reports stable;
/// equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct TypeSet {
    items: Vec<TypeRef>,
    index: AHashSet<TypeRef>,
}

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a type; returns `false` if it was already present.
    pub fn insert(&mut self, ty: TypeRef) -> bool {
        if self.index.insert(ty.clone()) {
            self.items.push(ty);
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn contains(&self, ty: &TypeRef) -> bool {
        self.index.contains(ty)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypeRef> {
        self.items.iter()
    }

    /// Keep only the types matching `keep`, preserving order.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&TypeRef) -> bool,
    {
        let index = &mut self.index;
        self.items.retain(|ty| {
            let kept = keep(ty);
            if !kept {
                index.remove(ty);
            }
            kept
        });
    }

    /// New set with the types matching `keep`.
    pub fn filtered<F>(&self, mut keep: F) -> TypeSet
    where
        F: FnMut(&TypeRef) -> bool,
    {
        self.iter().filter(|ty| keep(ty)).cloned().collect()
    }
}

impl PartialEq for TypeSet {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for TypeSet {}

impl FromIterator<TypeRef> for TypeSet {
    fn from_iter<I: IntoIterator<Item = TypeRef>>(iter: I) -> Self {
        let mut set = TypeSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<TypeRef> for TypeSet {
    fn extend<I: IntoIterator<Item = TypeRef>>(&mut self, iter: I) {
        for ty in iter {
            self.insert(ty);
        }
    }
}

impl<'a> IntoIterator for &'a TypeSet {
    type Item = &'a TypeRef;
    type IntoIter = std::slice::Iter<'a, TypeRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for TypeSet {
    type Item = TypeRef;
    type IntoIter = std::vec::IntoIter<TypeRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps1() -> TypeRef {
        TypeRef::interface("App", "IDeps1")
    }

    #[test]
    fn test_element_type_unwraps_one_level() {
        let seq = TypeRef::sequence("System.Collections.Generic", "IEnumerable", deps1());
        assert_eq!(seq.element_type(), deps1());
        assert_eq!(TypeRef::array(deps1()).element_type(), deps1());
        assert_eq!(deps1().element_type(), deps1());

        let nested = TypeRef::array(TypeRef::array(deps1()));
        assert_eq!(nested.element_type(), TypeRef::array(deps1()));
    }

    #[test]
    fn test_namespace_prefix_is_dotted() {
        let console = TypeRef::class("System", "Console");
        let list = TypeRef::class("System.Collections.Generic", "List");
        let tool = TypeRef::class("SystemTools", "Helper");

        assert!(console.is_in_namespace("System"));
        assert!(list.is_in_namespace("System"));
        assert!(!tool.is_in_namespace("System"));
        assert!(!TypeRef::array(console).is_in_namespace("System"));
    }

    #[test]
    fn test_substitute_generic_placeholders() {
        let func = TypeRef::delegate(
            "System",
            "Func",
            vec![TypeRef::type_param(0), TypeRef::method_param(0)],
        );
        let ctx = GenericContext::new(vec![deps1()], vec![TypeRef::array(deps1())]);

        let resolved = func.substitute(&ctx);
        assert_eq!(resolved.generic_args(), &[deps1(), TypeRef::array(deps1())]);

        // Out of range placeholders stay unresolved
        assert_eq!(
            TypeRef::method_param(3).substitute(&ctx),
            TypeRef::method_param(3)
        );
    }

    #[test]
    fn test_display_names() {
        let seq = TypeRef::sequence("System.Collections.Generic", "IEnumerable", deps1());
        assert_eq!(seq.to_string(), "IEnumerable<IDeps1>");
        assert_eq!(seq.full_name(), "System.Collections.Generic.IEnumerable");
        assert_eq!(TypeRef::array(deps1()).to_string(), "IDeps1[]");
        assert_eq!(TypeRef::method_param(0).to_string(), "!!0");
    }

    #[test]
    fn test_type_set_keeps_insertion_order() {
        let a = TypeRef::interface("App", "A");
        let b = TypeRef::interface("App", "B");

        let mut set = TypeSet::new();
        assert!(set.insert(b.clone()));
        assert!(set.insert(a.clone()));
        assert!(!set.insert(b.clone()));

        let order: Vec<_> = set.iter().cloned().collect();
        assert_eq!(order, vec![b.clone(), a.clone()]);

        let reversed: TypeSet = vec![a.clone(), b.clone()].into_iter().collect();
        assert_eq!(set, reversed);

        set.retain(|ty| *ty != b);
        assert_eq!(set.len(), 1);
        assert!(!set.contains(&b));
    }
}
