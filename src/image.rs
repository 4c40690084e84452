//! Compiled program image
//!
//! The [`Image`] is the introspection surface of the host runtime: modules
//! with their metadata symbol tables, method definitions with compiled
//! bodies, heap objects holding captured closure state, and type definitions
//! with their constructors. It is assembled once through [`ImageBuilder`] and
//! is read-only afterwards.

use crate::error::{DecodeError, DiError};
use crate::types::{GenericContext, TypeKind, TypeRef};
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

// =============================================================================
// Identities
// =============================================================================

/// Identity of a method (or constructor) definition in an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a module (the owner of a symbol table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Metadata token: table in the high byte, 1-based row in the low 24 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub u32);

impl Token {
    pub const TYPE_REF: u8 = 0x01;
    pub const FIELD: u8 = 0x04;
    pub const MEMBER_REF: u8 = 0x0A;
    pub const STANDALONE_SIG: u8 = 0x11;
    pub const TYPE_SPEC: u8 = 0x1B;
    pub const METHOD_SPEC: u8 = 0x2B;
    pub const USER_STRING: u8 = 0x70;

    #[inline]
    pub const fn new(table: u8, row: u32) -> Self {
        Self(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    #[inline]
    pub const fn table(self) -> u8 {
        (self.0 >> 24) as u8
    }

    #[inline]
    pub const fn row(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    #[inline]
    pub const fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// =============================================================================
// Definitions
// =============================================================================

/// A method or constructor definition.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub id: MethodId,
    pub module: ModuleId,
    /// Declaring type; generic type definitions use `!n` placeholders
    pub declaring_type: TypeRef,
    pub name: Arc<str>,
    pub is_static: bool,
    pub is_public: bool,
    pub is_constructor: bool,
    /// Number of generic parameters of the method itself
    pub generic_arity: u16,
    /// Return type; may reference `!n` / `!!n`
    pub return_type: TypeRef,
    /// Compiled body; `None` for abstract and extern methods
    pub body: Option<Arc<[u8]>>,
}

/// A field as referenced from a symbol table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldInfo {
    pub declaring_type: TypeRef,
    pub name: Arc<str>,
    pub field_type: TypeRef,
}

impl FieldInfo {
    pub fn new(declaring_type: TypeRef, name: &str, field_type: TypeRef) -> Self {
        Self {
            declaring_type,
            name: Arc::from(name),
            field_type,
        }
    }
}

/// An entry of a module's symbol table, before generic substitution.
#[derive(Debug, Clone)]
pub enum SymbolEntry {
    /// Method reference, instantiated with type and method arguments
    Method {
        method: MethodId,
        type_args: Vec<TypeRef>,
        method_args: Vec<TypeRef>,
    },
    Field(FieldInfo),
    Type(TypeRef),
    String(Arc<str>),
    Signature(Arc<[u8]>),
}

/// A method reference resolved in a concrete generic context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub id: MethodId,
    pub declaring_type: TypeRef,
    pub name: Arc<str>,
    pub is_static: bool,
    pub is_public: bool,
    pub is_constructor: bool,
    /// Instantiated method generic arguments (empty for non-generic methods)
    pub generic_args: Vec<TypeRef>,
    pub return_type: TypeRef,
}

impl MethodRef {
    #[inline]
    pub fn is_generic_method(&self) -> bool {
        !self.generic_args.is_empty()
    }

    /// Generic context of the callee, used to decode its body.
    pub fn context(&self) -> GenericContext {
        GenericContext::new(
            self.declaring_type.generic_args().to_vec(),
            self.generic_args.clone(),
        )
    }
}

/// A resolved program symbol carried by an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Method(MethodRef),
    Field(FieldInfo),
    Type(TypeRef),
    String(Arc<str>),
    Signature(Arc<[u8]>),
}

impl Symbol {
    /// Short name of the symbol kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Method(_) => "method",
            Self::Field(_) => "field",
            Self::Type(_) => "type",
            Self::String(_) => "string",
            Self::Signature(_) => "signature",
        }
    }
}

/// A module and its symbol table.
#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    pub name: Arc<str>,
    symbols: AHashMap<Token, SymbolEntry>,
    next_rows: AHashMap<u8, u32>,
}

impl Module {
    fn new(id: ModuleId, name: &str) -> Self {
        Self {
            id,
            name: Arc::from(name),
            symbols: AHashMap::new(),
            next_rows: AHashMap::new(),
        }
    }

    /// Raw symbol table entry for a token.
    #[inline]
    pub fn symbol(&self, token: Token) -> Option<&SymbolEntry> {
        self.symbols.get(&token)
    }

    #[inline]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    fn add_symbol(&mut self, table: u8, entry: SymbolEntry) -> Token {
        let row = self.next_rows.entry(table).or_insert(0);
        *row += 1;
        let token = Token::new(table, *row);
        self.symbols.insert(token, entry);
        token
    }
}

/// Runtime value stored in an object field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Closure(Closure),
    Object(ObjectId),
    /// Any value the analysis does not look into
    Opaque,
}

/// A bound invocable: a method plus the receiver it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Closure {
    pub method: MethodId,
    pub target: Option<ObjectId>,
}

impl Closure {
    #[inline]
    pub fn new(method: MethodId, target: Option<ObjectId>) -> Self {
        Self { method, target }
    }

    /// Closure over a static method.
    #[inline]
    pub fn unbound(method: MethodId) -> Self {
        Self::new(method, None)
    }
}

/// A heap object (typically a closure environment).
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub ty: TypeRef,
    fields: AHashMap<Arc<str>, Value>,
}

impl ObjectInfo {
    #[inline]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Declared default of an optional parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Null,
    Literal(Arc<str>),
}

/// A constructor parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub name: Arc<str>,
    pub ty: TypeRef,
    pub default: Option<DefaultValue>,
}

impl ParameterInfo {
    pub fn new(name: &str, ty: TypeRef) -> Self {
        Self {
            name: Arc::from(name),
            ty,
            default: None,
        }
    }

    /// Declare a default value for the parameter.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    #[inline]
    pub fn has_default_value(&self) -> bool {
        self.default.is_some()
    }
}

/// A constructor of a type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorInfo {
    pub is_public: bool,
    pub parameters: Vec<ParameterInfo>,
}

impl ConstructorInfo {
    pub fn public(parameters: Vec<ParameterInfo>) -> Self {
        Self {
            is_public: true,
            parameters,
        }
    }

    pub fn internal(parameters: Vec<ParameterInfo>) -> Self {
        Self {
            is_public: false,
            parameters,
        }
    }

    /// Parameter types without a declared default, in declaration order.
    pub fn required_parameter_types(&self) -> impl Iterator<Item = &TypeRef> {
        self.parameters
            .iter()
            .filter(|p| !p.has_default_value())
            .map(|p| &p.ty)
    }
}

/// A constructible type and its constructors, in declaration order.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    pub ty: TypeRef,
    pub constructors: Vec<ConstructorInfo>,
}

// =============================================================================
// Image
// =============================================================================

/// Read-only snapshot of a compiled program.
#[derive(Debug, Clone, Default)]
pub struct Image {
    modules: Vec<Module>,
    methods: Vec<MethodInfo>,
    objects: Vec<ObjectInfo>,
    types: AHashMap<TypeRef, TypeDefinition>,
}

impl Image {
    #[inline]
    pub fn method(&self, id: MethodId) -> Option<&MethodInfo> {
        self.methods.get(id.0 as usize)
    }

    #[inline]
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0 as usize)
    }

    #[inline]
    pub fn object(&self, id: ObjectId) -> Option<&ObjectInfo> {
        self.objects.get(id.0 as usize)
    }

    #[inline]
    pub fn type_definition(&self, ty: &TypeRef) -> Option<&TypeDefinition> {
        self.types.get(ty)
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods.iter()
    }

    #[inline]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Resolve a token of `module` in the given generic context.
    pub fn resolve_token(
        &self,
        module: &Module,
        token: Token,
        context: &GenericContext,
    ) -> Result<Symbol, DecodeError> {
        let entry = module.symbol(token).ok_or(DecodeError::UnresolvedToken {
            module: module.id,
            token,
        })?;

        let symbol = match entry {
            SymbolEntry::Method {
                method,
                type_args,
                method_args,
            } => {
                let info = self.method(*method).ok_or(DecodeError::MissingMethod {
                    token,
                    method: *method,
                })?;
                let callee = GenericContext::new(
                    type_args.iter().map(|t| t.substitute(context)).collect(),
                    method_args.iter().map(|t| t.substitute(context)).collect(),
                );
                Symbol::Method(MethodRef {
                    id: info.id,
                    declaring_type: info.declaring_type.substitute(&callee),
                    name: Arc::clone(&info.name),
                    is_static: info.is_static,
                    is_public: info.is_public,
                    is_constructor: info.is_constructor,
                    return_type: info.return_type.substitute(&callee),
                    generic_args: callee.method_args,
                })
            }
            SymbolEntry::Field(field) => Symbol::Field(FieldInfo {
                declaring_type: field.declaring_type.substitute(context),
                name: Arc::clone(&field.name),
                field_type: field.field_type.substitute(context),
            }),
            SymbolEntry::Type(ty) => Symbol::Type(ty.substitute(context)),
            SymbolEntry::String(s) => Symbol::String(Arc::clone(s)),
            SymbolEntry::Signature(sig) => Symbol::Signature(Arc::clone(sig)),
        };
        Ok(symbol)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Incrementally assembles an [`Image`].
///
/// # Examples
///
/// ```rust
/// use dependency_validator::{IlEmitter, ImageBuilder, TypeRef};
///
/// let mut builder = ImageBuilder::new();
/// let module = builder.module("App");
/// let console = TypeRef::class("System", "Console");
/// let write_line = builder.method(module, console, "WriteLine").define();
///
/// let program = TypeRef::class("App", "Program");
/// let main = builder.method(module, program, "Main").define();
/// let token = builder.method_token(module, write_line);
/// builder
///     .set_body(main, IlEmitter::new().call(token).ret().to_bytes())
///     .unwrap();
///
/// let image = builder.build();
/// assert_eq!(image.method_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ImageBuilder {
    image: Image,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module and return its id.
    pub fn module(&mut self, name: &str) -> ModuleId {
        let id = ModuleId(self.image.modules.len() as u32);
        self.image.modules.push(Module::new(id, name));
        id
    }

    /// Start defining a method. Defaults: static, public, non-generic,
    /// returning `System.Void`, no body.
    pub fn method(&mut self, module: ModuleId, declaring_type: TypeRef, name: &str) -> MethodBuilder<'_> {
        MethodBuilder {
            builder: self,
            info: MethodInfo {
                id: MethodId(0),
                module,
                declaring_type,
                name: Arc::from(name),
                is_static: true,
                is_public: true,
                is_constructor: false,
                generic_arity: 0,
                return_type: TypeRef::named("System", "Void", TypeKind::Struct),
                body: None,
            },
        }
    }

    /// Attach a compiled body to a method.
    pub fn set_body(&mut self, method: MethodId, body: Vec<u8>) -> Result<(), DiError> {
        let info = self
            .image
            .methods
            .get_mut(method.0 as usize)
            .ok_or_else(|| DiError::Internal(format!("unknown method {method}")))?;
        info.body = Some(Arc::from(body));
        Ok(())
    }

    /// Token referencing a non-generic method.
    pub fn method_token(&mut self, module: ModuleId, method: MethodId) -> Token {
        self.generic_method_token(module, method, Vec::new(), Vec::new())
    }

    /// Token referencing a method instantiated with type and method arguments.
    pub fn generic_method_token(
        &mut self,
        module: ModuleId,
        method: MethodId,
        type_args: Vec<TypeRef>,
        method_args: Vec<TypeRef>,
    ) -> Token {
        let table = if method_args.is_empty() {
            Token::MEMBER_REF
        } else {
            Token::METHOD_SPEC
        };
        self.add_symbol(
            module,
            table,
            SymbolEntry::Method {
                method,
                type_args,
                method_args,
            },
        )
    }

    pub fn field_token(&mut self, module: ModuleId, field: FieldInfo) -> Token {
        self.add_symbol(module, Token::FIELD, SymbolEntry::Field(field))
    }

    pub fn type_token(&mut self, module: ModuleId, ty: TypeRef) -> Token {
        let table = if ty.generic_args().is_empty() {
            Token::TYPE_REF
        } else {
            Token::TYPE_SPEC
        };
        self.add_symbol(module, table, SymbolEntry::Type(ty))
    }

    pub fn string_token(&mut self, module: ModuleId, value: &str) -> Token {
        self.add_symbol(module, Token::USER_STRING, SymbolEntry::String(Arc::from(value)))
    }

    pub fn signature_token(&mut self, module: ModuleId, signature: Vec<u8>) -> Token {
        self.add_symbol(
            module,
            Token::STANDALONE_SIG,
            SymbolEntry::Signature(Arc::from(signature)),
        )
    }

    /// Allocate a heap object of the given type.
    pub fn object(&mut self, ty: TypeRef) -> ObjectId {
        let id = ObjectId(self.image.objects.len() as u32);
        self.image.objects.push(ObjectInfo {
            ty,
            fields: AHashMap::new(),
        });
        id
    }

    /// Store a value in an object field.
    pub fn set_field(&mut self, object: ObjectId, name: &str, value: Value) -> Result<(), DiError> {
        let info = self
            .image
            .objects
            .get_mut(object.0 as usize)
            .ok_or_else(|| DiError::Internal(format!("unknown object {object}")))?;
        info.fields.insert(Arc::from(name), value);
        Ok(())
    }

    /// Define a constructible type with its constructors in declaration order.
    pub fn define_type(&mut self, ty: TypeRef, constructors: Vec<ConstructorInfo>) {
        self.image
            .types
            .insert(ty.clone(), TypeDefinition { ty, constructors });
    }

    /// Finish the image.
    pub fn build(self) -> Image {
        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_validator",
            modules = self.image.modules.len(),
            methods = self.image.methods.len(),
            objects = self.image.objects.len(),
            types = self.image.types.len(),
            "Built program image"
        );

        self.image
    }

    fn add_symbol(&mut self, module: ModuleId, table: u8, entry: SymbolEntry) -> Token {
        match self.image.modules.get_mut(module.0 as usize) {
            Some(m) => m.add_symbol(table, entry),
            // Unknown modules yield a token that never resolves
            None => Token::new(table, 0),
        }
    }
}

/// Fluent definition of a single method.
pub struct MethodBuilder<'a> {
    builder: &'a mut ImageBuilder,
    info: MethodInfo,
}

impl MethodBuilder<'_> {
    /// Make the method an instance method.
    pub fn instance(mut self) -> Self {
        self.info.is_static = false;
        self
    }

    pub fn private(mut self) -> Self {
        self.info.is_public = false;
        self
    }

    /// Mark the method as an instance constructor (`.ctor`).
    pub fn constructor(mut self) -> Self {
        self.info.is_constructor = true;
        self.info.is_static = false;
        self
    }

    /// Number of method generic parameters.
    pub fn generic(mut self, arity: u16) -> Self {
        self.info.generic_arity = arity;
        self
    }

    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.info.return_type = ty;
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.info.body = Some(Arc::from(body));
        self
    }

    /// Add the method to the image and return its id.
    pub fn define(self) -> MethodId {
        let id = MethodId(self.builder.image.methods.len() as u32);
        let mut info = self.info;
        info.id = id;
        self.builder.image.methods.push(info);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_layout() {
        let token = Token::new(Token::MEMBER_REF, 3);
        assert_eq!(token.0, 0x0A00_0003);
        assert_eq!(token.table(), Token::MEMBER_REF);
        assert_eq!(token.row(), 3);
        assert_eq!(token.to_string(), "0x0a000003");
    }

    #[test]
    fn test_tokens_allocated_per_table() {
        let mut builder = ImageBuilder::new();
        let module = builder.module("App");
        let ty = TypeRef::class("App", "Thing");
        let m = builder.method(module, ty.clone(), "Run").define();

        let t1 = builder.method_token(module, m);
        let t2 = builder.method_token(module, m);
        let t3 = builder.string_token(module, "hello");

        assert_eq!(t1, Token::new(Token::MEMBER_REF, 1));
        assert_eq!(t2, Token::new(Token::MEMBER_REF, 2));
        assert_eq!(t3, Token::new(Token::USER_STRING, 1));
    }

    #[test]
    fn test_resolve_generic_method_substitutes_arguments() {
        let mut builder = ImageBuilder::new();
        let module = builder.module("App");
        let ext = TypeRef::class("Injector", "ResolutionExtensions");
        let resolve = builder
            .method(module, ext, "Resolve")
            .generic(1)
            .returns(TypeRef::method_param(0))
            .define();

        let service = TypeRef::interface("App", "IService");
        // Caller is itself generic: Resolve<!!0> inside Helper<T>
        let token = builder.generic_method_token(
            module,
            resolve,
            Vec::new(),
            vec![TypeRef::method_param(0)],
        );
        let image = builder.build();
        let m = image.module(module).unwrap();

        let ctx = GenericContext::new(Vec::new(), vec![service.clone()]);
        let symbol = image.resolve_token(m, token, &ctx).unwrap();
        match symbol {
            Symbol::Method(method) => {
                assert_eq!(method.return_type, service);
                assert!(method.is_generic_method());
                assert_eq!(&*method.name, "Resolve");
            }
            other => panic!("expected method, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_generic_declaring_type() {
        let mut builder = ImageBuilder::new();
        let module = builder.module("App");
        let holder = TypeRef::generic("App", "Holder", TypeKind::Class, vec![TypeRef::type_param(0)]);
        let get = builder
            .method(module, holder, "Get")
            .instance()
            .returns(TypeRef::type_param(0))
            .define();

        let arg = TypeRef::class("App", "Payload");
        let token = builder.generic_method_token(module, get, vec![arg.clone()], Vec::new());
        let image = builder.build();

        let symbol = image
            .resolve_token(image.module(module).unwrap(), token, &GenericContext::default())
            .unwrap();
        let Symbol::Method(method) = symbol else {
            panic!("expected method");
        };
        assert_eq!(method.return_type, arg);
        assert_eq!(method.declaring_type.generic_args(), &[arg.clone()]);
        assert_eq!(method.context().type_args, vec![arg]);
        assert!(!method.is_generic_method());
    }

    #[test]
    fn test_unresolved_token() {
        let mut builder = ImageBuilder::new();
        let module = builder.module("App");
        let image = builder.build();

        let err = image
            .resolve_token(
                image.module(module).unwrap(),
                Token::new(Token::MEMBER_REF, 42),
                &GenericContext::default(),
            )
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnresolvedToken { .. }));
    }

    #[test]
    fn test_objects_and_fields() {
        let mut builder = ImageBuilder::new();
        let module = builder.module("App");
        let env = TypeRef::class("App", "<>c__DisplayClass0_0");
        let lambda = builder.method(module, env.clone(), "<Main>b__0").instance().define();
        let obj = builder.object(env);
        builder
            .set_field(obj, "callback", Value::Closure(Closure::new(lambda, Some(obj))))
            .unwrap();
        assert!(builder.set_field(ObjectId(99), "x", Value::Null).is_err());

        let image = builder.build();
        let info = image.object(obj).unwrap();
        assert_eq!(
            info.field("callback"),
            Some(&Value::Closure(Closure::new(lambda, Some(obj))))
        );
        assert!(info.field("missing").is_none());
    }

    #[test]
    fn test_required_parameter_types_skip_defaults() {
        let deps1 = TypeRef::interface("App", "IDeps1");
        let text = TypeRef::class("System", "String");
        let ctor = ConstructorInfo::public(vec![
            ParameterInfo::new("deps1", deps1.clone()),
            ParameterInfo::new("text", text).with_default(DefaultValue::Literal(Arc::from("x"))),
        ]);
        let required: Vec<_> = ctor.required_parameter_types().cloned().collect();
        assert_eq!(required, vec![deps1]);
    }
}
