//! Shared test fixtures: an image builder preloaded with the host types the
//! analysis cares about.

use crate::emit::IlEmitter;
use crate::image::{
    Closure, FieldInfo, Image, ImageBuilder, MethodId, ModuleId, ObjectId, Token, Value,
};
use crate::types::{TypeKind, TypeRef};

pub(crate) fn deps(name: &str) -> TypeRef {
    TypeRef::interface("App", name)
}

pub(crate) fn enumerable(element: TypeRef) -> TypeRef {
    TypeRef::sequence("System.Collections.Generic", "IEnumerable", element)
}

/// Image under construction with console output, delegates and the resolve
/// entry point already defined.
pub(crate) struct Host {
    pub builder: ImageBuilder,
    pub module: ModuleId,
    pub write_line: MethodId,
    pub write: MethodId,
    pub action: TypeRef,
    pub action_invoke: MethodId,
    pub action_ctor: MethodId,
    pub context: TypeRef,
    pub resolve: MethodId,
    pub resolve_by_type: MethodId,
}

impl Host {
    pub fn new() -> Self {
        let mut builder = ImageBuilder::new();
        let module = builder.module("App");

        let console = TypeRef::class("System", "Console");
        let write_line = builder.method(module, console.clone(), "WriteLine").define();
        let write = builder.method(module, console, "Write").define();

        let action = TypeRef::delegate("System", "Action", Vec::new());
        let action_invoke = builder.method(module, action.clone(), "Invoke").instance().define();
        let action_ctor = builder.method(module, action.clone(), ".ctor").constructor().define();

        let context = TypeRef::interface("Injector", "IComponentContext");
        let extensions = TypeRef::class("Injector", "ResolutionExtensions");
        let resolve = builder
            .method(module, extensions.clone(), "Resolve")
            .generic(1)
            .returns(TypeRef::method_param(0))
            .define();
        let resolve_by_type = builder
            .method(module, extensions, "Resolve")
            .returns(TypeRef::class("System", "Object"))
            .define();

        Self {
            builder,
            module,
            write_line,
            write,
            action,
            action_invoke,
            action_ctor,
            context,
            resolve,
            resolve_by_type,
        }
    }

    pub fn token(&mut self, method: MethodId) -> Token {
        self.builder.method_token(self.module, method)
    }

    pub fn string(&mut self, value: &str) -> Token {
        self.builder.string_token(self.module, value)
    }

    pub fn field(&mut self, owner: &TypeRef, name: &str, ty: TypeRef) -> Token {
        self.builder
            .field_token(self.module, FieldInfo::new(owner.clone(), name, ty))
    }

    /// Token for `Resolve<service>`.
    pub fn resolve_of(&mut self, service: TypeRef) -> Token {
        self.builder
            .generic_method_token(self.module, self.resolve, Vec::new(), vec![service])
    }

    /// `Func<IComponentContext, service>`
    pub fn func_of(&self, service: TypeRef) -> TypeRef {
        TypeRef::delegate("System", "Func", vec![self.context.clone(), service])
    }

    /// `ldstr "…"; call Console.WriteLine; ret`
    pub fn write_line_body(&mut self) -> Vec<u8> {
        let text = self.string("Hello world");
        let call = self.token(self.write_line);
        IlEmitter::new().ldstr(text).call(call).ret().to_bytes()
    }

    /// `ldstr "…"; call Console.Write; ret`
    pub fn write_body(&mut self) -> Vec<u8> {
        let text = self.string("Hello");
        let call = self.token(self.write);
        IlEmitter::new().ldstr(text).call(call).ret().to_bytes()
    }

    pub fn static_method(&mut self, owner: &TypeRef, name: &str, body: Vec<u8>) -> MethodId {
        self.builder
            .method(self.module, owner.clone(), name)
            .body(body)
            .define()
    }

    pub fn instance_method(&mut self, owner: &TypeRef, name: &str, body: Vec<u8>) -> MethodId {
        self.builder
            .method(self.module, owner.clone(), name)
            .instance()
            .body(body)
            .define()
    }

    /// Lambda on a shared non-capturing closure class, bound to its singleton.
    pub fn lambda(&mut self, name: &str, body: Vec<u8>) -> Closure {
        let owner = TypeRef::class("App", "<>c");
        let method = self.instance_method(&owner, name, body);
        let target = self.builder.object(owner);
        Closure::new(method, Some(target))
    }

    /// Heap object with the given field values.
    pub fn object(&mut self, ty: &TypeRef, fields: &[(&str, Value)]) -> ObjectId {
        let object = self.builder.object(ty.clone());
        for (name, value) in fields {
            self.builder
                .set_field(object, name, value.clone())
                .expect("object was just allocated");
        }
        object
    }

    pub fn display_class(name: &str) -> TypeRef {
        TypeRef::named("App", name, TypeKind::Class)
    }

    pub fn build(self) -> Image {
        self.builder.build()
    }
}
