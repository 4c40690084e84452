//! Dependency-resolution detector
//!
//! Instruction visitor recognizing calls to the container's generic resolve
//! entry point (`Resolve<T>`) and collecting each `T`.
//!
//! Every reachable call counts, including calls in dead branches or whose
//! result is discarded. Calls through a runtime type argument
//! (`Resolve(Type)`) are not generic and are not recognized.

use crate::decoder::{Instruction, InstructionDecoder};
use crate::error::DecodeError;
use crate::image::MethodRef;
use crate::types::TypeSet;
use crate::walker::{CallGraphWalker, EntryPoint, InstructionVisitor};

/// The method whose generic instantiations mean "resolve a service".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveEntryPoint {
    /// Fully qualified declaring type, e.g. `Injector.ResolutionExtensions`
    pub type_name: String,
    pub method_name: String,
}

impl ResolveEntryPoint {
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }

    /// Whether `method` is a public generic instantiation of the entry point.
    pub fn matches(&self, method: &MethodRef) -> bool {
        method.is_public
            && method.is_generic_method()
            && *method.name == *self.method_name
            && method.declaring_type.full_name() == self.type_name
    }
}

impl Default for ResolveEntryPoint {
    fn default() -> Self {
        Self::new("Injector.ResolutionExtensions", "Resolve")
    }
}

/// Collects the service types requested through the resolve entry point.
#[derive(Debug)]
pub struct ResolveCallDetector<'a> {
    entry_point: &'a ResolveEntryPoint,
    found: TypeSet,
}

impl<'a> ResolveCallDetector<'a> {
    pub fn new(entry_point: &'a ResolveEntryPoint) -> Self {
        Self {
            entry_point,
            found: TypeSet::new(),
        }
    }

    /// Walk from `entry` and return every requested service type.
    pub fn collect<D: InstructionDecoder>(
        entry_point: &'a ResolveEntryPoint,
        walker: &CallGraphWalker<'_, D>,
        entry: impl Into<EntryPoint>,
    ) -> Result<TypeSet, DecodeError> {
        let mut detector = Self::new(entry_point);
        walker.walk(entry, &mut detector)?;
        Ok(detector.into_types())
    }

    #[inline]
    pub fn types(&self) -> &TypeSet {
        &self.found
    }

    pub fn into_types(self) -> TypeSet {
        self.found
    }
}

impl InstructionVisitor for ResolveCallDetector<'_> {
    fn visit(&mut self, instruction: &Instruction) {
        if !instruction.opcode.is_call() {
            return;
        }
        if let Some(method) = instruction.method() {
            if self.entry_point.matches(method) {
                self.found.insert(method.return_type.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::IlEmitter;
    use crate::fixtures::{Host, deps};
    use crate::image::{Closure, Image, Symbol, Value};
    use crate::types::{GenericContext, TypeRef};
    use crate::walker::WalkOptions;

    fn detect(image: &Image, entry: Closure) -> TypeSet {
        let walker = CallGraphWalker::new(image).with_options(WalkOptions::new(20, true));
        ResolveCallDetector::collect(&ResolveEntryPoint::default(), &walker, entry).unwrap()
    }

    #[test]
    fn test_unused_resolves_are_counted() {
        let mut host = Host::new();
        let d1 = host.resolve_of(deps("IDeps1"));
        let d2 = host.resolve_of(deps("IDeps2"));
        let d3 = host.resolve_of(deps("IDeps3"));
        let body = IlEmitter::new()
            .ldarg_1()
            .call(d1)
            .ldarg_1()
            .call(d2)
            .pop()
            .ldarg_1()
            .call(d3)
            .pop()
            .ret()
            .to_bytes();
        let callback = host.lambda("<Register>b__0_0", body);
        let image = host.build();

        let found = detect(&image, callback);
        let expected: TypeSet = ["IDeps1", "IDeps2", "IDeps3"].into_iter().map(deps).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_concrete_service_type() {
        let mut host = Host::new();
        let concrete = TypeRef::class("App", "Deps2");
        let d1 = host.resolve_of(deps("IDeps1"));
        let d2 = host.resolve_of(concrete.clone());
        let body = IlEmitter::new().ldarg_1().call(d1).ldarg_1().call(d2).ret().to_bytes();
        let callback = host.lambda("<Register>b__0_0", body);
        let image = host.build();

        let found = detect(&image, callback);
        assert_eq!(found, [deps("IDeps1"), concrete].into_iter().collect::<TypeSet>());
    }

    #[test]
    fn test_branches_loops_local_functions_and_captured_lambdas() {
        let mut host = Host::new();
        let concrete = TypeRef::class("App", "Deps1");

        // static IDeps3 LocalCall(IComponentContext ctx) => ctx.Resolve<IDeps3>();
        let d3 = host.resolve_of(deps("IDeps3"));
        let owner = TypeRef::class("App", "Tests");
        let local_call = host.static_method(
            &owner,
            "<Cases>g__LocalCall|0_0",
            IlEmitter::new().ldarg_0().call(d3).ret().to_bytes(),
        );

        // var lambdaCall = (IComponentContext ctx) => ctx.Resolve<IDeps4>();
        let d4 = host.resolve_of(deps("IDeps4"));
        let lambda_call = host.lambda(
            "<Cases>b__0_1",
            IlEmitter::new().ldarg_1().call(d4).ret().to_bytes(),
        );

        let display = Host::display_class("<>c__DisplayClass0_0");
        let func = host.func_of(deps("IDeps4"));
        let func_invoke = host
            .builder
            .method(host.module, func.clone(), "Invoke")
            .instance()
            .returns(deps("IDeps4"))
            .define();
        let func_invoke = host.token(func_invoke);
        let captured = host.field(&display, "lambdaCall", func);
        let d1 = host.resolve_of(concrete.clone());
        let d2 = host.resolve_of(deps("IDeps2"));
        let call_local = host.token(local_call);

        let body = IlEmitter::new()
            .ldc_i4(0)
            .stloc(0)
            .ldloc(0)
            .brfalse_s(7)
            .ldarg_1()
            .call(d1)
            .stloc(1)
            .ldc_i4(0)
            .stloc(3)
            .br_s(8)
            .ldarg_1()
            .call(d2)
            .stloc(2)
            .ldloc(3)
            .brtrue_s(-10)
            .ldarg_1()
            .call(call_local)
            .stloc(4)
            .ldarg_0()
            .ldfld(captured)
            .ldarg_1()
            .callvirt(func_invoke)
            .stloc(5)
            .ret()
            .to_bytes();
        let callback = host.instance_method(&display, "<Cases>b__2", body);
        let env = host.object(&display, &[("lambdaCall", Value::Closure(lambda_call))]);
        let image = host.build();

        let found = detect(&image, Closure::new(callback, Some(env)));
        let expected: TypeSet = vec![concrete, deps("IDeps2"), deps("IDeps3"), deps("IDeps4")]
            .into_iter()
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_uncalled_local_function_and_lambda_are_ignored() {
        let mut host = Host::new();
        let concrete = TypeRef::class("App", "Deps1");

        let d2 = host.resolve_of(deps("IDeps2"));
        let owner = TypeRef::class("App", "Tests");
        host.static_method(
            &owner,
            "<Cases>g__LocalFuncWithResolve|0_3",
            IlEmitter::new().ldarg_0().call(d2).ret().to_bytes(),
        );
        let d4 = host.resolve_of(deps("IDeps4"));
        let lambda = host.lambda(
            "<Cases>b__0_4",
            IlEmitter::new().ldarg_1().call(d4).ret().to_bytes(),
        );

        let d1 = host.resolve_of(concrete.clone());
        let d3 = host.resolve_of(deps("IDeps3"));
        let ftn = host.builder.method_token(host.module, lambda.method);
        let body = IlEmitter::new()
            .ldarg_1()
            .call(d1)
            .stloc(0)
            .ldarg_1()
            .call(d3)
            .stloc(1)
            .ldnull()
            .ldftn(ftn)
            .pop()
            .pop()
            .ret()
            .to_bytes();
        let callback = host.lambda("<Cases>b__0_5", body);
        let image = host.build();

        let found = detect(&image, callback);
        assert_eq!(found, [concrete, deps("IDeps3")].into_iter().collect::<TypeSet>());
    }

    #[test]
    fn test_non_generic_resolve_is_not_detected() {
        let mut host = Host::new();
        let by_type = host.token(host.resolve_by_type);
        let ty = host.builder.type_token(host.module, deps("IDeps1"));
        let body = IlEmitter::new()
            .ldarg_1()
            .ldtoken(ty)
            .call(by_type)
            .pop()
            .ret()
            .to_bytes();
        let callback = host.lambda("<Cases>b__0_6", body);
        let image = host.build();

        assert!(detect(&image, callback).is_empty());
    }

    #[test]
    fn test_entry_point_matching() {
        let mut host = Host::new();
        let generic = host.resolve_of(deps("IDeps1"));
        let by_type = host.token(host.resolve_by_type);
        let module_id = host.module;
        let image = host.build();
        let module = image.module(module_id).unwrap();
        let ctx = GenericContext::default();

        let entry = ResolveEntryPoint::default();
        let resolve = |token| match image.resolve_token(module, token, &ctx).unwrap() {
            Symbol::Method(method) => method,
            _ => unreachable!(),
        };
        assert!(entry.matches(&resolve(generic)));
        assert!(!entry.matches(&resolve(by_type)));
        assert!(!ResolveEntryPoint::new("Other.Extensions", "Resolve").matches(&resolve(generic)));
    }
}
