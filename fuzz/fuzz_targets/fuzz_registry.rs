#![no_main]

//! Fuzz target for graph validation
//!
//! Random component graphs must always validate without panicking, and the
//! report must render.

use arbitrary::Arbitrary;
use dependency_validator::{
    Closure, ConstructorInfo, ContainerBuilder, DefaultValue, IlEmitter, ImageBuilder, Lifetime, ParameterInfo,
    TypeKind, TypeRef,
};
use libfuzzer_sys::fuzz_target;

const SERVICES: u8 = 8;

#[derive(Debug, Arbitrary)]
struct Parameter {
    service: u8,
    collection: bool,
    has_default: bool,
}

#[derive(Debug, Arbitrary)]
enum Strategy {
    Introspective { constructors: Vec<(bool, Vec<Parameter>)> },
    Callback { resolves: Vec<u8> },
    FixedInstance,
}

#[derive(Debug, Arbitrary)]
struct Component {
    services: Vec<u8>,
    lifetime: u8,
    strategy: Strategy,
}

fn service(index: u8) -> TypeRef {
    TypeRef::interface("Fuzz", &format!("IService{}", index % SERVICES))
}

fn lifetime(value: u8) -> Lifetime {
    match value % 3 {
        0 => Lifetime::PerDependency,
        1 => Lifetime::PerScope,
        _ => Lifetime::Singleton,
    }
}

fuzz_target!(|components: Vec<Component>| {
    let mut image = ImageBuilder::new();
    let module = image.module("Fuzz");
    let resolve = image
        .method(module, TypeRef::class("Injector", "ResolutionExtensions"), "Resolve")
        .generic(1)
        .returns(TypeRef::method_param(0))
        .define();
    let owner = TypeRef::named("Fuzz", "<>c", TypeKind::Class);
    let target = image.object(owner.clone());

    let mut registrations = Vec::new();
    for (index, component) in components.iter().take(64).enumerate() {
        let limit = TypeRef::class("Fuzz", &format!("Component{index}"));
        let strategy = match &component.strategy {
            Strategy::Introspective { constructors } => {
                let constructors = constructors
                    .iter()
                    .take(4)
                    .map(|(public, parameters)| {
                        let parameters = parameters
                            .iter()
                            .take(6)
                            .map(|p| {
                                let ty = if p.collection {
                                    TypeRef::array(service(p.service))
                                } else {
                                    service(p.service)
                                };
                                let parameter = ParameterInfo::new("p", ty);
                                if p.has_default {
                                    parameter.with_default(DefaultValue::Null)
                                } else {
                                    parameter
                                }
                            })
                            .collect();
                        if *public {
                            ConstructorInfo::public(parameters)
                        } else {
                            ConstructorInfo::internal(parameters)
                        }
                    })
                    .collect();
                image.define_type(limit.clone(), constructors);
                None
            }
            Strategy::Callback { resolves } => {
                let mut body = IlEmitter::new();
                for &index in resolves.iter().take(16) {
                    let token = image.generic_method_token(module, resolve, Vec::new(), vec![service(index)]);
                    body = body.ldarg_1().call(token).pop();
                }
                let method = image
                    .method(module, owner.clone(), &format!("<Register>b__{index}"))
                    .instance()
                    .body(body.ret().to_bytes())
                    .define();
                Some(Some(Closure::new(method, Some(target))))
            }
            Strategy::FixedInstance => Some(None),
        };
        registrations.push((limit, strategy, component));
    }

    let mut builder = ContainerBuilder::new(image.build());
    for (limit, strategy, component) in registrations {
        let registration = match strategy {
            None => builder.register_type(limit),
            Some(Some(callback)) => builder.register_callback(limit, callback),
            Some(None) => builder.register_instance(limit),
        };
        let mut registration = registration.with_lifetime(lifetime(component.lifetime));
        for &index in component.services.iter().take(4) {
            registration = registration.as_service(service(index));
        }
    }

    let container = builder.build().expect("no build callbacks were registered");
    let result = container.validate().expect("every callback is defined and well formed");
    let _ = result.to_string();
    let _ = result.filter_errors(|err| err.component().ordinal % 2 == 0);
});
