#![no_main]

//! Fuzz target for method body decoding
//!
//! Arbitrary bytes must decode to instructions or a `DecodeError`, and
//! walking them must terminate, never panic.

use arbitrary::Arbitrary;
use dependency_validator::{
    CallGraphWalker, CilDecoder, Closure, FieldInfo, GenericContext, ImageBuilder, InstructionDecoder,
    ResolveCallDetector, ResolveEntryPoint, TypeKind, TypeRef, Value, WalkOptions,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    body: Vec<u8>,
    helper_body: Vec<u8>,
    max_depth: u8,
    memoize: bool,
    bind_field: bool,
}

fuzz_target!(|input: Input| {
    let mut image = ImageBuilder::new();
    let module = image.module("Fuzz");

    // A few symbols so that some operand bytes resolve
    let resolve = image
        .method(module, TypeRef::class("Injector", "ResolutionExtensions"), "Resolve")
        .generic(1)
        .returns(TypeRef::method_param(0))
        .define();
    let _ = image.generic_method_token(module, resolve, Vec::new(), vec![TypeRef::interface("Fuzz", "IService")]);
    let owner = TypeRef::named("Fuzz", "<>c", TypeKind::Class);
    let action = TypeRef::delegate("System", "Action", Vec::new());
    let _ = image.field_token(module, FieldInfo::new(owner.clone(), "callback", action));
    let _ = image.string_token(module, "fuzz");

    let helper = image
        .method(module, owner.clone(), "Helper")
        .instance()
        .body(input.helper_body)
        .define();
    let _ = image.method_token(module, helper);
    let entry = image
        .method(module, owner.clone(), "Entry")
        .instance()
        .body(input.body)
        .define();
    let _ = image.method_token(module, entry);

    let target = image.object(owner);
    if input.bind_field {
        let _ = image.set_field(target, "callback", Value::Closure(Closure::new(helper, Some(target))));
    }
    let image = image.build();

    let _ = CilDecoder::new(&image).decode(entry, &GenericContext::default());

    let options = WalkOptions::new(usize::from(input.max_depth % 64) + 1, input.memoize);
    let walker = CallGraphWalker::new(&image).with_options(options);
    let _ = ResolveCallDetector::collect(&ResolveEntryPoint::default(), &walker, Closure::new(entry, Some(target)));
});
