//! Example validating a small application's container
//!
//! Run with pretty logging:
//! ```bash
//! cargo run --example validate --features logging-pretty
//! ```
//!
//! Run with JSON logging:
//! ```bash
//! cargo run --example validate --features logging-json
//! ```

use dependency_validator::prelude::*;
use dependency_validator::{TypeKind, Value};

fn main() -> Result<()> {
    dependency_validator::logging::builder().trace().validator_only().init();

    let mut image = ImageBuilder::new();
    let module = image.module("Shop");

    // class OrderService { OrderService(IOrderRepository repo, IClock clock) }
    let orders = TypeRef::class("Shop", "OrderService");
    image.define_type(
        orders.clone(),
        vec![ConstructorInfo::public(vec![
            ParameterInfo::new("repo", TypeRef::interface("Shop", "IOrderRepository")),
            ParameterInfo::new("clock", TypeRef::interface("Shop", "IClock")),
        ])],
    );
    image.define_type(TypeRef::class("Shop", "SqlOrderRepository"), vec![ConstructorInfo::public(Vec::new())]);

    // builder.Register(ctx => new Mailer(ctx.Resolve<ISmtpClient>(), ctx.Resolve<IClock>()))
    let resolve = image
        .method(module, TypeRef::class("Injector", "ResolutionExtensions"), "Resolve")
        .generic(1)
        .returns(TypeRef::method_param(0))
        .define();
    let smtp = image.generic_method_token(module, resolve, Vec::new(), vec![TypeRef::interface("Shop", "ISmtpClient")]);
    let clock = image.generic_method_token(module, resolve, Vec::new(), vec![TypeRef::interface("Shop", "IClock")]);
    let mailer_ctor = image
        .method(module, TypeRef::class("Shop", "Mailer"), ".ctor")
        .constructor()
        .define();
    let mailer_ctor = image.method_token(module, mailer_ctor);
    let lambdas = TypeRef::named("Shop", "<>c", TypeKind::Class);
    let mailer_factory = image
        .method(module, lambdas.clone(), "<Configure>b__0_0")
        .instance()
        .body(
            IlEmitter::new()
                .ldarg_1()
                .call(smtp)
                .ldarg_1()
                .call(clock)
                .newobj(mailer_ctor)
                .ret()
                .to_bytes(),
        )
        .define();
    let closure_target = image.object(lambdas);
    image.set_field(closure_target, "<>9", Value::Opaque)?;

    let mut builder = ContainerBuilder::new(image.build());
    builder
        .register_type(TypeRef::class("Shop", "SqlOrderRepository"))
        .as_service(TypeRef::interface("Shop", "IOrderRepository"))
        .instance_per_scope();
    builder
        .register_instance(TypeRef::class("Shop", "SystemClock"))
        .as_service(TypeRef::interface("Shop", "IClock"))
        .single_instance();
    builder.register_type(orders).single_instance();
    builder
        .register_callback(
            TypeRef::class("Shop", "Mailer"),
            Closure::new(mailer_factory, Some(closure_target)),
        )
        .as_service(TypeRef::interface("Shop", "IMailer"))
        .single_instance();

    builder.validate_on_build_with(|result| {
        println!("{result}");
        for error in result.errors() {
            println!("registration #{} ({})", error.component().ordinal, error.kind());
        }
    });

    let container = builder.build()?;
    println!("{} registrations checked", container.registry().len());
    Ok(())
}
