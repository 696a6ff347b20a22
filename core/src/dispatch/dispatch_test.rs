#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;

    use crate::class::{ClassRegistry, Method, MethodBody, Visibility};
    use crate::dispatch::{
        CallExpression, DispatchConfiguration, DispatchPolicy, ForeignFailure, InteropBridge, SpecializationKind,
        dispatch_uncached,
    };
    use crate::error::DispatchError;
    use crate::rt::DispatchRuntime;
    use crate::val::{Block, ForeignObject, Symbol, Value};

    struct Bridge {
        invocations: AtomicUsize,
    }

    impl InteropBridge for Bridge {
        fn invoke(&self, _receiver: &ForeignObject, name: Symbol, args: &[Value]) -> Result<Value, ForeignFailure> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            match &*name.name() {
                "size" => Ok(Value::Int(args.len() as i64)),
                "strict" => Err(ForeignFailure::Arity {
                    expected: 1,
                    actual: args.len(),
                }),
                "explode" => Err(ForeignFailure::Other("boom".to_string())),
                "frozen" => Err(ForeignFailure::UnsupportedMessage("write".to_string())),
                other => Err(ForeignFailure::UnknownMember(other.to_string())),
            }
        }

        fn is_invocable(&self, _receiver: &ForeignObject, name: Symbol) -> bool {
            &*name.name() == "size"
        }
    }

    fn setup() -> (Arc<ClassRegistry>, DispatchRuntime, Arc<Bridge>) {
        let registry = Arc::new(ClassRegistry::new());
        let bridge = Arc::new(Bridge {
            invocations: AtomicUsize::new(0),
        });
        let runtime = DispatchRuntime::builder(registry.clone())
            .interop(bridge.clone())
            .build();
        (registry, runtime, bridge)
    }

    fn foreign() -> Value {
        Value::Foreign(Arc::new(ForeignObject::new("python")))
    }

    fn dispatch_error(err: &anyhow::Error) -> &DispatchError {
        err.downcast_ref::<DispatchError>().unwrap()
    }

    #[test]
    fn foreign_calls_go_through_the_bridge() -> Result<()> {
        let (_, runtime, bridge) = setup();
        let site = runtime.call_site("size", DispatchConfiguration::Public);
        let (a, b) = (foreign(), foreign());

        assert_eq!(site.call(&a, &[Value::Nil, Value::Nil], None)?, Value::Int(2));
        assert_eq!(site.call(&b, &[], None)?, Value::Int(0));
        assert_eq!(site.chain_kinds(), vec![SpecializationKind::Foreign]);
        assert_eq!(bridge.invocations.load(Ordering::SeqCst), 2);

        let respond = runtime.respond_to_site("size");
        assert!(respond.respond_to(&a)?);
        assert!(!runtime.respond_to_site("other").respond_to(&a)?);
        assert!(runtime.respond_to(&a, "size")?);
        Ok(())
    }

    #[test]
    fn foreign_failures_are_translated() {
        let (_, runtime, _) = setup();
        let receiver = foreign();

        let arity = runtime.call_site("strict", DispatchConfiguration::Public);
        let err = arity.call(&receiver, &[], None).unwrap_err();
        assert!(matches!(dispatch_error(&err), DispatchError::Argument(_)));
        assert_eq!(
            err.to_string(),
            "ArgumentError: wrong number of arguments (given 0, expected 1)"
        );

        let other = runtime.call_site("explode", DispatchConfiguration::Public);
        let err = other.call(&receiver, &[], None).unwrap_err();
        let DispatchError::Type(message) = dispatch_error(&err) else {
            panic!("expected TypeError, got {err}");
        };
        assert!(message.contains("boom"));

        for name in ["frozen", "nonexistent"] {
            let site = runtime.call_site(name, DispatchConfiguration::Public);
            let err = site.call(&receiver, &[Value::Int(1)], None).unwrap_err();
            let no_method = dispatch_error(&err).as_no_method().unwrap();
            assert_eq!(no_method.name(), Symbol::intern(name));
            assert_eq!(no_method.class_name(), "ForeignObject");
            assert_eq!(no_method.args(), &[Value::Int(1)]);
        }
    }

    #[test]
    fn uncached_dispatch_matches_cached_dispatch() -> Result<()> {
        let (registry, runtime, _) = setup();
        let object = registry.core().object;
        let greeter = registry.define_class("Greeter", object)?;
        registry.define_method(greeter, "greet", |_, args, _| {
            Ok(Value::str(&format!("hello {}", args.len())))
        })?;
        registry.define_method(greeter, "method_missing", |_, args, _| Ok(args[0].clone()))?;
        let receiver = registry.instantiate(greeter)?;

        for config in [
            DispatchConfiguration::Public,
            DispatchConfiguration::Private,
            DispatchConfiguration::PublicReturnMissing,
        ] {
            for name in ["greet", "absent"] {
                let site = runtime.call_site(name, config);
                let cached = site.call(&receiver, &[Value::Int(1)], None)?;
                let uncached = dispatch_uncached(
                    &runtime,
                    DispatchPolicy::call(config),
                    &receiver,
                    Symbol::intern(name),
                    &[Value::Int(1)],
                    None,
                )?;
                assert_eq!(cached, uncached, "{name} under {config:?}");
            }
        }
        Ok(())
    }

    #[test]
    fn blocks_pass_through_untouched() -> Result<()> {
        let (registry, runtime, _) = setup();
        let object = registry.core().object;
        let each = registry.define_class("Each", object)?;
        registry.define_method(each, "yield_twice", |_, _, block| {
            let block = block.ok_or_else(|| anyhow::anyhow!("no block given"))?;
            block.call(&[Value::Int(1)])?;
            block.call(&[Value::Int(2)])
        })?;
        let receiver = registry.instantiate(each)?;
        let total = Arc::new(AtomicUsize::new(0));
        let sum = Arc::clone(&total);
        let block = Block::new(move |args| {
            if let Some(Value::Int(n)) = args.first() {
                sum.fetch_add(*n as usize, Ordering::SeqCst);
            }
            Ok(Value::Nil)
        });

        let site = runtime.call_site("yield_twice", DispatchConfiguration::Public);
        site.call(&receiver, &[], Some(&block))?;
        site.call(&receiver, &[], Some(&block))?;
        assert_eq!(total.load(Ordering::SeqCst), 6);
        assert!(site.call(&receiver, &[], None).is_err());
        Ok(())
    }

    #[test]
    fn safe_navigation_skips_nil_receivers() -> Result<()> {
        let (registry, runtime, _) = setup();
        let core = registry.core();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.define_method(core.integer, "succ", move |recv, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            match recv {
                Value::Int(n) => Ok(Value::Int(n + 1)),
                other => Err(anyhow::anyhow!("not an integer: {}", other.inspect())),
            }
        })?;

        let expr = CallExpression::new(runtime.call_site("succ", DispatchConfiguration::Public)).safe_navigation();
        assert_eq!(expr.execute(&Value::Nil, &[], None)?, Value::Nil);
        assert_eq!(expr.execute(&Value::Int(1), &[], None)?, Value::Int(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(expr.site().depth(), 1);

        // Without `&.`, nil is an ordinary receiver.
        let plain = CallExpression::new(runtime.call_site("succ", DispatchConfiguration::Public));
        assert!(plain.execute(&Value::Nil, &[], None).is_err());
        Ok(())
    }

    #[test]
    fn attribute_assignment_yields_the_assigned_value() -> Result<()> {
        let (registry, runtime, _) = setup();
        let object = registry.core().object;
        let point = registry.define_class("Point", object)?;
        let x = Symbol::intern("x");
        registry.define_method(point, "x=", move |recv, args, _| {
            if let Value::Object(obj) = recv {
                obj.set_field(x, args[0].clone());
            }
            Ok(Value::str("writer result"))
        })?;
        registry.define_method(point, "x", move |recv, _, _| match recv {
            Value::Object(obj) => Ok(obj.get_field(x)),
            _ => Ok(Value::Nil),
        })?;
        let receiver = registry.instantiate(point)?;

        let assign = CallExpression::new(runtime.call_site("x=", DispatchConfiguration::Public)).attr_assign();
        assert_eq!(assign.execute(&receiver, &[Value::Int(3)], None)?, Value::Int(3));

        let read = CallExpression::new(runtime.call_site("x", DispatchConfiguration::Public));
        assert_eq!(read.execute(&receiver, &[], None)?, Value::Int(3));

        let plain = CallExpression::new(runtime.call_site("x=", DispatchConfiguration::Public));
        assert_eq!(plain.execute(&receiver, &[Value::Int(4)], None)?, Value::str("writer result"));
        Ok(())
    }

    #[test]
    fn defined_consults_visibility_then_respond_to_missing() -> Result<()> {
        let (registry, runtime, _) = setup();
        let object = registry.core().object;
        let dynamic = registry.define_class("Dynamic", object)?;
        let plain = registry.define_class("Plain", object)?;
        registry.define_method(dynamic, "real", |_, _, _| Ok(Value::Nil))?;
        registry.define_method_with_visibility(dynamic, "secret", Visibility::Private, |_, _, _| Ok(Value::Nil))?;
        registry.define_method_with_visibility(
            dynamic,
            "respond_to_missing?",
            Visibility::Private,
            |_, args, _| Ok(Value::Bool(args[0] == Value::symbol("virtual"))),
        )?;
        let d = registry.instantiate(dynamic)?;
        let p = registry.instantiate(plain)?;

        let defined = |name: &str, config| {
            CallExpression::new(runtime.call_site(name, config)).defined(&d)
        };
        assert_eq!(defined("real", DispatchConfiguration::Public)?, Some("method"));
        assert_eq!(defined("virtual", DispatchConfiguration::Public)?, Some("method"));
        assert_eq!(defined("nothing", DispatchConfiguration::Public)?, None);
        assert_eq!(defined("secret", DispatchConfiguration::Public)?, None);
        assert_eq!(defined("secret", DispatchConfiguration::Private)?, Some("method"));

        // No hook at all: the sentinel means undefined.
        let expr = CallExpression::new(runtime.call_site("virtual", DispatchConfiguration::Public));
        assert_eq!(expr.defined(&p)?, None);
        Ok(())
    }

    #[test]
    fn defined_always_sends_a_false_private_flag() -> Result<()> {
        let (registry, runtime, _) = setup();
        let object = registry.core().object;
        let echo = registry.define_class("EchoFlag", object)?;
        registry.define_method(echo, "respond_to_missing?", |_, args, _| Ok(args[1].clone()))?;
        let receiver = registry.instantiate(echo)?;

        let public = CallExpression::new(runtime.call_site("x", DispatchConfiguration::Public));
        let private = CallExpression::new(runtime.call_site("x", DispatchConfiguration::Private));
        assert_eq!(public.defined(&receiver)?, None);
        assert_eq!(private.defined(&receiver)?, None);
        Ok(())
    }

    #[test]
    fn unimplemented_stub_is_defined() -> Result<()> {
        let (registry, runtime, _) = setup();
        let object = registry.core().object;
        let body: MethodBody = Arc::new(|_: &Value, _: &[Value], _: Option<&Block>| Ok(Value::Nil));
        registry.install(Method::new(Symbol::intern("fork"), object, Visibility::Public, body).mark_unimplemented())?;
        let receiver = registry.instantiate(object)?;

        let expr = CallExpression::new(runtime.call_site("fork", DispatchConfiguration::Public));
        assert_eq!(expr.defined(&receiver)?, Some("method"));
        assert!(!runtime.respond_to(&receiver, "fork")?);
        assert_eq!(expr.execute(&receiver, &[], None)?, Value::Nil);
        Ok(())
    }

    #[test]
    fn defined_on_foreign_receivers_asks_the_bridge() -> Result<()> {
        let (_, runtime, bridge) = setup();
        let receiver = foreign();
        let size = CallExpression::new(runtime.call_site("size", DispatchConfiguration::Public));
        let length = CallExpression::new(runtime.call_site("length", DispatchConfiguration::Public));
        assert_eq!(size.defined(&receiver)?, Some("method"));
        assert_eq!(length.defined(&receiver)?, None);
        assert_eq!(bridge.invocations.load(Ordering::SeqCst), 0);
        Ok(())
    }
}
