#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;

    use crate::class::{ClassRegistry, Method, MethodBody, Visibility};
    use crate::dispatch::{LookupScope, MethodLookup, VisibilityPolicy};
    use crate::val::{Symbol, Value};

    fn constant(value: i64) -> impl Fn(&Value, &[Value], Option<&crate::val::Block>) -> Result<Value> + Send + Sync {
        move |_, _, _| Ok(Value::Int(value))
    }

    fn public() -> LookupScope {
        LookupScope::new(VisibilityPolicy::Public)
    }

    fn call(registry: &ClassRegistry, receiver: &Value, name: &str, scope: LookupScope) -> Option<Value> {
        let class = registry.class_of(receiver);
        let found = registry.lookup(class, Symbol::intern(name), scope);
        found.method().map(|m| m.invoke(receiver, &[], None).unwrap())
    }

    #[test]
    fn core_classes_map_values() -> Result<()> {
        let registry = ClassRegistry::new();
        let core = registry.core();
        assert_eq!(registry.class_of(&Value::Nil), core.nil);
        assert_eq!(registry.class_of(&Value::Bool(true)), core.true_class);
        assert_eq!(registry.class_of(&Value::Bool(false)), core.false_class);
        assert_eq!(registry.class_of(&Value::Int(1)), core.integer);
        assert_eq!(registry.class_of(&Value::symbol("a")), core.symbol);
        assert_eq!(&*registry.class_name(core.string), "String");
        assert_eq!(registry.superclass(core.object), Some(core.basic_object));
        assert_eq!(registry.superclass(core.basic_object), None);

        let point = registry.define_class("Point", core.object)?;
        assert_eq!(registry.class_of(&registry.instantiate(point)?), point);
        Ok(())
    }

    #[test]
    fn lookup_walks_ancestors() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let animal = registry.define_class("Animal", object)?;
        let dog = registry.define_class("Dog", animal)?;
        registry.define_method(animal, "legs", constant(4))?;

        let rex = registry.instantiate(dog)?;
        assert_eq!(call(&registry, &rex, "legs", public()), Some(Value::Int(4)));

        // Dog, Animal: both visited, both contribute an assumption.
        let found = registry.lookup(dog, Symbol::intern("legs"), public());
        assert_eq!(found.assumptions().len(), 2);
        assert!(found.is_valid());
        Ok(())
    }

    #[test]
    fn not_found_carries_every_visited_class() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let widget = registry.define_class("Widget", object)?;
        let found = registry.lookup(widget, Symbol::intern("nope"), public());
        assert!(!found.is_defined());
        // Widget, Object, BasicObject
        assert_eq!(found.assumptions().len(), 3);

        // Defining the name anywhere on the path flips the negative answer.
        registry.define_method(object, "nope", constant(1))?;
        assert!(!found.is_valid());
        Ok(())
    }

    #[test]
    fn redefinition_invalidates_previous_result() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let base = registry.define_class("Base", object)?;
        let derived = registry.define_class("Derived", base)?;
        registry.define_method(base, "v", constant(1))?;

        let before = registry.lookup(derived, Symbol::intern("v"), public());
        registry.define_method(base, "v", constant(2))?;
        assert!(!before.is_valid());

        let after = registry.lookup(derived, Symbol::intern("v"), public());
        assert!(after.is_valid());
        let receiver = registry.instantiate(derived)?;
        assert_eq!(after.method().unwrap().invoke(&receiver, &[], None)?, Value::Int(2));
        Ok(())
    }

    #[test]
    fn unrelated_class_change_keeps_result_valid() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let a = registry.define_class("A", object)?;
        let b = registry.define_class("B", object)?;
        registry.define_method(a, "v", constant(1))?;

        let found = registry.lookup(a, Symbol::intern("v"), public());
        registry.define_method(b, "v", constant(2))?;
        assert!(found.is_valid());
        Ok(())
    }

    #[test]
    fn undef_method_hides_inherited_definition() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let parent = registry.define_class("Parent", object)?;
        let child = registry.define_class("Child", parent)?;
        let grandchild = registry.define_class("Grandchild", child)?;
        registry.define_method(parent, "hello", constant(1))?;

        registry.undef_method(child, "hello")?;
        let g = registry.instantiate(grandchild)?;
        assert_eq!(call(&registry, &g, "hello", public()), None);
        let p = registry.instantiate(parent)?;
        assert_eq!(call(&registry, &p, "hello", public()), Some(Value::Int(1)));

        // Nothing left to undefine.
        assert!(registry.undef_method(child, "hello").is_err());
        // An undef entry is not removable as a method.
        assert!(registry.remove_method(child, "hello").is_err());
        Ok(())
    }

    #[test]
    fn remove_method_reexposes_ancestor() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let parent = registry.define_class("Parent", object)?;
        let child = registry.define_class("Child", parent)?;
        registry.define_method(parent, "v", constant(1))?;
        registry.define_method(child, "v", constant(2))?;

        let c = registry.instantiate(child)?;
        assert_eq!(call(&registry, &c, "v", public()), Some(Value::Int(2)));
        let removed = registry.remove_method(child, "v")?;
        assert_eq!(removed.owner(), child);
        assert_eq!(call(&registry, &c, "v", public()), Some(Value::Int(1)));
        assert!(registry.remove_method(child, "v").is_err());
        Ok(())
    }

    #[test]
    fn visibility_matrix() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let account = registry.define_class("Account", object)?;
        let other = registry.define_class("Other", object)?;
        registry.define_method_with_visibility(account, "secret", Visibility::Private, constant(1))?;
        registry.define_method_with_visibility(account, "balance", Visibility::Protected, constant(2))?;

        let acct = registry.instantiate(account)?;
        let private = LookupScope::new(VisibilityPolicy::Private);
        let protected = LookupScope::new(VisibilityPolicy::Protected);

        assert_eq!(call(&registry, &acct, "secret", public()), None);
        assert_eq!(call(&registry, &acct, "secret", protected.with_caller(account)), None);
        assert_eq!(call(&registry, &acct, "secret", private), Some(Value::Int(1)));

        assert_eq!(call(&registry, &acct, "balance", public()), None);
        assert_eq!(call(&registry, &acct, "balance", protected), None);
        assert_eq!(call(&registry, &acct, "balance", protected.with_caller(other)), None);
        assert_eq!(
            call(&registry, &acct, "balance", protected.with_caller(account)),
            Some(Value::Int(2))
        );
        assert_eq!(call(&registry, &acct, "balance", private), Some(Value::Int(2)));
        Ok(())
    }

    #[test]
    fn set_visibility_copies_inherited_method() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let parent = registry.define_class("Parent", object)?;
        let child = registry.define_class("Child", parent)?;
        let original = registry.define_method(parent, "v", constant(7))?;

        let copy = registry.set_visibility(child, "v", Visibility::Private)?;
        assert_eq!(copy.owner(), child);
        assert_ne!(copy.serial(), original.serial());

        let c = registry.instantiate(child)?;
        let p = registry.instantiate(parent)?;
        assert_eq!(call(&registry, &c, "v", public()), None);
        assert_eq!(call(&registry, &p, "v", public()), Some(Value::Int(7)));
        assert!(registry.set_visibility(child, "missing", Visibility::Public).is_err());
        Ok(())
    }

    #[test]
    fn set_superclass_rejects_cycles_and_invalidates() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let a = registry.define_class("A", object)?;
        let b = registry.define_class("B", a)?;
        let mixin = registry.define_class("Mixin", object)?;
        registry.define_method(mixin, "mixed", constant(5))?;

        assert!(registry.set_superclass(a, b).is_err());
        assert!(registry.set_superclass(a, a).is_err());

        let before = registry.lookup(b, Symbol::intern("mixed"), public());
        assert!(!before.is_defined());
        registry.set_superclass(a, mixin)?;
        assert!(!before.is_valid());
        assert!(registry.is_ancestor(mixin, b));
        let bee = registry.instantiate(b)?;
        assert_eq!(call(&registry, &bee, "mixed", public()), Some(Value::Int(5)));
        Ok(())
    }

    #[test]
    fn methods_assumption_is_renewed_per_change() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let k = registry.define_class("K", object)?;
        let first = registry.methods_assumption(k).unwrap();
        registry.define_method(k, "a", constant(1))?;
        let second = registry.methods_assumption(k).unwrap();
        assert!(!first.is_valid());
        assert!(second.is_valid());
        assert!(!Arc::ptr_eq(&first, &second));
        Ok(())
    }

    #[test]
    fn shapes_are_distinct_per_allocation_request() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let k = registry.define_class("K", object)?;
        let extra = registry.new_shape(k)?;
        let default = registry.instantiate(k)?;
        let reshaped = registry.instantiate_with_shape(extra);
        let (Value::Object(a), Value::Object(b)) = (&default, &reshaped) else {
            panic!("expected objects");
        };
        assert_ne!(a.shape().id, b.shape().id);
        assert_eq!(a.shape().class, b.shape().class);
        Ok(())
    }

    #[test]
    fn unimplemented_flag_survives_install() -> Result<()> {
        let registry = ClassRegistry::new();
        let object = registry.core().object;
        let body: MethodBody = Arc::new(constant(0));
        let method = Method::new(Symbol::intern("fork"), object, Visibility::Public, body).mark_unimplemented();
        let handle = registry.install(method)?;
        assert!(handle.is_unimplemented());
        let found = registry.lookup(object, Symbol::intern("fork"), public());
        assert!(found.method().unwrap().is_unimplemented());
        Ok(())
    }
}
