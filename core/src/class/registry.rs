use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Result, anyhow, bail};
use dashmap::DashMap;
use rustc_hash::FxHashMap;

use super::{ClassId, Method, MethodBody, MethodHandle, Shape, ShapeId, Visibility};
use crate::dispatch::{Assumption, LookupScope, MethodLookup, MethodLookupResult, VisibilityPolicy};
use crate::val::{Block, ObjectValue, Symbol, Value};

enum MethodEntry {
    Defined(MethodHandle),
    /// `undef_method`: stops the ancestor walk and reports absence.
    Undefined,
}

struct ClassEntry {
    name: Arc<str>,
    superclass: Option<ClassId>,
    instance_shape: Shape,
    methods: FxHashMap<Symbol, MethodEntry>,
    // Renewed on every change to `methods` or `superclass`.
    unmodified: Arc<Assumption>,
}

/// Ids of the classes every registry starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreClasses {
    pub basic_object: ClassId,
    pub object: ClassId,
    pub nil: ClassId,
    pub integer: ClassId,
    pub float: ClassId,
    pub string: ClassId,
    pub symbol: ClassId,
    pub true_class: ClassId,
    pub false_class: ClassId,
    pub foreign: ClassId,
}

/// In-process class hierarchy and method tables, usable as the dispatch
/// core's [`MethodLookup`] service.
pub struct ClassRegistry {
    classes: DashMap<ClassId, ClassEntry>,
    next_class: AtomicU32,
    next_shape: AtomicU32,
    core: CoreClasses,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    pub fn new() -> Self {
        let classes = DashMap::new();
        let next_class = AtomicU32::new(0);
        let next_shape = AtomicU32::new(0);
        let add = |name: &str, superclass: Option<ClassId>| {
            insert_class(&classes, &next_class, &next_shape, name, superclass)
        };

        let basic_object = add("BasicObject", None);
        let object = add("Object", Some(basic_object));
        let core = CoreClasses {
            basic_object,
            object,
            nil: add("NilClass", Some(object)),
            integer: add("Integer", Some(object)),
            float: add("Float", Some(object)),
            string: add("String", Some(object)),
            symbol: add("Symbol", Some(object)),
            true_class: add("TrueClass", Some(object)),
            false_class: add("FalseClass", Some(object)),
            foreign: add("ForeignObject", Some(basic_object)),
        };

        Self {
            classes,
            next_class,
            next_shape,
            core,
        }
    }

    #[inline]
    pub fn core(&self) -> CoreClasses {
        self.core
    }

    pub fn define_class(&self, name: &str, superclass: ClassId) -> Result<ClassId> {
        if !self.classes.contains_key(&superclass) {
            bail!("cannot define class {name}: unknown superclass {}", superclass.0);
        }
        let id = insert_class(&self.classes, &self.next_class, &self.next_shape, name, Some(superclass));
        tracing::debug!(target: "lkr::class", class = name, id = id.0, "class defined");
        Ok(id)
    }

    /// Define (or redefine) a public method.
    pub fn define_method<F>(&self, class: ClassId, name: &str, body: F) -> Result<MethodHandle>
    where
        F: Fn(&Value, &[Value], Option<&Block>) -> Result<Value> + Send + Sync + 'static,
    {
        self.define_method_with_visibility(class, name, Visibility::Public, body)
    }

    pub fn define_method_with_visibility<F>(
        &self,
        class: ClassId,
        name: &str,
        visibility: Visibility,
        body: F,
    ) -> Result<MethodHandle>
    where
        F: Fn(&Value, &[Value], Option<&Block>) -> Result<Value> + Send + Sync + 'static,
    {
        let body: MethodBody = Arc::new(body);
        self.install(Method::new(Symbol::intern(name), class, visibility, body))
    }

    /// Install a prepared method into its owner's table.
    pub fn install(&self, method: Method) -> Result<MethodHandle> {
        let handle = Arc::new(method);
        let name = handle.name();
        let installed = Arc::clone(&handle);
        self.mutate(handle.owner(), "define_method", name, move |entry| {
            entry.methods.insert(name, MethodEntry::Defined(installed));
            Ok(())
        })?;
        Ok(handle)
    }

    /// Make `name` undefined for `class` and its descendants, even if an
    /// ancestor defines it.
    pub fn undef_method(&self, class: ClassId, name: &str) -> Result<()> {
        let name = Symbol::intern(name);
        if self.find_method(class, name).0.is_none() {
            bail!("undefined method `{name}' for class `{}'", self.class_name(class));
        }
        self.mutate(class, "undef_method", name, |entry| {
            entry.methods.insert(name, MethodEntry::Undefined);
            Ok(())
        })
    }

    /// Remove the class's own entry for `name`, re-exposing any ancestor method.
    pub fn remove_method(&self, class: ClassId, name: &str) -> Result<MethodHandle> {
        let name = Symbol::intern(name);
        let class_name = self.class_name(class);
        self.mutate(class, "remove_method", name, |entry| {
            // An undef entry is not a method; leave it in place.
            if !matches!(entry.methods.get(&name), Some(MethodEntry::Defined(_))) {
                bail!("method `{name}' not defined in {class_name}");
            }
            match entry.methods.remove(&name) {
                Some(MethodEntry::Defined(method)) => Ok(method),
                _ => Err(anyhow!("method `{name}' not defined in {class_name}")),
            }
        })
    }

    /// Change the visibility of `name` as seen from `class`. An inherited method
    /// is copied into `class` with the new visibility.
    pub fn set_visibility(&self, class: ClassId, name: &str, visibility: Visibility) -> Result<MethodHandle> {
        let name = Symbol::intern(name);
        let Some(method) = self.find_method(class, name).0 else {
            bail!("undefined method `{name}' for class `{}'", self.class_name(class));
        };
        if method.visibility() == visibility && method.owner() == class {
            return Ok(method);
        }
        self.install(method.copy_to(class, visibility))
    }

    pub fn set_superclass(&self, class: ClassId, superclass: ClassId) -> Result<()> {
        if class == superclass || self.is_ancestor(class, superclass) {
            bail!(
                "setting superclass of {} to {} would create a cycle",
                self.class_name(class),
                self.class_name(superclass)
            );
        }
        if !self.classes.contains_key(&superclass) {
            bail!("unknown superclass {}", superclass.0);
        }
        self.mutate(class, "set_superclass", Symbol::intern("superclass"), |entry| {
            entry.superclass = Some(superclass);
            Ok(())
        })
    }

    pub fn superclass(&self, class: ClassId) -> Option<ClassId> {
        self.classes.get(&class).and_then(|entry| entry.superclass)
    }

    /// Is `ancestor` equal to `class` or somewhere on its superclass chain?
    pub fn is_ancestor(&self, ancestor: ClassId, class: ClassId) -> bool {
        self.is_ancestor_tracked(ancestor, class, &mut Vec::new())
    }

    /// Allocate an extra layout for `class`, distinct from its default instance shape.
    pub fn new_shape(&self, class: ClassId) -> Result<Shape> {
        if !self.classes.contains_key(&class) {
            bail!("unknown class {}", class.0);
        }
        Ok(Shape {
            id: ShapeId(self.next_shape.fetch_add(1, Ordering::Relaxed)),
            class,
        })
    }

    pub fn instantiate(&self, class: ClassId) -> Result<Value> {
        let shape = self
            .classes
            .get(&class)
            .map(|entry| entry.instance_shape)
            .ok_or_else(|| anyhow!("unknown class {}", class.0))?;
        Ok(Value::Object(Arc::new(ObjectValue::new(shape))))
    }

    pub fn instantiate_with_shape(&self, shape: Shape) -> Value {
        Value::Object(Arc::new(ObjectValue::new(shape)))
    }

    /// Current "methods unmodified" assumption of `class`.
    pub fn methods_assumption(&self, class: ClassId) -> Option<Arc<Assumption>> {
        self.classes.get(&class).map(|entry| Arc::clone(&entry.unmodified))
    }

    fn mutate<R>(
        &self,
        class: ClassId,
        operation: &'static str,
        name: Symbol,
        f: impl FnOnce(&mut ClassEntry) -> Result<R>,
    ) -> Result<R> {
        let mut entry = self
            .classes
            .get_mut(&class)
            .ok_or_else(|| anyhow!("unknown class {}", class.0))?;
        let out = f(&mut entry)?;
        Assumption::renew(&mut entry.unmodified);
        tracing::debug!(
            target: "lkr::class",
            class = %entry.name,
            op = operation,
            name = %name,
            "method table changed"
        );
        Ok(out)
    }

    // Walks the ancestor chain; every class visited contributes its assumption.
    fn find_method(&self, class: ClassId, name: Symbol) -> (Option<MethodHandle>, Vec<Arc<Assumption>>) {
        let mut assumptions = Vec::new();
        let mut current = Some(class);
        while let Some(id) = current {
            let Some(entry) = self.classes.get(&id) else {
                break;
            };
            assumptions.push(Arc::clone(&entry.unmodified));
            match entry.methods.get(&name) {
                Some(MethodEntry::Defined(method)) => return (Some(Arc::clone(method)), assumptions),
                Some(MethodEntry::Undefined) => return (None, assumptions),
                None => current = entry.superclass,
            }
        }
        (None, assumptions)
    }

    fn is_ancestor_tracked(&self, ancestor: ClassId, class: ClassId, assumptions: &mut Vec<Arc<Assumption>>) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            let Some(entry) = self.classes.get(&id) else {
                return false;
            };
            assumptions.push(Arc::clone(&entry.unmodified));
            current = entry.superclass;
        }
        false
    }

    fn is_visible(&self, method: &Method, scope: LookupScope, assumptions: &mut Vec<Arc<Assumption>>) -> bool {
        match (scope.visibility, method.visibility()) {
            (VisibilityPolicy::Private, _) | (_, Visibility::Public) => true,
            (VisibilityPolicy::Public, _) | (VisibilityPolicy::Protected, Visibility::Private) => false,
            (VisibilityPolicy::Protected, Visibility::Protected) => {
                let caller = scope.caller.unwrap_or(self.core.object);
                self.is_ancestor_tracked(method.owner(), caller, assumptions)
            }
        }
    }
}

impl MethodLookup for ClassRegistry {
    fn class_of(&self, receiver: &Value) -> ClassId {
        match receiver {
            Value::Nil => self.core.nil,
            Value::Bool(true) => self.core.true_class,
            Value::Bool(false) => self.core.false_class,
            Value::Int(_) => self.core.integer,
            Value::Float(_) => self.core.float,
            Value::Str(_) => self.core.string,
            Value::Symbol(_) => self.core.symbol,
            Value::Object(obj) => obj.shape().class,
            Value::Foreign(_) => self.core.foreign,
            Value::Missing => self.core.basic_object,
        }
    }

    fn class_name(&self, class: ClassId) -> Arc<str> {
        self.classes
            .get(&class)
            .map(|entry| Arc::clone(&entry.name))
            .unwrap_or_else(|| Arc::from("<unknown class>"))
    }

    fn lookup(&self, class: ClassId, name: Symbol, scope: LookupScope) -> MethodLookupResult {
        let (method, mut assumptions) = self.find_method(class, name);
        match method {
            Some(method) if self.is_visible(&method, scope, &mut assumptions) => {
                MethodLookupResult::new(Some(method), assumptions)
            }
            _ => MethodLookupResult::not_found(assumptions),
        }
    }
}

fn insert_class(
    classes: &DashMap<ClassId, ClassEntry>,
    next_class: &AtomicU32,
    next_shape: &AtomicU32,
    name: &str,
    superclass: Option<ClassId>,
) -> ClassId {
    let id = ClassId(next_class.fetch_add(1, Ordering::Relaxed));
    let instance_shape = Shape {
        id: ShapeId(next_shape.fetch_add(1, Ordering::Relaxed)),
        class: id,
    };
    classes.insert(
        id,
        ClassEntry {
            name: Arc::from(name),
            superclass,
            instance_shape,
            methods: FxHashMap::default(),
            unmodified: Assumption::new(&format!("{name} methods unmodified")),
        },
    );
    id
}
