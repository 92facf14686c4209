//! Script-authored subclasses of host classes
//!
//! `godot.register_class(ctor, name?, icon?)` records a script class the
//! host can later instantiate by name. The host class it extends is read
//! from the hidden tag on the constructor's prototype chain.

use crate::classes::NATIVE_CLASS_KEY;
use crate::error::{BridgeError, Result};
use crate::state::{upgrade, BridgeState};
use crate::wrapper;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Function, Object, Persistent, Value};
use std::collections::HashMap;
use std::rc::Rc;
use tether_core::ObjectId;
use tracing::info;

/// Hidden tag naming the script class on its prototype and constructor.
pub(crate) const CLASS_NAME_KEY: &str = "class_name";
const NAME_TAG: &str = "cls_name";
const ICON_TAG: &str = "cls_icon";

/// A registered script class.
pub(crate) struct ScriptClassDescriptor {
    constructor: Persistent<Object<'static>>,
    record: ScriptClassRecord,
    methods: HashMap<String, Persistent<Function<'static>>>,
}

/// Host-facing summary of a script class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptClassRecord {
    pub class_name: String,
    /// Host class the script class extends.
    pub base_class: String,
    pub icon_path: String,
    /// Script-defined methods, sorted.
    pub methods: Vec<String>,
}

#[derive(Default)]
pub(crate) struct ScriptClassRegistry {
    classes: HashMap<String, ScriptClassDescriptor>,
}

impl ScriptClassRegistry {
    /// Returns the descriptor a same-named registration replaced.
    #[must_use = "drop the replaced descriptor after releasing the registry borrow"]
    fn insert(&mut self, descriptor: ScriptClassDescriptor) -> Option<ScriptClassDescriptor> {
        self.classes.insert(descriptor.record.class_name.clone(), descriptor)
    }

    pub fn record(&self, class_name: &str) -> Option<ScriptClassRecord> {
        self.classes.get(class_name).map(|descriptor| descriptor.record.clone())
    }

    pub fn records(&self) -> Vec<ScriptClassRecord> {
        let mut records: Vec<ScriptClassRecord> = self.classes.values().map(|d| d.record.clone()).collect();
        records.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        records
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use = "drop the descriptors after releasing the registry borrow"]
    pub fn take_all(&mut self) -> Vec<ScriptClassDescriptor> {
        self.classes.drain().map(|(_, descriptor)| descriptor).collect()
    }
}

impl BridgeState {
    pub(crate) fn register_class_function<'js>(self: &Rc<Self>, ctx: &Ctx<'js>) -> rquickjs::Result<Function<'js>> {
        let state = Rc::downgrade(self);
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let state = upgrade(&ctx, &state)?;
                let mut args = args.0.into_iter();
                let constructor = args.next().unwrap_or_else(|| Value::new_undefined(ctx.clone()));
                state.register_script_class(&ctx, constructor, args.next(), args.next())
            },
        )
    }

    /// Validates and records a script class; returns the constructor.
    pub(crate) fn register_script_class<'js>(
        self: &Rc<Self>,
        ctx: &Ctx<'js>,
        constructor: Value<'js>,
        name: Option<Value<'js>>,
        icon: Option<Value<'js>>,
    ) -> rquickjs::Result<Value<'js>> {
        let ctor = constructor
            .as_object()
            .filter(|_| constructor.is_function())
            .cloned()
            .ok_or_else(|| Exception::throw_type(ctx, "register_class expects a class constructor"))?;
        let glue = self.glue_or_throw(ctx)?;

        let prototype = ctor
            .get::<_, Option<Object>>("prototype")?
            .ok_or_else(|| Exception::throw_type(ctx, "class constructor has no prototype"))?;
        let base_class = prototype
            .get::<_, Option<String>>(NATIVE_CLASS_KEY)?
            .filter(|base| self.classes.contains(base))
            .ok_or_else(|| Exception::throw_type(ctx, "register_class expects a subclass of a native class"))?;

        let class_name = match explicit_string(ctx, name, "class name")? {
            Some(name) => Some(name),
            None => match own_string(&glue.own(ctx, &ctor, NAME_TAG)?) {
                Some(tagged) => Some(tagged),
                None => own_string(&glue.own(ctx, &ctor, "name")?),
            },
        }
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Exception::throw_type(ctx, "script class name is empty"))?;

        let icon_path = match explicit_string(ctx, icon, "icon path")? {
            Some(icon) => icon,
            None => own_string(&glue.own(ctx, &ctor, ICON_TAG)?).unwrap_or_default(),
        };

        glue.hide(ctx, &prototype, CLASS_NAME_KEY, class_name.as_str())?;
        glue.hide(ctx, &ctor, CLASS_NAME_KEY, class_name.as_str())?;

        let mut method_names = Vec::new();
        let mut methods = HashMap::new();
        for method in glue.own_functions(ctx, &prototype)? {
            let function: Function = prototype.get(method.as_str())?;
            if self.is_thunk(ctx, function.as_value()) {
                continue;
            }
            methods.insert(method.clone(), Persistent::save(ctx, function));
            method_names.push(method);
        }
        method_names.sort();

        info!(class_name = %class_name, base_class = %base_class, methods = method_names.len(), "script class registered");
        let descriptor = ScriptClassDescriptor {
            constructor: Persistent::save(ctx, ctor),
            record: ScriptClassRecord {
                class_name,
                base_class,
                icon_path,
                methods: method_names,
            },
            methods,
        };
        let replaced = self.script_classes.borrow_mut().insert(descriptor);
        drop(replaced);

        Ok(constructor)
    }

    /// Script class a prototype was registered under, if any.
    pub(crate) fn script_class_of<'js>(&self, proto: &Object<'js>) -> rquickjs::Result<Option<String>> {
        let tagged = proto.get::<_, Option<String>>(CLASS_NAME_KEY)?;
        Ok(tagged.filter(|class_name| self.script_classes.borrow().contains(class_name)))
    }

    pub(crate) fn script_prototype<'js>(&self, ctx: &Ctx<'js>, class_name: &str) -> Option<Object<'js>> {
        let constructor = self
            .script_classes
            .borrow()
            .classes
            .get(class_name)
            .map(|descriptor| descriptor.constructor.clone())?;
        constructor.restore(ctx).ok()?.get("prototype").ok()
    }

    pub(crate) fn script_method<'js>(&self, ctx: &Ctx<'js>, class_name: &str, method: &str) -> Option<Function<'js>> {
        let function = self
            .script_classes
            .borrow()
            .classes
            .get(class_name)
            .and_then(|descriptor| descriptor.methods.get(method).cloned())?;
        function.restore(ctx).ok()
    }

    /// Instantiates a script class, adopting `object` when given. The
    /// resulting wrapper is pinned for as long as the object lives.
    pub(crate) fn create_instance<'js>(
        self: &Rc<Self>,
        ctx: &Ctx<'js>,
        class_name: &str,
        object: Option<ObjectId>,
    ) -> Result<Object<'js>> {
        let (constructor, base_class) = {
            let registry = self.script_classes.borrow();
            let descriptor = registry.classes.get(class_name).ok_or_else(|| BridgeError::UnknownScriptClass {
                name: class_name.to_string(),
            })?;
            (descriptor.constructor.clone(), descriptor.record.base_class.clone())
        };

        if let Some(id) = object {
            let host = self.objects.get(id).ok_or(BridgeError::NullObject { id })?;
            if !self.classes.is_parent_class(host.class_name(), &base_class) {
                return Err(BridgeError::IncompatibleObject {
                    id,
                    class_name: host.class_name().to_string(),
                    script_class: class_name.to_string(),
                    base: base_class,
                });
            }
        }

        let glue = self.glue().ok_or(BridgeError::ShutDown)?;
        let constructor = constructor.restore(ctx)?;
        self.pending_target.set(object);
        let constructed = glue.construct(ctx, &constructor);
        self.pending_target.set(None);
        let instance = constructed.map_err(|err| BridgeError::from_engine(ctx, err))?;

        let not_native = || BridgeError::NotANativeInstance {
            name: class_name.to_string(),
        };
        let wrapper = instance.into_object().ok_or_else(not_native)?;
        let id = wrapper::object_id(ctx, wrapper.as_value()).ok_or_else(not_native)?;
        let host = self.objects.get(id).ok_or(BridgeError::NullObject { id })?;
        host.set_script_class(Some(class_name));
        self.pin(ctx, id, &wrapper);

        info!(class_name, %id, "script instance created");
        Ok(wrapper)
    }

    /// Forgets every script class. Existing instances keep working; the host
    /// can no longer dispatch into them by name.
    pub(crate) fn clear_script_classes(&self) -> usize {
        let removed = self.script_classes.borrow_mut().take_all();
        let count = removed.len();
        drop(removed);
        count
    }
}

/// Explicit string argument; `null` and `undefined` mean "not given".
fn explicit_string<'js>(ctx: &Ctx<'js>, value: Option<Value<'js>>, what: &str) -> rquickjs::Result<Option<String>> {
    let Some(value) = value.filter(|value| !value.is_undefined() && !value.is_null()) else {
        return Ok(None);
    };
    match value.as_string() {
        Some(text) => text.to_string().map(Some),
        None => Err(Exception::throw_type(ctx, &format!("{what} must be a string"))),
    }
}

fn own_string(value: &Value<'_>) -> Option<String> {
    value
        .as_string()
        .and_then(|text| text.to_string().ok())
        .filter(|text| !text.is_empty())
}
