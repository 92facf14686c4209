//! Mirrors the host class database into script
//!
//! Every host class becomes a constructor under the namespace global, with
//! its constants and enums as statics and its methods as thunks on a
//! prototype. Prototypes are linked to their parents in a second pass, once
//! every class has one.

use crate::glue::Glue;
use crate::state::{upgrade, BridgeState};
use crate::wrapper;
use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Exception, Function, Object, Persistent, Value};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tether_core::ClassDescriptor;
use tracing::{debug, warn};

/// Hidden tag naming the host class a prototype belongs to.
pub(crate) const NATIVE_CLASS_KEY: &str = "__native_class__";

impl BridgeState {
    /// Builds the namespace object holding every class, singleton and
    /// global constant.
    pub(crate) fn register_host_classes<'js>(self: &Rc<Self>, ctx: &Ctx<'js>, glue: &Glue) -> rquickjs::Result<Object<'js>> {
        let namespace = Object::new(ctx.clone())?;
        let free = free_function(ctx, Rc::downgrade(self))?;
        let to_string = to_string_function(ctx, Rc::downgrade(self))?;

        for class in self.classes.iter() {
            let proto = Object::new(ctx.clone())?;
            glue.hide(ctx, &proto, NATIVE_CLASS_KEY, class.name())?;
            if class.parent().is_none() {
                proto.set("free", free.clone())?;
                proto.set("toString", to_string.clone())?;
            }
            self.bind_members(ctx, glue, class, &proto)?;

            let construct = self.constructor_hook(ctx, class.name())?;
            let constructor = glue.native_class(ctx, class.name(), &proto, construct)?;
            bind_statics(ctx, class, &constructor)?;

            namespace.set(class.name(), constructor)?;
            self.prototypes
                .borrow_mut()
                .insert(class.name().to_string(), Persistent::save(ctx, proto));
        }

        for class in self.classes.iter() {
            let Some(parent) = class.parent() else {
                continue;
            };
            let proto = self.prototype_for(ctx, class.name())?;
            let parent_proto = self.prototype_for(ctx, parent)?;
            proto.set_prototype(Some(&parent_proto))?;
        }

        for (name, id) in self.classes.singletons() {
            let instance = self.wrap(ctx, Some(*id))?;
            if instance.is_undefined() {
                warn!(singleton = %name, %id, "singleton object is gone; skipped");
                continue;
            }
            namespace.set(name.as_str(), instance)?;
        }

        let mut groups: HashMap<&str, Object<'js>> = HashMap::new();
        for constant in self.classes.global_constants() {
            let value = constant.value as f64;
            namespace.set(constant.name.as_str(), value)?;
            if let Some(enum_name) = constant.enum_name.as_deref() {
                let group = match groups.get(enum_name) {
                    Some(group) => group.clone(),
                    None => {
                        let group = Object::new(ctx.clone())?;
                        groups.insert(enum_name, group.clone());
                        group
                    }
                };
                group.set(constant.name.as_str(), value)?;
            }
        }
        for (enum_name, group) in groups {
            namespace.set(enum_name, group)?;
        }

        let register = self.register_class_function(ctx)?;
        namespace.set("GDCLASS", glue.decorator(ctx, register.clone())?)?;
        namespace.set("register_class", register)?;

        debug!(classes = self.classes.len(), "host classes registered");
        Ok(namespace)
    }

    fn bind_members<'js>(
        self: &Rc<Self>,
        ctx: &Ctx<'js>,
        glue: &Glue,
        class: &ClassDescriptor,
        proto: &Object<'js>,
    ) -> rquickjs::Result<()> {
        for (name, bind) in class.methods() {
            proto.set(name.as_str(), self.thunk(ctx, bind)?)?;
        }

        for (name, property) in class.properties() {
            if property.getter.is_none() && property.setter.is_none() {
                continue;
            }
            let getter = property.getter.as_ref().map(|bind| self.thunk(ctx, bind)).transpose()?;
            let setter = property.setter.as_ref().map(|bind| self.thunk(ctx, bind)).transpose()?;
            glue.accessor(ctx, proto, name, getter, setter)?;
        }
        Ok(())
    }

    /// Native half of a class constructor; receives `new.target.prototype`.
    fn constructor_hook<'js>(self: &Rc<Self>, ctx: &Ctx<'js>, class_name: &str) -> rquickjs::Result<Function<'js>> {
        let state = Rc::downgrade(self);
        let class_name = class_name.to_string();
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Object<'js>> {
                let state = upgrade(&ctx, &state)?;
                let proto = args.0.into_iter().next().and_then(Value::into_object);
                state.construct(&ctx, &class_name, proto)
            },
        )
    }

    /// Adopts the object a host-side instantiation forwarded, or allocates
    /// a new one through the class factory.
    fn construct<'js>(self: &Rc<Self>, ctx: &Ctx<'js>, class_name: &str, proto: Option<Object<'js>>) -> rquickjs::Result<Object<'js>> {
        let proto = match proto {
            Some(proto) => proto,
            None => self.prototype_for(ctx, class_name)?,
        };

        if let Some(id) = self.pending_target.take() {
            return self.wrap_constructed(ctx, id, &proto);
        }

        let id = self
            .classes
            .instantiate(&self.objects, class_name)
            .ok_or_else(|| Exception::throw_type(ctx, &format!("class '{class_name}' cannot be instantiated")))?;
        let instance = self.wrap_constructed(ctx, id, &proto)?;

        // `new` on a script subclass: the fresh object runs that class.
        if let Some(script_class) = self.script_class_of(&proto)? {
            if let Some(object) = self.objects.get(id) {
                object.set_script_class(Some(&script_class));
            }
        }
        Ok(instance)
    }
}

fn bind_statics<'js>(ctx: &Ctx<'js>, class: &ClassDescriptor, constructor: &Object<'js>) -> rquickjs::Result<()> {
    for (name, value) in class.constants() {
        constructor.set(name.as_str(), *value as f64)?;
    }
    for (enum_name, members) in class.enums() {
        let group = Object::new(ctx.clone())?;
        for member in members {
            if let Some(value) = class.constants().get(member) {
                group.set(member.as_str(), *value as f64)?;
            }
        }
        constructor.set(enum_name.as_str(), group)?;
    }
    Ok(())
}

/// `free()`: destroys a plain object and detaches its wrapper.
fn free_function<'js>(ctx: &Ctx<'js>, state: Weak<BridgeState>) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>, _args: Rest<Value<'js>>| -> rquickjs::Result<()> {
            let state = upgrade(&ctx, &state)?;
            let link = wrapper::link(&ctx, &this.0)
                .ok_or_else(|| Exception::throw_type(&ctx, "free() called on a non-native value"))?;
            let Some(id) = link.borrow().id() else {
                return Ok(());
            };
            let Some(object) = state.objects.get(id) else {
                return Ok(());
            };
            if object.is_refcounted() {
                return Err(Exception::throw_type(
                    &ctx,
                    &format!("{} is reference counted and cannot be freed directly", object.class_name()),
                ));
            }

            link.borrow().detach();
            state.forget(id);
            state.objects.free(id);
            debug!(%id, "object freed from script");
            Ok(())
        },
    )
}

fn to_string_function<'js>(ctx: &Ctx<'js>, state: Weak<BridgeState>) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>, _args: Rest<Value<'js>>| -> rquickjs::Result<String> {
            let described = state.upgrade().and_then(|state| {
                let id = wrapper::object_id(&ctx, &this.0)?;
                let object = state.objects.get(id)?;
                Some(format!("[{}:{}]", object.class_name(), id.to_raw()))
            });
            Ok(described.unwrap_or_else(|| "[null]".to_string()))
        },
    )
}
