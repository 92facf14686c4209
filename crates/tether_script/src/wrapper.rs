//! Script wrappers for host objects
//!
//! A wrapper is an instance of the `NativeLink` class. The link payload is
//! the wrapper's hidden native pointer: it lives in the object's class slot
//! rather than in a property, so script enumeration never sees it. The
//! engine dropping the payload is how the bridge learns that a wrapper was
//! collected.

use crate::state::BridgeState;
use rquickjs::class::{Trace, Tracer};
use rquickjs::{Class, Ctx, Exception, FromJs, IntoJs, Object, Value};
use std::cell::Cell;
use std::rc::{Rc, Weak};
use tether_core::{HostObject, ObjectId};
use tether_metrics::metrics;
use tracing::trace;

#[rquickjs::class]
pub struct NativeLink {
    id: Cell<Option<ObjectId>>,
    state: Weak<BridgeState>,
}

impl<'js> Trace<'js> for NativeLink {
    fn trace<'a>(&self, _tracer: Tracer<'a, 'js>) {}
}

impl NativeLink {
    fn new(id: ObjectId, state: &Rc<BridgeState>) -> Self {
        Self {
            id: Cell::new(Some(id)),
            state: Rc::downgrade(state),
        }
    }

    /// `None` once the link has been detached.
    pub fn id(&self) -> Option<ObjectId> {
        self.id.get()
    }

    /// Clears the native pointer. Finalizing a detached wrapper is a no-op.
    pub fn detach(&self) -> Option<ObjectId> {
        self.id.take()
    }
}

impl Drop for NativeLink {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(state) = self.state.upgrade() {
            state.finalize(id);
        }
    }
}

/// The link behind a wrapper value.
pub(crate) fn link<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Option<Class<'js, NativeLink>> {
    if !value.is_object() {
        return None;
    }
    Class::<NativeLink>::from_js(ctx, value.clone()).ok()
}

/// Object id stored in a wrapper, or `None` for non-wrappers and detached
/// wrappers.
pub(crate) fn object_id<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Option<ObjectId> {
    let link = link(ctx, value)?;
    let id = link.borrow().id();
    id
}

impl BridgeState {
    /// Returns the unique wrapper for `id`, creating it on first use. Null
    /// and freed objects map to `undefined`.
    pub(crate) fn wrap<'js>(self: &Rc<Self>, ctx: &Ctx<'js>, id: Option<ObjectId>) -> rquickjs::Result<Value<'js>> {
        let Some(object) = id.and_then(|id| self.objects.get(id)) else {
            return Ok(Value::new_undefined(ctx.clone()));
        };
        if let Some(existing) = self.existing_wrapper(ctx, object.id()) {
            return Ok(existing.into_value());
        }

        let proto = self.instance_prototype(ctx, &object)?;
        let wrapper = self.new_wrapper(ctx, object.id(), &proto)?;
        self.register_wrapper(ctx, &object, &wrapper);
        Ok(wrapper.into_value())
    }

    /// Wrapper for an object being constructed through `new`. The wrapper
    /// takes the prototype of the constructor `new` was applied to, so
    /// script subclasses see their own methods.
    pub(crate) fn wrap_constructed<'js>(
        self: &Rc<Self>,
        ctx: &Ctx<'js>,
        id: ObjectId,
        proto: &Object<'js>,
    ) -> rquickjs::Result<Object<'js>> {
        let object = self
            .objects
            .get(id)
            .ok_or_else(|| Exception::throw_type(ctx, "native object is null"))?;
        if let Some(existing) = self.existing_wrapper(ctx, id) {
            existing.set_prototype(Some(proto))?;
            return Ok(existing);
        }

        let wrapper = self.new_wrapper(ctx, id, proto)?;
        self.register_wrapper(ctx, &object, &wrapper);
        Ok(wrapper)
    }

    pub(crate) fn existing_wrapper<'js>(&self, ctx: &Ctx<'js>, id: ObjectId) -> Option<Object<'js>> {
        let existing = self.registry.borrow().get_weak(ctx, id);
        existing
    }

    pub(crate) fn new_wrapper<'js>(
        self: &Rc<Self>,
        ctx: &Ctx<'js>,
        id: ObjectId,
        proto: &Object<'js>,
    ) -> rquickjs::Result<Object<'js>> {
        let instance = Class::instance(ctx.clone(), NativeLink::new(id, self))?;
        let wrapper = instance
            .into_js(ctx)?
            .into_object()
            .ok_or_else(|| rquickjs::Error::new_from_js("value", "object"))?;
        wrapper.set_prototype(Some(proto))?;

        trace!(%id, "wrapper created");
        metrics! {
            self.stats.borrow_mut().increment("wraps", 1);
        }
        Ok(wrapper)
    }

    /// Reference-counted objects are owned by the script side through the
    /// weak pool; everything else is pinned for as long as it lives.
    fn register_wrapper<'js>(&self, ctx: &Ctx<'js>, object: &HostObject, wrapper: &Object<'js>) {
        if object.is_refcounted() {
            self.registry.borrow_mut().set_weak(object.id(), wrapper);
        } else {
            self.pin(ctx, object.id(), wrapper);
        }
    }

    /// Prototype a fresh wrapper of `object` should carry: the attached
    /// script class if there is one, else the nearest registered host class.
    pub(crate) fn instance_prototype<'js>(&self, ctx: &Ctx<'js>, object: &HostObject) -> rquickjs::Result<Object<'js>> {
        if let Some(proto) = object
            .script_class()
            .and_then(|class_name| self.script_prototype(ctx, &class_name))
        {
            return Ok(proto);
        }
        self.prototype_for(ctx, object.class_name())
    }

    pub(crate) fn prototype_for<'js>(&self, ctx: &Ctx<'js>, class_name: &str) -> rquickjs::Result<Object<'js>> {
        let mut current = Some(class_name);
        while let Some(name) = current {
            let proto = self.prototypes.borrow().get(name).cloned();
            if let Some(proto) = proto {
                return proto.restore(ctx);
            }
            current = self.classes.get(name).and_then(|class| class.parent());
        }
        Err(Exception::throw_type(
            ctx,
            &format!("no prototype registered for class '{class_name}'"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::fixture;
    use rquickjs::Value;
    use tether_core::ObjectId;

    #[test]
    fn wrapping_is_idempotent() {
        let fixture = fixture();
        let node = fixture.classes.instantiate(&fixture.objects, "Node").unwrap();

        fixture.bridge.with(|ctx| {
            let first = fixture.bridge.wrap(&ctx, node).unwrap();
            let second = fixture.bridge.wrap(&ctx, node).unwrap();
            assert_eq!(fixture.bridge.unwrap(&ctx, &first), Some(node));
            ctx.globals().set("first", first).unwrap();
            ctx.globals().set("second", second).unwrap();
            assert!(ctx.eval::<bool, _>("first === second").unwrap());
        });
        assert!(fixture.bridge.is_pinned(node));
    }

    #[test]
    fn repeated_wraps_release_their_references_at_shutdown() {
        let fixture = fixture();
        let resource = fixture.classes.instantiate(&fixture.objects, "Resource").unwrap();

        fixture.bridge.with(|ctx| {
            let first = fixture.bridge.wrap(&ctx, resource).unwrap();
            let second = fixture.bridge.wrap(&ctx, resource).unwrap();
            assert_eq!(first, second);
            ctx.globals().set("kept", first).unwrap();
        });
        assert!(fixture.bridge.is_wrapped(resource));
        assert!(!fixture.bridge.is_pinned(resource));
        assert_eq!(fixture.bridge.get_instance_property(resource, "missing"), None);

        // Only script holds the resource, so it goes with the runtime.
        let crate::test_support::Fixture { objects, bridge, .. } = fixture;
        bridge.uninitialize();
        assert!(!objects.contains(resource));
    }

    #[test]
    fn null_objects_wrap_to_undefined() {
        let fixture = fixture();
        let node = fixture.classes.instantiate(&fixture.objects, "Node").unwrap();
        fixture.objects.free(node);

        fixture.bridge.with(|ctx| {
            assert!(fixture.bridge.wrap(&ctx, node).unwrap().is_undefined());
            assert!(fixture.bridge.wrap(&ctx, ObjectId::from_raw(9999)).unwrap().is_undefined());
        });
    }

    #[test]
    fn wrapper_prototype_follows_host_class() {
        let fixture = fixture();
        let resource = fixture.classes.instantiate(&fixture.objects, "Resource").unwrap();

        fixture.bridge.with(|ctx| {
            let wrapper = fixture.bridge.wrap(&ctx, resource).unwrap();
            ctx.globals().set("res", wrapper).unwrap();
            let checks: Vec<bool> = ctx
                .eval(
                    r#"[
                        res instanceof godot.Resource,
                        res instanceof godot.Reference,
                        res instanceof godot.Object,
                        !(res instanceof godot.Node),
                        Object.keys(res).length === 0,
                    ]"#,
                )
                .unwrap();
            assert!(checks.into_iter().all(|ok| ok));
        });
        assert!(fixture.bridge.is_wrapped(resource));
        assert!(!fixture.bridge.is_pinned(resource));
    }

    #[test]
    fn non_wrappers_do_not_unwrap() {
        let fixture = fixture();
        fixture.bridge.with(|ctx| {
            let plain: Value = ctx.eval("({ id: 1 })").unwrap();
            assert_eq!(fixture.bridge.unwrap(&ctx, &plain), None);
            let number: Value = ctx.eval("42").unwrap();
            assert_eq!(fixture.bridge.unwrap(&ctx, &number), None);
        });
    }
}
