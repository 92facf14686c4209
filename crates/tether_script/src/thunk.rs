//! Script-callable thunks for host methods
//!
//! A thunk is built once per method descriptor and shared by every class
//! and wrapper exposing that method. Virtual methods all share a single
//! thunk: a script override shadows it on the prototype chain, so reaching
//! the thunk means there is nothing to run.

use crate::marshal;
use crate::state::{upgrade, BridgeState};
use crate::wrapper;
use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Exception, Function, Persistent, Value};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tether_core::{CallError, MethodBind, Variant};
use tether_metrics::metrics;
use tracing::{trace, warn};

/// Identity of a method descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MethodKey(usize);

impl MethodKey {
    fn of(bind: &Rc<MethodBind>) -> Self {
        Self(Rc::as_ptr(bind) as usize)
    }
}

/// Append-only map from method descriptor to its thunk.
#[derive(Default)]
pub(crate) struct MethodThunkCache {
    thunks: HashMap<MethodKey, Persistent<Function<'static>>>,
    shared_virtual: Option<Persistent<Function<'static>>>,
}

impl MethodThunkCache {
    pub fn len(&self) -> usize {
        self.thunks.len()
    }

    fn contains<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>) -> bool {
        self.thunks
            .values()
            .chain(self.shared_virtual.iter())
            .filter_map(|thunk| thunk.clone().restore(ctx).ok())
            .any(|thunk| thunk.as_value() == value)
    }
}

impl BridgeState {
    /// Thunk for `bind`, built on first request.
    pub(crate) fn thunk<'js>(self: &Rc<Self>, ctx: &Ctx<'js>, bind: &Rc<MethodBind>) -> rquickjs::Result<Function<'js>> {
        let key = MethodKey::of(bind);
        let cached = self.thunks.borrow().thunks.get(&key).cloned();
        if let Some(thunk) = cached {
            return thunk.restore(ctx);
        }

        let thunk = if bind.is_virtual() {
            self.virtual_thunk(ctx)?
        } else {
            method_thunk(ctx, Rc::downgrade(self), Rc::clone(bind))?
        };
        self.thunks
            .borrow_mut()
            .thunks
            .entry(key)
            .or_insert_with(|| Persistent::save(ctx, thunk.clone()));

        trace!(method = bind.name(), virtual_method = bind.is_virtual(), "thunk built");
        metrics! {
            self.stats.borrow_mut().increment("thunks", 1);
        }
        Ok(thunk)
    }

    /// Whether `value` is a host method thunk rather than script code.
    pub(crate) fn is_thunk<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>) -> bool {
        self.thunks.borrow().contains(ctx, value)
    }

    fn virtual_thunk<'js>(self: &Rc<Self>, ctx: &Ctx<'js>) -> rquickjs::Result<Function<'js>> {
        let shared = self.thunks.borrow().shared_virtual.clone();
        if let Some(thunk) = shared {
            return thunk.restore(ctx);
        }

        let state = Rc::downgrade(self);
        let thunk = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, this: This<Value<'js>>, _args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let state = upgrade(&ctx, &state)?;
                receiver(&ctx, &state, &this.0, "virtual method")?;
                Ok(Value::new_undefined(ctx))
            },
        )?;
        self.thunks.borrow_mut().shared_virtual = Some(Persistent::save(ctx, thunk.clone()));
        Ok(thunk)
    }

    /// Handles a failed host call: a script error in strict mode, a logged
    /// warning and `undefined` otherwise.
    fn call_failed<'js>(&self, ctx: &Ctx<'js>, method: &str, err: CallError) -> rquickjs::Result<Value<'js>> {
        if self.settings.strict_calls {
            return Err(Exception::throw_type(ctx, &format!("{method}: {err}")));
        }
        warn!(method, error = %err, "host method call failed");
        Ok(Value::new_undefined(ctx.clone()))
    }
}

fn method_thunk<'js>(ctx: &Ctx<'js>, state: Weak<BridgeState>, bind: Rc<MethodBind>) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let state = upgrade(&ctx, &state)?;
            call_host_method(&ctx, &state, &bind, &this.0, args.0)
        },
    )
}

/// Live host object behind `this`.
fn receiver<'js>(
    ctx: &Ctx<'js>,
    state: &BridgeState,
    this: &Value<'js>,
    method: &str,
) -> rquickjs::Result<tether_core::ObjectId> {
    wrapper::object_id(ctx, this)
        .filter(|id| state.objects.contains(*id))
        .ok_or_else(|| Exception::throw_type(ctx, &format!("{method}: instance is null")))
}

fn call_host_method<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    bind: &MethodBind,
    this: &Value<'js>,
    mut args: Vec<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let id = receiver(ctx, state, this, bind.name())?;

    // Extra arguments are dropped, missing ones are left to the method.
    args.truncate(bind.argument_count());
    let variants: Vec<Variant> = args.iter().map(|arg| marshal::to_variant(state, ctx, arg)).collect();

    match bind.call(&state.objects, id, &variants) {
        Ok(result) if bind.has_return() => marshal::to_value(state, ctx, &result),
        Ok(_) => Ok(Value::new_undefined(ctx.clone())),
        Err(err) => state.call_failed(ctx, bind.name(), err),
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{fixture, fixture_with};
    use tether_services::ScriptSettings;

    #[test]
    fn thunks_are_shared_across_classes() {
        let fixture = fixture();
        let shared: bool = fixture.bridge.with(|ctx| {
            ctx.eval(
                r#"
                godot.Node.prototype.get_class === godot.Object.prototype.get_class
                    && !Object.prototype.hasOwnProperty.call(godot.Node.prototype, "get_class")
                    && godot.Node.prototype._ready === godot.Object.prototype._notification
                "#,
            )
            .unwrap()
        });
        assert!(shared);
    }

    #[test]
    fn extra_arguments_are_ignored() {
        let fixture = fixture();
        let (sum, arity): (f64, f64) = fixture.bridge.with(|ctx| {
            let calc: rquickjs::Object = ctx.eval("new godot.Calculator()").unwrap();
            ctx.globals().set("calc", calc).unwrap();
            (
                ctx.eval("calc.add(1, 2, 100, 1000, 10000)").unwrap(),
                ctx.eval("calc.arity(1, 2, 3, 4, 5)").unwrap(),
            )
        });
        assert_eq!(sum, 3.0);
        assert_eq!(arity, 2.0);
    }

    #[test]
    fn methods_without_return_yield_undefined() {
        let fixture = fixture();
        let undefined: bool = fixture.bridge.with(|ctx| {
            ctx.eval(r#"const n = new godot.Node(); n.set_name("x") === undefined && n.get_name() === "x""#)
                .unwrap()
        });
        assert!(undefined);
    }

    #[test]
    fn strict_calls_throw_on_failure() {
        let fixture = fixture_with(ScriptSettings {
            strict_calls: true,
            ..ScriptSettings::default()
        });
        let message: String = fixture.bridge.with(|ctx| {
            ctx.eval(
                r#"
                let message = "";
                try { new godot.Node().set_name(42); } catch (e) { message = String(e); }
                message
                "#,
            )
            .unwrap()
        });
        assert!(message.contains("TypeError"), "{message}");
        assert!(message.contains("set_name"), "{message}");
    }

    #[test]
    fn lenient_calls_return_undefined_on_failure() {
        let fixture = fixture_with(ScriptSettings {
            strict_calls: false,
            ..ScriptSettings::default()
        });
        let undefined: bool = fixture.bridge.with(|ctx| {
            ctx.eval("new godot.Calculator().add('a', 1) === undefined").unwrap()
        });
        assert!(undefined);
    }

    #[test]
    fn detached_receivers_are_rejected() {
        let fixture = fixture();
        let outcome: String = fixture.bridge.with(|ctx| {
            ctx.eval(
                r#"
                const node = new godot.Node();
                const get_name = node.get_name;
                node.free();
                let outcome = "no error";
                try { node.get_name(); } catch (e) { outcome = e instanceof TypeError ? e.message : "wrong"; }
                try { get_name.call({}); } catch (e) { outcome += "|" + (e instanceof TypeError); }
                outcome
                "#,
            )
            .unwrap()
        });
        assert_eq!(outcome, "get_name: instance is null|true");
    }
}
