//! Host-facing entry point
//!
//! A [`Bridge`] owns the script runtime and everything the lifetime
//! reconciliation needs. Creating one installs the bridge as the object
//! database's hooks and publishes the host classes to script; dropping it
//! (or calling [`Bridge::uninitialize`]) releases every script handle the
//! bridge holds before the runtime goes away.

use crate::error::{BridgeError, Result};
use crate::glue::Glue;
use crate::invoke;
use crate::marshal;
use crate::runtime::ScriptRuntime;
use crate::state::BridgeState;
use crate::subclass::ScriptClassRecord;
use crate::wrapper;
use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};
use std::rc::{Rc, Weak};
use tether_core::{CallError, ClassDb, ObjectDb, ObjectHooks, ObjectId, Variant};
use tether_services::ScriptSettings;
use tracing::{debug, info};

pub struct Bridge {
    // Dropped first: finalizers run while the runtime shuts down and still
    // need the state.
    runtime: ScriptRuntime,
    state: Rc<BridgeState>,
}

impl Bridge {
    /// Starts the runtime, installs the lifecycle hooks and registers every
    /// host class under the configured namespace.
    pub fn initialize(objects: Rc<ObjectDb>, classes: Rc<ClassDb>, settings: ScriptSettings) -> Result<Self> {
        let runtime = ScriptRuntime::new(&settings)?;
        let context = runtime.context().clone();
        let state = Rc::new_cyclic(|this| BridgeState::new(objects, classes, settings, context, this.clone()));
        let hooks: Weak<BridgeState> = Rc::downgrade(&state);
        state.objects.set_hooks(hooks as Weak<dyn ObjectHooks>);

        state.enter(runtime.context(), |ctx| -> Result<()> {
            let glue = Glue::install(&ctx).map_err(|err| BridgeError::from_engine(&ctx, err))?;
            *state.glue.borrow_mut() = Some(glue.clone());

            let namespace = state
                .register_host_classes(&ctx, &glue)
                .map_err(|err| BridgeError::from_engine(&ctx, err))?;
            let globals = ctx.globals();
            globals.set(state.settings.namespace.as_str(), namespace)?;
            globals.set("print", print_function(&ctx)?)?;
            Ok(())
        })?;

        info!(
            namespace = %state.settings.namespace,
            classes = state.classes.len(),
            singletons = state.classes.singletons().len(),
            "script bridge initialized"
        );
        Ok(Self { runtime, state })
    }

    /// Runs `f` inside the script context. Nested calls, such as a host
    /// method called from script calling back in, reuse the open scope.
    /// Wrappers collected during the outermost call are rescued before it
    /// returns.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R,
    {
        self.state.enter(self.runtime.context(), f)
    }

    /// Wrapper for `id`; `undefined` if the object is gone.
    pub fn wrap<'js>(&self, ctx: &Ctx<'js>, id: ObjectId) -> Result<Value<'js>> {
        self.state
            .wrap(ctx, Some(id))
            .map_err(|err| BridgeError::from_engine(ctx, err))
    }

    /// Live object behind a wrapper value.
    pub fn unwrap<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>) -> Option<ObjectId> {
        wrapper::object_id(ctx, value).filter(|id| self.state.objects.contains(*id))
    }

    pub fn to_variant<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>) -> Variant {
        marshal::to_variant(&self.state, ctx, value)
    }

    pub fn to_value<'js>(&self, ctx: &Ctx<'js>, variant: &Variant) -> Result<Value<'js>> {
        marshal::to_value(&self.state, ctx, variant).map_err(|err| BridgeError::from_engine(ctx, err))
    }

    /// Evaluates a script; uncaught exceptions become [`BridgeError::Exception`].
    pub fn eval_string(&self, source: &str) -> Result<()> {
        self.with(|ctx| {
            ctx.eval::<(), _>(source)
                .map_err(|err| BridgeError::from_engine(&ctx, err))
        })
    }

    /// Like [`Bridge::eval_string`], with the failure rendered as text.
    pub fn safe_eval_text(&self, source: &str) -> std::result::Result<(), String> {
        self.eval_string(source).map_err(|err| match err {
            BridgeError::Exception(message) => message,
            other => other.to_string(),
        })
    }

    /// Instantiates a registered script class. With `object`, the instance
    /// adopts that host object instead of allocating one.
    pub fn create_instance<'js>(&self, ctx: &Ctx<'js>, class_name: &str, object: Option<ObjectId>) -> Result<Object<'js>> {
        self.state.create_instance(ctx, class_name, object)
    }

    /// Calls a script function with `object` as `this`.
    pub fn call_method<'js>(
        &self,
        ctx: &Ctx<'js>,
        object: Option<&Object<'js>>,
        method: Option<&Function<'js>>,
        args: &[Variant],
    ) -> std::result::Result<Variant, CallError> {
        invoke::call(&self.state, ctx, object, method, args)
    }

    /// Calls a method of the script class attached to `id`. Host code
    /// running inside a script call may use this too.
    pub fn invoke_script_method(&self, id: ObjectId, method: &str, args: &[Variant]) -> std::result::Result<Variant, CallError> {
        self.state.invoke_script_method(id, method, args)
    }

    /// Reads a property of the object's script instance. `None` when the
    /// object has no wrapper or the property is undefined.
    pub fn get_instance_property(&self, id: ObjectId, name: &str) -> Option<Variant> {
        self.with(|ctx| {
            let instance = self.state.existing_wrapper(&ctx, id)?;
            let value: Value = instance.get(name).ok()?;
            if value.is_undefined() {
                return None;
            }
            Some(marshal::to_variant(&self.state, &ctx, &value))
        })
    }

    pub fn set_instance_property(&self, id: ObjectId, name: &str, value: &Variant) -> bool {
        self.with(|ctx| {
            let Some(instance) = self.state.existing_wrapper(&ctx, id) else {
                return false;
            };
            marshal::to_value(&self.state, &ctx, value)
                .and_then(|value| instance.set(name, value))
                .is_ok()
        })
    }

    /// Collects garbage, then rescues any wrapper the host still needs.
    pub fn collect_garbage(&self) {
        self.with(|ctx| ctx.run_gc());
    }

    pub fn script_class(&self, class_name: &str) -> Option<ScriptClassRecord> {
        self.state.script_classes.borrow().record(class_name)
    }

    pub fn script_classes(&self) -> Vec<ScriptClassRecord> {
        self.state.script_classes.borrow().records()
    }

    /// Forgets every registered script class; returns how many there were.
    pub fn clear_classes(&self) -> usize {
        self.state.clear_script_classes()
    }

    /// Whether the object currently has a wrapper.
    pub fn is_wrapped(&self, id: ObjectId) -> bool {
        self.state.registry.borrow().has_weak(id)
    }

    /// Whether the object's wrapper is pinned against collection.
    pub fn is_pinned(&self, id: ObjectId) -> bool {
        self.state.registry.borrow().has_strong(id)
    }

    pub fn objects(&self) -> &Rc<ObjectDb> {
        &self.state.objects
    }

    pub fn classes(&self) -> &Rc<ClassDb> {
        &self.state.classes
    }

    pub fn settings(&self) -> &ScriptSettings {
        &self.state.settings
    }

    /// Lifetime counter value; zero when metrics are compiled out.
    pub fn stat(&self, name: &str) -> usize {
        self.state.stats.borrow().get(name)
    }

    pub fn log_stats(&self) {
        let registry = self.state.registry.borrow();
        info!(
            wrappers = registry.weak_len(),
            pinned = registry.strong_len(),
            thunks = self.state.thunks.borrow().len(),
            script_classes = self.state.script_classes.borrow().len(),
            wraps = self.stat("wraps"),
            destroyed = self.stat("destroyed"),
            detached = self.stat("detached"),
            rescued = self.stat("rescued"),
            "script bridge stats"
        );
    }

    /// Shuts the bridge down. Host objects survive; their wrappers do not.
    pub fn uninitialize(self) {}

    fn teardown(&mut self) {
        let state = &self.state;
        state.closing.set(true);

        // Weak entries stay: wrappers finalized while the runtime goes away
        // still release their objects.
        let pins = state.registry.borrow_mut().drain_strong();
        let prototypes: Vec<_> = state.prototypes.borrow_mut().drain().collect();
        let thunks = std::mem::take(&mut *state.thunks.borrow_mut());
        let script_classes = state.script_classes.borrow_mut().take_all();
        let glue = state.glue.borrow_mut().take();
        let context = state.context.borrow_mut().take();
        state.rescues.borrow_mut().clear();
        let released = pins.len();

        drop((pins, prototypes, thunks, script_classes, glue, context));
        self.runtime.run_gc();
        state.objects.clear_hooks();
        debug!(released, "script bridge shut down");
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &Rc<BridgeState> {
        &self.state
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Global `print(...)`: space-joined, logged under the `script` target.
fn print_function<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Function<'js>> {
    Function::new(ctx.clone(), |args: Rest<Coerced<String>>| {
        let line = args.0.into_iter().map(|arg| arg.0).collect::<Vec<_>>().join(" ");
        info!(target: "script", "{line}");
    })
}
