//! Shared bridge state
//!
//! One `BridgeState` lives behind an `Rc` for the bridge's lifetime. Script
//! callbacks and wrapper finalizers hold it weakly and simply stop doing
//! work once the bridge is gone.
//!
//! Calls nest: script calls a host method, the host method dispatches back
//! into script through the object database, and so on. The outermost scope
//! holds the runtime lock; nested scopes reuse its context instead of
//! locking again.

use crate::glue::Glue;
use crate::registry::WrapperRegistry;
use crate::subclass::ScriptClassRegistry;
use crate::thunk::MethodThunkCache;
use rquickjs::{qjs, Context, Ctx, Exception, Object, Persistent};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};
use tether_core::{ClassDb, ObjectDb, ObjectId};
use tether_metrics::Counter;
use tether_services::ScriptSettings;

pub(crate) struct BridgeState {
    pub objects: Rc<ObjectDb>,
    pub classes: Rc<ClassDb>,
    pub settings: ScriptSettings,
    pub registry: RefCell<WrapperRegistry>,
    pub thunks: RefCell<MethodThunkCache>,
    /// Prototype of every host class, by class name.
    pub prototypes: RefCell<HashMap<String, Persistent<Object<'static>>>>,
    pub script_classes: RefCell<ScriptClassRegistry>,
    pub glue: RefCell<Option<Glue>>,
    /// Object the next native constructor call adopts instead of allocating.
    pub pending_target: Cell<Option<ObjectId>>,
    /// Objects whose wrapper was collected while the host still needs one.
    pub rescues: RefCell<Vec<ObjectId>>,
    pub closing: Cell<bool>,
    pub stats: RefCell<Counter>,
    /// Entry point for host-initiated dispatch; released at shutdown.
    pub context: RefCell<Option<Context>>,
    /// Context of the scope currently holding the runtime lock.
    active: Cell<Option<NonNull<qjs::JSContext>>>,
    /// Handle for hooks, which only see `&self`.
    this: Weak<BridgeState>,
}

impl BridgeState {
    pub fn new(
        objects: Rc<ObjectDb>,
        classes: Rc<ClassDb>,
        settings: ScriptSettings,
        context: Context,
        this: Weak<BridgeState>,
    ) -> Self {
        Self {
            objects,
            classes,
            settings,
            registry: RefCell::new(WrapperRegistry::new()),
            thunks: RefCell::new(MethodThunkCache::default()),
            prototypes: RefCell::new(HashMap::new()),
            script_classes: RefCell::new(ScriptClassRegistry::default()),
            glue: RefCell::new(None),
            pending_target: Cell::new(None),
            rescues: RefCell::new(Vec::new()),
            closing: Cell::new(false),
            stats: RefCell::new(Counter::new()),
            context: RefCell::new(Some(context)),
            active: Cell::new(None),
            this,
        }
    }

    pub fn this(&self) -> Option<Rc<BridgeState>> {
        self.this.upgrade()
    }

    /// Runs `f` in the active scope, or opens one on `context`. Leaving the
    /// outermost scope rescues wrappers collected inside it.
    pub fn enter<F, R>(self: &Rc<Self>, context: &Context, f: F) -> R
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R,
    {
        if let Some(raw) = self.active.get() {
            // SAFETY: the scope that published `raw` is further up this
            // stack and still holds the runtime lock.
            let ctx = unsafe { Ctx::from_raw(raw) };
            return f(ctx);
        }

        context.with(|ctx| {
            let scope = ActiveScope::open(self, &ctx);
            let result = f(ctx.clone());
            self.process_rescues(&ctx);
            drop(scope);
            result
        })
    }

    /// Like [`BridgeState::enter`] on the bridge's own context. `None` once
    /// the bridge has shut down.
    pub fn dispatch<F, R>(self: &Rc<Self>, f: F) -> Option<R>
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R,
    {
        let context = self.context.borrow().clone()?;
        Some(self.enter(&context, f))
    }

    pub fn glue(&self) -> Option<Glue> {
        self.glue.borrow().clone()
    }

    /// Glue for code running inside a script call.
    pub fn glue_or_throw(&self, ctx: &Ctx<'_>) -> rquickjs::Result<Glue> {
        self.glue().ok_or_else(|| Exception::throw_type(ctx, "script bridge has shut down"))
    }
}

/// Publishes the scope's context until dropped, unwinding included.
struct ActiveScope<'a>(&'a BridgeState);

impl<'a> ActiveScope<'a> {
    fn open(state: &'a BridgeState, ctx: &Ctx<'_>) -> Self {
        state.active.set(Some(ctx.as_raw()));
        Self(state)
    }
}

impl Drop for ActiveScope<'_> {
    fn drop(&mut self) {
        self.0.active.set(None);
    }
}

/// Resolves a callback's weak state handle, throwing once the bridge is
/// shutting down.
pub(crate) fn upgrade(ctx: &Ctx<'_>, state: &Weak<BridgeState>) -> rquickjs::Result<Rc<BridgeState>> {
    state
        .upgrade()
        .filter(|state| !state.closing.get())
        .ok_or_else(|| Exception::throw_type(ctx, "script bridge has shut down"))
}
