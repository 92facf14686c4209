//! Host-to-script method invocation

use crate::error::describe_exception;
use crate::marshal;
use crate::state::BridgeState;
use rquickjs::function::Args;
use rquickjs::{Ctx, Function, Object, Value};
use std::rc::Rc;
use tether_core::{CallError, ObjectId, Variant};

impl BridgeState {
    /// Calls `method` of the script class attached to `id`. Safe to reach
    /// from inside a script call.
    pub(crate) fn invoke_script_method(
        self: &Rc<Self>,
        id: ObjectId,
        method: &str,
        args: &[Variant],
    ) -> Result<Variant, CallError> {
        let object = self.objects.get(id).ok_or(CallError::InstanceIsNull)?;
        let class_name = object.script_class().ok_or(CallError::InvalidMethod)?;
        self.dispatch(|ctx| {
            let function = self.script_method(&ctx, &class_name, method);
            let instance = self.wrap(&ctx, Some(id)).ok().and_then(Value::into_object);
            call(self, &ctx, instance.as_ref(), function.as_ref(), args)
        })
        .unwrap_or(Err(CallError::InstanceIsNull))
    }
}

/// Calls `method` on `object`. Failures come back as [`CallError`]s; a
/// script exception is caught and reported as [`CallError::Script`].
pub(crate) fn call<'js>(
    state: &Rc<BridgeState>,
    ctx: &Ctx<'js>,
    object: Option<&Object<'js>>,
    method: Option<&Function<'js>>,
    args: &[Variant],
) -> Result<Variant, CallError> {
    let object = object.ok_or(CallError::InstanceIsNull)?;
    let method = method.ok_or(CallError::InvalidMethod)?;

    let mut call_args = Args::new(ctx.clone(), args.len());
    call_args.this(object.clone()).map_err(|err| script_error(ctx, err))?;
    for arg in args {
        let value = marshal::to_value(state, ctx, arg).map_err(|err| script_error(ctx, err))?;
        call_args.push_arg(value).map_err(|err| script_error(ctx, err))?;
    }

    let result: Value = method.call_arg(call_args).map_err(|err| script_error(ctx, err))?;
    Ok(marshal::to_variant(state, ctx, &result))
}

fn script_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> CallError {
    if matches!(err, rquickjs::Error::Exception) {
        CallError::Script(describe_exception(&ctx.catch()))
    } else {
        CallError::Script(err.to_string())
    }
}
