//! Script-side helpers driven from Rust
//!
//! Constructors that honour `new.target`, property descriptors and own
//! property scans read more directly in script than through engine calls,
//! so they are evaluated once at startup and called through this handle.

use rquickjs::{Ctx, Function, IntoJs, Object, Persistent, Value};

const GLUE_SOURCE: &str = r#"
(function () {
    'use strict';
    return {
        hide(target, key, value) {
            Object.defineProperty(target, key, {
                value: value, enumerable: false, writable: true, configurable: true,
            });
        },
        own(target, key) {
            const desc = Object.getOwnPropertyDescriptor(target, key);
            return desc !== undefined && 'value' in desc ? desc.value : undefined;
        },
        accessor(target, key, get, set) {
            Object.defineProperty(target, key, {
                get: get, set: set, enumerable: true, configurable: true,
            });
        },
        nativeClass(name, proto, construct) {
            const holder = {
                [name]: function () {
                    if (new.target === undefined) {
                        throw new TypeError('Class constructor ' + name + " cannot be invoked without 'new'");
                    }
                    return construct(new.target.prototype);
                },
            };
            const ctor = holder[name];
            ctor.prototype = proto;
            Object.defineProperty(proto, 'constructor', {
                value: ctor, enumerable: false, writable: true, configurable: true,
            });
            return ctor;
        },
        ownFunctions(proto) {
            return Object.getOwnPropertyNames(proto).filter(function (key) {
                if (key === 'constructor') {
                    return false;
                }
                const desc = Object.getOwnPropertyDescriptor(proto, key);
                return typeof desc.value === 'function';
            });
        },
        construct(ctor) {
            return new ctor();
        },
        decorator(register) {
            return function (name, icon) {
                return function (ctor) {
                    const hide = function (key, value) {
                        Object.defineProperty(ctor, key, {
                            value: value, enumerable: false, writable: true, configurable: true,
                        });
                    };
                    if (name !== undefined) {
                        hide('cls_name', name);
                    }
                    if (icon !== undefined) {
                        hide('cls_icon', icon);
                    }
                    return register(ctor);
                };
            };
        },
    };
})()
"#;

#[derive(Clone)]
pub(crate) struct Glue(Persistent<Object<'static>>);

impl Glue {
    pub fn install(ctx: &Ctx<'_>) -> rquickjs::Result<Self> {
        let helpers: Object = ctx.eval(GLUE_SOURCE)?;
        Ok(Self(Persistent::save(ctx, helpers)))
    }

    fn helper<'js>(&self, ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Function<'js>> {
        self.0.clone().restore(ctx)?.get(name)
    }

    /// Defines a non-enumerable data property.
    pub fn hide<'js, V: IntoJs<'js>>(&self, ctx: &Ctx<'js>, target: &Object<'js>, key: &str, value: V) -> rquickjs::Result<()> {
        self.helper(ctx, "hide")?.call((target.clone(), key, value))
    }

    /// Own data property of `target`; inherited values and accessors read as
    /// undefined.
    pub fn own<'js>(&self, ctx: &Ctx<'js>, target: &Object<'js>, key: &str) -> rquickjs::Result<Value<'js>> {
        self.helper(ctx, "own")?.call((target.clone(), key))
    }

    pub fn accessor<'js>(
        &self,
        ctx: &Ctx<'js>,
        target: &Object<'js>,
        key: &str,
        get: Option<Function<'js>>,
        set: Option<Function<'js>>,
    ) -> rquickjs::Result<()> {
        self.helper(ctx, "accessor")?.call((target.clone(), key, get, set))
    }

    /// Builds a named constructor around `proto`. Invoked with `new`, it
    /// calls `construct(new.target.prototype)` and returns the result.
    pub fn native_class<'js>(
        &self,
        ctx: &Ctx<'js>,
        name: &str,
        proto: &Object<'js>,
        construct: Function<'js>,
    ) -> rquickjs::Result<Object<'js>> {
        self.helper(ctx, "nativeClass")?.call((name, proto.clone(), construct))
    }

    /// Names of the functions stored as own data properties of `proto`,
    /// `constructor` excluded.
    pub fn own_functions<'js>(&self, ctx: &Ctx<'js>, proto: &Object<'js>) -> rquickjs::Result<Vec<String>> {
        self.helper(ctx, "ownFunctions")?.call((proto.clone(),))
    }

    pub fn construct<'js>(&self, ctx: &Ctx<'js>, constructor: &Object<'js>) -> rquickjs::Result<Value<'js>> {
        self.helper(ctx, "construct")?.call((constructor.clone(),))
    }

    /// `GDCLASS(name, icon)` decorator factory over `register`.
    pub fn decorator<'js>(&self, ctx: &Ctx<'js>, register: Function<'js>) -> rquickjs::Result<Function<'js>> {
        self.helper(ctx, "decorator")?.call((register,))
    }
}
