//! Environment policy: the closed set of host functions every context gets.
//!
//! The descriptor is fixed. Loading code and scheduling timers are present
//! as globals in every variant but always throw a `TypeError`, so scripts
//! testing for them see the same surface whatever the build.
//!
//! Time is routed through the host on both paths a script can reach it:
//! `Date.now()` and an argument-less `new Date()` / `Date()` read the host's
//! wall clock, and `performance` is replaced by a fresh object whose `now`
//! reads the host's monotonic clock.

use crate::host::{HostCapabilities, InertHost, SystemHost};
use corral_core::{CapabilitySet, FIXED_SEED};
use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Function, Object, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Policy variant, fixed per build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    /// Constant time, fixed seed
    Inert,
    /// Real clocks and host entropy
    HostBacked,
}

impl Variant {
    /// The variant this build was compiled for
    pub const BUILD: Variant = if cfg!(feature = "host-backed") {
        Variant::HostBacked
    } else {
        Variant::Inert
    };

    /// Short name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Inert => "inert",
            Self::HostBacked => "host-backed",
        }
    }

    /// `TypeError` message thrown by a disabled global, `None` for
    /// globals that are never disabled
    #[must_use]
    pub fn disabled_message(self, global: GlobalFn) -> Option<&'static str> {
        match (self, global) {
            (Self::Inert, GlobalFn::Load | GlobalFn::SetTimeout | GlobalFn::ClearTimeout) => {
                Some("disabled")
            }
            (Self::HostBacked, GlobalFn::Load) => Some("load() not available"),
            (Self::HostBacked, GlobalFn::SetTimeout) => {
                Some("setTimeout() not available - no async support")
            }
            (Self::HostBacked, GlobalFn::ClearTimeout) => {
                Some("clearTimeout() not available - no async support")
            }
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of the policy descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalFn {
    /// `print(...)`: discards its arguments
    Print,
    /// `gc()`: runs a collection pass
    Gc,
    /// `Date.now()`: current time
    DateNow,
    /// `performance.now()`: high-resolution time
    PerformanceNow,
    /// `load(path)`: dynamic loading, always disabled
    Load,
    /// `setTimeout(f, ms)`: always disabled
    SetTimeout,
    /// `clearTimeout(id)`: always disabled
    ClearTimeout,
}

impl GlobalFn {
    /// The full descriptor, in install order
    pub const ALL: [GlobalFn; 7] = [
        GlobalFn::Print,
        GlobalFn::Gc,
        GlobalFn::DateNow,
        GlobalFn::PerformanceNow,
        GlobalFn::Load,
        GlobalFn::SetTimeout,
        GlobalFn::ClearTimeout,
    ];

    /// Property name of the function
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Gc => "gc",
            Self::DateNow | Self::PerformanceNow => "now",
            Self::Load => "load",
            Self::SetTimeout => "setTimeout",
            Self::ClearTimeout => "clearTimeout",
        }
    }

    /// Global object the function hangs off, `None` for plain globals
    #[must_use]
    pub fn owner(self) -> Option<&'static str> {
        match self {
            Self::DateNow => Some("Date"),
            Self::PerformanceNow => Some("performance"),
            _ => None,
        }
    }

    /// Script-visible path, e.g. `performance.now`
    #[must_use]
    pub fn path(self) -> String {
        match self.owner() {
            Some(owner) => format!("{owner}.{}", self.name()),
            None => self.name().to_string(),
        }
    }
}

/// Replaces the `Date` constructor so that reading "now" goes through the
/// host. Explicit arguments still reach the native constructor, and the
/// static methods and prototype are shared with it.
const DATE_WRAPPER: &str = r"(function (NativeDate, now) {
    function Date() {
        if (!new.target) {
            return new NativeDate(now()).toString();
        }
        if (arguments.length === 0) {
            return Reflect.construct(NativeDate, [now()], new.target);
        }
        return Reflect.construct(NativeDate, Array.prototype.slice.call(arguments), new.target);
    }
    Object.setPrototypeOf(Date, NativeDate);
    Object.defineProperty(Date, 'prototype', { value: NativeDate.prototype });
    Object.defineProperty(Date, 'length', { value: 7, configurable: true });
    Object.defineProperty(Date, 'now', { value: now, writable: true, configurable: true });
    Object.defineProperty(NativeDate.prototype, 'constructor', {
        value: Date,
        writable: true,
        configurable: true,
    });
    return Date;
})";

/// Environment policy descriptor bound into every new context
#[derive(Clone)]
pub struct EnvironmentPolicy {
    variant: Variant,
    host: Rc<dyn HostCapabilities>,
}

impl EnvironmentPolicy {
    /// Inert policy: time reads 0, seed is fixed
    #[must_use]
    pub fn inert() -> Self {
        Self::with_host(Variant::Inert, InertHost)
    }

    /// Host-backed policy over the process's clocks and entropy
    #[must_use]
    pub fn host_backed() -> Self {
        Self::with_host(Variant::HostBacked, SystemHost)
    }

    /// The policy this build was compiled for
    #[must_use]
    pub fn for_build() -> Self {
        match Variant::BUILD {
            Variant::Inert => Self::inert(),
            Variant::HostBacked => Self::host_backed(),
        }
    }

    /// Policy over a caller-supplied host
    #[must_use]
    pub fn with_host(variant: Variant, host: impl HostCapabilities + 'static) -> Self {
        Self {
            variant,
            host: Rc::new(host),
        }
    }

    /// Policy variant
    #[must_use]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Capabilities the host exposes through this policy
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        self.host.capabilities()
    }

    /// PRNG seed for a new context, falling back to the fixed seed when
    /// the host has no entropy
    #[must_use]
    pub fn seed(&self) -> u64 {
        match self.host.read_entropy() {
            Ok(seed) => seed,
            Err(err) => {
                tracing::warn!(error = %err, "host entropy unavailable, using fixed seed");
                FIXED_SEED
            }
        }
    }

    /// Bind every descriptor entry into `ctx`'s global namespace
    pub(crate) fn install<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        let globals = ctx.globals();
        for global in GlobalFn::ALL {
            let function = self.function(ctx, global)?;
            match global {
                GlobalFn::DateNow => {
                    let wrap: Function<'js> = ctx.eval(DATE_WRAPPER)?;
                    let native: Value<'js> = globals.get("Date")?;
                    let date: Function<'js> = wrap.call((native, function))?;
                    globals.set("Date", date)?;
                }
                GlobalFn::PerformanceNow => {
                    // the built-in object's `now` is read-only
                    let performance = Object::new(ctx.clone())?;
                    performance.set(global.name(), function)?;
                    globals.set("performance", performance)?;
                }
                _ => globals.set(global.name(), function)?,
            }
        }
        Ok(())
    }

    fn function<'js>(&self, ctx: &Ctx<'js>, global: GlobalFn) -> rquickjs::Result<Function<'js>> {
        match global {
            GlobalFn::Print => Function::new(ctx.clone(), |_args: Rest<Value<'js>>| {}),
            GlobalFn::Gc => Function::new(ctx.clone(), |ctx: Ctx<'js>| ctx.run_gc()),
            GlobalFn::DateNow => {
                let host = Rc::clone(&self.host);
                Function::new(ctx.clone(), move || host.read_wall_clock())
            }
            GlobalFn::PerformanceNow => {
                let host = Rc::clone(&self.host);
                Function::new(ctx.clone(), move || host.read_monotonic_clock())
            }
            GlobalFn::Load | GlobalFn::SetTimeout | GlobalFn::ClearTimeout => {
                let message = self.variant.disabled_message(global).unwrap_or("disabled");
                Function::new(
                    ctx.clone(),
                    move |ctx: Ctx<'js>, _args: Rest<Value<'js>>| -> rquickjs::Result<()> {
                        Err(Exception::throw_type(&ctx, message))
                    },
                )
            }
        }
    }
}

impl Default for EnvironmentPolicy {
    fn default() -> Self {
        Self::for_build()
    }
}

impl fmt::Debug for EnvironmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentPolicy")
            .field("variant", &self.variant)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
