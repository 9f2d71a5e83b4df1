//! Compilation target and device-runtime gating.
//!
//! Passes that only make sense for one backend consult two gates before
//! touching the program: the *current target* (a thread-local stack, pushed
//! by [`Target::enter`] for the duration of a lowering run) and the device
//! registry, which answers whether a runtime for a device family was linked
//! into this process at all.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Cuda,
    Llvm,
}

impl TargetKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Llvm => "llvm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    kind: TargetKind,
}

thread_local! {
    static TARGET_STACK: RefCell<Vec<Target>> = const { RefCell::new(Vec::new()) };
}

impl Target {
    pub fn new(kind: TargetKind) -> Self {
        Self { kind }
    }

    pub fn kind(self) -> TargetKind {
        self.kind
    }

    /// Make this the current target until the returned guard drops.
    pub fn enter(self) -> TargetGuard {
        TARGET_STACK.with(|stack| stack.borrow_mut().push(self));
        TargetGuard { _not_send: PhantomData }
    }

    /// Innermost entered target, if any.
    pub fn current() -> Option<Target> {
        TARGET_STACK.with(|stack| stack.borrow().last().copied())
    }
}

/// Pops the entered target on drop. `!Send`, so the pop happens on the
/// thread that pushed.
pub struct TargetGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Device families a runtime can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Cuda,
}

/// Capability handle for a device runtime.
pub trait DeviceApi: Send + Sync {
    fn kind(&self) -> DeviceKind;
}

static DEVICE_APIS: Lazy<RwLock<HashMap<DeviceKind, Arc<dyn DeviceApi>>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a runtime for its device kind, replacing any previous one.
pub fn register_device_api(api: Arc<dyn DeviceApi>) {
    DEVICE_APIS.write().insert(api.kind(), api);
}

/// Resolve the runtime for `kind`; `None` when none was registered.
pub fn device_api(kind: DeviceKind) -> Option<Arc<dyn DeviceApi>> {
    DEVICE_APIS.read().get(&kind).cloned()
}
