//! Execution contexts and the thread-local "current context".
//!
//! A context is bound to one device and is created with explicit scheduling
//! flags. Each thread has at most one current context, kept in a
//! `thread_local!` slot that this module mirrors into the vendor driver on
//! every change. Creating a context makes it current on the creating thread,
//! like `cuCtxCreate` and `hipCtxCreate` do.
//!
//! Lifecycle per context:
//!
//! ```text
//! Uninitialized -> Created -> { Current, NotCurrent } -> Destroyed
//! ```
//!
//! `Destroyed` is terminal. Setting a destroyed context current, destroying
//! it twice, destroying it while another thread has it current, or while
//! handles created against it are alive, all fail with
//! [`ErrorKind::InvalidState`].

use crate::device::Device;
use crate::driver::{Driver, RawContext};
use crate::error::{Error, ErrorKind, Result};
use crate::platform::Platform;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Scheduling policy used by the driver while the host waits on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SchedPolicy {
    /// Let the driver choose between spinning and yielding.
    #[default]
    Auto,
    /// Busy-wait on the host thread.
    Spin,
    /// Yield the host thread while waiting.
    Yield,
    /// Block the host thread on a synchronization primitive.
    BlockingSync,
}

impl SchedPolicy {
    /// Every recognized policy.
    pub const ALL: [SchedPolicy; 4] = [
        SchedPolicy::Auto,
        SchedPolicy::Spin,
        SchedPolicy::Yield,
        SchedPolicy::BlockingSync,
    ];
}

/// Flags passed to [`ctx_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CtxFlags {
    /// Host scheduling policy.
    pub sched: SchedPolicy,
    /// Allow mapping pinned host memory into the device address space.
    pub map_host: bool,
    /// Keep local memory at its maximum size after a resize.
    pub lmem_resize_to_max: bool,
}

impl CtxFlags {
    /// Automatic scheduling.
    pub const SCHED_AUTO: Self = Self::new(SchedPolicy::Auto);
    /// Spin-wait scheduling.
    pub const SCHED_SPIN: Self = Self::new(SchedPolicy::Spin);
    /// Yield scheduling.
    pub const SCHED_YIELD: Self = Self::new(SchedPolicy::Yield);
    /// Blocking-sync scheduling.
    pub const SCHED_BLOCKING_SYNC: Self = Self::new(SchedPolicy::BlockingSync);

    /// Flags with the given policy and no other options.
    pub const fn new(sched: SchedPolicy) -> Self {
        Self {
            sched,
            map_host: false,
            lmem_resize_to_max: false,
        }
    }

    /// Sets the map-host option.
    #[must_use]
    pub const fn with_map_host(mut self, enabled: bool) -> Self {
        self.map_host = enabled;
        self
    }

    /// Sets the local-memory resize option.
    ///
    /// On ROCm the native value (`hipDeviceLmemResizeToMax`, 0x16) overlaps
    /// the yield and blocking-sync scheduling bits, so HIP cannot tell it
    /// apart from a scheduling request. Combined with any policy other than
    /// [`SchedPolicy::Auto`] the encoded mask names contradictory policies;
    /// it is passed through exactly as a C caller would produce it.
    #[must_use]
    pub const fn with_lmem_resize_to_max(mut self, enabled: bool) -> Self {
        self.lmem_resize_to_max = enabled;
        self
    }
}

/// State of a context as seen from the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Current on the calling thread.
    Current,
    /// Alive but not current on the calling thread.
    NotCurrent,
    /// Destroyed; no operation on it is legal anymore.
    Destroyed,
}

#[derive(Debug, Default)]
struct Lifecycle {
    destroyed: bool,
    /// Number of threads whose current slot holds this context.
    current_threads: usize,
    live_handles: usize,
}

struct ContextInner {
    id: u64,
    raw: RawContext,
    device: Device,
    flags: CtxFlags,
    lifecycle: Mutex<Lifecycle>,
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Non-owning reference to a context.
///
/// Cloning is cheap. Equality is identity: two `Context` values are equal
/// when they refer to the same vendor context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    fn new(raw: RawContext, device: Device, flags: CtxFlags) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                raw,
                device,
                flags,
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        }
    }

    /// Process-unique id, stable for the life of the context.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Platform of the owning device.
    pub fn platform(&self) -> Platform {
        self.inner.device.platform()
    }

    /// Device the context is bound to.
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// Flags the context was created with.
    pub fn flags(&self) -> CtxFlags {
        self.inner.flags
    }

    /// Vendor context pointer.
    pub fn as_raw(&self) -> RawContext {
        self.inner.raw
    }

    /// Whether this context is current on the calling thread.
    pub fn is_current(&self) -> bool {
        current().as_ref() == Some(self)
    }

    /// Whether the context has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.lifecycle.lock().destroyed
    }

    /// Number of live handles created against this context.
    pub fn live_handles(&self) -> usize {
        self.inner.lifecycle.lock().live_handles
    }

    /// Lifecycle state from the calling thread's point of view.
    pub fn state(&self) -> ContextState {
        if self.is_destroyed() {
            ContextState::Destroyed
        } else if self.is_current() {
            ContextState::Current
        } else {
            ContextState::NotCurrent
        }
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        self.inner.device.driver()
    }

    /// Registers a handle against this context.
    pub(crate) fn retain_handle(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.destroyed {
            return Err(self.destroyed_error());
        }
        lifecycle.live_handles += 1;
        Ok(())
    }

    pub(crate) fn release_handle(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        lifecycle.live_handles = lifecycle.live_handles.saturating_sub(1);
    }

    fn destroyed_error(&self) -> Error {
        Error::invalid_state(format!("context {} has been destroyed", self.id())).on(self.platform())
    }

    fn destroy(&self) -> Result<()> {
        let current_here = self.is_current();
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.destroyed {
                return Err(self.destroyed_error());
            }
            if lifecycle.live_handles > 0 {
                return Err(Error::invalid_state(format!(
                    "context {} still has {} live handle(s)",
                    self.id(),
                    lifecycle.live_handles
                ))
                .on(self.platform()));
            }
            let elsewhere = lifecycle.current_threads - usize::from(current_here);
            if elsewhere > 0 {
                return Err(Error::invalid_state(format!(
                    "context {} is current on {elsewhere} other thread(s)",
                    self.id()
                ))
                .on(self.platform()));
            }
            lifecycle.destroyed = true;
        }

        if current_here {
            if let Err(err) = install(None) {
                self.inner.lifecycle.lock().destroyed = false;
                return Err(err);
            }
        }

        if let Err(status) = self.driver().ctx_destroy(self.inner.raw) {
            self.inner.lifecycle.lock().destroyed = false;
            // Still alive, so it goes back to being current.
            if current_here {
                if let Err(err) = install(Some(self)) {
                    warn!(context = self.id(), error = %err, "failed to make context current again");
                }
            }
            return Err(Error::from_status(
                status,
                ErrorKind::InvalidState,
                format!("failed to destroy context {}", self.id()),
            )
            .on(self.platform()));
        }

        debug!(platform = %self.platform(), context = self.id(), "destroyed context");
        Ok(())
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("platform", &self.platform())
            .field("device", &self.inner.device.ordinal())
            .field("flags", &self.inner.flags)
            .finish()
    }
}

/// The creator's owning reference to a context.
///
/// Dropping it destroys the context. Use [`OwningContext::destroy`] to see
/// the outcome; `Drop` can only log a failure.
#[derive(Debug)]
pub struct OwningContext {
    context: Context,
}

impl OwningContext {
    /// Non-owning reference to the same context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Destroys the context.
    ///
    /// If the context is current on the calling thread that slot is cleared
    /// first. On failure the context stays alive and usable.
    pub fn destroy(&mut self) -> Result<()> {
        self.context.destroy()
    }
}

impl Deref for OwningContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.context
    }
}

impl Drop for OwningContext {
    fn drop(&mut self) {
        if self.context.is_destroyed() {
            return;
        }
        if let Err(err) = self.context.destroy() {
            warn!(
                platform = %self.context.platform(),
                context = self.context.id(),
                error = %err,
                "leaking context that could not be destroyed"
            );
        }
    }
}

/// Proof that a context was current on this thread when it was obtained.
///
/// Tied to the thread it was produced on (`!Send`). Operations taking a
/// `CurrentContext` re-check that its context is still the current one.
pub struct CurrentContext {
    context: Context,
    _thread_bound: PhantomData<*const ()>,
}

impl CurrentContext {
    fn new(context: Context) -> Self {
        Self {
            context,
            _thread_bound: PhantomData,
        }
    }

    /// The context this token refers to.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Platform of the context.
    pub fn platform(&self) -> Platform {
        self.context.platform()
    }

    /// Blocks until all work queued on the context has completed.
    pub fn synchronize(&self) -> Result<()> {
        self.ensure_current()?;
        self.context.driver().ctx_synchronize().map_err(|status| {
            Error::from_status(status, ErrorKind::InvalidState, "context synchronize failed")
                .on(self.platform())
        })
    }

    /// Fails unless the token's context is still current on this thread.
    pub(crate) fn ensure_current(&self) -> Result<()> {
        match current() {
            None => Err(Error::no_current_context().on(self.platform())),
            Some(ctx) if ctx == self.context => Ok(()),
            Some(ctx) => Err(Error::invalid_state(format!(
                "context {} is no longer current (context {} is)",
                self.context.id(),
                ctx.id()
            ))
            .on(self.platform())),
        }
    }
}

impl fmt::Debug for CurrentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CurrentContext").field(&self.context).finish()
    }
}

/// Guard returned by [`ctx_scope`]; restores the previous current context on
/// drop.
#[derive(Debug)]
pub struct ScopedCurrent {
    current: CurrentContext,
    previous: Option<Context>,
}

impl Deref for ScopedCurrent {
    type Target = CurrentContext;

    fn deref(&self) -> &CurrentContext {
        &self.current
    }
}

impl Drop for ScopedCurrent {
    fn drop(&mut self) {
        let restore = self.previous.take().filter(|ctx| !ctx.is_destroyed());
        if let Err(err) = install(restore.as_ref()) {
            warn!(error = %err, "failed to restore previous current context");
        }
    }
}

struct CurrentSlot(Option<Context>);

impl Drop for CurrentSlot {
    // Thread exit: the context stays alive but is no longer current anywhere
    // on this thread.
    fn drop(&mut self) {
        if let Some(ctx) = self.0.take() {
            let mut lifecycle = ctx.inner.lifecycle.lock();
            lifecycle.current_threads = lifecycle.current_threads.saturating_sub(1);
        }
    }
}

thread_local! {
    static CURRENT: RefCell<CurrentSlot> = const { RefCell::new(CurrentSlot(None)) };
}

fn current() -> Option<Context> {
    CURRENT.with(|slot| slot.borrow().0.clone())
}

fn replace_slot(ctx: Option<Context>) -> Option<Context> {
    CURRENT.with(|slot| std::mem::replace(&mut slot.borrow_mut().0, ctx))
}

fn set_current_error(ctx: &Context, status: crate::error::BackendStatus) -> Error {
    Error::from_status(
        status,
        ErrorKind::InvalidState,
        format!("failed to make context {} current", ctx.id()),
    )
    .on(ctx.platform())
}

/// Rebinds `prev` in its driver after a failed switch. If that fails too the
/// thread-local slot is cleared, so it never names a context the vendor does
/// not consider current.
fn rebind_or_forget(prev: &Context) {
    let Err(status) = prev.driver().ctx_set_current(Some(prev.inner.raw)) else {
        return;
    };
    warn!(
        platform = %prev.platform(),
        context = prev.id(),
        %status,
        "failed to restore current context, leaving thread without one"
    );
    if let Err(status) = prev.driver().ctx_set_current(None) {
        warn!(platform = %prev.platform(), %status, "failed to unbind context");
    }
    forget_current();
}

/// Empties the thread-local slot without touching any driver.
fn forget_current() {
    if let Some(prev) = replace_slot(None) {
        let mut lifecycle = prev.inner.lifecycle.lock();
        lifecycle.current_threads = lifecycle.current_threads.saturating_sub(1);
    }
}

/// Makes `next` (or nothing) the calling thread's current context, in both
/// the thread-local slot and the vendor driver.
fn install(next: Option<&Context>) -> Result<()> {
    let previous = current();
    if previous.as_ref() == next {
        return Ok(());
    }

    if let Some(next) = next {
        {
            let mut lifecycle = next.inner.lifecycle.lock();
            if lifecycle.destroyed {
                return Err(next.destroyed_error());
            }
            lifecycle.current_threads += 1;
        }

        // A context of another platform must stop being current in its own
        // driver, or the thread would have two.
        if let Some(prev) = previous.as_ref().filter(|p| p.platform() != next.platform()) {
            if let Err(status) = prev.driver().ctx_set_current(None) {
                next.inner.lifecycle.lock().current_threads -= 1;
                return Err(set_current_error(prev, status));
            }
        }

        if let Err(status) = next.driver().ctx_set_current(Some(next.inner.raw)) {
            next.inner.lifecycle.lock().current_threads -= 1;
            // A failed bind leaves `next`'s driver as it was. Only a previous
            // context of another platform was unbound above and needs
            // rebinding.
            if let Some(prev) = previous.as_ref().filter(|p| p.platform() != next.platform()) {
                rebind_or_forget(prev);
            }
            return Err(set_current_error(next, status));
        }
    } else if let Some(prev) = &previous {
        prev.driver()
            .ctx_set_current(None)
            .map_err(|status| set_current_error(prev, status))?;
    }

    if let Some(prev) = replace_slot(next.cloned()) {
        let mut lifecycle = prev.inner.lifecycle.lock();
        lifecycle.current_threads = lifecycle.current_threads.saturating_sub(1);
    }
    Ok(())
}

/// Creates a context on `device` and makes it current on the calling thread.
///
/// Any previously current context stays alive but is no longer current. If
/// the new context cannot be made current it is destroyed again, so a failed
/// call never leaves a half-built context behind.
pub fn ctx_create(flags: CtxFlags, device: &Device) -> Result<OwningContext> {
    let driver = device.driver();
    let raw = driver.ctx_create(flags, device.as_raw()).map_err(|status| {
        Error::from_status(
            status,
            ErrorKind::ContextCreationFailed,
            format!("failed to create context on device {}", device.ordinal()),
        )
        .on(device.platform())
    })?;

    let context = Context::new(raw, device.clone(), flags);
    if let Err(err) = install(Some(&context)) {
        // `install` already restored (or cleared) the previous binding and
        // the driver never bound the new context.
        if let Err(status) = driver.ctx_destroy(raw) {
            warn!(platform = %device.platform(), %status, "failed to destroy context after setup error");
        }
        context.inner.lifecycle.lock().destroyed = true;
        return Err(err);
    }

    debug!(
        platform = %device.platform(),
        device = device.ordinal(),
        context = context.id(),
        ?flags,
        "created context"
    );
    Ok(OwningContext { context })
}

/// Returns the context current on the calling thread.
pub fn ctx_get_current() -> Result<CurrentContext> {
    current()
        .map(CurrentContext::new)
        .ok_or_else(Error::no_current_context)
}

/// Makes `context` current on the calling thread.
pub fn ctx_set_current(context: &Context) -> Result<CurrentContext> {
    install(Some(context))?;
    Ok(CurrentContext::new(context.clone()))
}

/// Leaves the calling thread without a current context.
pub fn ctx_clear_current() -> Result<()> {
    install(None)
}

/// Makes `context` current until the returned guard is dropped, then
/// restores whatever was current before.
pub fn ctx_scope(context: &Context) -> Result<ScopedCurrent> {
    let previous = current();
    let current = ctx_set_current(context)?;
    Ok(ScopedCurrent { current, previous })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device;
    use crate::driver::simulated::{Fault, SimulatedDriver};
    use pretty_assertions::assert_eq;

    fn sim(platform: Platform) -> (Arc<SimulatedDriver>, Device) {
        let sim = Arc::new(SimulatedDriver::builder(platform).devices(2).build());
        sim.init().unwrap();
        let driver: Arc<dyn Driver> = sim.clone();
        let dev = device::device_get(&driver, 0).unwrap();
        (sim, dev)
    }

    #[test]
    fn test_create_makes_current() {
        let (_sim, dev) = sim(Platform::Cuda);
        let ctx = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        let current = ctx_get_current().unwrap();
        assert_eq!(current.context(), ctx.context());
        assert_eq!(ctx.state(), ContextState::Current);
        assert_eq!(ctx.flags(), CtxFlags::SCHED_AUTO);
    }

    #[test]
    fn test_no_current_context_initially() {
        let err = ctx_get_current().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoCurrentContext);
    }

    #[test]
    fn test_destroy_clears_current_slot() {
        let (sim, dev) = sim(Platform::Cuda);
        let mut ctx = ctx_create(CtxFlags::SCHED_SPIN, &dev).unwrap();
        ctx.destroy().unwrap();
        assert_eq!(ctx.state(), ContextState::Destroyed);
        assert_eq!(ctx_get_current().unwrap_err().kind(), ErrorKind::NoCurrentContext);
        assert_eq!(sim.live_contexts(), 0);
        assert_eq!(sim.current_raw(), None);
    }

    #[test]
    fn test_destroyed_context_cannot_become_current() {
        let (_sim, dev) = sim(Platform::Cuda);
        let mut ctx = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        let reference = ctx.context().clone();
        ctx.destroy().unwrap();

        assert_eq!(ctx_set_current(&reference).unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(ctx.destroy().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_set_current_switches_between_contexts() {
        let (sim, dev) = sim(Platform::Cuda);
        let first = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        let second = ctx_create(CtxFlags::SCHED_YIELD, &dev).unwrap();
        assert!(second.is_current());
        assert!(!first.is_current());

        ctx_set_current(&first).unwrap();
        assert!(first.is_current());
        assert_eq!(sim.current_raw(), Some(first.as_raw()));

        ctx_clear_current().unwrap();
        assert_eq!(first.state(), ContextState::NotCurrent);
        assert_eq!(sim.current_raw(), None);
    }

    #[test]
    fn test_scope_restores_previous() {
        let (_sim, dev) = sim(Platform::Cuda);
        let outer = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        let inner = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        ctx_set_current(&outer).unwrap();

        {
            let scope = ctx_scope(&inner).unwrap();
            assert_eq!(scope.context(), inner.context());
            assert!(inner.is_current());
        }
        assert!(outer.is_current());
    }

    #[test]
    fn test_scope_without_previous_clears() {
        let (_sim, dev) = sim(Platform::Cuda);
        let ctx = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        ctx_clear_current().unwrap();
        {
            let _scope = ctx_scope(&ctx).unwrap();
            assert!(ctx.is_current());
        }
        assert!(ctx_get_current().is_err());
    }

    #[test]
    fn test_destroy_fails_while_current_on_other_thread() {
        let (_sim, dev) = sim(Platform::Cuda);
        let mut ctx = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        let shared = ctx.context().clone();

        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let worker = std::thread::spawn(move || {
            ctx_set_current(&shared).unwrap();
            ready_tx.send(()).unwrap();
            done_rx.recv().unwrap();
        });

        ready_rx.recv().unwrap();
        assert_eq!(ctx.destroy().unwrap_err().kind(), ErrorKind::InvalidState);
        done_tx.send(()).unwrap();
        worker.join().unwrap();

        // Thread exit released its slot.
        ctx.destroy().unwrap();
    }

    #[test]
    fn test_threads_have_independent_current_contexts() {
        let (_sim, dev) = sim(Platform::Cuda);
        let main_ctx = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();

        let dev_for_thread = dev.clone();
        let worker_id = std::thread::spawn(move || {
            assert!(ctx_get_current().is_err());
            let ctx = ctx_create(CtxFlags::SCHED_SPIN, &dev_for_thread).unwrap();
            let id = ctx_get_current().unwrap().context().id();
            assert_eq!(id, ctx.id());
            id
        })
        .join()
        .unwrap();

        assert_ne!(worker_id, main_ctx.id());
        assert_eq!(ctx_get_current().unwrap().context(), main_ctx.context());
    }

    #[test]
    fn test_cross_platform_switch_clears_other_driver() {
        let (cuda, cuda_dev) = sim(Platform::Cuda);
        let (rocm, rocm_dev) = sim(Platform::Rocm);

        let cuda_ctx = ctx_create(CtxFlags::SCHED_AUTO, &cuda_dev).unwrap();
        let rocm_ctx = ctx_create(CtxFlags::SCHED_AUTO, &rocm_dev).unwrap();

        assert_eq!(cuda.current_raw(), None);
        assert_eq!(rocm.current_raw(), Some(rocm_ctx.as_raw()));

        ctx_set_current(&cuda_ctx).unwrap();
        assert_eq!(cuda.current_raw(), Some(cuda_ctx.as_raw()));
        assert_eq!(rocm.current_raw(), None);
    }

    #[test]
    fn test_failed_create_leaves_nothing_behind() {
        let sim = Arc::new(
            SimulatedDriver::builder(Platform::Rocm)
                .devices(1)
                .contexts_per_device(1)
                .build(),
        );
        sim.init().unwrap();
        let driver: Arc<dyn Driver> = sim.clone();
        let dev = device::device_get(&driver, 0).unwrap();

        let first = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        let err = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert!(err.status().is_some());

        assert_eq!(sim.live_contexts(), 1);
        assert!(first.is_current());
    }

    #[test]
    fn test_failed_bind_keeps_previous_current() {
        let (sim, dev) = sim(Platform::Cuda);
        let first = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();

        sim.inject(Fault::SetCurrent, true);
        let err = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap_err();
        sim.inject(Fault::SetCurrent, false);

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(sim.live_contexts(), 1);
        assert!(first.is_current());
        assert_eq!(sim.current_raw(), Some(first.as_raw()));
    }

    #[test]
    fn test_failed_cross_platform_bind_restores_previous() {
        let (cuda, cuda_dev) = sim(Platform::Cuda);
        let (rocm, rocm_dev) = sim(Platform::Rocm);
        let cuda_ctx = ctx_create(CtxFlags::SCHED_AUTO, &cuda_dev).unwrap();

        rocm.inject(Fault::SetCurrent, true);
        assert!(ctx_create(CtxFlags::SCHED_AUTO, &rocm_dev).is_err());

        assert_eq!(rocm.live_contexts(), 0);
        assert!(cuda_ctx.is_current());
        assert_eq!(cuda.current_raw(), Some(cuda_ctx.as_raw()));
    }

    #[test]
    fn test_unrestorable_previous_is_no_longer_current() {
        let (cuda, cuda_dev) = sim(Platform::Cuda);
        let (rocm, rocm_dev) = sim(Platform::Rocm);
        let cuda_ctx = ctx_create(CtxFlags::SCHED_AUTO, &cuda_dev).unwrap();

        cuda.inject(Fault::SetCurrent, true);
        rocm.inject(Fault::SetCurrent, true);
        assert!(ctx_create(CtxFlags::SCHED_AUTO, &rocm_dev).is_err());

        // The slot follows the vendor: neither has a current context.
        assert_eq!(ctx_get_current().unwrap_err().kind(), ErrorKind::NoCurrentContext);
        assert_eq!(cuda_ctx.state(), ContextState::NotCurrent);
        assert_eq!(cuda.current_raw(), None);
        assert_eq!(rocm.current_raw(), None);
        assert_eq!(rocm.live_contexts(), 0);
    }

    #[test]
    fn test_failed_destroy_stays_current() {
        let (sim, dev) = sim(Platform::Rocm);
        let mut ctx = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();

        sim.inject(Fault::CtxDestroy, true);
        let err = ctx.destroy().unwrap_err();
        sim.inject(Fault::CtxDestroy, false);

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(ctx.state(), ContextState::Current);
        assert_eq!(sim.current_raw(), Some(ctx.as_raw()));

        ctx.destroy().unwrap();
        assert_eq!(sim.live_contexts(), 0);
    }

    #[test]
    fn test_clear_after_nested_create_unbinds_vendor() {
        let (sim, dev) = sim(Platform::Cuda);
        let _first = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        let _second = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        assert_eq!(sim.stack_depth(), 1);

        ctx_clear_current().unwrap();
        assert_eq!(sim.current_raw(), None);
        assert_eq!(sim.stack_depth(), 0);
    }

    #[test]
    fn test_drop_destroys_context() {
        let (sim, dev) = sim(Platform::Cuda);
        {
            let _ctx = ctx_create(CtxFlags::SCHED_BLOCKING_SYNC, &dev).unwrap();
            assert_eq!(sim.live_contexts(), 1);
        }
        assert_eq!(sim.live_contexts(), 0);
        assert!(ctx_get_current().is_err());
    }

    #[test]
    fn test_synchronize_requires_current() {
        let (_sim, dev) = sim(Platform::Cuda);
        let ctx = ctx_create(CtxFlags::SCHED_AUTO, &dev).unwrap();
        let token = ctx_get_current().unwrap();
        token.synchronize().unwrap();

        ctx_clear_current().unwrap();
        assert_eq!(token.synchronize().unwrap_err().kind(), ErrorKind::NoCurrentContext);
        drop(ctx);
    }

    #[test]
    fn test_flags_builders() {
        let flags = CtxFlags::SCHED_SPIN.with_map_host(true).with_lmem_resize_to_max(true);
        assert_eq!(flags.sched, SchedPolicy::Spin);
        assert!(flags.map_host);
        assert!(flags.lmem_resize_to_max);
        assert_eq!(CtxFlags::default(), CtxFlags::SCHED_AUTO);
    }
}
