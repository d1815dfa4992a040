//! Software driver with vendor-like semantics.
//!
//! Used by tests and benchmarks on machines without a GPU. It follows the
//! CUDA driver conventions the real backends rely on: `init` is required
//! before anything else, the current context is per thread, and handle
//! creation binds to the thread's current context.
//!
//! Each thread has a vendor-style context stack. Setting a context replaces
//! the top entry (or pushes onto an empty stack) and clearing pops it, as
//! `cuCtxSetCurrent` / `hipCtxSetCurrent` do, so tests can observe a stale
//! binding resurfacing. Creating a context leaves the stack untouched,
//! matching the [`Driver::ctx_create`] contract.
//!
//! Limits on contexts per device and handles per context let tests provoke
//! exhaustion, and [`SimulatedDriver::inject`] makes individual calls fail.

use super::{Driver, DriverResult, RawContext, RawDevice, RawHandle};
use crate::context::CtxFlags;
use crate::error::{BackendStatus, ErrorKind};
use crate::handle::CapabilityKind;
use crate::platform::Platform;
use dashmap::DashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

const LIBRARY: &str = "simulated";

/// Status codes reported by the simulated driver, modelled on `CUresult`.
pub mod status {
    use super::{BackendStatus, ErrorKind, LIBRARY};

    /// Bad argument.
    pub const INVALID_VALUE: BackendStatus = BackendStatus::new(LIBRARY, 1, "INVALID_VALUE");
    /// Allocation failure.
    pub const OUT_OF_MEMORY: BackendStatus =
        BackendStatus::new(LIBRARY, 2, "OUT_OF_MEMORY").with_kind(ErrorKind::ResourceExhausted);
    /// `init` has not been called.
    pub const NOT_INITIALIZED: BackendStatus =
        BackendStatus::new(LIBRARY, 3, "NOT_INITIALIZED").with_kind(ErrorKind::BackendUnavailable);
    /// Driver missing or too old.
    pub const INSUFFICIENT_DRIVER: BackendStatus = BackendStatus::new(LIBRARY, 35, "INSUFFICIENT_DRIVER")
        .with_kind(ErrorKind::BackendUnavailable);
    /// Device ordinal or handle does not exist.
    pub const INVALID_DEVICE: BackendStatus =
        BackendStatus::new(LIBRARY, 101, "INVALID_DEVICE").with_kind(ErrorKind::NoDevice);
    /// No device is installed.
    pub const NO_DEVICE: BackendStatus =
        BackendStatus::new(LIBRARY, 100, "NO_DEVICE").with_kind(ErrorKind::NoDevice);
    /// Context does not exist or none is current.
    pub const INVALID_CONTEXT: BackendStatus =
        BackendStatus::new(LIBRARY, 201, "INVALID_CONTEXT").with_kind(ErrorKind::InvalidState);
    /// The device has no free context slot.
    pub const CONTEXT_ALREADY_IN_USE: BackendStatus = BackendStatus::new(LIBRARY, 216, "CONTEXT_ALREADY_IN_USE")
        .with_kind(ErrorKind::ResourceExhausted);
}

/// Driver calls that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `ctx_set_current(Some(_))` fails with `INVALID_CONTEXT`.
    SetCurrent,
    /// `ctx_destroy` fails with `INVALID_CONTEXT` and keeps the context.
    CtxDestroy,
}

#[derive(Debug)]
struct SimContext {
    device: i32,
    flags: CtxFlags,
}

#[derive(Debug)]
struct SimHandle {
    context: usize,
    kind: CapabilityKind,
}

/// Builder for [`SimulatedDriver`].
#[derive(Debug, Clone)]
pub struct SimulatedDriverBuilder {
    platform: Platform,
    devices: i32,
    device_memory: usize,
    contexts_per_device: usize,
    handles_per_context: usize,
    available: bool,
    no_device_status: bool,
}

impl SimulatedDriverBuilder {
    /// Number of visible devices.
    pub fn devices(mut self, count: i32) -> Self {
        self.devices = count;
        self
    }

    /// Memory reported per device, in bytes.
    pub fn device_memory(mut self, bytes: usize) -> Self {
        self.device_memory = bytes;
        self
    }

    /// Maximum live contexts per device.
    pub fn contexts_per_device(mut self, limit: usize) -> Self {
        self.contexts_per_device = limit;
        self
    }

    /// Maximum live handles per context.
    pub fn handles_per_context(mut self, limit: usize) -> Self {
        self.handles_per_context = limit;
        self
    }

    /// Makes `init` fail as if no driver were installed.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// With zero devices, makes `device_count` fail with [`status::NO_DEVICE`]
    /// the way `cuDeviceGetCount` and `hipGetDeviceCount` do on hosts
    /// without a GPU.
    pub fn no_device_status(mut self) -> Self {
        self.no_device_status = true;
        self
    }

    /// Builds the driver.
    pub fn build(self) -> SimulatedDriver {
        SimulatedDriver {
            config: self,
            initialized: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
            contexts: DashMap::new(),
            handles: DashMap::new(),
            stacks: DashMap::new(),
            fail_set_current: AtomicBool::new(false),
            fail_ctx_destroy: AtomicBool::new(false),
        }
    }
}

/// In-memory driver implementation.
#[derive(Debug)]
pub struct SimulatedDriver {
    config: SimulatedDriverBuilder,
    initialized: AtomicBool,
    init_calls: AtomicUsize,
    next_id: AtomicUsize,
    contexts: DashMap<usize, SimContext>,
    handles: DashMap<usize, SimHandle>,
    stacks: DashMap<ThreadId, Vec<usize>>,
    fail_set_current: AtomicBool,
    fail_ctx_destroy: AtomicBool,
}

impl SimulatedDriver {
    /// Starts building a driver for `platform` with one device and generous
    /// limits.
    pub fn builder(platform: Platform) -> SimulatedDriverBuilder {
        SimulatedDriverBuilder {
            platform,
            devices: 1,
            device_memory: 16 << 30,
            contexts_per_device: 64,
            handles_per_context: 64,
            available: true,
            no_device_status: false,
        }
    }

    /// Number of contexts created and not yet destroyed.
    pub fn live_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Number of handles created and not yet destroyed.
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Number of `init` calls so far.
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::Relaxed)
    }

    /// Context the driver considers current on the calling thread.
    pub fn current_raw(&self) -> Option<RawContext> {
        self.current_context()
            .ok()
            .and_then(|id| RawContext::new(to_ptr(id)))
    }

    /// Depth of the calling thread's context stack.
    pub fn stack_depth(&self) -> usize {
        self.stacks
            .get(&thread::current().id())
            .map_or(0, |stack| stack.len())
    }

    /// Turns failure of one kind of call on or off.
    pub fn inject(&self, fault: Fault, enabled: bool) {
        let flag = match fault {
            Fault::SetCurrent => &self.fail_set_current,
            Fault::CtxDestroy => &self.fail_ctx_destroy,
        };
        flag.store(enabled, Ordering::Release);
    }

    /// Flags a live context was created with.
    pub fn context_flags(&self, ctx: RawContext) -> Option<CtxFlags> {
        self.contexts.get(&ctx.as_ptr().addr()).map(|c| c.flags)
    }

    fn ensure_initialized(&self) -> DriverResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(status::NOT_INITIALIZED)
        }
    }

    fn allocate_id(&self) -> usize {
        // Spaced out so raw values look like distinct aligned pointers.
        self.next_id.fetch_add(1, Ordering::Relaxed) << 4
    }

    fn current_context(&self) -> DriverResult<usize> {
        self.stacks
            .get(&thread::current().id())
            .and_then(|stack| stack.last().copied())
            .ok_or(status::INVALID_CONTEXT)
    }
}

fn to_ptr(id: usize) -> *mut c_void {
    std::ptr::without_provenance_mut(id)
}

impl Driver for SimulatedDriver {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn init(&self) -> DriverResult<()> {
        self.init_calls.fetch_add(1, Ordering::Relaxed);
        if !self.config.available {
            return Err(status::INSUFFICIENT_DRIVER);
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn device_count(&self) -> DriverResult<i32> {
        self.ensure_initialized()?;
        if self.config.devices == 0 && self.config.no_device_status {
            return Err(status::NO_DEVICE);
        }
        Ok(self.config.devices)
    }

    fn device_get(&self, ordinal: i32) -> DriverResult<RawDevice> {
        self.ensure_initialized()?;
        if (0..self.config.devices).contains(&ordinal) {
            Ok(RawDevice(ordinal))
        } else {
            Err(status::INVALID_DEVICE)
        }
    }

    fn device_name(&self, device: RawDevice) -> DriverResult<String> {
        self.device_get(device.0)?;
        Ok(format!("Simulated {} Device {}", self.config.platform, device.0))
    }

    fn device_total_mem(&self, device: RawDevice) -> DriverResult<usize> {
        self.device_get(device.0)?;
        Ok(self.config.device_memory)
    }

    fn ctx_create(&self, flags: CtxFlags, device: RawDevice) -> DriverResult<RawContext> {
        self.device_get(device.0)?;
        let on_device = self
            .contexts
            .iter()
            .filter(|entry| entry.device == device.0)
            .count();
        if on_device >= self.config.contexts_per_device {
            return Err(status::CONTEXT_ALREADY_IN_USE);
        }

        let id = self.allocate_id();
        self.contexts.insert(
            id,
            SimContext {
                device: device.0,
                flags,
            },
        );
        RawContext::new(to_ptr(id)).ok_or(status::OUT_OF_MEMORY)
    }

    fn ctx_destroy(&self, ctx: RawContext) -> DriverResult<()> {
        if self.fail_ctx_destroy.load(Ordering::Acquire) {
            return Err(status::INVALID_CONTEXT);
        }
        let id = ctx.as_ptr().addr();
        self.contexts.remove(&id).ok_or(status::INVALID_CONTEXT)?;
        for mut stack in self.stacks.iter_mut() {
            stack.retain(|entry| *entry != id);
        }
        Ok(())
    }

    fn ctx_set_current(&self, ctx: Option<RawContext>) -> DriverResult<()> {
        let mut stack = self.stacks.entry(thread::current().id()).or_default();
        match ctx {
            Some(ctx) => {
                let id = ctx.as_ptr().addr();
                if self.fail_set_current.load(Ordering::Acquire)
                    || !self.contexts.contains_key(&id)
                {
                    return Err(status::INVALID_CONTEXT);
                }
                match stack.last_mut() {
                    Some(top) => *top = id,
                    None => stack.push(id),
                }
            }
            None => {
                stack.pop();
            }
        }
        Ok(())
    }

    fn ctx_synchronize(&self) -> DriverResult<()> {
        self.current_context().map(|_| ())
    }

    fn handle_create(&self, kind: CapabilityKind) -> DriverResult<RawHandle> {
        self.ensure_initialized()?;
        let context = self.current_context()?;
        let in_context = self
            .handles
            .iter()
            .filter(|entry| entry.context == context)
            .count();
        if in_context >= self.config.handles_per_context {
            return Err(status::OUT_OF_MEMORY);
        }

        let id = self.allocate_id();
        self.handles.insert(id, SimHandle { context, kind });
        RawHandle::new(to_ptr(id)).ok_or(status::OUT_OF_MEMORY)
    }

    fn handle_destroy(&self, kind: CapabilityKind, handle: RawHandle) -> DriverResult<()> {
        let id = handle.as_ptr().addr();
        match self.handles.remove_if(&id, |_, h| h.kind == kind) {
            Some(_) => Ok(()),
            None => Err(status::INVALID_VALUE),
        }
    }
}
