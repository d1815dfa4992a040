//! `CUctx_flags` encoding.

use gpustream_core::{CtxFlags, SchedPolicy};

/// `CU_CTX_SCHED_AUTO`
pub const CU_CTX_SCHED_AUTO: u32 = 0x00;
/// `CU_CTX_SCHED_SPIN`
pub const CU_CTX_SCHED_SPIN: u32 = 0x01;
/// `CU_CTX_SCHED_YIELD`
pub const CU_CTX_SCHED_YIELD: u32 = 0x02;
/// `CU_CTX_SCHED_BLOCKING_SYNC`
pub const CU_CTX_SCHED_BLOCKING_SYNC: u32 = 0x04;
/// `CU_CTX_SCHED_MASK`
pub const CU_CTX_SCHED_MASK: u32 = 0x07;
/// `CU_CTX_MAP_HOST`
pub const CU_CTX_MAP_HOST: u32 = 0x08;
/// `CU_CTX_LMEM_RESIZE_TO_MAX`
pub const CU_CTX_LMEM_RESIZE_TO_MAX: u32 = 0x10;

/// Native bitmask for `cuCtxCreate`.
pub fn encode(flags: CtxFlags) -> u32 {
    let mut bits = match flags.sched {
        SchedPolicy::Auto => CU_CTX_SCHED_AUTO,
        SchedPolicy::Spin => CU_CTX_SCHED_SPIN,
        SchedPolicy::Yield => CU_CTX_SCHED_YIELD,
        SchedPolicy::BlockingSync => CU_CTX_SCHED_BLOCKING_SYNC,
    };
    if flags.map_host {
        bits |= CU_CTX_MAP_HOST;
    }
    if flags.lmem_resize_to_max {
        bits |= CU_CTX_LMEM_RESIZE_TO_MAX;
    }
    bits
}
