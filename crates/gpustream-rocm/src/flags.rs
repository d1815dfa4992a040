//! HIP context flag encoding.

use gpustream_core::{CtxFlags, SchedPolicy};

/// `hipDeviceScheduleAuto`
pub const HIP_DEVICE_SCHEDULE_AUTO: u32 = 0x00;
/// `hipDeviceScheduleSpin`
pub const HIP_DEVICE_SCHEDULE_SPIN: u32 = 0x01;
/// `hipDeviceScheduleYield`
pub const HIP_DEVICE_SCHEDULE_YIELD: u32 = 0x02;
/// `hipDeviceScheduleBlockingSync`
pub const HIP_DEVICE_SCHEDULE_BLOCKING_SYNC: u32 = 0x04;
/// `hipDeviceScheduleMask`
pub const HIP_DEVICE_SCHEDULE_MASK: u32 = 0x07;
/// `hipDeviceMapHost`
pub const HIP_DEVICE_MAP_HOST: u32 = 0x08;
/// `hipDeviceLmemResizeToMax`. HIP defines it as 0x16, which overlaps the
/// yield and blocking-sync scheduling bits. [`encode`] ORs it in unchanged.
pub const HIP_DEVICE_LMEM_RESIZE_TO_MAX: u32 = 0x16;

/// Native bitmask for `hipCtxCreate`.
pub fn encode(flags: CtxFlags) -> u32 {
    let mut bits = match flags.sched {
        SchedPolicy::Auto => HIP_DEVICE_SCHEDULE_AUTO,
        SchedPolicy::Spin => HIP_DEVICE_SCHEDULE_SPIN,
        SchedPolicy::Yield => HIP_DEVICE_SCHEDULE_YIELD,
        SchedPolicy::BlockingSync => HIP_DEVICE_SCHEDULE_BLOCKING_SYNC,
    };
    if flags.map_host {
        bits |= HIP_DEVICE_MAP_HOST;
    }
    if flags.lmem_resize_to_max {
        bits |= HIP_DEVICE_LMEM_RESIZE_TO_MAX;
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lmem_resize_value() {
        let flags = CtxFlags::SCHED_AUTO.with_lmem_resize_to_max(true);
        assert_eq!(encode(flags), 0x16);
    }

    #[test]
    fn test_lmem_resize_overlaps_sched_bits() {
        let flags = CtxFlags::SCHED_SPIN.with_lmem_resize_to_max(true);
        let bits = encode(flags);
        assert_eq!(bits, 0x17);
        assert_eq!(bits & HIP_DEVICE_SCHEDULE_MASK, 0x07);
    }

    proptest! {
        #[test]
        fn test_sched_and_map_host(
            sched in prop::sample::select(SchedPolicy::ALL.to_vec()),
            map_host in any::<bool>(),
        ) {
            let bits = encode(CtxFlags::new(sched).with_map_host(map_host));
            prop_assert_eq!(bits & HIP_DEVICE_MAP_HOST != 0, map_host);
            prop_assert_eq!(bits & !HIP_DEVICE_MAP_HOST, encode(CtxFlags::new(sched)));
            prop_assert!(bits & !(HIP_DEVICE_SCHEDULE_MASK | HIP_DEVICE_MAP_HOST) == 0);
        }
    }
}
