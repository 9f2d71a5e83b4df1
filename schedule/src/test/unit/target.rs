use std::sync::Arc;

use crate::target::{DeviceApi, DeviceKind, Target, TargetKind, device_api, register_device_api};

#[test]
fn no_target_is_current_by_default() {
    assert_eq!(Target::current(), None);
}

#[test]
fn entered_target_is_current_until_the_guard_drops() {
    {
        let _guard = Target::new(TargetKind::Cuda).enter();
        assert_eq!(Target::current().map(Target::kind), Some(TargetKind::Cuda));
    }
    assert_eq!(Target::current(), None);
}

#[test]
fn targets_nest() {
    let _outer = Target::new(TargetKind::Llvm).enter();
    {
        let _inner = Target::new(TargetKind::Cuda).enter();
        assert_eq!(Target::current().map(Target::kind), Some(TargetKind::Cuda));
    }
    assert_eq!(Target::current().map(Target::kind), Some(TargetKind::Llvm));
}

#[derive(Debug)]
struct StubCuda;

impl DeviceApi for StubCuda {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Cuda
    }
}

#[test]
fn registered_device_api_resolves() {
    register_device_api(Arc::new(StubCuda));
    let api = device_api(DeviceKind::Cuda).expect("runtime was registered");
    assert_eq!(api.kind(), DeviceKind::Cuda);
}
