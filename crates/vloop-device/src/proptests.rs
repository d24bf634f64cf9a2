//! Property tests for the buffer arithmetic, the parameter path, and the
//! reservation scan.

use proptest::prelude::*;

use vloop_protocol::{Command, Picture, Reply, VideoParams};

use crate::config::{RegistryConfig, SlotDefaults};
use crate::frame::{frame_bytes, page_round_up, PAGE_SIZE};
use crate::registry::{Pid, Registry};
use crate::slot::VideoSlot;
use crate::sync::CancelToken;

fn geometry() -> impl Strategy<Value = (u32, u32, u32)> {
    (
        1u32..=1024,
        1u32..=1024,
        prop_oneof![Just(8u32), Just(16u32), Just(24u32), Just(32u32)],
    )
}

fn test_slot() -> VideoSlot {
    VideoSlot::new(0, &SlotDefaults::default(), 1, 256 * 1024 * 1024).unwrap()
}

fn picture_of(slot: &VideoSlot, cancel: &CancelToken) -> Picture {
    match slot.execute(cancel, Command::GetPicture).unwrap() {
        Reply::Picture(picture) => picture,
        other => panic!("unexpected reply: {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn rounded_size_is_the_minimal_page_multiple((width, height, depth) in geometry()) {
        let raw = frame_bytes(width, height, depth).unwrap();
        let padded = page_round_up(raw).unwrap();
        prop_assert_eq!(padded % PAGE_SIZE as u64, 0);
        prop_assert!(padded >= raw);
        prop_assert!(padded - raw < PAGE_SIZE as u64);
    }

    #[test]
    fn applied_geometry_is_mappable_to_its_exact_size(
        (width, height, depth) in geometry(),
        palette in 1u32..=16,
        fps in 0u32..=120,
    ) {
        let slot = test_slot();
        let cancel = CancelToken::new();
        slot.set_params(&cancel, &VideoParams { width, height, depth, palette, fps }).unwrap();

        let size = page_round_up(frame_bytes(width, height, depth).unwrap()).unwrap() as usize;
        prop_assert!(slot.mmap(&cancel, size).is_ok());
        prop_assert!(slot.mmap(&cancel, size + 1).is_err());

        let params = slot.params(&cancel).unwrap();
        prop_assert_eq!((params.width, params.height, params.depth), (width, height, depth));
        prop_assert_eq!((params.palette, params.fps), (palette, fps));
    }

    #[test]
    fn rejected_picture_updates_change_nothing(
        raised_depth in 33u32..=64,
        other_palette in 1u32..=14,
        brightness in 0u32..=65535,
    ) {
        let slot = test_slot();
        let cancel = CancelToken::new();
        let before = picture_of(&slot, &cancel);

        let raised = Picture {
            depth: raised_depth,
            palette: before.palette,
            brightness,
            ..Picture::default()
        };
        prop_assert!(slot.execute(&cancel, Command::SetPicture(raised)).is_err());

        let repaletted = Picture {
            depth: before.depth,
            palette: other_palette,
            brightness,
            ..Picture::default()
        };
        prop_assert!(slot.execute(&cancel, Command::SetPicture(repaletted)).is_err());

        prop_assert_eq!(picture_of(&slot, &cancel), before);
    }

    #[test]
    fn reservation_scan_finds_the_first_holder(
        holders in proptest::collection::vec(0u32..5, 1..=8),
        probe in 1u32..5,
    ) {
        let registry = Registry::new(&RegistryConfig {
            devices: holders.len() as u32,
            ..RegistryConfig::default()
        }).unwrap();
        for (minor, holder) in holders.iter().enumerate() {
            registry.reserve(minor as u32, *holder).unwrap();
        }

        let expected = holders.iter().position(|&holder| holder == probe).map(|minor| minor as u32);
        prop_assert_eq!(registry.reservation_of(Pid::new(probe).unwrap()), expected);
    }
}
