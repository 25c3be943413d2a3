#![cfg(not(target_arch = "wasm32"))]

use aero_fastsnap::{bitmap_size, dirty_stack_size, DirtySizing, DirtyTracker};
use proptest::prelude::*;

fn page_sizes() -> impl Strategy<Value = u64> {
    (0u32..=21).prop_map(|shift| 1u64 << shift)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        .. ProptestConfig::default()
    })]

    #[test]
    fn bitmap_is_word_aligned_and_covers_every_page(
        total in 0u64..(1u64 << 48),
        page_size in page_sizes(),
    ) {
        let bitmap = bitmap_size(total, page_size).unwrap();
        let pages = total.div_ceil(page_size);

        prop_assert_eq!(bitmap % 8, 0);
        prop_assert!(bitmap * 8 >= pages);
        // Never more than one word of slack.
        prop_assert!(bitmap < pages.div_ceil(8) + 8);
    }

    #[test]
    fn stack_has_one_slot_per_page(
        total in 0u64..(1u64 << 48),
        page_size in page_sizes(),
    ) {
        prop_assert_eq!(dirty_stack_size(total, page_size).unwrap(), (total / page_size) * 8);
    }

    #[test]
    fn tracker_accepts_every_page_exactly_once(
        pages in 1u64..512,
        touches in prop::collection::vec(any::<u64>(), 0..256),
    ) {
        let sizing = DirtySizing::new(pages * 4096, 4096).unwrap();
        let mut tracker = DirtyTracker::new(sizing).unwrap();

        let mut expected = Vec::new();
        for touch in touches {
            let page = touch % pages;
            let first = tracker.mark_page(page).unwrap();
            prop_assert_eq!(first, !expected.contains(&page));
            if first {
                expected.push(page);
            }
        }
        prop_assert_eq!(tracker.drain(), expected);
        prop_assert_eq!(tracker.dirty_count(), 0);
    }
}
