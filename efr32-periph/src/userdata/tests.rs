use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use super::*;
use crate::sync::{CountingClock, CriticalSectionClock};

fn clock() -> Arc<CriticalSectionClock> {
    Arc::new(CriticalSectionClock)
}

#[test]
fn page_starts_erased() {
    let page = UserDataPage::new(clock());
    assert_eq!(page.read_double_word(0x000), u32::MAX);
    assert_eq!(page.read_double_word(0x3fc), u32::MAX);
    assert!(page.image().iter().all(|byte| *byte == ERASED));
}

#[test]
fn bus_writes_only_clear_bits() {
    let page = UserDataPage::new(clock());
    page.write_double_word(0x10, 0x1234_5678);
    assert_eq!(page.read_double_word(0x10), 0x1234_5678);

    page.write_double_word(0x10, 0xffff_00ff);
    assert_eq!(page.read_double_word(0x10), 0x1234_0078);

    assert_eq!(page.read_byte(0x10), 0x78);
    assert_eq!(page.read_word(0x12), 0x1234);

    // Reset keeps the contents.
    page.reset();
    assert_eq!(page.read_double_word(0x10), 0x1234_0078);
}

#[test]
fn bus_rejects_misaligned_and_out_of_range() {
    let page = UserDataPage::new(clock());
    page.write_double_word(0x11, 0);
    assert_eq!(page.read_double_word(0x10), u32::MAX);
    assert_eq!(page.read_double_word(0x11), 0);
    assert_eq!(page.read_double_word(PAGE_SIZE as u32), u32::MAX);
    page.write_double_word(PAGE_SIZE as u32, 0);
}

#[test]
fn nor_flash_interface() {
    let mut page = UserDataPage::new(clock());
    assert_eq!(page.capacity(), PAGE_SIZE);

    page.write(8, &[0x01, 0x02, 0x03, 0x04]).unwrap();
    let mut bytes = [0; 2];
    page.read(9, &mut bytes).unwrap();
    assert_eq!(bytes, [0x02, 0x03]);

    assert_eq!(page.write(2, &[0; 4]), Err(FlashError::NotAligned));
    assert_eq!(page.write(8, &[0; 3]), Err(FlashError::NotAligned));
    assert_eq!(page.write(1024, &[0; 4]), Err(FlashError::OutOfBounds));
    assert_eq!(page.read(1020, &mut [0; 8]), Err(FlashError::OutOfBounds));
    assert_eq!(page.erase(0, 512), Err(FlashError::NotAligned));

    page.erase(0, PAGE_SIZE as u32).unwrap();
    assert_eq!(page.read_double_word(8), u32::MAX);
}

#[test]
fn image_round_trip_pads_with_erased_bytes() {
    let page = UserDataPage::from_image(clock(), &[0x00, 0x11]).unwrap();
    assert_eq!(page.read_double_word(0), 0xffff_1100);
    assert_eq!(UserDataPage::from_image(clock(), &[0; PAGE_SIZE + 1]).err(), Some(FlashError::OutOfBounds));
}

#[test]
fn default_layout_is_valid() {
    let layout = TokenLayout::default();
    assert_eq!(layout.validate(), Ok(()));
    assert_eq!(layout.find("MFG_CTUNE"), Some(&TokenDef::new("MFG_CTUNE", 0x100, 2)));
    assert_eq!(layout.find("MFG_NOPE"), None);
}

#[test]
fn layout_validation() {
    let overlapping = TokenLayout {
        tokens: vec![TokenDef::new("A", 0, 4), TokenDef::new("B", 2, 4)],
    };
    assert_eq!(overlapping.validate(), Err(TokenError::Overlap));

    let too_long = TokenLayout {
        tokens: vec![TokenDef::new("A", 1020, 8)],
    };
    assert_eq!(too_long.validate(), Err(TokenError::Flash(FlashError::OutOfBounds)));
}

#[test]
fn token_write_keeps_neighbours() {
    let page = UserDataPage::new(clock());
    let layout = TokenLayout::default();
    let store = TokenStore::new(&page, &layout);

    store.write("MFG_CUSTOM_VERSION", &[0x01, 0x00]).unwrap();
    store
        .write("MFG_CUSTOM_EUI_64", &[0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17])
        .unwrap();

    assert_eq!(store.read("MFG_CUSTOM_VERSION").unwrap(), vec![0x01, 0x00]);
    assert_eq!(
        store.read("MFG_CUSTOM_EUI_64").unwrap(),
        vec![0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17]
    );
    assert!(store.is_erased("MFG_STRING").unwrap());
    assert_eq!(page.read_double_word(0x008), 0xffff_1716);
}

#[test]
fn token_errors() {
    let page = UserDataPage::new(clock());
    let layout = TokenLayout::default();
    let store = TokenStore::new(&page, &layout);

    assert_eq!(store.read("MFG_NOPE"), Err(TokenError::UnknownToken));
    assert_eq!(
        store.write("MFG_CTUNE", &[0x00]),
        Err(TokenError::SizeMismatch { expected: 2, actual: 1 })
    );

    store.write("MFG_CTUNE", &[0x80, 0x00]).unwrap();
    // Clearing more bits is fine, setting one back is not.
    store.write("MFG_CTUNE", &[0x00, 0x00]).unwrap();
    assert_eq!(store.write("MFG_CTUNE", &[0x01, 0x00]), Err(TokenError::NeedsErase));
    assert_eq!(store.read("MFG_CTUNE").unwrap(), vec![0x00, 0x00]);
}

#[test]
fn page_changes_hold_the_clock_order_lock() {
    let clock = Arc::new(CountingClock::default());
    let mut page = UserDataPage::new(clock.clone());

    assert_eq!(clock.entries_during(|| page.write_double_word(0x20, 0x1234_5678)), 1);
    let read = clock.entries_during(|| {
        page.read_double_word(0x20);
    });
    assert_eq!(read, 1);
    assert_ne!(clock.entries_during(|| page.write(0x24, &[0; 4]).unwrap()), 0);
    assert_ne!(clock.entries_during(|| page.erase(0, PAGE_SIZE as u32).unwrap()), 0);
    assert!(!clock.held());
}
