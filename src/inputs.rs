use std::sync::Arc;

use tracing::trace;

use crate::region::{MaskWidth, SharedRegion};

/// Pad buttons plus the host-only save trigger.
///
/// The first eight occupy the low mask byte in hardware shift order; the
/// extra bit only exists in the two-byte layout, where it lands in the
/// high byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    A,
    B,
    Select,
    Start,
    Up,
    Down,
    Left,
    Right,
    Extra,
}

pub const BUTTONS: [Button; 9] = [
    Button::A,
    Button::B,
    Button::Select,
    Button::Start,
    Button::Up,
    Button::Down,
    Button::Left,
    Button::Right,
    Button::Extra,
];

impl Button {
    #[inline(always)]
    pub fn bit(self) -> u16 {
        match self {
            Button::A => 0x01,
            Button::B => 0x02,
            Button::Select => 0x04,
            Button::Start => 0x08,
            Button::Up => 0x10,
            Button::Down => 0x20,
            Button::Left => 0x40,
            Button::Right => 0x80,
            Button::Extra => 0x100,
        }
    }
}

/// Static key binding table, keyed by DOM-style `KeyboardEvent.code`
/// strings. Unknown codes map to nothing.
pub fn button_for_key(code: &str) -> Option<Button> {
    let button = match code {
        "KeyZ" => Button::A,
        "KeyX" => Button::B,
        "Space" => Button::Select,
        "Enter" => Button::Start,
        "ArrowUp" => Button::Up,
        "ArrowDown" => Button::Down,
        "ArrowLeft" => Button::Left,
        "ArrowRight" => Button::Right,
        "KeyS" => Button::Extra,
        _ => return None,
    };
    Some(button)
}

/// Packs host key events into the shared region's mask tail.
///
/// Key-down ORs the button bit in, key-up ANDs the complement, so repeated
/// down events are idempotent and releasing one key never clears a bit a
/// different held key owns. Everything is a no-op while no session is
/// attached.
#[derive(Default)]
pub struct InputEncoder {
    region: Option<Arc<SharedRegion>>,
    save_requested: bool,
}

impl InputEncoder {
    pub fn attach(&mut self, region: Arc<SharedRegion>) {
        self.region = Some(region);
        self.save_requested = false;
    }

    pub fn detach(&mut self) {
        self.region = None;
        self.save_requested = false;
    }

    pub fn key_down(&mut self, code: &str) {
        let Some(region) = &self.region else { return };
        let Some(button) = button_for_key(code) else { return };
        if button == Button::Extra {
            if region.mask_width() != MaskWidth::Two {
                // no extra bit in the one-byte layout
                return;
            }
            self.save_requested = true;
        }
        trace!(code, ?button, "key down");
        region.or_mask(button.bit());
    }

    pub fn key_up(&mut self, code: &str) {
        let Some(region) = &self.region else { return };
        let Some(button) = button_for_key(code) else { return };
        if button == Button::Extra && region.mask_width() != MaskWidth::Two {
            return;
        }
        trace!(code, ?button, "key up");
        region.and_not_mask(button.bit());
    }

    /// Consume the pending manual-save edge raised by the extra key.
    pub fn take_save_request(&mut self) -> bool {
        std::mem::take(&mut self.save_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPED: [&str; 9] = [
        "KeyZ",
        "KeyX",
        "Space",
        "Enter",
        "ArrowUp",
        "ArrowDown",
        "ArrowLeft",
        "ArrowRight",
        "KeyS",
    ];

    fn encoder_with(width: MaskWidth) -> (InputEncoder, Arc<SharedRegion>) {
        let region = Arc::new(SharedRegion::build(&[0u8; 4], None, width));
        let mut enc = InputEncoder::default();
        enc.attach(region.clone());
        (enc, region)
    }

    #[test]
    fn every_bit_is_a_power_of_two() {
        for b in BUTTONS {
            assert_eq!(b.bit().count_ones(), 1, "{b:?}");
        }
    }

    #[test]
    fn press_release_restores_mask_for_all_mapped_keys() {
        let (mut enc, region) = encoder_with(MaskWidth::Two);
        for code in MAPPED {
            let before = region.read_mask();
            enc.key_down(code);
            enc.key_up(code);
            assert_eq!(region.read_mask(), before, "{code}");
        }
    }

    #[test]
    fn overlapping_holds_compose_and_release_in_any_order() {
        let (mut enc, region) = encoder_with(MaskWidth::One);
        enc.key_down("KeyZ");
        enc.key_down("ArrowLeft");
        enc.key_down("Enter");
        assert_eq!(
            region.read_mask(),
            Button::A.bit() | Button::Left.bit() | Button::Start.bit()
        );

        enc.key_down("KeyZ"); // repeat down must not toggle
        enc.key_up("Enter");
        assert_eq!(region.read_mask(), Button::A.bit() | Button::Left.bit());
        enc.key_up("ArrowLeft");
        enc.key_up("KeyZ");
        assert_eq!(region.read_mask(), 0);
    }

    #[test]
    fn unmapped_and_detached_are_no_ops() {
        let (mut enc, region) = encoder_with(MaskWidth::One);
        enc.key_down("KeyQ");
        assert_eq!(region.read_mask(), 0);

        enc.detach();
        enc.key_down("KeyZ"); // must not panic or write
        assert_eq!(region.read_mask(), 0);
    }

    #[test]
    fn extra_key_needs_two_byte_layout() {
        let (mut enc, region) = encoder_with(MaskWidth::One);
        enc.key_down("KeyS");
        assert_eq!(region.read_mask(), 0);
        assert!(!enc.take_save_request());

        let (mut enc, region) = encoder_with(MaskWidth::Two);
        enc.key_down("KeyS");
        assert_eq!(region.read_mask(), Button::Extra.bit());
        assert!(enc.take_save_request());
        assert!(!enc.take_save_request());
        enc.key_up("KeyS");
        assert_eq!(region.read_mask(), 0);
    }
}
