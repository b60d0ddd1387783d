use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

/// Width of the packed input mask at the tail of the shared region.
///
/// One byte covers the eight pad buttons; two bytes additionally carry
/// host-only bits in the high byte. The width is an explicit session
/// setting, not inferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MaskWidth {
    #[default]
    One,
    Two,
}

impl MaskWidth {
    #[inline(always)]
    pub fn bytes(self) -> usize {
        match self {
            MaskWidth::One => 1,
            MaskWidth::Two => 2,
        }
    }
}

/// The memory region shared between the bridge and the core.
///
/// Layout: `[ROM image][optional SRAM image][input mask, 1-2 bytes]`.
/// The ROM and SRAM segments are written once at session setup and read-only
/// afterwards. The mask tail is live: the input encoder stores into it at
/// key-event time while the core loop reads it, with no synchronization
/// beyond per-byte atomicity. Last write wins; a two-byte mask may be
/// observed half-updated. The low mask byte is the final byte of the
/// region, the high byte (two-byte layout) sits second-to-last.
pub struct SharedRegion {
    data: Box<[u8]>,
    rom_len: usize,
    sram_len: usize,
    mask: [AtomicU8; 2],
    mask_width: MaskWidth,
}

impl SharedRegion {
    pub fn build(rom: &[u8], sram: Option<&[u8]>, mask_width: MaskWidth) -> Self {
        let rom_len = rom.len();
        let sram_len = sram.map_or(0, <[u8]>::len);

        let mut data = Vec::with_capacity(rom_len + sram_len);
        data.extend_from_slice(rom);
        if let Some(sram) = sram {
            data.extend_from_slice(sram);
        }

        debug!(
            rom_len,
            sram_len,
            mask_bytes = mask_width.bytes(),
            "built shared region"
        );

        SharedRegion {
            data: data.into_boxed_slice(),
            rom_len,
            sram_len,
            mask: [AtomicU8::new(0), AtomicU8::new(0)],
            mask_width,
        }
    }

    /// Total size the core is told at invocation, mask tail included.
    #[inline(always)]
    pub fn total_len(&self) -> usize {
        self.data.len() + self.mask_width.bytes()
    }

    /// Offset of the low mask byte: `total - 1`.
    #[inline(always)]
    pub fn mask_offset(&self) -> usize {
        self.total_len() - 1
    }

    #[inline(always)]
    pub fn mask_width(&self) -> MaskWidth {
        self.mask_width
    }

    #[inline(always)]
    pub fn rom(&self) -> &[u8] {
        &self.data[..self.rom_len]
    }

    /// Initial SRAM image, present only for battery-backed sessions.
    pub fn sram_image(&self) -> Option<&[u8]> {
        if self.sram_len == 0 {
            None
        } else {
            Some(&self.data[self.rom_len..])
        }
    }

    /// Current mask as seen from the core side. The two bytes are read
    /// independently, so this can observe a half-updated two-byte mask;
    /// that is accepted for a human-timescale input device.
    pub fn read_mask(&self) -> u16 {
        let lo = self.mask[0].load(Ordering::Relaxed) as u16;
        match self.mask_width {
            MaskWidth::One => lo,
            MaskWidth::Two => lo | ((self.mask[1].load(Ordering::Relaxed) as u16) << 8),
        }
    }

    /// OR button bits into the live mask. High-byte bits are dropped in
    /// the one-byte layout.
    pub fn or_mask(&self, bits: u16) {
        self.mask[0].fetch_or(bits as u8, Ordering::Relaxed);
        if self.mask_width == MaskWidth::Two {
            self.mask[1].fetch_or((bits >> 8) as u8, Ordering::Relaxed);
        }
    }

    /// AND-NOT button bits out of the live mask.
    pub fn and_not_mask(&self, bits: u16) {
        self.mask[0].fetch_and(!(bits as u8), Ordering::Relaxed);
        if self.mask_width == MaskWidth::Two {
            self.mask[1].fetch_and(!((bits >> 8) as u8), Ordering::Relaxed);
        }
    }

    /// Serialized view of the whole region, mask tail last (low byte at
    /// `total - 1`, high byte at `total - 2`). This is the byte string the
    /// flat ABI would hand across.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        out.extend_from_slice(&self.data);
        match self.mask_width {
            MaskWidth::One => out.push(self.mask[0].load(Ordering::Relaxed)),
            MaskWidth::Two => {
                out.push(self.mask[1].load(Ordering::Relaxed));
                out.push(self.mask[0].load(Ordering::Relaxed));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rom_sram_mask() {
        let rom = [1u8, 2, 3, 4];
        let sram = [9u8; 8];
        let region = SharedRegion::build(&rom, Some(&sram), MaskWidth::One);

        assert_eq!(region.total_len(), 4 + 8 + 1);
        assert_eq!(region.mask_offset(), 12);
        assert_eq!(region.rom(), &rom);
        assert_eq!(region.sram_image(), Some(&sram[..]));

        let snap = region.snapshot();
        assert_eq!(&snap[..4], &rom);
        assert_eq!(&snap[4..12], &sram);
        assert_eq!(snap[12], 0);
    }

    #[test]
    fn mask_tail_byte_order_two_wide() {
        let region = SharedRegion::build(&[0xaa], None, MaskWidth::Two);
        region.or_mask(0x0102);

        let snap = region.snapshot();
        assert_eq!(snap.len(), 3);
        // low byte last, high byte second-to-last
        assert_eq!(snap[2], 0x02);
        assert_eq!(snap[1], 0x01);
        assert_eq!(region.read_mask(), 0x0102);
    }

    #[test]
    fn or_is_idempotent_and_and_not_clears_only_own_bits() {
        let region = SharedRegion::build(&[0], None, MaskWidth::One);
        region.or_mask(0x10);
        region.or_mask(0x10);
        region.or_mask(0x01);
        assert_eq!(region.read_mask(), 0x11);

        region.and_not_mask(0x10);
        assert_eq!(region.read_mask(), 0x01);
    }

    #[test]
    fn one_wide_mask_drops_high_bits() {
        let region = SharedRegion::build(&[0], None, MaskWidth::One);
        region.or_mask(0x100);
        assert_eq!(region.read_mask(), 0);
    }
}
