use tracing::warn;

pub const WIDTH: u32 = 256;
pub const HEIGHT: u32 = 240;

/// Bytes per frame: 256x240 RGBA.
pub const FRAME_BYTES: usize = (WIDTH * HEIGHT * 4) as usize;

/// The fixed-size on-screen image. Fully overwritten each frame.
pub struct Framebuffer {
    pixels: Box<[u8]>,
}

impl Framebuffer {
    pub fn new() -> Self {
        Framebuffer {
            pixels: vec![0u8; FRAME_BYTES].into_boxed_slice(),
        }
    }

    #[inline(always)]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Where completed frames go. Session setup guarantees one exists before
/// the core runs, so `present` is infallible from the renderer's side.
pub trait Surface {
    fn present(&mut self, frame: &Framebuffer);
}

/// Copies the core's raw RGBA region into the framebuffer and flushes it.
///
/// No scaling, no filtering, no partial updates: every call replaces the
/// whole image. A region of the wrong length is logged and dropped, since
/// the core has no error channel back from its callbacks.
pub struct FrameRenderer {
    image: Framebuffer,
    surface: Box<dyn Surface>,
    frames_presented: u64,
}

impl FrameRenderer {
    pub fn new(surface: Box<dyn Surface>) -> Self {
        FrameRenderer {
            image: Framebuffer::new(),
            surface,
            frames_presented: 0,
        }
    }

    pub fn render(&mut self, bytes: &[u8]) {
        if bytes.len() != FRAME_BYTES {
            warn!(
                got = bytes.len(),
                want = FRAME_BYTES,
                "dropping frame with unexpected length"
            );
            return;
        }
        self.image.pixels.copy_from_slice(bytes);
        self.surface.present(&self.image);
        self.frames_presented += 1;
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct CaptureSurface {
        last: Rc<RefCell<Vec<u8>>>,
    }

    impl Surface for CaptureSurface {
        fn present(&mut self, frame: &Framebuffer) {
            *self.last.borrow_mut() = frame.pixels().to_vec();
        }
    }

    #[test]
    fn known_pattern_lands_byte_for_byte() {
        let last = Rc::new(RefCell::new(Vec::new()));
        let mut renderer = FrameRenderer::new(Box::new(CaptureSurface { last: last.clone() }));

        let pattern: Vec<u8> = (0..FRAME_BYTES).map(|i| (i % 251) as u8).collect();
        renderer.render(&pattern);

        assert_eq!(*last.borrow(), pattern);
        assert_eq!(renderer.frames_presented(), 1);
    }

    #[test]
    fn wrong_length_is_dropped() {
        let last = Rc::new(RefCell::new(Vec::new()));
        let mut renderer = FrameRenderer::new(Box::new(CaptureSurface { last: last.clone() }));

        renderer.render(&[0u8; 16]);
        assert!(last.borrow().is_empty());
        assert_eq!(renderer.frames_presented(), 0);

        // a full replace follows a dropped frame untouched
        let frame = vec![7u8; FRAME_BYTES];
        renderer.render(&frame);
        assert_eq!(*last.borrow(), frame);
    }
}
