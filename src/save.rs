use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Battery RAM image size: 8 KiB, the core's save-RAM capability.
pub const SAVE_IMAGE_LEN: usize = 0x2000;

/// Directory-backed byte persistence keyed by cartridge identity.
///
/// One opaque blob per identity. Identities are arbitrary strings (the
/// cartridge's source filename/path), hex-encoded into the on-disk name so
/// the mapping is lossless and filesystem-safe for the full byte range.
#[derive(Clone, Debug)]
pub struct SaveStore {
    root: PathBuf,
}

impl SaveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SaveStore { root: root.into() }
    }

    /// Returns the stored image for `identity`, or a zero-filled default
    /// when none exists. Never errors for a missing identity; a blob of
    /// the wrong size is treated as absent.
    pub fn load(&self, identity: &str) -> Vec<u8> {
        let path = self.path_for(identity);
        match fs::read(&path) {
            Ok(bytes) if bytes.len() == SAVE_IMAGE_LEN => {
                info!(identity, "loaded battery ram");
                bytes
            }
            Ok(bytes) => {
                warn!(
                    identity,
                    len = bytes.len(),
                    "stored battery ram has unexpected size, starting fresh"
                );
                vec![0u8; SAVE_IMAGE_LEN]
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(identity, "no battery ram yet, starting fresh");
                vec![0u8; SAVE_IMAGE_LEN]
            }
            Err(e) => {
                warn!(identity, error = %e, "failed to read battery ram, starting fresh");
                vec![0u8; SAVE_IMAGE_LEN]
            }
        }
    }

    /// Overwrites the stored image for `identity`. Writes to a temp file
    /// in the same directory and renames it into place, so a concurrent
    /// `load` sees either the old or the new image, never a mix.
    pub fn save(&self, identity: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(identity);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        info!(identity, len = bytes.len(), "battery ram saved");
        Ok(())
    }

    fn path_for(&self, identity: &str) -> PathBuf {
        let mut name = String::with_capacity(identity.len() * 2 + 4);
        for b in identity.bytes() {
            name.push_str(&format!("{b:02x}"));
        }
        name.push_str(".sav");
        self.root.join(Path::new(&name))
    }
}
