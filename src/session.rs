use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::audio::{AudioOutput, AudioPath};
use crate::error::BridgeError;
use crate::inputs::InputEncoder;
use crate::region::{MaskWidth, SharedRegion};
use crate::save::SaveStore;
use crate::video::{FrameRenderer, Surface};

/// The callback table the opaque core drives while it runs.
///
/// Byte slices handed through these calls are views into core memory,
/// borrowed for the duration of the callback only; the bridge copies what
/// it needs and never retains them.
pub trait HostBridge {
    /// One completed video frame: exactly 256*240*4 bytes of RGBA.
    fn render_frame(&mut self, bytes: &[u8]);

    fn start_channel(&mut self, channel: usize);
    fn stop_channel(&mut self, channel: usize);
    fn set_channel_frequency(&mut self, channel: usize, hz: f32);
    fn change_channel_frequency(&mut self, channel: usize, hz: f32);
    fn set_channel_volume(&mut self, channel: usize, volume: f32);
    fn set_channel_duty(&mut self, channel: usize, duty: f32);

    fn start_noise(&mut self);
    fn stop_noise(&mut self);
    fn set_noise_frequency(&mut self, hz: f32);
    fn set_noise_volume(&mut self, volume: f32);

    /// Raw-sample alternative to the synthesized voices.
    fn push_sample(&mut self, sample: f32);

    /// Snapshot of the battery RAM region, persisted immediately.
    fn save_battery(&mut self, bytes: &[u8]);

    /// Lets the core hand the bridge a chance to keep the audio queue
    /// ahead of real time, typically once per frame.
    fn pump_audio(&mut self);
}

/// The emulation core. Out of scope for this crate beyond its entry
/// points: `run` is invoked once per session with the populated region
/// and drives everything else through [`HostBridge`] callbacks while
/// reading the input mask from the region tail.
pub trait EmulationCore {
    fn run(&mut self, region: &SharedRegion, host: &mut dyn HostBridge);

    /// Optional soft reset; cores with battery RAM are expected to
    /// snapshot it via `save_battery` before resetting.
    fn reset(&mut self, host: &mut dyn HostBridge) {
        let _ = host;
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SessionConfig {
    /// Whether the cartridge declares battery-backed save RAM.
    pub battery: bool,
    pub mask_width: MaskWidth,
    pub audio_path: AudioPath,
}

/// Everything the core's callbacks touch, bundled so `run` can borrow
/// the core and its host side independently.
pub struct HostResources {
    pub audio: AudioOutput,
    pub renderer: FrameRenderer,
    pub store: SaveStore,
    pub identity: String,
}

impl HostBridge for HostResources {
    fn render_frame(&mut self, bytes: &[u8]) {
        self.renderer.render(bytes);
    }

    fn start_channel(&mut self, channel: usize) {
        self.audio.start_channel(channel);
    }

    fn stop_channel(&mut self, channel: usize) {
        self.audio.stop_channel(channel);
    }

    fn set_channel_frequency(&mut self, channel: usize, hz: f32) {
        self.audio.set_channel_frequency(channel, hz);
    }

    fn change_channel_frequency(&mut self, channel: usize, hz: f32) {
        self.audio.change_channel_frequency(channel, hz);
    }

    fn set_channel_volume(&mut self, channel: usize, volume: f32) {
        self.audio.set_channel_volume(channel, volume);
    }

    fn set_channel_duty(&mut self, channel: usize, duty: f32) {
        self.audio.set_channel_duty(channel, duty);
    }

    fn start_noise(&mut self) {
        self.audio.start_noise();
    }

    fn stop_noise(&mut self) {
        self.audio.stop_noise();
    }

    fn set_noise_frequency(&mut self, hz: f32) {
        self.audio.set_noise_frequency(hz);
    }

    fn set_noise_volume(&mut self, volume: f32) {
        self.audio.set_noise_volume(volume);
    }

    fn push_sample(&mut self, sample: f32) {
        self.audio.push_sample(sample);
    }

    fn save_battery(&mut self, bytes: &[u8]) {
        // the core has no error channel; log and keep running
        if let Err(e) = self.store.save(&self.identity, bytes) {
            error!(identity = %self.identity, error = %e, "failed to persist battery ram");
        }
    }

    fn pump_audio(&mut self) {
        self.audio.pump();
    }
}

/// One active emulation session: the shared region, the host resources
/// wired for this cartridge, and the core that runs against them.
pub struct Session {
    pub region: Arc<SharedRegion>,
    pub host: HostResources,
    core: Box<dyn EmulationCore>,
}

impl Session {
    /// Invokes the core's single entry point.
    pub fn run(&mut self) {
        info!(
            total = self.region.total_len(),
            battery = self.battery(),
            "invoking core entry point"
        );
        self.core.run(&self.region, &mut self.host);
    }

    pub fn reset(&mut self) {
        self.core.reset(&mut self.host);
    }

    pub fn battery(&self) -> bool {
        self.region.sram_image().is_some()
    }

    /// Releases per-session host audio resources. Must happen before a
    /// replacement session is built, or two audio graphs overlap.
    pub fn close(&mut self) {
        self.host.audio.close();
    }
}

/// Owner of the process-wide "active session" slot. Exactly one session
/// is active at a time; starting a new one tears the old one down first.
pub struct Bridge {
    pub input: InputEncoder,
    store: SaveStore,
    session: Option<Session>,
}

impl Bridge {
    pub fn new(save_root: impl Into<PathBuf>) -> Self {
        Bridge {
            input: InputEncoder::default(),
            store: SaveStore::new(save_root),
            session: None,
        }
    }

    /// Builds and installs a session around the default audio device.
    pub fn start_session(
        &mut self,
        rom: &[u8],
        identity: &str,
        config: SessionConfig,
        core: Box<dyn EmulationCore>,
        surface: Box<dyn Surface>,
    ) -> Result<(), BridgeError> {
        if rom.is_empty() {
            return Err(BridgeError::RomEmpty);
        }
        // tear the previous session down first: its audio resources must
        // be gone before the new ones exist
        self.close_session();
        let audio = AudioOutput::new(config.audio_path)?;
        self.install(rom, identity, config, core, surface, audio);
        Ok(())
    }

    /// Same, but with caller-built audio plumbing (tests, custom sinks).
    pub fn start_session_with_audio(
        &mut self,
        rom: &[u8],
        identity: &str,
        config: SessionConfig,
        core: Box<dyn EmulationCore>,
        surface: Box<dyn Surface>,
        audio: AudioOutput,
    ) -> Result<(), BridgeError> {
        if rom.is_empty() {
            return Err(BridgeError::RomEmpty);
        }
        self.close_session();
        self.install(rom, identity, config, core, surface, audio);
        Ok(())
    }

    fn install(
        &mut self,
        rom: &[u8],
        identity: &str,
        config: SessionConfig,
        core: Box<dyn EmulationCore>,
        surface: Box<dyn Surface>,
        audio: AudioOutput,
    ) {
        let sram = config.battery.then(|| self.store.load(identity));
        let region = Arc::new(SharedRegion::build(rom, sram.as_deref(), config.mask_width));
        self.input.attach(region.clone());
        info!(
            identity,
            battery = config.battery,
            total = region.total_len(),
            "session installed"
        );
        self.session = Some(Session {
            region,
            host: HostResources {
                audio,
                renderer: FrameRenderer::new(surface),
                store: self.store.clone(),
                identity: identity.to_string(),
            },
            core,
        });
    }

    /// Runs the active session's core, if any.
    pub fn run(&mut self) {
        if let Some(session) = &mut self.session {
            session.run();
        }
    }

    pub fn close_session(&mut self) {
        self.input.detach();
        if let Some(mut session) = self.session.take() {
            session.close();
            info!("session closed");
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Playback rate of the active session's sink, for cores that
    /// generate raw samples.
    pub fn sample_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.host.audio.sample_rate())
    }

    /// Pending manual-save edge from the host-only extra key.
    pub fn take_save_request(&mut self) -> bool {
        self.input.take_save_request()
    }
}
