use dasp_signal::Signal;
use tracing::trace;

/// Relative channel loudness, roughly matching the hardware mix. Four
/// voices sum into one output, so the levels also keep the sum inside
/// [-1, 1].
pub const PULSE_LEVEL: f32 = 0.25;
pub const TRIANGLE_LEVEL: f32 = 0.30;
pub const NOISE_LEVEL: f32 = 0.15;

pub const DEFAULT_DUTY: f32 = 0.5;

/// Discrete per-voice parameter state. The core is the sole driver of
/// transitions; each voice owns its state exclusively.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelState {
    pub frequency: f32,
    pub volume: f32,
    pub duty: f32,
    pub playing: bool,
}

impl Default for ChannelState {
    fn default() -> Self {
        ChannelState {
            frequency: 0.0,
            volume: 0.0,
            duty: DEFAULT_DUTY,
            playing: false,
        }
    }
}

/// Phase-accumulator pulse generator. Duty is a plain threshold on the
/// phase, so there is no frequency-dependent delay to keep in sync and no
/// low-frequency artifact.
struct PulseGen {
    phase: f32,
    step: f32,
    duty: f32,
    amp: f32,
}

impl PulseGen {
    fn silent() -> Self {
        PulseGen {
            phase: 0.0,
            step: 0.0,
            duty: DEFAULT_DUTY,
            amp: 0.0,
        }
    }
}

impl Signal for PulseGen {
    type Frame = f32;

    fn next(&mut self) -> f32 {
        let s = if self.phase < self.duty { self.amp } else { -self.amp };
        self.phase += self.step;
        // step may exceed 1.0 (timer rates above the sample rate)
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        s
    }
}

struct TriangleGen {
    phase: f32,
    step: f32,
    amp: f32,
}

impl TriangleGen {
    fn silent() -> Self {
        TriangleGen {
            phase: 0.0,
            step: 0.0,
            amp: 0.0,
        }
    }
}

impl Signal for TriangleGen {
    type Frame = f32;

    fn next(&mut self) -> f32 {
        let s = self.amp * (4.0 * (self.phase - 0.5).abs() - 1.0);
        self.phase += self.step;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        s
    }
}

/// 15-bit LFSR noise, clocked at the requested rate. Frequency maps to
/// the generator rate, not to pitch.
struct NoiseGen {
    lfsr: u16,
    timer: f32,
    rate: f32,
    amp: f32,
}

impl NoiseGen {
    fn silent() -> Self {
        NoiseGen {
            lfsr: 1,
            timer: 0.0,
            rate: 0.0,
            amp: 0.0,
        }
    }
}

impl Signal for NoiseGen {
    type Frame = f32;

    fn next(&mut self) -> f32 {
        self.timer += self.rate;
        while self.timer >= 1.0 {
            let feedback = (self.lfsr ^ (self.lfsr >> 1)) & 1;
            self.lfsr = (self.lfsr >> 1) | (feedback << 14);
            self.timer -= 1.0;
        }
        if self.lfsr & 1 == 0 {
            self.amp
        } else {
            -self.amp
        }
    }
}

/// A pulse voice (also used for the triangle via `TriangleVoice`).
///
/// `start()` is re-entrant: starting while already playing first fully
/// stops the voice, generator included, so stale phase or duty state
/// can't leak into the next note. `stop()` zeroes volume before dropping
/// the generator to avoid the click of hard-stopping a non-zero wave,
/// then recreates it silent at 50% duty. Each recreation bumps the
/// generation counter, which is what tests observe.
pub struct PulseVoice {
    state: ChannelState,
    gen: PulseGen,
    generation: u64,
    sample_rate: f32,
}

impl PulseVoice {
    pub fn new(sample_rate: u32) -> Self {
        PulseVoice {
            state: ChannelState::default(),
            gen: PulseGen::silent(),
            generation: 0,
            sample_rate: sample_rate as f32,
        }
    }

    pub fn start(&mut self) {
        if self.state.playing {
            self.stop();
        }
        self.state.playing = true;
        self.gen = PulseGen {
            phase: 0.0,
            step: self.state.frequency / self.sample_rate,
            duty: self.state.duty,
            amp: self.state.volume * PULSE_LEVEL,
        };
        self.generation += 1;
        trace!(generation = self.generation, "pulse start");
    }

    pub fn stop(&mut self) {
        if !self.state.playing {
            return;
        }
        self.state.volume = 0.0;
        self.state.duty = DEFAULT_DUTY;
        self.state.playing = false;
        self.gen = PulseGen::silent();
        self.generation += 1;
    }

    /// Sets the frequency for future starts without touching a live note.
    pub fn set_frequency(&mut self, frequency: f32) {
        self.state.frequency = frequency.max(0.0);
    }

    /// Updates a live note's pitch as well. The phase accumulator carries
    /// straight over, so there is no discontinuity.
    pub fn change_frequency(&mut self, frequency: f32) {
        self.state.frequency = frequency.max(0.0);
        self.gen.step = self.state.frequency / self.sample_rate;
    }

    pub fn set_duty(&mut self, duty: f32) {
        let duty = duty.clamp(0.0, 1.0);
        self.state.duty = duty;
        self.gen.duty = duty;
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.state.volume = volume;
        self.gen.amp = volume * PULSE_LEVEL;
    }

    pub fn close(&mut self) {
        self.state.playing = false;
        self.gen = PulseGen::silent();
    }

    pub fn mix_into(&mut self, out: &mut [f32]) {
        if !self.state.playing {
            return;
        }
        for slot in out.iter_mut() {
            *slot += self.gen.next();
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Triangle voice: the pulse contract minus duty control.
pub struct TriangleVoice {
    state: ChannelState,
    gen: TriangleGen,
    generation: u64,
    sample_rate: f32,
}

impl TriangleVoice {
    pub fn new(sample_rate: u32) -> Self {
        TriangleVoice {
            state: ChannelState::default(),
            gen: TriangleGen::silent(),
            generation: 0,
            sample_rate: sample_rate as f32,
        }
    }

    pub fn start(&mut self) {
        if self.state.playing {
            self.stop();
        }
        self.state.playing = true;
        self.gen = TriangleGen {
            phase: 0.0,
            step: self.state.frequency / self.sample_rate,
            amp: self.state.volume * TRIANGLE_LEVEL,
        };
        self.generation += 1;
    }

    pub fn stop(&mut self) {
        if !self.state.playing {
            return;
        }
        self.state.volume = 0.0;
        self.state.playing = false;
        self.gen = TriangleGen::silent();
        self.generation += 1;
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.state.frequency = frequency.max(0.0);
    }

    pub fn change_frequency(&mut self, frequency: f32) {
        self.state.frequency = frequency.max(0.0);
        self.gen.step = self.state.frequency / self.sample_rate;
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.state.volume = volume;
        self.gen.amp = volume * TRIANGLE_LEVEL;
    }

    pub fn close(&mut self) {
        self.state.playing = false;
        self.gen = TriangleGen::silent();
    }

    pub fn mix_into(&mut self, out: &mut [f32]) {
        if !self.state.playing {
            return;
        }
        for slot in out.iter_mut() {
            *slot += self.gen.next();
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Noise voice: start/stop/frequency/volume only.
pub struct NoiseVoice {
    state: ChannelState,
    gen: NoiseGen,
    generation: u64,
    sample_rate: f32,
}

impl NoiseVoice {
    pub fn new(sample_rate: u32) -> Self {
        NoiseVoice {
            state: ChannelState::default(),
            gen: NoiseGen::silent(),
            generation: 0,
            sample_rate: sample_rate as f32,
        }
    }

    pub fn start(&mut self) {
        if self.state.playing {
            self.stop();
        }
        self.state.playing = true;
        self.gen = NoiseGen {
            lfsr: 1,
            timer: 0.0,
            rate: self.state.frequency / self.sample_rate,
            amp: self.state.volume * NOISE_LEVEL,
        };
        self.generation += 1;
    }

    pub fn stop(&mut self) {
        if !self.state.playing {
            return;
        }
        self.state.volume = 0.0;
        self.state.playing = false;
        self.gen = NoiseGen::silent();
        self.generation += 1;
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.state.frequency = frequency.max(0.0);
        self.gen.rate = self.state.frequency / self.sample_rate;
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.state.volume = volume;
        self.gen.amp = volume * NOISE_LEVEL;
    }

    pub fn close(&mut self) {
        self.state.playing = false;
        self.gen = NoiseGen::silent();
    }

    pub fn mix_into(&mut self, out: &mut [f32]) {
        if !self.state.playing {
            return;
        }
        for slot in out.iter_mut() {
            *slot += self.gen.next();
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The four hardware voices: two pulses, a triangle, and noise.
pub struct ChannelSet {
    pub pulse1: PulseVoice,
    pub pulse2: PulseVoice,
    pub triangle: TriangleVoice,
    pub noise: NoiseVoice,
}

impl ChannelSet {
    pub fn new(sample_rate: u32) -> Self {
        ChannelSet {
            pulse1: PulseVoice::new(sample_rate),
            pulse2: PulseVoice::new(sample_rate),
            triangle: TriangleVoice::new(sample_rate),
            noise: NoiseVoice::new(sample_rate),
        }
    }

    pub fn mix_into(&mut self, out: &mut [f32]) {
        self.pulse1.mix_into(out);
        self.pulse2.mix_into(out);
        self.triangle.mix_into(out);
        self.noise.mix_into(out);
    }

    pub fn close_all(&mut self) {
        self.pulse1.close();
        self.pulse2.close();
        self.triangle.close();
        self.noise.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_start_recreates_the_generator() {
        let mut voice = PulseVoice::new(44100);
        voice.set_frequency(440.0);
        voice.start();
        voice.set_volume(0.8);
        let gen_after_first = voice.generation();

        // advance the phase so a stale generator would be detectable
        let mut buf = [0.0f32; 32];
        voice.mix_into(&mut buf);
        assert!(voice.gen.phase > 0.0);

        voice.start();
        assert!(voice.state().playing);
        assert!(voice.generation() > gen_after_first);
        assert_eq!(voice.gen.phase, 0.0);
    }

    #[test]
    fn stop_silences_and_resets_to_default_duty() {
        let mut voice = PulseVoice::new(44100);
        voice.set_frequency(220.0);
        voice.start();
        voice.set_volume(1.0);
        voice.set_duty(0.25);

        voice.stop();
        assert!(!voice.state().playing);
        assert_eq!(voice.state().volume, 0.0);
        assert_eq!(voice.state().duty, DEFAULT_DUTY);

        // stop when already stopped is a no-op
        let generation = voice.generation();
        voice.stop();
        assert_eq!(voice.generation(), generation);
    }

    #[test]
    fn set_frequency_waits_for_start_change_frequency_is_live() {
        let mut voice = PulseVoice::new(48000);
        voice.set_frequency(100.0);
        voice.start();
        let live_step = voice.gen.step;

        voice.set_frequency(200.0);
        assert_eq!(voice.gen.step, live_step);
        assert_eq!(voice.state().frequency, 200.0);

        voice.change_frequency(400.0);
        assert_eq!(voice.gen.step, 400.0 / 48000.0);
    }

    #[test]
    fn volume_and_duty_are_clamped() {
        let mut voice = PulseVoice::new(44100);
        voice.set_volume(1.5);
        assert_eq!(voice.state().volume, 1.0);
        voice.set_volume(-0.5);
        assert_eq!(voice.state().volume, 0.0);
        voice.set_duty(7.0);
        assert_eq!(voice.state().duty, 1.0);
    }

    #[test]
    fn pulse_duty_is_a_phase_threshold() {
        let mut voice = PulseVoice::new(8);
        voice.set_frequency(1.0); // one cycle per 8 samples
        voice.start();
        voice.set_volume(1.0);
        voice.set_duty(0.5);

        let mut buf = [0.0f32; 8];
        voice.mix_into(&mut buf);
        for &s in &buf[..4] {
            assert_eq!(s, PULSE_LEVEL);
        }
        for &s in &buf[4..] {
            assert_eq!(s, -PULSE_LEVEL);
        }
    }

    #[test]
    fn frequency_above_sample_rate_keeps_the_phase_bounded() {
        let mut voice = PulseVoice::new(8);
        voice.set_frequency(20.0); // step of 2.5 cycles per sample
        voice.start();
        voice.set_volume(1.0);

        let mut buf = [0.0f32; 1024];
        voice.mix_into(&mut buf);
        assert!(voice.gen.phase >= 0.0 && voice.gen.phase < 1.0);
        // the waveform keeps toggling instead of freezing
        assert!(buf.iter().any(|&s| s > 0.0));
        assert!(buf.iter().any(|&s| s < 0.0));

        let mut voice = TriangleVoice::new(8);
        voice.set_frequency(20.0);
        voice.start();
        voice.set_volume(1.0);
        voice.mix_into(&mut buf);
        assert!(voice.gen.phase >= 0.0 && voice.gen.phase < 1.0);
    }

    #[test]
    fn triangle_peaks_at_its_attenuated_level() {
        let mut voice = TriangleVoice::new(64);
        voice.set_frequency(1.0);
        voice.start();
        voice.set_volume(1.0);

        let mut buf = [0.0f32; 64];
        voice.mix_into(&mut buf);
        let peak = buf.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak <= TRIANGLE_LEVEL + 1e-6);
        assert!(peak > TRIANGLE_LEVEL * 0.9);
    }

    #[test]
    fn noise_is_deterministic_and_bounded() {
        let render = || {
            let mut voice = NoiseVoice::new(44100);
            voice.set_frequency(4000.0);
            voice.start();
            voice.set_volume(1.0);
            let mut buf = [0.0f32; 256];
            voice.mix_into(&mut buf);
            buf
        };
        let a = render();
        let b = render();
        assert_eq!(a, b);
        assert!(a.iter().all(|&s| s == NOISE_LEVEL || s == -NOISE_LEVEL));
        // the register actually clocks: both polarities show up
        assert!(a.iter().any(|&s| s > 0.0));
        assert!(a.iter().any(|&s| s < 0.0));
    }

    #[test]
    fn stopped_voice_contributes_nothing_to_the_mix() {
        let mut set = ChannelSet::new(44100);
        set.pulse1.set_frequency(440.0);
        set.pulse1.start();
        set.pulse1.set_volume(1.0);
        set.pulse1.stop();

        let mut buf = [0.0f32; 64];
        set.mix_into(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
    }
}
