pub mod ring;
pub mod sink;
pub mod voice;

use std::time::Instant;

use dasp_graph::Buffer;
use rtrb::{Producer, RingBuffer};
use tracing::warn;

use crate::error::BridgeError;
use ring::SampleRing;
use sink::{CpalSink, Sink};
use voice::ChannelSet;

/// Capacity of the block queue between the session thread and the sink.
pub const BLOCK_QUEUE: usize = 4096;

/// Blocks rendered ahead of real time to ride out scheduling jitter.
const LEAD_BLOCKS: u64 = 4;

/// Which producer feeds the sink: the four synthesized voices, or raw
/// samples the core pushes into the ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AudioPath {
    #[default]
    Synthesis,
    Samples,
}

/// Per-session audio output.
///
/// Voices and the sample ring live on the session thread; finished
/// 64-sample blocks cross to the device callback through an rtrb queue.
/// `pump` paces rendering against the wall clock so the queue stays a few
/// blocks ahead of the device without unbounded buildup.
pub struct AudioOutput {
    pub channels: ChannelSet,
    ring: SampleRing,
    producer: Producer<Buffer>,
    sink: Option<Box<dyn Sink>>,
    path: AudioPath,
    sample_rate: u32,
    started: Instant,
    blocks_rendered: u64,
}

impl AudioOutput {
    /// Opens the default output device. Fatal when the host has no usable
    /// audio capability; callers don't retry.
    pub fn new(path: AudioPath) -> Result<Self, BridgeError> {
        let (producer, consumer) = RingBuffer::<Buffer>::new(BLOCK_QUEUE);
        let sink = CpalSink::open(consumer)?;
        Ok(Self::assemble(path, Box::new(sink), producer))
    }

    /// Same plumbing with a caller-supplied sink; the caller keeps the
    /// consumer end of `producer`'s queue.
    pub fn with_sink(path: AudioPath, sink: Box<dyn Sink>, producer: Producer<Buffer>) -> Self {
        Self::assemble(path, sink, producer)
    }

    fn assemble(path: AudioPath, sink: Box<dyn Sink>, producer: Producer<Buffer>) -> Self {
        let sample_rate = sink.sample_rate();
        AudioOutput {
            channels: ChannelSet::new(sample_rate),
            ring: SampleRing::default(),
            producer,
            sink: Some(sink),
            path,
            sample_rate,
            started: Instant::now(),
            blocks_rendered: 0,
        }
    }

    #[inline(always)]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// Render however many blocks real time demands, plus a small lead.
    pub fn pump(&mut self) {
        if self.sink.is_none() {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = self.sample_rate as f64;
        let target = (elapsed * rate / Buffer::LEN as f64) as u64 + LEAD_BLOCKS;
        if target > self.blocks_rendered {
            let behind = (target - self.blocks_rendered) as usize;
            self.render_blocks(behind);
        }
    }

    /// Render exactly `n` blocks into the queue.
    pub fn render_blocks(&mut self, n: usize) {
        for _ in 0..n {
            let mut buf = Buffer::SILENT;
            match self.path {
                AudioPath::Synthesis => self.channels.mix_into(&mut buf[..]),
                AudioPath::Samples => {
                    self.ring.fill(&mut buf[..]);
                }
            }
            if self.producer.push(buf).is_err() {
                warn!("audio block queue full; dropping block");
            }
            self.blocks_rendered += 1;
        }
    }

    /// Raw-sample path: the core hands over one sample per audio tick.
    #[inline(always)]
    pub fn push_sample(&mut self, sample: f32) {
        self.ring.push(sample);
    }

    /// Stops every voice and releases the device. Called synchronously
    /// before a replacement session is constructed, so two sessions never
    /// overlap on the audio hardware.
    pub fn close(&mut self) {
        self.channels.close_all();
        if self.sink.take().is_some() {
            tracing::info!("audio sink released");
        }
    }

    // core-facing channel dispatch; indices 0-1 pulse, 2 triangle

    pub fn start_channel(&mut self, channel: usize) {
        match channel {
            0 => self.channels.pulse1.start(),
            1 => self.channels.pulse2.start(),
            2 => self.channels.triangle.start(),
            _ => warn!(channel, "start on unknown channel"),
        }
    }

    pub fn stop_channel(&mut self, channel: usize) {
        match channel {
            0 => self.channels.pulse1.stop(),
            1 => self.channels.pulse2.stop(),
            2 => self.channels.triangle.stop(),
            _ => warn!(channel, "stop on unknown channel"),
        }
    }

    pub fn set_channel_frequency(&mut self, channel: usize, hz: f32) {
        match channel {
            0 => self.channels.pulse1.set_frequency(hz),
            1 => self.channels.pulse2.set_frequency(hz),
            2 => self.channels.triangle.set_frequency(hz),
            _ => warn!(channel, "set_frequency on unknown channel"),
        }
    }

    pub fn change_channel_frequency(&mut self, channel: usize, hz: f32) {
        match channel {
            0 => self.channels.pulse1.change_frequency(hz),
            1 => self.channels.pulse2.change_frequency(hz),
            2 => self.channels.triangle.change_frequency(hz),
            _ => warn!(channel, "change_frequency on unknown channel"),
        }
    }

    pub fn set_channel_volume(&mut self, channel: usize, volume: f32) {
        match channel {
            0 => self.channels.pulse1.set_volume(volume),
            1 => self.channels.pulse2.set_volume(volume),
            2 => self.channels.triangle.set_volume(volume),
            _ => warn!(channel, "set_volume on unknown channel"),
        }
    }

    pub fn set_channel_duty(&mut self, channel: usize, duty: f32) {
        match channel {
            0 => self.channels.pulse1.set_duty(duty),
            1 => self.channels.pulse2.set_duty(duty),
            // the triangle has no duty control
            _ => warn!(channel, "set_duty on non-pulse channel"),
        }
    }

    pub fn start_noise(&mut self) {
        self.channels.noise.start();
    }

    pub fn stop_noise(&mut self) {
        self.channels.noise.stop();
    }

    pub fn set_noise_frequency(&mut self, hz: f32) {
        self.channels.noise.set_frequency(hz);
    }

    pub fn set_noise_volume(&mut self, volume: f32) {
        self.channels.noise.set_volume(volume);
    }
}
