use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use dasp_graph::Buffer;
use rtrb::Consumer;
use tracing::{error, info};

use crate::error::BridgeError;

/// The playback device end of the audio pipeline. The production
/// implementation is cpal; tests plug in their own and drain the block
/// queue by hand.
pub trait Sink {
    fn sample_rate(&self) -> u32;
}

/// cpal-backed sink. The stream callback pops 64-sample blocks from the
/// queue and holds the last sample on underrun to avoid pops. Dropping
/// the sink drops the stream, which releases the device.
pub struct CpalSink {
    _stream: cpal::Stream,
    sample_rate: u32,
}

impl CpalSink {
    pub fn open(mut blocks: Consumer<Buffer>) -> Result<Self, BridgeError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            BridgeError::HostCapabilityUnavailable("no default output device".into())
        })?;
        let config = device
            .default_output_config()
            .map_err(|e| BridgeError::HostCapabilityUnavailable(e.to_string()))?;
        if config.sample_format() != SampleFormat::F32 {
            return Err(BridgeError::HostCapabilityUnavailable(format!(
                "output device wants {:?}, need f32",
                config.sample_format()
            )));
        }

        let channels = config.channels() as usize;
        let sample_rate = config.sample_rate().0;

        let mut current: Option<Buffer> = None;
        let mut pos = 0usize;
        let mut last = 0.0f32;

        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let s = loop {
                            match &current {
                                Some(buf) if pos < Buffer::LEN => {
                                    let s = buf[pos];
                                    pos += 1;
                                    break s;
                                }
                                _ => {}
                            }
                            match blocks.pop() {
                                Ok(buf) => {
                                    current = Some(buf);
                                    pos = 0;
                                }
                                Err(_) => break last,
                            }
                        };
                        last = s;
                        for slot in frame.iter_mut() {
                            *slot = s;
                        }
                    }
                },
                |err| error!(%err, "audio stream error"),
                None,
            )
            .map_err(|e| BridgeError::HostCapabilityUnavailable(e.to_string()))?;
        stream
            .play()
            .map_err(|e| BridgeError::HostCapabilityUnavailable(e.to_string()))?;

        info!(sample_rate, channels, "audio sink online");
        Ok(CpalSink {
            _stream: stream,
            sample_rate,
        })
    }
}

impl Sink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
