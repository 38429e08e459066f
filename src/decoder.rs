//! C1: decode a container-format audio file into integer PCM channels.

use std::fs::File;
use std::io::Read as _;
use std::path::Path;

use sha1::{Digest, Sha1};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecRegistry, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::{Hint, Probe};
use symphonia::default;

use crate::error::{Result, SabiError};

/// Decoded audio: one or more equal-length i16 PCM channels, plus sample rate.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub channels: Vec<Vec<i16>>,
    pub sample_rate: u32,
}

pub struct Decoder {
    codec_registry: &'static CodecRegistry,
    format_options: FormatOptions,
    metadata_options: MetadataOptions,
    probe: &'static Probe,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            codec_registry: default::get_codecs(),
            format_options: FormatOptions::default(),
            metadata_options: MetadataOptions::default(),
            probe: symphonia::default::get_probe(),
        }
    }

    /// Decode `path` into per-channel i16 PCM plus sample rate. 24-bit
    /// samples aren't supported (spec.md section 4.1).
    pub fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let file = File::open(path).map_err(|e| SabiError::Decode(e.to_string()))?;
        let source: Box<dyn MediaSource> = Box::new(file);
        let stream = MediaSourceStream::new(source, Default::default());

        let probed = self
            .probe
            .format(
                &Hint::new(),
                stream,
                &self.format_options,
                &self.metadata_options,
            )
            .map_err(|e| SabiError::Decode(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .first()
            .ok_or_else(|| SabiError::Decode("no audio track found".into()))?;
        let codec_params = track.codec_params.clone();
        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| SabiError::Decode("missing sample rate".into()))?;

        let mut decoder = self
            .codec_registry
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| SabiError::Decode(e.to_string()))?;

        let mut channels: Vec<Vec<i16>> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(_)) => break,
                Err(e) => return Err(SabiError::Decode(e.to_string())),
            };

            let decoded = decoder
                .decode(&packet)
                .map_err(|e| SabiError::Decode(e.to_string()))?;
            let spec = *decoded.spec();
            let num_channels = spec.channels.count();

            if channels.is_empty() {
                channels.resize(num_channels, Vec::new());
            }

            let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            for frame in sample_buf.samples().chunks(num_channels) {
                for (ch, &sample) in frame.iter().enumerate() {
                    channels[ch].push(sample);
                }
            }
        }

        if channels.is_empty() {
            return Err(SabiError::Decode("no samples decoded".into()));
        }

        Ok(DecodedAudio {
            channels,
            sample_rate,
        })
    }

    /// SHA-1 over raw file bytes, block-streamed.
    pub fn file_hash(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path).map_err(|e| SabiError::Decode(e.to_string()))?;
        let mut hasher = Sha1::new();
        let mut buf = [0u8; 1 << 16];

        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        let digest = hasher.finalize();
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }
}
