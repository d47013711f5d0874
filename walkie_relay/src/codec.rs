//! Audio frame compression.
//!
//! The relay only knows frames of 16-bit mono PCM going in and out of a
//! [`FrameEncoder`] / [`FrameDecoder`] pair. Two implementations exist:
//!
//! - [`Pcm16Codec`], uncompressed big-endian samples. Always available.
//! - Opus, behind the `opus` feature: voice mode, in-band FEC, tuned for 5% loss.

use serde::Deserialize;

/// Large enough for any single encoded frame the relay produces.
pub const MAX_ENCODED_LEN: usize = 4000;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("{0} codec is not available in this build")]
    Unsupported(&'static str),
    #[error("expected a frame of {expected} samples, got {actual}")]
    FrameSize { expected: usize, actual: usize },
    #[error("output buffer of {available} bytes, {needed} needed")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("payload of {0} bytes is not a whole number of samples")]
    Truncated(usize),
    #[error("{0}")]
    Backend(String),
}

pub trait FrameEncoder: Send {
    /// Compresses one frame of `pcm` into `out`, returning the encoded length.
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, CodecError>;
}

pub trait FrameDecoder: Send {
    /// Expands one encoded frame into `out`, returning the number of samples written.
    fn decode(&mut self, data: &[u8], out: &mut [i16]) -> Result<usize, CodecError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    Opus,
    Pcm,
}

impl Default for CodecKind {
    /// Opus when built in, uncompressed otherwise.
    fn default() -> Self {
        if cfg!(feature = "opus") {
            Self::Opus
        } else {
            Self::Pcm
        }
    }
}

impl core::str::FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opus" => Ok(Self::Opus),
            "pcm" => Ok(Self::Pcm),
            _ => Err(format!("unknown codec {s:?}, expected \"opus\" or \"pcm\"")),
        }
    }
}

/// What both halves of a codec are created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParams {
    pub sample_rate: u32,
    pub samples_per_frame: usize,
    /// Target bitrate in bits per second, ignored by uncompressed codecs.
    pub bitrate: u32,
}

pub type CodecPair = (Box<dyn FrameEncoder>, Box<dyn FrameDecoder>);

/// Creates an encoder and a decoder of the given kind.
pub fn build(kind: CodecKind, params: &CodecParams) -> Result<CodecPair, CodecError> {
    match kind {
        CodecKind::Pcm => {
            let codec = Pcm16Codec::new(params.samples_per_frame);
            Ok((Box::new(codec), Box::new(codec)))
        }
        #[cfg(feature = "opus")]
        CodecKind::Opus => Ok((
            Box::new(opus_codec::OpusEncoder::new(params)?),
            Box::new(opus_codec::OpusDecoder::new(params)?),
        )),
        #[cfg(not(feature = "opus"))]
        CodecKind::Opus => Err(CodecError::Unsupported("opus")),
    }
}

/// Uncompressed 16-bit big-endian samples, two bytes per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcm16Codec {
    samples_per_frame: usize,
}

impl Pcm16Codec {
    pub const fn new(samples_per_frame: usize) -> Self {
        Self { samples_per_frame }
    }
}

impl FrameEncoder for Pcm16Codec {
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, CodecError> {
        if pcm.len() != self.samples_per_frame {
            return Err(CodecError::FrameSize {
                expected: self.samples_per_frame,
                actual: pcm.len(),
            });
        }

        let needed = pcm.len().strict_mul(size_of::<i16>());
        let available = out.len();
        let out = out
            .get_mut(..needed)
            .ok_or(CodecError::BufferTooSmall { needed, available })?;

        for (bytes, sample) in out.chunks_exact_mut(size_of::<i16>()).zip(pcm) {
            bytes.copy_from_slice(&sample.to_be_bytes());
        }

        Ok(needed)
    }
}

impl FrameDecoder for Pcm16Codec {
    fn decode(&mut self, data: &[u8], out: &mut [i16]) -> Result<usize, CodecError> {
        let (samples, []) = data.as_chunks::<2>() else {
            return Err(CodecError::Truncated(data.len()));
        };

        let n = samples.len().min(out.len());
        for (sample, &bytes) in out.iter_mut().zip(&samples[..n]) {
            *sample = i16::from_be_bytes(bytes);
        }

        Ok(n)
    }
}

#[cfg(feature = "opus")]
mod opus_codec {
    use super::{CodecError, CodecParams, FrameDecoder, FrameEncoder};

    const EXPECTED_LOSS_PERCENT: i32 = 5;

    /// Largest Opus packet the encoder is allowed to produce.
    const MAX_OPUS_FRAME_LEN: usize = 1024;

    fn backend(e: opus::Error) -> CodecError {
        CodecError::Backend(e.to_string())
    }

    pub struct OpusEncoder {
        inner: opus::Encoder,
        samples_per_frame: usize,
    }

    impl OpusEncoder {
        pub fn new(params: &CodecParams) -> Result<Self, CodecError> {
            let mut inner = opus::Encoder::new(
                params.sample_rate,
                opus::Channels::Mono,
                opus::Application::Voip,
            )
            .map_err(backend)?;

            let bitrate = i32::try_from(params.bitrate)
                .map_err(|_| CodecError::Backend(format!("bitrate {} out of range", params.bitrate)))?;

            inner
                .set_bitrate(opus::Bitrate::Bits(bitrate))
                .map_err(backend)?;
            inner.set_inband_fec(true).map_err(backend)?;
            inner
                .set_packet_loss_perc(EXPECTED_LOSS_PERCENT)
                .map_err(backend)?;

            log::info!(
                "opus encoder: {} Hz, {} samples per frame, {} bit/s",
                params.sample_rate,
                params.samples_per_frame,
                params.bitrate
            );

            Ok(Self {
                inner,
                samples_per_frame: params.samples_per_frame,
            })
        }
    }

    impl FrameEncoder for OpusEncoder {
        fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, CodecError> {
            if pcm.len() != self.samples_per_frame {
                return Err(CodecError::FrameSize {
                    expected: self.samples_per_frame,
                    actual: pcm.len(),
                });
            }

            let limit = out.len().min(MAX_OPUS_FRAME_LEN);
            self.inner.encode(pcm, &mut out[..limit]).map_err(backend)
        }
    }

    pub struct OpusDecoder {
        inner: opus::Decoder,
    }

    impl OpusDecoder {
        pub fn new(params: &CodecParams) -> Result<Self, CodecError> {
            let inner =
                opus::Decoder::new(params.sample_rate, opus::Channels::Mono).map_err(backend)?;
            Ok(Self { inner })
        }
    }

    impl FrameDecoder for OpusDecoder {
        fn decode(&mut self, data: &[u8], out: &mut [i16]) -> Result<usize, CodecError> {
            self.inner.decode(data, out, false).map_err(backend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_is_big_endian() {
        let mut codec = Pcm16Codec::new(3);
        let mut out = [0u8; 8];

        assert_eq!(codec.encode(&[0x1234, -2, 0], &mut out).unwrap(), 6);
        assert_eq!(&out[..6], &[0x12, 0x34, 0xFF, 0xFE, 0, 0]);

        let mut pcm = [0i16; 3];
        assert_eq!(codec.decode(&out[..6], &mut pcm).unwrap(), 3);
        assert_eq!(pcm, [0x1234, -2, 0]);
    }

    #[test]
    fn pcm_rejects_wrong_frame_sizes() {
        let mut codec = Pcm16Codec::new(4);

        assert!(matches!(
            codec.encode(&[0; 3], &mut [0; 8]),
            Err(CodecError::FrameSize {
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            codec.encode(&[0; 4], &mut [0; 7]),
            Err(CodecError::BufferTooSmall {
                needed: 8,
                available: 7
            })
        ));
        assert!(matches!(
            codec.decode(&[0; 5], &mut [0; 4]),
            Err(CodecError::Truncated(5))
        ));
    }

    #[test]
    fn short_payloads_decode_fewer_samples() {
        let mut codec = Pcm16Codec::new(960);
        let mut pcm = [0i16; 960];
        assert_eq!(codec.decode(&[0; 100], &mut pcm).unwrap(), 50);
    }

    #[test]
    fn codec_kind_parses() {
        assert_eq!("pcm".parse::<CodecKind>(), Ok(CodecKind::Pcm));
        assert_eq!("opus".parse::<CodecKind>(), Ok(CodecKind::Opus));
        assert!("mp3".parse::<CodecKind>().is_err());
    }

    #[cfg(not(feature = "opus"))]
    #[test]
    fn opus_needs_the_feature() {
        let params = CodecParams {
            sample_rate: 48_000,
            samples_per_frame: 960,
            bitrate: 24_000,
        };
        assert!(matches!(
            build(CodecKind::Opus, &params),
            Err(CodecError::Unsupported("opus"))
        ));
    }

    #[cfg(feature = "opus")]
    #[test]
    fn opus_silence_survives_a_round_trip() {
        let params = CodecParams {
            sample_rate: 48_000,
            samples_per_frame: 960,
            bitrate: 24_000,
        };
        let (mut encoder, mut decoder) = build(CodecKind::Opus, &params).unwrap();

        let mut packet = [0u8; MAX_ENCODED_LEN];
        let n = encoder.encode(&[0; 960], &mut packet).unwrap();
        assert!(n > 0 && n < 1000);

        let mut pcm = [1i16; 960];
        assert_eq!(decoder.decode(&packet[..n], &mut pcm).unwrap(), 960);
    }
}
