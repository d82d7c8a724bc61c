//! Corpus audio decoding (FLAC/WAV) into mono `f32` samples.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
    io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use thiserror::Error;

/// A file that could not be decoded. Fatal for the file; corpus scans log
/// it and continue.
#[derive(Debug, Error)]
#[error("failed to load audio {path}: {reason}")]
pub struct AudioLoadError {
    pub path: PathBuf,
    pub reason: String,
}

/// Decoded mono audio with its source sample rate.
#[derive(Debug)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode an audio file and downmix it to mono.
pub fn load_audio(path: &Path) -> Result<DecodedAudio, AudioLoadError> {
    let (samples, sample_rate, channels) =
        decode_with_symphonia(path).map_err(|reason| AudioLoadError {
            path: path.to_path_buf(),
            reason,
        })?;
    Ok(DecodedAudio {
        samples: downmix_to_mono(&samples, channels),
        sample_rate: sample_rate.max(1),
    })
}

fn decode_with_symphonia(path: &Path) -> Result<(Vec<f32>, u32, u16), String> {
    let file = File::open(path).map_err(|err| format!("open: {err}"))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| format!("probe: {err}"))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| "no default track".to_string())?;
    let codec_params = &track.codec_params;
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| "missing sample rate".to_string())?;
    let channels = codec_params
        .channels
        .ok_or_else(|| "missing channel count".to_string())?
        .count() as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(codec_params, &DecoderOptions::default())
        .map_err(|err| format!("decoder: {err}"))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break,
            Err(err) => return Err(format!("packet read: {err}")),
        };
        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(Error::DecodeError(_)) => continue,
            Err(err) => return Err(format!("decode: {err}")),
        };
        let spec = *audio_buf.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err("decoded 0 samples".to_string());
    }

    Ok((samples, sample_rate, channels))
}

fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.iter().copied().map(sanitize_sample).collect();
    }
    let frames = samples.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let start = frame * channels;
        let slice = &samples[start..(start + channels).min(samples.len())];
        let sum: f32 = slice.iter().copied().map(sanitize_sample).sum();
        mono.push(sum / channels as f32);
    }
    mono
}

fn sanitize_sample(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
