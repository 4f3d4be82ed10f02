//! FFmpeg-backed engine.
//!
//! [`FfmpegEngine`] implements both halves of the engine boundary on top of
//! the FFmpeg libraries (via `ffmpeg-next`): demux + decode + scale for
//! sources, encode + mux for sinks. Frames cross the boundary as
//! tightly-packed RGB24 buffers.
//!
//! FFmpeg has its own console logging, separate from the Rust `log` facade;
//! [`set_engine_log_level`] tunes it process-wide. This is the one piece of
//! process-global engine configuration the crate exposes.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use ffmpeg_next::{
    codec::{context::Context as CodecContext, Id as CodecId},
    decoder::Video as VideoDecoder,
    encoder,
    format::{
        self,
        context::{Input, Output},
        Flags as FormatFlags, Pixel,
    },
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::log as ffmpeg_log,
    Dictionary, Error as FfmpegError, Packet, Rational,
};

use crate::{
    convert,
    engine::{
        DecodeEngine, EncodeEngine, FrameSink, FrameSource, SinkOptions, SourceOptions, VideoCodec,
    },
    error::FrameshiftError,
    frame::{ColorMode, RawFrame},
    metadata::{FrameCount, MediaInfo},
};

impl VideoCodec {
    pub(crate) fn ffmpeg_id(self) -> CodecId {
        match self {
            VideoCodec::H264 => CodecId::H264,
            VideoCodec::H265 => CodecId::HEVC,
            VideoCodec::Mpeg4 => CodecId::MPEG4,
        }
    }
}

/// The production engine: FFmpeg decoding and encoding.
///
/// Stateless; one instance can open any number of sources and sinks.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEngine;

impl FfmpegEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }
}

impl DecodeEngine for FfmpegEngine {
    fn open_source(
        &self,
        path: &Path,
        options: &SourceOptions,
    ) -> Result<Box<dyn FrameSource>, FrameshiftError> {
        Ok(Box::new(FfmpegSource::open(path, options)?))
    }
}

impl EncodeEngine for FfmpegEngine {
    fn open_sink(
        &self,
        path: &Path,
        fps: f64,
        options: &SinkOptions,
    ) -> Result<Box<dyn FrameSink>, FrameshiftError> {
        Ok(Box::new(FfmpegSink::open(path, fps, options)?))
    }
}

fn source_open_error(path: &Path, reason: impl ToString) -> FrameshiftError {
    FrameshiftError::SourceOpen {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn sink_open_error(path: &Path, reason: impl ToString) -> FrameshiftError {
    FrameshiftError::SinkOpen {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn dictionary_from(extra: &BTreeMap<String, String>) -> Dictionary<'_> {
    let mut dictionary = Dictionary::new();
    for (key, value) in extra {
        dictionary.set(key, value);
    }
    dictionary
}

/// Copy pixel data from an FFmpeg frame plane into a tightly-packed buffer,
/// stripping any row padding (stride > width * bpp).
fn packed_pixels(frame: &VideoFrame, width: u32, height: u32, bytes_per_pixel: usize) -> Vec<u8> {
    let stride = frame.stride(0);
    let row_len = width as usize * bytes_per_pixel;
    let data = frame.data(0);

    if stride == row_len {
        data[..row_len * height as usize].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            buffer.extend_from_slice(&data[start..start + row_len]);
        }
        buffer
    }
}

struct FfmpegSource {
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    stream_index: usize,
    info: MediaInfo,
    width: u32,
    height: u32,
    decoded: VideoFrame,
    scaled: VideoFrame,
    eof_sent: bool,
    done: bool,
}

// Safety: a source is owned by exactly one reader and used from one thread at
// a time; the raw pointers inside the FFmpeg contexts are never shared.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    fn open(path: &Path, options: &SourceOptions) -> Result<Self, FrameshiftError> {
        ffmpeg_next::init().map_err(|error| source_open_error(path, error))?;

        let input = if options.extra.is_empty() {
            format::input(&path)
        } else {
            format::input_with_dictionary(&path, dictionary_from(&options.extra))
        }
        .map_err(|error| source_open_error(path, error))?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(FrameshiftError::NoVideoStream)?;
        let stream_index = stream.index();

        let decoder_context = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| source_open_error(path, error))?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|error| source_open_error(path, error))?;

        // Average frame rate, falling back to the stream's raw rate field.
        let avg = stream.avg_frame_rate();
        let fps = if avg.denominator() != 0 && avg.numerator() != 0 {
            Some(avg.numerator() as f64 / avg.denominator() as f64)
        } else {
            let rate = stream.rate();
            if rate.denominator() != 0 && rate.numerator() != 0 {
                Some(rate.numerator() as f64 / rate.denominator() as f64)
            } else {
                None
            }
        };

        let duration_microseconds = input.duration();
        let duration = if duration_microseconds > 0 {
            Some(duration_microseconds as f64 / 1_000_000.0)
        } else {
            None
        };

        let declared = stream.frames();
        let frame_count = if declared > 0 {
            FrameCount::Exact(declared as u64)
        } else {
            FrameCount::Unknown
        };

        let codec = decoder.codec().map(|codec| codec.name().to_string());

        let extra: BTreeMap<String, String> = input
            .metadata()
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        let info = MediaInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            duration,
            frame_count,
            codec,
            extra,
        };

        let (width, height) = options.size.unwrap_or((decoder.width(), decoder.height()));
        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| source_open_error(path, error))?;

        log::debug!(
            "opened ffmpeg source {} ({}x{} -> {width}x{height}, fps {:?})",
            path.display(),
            decoder.width(),
            decoder.height(),
            info.fps,
        );

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            info,
            width,
            height,
            decoded: VideoFrame::empty(),
            scaled: VideoFrame::empty(),
            eof_sent: false,
            done: false,
        })
    }

    /// Feed the decoder one more packet, or EOF when the container is drained.
    fn pump(&mut self) -> Result<(), FrameshiftError> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {
                if packet.stream() == self.stream_index {
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|error| FrameshiftError::Decode(error.to_string()))?;
                }
                // Packets for other streams are silently skipped.
            }
            Err(FfmpegError::Eof) => {
                self.decoder
                    .send_eof()
                    .map_err(|error| FrameshiftError::Decode(error.to_string()))?;
                self.eof_sent = true;
            }
            Err(_) => {
                // Non-fatal read error; try the next packet.
            }
        }
        Ok(())
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, FrameshiftError> {
        if self.done {
            return Ok(None);
        }
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                self.scaler
                    .run(&self.decoded, &mut self.scaled)
                    .map_err(|error| FrameshiftError::Decode(error.to_string()))?;
                let data = packed_pixels(&self.scaled, self.width, self.height, 3);
                return Ok(Some(RawFrame::new(
                    data,
                    self.width,
                    self.height,
                    ColorMode::Rgb,
                )?));
            }
            if self.eof_sent {
                self.done = true;
                return Ok(None);
            }
            self.pump()?;
        }
    }

    fn skip_frame(&mut self) -> Result<bool, FrameshiftError> {
        if self.done {
            return Ok(false);
        }
        loop {
            // Decode but skip the scale-and-copy step.
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                return Ok(true);
            }
            if self.eof_sent {
                self.done = true;
                return Ok(false);
            }
            self.pump()?;
        }
    }
}

struct SinkState {
    output: Output,
    encoder: encoder::video::Encoder,
    scaler: ScalingContext,
    stream_index: usize,
    width: u32,
    height: u32,
    encoder_time_base: Rational,
    stream_time_base: Rational,
}

struct FfmpegSink {
    path: PathBuf,
    fps_num: i32,
    options: SinkOptions,
    /// Open output context, consumed when the first frame arrives.
    pending_output: Option<Output>,
    state: Option<SinkState>,
    frame_index: i64,
    finished: bool,
}

// Safety: a sink is owned by exactly one writer and used from one thread at a
// time; the raw pointers inside the FFmpeg contexts are never shared.
unsafe impl Send for FfmpegSink {}

impl FfmpegSink {
    fn open(path: &Path, fps: f64, options: &SinkOptions) -> Result<Self, FrameshiftError> {
        ffmpeg_next::init().map_err(|error| sink_open_error(path, error))?;

        if !fps.is_finite() || fps <= 0.0 {
            return Err(sink_open_error(path, format!("invalid frame rate {fps}")));
        }
        let fps_num = (fps.round() as i32).max(1);

        // The container is opened eagerly so path problems surface here; the
        // encoder is negotiated once the first frame fixes the dimensions.
        let output = format::output(&path).map_err(|error| sink_open_error(path, error))?;

        Ok(Self {
            path: path.to_path_buf(),
            fps_num,
            options: options.clone(),
            pending_output: Some(output),
            state: None,
            frame_index: 0,
            finished: false,
        })
    }

    fn init_state(&mut self, width: u32, height: u32) -> Result<(), FrameshiftError> {
        let Some(mut output) = self.pending_output.take() else {
            return Err(FrameshiftError::Encode("sink output already consumed".into()));
        };

        let codec_id = self.options.codec.ffmpeg_id();
        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let encoder_codec = encoder::find(codec_id).ok_or_else(|| {
            FrameshiftError::Encode(format!("codec {codec_id:?} not available"))
        })?;

        let mut stream = output
            .add_stream(encoder_codec)
            .map_err(|error| FrameshiftError::Encode(format!("cannot add stream: {error}")))?;
        let stream_index = stream.index();

        let mut video = {
            let context = CodecContext::from_parameters(stream.parameters()).map_err(|error| {
                FrameshiftError::Encode(format!("cannot create codec context: {error}"))
            })?;
            context.encoder().video().map_err(|error| {
                FrameshiftError::Encode(format!("cannot open video encoder: {error}"))
            })?
        };

        video.set_width(width);
        video.set_height(height);
        video.set_format(Pixel::YUV420P);
        let encoder_time_base = Rational::new(1, self.fps_num);
        video.set_time_base(encoder_time_base);
        video.set_frame_rate(Some(Rational::new(self.fps_num, 1)));

        if let Some(bitrate) = self.options.bitrate {
            video.set_bit_rate(bitrate);
        }

        if needs_global_header {
            unsafe {
                (*video.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let mut encoder_options = dictionary_from(&self.options.extra);
        if let Some(crf) = self.options.crf {
            encoder_options.set("crf", &crf.to_string());
        }

        let encoder = video
            .open_as_with(encoder_codec, encoder_options)
            .map_err(|error| FrameshiftError::Encode(format!("cannot open encoder: {error}")))?;

        stream.set_parameters(&encoder);

        output
            .write_header()
            .map_err(|error| FrameshiftError::Encode(format!("cannot write header: {error}")))?;

        // The muxer may adjust the stream time base while writing the header.
        let stream_time_base = output
            .stream(stream_index)
            .ok_or_else(|| FrameshiftError::Encode("output stream vanished".into()))?
            .time_base();

        let scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| FrameshiftError::Encode(format!("cannot create scaler: {error}")))?;

        log::debug!(
            "negotiated ffmpeg sink {} ({width}x{height} @ {} fps, {:?})",
            self.path.display(),
            self.fps_num,
            self.options.codec,
        );

        self.state = Some(SinkState {
            output,
            encoder,
            scaler,
            stream_index,
            width,
            height,
            encoder_time_base,
            stream_time_base,
        });
        Ok(())
    }
}

fn drain_packets(state: &mut SinkState) -> Result<(), FrameshiftError> {
    let mut packet = Packet::empty();
    while state.encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(state.stream_index);
        packet.rescale_ts(state.encoder_time_base, state.stream_time_base);
        packet
            .write_interleaved(&mut state.output)
            .map_err(|error| FrameshiftError::Encode(format!("write packet failed: {error}")))?;
    }
    Ok(())
}

impl FrameSink for FfmpegSink {
    fn append(&mut self, frame: &RawFrame) -> Result<(), FrameshiftError> {
        if self.finished {
            return Err(FrameshiftError::Encode("sink already finalized".into()));
        }
        if self.state.is_none() {
            let (width, height) = self.options.size.unwrap_or(frame.size());
            self.init_state(width, height)?;
        }
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| FrameshiftError::Encode("sink state missing".into()))?;

        if frame.size() != (state.width, state.height) {
            return Err(FrameshiftError::Encode(format!(
                "frame size {}x{} does not match output size {}x{}",
                frame.width(),
                frame.height(),
                state.width,
                state.height,
            )));
        }

        let rgb;
        let rgb_bytes: &[u8] = match frame.mode() {
            ColorMode::Rgb => frame.data(),
            ColorMode::Rgba => {
                rgb = convert::rgba_to_rgb(frame.data());
                &rgb
            }
        };

        let mut source_frame = VideoFrame::new(Pixel::RGB24, state.width, state.height);
        let stride = source_frame.stride(0);
        let row_len = state.width as usize * 3;
        let data = source_frame.data_mut(0);
        for row in 0..state.height as usize {
            let source_start = row * row_len;
            let target_start = row * stride;
            data[target_start..target_start + row_len]
                .copy_from_slice(&rgb_bytes[source_start..source_start + row_len]);
        }

        let mut yuv_frame = VideoFrame::empty();
        state
            .scaler
            .run(&source_frame, &mut yuv_frame)
            .map_err(|error| FrameshiftError::Encode(format!("scaling failed: {error}")))?;
        yuv_frame.set_pts(Some(self.frame_index));
        self.frame_index += 1;

        state
            .encoder
            .send_frame(&yuv_frame)
            .map_err(|error| FrameshiftError::Encode(format!("send_frame failed: {error}")))?;

        drain_packets(state)
    }

    fn finish(&mut self) -> Result<(), FrameshiftError> {
        if self.finished {
            return Ok(());
        }
        let Some(mut state) = self.state.take() else {
            return Err(FrameshiftError::Encode(format!(
                "no frames were written to {}",
                self.path.display()
            )));
        };
        self.finished = true;

        state
            .encoder
            .send_eof()
            .map_err(|error| FrameshiftError::Encode(format!("send_eof failed: {error}")))?;
        drain_packets(&mut state)?;

        state
            .output
            .write_trailer()
            .map_err(|error| FrameshiftError::Encode(format!("cannot write trailer: {error}")))?;

        log::debug!(
            "finalized ffmpeg sink {} ({} frames)",
            self.path.display(),
            self.frame_index,
        );
        Ok(())
    }
}

/// FFmpeg internal log verbosity, most verbose (`Trace`) to silent (`Quiet`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineLogLevel {
    /// Print nothing at all.
    Quiet,
    /// Log only on imminent process abort.
    Panic,
    /// Log unrecoverable errors.
    Fatal,
    /// Log recoverable errors.
    Error,
    /// Log warnings (FFmpeg's default).
    Warning,
    /// Log informational messages.
    Info,
    /// Log verbose informational messages.
    Verbose,
    /// Log debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl EngineLogLevel {
    fn to_ffmpeg(self) -> ffmpeg_log::Level {
        match self {
            EngineLogLevel::Quiet => ffmpeg_log::Level::Quiet,
            EngineLogLevel::Panic => ffmpeg_log::Level::Panic,
            EngineLogLevel::Fatal => ffmpeg_log::Level::Fatal,
            EngineLogLevel::Error => ffmpeg_log::Level::Error,
            EngineLogLevel::Warning => ffmpeg_log::Level::Warning,
            EngineLogLevel::Info => ffmpeg_log::Level::Info,
            EngineLogLevel::Verbose => ffmpeg_log::Level::Verbose,
            EngineLogLevel::Debug => ffmpeg_log::Level::Debug,
            EngineLogLevel::Trace => ffmpeg_log::Level::Trace,
        }
    }

    fn from_ffmpeg(level: ffmpeg_log::Level) -> Self {
        match level {
            ffmpeg_log::Level::Quiet => EngineLogLevel::Quiet,
            ffmpeg_log::Level::Panic => EngineLogLevel::Panic,
            ffmpeg_log::Level::Fatal => EngineLogLevel::Fatal,
            ffmpeg_log::Level::Error => EngineLogLevel::Error,
            ffmpeg_log::Level::Warning => EngineLogLevel::Warning,
            ffmpeg_log::Level::Info => EngineLogLevel::Info,
            ffmpeg_log::Level::Verbose => EngineLogLevel::Verbose,
            ffmpeg_log::Level::Debug => EngineLogLevel::Debug,
            ffmpeg_log::Level::Trace => EngineLogLevel::Trace,
        }
    }
}

/// Set FFmpeg's internal (stderr) log verbosity, process-wide.
///
/// Does not affect the Rust-side `log` facade.
pub fn set_engine_log_level(level: EngineLogLevel) {
    ffmpeg_log::set_level(level.to_ffmpeg());
}

/// Current FFmpeg internal log verbosity, when it maps to a known level.
pub fn engine_log_level() -> Option<EngineLogLevel> {
    ffmpeg_log::get_level().ok().map(EngineLogLevel::from_ffmpeg)
}
