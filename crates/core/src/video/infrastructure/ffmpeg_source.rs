use std::time::Duration;

use ffmpeg_next::format::context::Input;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::{FrameSource, SourceError};
use crate::video::domain::source_spec::SourceSpec;

/// Decodes files, network streams and capture devices via ffmpeg-next.
///
/// Each decoded picture is converted to RGB24. Any demux or decode failure
/// ends the stream the same way end-of-file does.
pub struct FfmpegFrameSource {
    metadata: VideoMetadata,
    state: Option<DecodeState>,
}

struct DecodeState {
    input: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    frame_index: usize,
    flushing: bool,
}

// Safety: the source is owned by exactly one session worker at a time and
// the ffmpeg contexts it wraps are never shared between threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    pub fn open(spec: &SourceSpec) -> Result<Self, SourceError> {
        ffmpeg_next::init().map_err(|e| SourceError::unavailable(spec, e))?;
        let input = open_input(spec).map_err(|e| SourceError::unavailable(spec, e))?;
        Self::from_input(input, spec.is_live())
            .map_err(|e| SourceError::unavailable(spec, e))
    }

    fn from_input(input: Input, live: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();
        if width == 0 || height == 0 {
            return Err("Video stream reports zero dimensions".into());
        }

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames: if live { 0 } else { stream.frames().max(0) as usize },
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
        };

        Ok(Self {
            metadata,
            state: Some(DecodeState {
                input,
                decoder,
                scaler,
                stream_index,
                width,
                height,
                frame_index: 0,
                flushing: false,
            }),
        })
    }
}

/// Longest a network read or connect may block before the source gives up.
const NETWORK_IO_TIMEOUT: Duration = Duration::from_secs(5);

fn open_input(spec: &SourceSpec) -> Result<Input, Box<dyn std::error::Error>> {
    match spec {
        SourceSpec::File(path) => Ok(ffmpeg_next::format::input(path)?),
        SourceSpec::Url(url) => open_url(url, NETWORK_IO_TIMEOUT),
        SourceSpec::Device(index) => open_device(CapturePlatform::current(), *index),
    }
}

fn open_url(url: &str, io_timeout: Duration) -> Result<Input, Box<dyn std::error::Error>> {
    ffmpeg_next::format::network::init();
    Ok(ffmpeg_next::format::input_with_dictionary(
        url,
        network_options(io_timeout),
    )?)
}

/// `rw_timeout` bounds every protocol read; `timeout` bounds socket I/O for
/// protocols (RTSP, HTTP) that manage their own sockets. Both are in
/// microseconds.
fn network_options(io_timeout: Duration) -> ffmpeg_next::Dictionary<'static> {
    let micros = io_timeout.as_micros().to_string();
    let mut options = ffmpeg_next::Dictionary::new();
    options.set("rw_timeout", &micros);
    options.set("timeout", &micros);
    options
}

/// Capture stack of the host, which decides how a device index is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CapturePlatform {
    V4l2,
    AvFoundation,
    DirectShow,
    Unsupported,
}

impl CapturePlatform {
    fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::V4l2
        } else if cfg!(target_os = "macos") {
            Self::AvFoundation
        } else if cfg!(target_os = "windows") {
            Self::DirectShow
        } else {
            Self::Unsupported
        }
    }

    fn demuxer(self) -> Option<&'static str> {
        match self {
            Self::V4l2 => Some("v4l2"),
            Self::AvFoundation => Some("avfoundation"),
            Self::DirectShow => Some("dshow"),
            Self::Unsupported => None,
        }
    }

    /// Input string the demuxer expects for the `index`-th camera.
    /// DirectShow addresses cameras by name, so `list_devices` is consulted
    /// only there.
    fn device_url(
        self,
        index: u32,
        list_devices: impl FnOnce() -> Result<Vec<String>, Box<dyn std::error::Error>>,
    ) -> Result<String, Box<dyn std::error::Error>> {
        match self {
            Self::V4l2 => Ok(format!("/dev/video{index}")),
            Self::AvFoundation => Ok(index.to_string()),
            Self::DirectShow => {
                let names = list_devices()?;
                let name = names.get(index as usize).ok_or_else(|| {
                    format!(
                        "Capture device {index} not found, {} video device(s) present",
                        names.len()
                    )
                })?;
                Ok(format!("video={name}"))
            }
            Self::Unsupported => {
                Err(format!("Capture device {index} is not supported on this platform").into())
            }
        }
    }
}

/// Opens a capture device through the platform's capture demuxer.
fn open_device(platform: CapturePlatform, index: u32) -> Result<Input, Box<dyn std::error::Error>> {
    ffmpeg_next::device::register_all();

    let demuxer = platform
        .demuxer()
        .ok_or_else(|| format!("Capture device {index} is not supported on this platform"))?;
    let format = ffmpeg_next::device::input::video()
        .find(|f| f.name().contains(demuxer))
        .ok_or_else(|| format!("No {demuxer} demuxer available for device {index}"))?;

    let url = platform.device_url(index, || list_video_devices(&format))?;
    log::debug!("Opening capture device {index} as {demuxer}:{url}");
    let ctx = ffmpeg_next::format::open_with(&url, &format, ffmpeg_next::Dictionary::new())?;
    Ok(ctx.input())
}

/// Names of the video devices the demuxer reports, in enumeration order.
#[cfg(target_os = "windows")]
fn list_video_devices(
    format: &ffmpeg_next::Format,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    use ffmpeg_next::ffi;
    use std::ffi::CStr;

    let ffmpeg_next::Format::Input(input) = format else {
        return Err("Capture demuxer is not an input format".into());
    };

    let mut list: *mut ffi::AVDeviceInfoList = std::ptr::null_mut();
    // Safety: `input` points at a registered demuxer and `list` is released
    // with avdevice_free_list_devices before returning.
    let ret = unsafe {
        ffi::avdevice_list_input_sources(
            input.as_ptr() as *mut ffi::AVInputFormat,
            std::ptr::null(),
            std::ptr::null_mut(),
            &mut list,
        )
    };
    if ret < 0 || list.is_null() {
        return Err(format!("Cannot list capture devices: {}", ffmpeg_next::Error::from(ret)).into());
    }

    let mut names = Vec::new();
    unsafe {
        let count = (*list).nb_devices.max(0) as usize;
        let devices = (*list).devices;
        for i in 0..count {
            let device = *devices.add(i);
            if device.is_null() || (*device).device_name.is_null() {
                continue;
            }
            let media_count = (*device).nb_media_types.max(0) as usize;
            let media = (*device).media_types;
            let video = media.is_null()
                || media_count == 0
                || (0..media_count)
                    .any(|m| *media.add(m) == ffi::AVMediaType::AVMEDIA_TYPE_VIDEO);
            if video {
                names.push(
                    CStr::from_ptr((*device).device_name)
                        .to_string_lossy()
                        .into_owned(),
                );
            }
        }
        ffi::avdevice_free_list_devices(&mut list);
    }
    Ok(names)
}

#[cfg(not(target_os = "windows"))]
fn list_video_devices(
    _format: &ffmpeg_next::Format,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    Err("Capture devices are enumerated only through dshow".into())
}

impl DecodeState {
    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut rgb_frame)?;

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }
        if self.flushing {
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = self.input.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                return self.try_receive();
            };

            if stream.index() != self.stream_index {
                continue;
            }

            // Corrupt packets are skipped; the decoder resynchronises on the
            // next keyframe.
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read(&mut self) -> Option<Frame> {
        let state = self.state.as_mut()?;
        match state.next_frame() {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                log::debug!("Source exhausted after {} frames", state.frame_index);
                self.state = None;
                None
            }
            Err(e) => {
                log::warn!("Decoding stopped at frame {}: {e}", state.frame_index);
                self.state = None;
                None
            }
        }
    }

    fn close(&mut self) {
        self.state = None;
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly packed RGB buffer,
/// dropping the per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}
