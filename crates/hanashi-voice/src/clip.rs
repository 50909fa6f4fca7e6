//! Frame sources for the speaking animation, plus image folder helpers.
//!
//! A [`ClipSource`] is cheap and long-lived; [`ClipSource::open`] produces the
//! [`FrameStream`] that holds the decode handle. Dropping the stream releases it.

use crate::error::{AgentError, AgentResult};
use crate::surface::Frame;
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An open, decodable clip.
pub trait FrameStream: Send {
    /// Native frames per second, when the container reports one.
    fn frame_rate(&self) -> Option<f64>;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> AgentResult<Option<Frame>>;

    /// Seek back to the first frame.
    fn rewind(&mut self) -> AgentResult<()>;
}

/// Something that can be opened as a [`FrameStream`].
pub trait ClipSource: Send + Sync {
    fn open(&self) -> AgentResult<Box<dyn FrameStream>>;

    /// Used in logs and error messages.
    fn location(&self) -> PathBuf;
}

/// Animated GIF on disk.
///
/// `image` frame iterators are not `Send`, so frames are decoded up front when the
/// clip is opened and dropped with the stream.
#[derive(Debug, Clone)]
pub struct GifClip {
    path: PathBuf,
}

impl GifClip {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ClipSource for GifClip {
    fn open(&self) -> AgentResult<Box<dyn FrameStream>> {
        let file = File::open(&self.path).map_err(|e| AgentError::media(&self.path, e))?;
        let decoder =
            GifDecoder::new(BufReader::new(file)).map_err(|e| AgentError::media(&self.path, e))?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| AgentError::media(&self.path, e))?;

        let total_ms: f64 = frames
            .iter()
            .map(|f| {
                let (num, den) = f.delay().numer_denom_ms();
                if den == 0 {
                    0.0
                } else {
                    num as f64 / den as f64
                }
            })
            .sum();
        let frame_rate = if total_ms > 0.0 && !frames.is_empty() {
            Some(1000.0 * frames.len() as f64 / total_ms)
        } else {
            None
        };

        info!(
            "🎞️ Opened clip {} ({} frames, {:?} fps)",
            self.path.display(),
            frames.len(),
            frame_rate
        );
        Ok(Box::new(GifStream {
            path: self.path.clone(),
            frames: frames.into_iter().map(image::Frame::into_buffer).collect(),
            position: 0,
            frame_rate,
        }))
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}

struct GifStream {
    path: PathBuf,
    frames: Vec<Frame>,
    position: usize,
    frame_rate: Option<f64>,
}

impl FrameStream for GifStream {
    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn next_frame(&mut self) -> AgentResult<Option<Frame>> {
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> AgentResult<()> {
        self.position = 0;
        Ok(())
    }
}

impl Drop for GifStream {
    fn drop(&mut self) {
        debug!("Released clip {}", self.path.display());
    }
}

/// A folder of still frames played in file-name order at a fixed rate.
#[derive(Debug, Clone)]
pub struct FrameSequenceClip {
    dir: PathBuf,
    fps: f64,
    extensions: Vec<String>,
}

impl FrameSequenceClip {
    pub fn new(dir: impl Into<PathBuf>, fps: f64, extensions: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            fps,
            extensions,
        }
    }
}

impl ClipSource for FrameSequenceClip {
    fn open(&self) -> AgentResult<Box<dyn FrameStream>> {
        let files = list_images(&self.dir, &self.extensions).map_err(|e| AgentError::media(&self.dir, e))?;
        if files.is_empty() {
            return Err(AgentError::media(&self.dir, "no frames in folder"));
        }
        info!("🎞️ Opened frame folder {} ({} frames)", self.dir.display(), files.len());
        Ok(Box::new(SequenceStream {
            dir: self.dir.clone(),
            files,
            position: 0,
            fps: self.fps,
        }))
    }

    fn location(&self) -> PathBuf {
        self.dir.clone()
    }
}

struct SequenceStream {
    dir: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    fps: f64,
}

impl FrameStream for SequenceStream {
    fn frame_rate(&self) -> Option<f64> {
        Some(self.fps)
    }

    fn next_frame(&mut self) -> AgentResult<Option<Frame>> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        load_frame(path).map(Some)
    }

    fn rewind(&mut self) -> AgentResult<()> {
        self.position = 0;
        Ok(())
    }
}

impl Drop for SequenceStream {
    fn drop(&mut self) {
        debug!("Released frame folder {}", self.dir.display());
    }
}

/// Pick a clip implementation from the path: a directory is a frame folder, anything else a GIF.
pub fn clip_for_path(path: &Path, fps: f64, extensions: &[String]) -> Box<dyn ClipSource> {
    if path.is_dir() {
        Box::new(FrameSequenceClip::new(path, fps, extensions.to_vec()))
    } else {
        Box::new(GifClip::new(path))
    }
}

/// Decode one still image as RGBA.
pub fn load_frame(path: &Path) -> AgentResult<Frame> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| AgentError::media(path, e))
}

/// Files in `dir` whose extension is in `extensions` (case-insensitive), sorted by file name.
pub fn list_images(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extensions))
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
