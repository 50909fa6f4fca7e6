//! Looping slideshow.
//!
//! Independent of the conversation: it shares the surface and the scheduler with
//! the avatar but draws only into its own region.

use crate::clip;
use crate::config::PresentationConfig;
use crate::desk::Desk;
use crate::error::AgentResult;
use crate::scale::fit_frame;
use crate::scheduler::{SchedulerHandle, TimerHandle};
use crate::status::Severity;
use crate::surface::{announce, DisplaySurface, Frame, Geometry};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One decoded slide.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub path: PathBuf,
    pub frame: Frame,
}

#[derive(Debug, Clone, Default)]
pub struct PresentationState {
    pub playing: bool,
    pub items: Vec<MediaItem>,
    pub current_index: usize,
}

#[derive(Debug)]
pub struct PresentationController {
    state: PresentationState,
    config: PresentationConfig,
    region: Geometry,
    visible: bool,
    timer: Option<TimerHandle>,
}

impl PresentationController {
    pub fn new(items: Vec<MediaItem>, config: PresentationConfig) -> Self {
        let region = Geometry::new(config.min_width, config.min_height);
        Self {
            state: PresentationState {
                items,
                ..Default::default()
            },
            config,
            region,
            visible: false,
            timer: None,
        }
    }

    /// Decode every image in `folder`, seeding placeholder slides first when the folder is absent.
    pub fn load(folder: &Path, config: PresentationConfig) -> Self {
        if !folder.exists() && config.seed_placeholders {
            match seed_placeholders(folder) {
                Ok(()) => info!("🖼️ Created placeholder slides in {}", folder.display()),
                Err(e) => warn!("⚠️ Placeholder slides failed: {}", e),
            }
        }

        let files = match clip::list_images(folder, &config.extensions) {
            Ok(files) => files,
            Err(e) => {
                warn!("⚠️ Slide folder {} unreadable: {}", folder.display(), e);
                Vec::new()
            }
        };

        let items: Vec<MediaItem> = files
            .into_iter()
            .filter_map(|path| match clip::load_frame(&path) {
                Ok(frame) => Some(MediaItem { path, frame }),
                Err(e) => {
                    warn!("⚠️ Skipping slide: {}", e);
                    None
                }
            })
            .collect();

        if items.is_empty() {
            warn!("No slides to show in {}", folder.display());
        } else {
            info!("🖼️ Loaded {} slides from {}", items.len(), folder.display());
        }
        Self::new(items, config)
    }

    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn len(&self) -> usize {
        self.state.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.items.is_empty()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn region(&self) -> Geometry {
        self.region
    }

    pub fn play(&mut self, surface: &mut dyn DisplaySurface, sched: &SchedulerHandle<Desk>) {
        if self.state.playing {
            debug!("Slideshow already playing");
            return;
        }
        if self.state.items.is_empty() {
            announce(surface, Severity::Error, "スライドショーに表示する画像がありません。");
            return;
        }

        self.state.playing = true;
        self.visible = true;
        surface.set_presentation_visible(true);
        self.render(surface);
        self.schedule_tick(sched);
        info!("▶️ Slideshow started ({} slides)", self.state.items.len());
    }

    pub fn pause(&mut self, surface: &mut dyn DisplaySurface) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if !self.state.playing {
            return;
        }
        self.state.playing = false;
        self.visible = false;
        surface.set_presentation_visible(false);
        info!("⏸️ Slideshow stopped");
    }

    /// Advance one slide, wrapping. Works while paused.
    pub fn next(&mut self, surface: &mut dyn DisplaySurface) {
        if self.state.items.is_empty() {
            return;
        }
        self.state.current_index = (self.state.current_index + 1) % self.state.items.len();
        debug!("Slide {}", self.state.current_index);
        self.render(surface);
    }

    /// Timer callback: advance and re-arm while playing.
    pub fn tick(&mut self, surface: &mut dyn DisplaySurface, sched: &SchedulerHandle<Desk>) {
        self.timer = None;
        if !self.state.playing {
            return;
        }
        self.next(surface);
        self.schedule_tick(sched);
    }

    pub fn on_resize(&mut self, window: Geometry, surface: &mut dyn DisplaySurface) {
        let scaled = window.scaled(self.config.width_fraction, self.config.height_fraction);
        self.region = Geometry::new(
            scaled.width.max(self.config.min_width),
            scaled.height.max(self.config.min_height),
        );
        self.render(surface);
    }

    fn schedule_tick(&mut self, sched: &SchedulerHandle<Desk>) {
        self.timer = Some(sched.post_after(self.config.interval(), |desk: &mut Desk| desk.tick_slideshow()));
    }

    fn render(&self, surface: &mut dyn DisplaySurface) {
        if !self.visible {
            return;
        }
        if let Some(item) = self.state.items.get(self.state.current_index) {
            surface.show_slide(&fit_frame(&item.frame, self.region, FilterType::Lanczos3));
        }
    }
}

/// Three 400x300 solid slides named `slide_1.png` .. `slide_3.png`.
pub fn seed_placeholders(folder: &Path) -> AgentResult<()> {
    fs::create_dir_all(folder)?;
    for i in 0..3u32 {
        let colour = Rgb([(i * 80) as u8, (i * 40) as u8, (255 - i * 80) as u8]);
        RgbImage::from_pixel(400, 300, colour).save(folder.join(format!("slide_{}.png", i + 1)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::test_support::TallySurface;
    use image::Rgba;

    #[test]
    fn absent_folder_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("img");
        let p = PresentationController::load(&folder, PresentationConfig::default());
        assert_eq!(p.len(), 3);
        assert!(folder.join("slide_1.png").exists());
        let first = &p.state().items[0];
        assert_eq!(first.frame.dimensions(), (400, 300));
        assert_eq!(first.frame.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(p.state().items[2].frame.get_pixel(0, 0).0, [160, 80, 95, 255]);
    }

    #[test]
    fn empty_existing_folder_stays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let p = PresentationController::load(dir.path(), PresentationConfig::default());
        assert!(p.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unreadable_items_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        seed_placeholders(dir.path()).unwrap();
        fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let p = PresentationController::load(dir.path(), PresentationConfig::default());
        assert_eq!(p.len(), 3);
    }

    #[tokio::test]
    async fn resizing_to_the_same_window_redraws_the_same_size() {
        let sched = Scheduler::<Desk>::new();
        for window in [Geometry::new(950, 1080), Geometry::new(1, 1), Geometry::new(4000, 90)] {
            let item = MediaItem {
                path: PathBuf::from("slide_1.png"),
                frame: Frame::from_pixel(400, 300, Rgba([5, 5, 5, 255])),
            };
            let mut p = PresentationController::new(vec![item], PresentationConfig::default());
            let mut surface = TallySurface::default();
            p.play(&mut surface, &sched.handle());
            p.on_resize(window, &mut surface);
            p.on_resize(window, &mut surface);

            let tally = surface.tally();
            assert_eq!(tally.slides.len(), 3, "window {window}");
            assert_eq!(tally.slides[1], tally.slides[2], "window {window}");
            let (w, h) = tally.slides[2];
            assert!(w >= 1 && h >= 1, "window {window}");
            assert!(w <= p.region().width && h <= p.region().height, "window {window}");
        }
    }

    #[test]
    fn seeding_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("img");
        let config = PresentationConfig {
            seed_placeholders: false,
            ..Default::default()
        };
        let p = PresentationController::load(&folder, config);
        assert!(p.is_empty());
        assert!(!folder.exists());
    }
}
