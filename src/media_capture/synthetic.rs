//! In-process virtual camera
//!
//! Renders a moving test pattern. Behaviour can be scripted to exercise
//! denial, not-ready and unreported-resolution paths.

use super::{
    MediaAccessError, MediaConstraints, MediaDevices, MediaStream, ReadyState, VideoFrame,
    DEFAULT_HEIGHT, DEFAULT_WIDTH,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// How the virtual camera responds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticBehavior {
    /// Grants access and produces frames at the requested resolution
    Live,
    /// Refuses access with the given error
    Deny(MediaAccessError),
    /// Grants access but never decodes a frame
    NeverReady,
    /// Produces frames but does not report its resolution
    UnreportedDimensions { width: u32, height: u32 },
}

/// Virtual camera device
pub struct SyntheticCamera {
    behavior: Mutex<SyntheticBehavior>,
    acquired: AtomicU64,
    stopped: Arc<AtomicU64>,
}

impl SyntheticCamera {
    pub fn new(behavior: SyntheticBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            acquired: AtomicU64::new(0),
            stopped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Change how the next request is answered
    pub fn set_behavior(&self, behavior: SyntheticBehavior) {
        *self.behavior.lock().unwrap_or_else(|p| p.into_inner()) = behavior;
    }

    /// Streams handed out so far
    pub fn acquired_count(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Streams whose tracks were stopped
    pub fn stopped_count(&self) -> u64 {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Streams still running
    pub fn live_count(&self) -> u64 {
        self.acquired_count().saturating_sub(self.stopped_count())
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(SyntheticBehavior::Live)
    }
}

#[async_trait]
impl MediaDevices for SyntheticCamera {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, MediaAccessError> {
        let Some(video) = constraints.video.as_ref() else {
            return Err(MediaAccessError::other("A video track is required"));
        };

        let behavior = self.behavior.lock().unwrap_or_else(|p| p.into_inner()).clone();

        let (frame_size, reported, ready) = match behavior {
            SyntheticBehavior::Deny(err) => return Err(err),
            SyntheticBehavior::Live => ((video.width, video.height), true, true),
            SyntheticBehavior::NeverReady => ((video.width, video.height), true, false),
            SyntheticBehavior::UnreportedDimensions { width, height } => {
                ((width, height), false, true)
            }
        };

        self.acquired.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(SyntheticStream {
            id: Uuid::new_v4().to_string(),
            width: frame_size.0.max(1),
            height: frame_size.1.max(1),
            reported,
            ready,
            live: true,
            tick: AtomicU64::new(0),
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

struct SyntheticStream {
    id: String,
    width: u32,
    height: u32,
    reported: bool,
    ready: bool,
    live: bool,
    tick: AtomicU64,
    stopped: Arc<AtomicU64>,
}

impl SyntheticStream {
    fn render(&self) -> VideoFrame {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let (w, h) = (self.width as usize, self.height as usize);
        let bar = (tick as usize * 8) % w;
        let mut data = Vec::with_capacity(w * h * 3);

        for y in 0..h {
            for x in 0..w {
                if x.abs_diff(bar) < 4 {
                    data.extend_from_slice(&[255, 255, 255]);
                } else {
                    data.push((x * 255 / w) as u8);
                    data.push((y * 255 / h) as u8);
                    data.push(128);
                }
            }
        }

        VideoFrame::new(self.width, self.height, data)
    }
}

impl MediaStream for SyntheticStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn ready_state(&self) -> ReadyState {
        if self.ready {
            ReadyState::HaveEnoughData
        } else {
            ReadyState::HaveMetadata
        }
    }

    fn video_dimensions(&self) -> Option<(u32, u32)> {
        self.reported.then_some((self.width, self.height))
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        self.ready.then(|| self.render())
    }

    fn stop_tracks(&mut self) {
        if self.live {
            self.live = false;
            self.stopped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
