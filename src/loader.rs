//! Asynchronous image loading
//!
//! Each request decodes on its own worker thread and reports back over a
//! channel. Scene state is only touched by the owner when it drains the
//! channel, so a pending load never leaves the scene half-updated. There is
//! no cancellation: a newer request for the same slot races the older one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::RgbaImage;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::material::{SurfaceRole, Texture};

/// Where image bytes come from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A file on disk (PNG or JPEG)
    Path(PathBuf),
    /// Encoded image bytes, e.g. from a file picker or an upload
    Bytes(Arc<[u8]>),
    /// Already decoded pixels
    Decoded(Arc<RgbaImage>),
}

impl ImageSource {
    fn decode(self) -> Result<Arc<RgbaImage>, LoadError> {
        match self {
            ImageSource::Path(path) => {
                let bytes = std::fs::read(&path).map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Arc::new(image::load_from_memory(&bytes)?.to_rgba8()))
            }
            ImageSource::Bytes(bytes) => Ok(Arc::new(image::load_from_memory(&bytes)?.to_rgba8())),
            ImageSource::Decoded(image) => Ok(image),
        }
    }

    fn describe(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            ImageSource::Decoded(image) => format!("<{}x{} image>", image.width(), image.height()),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<RgbaImage> for ImageSource {
    fn from(image: RgbaImage) -> Self {
        ImageSource::Decoded(Arc::new(image))
    }
}

/// The target a load result is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadSlot {
    Material(SurfaceRole),
    Background,
}

/// Ordering of overlapping loads for the same slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPolicy {
    /// Every completed load is applied; the one finishing last wins
    #[default]
    LastCompletedWins,
    /// Completions of superseded requests are discarded
    LatestRequestWins,
}

/// Result of one finished request
#[derive(Debug)]
pub struct LoadCompletion {
    pub slot: LoadSlot,
    pub generation: u64,
    pub result: Result<Texture, LoadError>,
}

/// Spawns decode workers and collects their results
pub struct TextureLoader {
    sender: Sender<LoadCompletion>,
    receiver: Receiver<LoadCompletion>,
    policy: LoadPolicy,
    next_generation: u64,
    latest: HashMap<LoadSlot, u64>,
    in_flight: usize,
}

impl TextureLoader {
    pub fn new(policy: LoadPolicy) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            policy,
            next_generation: 0,
            latest: HashMap::new(),
            in_flight: 0,
        }
    }

    /// Number of requests whose result has not been collected yet
    pub fn pending(&self) -> usize {
        self.in_flight
    }

    /// Start decoding `source` for `slot`. Returns the request generation.
    pub fn request(&mut self, slot: LoadSlot, source: ImageSource) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.latest.insert(slot, generation);
        self.in_flight += 1;

        debug!("Loading {} for {:?} (generation {})", source.describe(), slot, generation);

        let sender = self.sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("image-load-{generation}"))
            .spawn({
                let source = source.clone();
                move || {
                    let result = source.decode().and_then(Texture::from_artwork);
                    // The loader may already be gone; nobody is waiting then
                    let _ = sender.send(LoadCompletion {
                        slot,
                        generation,
                        result,
                    });
                }
            });

        if let Err(e) = spawned {
            warn!("Could not spawn image worker, decoding inline: {}", e);
            let result = source.decode().and_then(Texture::from_artwork);
            let _ = self.sender.send(LoadCompletion {
                slot,
                generation,
                result,
            });
        }

        generation
    }

    /// Collect every result that has arrived, without blocking
    pub fn poll(&mut self) -> Vec<LoadCompletion> {
        let arrived: Vec<_> = self.receiver.try_iter().collect();
        self.accept(arrived)
    }

    /// Block until every outstanding request finished or `timeout` elapsed
    pub fn wait(&mut self, timeout: Duration) -> Vec<LoadCompletion> {
        let deadline = Instant::now() + timeout;
        let mut arrived = Vec::new();
        let mut outstanding = self.in_flight;

        while outstanding > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(completion) => {
                    arrived.push(completion);
                    outstanding -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("{} image load(s) still pending after {:?}", outstanding, timeout);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.accept(arrived)
    }

    fn accept(&mut self, arrived: Vec<LoadCompletion>) -> Vec<LoadCompletion> {
        self.in_flight = self.in_flight.saturating_sub(arrived.len());
        match self.policy {
            LoadPolicy::LastCompletedWins => arrived,
            LoadPolicy::LatestRequestWins => arrived
                .into_iter()
                .filter(|completion| {
                    let current = self.latest.get(&completion.slot).copied();
                    let keep = current == Some(completion.generation);
                    if !keep {
                        debug!(
                            "Dropping superseded load for {:?} (generation {})",
                            completion.slot, completion.generation
                        );
                    }
                    keep
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const WAIT: Duration = Duration::from_secs(10);

    fn png_bytes(width: u32, height: u32) -> Arc<[u8]> {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes.into()
    }

    #[test]
    fn decodes_encoded_bytes_on_a_worker() {
        let mut loader = TextureLoader::new(LoadPolicy::default());
        let slot = LoadSlot::Material(SurfaceRole::Cover);
        let generation = loader.request(slot, ImageSource::Bytes(png_bytes(8, 4)));
        assert_eq!(loader.pending(), 1);

        let completions = loader.wait(WAIT);
        assert_eq!(loader.pending(), 0);
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].slot, slot);
        assert_eq!(completions[0].generation, generation);
        let texture = completions[0].result.as_ref().unwrap();
        assert_eq!((texture.width(), texture.height()), (8, 4));
    }

    #[test]
    fn reports_missing_files() {
        let mut loader = TextureLoader::new(LoadPolicy::default());
        loader.request(
            LoadSlot::Background,
            ImageSource::Path(PathBuf::from("/definitely/not/here.png")),
        );
        let completions = loader.wait(WAIT);
        assert!(matches!(completions[0].result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn reports_garbage_bytes() {
        let mut loader = TextureLoader::new(LoadPolicy::default());
        loader.request(LoadSlot::Background, ImageSource::Bytes(Arc::from(&b"not an image"[..])));
        let completions = loader.wait(WAIT);
        assert!(matches!(completions[0].result, Err(LoadError::Decode(_))));
    }

    #[test]
    fn last_completed_policy_keeps_every_result() {
        let mut loader = TextureLoader::new(LoadPolicy::LastCompletedWins);
        let slot = LoadSlot::Material(SurfaceRole::Spine);
        loader.request(slot, RgbaImage::new(2, 2).into());
        loader.request(slot, RgbaImage::new(3, 3).into());
        assert_eq!(loader.wait(WAIT).len(), 2);
    }

    #[test]
    fn latest_request_policy_drops_superseded_results() {
        let mut loader = TextureLoader::new(LoadPolicy::LatestRequestWins);
        let slot = LoadSlot::Material(SurfaceRole::Spine);
        loader.request(slot, RgbaImage::new(2, 2).into());
        let newest = loader.request(slot, RgbaImage::new(3, 3).into());
        loader.request(LoadSlot::Background, RgbaImage::new(1, 1).into());

        let completions = loader.wait(WAIT);
        assert_eq!(loader.pending(), 0);
        assert_eq!(completions.len(), 2);
        let spine: Vec<_> = completions.iter().filter(|c| c.slot == slot).collect();
        assert_eq!(spine.len(), 1);
        assert_eq!(spine[0].generation, newest);
    }
}
