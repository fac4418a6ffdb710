//! Frame sources backed by still images

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, info, instrument};

use super::{scale, Frame, FrameSource};
use crate::error::{Error, Result};
use crate::utils::is_image_file;

/// Plays a directory of still frames (sorted by file name) or a single image.
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    cursor: usize,
    working_width: u32,
    frame_rate: f64,
    sequence: u64,
}

impl ImageSequenceSource {
    pub fn open(path: &Path, working_width: u32, frame_rate: f64) -> Result<Self> {
        let files = if path.is_dir() {
            let mut files = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_file(p))
                .collect::<Vec<_>>();
            files.sort();
            files
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(Error::Source(format!("{} does not exist", path.display())));
        };

        if files.is_empty() {
            return Err(Error::Source(format!(
                "no image frames found in {}",
                path.display()
            )));
        }

        info!(
            "Image sequence source: {} frame(s) from {} at {:.1} fps",
            files.len(),
            path.display(),
            frame_rate
        );

        Ok(Self {
            files,
            cursor: 0,
            working_width,
            frame_rate,
            sequence: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    #[instrument(skip(self), fields(cursor = self.cursor))]
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let decoded = scale::decode_file(path)?;
        let image = scale::scale_to_width(decoded, self.working_width);
        debug!(path = %path.display(), "frame decoded");

        self.sequence += 1;
        Ok(Some(Frame::new(image, self.sequence)))
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}

/// Frames already in memory. Handy for embedding callers and tests.
pub struct MemorySource {
    frames: Vec<Arc<RgbImage>>,
    cursor: usize,
    frame_rate: f64,
    sequence: u64,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>, frame_rate: f64) -> Self {
        Self {
            frames: frames.into_iter().map(Arc::new).collect(),
            cursor: 0,
            frame_rate,
            sequence: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(image) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        self.sequence += 1;

        let (width, height) = image.dimensions();
        Ok(Some(Frame {
            image: Arc::clone(image),
            meta: Arc::new(super::FrameMetadata {
                sequence: self.sequence,
                width,
                height,
            }),
        }))
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, count: u8, width: u32) {
        for i in 0..count {
            let img = RgbImage::from_pixel(width, width / 2, Rgb([i * 10, 0, 0]));
            img.save(dir.join(format!("frame_{i:03}.png"))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();
    }

    #[test]
    fn plays_directory_in_name_order_and_rescales() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 3, 40);

        let mut source = ImageSequenceSource::open(dir.path(), 20, 25.0).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.frame_rate(), 25.0);

        let reds: Vec<u8> = std::iter::from_fn(|| source.next_frame().unwrap())
            .map(|f| {
                assert_eq!(f.dimensions(), (20, 10));
                f.image.get_pixel(0, 0)[0]
            })
            .collect();
        assert_eq!(reds, vec![0, 10, 20]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn rewind_restarts_but_sequence_keeps_counting() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 2, 20);

        let mut source = ImageSequenceSource::open(dir.path(), 20, 30.0).unwrap();
        while source.next_frame().unwrap().is_some() {}
        source.rewind().unwrap();

        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.image.get_pixel(0, 0)[0], 0);
        assert_eq!(frame.meta.sequence, 3);
    }

    #[test]
    fn empty_directory_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path(), 600, 30.0),
            Err(Error::Source(_))
        ));
    }

    #[test]
    fn memory_source_shares_buffers() {
        let mut source = MemorySource::new(vec![RgbImage::new(4, 4)], 30.0);
        let a = source.next_frame().unwrap().unwrap();
        source.rewind().unwrap();
        let b = source.next_frame().unwrap().unwrap();
        assert!(Arc::ptr_eq(&a.image, &b.image));
        assert!(source.next_frame().unwrap().is_none());
    }
}
