//! Slideshow source over a folder of still images.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use hidlink_core::{FrameOrigin, FrameType, HidLinkError};
use tracing::{debug, info, warn};

use crate::{FrameSource, SourceFrame};

/// File extensions the panels can decode, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// Plays the supported images of one directory in file-name order. The
/// listing is taken once at [`open`](Self::open) and replayed every pass;
/// files are read lazily, one per frame.
#[derive(Debug)]
pub struct DirectoryImageSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl DirectoryImageSource {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, HidLinkError> {
        let dir = dir.into();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| HidLinkError::source_unavailable(&dir, e.to_string()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HidLinkError::source_unavailable(&dir, e.to_string()))?
        {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && frame_type_for(&path).is_some() {
                files.push(path);
            }
        }

        if files.is_empty() {
            return Err(HidLinkError::source_unavailable(&dir, "no supported image files"));
        }
        files.sort();

        info!("Image folder {}: {} frame(s)", dir.display(), files.len());
        Ok(Self { dir, files, cursor: 0 })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

#[async_trait]
impl FrameSource for DirectoryImageSource {
    async fn begin_pass(&mut self) -> Result<(), HidLinkError> {
        self.cursor = 0;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<SourceFrame>, HidLinkError> {
        while let Some(path) = self.files.get(self.cursor).cloned() {
            self.cursor += 1;

            // Files removed after the listing was taken are skipped, not fatal.
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            debug!("Read {} ({} bytes)", path.display(), data.len());

            let frame_type = frame_type_for(&path).unwrap_or(FrameType::Image);
            return Ok(Some(SourceFrame {
                payload: Bytes::from(data),
                frame_type,
                timestamp: None,
                origin: FrameOrigin::File(path),
            }));
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("image folder {} ({} files)", self.dir.display(), self.files.len())
    }
}

/// `Jpeg` for JPEG files, `Image` for other supported formats, `None` otherwise.
fn frame_type_for(path: &Path) -> Option<FrameType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    Some(match ext.as_str() {
        "jpg" | "jpeg" => FrameType::Jpeg,
        _ => FrameType::Image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        dir
    }

    async fn collect_pass(source: &mut DirectoryImageSource) -> Vec<SourceFrame> {
        source.begin_pass().await.unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = source.next_frame().await.unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn filters_and_sorts_supported_images() {
        let dir = fixture(&["b.PNG", "a.jpg", "notes.txt", "c.jpeg", "d.bmp"]);
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let mut source = DirectoryImageSource::open(dir.path()).await.unwrap();
        let frames = collect_pass(&mut source).await;

        let names: Vec<String> = frames
            .iter()
            .map(|f| match &f.origin {
                FrameOrigin::File(p) => p.file_name().unwrap().to_string_lossy().into_owned(),
                other => panic!("unexpected origin {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.jpeg", "d.bmp"]);
        assert_eq!(frames[0].frame_type, FrameType::Jpeg);
        assert_eq!(frames[1].frame_type, FrameType::Image);
        assert_eq!(&frames[0].payload[..], b"a.jpg");
    }

    #[tokio::test]
    async fn every_pass_replays_the_same_frames() {
        let dir = fixture(&["1.png", "2.png"]);
        let mut source = DirectoryImageSource::open(dir.path()).await.unwrap();

        assert_eq!(collect_pass(&mut source).await.len(), 2);
        assert_eq!(collect_pass(&mut source).await.len(), 2);
    }

    #[tokio::test]
    async fn vanished_files_are_skipped() {
        let dir = fixture(&["1.png", "2.png", "3.png"]);
        let mut source = DirectoryImageSource::open(dir.path()).await.unwrap();
        std::fs::remove_file(dir.path().join("2.png")).unwrap();

        assert_eq!(collect_pass(&mut source).await.len(), 2);
    }

    #[tokio::test]
    async fn missing_or_empty_folder_is_unavailable() {
        let empty = fixture(&["readme.md"]);
        assert!(matches!(
            DirectoryImageSource::open(empty.path()).await,
            Err(HidLinkError::SourceUnavailable { .. })
        ));

        let missing = empty.path().join("does-not-exist");
        assert!(matches!(
            DirectoryImageSource::open(missing).await,
            Err(HidLinkError::SourceUnavailable { .. })
        ));
    }
}
