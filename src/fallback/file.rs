//! File fallback: keeps undelivered audio on disk.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::PcmFormat;
use crate::fallback::FallbackSink;
use crate::{AudioChunk, SinkError};

/// RIFF + fmt + data chunk headers for 16-byte PCM fmt.
const WAV_HEADER_LEN: usize = 44;

/// On-disk layout of the fallback file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    /// Chunk bytes back to back, nothing else.
    Raw,
    /// Canonical 44-byte WAV header followed by the chunk bytes.
    Wav(PcmFormat),
}

/// Builds a WAV header for `data_len` bytes of `format` audio.
fn wav_header(format: &PcmFormat, data_len: u32) -> [u8; WAV_HEADER_LEN] {
    let block_align = format.channels * (format.bits_per_sample / 8);
    let riff_len = (WAV_HEADER_LEN as u32 - 8).saturating_add(data_len);

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_len.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    // format tag 1 = integer PCM
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&format.channels.to_le_bytes());
    header[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&format.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&format.bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    header
}

/// A fallback that appends played chunks to a file.
///
/// The file is created lazily on the first `play`, so a session that never
/// loses its peers leaves nothing behind. For WAV output the size fields are
/// rewritten on `stop`. Disk I/O runs on the blocking thread pool.
///
/// # Example
///
/// ```no_run
/// use syncstream::{FileFallback, PcmFormat};
///
/// let fallback = FileFallback::wav("undelivered.wav", PcmFormat::default());
/// // Use with the SyncStream builder...
/// ```
pub struct FileFallback {
    name: String,
    path: PathBuf,
    container: Container,
    inner: Arc<Mutex<Recording>>,
}

#[derive(Default)]
struct Recording {
    file: Option<BufWriter<File>>,
    staged: Option<Arc<Vec<u8>>>,
    data_len: u64,
}

impl Recording {
    fn append(&mut self, path: &Path, container: Container) -> std::io::Result<bool> {
        let Some(bytes) = self.staged.take() else {
            return Ok(false);
        };

        if self.file.is_none() {
            let mut file = BufWriter::new(File::create(path)?);
            if let Container::Wav(format) = container {
                // sizes are placeholders until finish()
                file.write_all(&wav_header(&format, 0))?;
            }
            self.file = Some(file);
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(&bytes)?;
        }
        self.data_len += bytes.len() as u64;
        Ok(true)
    }

    fn finish(&mut self, container: Container) -> std::io::Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        if let Container::Wav(format) = container {
            let data_len = u32::try_from(self.data_len).unwrap_or(u32::MAX);
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&wav_header(&format, data_len))?;
        }
        file.flush()
    }
}

impl FileFallback {
    /// Creates a fallback that writes a WAV file describing `format`.
    pub fn wav(path: impl AsRef<Path>, format: PcmFormat) -> Self {
        Self::with_container(path.as_ref(), Container::Wav(format))
    }

    /// Creates a fallback that writes chunk bytes with no header.
    pub fn raw(path: impl AsRef<Path>) -> Self {
        Self::with_container(path.as_ref(), Container::Raw)
    }

    fn with_container(path: &Path, container: Container) -> Self {
        Self {
            name: format!("file:{}", path.display()),
            path: path.to_path_buf(),
            container,
            inner: Arc::new(Mutex::new(Recording::default())),
        }
    }

    /// Returns the path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of audio bytes written so far, headers excluded.
    pub fn bytes_written(&self) -> u64 {
        self.inner.lock().data_len
    }

    async fn on_blocking_pool<F>(&self, op: F) -> Result<(), SinkError>
    where
        F: FnOnce(&mut Recording, &Path, Container) -> Result<(), SinkError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let path = self.path.clone();
        let container = self.container;

        tokio::task::spawn_blocking(move || op(&mut inner.lock(), &path, container))
            .await
            .map_err(|e| SinkError::custom(format!("file task failed: {e}")))?
    }
}

#[async_trait]
impl FallbackSink for FileFallback {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
        self.inner.lock().staged = Some(Arc::clone(&chunk.bytes));
        Ok(())
    }

    async fn play(&self) -> Result<(), SinkError> {
        self.on_blocking_pool(|recording, path, container| {
            match recording.append(path, container) {
                Ok(true) => Ok(()),
                Ok(false) => Err(SinkError::NotInitialized),
                Err(e) => Err(SinkError::file_error(path, e)),
            }
        })
        .await
    }

    async fn stop(&self) -> Result<(), SinkError> {
        self.on_blocking_pool(|recording, path, container| {
            recording
                .finish(container)
                .map_err(|e| SinkError::file_error(path, e))
        })
        .await
    }
}
