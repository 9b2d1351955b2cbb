//! Filesystem-backed chunk store.

use crate::error::{UploadError, UploadResult};
use attest_core::{SNIFF_LEN, SessionId, SessionMetadata, SessionState, sanitize_filename};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

const SESSIONS_DIR: &str = "sessions";
const TMP_DIR: &str = "tmp";
const METADATA_FILE: &str = "metadata.json";
const CHUNK_PREFIX: &str = "chunk_";

/// An assembled upload ready for validation.
#[derive(Clone, Debug)]
pub struct AssembledUpload {
    /// Path of the assembled file, still inside the session directory.
    pub path: PathBuf,
    /// Sanitized filename the file was written under.
    pub filename: String,
}

/// Filesystem-backed chunked upload store.
///
/// Each session occupies `<root>/sessions/<session_id>/` with one
/// `chunk_<index>` file per received chunk and a `metadata.json` document.
/// Sessions for different ids never share files, so concurrent uploads to
/// different sessions cannot interfere. Completion is derived by scanning
/// which chunk files exist, which makes detection idempotent under
/// concurrent chunk arrivals.
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Create a new store rooted at the given directory.
    pub async fn new(root: impl AsRef<Path>) -> UploadResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(SESSIONS_DIR)).await?;
        fs::create_dir_all(root.join(TMP_DIR)).await?;
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one session. Session ids only parse as 32 hex
    /// characters, so the joined path cannot escape the sessions root.
    fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(SESSIONS_DIR).join(id.to_string())
    }

    /// Create a new empty session and return its id.
    pub async fn create_session(&self) -> UploadResult<SessionId> {
        let id = SessionId::new();
        let dir = self.session_dir(&id);
        fs::create_dir_all(&dir).await?;
        self.write_metadata(&dir, &SessionMetadata::new(id)).await?;
        tracing::info!(session_id = %id, "created upload session");
        Ok(id)
    }

    /// Store one chunk of a session's file.
    ///
    /// Chunk 0 fixes the session's filename and chunk total; later values
    /// for either are ignored. Re-sending a chunk index overwrites the
    /// previous bytes for that index. Progress and completion are derived
    /// from the chunk files present on disk after the write. An assembled
    /// session no longer accepts chunks.
    pub async fn save_chunk(
        &self,
        id: &SessionId,
        chunk_index: u32,
        total_chunks: u32,
        data: Bytes,
        original_filename: Option<&str>,
    ) -> UploadResult<SessionMetadata> {
        let (dir, mut metadata) = self.read_metadata(id).await?;

        if !metadata.state.is_accepting_chunks() {
            return Err(UploadError::Session(
                attest_core::Error::InvalidStateTransition {
                    from: metadata.state.as_str(),
                    to: SessionState::Receiving.as_str(),
                },
            ));
        }

        if chunk_index == 0 {
            // Names that collide with the session's own files would let the
            // assembled output overwrite a chunk or the metadata document;
            // those fall back to the generated name instead.
            let sanitized = original_filename
                .map(sanitize_filename)
                .filter(|s| !s.is_empty() && s != METADATA_FILE && !s.starts_with(CHUNK_PREFIX));
            metadata.record_upload_info(sanitized.as_deref(), total_chunks);
        }

        // Once the total is fixed, out-of-range indices are rejected so the
        // received count can never exceed it
        if metadata.total_chunks > 0 && chunk_index >= metadata.total_chunks {
            return Err(UploadError::InvalidChunkIndex {
                index: chunk_index,
                total: metadata.total_chunks,
            });
        }

        // Write to a unique temp file, then rename into place. Concurrent
        // writers for the same index last-write-win without torn files.
        let chunk_path = dir.join(format!("{CHUNK_PREFIX}{chunk_index}"));
        let temp_path = dir.join(format!(".{CHUNK_PREFIX}{chunk_index}.{}.tmp", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &chunk_path).await?;

        let received = self.scan_received(&dir, metadata.total_chunks).await?;
        metadata.set_progress(received);
        self.write_metadata(&dir, &metadata).await?;

        tracing::debug!(
            session_id = %id,
            chunk_index,
            chunks_received = metadata.chunks_received,
            total_chunks = metadata.total_chunks,
            complete = metadata.complete,
            "stored chunk"
        );
        Ok(metadata)
    }

    /// Read-only status snapshot for a session.
    ///
    /// Progress is re-derived from the chunk files on disk, so the snapshot
    /// is authoritative even if a metadata write was lost.
    pub async fn status(&self, id: &SessionId) -> UploadResult<SessionMetadata> {
        let (dir, mut metadata) = self.read_metadata(id).await?;
        let received = self.scan_received(&dir, metadata.total_chunks).await?;
        metadata.set_progress(received);
        Ok(metadata)
    }

    /// Concatenate all chunks into the final file.
    ///
    /// Refused unless the session is complete. Chunks are appended in
    /// strict ascending index order; a missing chunk file aborts the
    /// assembly and leaves any partial output behind, so callers must treat
    /// a failure here as fatal for the session.
    pub async fn assemble(&self, id: &SessionId) -> UploadResult<AssembledUpload> {
        let (dir, mut metadata) = self.read_metadata(id).await?;

        if !metadata.complete {
            return Err(UploadError::AssemblyIncomplete(id.to_string()));
        }

        let filename = metadata.effective_filename();
        let out_path = dir.join(&filename);
        let mut out = fs::File::create(&out_path).await?;

        for index in 0..metadata.total_chunks {
            let chunk_path = dir.join(format!("{CHUNK_PREFIX}{index}"));
            let chunk = match fs::read(&chunk_path).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(UploadError::MissingChunk {
                        session: id.to_string(),
                        index,
                    });
                }
                Err(e) => return Err(e.into()),
            };
            out.write_all(&chunk).await?;
        }
        out.sync_all().await?;

        metadata.mark_assembled()?;
        self.write_metadata(&dir, &metadata).await?;

        tracing::info!(
            session_id = %id,
            filename = %filename,
            total_chunks = metadata.total_chunks,
            "assembled upload"
        );
        Ok(AssembledUpload {
            path: out_path,
            filename,
        })
    }

    /// Remove a session directory and everything in it.
    ///
    /// A missing directory counts as already cleaned up and returns
    /// success. With `keep_assembled`, the assembled file is first moved to
    /// the store's shared tmp directory so it survives the deletion; the
    /// new path is returned.
    pub async fn cleanup(
        &self,
        id: &SessionId,
        keep_assembled: bool,
    ) -> UploadResult<Option<PathBuf>> {
        let dir = self.session_dir(id);
        if !fs::try_exists(&dir).await? {
            tracing::debug!(session_id = %id, "session already cleaned up");
            return Ok(None);
        }

        let mut preserved = None;
        if keep_assembled {
            // Best effort: a session with damaged metadata still gets removed
            if let Ok((_, metadata)) = self.read_metadata(id).await {
                let assembled = dir.join(metadata.effective_filename());
                if fs::try_exists(&assembled).await? {
                    let target = self
                        .root
                        .join(TMP_DIR)
                        .join(format!("{}_{}", id, metadata.effective_filename()));
                    fs::rename(&assembled, &target).await?;
                    tracing::info!(
                        session_id = %id,
                        path = %target.display(),
                        "preserved assembled file"
                    );
                    preserved = Some(target);
                }
            }
        }

        fs::remove_dir_all(&dir).await?;
        tracing::info!(session_id = %id, "cleaned up upload session");
        Ok(preserved)
    }

    async fn read_metadata(&self, id: &SessionId) -> UploadResult<(PathBuf, SessionMetadata)> {
        let dir = self.session_dir(id);
        let raw = match fs::read(dir.join(METADATA_FILE)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(UploadError::SessionNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = serde_json::from_slice(&raw)?;
        Ok((dir, metadata))
    }

    async fn write_metadata(&self, dir: &Path, metadata: &SessionMetadata) -> UploadResult<()> {
        let data = serde_json::to_vec(metadata)?;
        let temp_path = dir.join(format!(".metadata.{}.tmp", Uuid::new_v4()));
        fs::write(&temp_path, &data).await?;
        fs::rename(&temp_path, dir.join(METADATA_FILE)).await?;
        Ok(())
    }

    /// Count the expected chunk files present in a session directory.
    ///
    /// Only indices inside `[0, total)` count once the total is known;
    /// before that every chunk file counts.
    async fn scan_received(&self, dir: &Path, total: u32) -> UploadResult<u32> {
        let mut count = 0u32;
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(index) = name.strip_prefix(CHUNK_PREFIX) else {
                continue;
            };
            let Ok(index) = index.parse::<u32>() else {
                continue;
            };
            if total == 0 || index < total {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Read the leading bytes of a file for magic-number MIME detection.
pub async fn file_header(path: &Path) -> UploadResult<Vec<u8>> {
    let mut file = fs::File::open(path).await?;
    let mut buf = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    loop {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            break;
        }
    }
    buf.truncate(filled);
    Ok(buf)
}
