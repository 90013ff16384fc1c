//! Named shared-memory segments
//!
//! A segment is a file-backed mapping under `/dev/shm` (falling back to
//! the system temp directory where that mount does not exist). Exactly
//! one process owns a segment: the owner creates and sizes the file,
//! zero-fills the mapping and unlinks the name on drop. Non-owners open
//! the existing file and never unlink.

use anyhow::{Context, Result};
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, Ordering};
use tracing::{debug, warn};

/// A named, memory-mapped shared region with single-owner lifecycle.
pub struct SharedSegment {
    map: MmapMut,
    path: PathBuf,
    is_owner: bool,
}

fn segment_path(name: &str) -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.join(name)
    } else {
        std::env::temp_dir().join(name)
    }
}

impl SharedSegment {
    /// Create a segment of `len` bytes, becoming its owner.
    ///
    /// When the name already exists this degrades to a plain open (the
    /// original creator keeps ownership), mirroring the classic
    /// create-exclusive-then-open fallback.
    pub fn create(name: &str, len: usize) -> Result<Self> {
        let path = segment_path(name);
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => {
                file.set_len(len as u64)
                    .with_context(|| format!("failed to size shared segment {name}"))?;
                // SAFETY: the file is freshly created, writable and sized
                // to `len`; the mapping lives as long as `self`.
                let mut map = unsafe { MmapMut::map_mut(&file) }
                    .with_context(|| format!("failed to map shared segment {name}"))?;
                // Zero-fill so openers never observe uninitialized bytes,
                // then publish with a release fence.
                map[..].fill(0);
                fence(Ordering::Release);
                debug!(name, len, "created shared segment");
                Ok(Self {
                    map,
                    path,
                    is_owner: true,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(name, "segment already exists, opening instead");
                Self::open(name, len)
            }
            Err(e) => {
                Err(e).with_context(|| format!("failed to create shared segment {name}"))
            }
        }
    }

    /// Open an existing segment without taking ownership.
    pub fn open(name: &str, len: usize) -> Result<Self> {
        let path = segment_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open shared segment {name}"))?;
        let actual = file
            .metadata()
            .with_context(|| format!("failed to stat shared segment {name}"))?
            .len() as usize;
        anyhow::ensure!(
            actual >= len,
            "shared segment {name} is {actual} bytes, expected at least {len}"
        );
        // SAFETY: the file is open read-write and at least `len` bytes;
        // the mapping lives as long as `self`.
        let map = unsafe { MmapMut::map_mut(&file) }
            .with_context(|| format!("failed to map shared segment {name}"))?;
        debug!(name, len, "opened shared segment");
        Ok(Self {
            map,
            path,
            is_owner: false,
        })
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }

    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.map.as_ptr() as *mut u8
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    /// Whether this handle created (and will unlink) the segment.
    #[inline]
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        // Make every prior write visible before the region goes away.
        fence(Ordering::SeqCst);
        if self.is_owner {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "failed to unlink shared segment");
                }
            }
        }
    }
}
