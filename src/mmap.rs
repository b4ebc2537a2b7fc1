//! Read-only views of input files
//!
//! Large inputs are memory-mapped so the encoder can address any 4-byte
//! window without copying the file onto the heap. Where mapping is not
//! available (non-Unix targets, empty files, or when disabled) the file is read
//! in chunks instead.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes of an input file, mapped or buffered.
pub enum InputView {
    #[cfg(unix)]
    Mapped(MappedFile),
    Buffered(Vec<u8>),
}

impl InputView {
    /// Open `path`, mapping it when `use_mmap` is set and the platform allows.
    pub fn open<P: AsRef<Path>>(path: P, use_mmap: bool, chunk: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        #[cfg(unix)]
        if use_mmap && len > 0 {
            return Ok(InputView::Mapped(MappedFile::new(&file, len)?));
        }
        #[cfg(not(unix))]
        let _ = use_mmap;

        read_chunked(file, len, chunk).map(InputView::Buffered)
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            #[cfg(unix)]
            InputView::Mapped(m) => m.as_slice(),
            InputView::Buffered(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mapped(&self) -> bool {
        match self {
            #[cfg(unix)]
            InputView::Mapped(_) => true,
            InputView::Buffered(_) => false,
        }
    }
}

fn read_chunked(mut file: File, len: u64, chunk: usize) -> io::Result<Vec<u8>> {
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    let mut data = Vec::with_capacity(len);
    // Sized to the file so a large chunk on a small file stays small
    let mut buf = vec![0u8; chunk.clamp(1, len.max(1))];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    Ok(data)
}

/// Read-only `mmap(2)` of a whole file
#[cfg(unix)]
pub struct MappedFile {
    ptr: *mut u8,
    len: usize,
}

#[cfg(unix)]
impl MappedFile {
    fn new(file: &File, len: u64) -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;
        use std::ptr;

        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file too large to map"))?;
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "cannot mmap empty file",
            ));
        }

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(MappedFile {
            ptr: ptr as *mut u8,
            len,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

#[cfg(unix)]
impl Drop for MappedFile {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

// SAFETY: the mapping is PROT_READ and private; nothing writes through it.
#[cfg(unix)]
unsafe impl Send for MappedFile {}
#[cfg(unix)]
unsafe impl Sync for MappedFile {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_mapped_and_buffered_agree() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let mapped = InputView::open(file.path(), true, 4096).unwrap();
        let buffered = InputView::open(file.path(), false, 333).unwrap();
        assert_eq!(mapped.as_slice(), &data[..]);
        assert_eq!(buffered.as_slice(), &data[..]);
        assert!(!buffered.is_mapped());
        #[cfg(unix)]
        assert!(mapped.is_mapped());
    }

    #[test]
    fn test_read_buffer_bounded_by_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"tiny").unwrap();
        file.flush().unwrap();

        let view = InputView::open(file.path(), false, usize::MAX).unwrap();
        assert_eq!(view.as_slice(), b"tiny");
    }

    #[test]
    fn test_empty_file_is_buffered() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let view = InputView::open(file.path(), true, 4096).unwrap();
        assert!(view.is_empty());
        assert!(!view.is_mapped());
    }
}
