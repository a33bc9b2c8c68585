//! Thin mmap wrapper shared by the `devmem` and `p2ab` transports.

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::ptr::NonNull;

use crate::HostIoError;

/// An owned mmap of a file at a given offset/length, opened read-write.
pub struct MmapWindow {
    ptr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for MmapWindow {}

impl MmapWindow {
    /// Opens `path` and mmaps `len` bytes starting at `offset`, both
    /// read and write, `MAP_SHARED`.
    pub fn open(path: &str, offset: u64, len: usize) -> Result<Self, HostIoError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                log::warn!("open({path}) failed: {e}");
                HostIoError::from(e)
            })?;
        Self::from_fd(file.as_raw_fd(), offset, len)
    }

    fn from_fd(fd: i32, offset: u64, len: usize) -> Result<Self, HostIoError> {
        if len == 0 {
            return Err(HostIoError::InvalidArgument("zero-length mmap".into()));
        }
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            let e = std::io::Error::last_os_error();
            log::warn!("mmap(offset={offset:#x}, len={len:#x}) failed: {e}");
            return Err(HostIoError::from(e));
        }
        Ok(MmapWindow {
            // SAFETY: mmap returned a non-MAP_FAILED pointer.
            ptr: unsafe { NonNull::new_unchecked(ptr as *mut u8) },
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Reads `buf.len()` bytes starting at byte offset `off` within the
    /// window using ordinary (non-volatile) byte copies.
    pub fn read_at(&self, off: usize, buf: &mut [u8]) {
        let src = unsafe { self.ptr.as_ptr().add(off) };
        unsafe { std::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len()) }
    }

    pub fn write_at(&self, off: usize, buf: &[u8]) {
        let dst = unsafe { self.ptr.as_ptr().add(off) };
        unsafe { std::ptr::copy_nonoverlapping(buf.as_ptr(), dst, buf.len()) }
    }

    /// Reads a single 32-bit word with `read_volatile`, for MMIO registers
    /// where the compiler must not elide or reorder the access.
    pub fn readl_at(&self, off: usize) -> u32 {
        let p = unsafe { self.ptr.as_ptr().add(off) } as *const u32;
        unsafe { std::ptr::read_volatile(p) }
    }

    pub fn writel_at(&self, off: usize, value: u32) {
        let p = unsafe { self.ptr.as_ptr().add(off) } as *mut u32;
        unsafe { std::ptr::write_volatile(p, value) }
        io_barrier();
    }
}

impl Drop for MmapWindow {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

/// Platform I/O barrier issued after an MMIO write that matters (§5).
#[cfg(target_arch = "x86_64")]
pub fn io_barrier() {
    unsafe { std::arch::asm!("mfence", options(nomem, nostack)) };
}

#[cfg(not(target_arch = "x86_64"))]
pub fn io_barrier() {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}
