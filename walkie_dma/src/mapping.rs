//! Physical memory windows mapped through `/dev/mem`.
//!
//! Every raw pointer access of the crate lives in this module. A
//! [`MappedRegion`] exclusively owns its mapping and unmaps it exactly once,
//! when dropped.

use core::{ffi::c_void, num, ptr};
use std::{fs, io, os::unix::fs::OpenOptionsExt, path::Path};

use nix::{
    fcntl::OFlag,
    libc::off_t,
    sys::mman::{MapFlags, ProtFlags, mmap, munmap},
};

use crate::{FrameBuffer, RegisterIo};

const WORD: usize = size_of::<u32>();

/// An open handle on the physical memory device.
#[derive(Debug)]
pub struct DevMem {
    file: fs::File,
}

impl DevMem {
    /// Opens `path` for synchronous, uncached reads and writes.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_SYNC.bits())
            .open(path)?;

        Ok(Self { file })
    }

    /// Maps `len` bytes of physical memory starting at `phys_addr`.
    ///
    /// The mapping stays valid after `self` is dropped.
    pub fn map(&self, phys_addr: u64, len: usize) -> io::Result<MappedRegion> {
        let len = num::NonZeroUsize::new(len).ok_or(io::ErrorKind::InvalidInput)?;
        let offset = off_t::try_from(phys_addr).map_err(|_| io::ErrorKind::InvalidInput)?;

        // SAFETY: a fresh shared mapping, placed by the kernel, aliases no Rust
        // object. All accesses through it go through volatile reads and writes.
        let base = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &self.file,
                offset,
            )
        }?;

        Ok(MappedRegion {
            base,
            len,
            phys_addr,
        })
    }
}

/// A mapped window of device or DMA memory.
#[derive(Debug)]
pub struct MappedRegion {
    base: ptr::NonNull<c_void>,
    len: num::NonZeroUsize,
    phys_addr: u64,
}

// SAFETY: the region is plain device memory only ever accessed through volatile
// word reads and writes, it carries no thread-affine state.
unsafe impl Send for MappedRegion {}
// SAFETY: see above, concurrent volatile accesses to distinct or identical
// words are what the hardware expects.
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len.get()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline(always)]
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    #[inline(always)]
    fn word(&self, byte_offset: usize) -> *mut u32 {
        assert!(
            byte_offset % WORD == 0 && byte_offset.strict_add(WORD) <= self.len(),
            "word access at {byte_offset:#x} outside of a {:#x} byte region",
            self.len(),
        );

        // SAFETY: in bounds, checked above.
        unsafe { self.base.as_ptr().cast::<u8>().add(byte_offset).cast() }
    }

    #[inline(always)]
    pub fn read_u32(&self, byte_offset: usize) -> u32 {
        // SAFETY: aligned and in bounds of a live mapping.
        unsafe { self.word(byte_offset).read_volatile() }
    }

    #[inline(always)]
    pub fn write_u32(&self, byte_offset: usize, value: u32) {
        // SAFETY: aligned and in bounds of a live mapping.
        unsafe { self.word(byte_offset).write_volatile(value) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: the mapping was created by `DevMem::map` with this length,
        // and no pointer into it outlives `self`.
        if let Err(e) = unsafe { munmap(self.base, self.len.get()) } {
            log::warn!("failed to unmap {:#x}: {e}", self.phys_addr);
        }
    }
}

impl RegisterIo for MappedRegion {
    #[inline(always)]
    fn read(&self, offset: usize) -> u32 {
        self.read_u32(offset)
    }

    #[inline(always)]
    fn write(&self, offset: usize, value: u32) {
        self.write_u32(offset, value)
    }
}

impl FrameBuffer for MappedRegion {
    #[inline(always)]
    fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    #[inline(always)]
    fn byte_len(&self) -> usize {
        self.len()
    }

    fn load(&mut self, samples: &[i32]) {
        for (i, &sample) in samples.iter().enumerate() {
            self.write_u32(i.strict_mul(WORD), sample as u32);
        }
    }

    fn store(&self, out: &mut [i32]) {
        for (i, sample) in out.iter_mut().enumerate() {
            *sample = self.read_u32(i.strict_mul(WORD)) as i32;
        }
    }
}

/// Register window plus the device handle it was mapped from.
///
/// Field order matters: the window is unmapped before the device is closed.
#[derive(Debug)]
pub struct DevMemRegisters {
    window: MappedRegion,
    _device: DevMem,
}

impl RegisterIo for DevMemRegisters {
    #[inline(always)]
    fn read(&self, offset: usize) -> u32 {
        self.window.read_u32(offset)
    }

    #[inline(always)]
    fn write(&self, offset: usize, value: u32) {
        self.window.write_u32(offset, value)
    }
}

/// Maps the controller and its frame buffers out of a physical memory device.
#[derive(Debug, Clone)]
pub struct DevMemBackend {
    path: std::path::PathBuf,
}

impl DevMemBackend {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl crate::DmaBackend for DevMemBackend {
    type Registers = DevMemRegisters;
    type Buffer = MappedRegion;

    fn map(
        &mut self,
        layout: &crate::DmaLayout,
    ) -> Result<crate::Mappings<Self::Registers, Self::Buffer>, crate::DmaError> {
        let unavailable = |what: &str, e: io::Error| {
            crate::DmaError::HardwareUnavailable(format!(
                "{what} ({}): {e}",
                self.path.display()
            ))
        };

        let device = DevMem::open(&self.path).map_err(|e| unavailable("open", e))?;

        // any mapping made before a failure is released on return
        let window = device
            .map(layout.register_base, layout.register_span)
            .map_err(|e| unavailable("map registers", e))?;
        let capture = device
            .map(layout.capture_base, layout.frame_bytes())
            .map_err(|e| unavailable("map capture buffer", e))?;
        let playback = device
            .map(layout.playback_base, layout.frame_bytes())
            .map_err(|e| unavailable("map playback buffer", e))?;

        Ok(crate::Mappings {
            registers: DevMemRegisters {
                window,
                _device: device,
            },
            capture,
            playback,
        })
    }
}
