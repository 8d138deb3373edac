use nix::sys::mman::{mmap, mremap, munmap, MRemapFlags, MapFlags, ProtFlags};
use std::ffi::c_void;
use std::os::unix::io::RawFd;

/// `ScopedMmap` owns a memory region that is automatically unmapped when the
/// value is dropped.
pub struct ScopedMmap {
    // it's only `mut` because `munmap` wants `mut` pointers.
    addr: *mut c_void,
    len: usize,
}

impl ScopedMmap {
    /// Reserves `len` bytes of address space with a private anonymous
    /// read/write mapping. The kernel picks the address.
    pub fn reserve_anonymous(len: usize) -> nix::Result<Self> {
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS,
                -1,
                /* offset = */ 0,
            )
        }?;
        Ok(Self { addr, len })
    }

    /// Maps the first `len` bytes of the file as a shared read/write mapping.
    /// `hint` is a preferred placement address, not a hard requirement; the
    /// caller must check `addr()` if placement matters.
    pub fn from_file_shared(fd: RawFd, len: usize, hint: Option<*mut c_void>) -> nix::Result<Self> {
        let addr = unsafe {
            mmap(
                hint.unwrap_or(std::ptr::null_mut()),
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                /* offset = */ 0,
            )
        }?;
        Ok(Self { addr, len })
    }

    /// Extends the mapping to `new_len` bytes without permission to move it.
    /// Fails if the region cannot grow at its current address.
    pub fn grow_in_place(&mut self, new_len: usize) -> nix::Result<()> {
        let addr = unsafe { mremap(self.addr, self.len, new_len, MRemapFlags::empty(), None) }?;
        // Without MREMAP_MAYMOVE the kernel either grows in place or fails.
        debug_assert_eq!(addr, self.addr);
        self.len = new_len;
        Ok(())
    }

    /// Returns the start address of the memory mapping.
    pub fn addr(&self) -> *mut c_void {
        self.addr
    }

    /// Returns the length of the mapped region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the memory region has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores one byte into the mapping. The store is volatile and faults the
    /// page in: for a shared file mapping the kernel allocates backing blocks
    /// at fault time and delivers SIGBUS to this instruction when it cannot.
    pub fn write_byte(&self, offset: usize, value: u8) {
        assert!(offset < self.len);
        unsafe { (self.addr as *mut u8).add(offset).write_volatile(value) }
    }

    /// Unmaps the region now, reporting failure to the caller instead of
    /// panicking in drop.
    pub fn release(mut self) -> nix::Result<()> {
        let res = if self.len > 0 {
            unsafe { munmap(self.addr, self.len) }
        } else {
            Ok(())
        };
        self.len = 0;
        res
    }
}

impl Drop for ScopedMmap {
    fn drop(&mut self) {
        if self.len > 0 {
            unsafe { munmap(self.addr, self.len) }.expect("Failed to unmap");
        }
    }
}
