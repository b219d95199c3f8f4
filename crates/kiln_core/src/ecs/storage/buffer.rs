// buffer.rs - Aligned, untyped byte buffer backing one component vector.
//
// Unlike Vec<u8>, the allocation honours the slot alignment of the component
// stored in it, and growth only happens when the owner asks for it (or, as a
// fallback, when a push finds no spare capacity).

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

pub(crate) struct RawBuffer {
    ptr: NonNull<u8>,
    len: usize,
    cap: usize,
    align: usize,
}

impl RawBuffer {
    /// Create an empty buffer; nothing is allocated until the first reserve.
    pub(crate) fn new(align: usize) -> Self {
        assert!(align.is_power_of_two(), "buffer alignment must be a power of two");
        Self {
            // Dangling but aligned, like Vec's empty state.
            ptr: NonNull::new(align as *mut u8).unwrap_or(NonNull::dangling()),
            len: 0,
            cap: 0,
            align,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Grow the allocation to hold at least `bytes` bytes.
    ///
    /// Returns `true` when the buffer moved to a new allocation.
    pub(crate) fn reserve_exact(&mut self, bytes: usize) -> bool {
        if bytes <= self.cap {
            return false;
        }

        let new_layout = Layout::from_size_align(bytes, self.align)
            .unwrap_or_else(|_| panic!("component buffer capacity overflow ({bytes} bytes)"));
        // SAFETY: `bytes > self.cap >= 0`, so the layout is non-zero sized.
        let new_ptr = unsafe { alloc::alloc(new_layout) };
        let Some(new_ptr) = NonNull::new(new_ptr) else {
            alloc::handle_alloc_error(new_layout);
        };

        if self.cap > 0 {
            // SAFETY: both regions are valid for `len` bytes and cannot overlap.
            unsafe {
                ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr.as_ptr(), self.len);
                alloc::dealloc(self.ptr.as_ptr(), self.layout());
            }
        }

        self.ptr = new_ptr;
        self.cap = bytes;
        true
    }

    /// Set the logical length.
    ///
    /// # Safety
    /// `len <= capacity()` and every byte below `len` that will be read as a
    /// value must have been initialized by the caller.
    #[inline]
    pub(crate) unsafe fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.cap);
        self.len = len;
    }

    /// Remove `start..end` by shifting the tail left. The removed bytes must
    /// already have been dropped by the caller.
    pub(crate) fn remove_range(&mut self, start: usize, end: usize) {
        assert!(start <= end && end <= self.len, "byte range out of bounds");
        let tail = self.len - end;
        // SAFETY: source and destination lie within the initialized region;
        // `ptr::copy` handles the overlap.
        unsafe {
            let base = self.ptr.as_ptr();
            ptr::copy(base.add(end), base.add(start), tail);
        }
        self.len -= end - start;
    }

    fn layout(&self) -> Layout {
        // SAFETY: this exact layout was validated when the allocation was made.
        unsafe { Layout::from_size_align_unchecked(self.cap, self.align) }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        if self.cap > 0 {
            // SAFETY: allocated in `reserve_exact` with this layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout()) };
        }
    }
}

// SAFETY: RawBuffer uniquely owns its allocation; sharing rules for the
// values stored in it are enforced by ComponentVector (components are
// `Send + Sync`).
unsafe impl Send for RawBuffer {}
