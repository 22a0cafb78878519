//! Host-side view of a buffer argument: a raw pointer plus a length, tagged
//! with its read/write intent. No ownership of the pointed-to memory -- the
//! caller's allocation must outlive the device.

use std::marker::PhantomData;

use graph_abi::BufferTag;

/// A typed view over caller-owned memory, as handed to `set_buffer_arg`.
pub struct Buffer<T> {
    ptr: *mut T,
    len: usize,
    tag: BufferTag,
    _marker: PhantomData<T>,
}

impl<T> Buffer<T> {
    /// # Safety
    /// `ptr` must be valid for `len` elements of `T` for the lifetime of this
    /// `Buffer`, and not aliased mutably elsewhere while it is live.
    pub unsafe fn new(ptr: *mut T, len: usize, tag: BufferTag) -> Self {
        Self {
            ptr,
            len,
            tag,
            _marker: PhantomData,
        }
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_in_bytes(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    pub fn tag(&self) -> BufferTag {
        self.tag
    }

    /// Raw little-endian bytes of the buffer, for `write_to_device`.
    ///
    /// # Safety
    /// Caller must uphold the invariant established in `new`.
    pub unsafe fn as_bytes(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr as *const u8, self.size_in_bytes())
    }

    /// Mutable view of the same bytes, for `read_from_device` writing
    /// simulation output back into the caller's allocation.
    ///
    /// # Safety
    /// Caller must uphold the invariant established in `new`.
    pub unsafe fn as_mut_bytes(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr as *mut u8, self.size_in_bytes())
    }

    /// Reinterprets this buffer as one of element type `U`, matching the
    /// alignment and size-divisibility checks the framework enforces before
    /// letting a kernel's view of memory differ from the host's.
    ///
    /// # Panics
    /// If the reinterpreted pointer is not `align_of::<U>()`-aligned, or if
    /// the element-size ratio between `T` and `U` does not evenly divide the
    /// buffer (in whichever direction the resize goes).
    pub fn reinterpret<U>(&self) -> Buffer<U> {
        let size_t = std::mem::size_of::<T>();
        let size_u = std::mem::size_of::<U>();

        let new_len = if size_u > size_t {
            let n = size_u / size_t;
            assert_eq!(
                size_u % size_t,
                0,
                "sizeof(U) must be a multiple of sizeof(T) when reinterpreting; got \
                 sizeof(U) = {size_u}, sizeof(T) = {size_t}"
            );
            assert_eq!(
                self.len % n,
                0,
                "size of buffer must be a multiple of N (= sizeof(U)/sizeof(T)) when \
                 reinterpreted; got size = {}, N = {n}",
                self.len
            );
            self.len / n
        } else if size_u < size_t {
            assert_eq!(
                size_t % size_u,
                0,
                "sizeof(T) must be a multiple of sizeof(U) when reinterpreting; got \
                 sizeof(T) = {size_t}, sizeof(U) = {size_u}"
            );
            self.len * (size_t / size_u)
        } else {
            self.len
        };

        assert_eq!(
            (self.ptr as usize) % std::mem::align_of::<U>(),
            0,
            "buffer data must be {}-byte aligned to be reinterpreted",
            std::mem::align_of::<U>()
        );

        Buffer {
            ptr: self.ptr as *mut U,
            len: new_len,
            tag: self.tag,
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinterpret_widening_divides_length() {
        let mut data: [i32; 4] = [1, 2, 3, 4];
        let buf = unsafe { Buffer::new(data.as_mut_ptr(), 4, BufferTag::ReadWrite) };
        let wide: Buffer<i64> = buf.reinterpret();
        assert_eq!(wide.len(), 2);
    }

    #[test]
    fn reinterpret_narrowing_multiplies_length() {
        let mut data: [i64; 2] = [1, 2];
        let buf = unsafe { Buffer::new(data.as_mut_ptr(), 2, BufferTag::ReadOnly) };
        let narrow: Buffer<i32> = buf.reinterpret();
        assert_eq!(narrow.len(), 4);
    }

    #[test]
    #[should_panic(expected = "must be a multiple of")]
    fn reinterpret_widening_requires_divisible_length() {
        let mut data: [i32; 3] = [1, 2, 3];
        let buf = unsafe { Buffer::new(data.as_mut_ptr(), 3, BufferTag::ReadWrite) };
        let _wide: Buffer<i64> = buf.reinterpret();
    }
}
