//! Shared-memory SPSC queue (spec component C9): the wire format the
//! cosimulation device's stream arguments travel over between the host
//! process and the simulated kernel process. One side only ever pushes, the
//! other only ever pops, so the hot path needs no lock -- just two atomic
//! cursors into a ring of fixed-width slots.
//!
//! The header layout mirrors the original `SharedMemoryQueue` exactly (same
//! four-byte magic, same field order and widths) so a queue file written by
//! one side is readable by any implementation speaking the same format.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::MmapMut;

const MAGIC: [u8; 4] = *b"tapa";
const VERSION: i32 = 1;
const HEADER_LEN: usize = 32;

#[repr(C)]
struct Header {
    magic: [u8; 4],
    version: i32,
    depth: u32,
    width: u32,
    tail: AtomicU64,
    head: AtomicU64,
}

const _: () = assert!(std::mem::size_of::<Header>() == HEADER_LEN);

/// A lock-free single-producer single-consumer queue backed by a
/// memory-mapped file.
pub struct SharedMemoryQueue {
    _file: File,
    mmap: MmapMut,
}

fn init_header(file: &File, depth: u32, width: u32) -> io::Result<MmapMut> {
    file.set_len(HEADER_LEN as u64 + depth as u64 * width as u64)?;
    let mut mmap = unsafe { MmapMut::map_mut(file)? };
    {
        let header = header_mut(&mut mmap);
        header.magic = MAGIC;
        header.version = VERSION;
        header.depth = depth;
        header.width = width;
        header.tail = AtomicU64::new(0);
        header.head = AtomicU64::new(0);
    }
    Ok(mmap)
}

impl SharedMemoryQueue {
    /// Creates a new backing file sized for `depth` slots of `width` bytes
    /// each, writes the header, and maps it read-write.
    pub fn create(path: impl AsRef<Path>, depth: u32, width: u32) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mmap = init_header(&file, depth, width)?;

        Ok(Self { _file: file, mmap })
    }

    /// Atomically creates a uniquely-named backing file in `dir` (the
    /// rough Rust equivalent of `mkostemp`-ing a `<prefix>XXXXXX` template:
    /// the original's `CreateFile` mutates its path template in place to
    /// the name actually created), sized and initialized exactly like
    /// [`Self::create`]. Returns the queue plus the path the caller needs to
    /// hand to the other side of the channel.
    pub fn create_unique(dir: impl AsRef<Path>, prefix: &str, depth: u32, width: u32) -> anyhow::Result<(Self, std::path::PathBuf)> {
        let named = tempfile::Builder::new().prefix(prefix).tempfile_in(dir)?;
        let (file, path) = named.keep()?;
        let mmap = init_header(&file, depth, width)?;
        Ok((Self { _file: file, mmap }, path))
    }

    /// Maps an existing queue file, validating its header against the
    /// layout this binary expects.
    pub fn attach(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        {
            let header = header_ref(&mmap);
            anyhow::ensure!(
                header.magic == MAGIC,
                "unexpected magic {:?}; want {:?}",
                header.magic,
                MAGIC
            );
            anyhow::ensure!(
                header.version == VERSION,
                "unexpected version {}; want {VERSION}",
                header.version
            );
            anyhow::ensure!(header.depth > 0, "unexpected non-positive depth");
            anyhow::ensure!(header.width > 0, "unexpected non-positive width");
            let want_len = HEADER_LEN as u64 + header.depth as u64 * header.width as u64;
            anyhow::ensure!(
                mmap.len() as u64 >= want_len,
                "backing file is smaller than depth * width implies"
            );
        }

        Ok(Self { _file: file, mmap })
    }

    pub fn depth(&self) -> u32 {
        header_ref(&self.mmap).depth
    }

    pub fn width(&self) -> u32 {
        header_ref(&self.mmap).width
    }

    pub fn capacity(&self) -> u64 {
        self.depth() as u64
    }

    /// Number of elements currently queued. Only a snapshot: the other side
    /// may push or pop between the read and its use.
    pub fn size(&self) -> u64 {
        let header = header_ref(&self.mmap);
        header.head.load(Ordering::Acquire) - header.tail.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity()
    }

    /// Returns a copy of the element at the front of the queue. Panics if
    /// the queue is empty.
    pub fn front(&self) -> Vec<u8> {
        assert!(!self.is_empty(), "front() called on an empty queue");
        let tail = header_ref(&self.mmap).tail.load(Ordering::Acquire);
        self.slot(tail).to_vec()
    }

    /// Pops and returns the front element. Panics if the queue is empty.
    pub fn pop(&mut self) -> Vec<u8> {
        let val = self.front();
        header_mut(&mut self.mmap).tail.fetch_add(1, Ordering::Release);
        val
    }

    /// Pushes `val` onto the back of the queue. Panics if the queue is full
    /// or `val`'s length does not match the queue's configured width.
    pub fn push(&mut self, val: &[u8]) {
        assert!(!self.is_full(), "push() called on a full queue");
        assert_eq!(val.len(), self.width() as usize, "unexpected input length");

        let head = header_ref(&self.mmap).head.load(Ordering::Acquire);
        let offset = self.slot_offset(head);
        let width = val.len();
        self.mmap[offset..offset + width].copy_from_slice(val);
        header_mut(&mut self.mmap).head.fetch_add(1, Ordering::Release);
    }

    fn slot_offset(&self, seq: u64) -> usize {
        let header = header_ref(&self.mmap);
        HEADER_LEN + (seq % header.depth as u64) as usize * header.width as usize
    }

    fn slot(&self, seq: u64) -> &[u8] {
        let offset = self.slot_offset(seq);
        let width = self.width() as usize;
        &self.mmap[offset..offset + width]
    }
}

fn header_ref(mmap: &MmapMut) -> &Header {
    unsafe { &*(mmap.as_ptr() as *const Header) }
}

fn header_mut(mmap: &mut MmapMut) -> &mut Header {
    unsafe { &mut *(mmap.as_mut_ptr() as *mut Header) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("shm-queue-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn push_pop_round_trips_in_fifo_order() {
        let path = temp_path("roundtrip");
        let mut q = SharedMemoryQueue::create(&path, 4, 8).unwrap();
        q.push(&[1; 8]);
        q.push(&[2; 8]);
        assert_eq!(q.size(), 2);
        assert_eq!(q.pop(), vec![1; 8]);
        assert_eq!(q.pop(), vec![2; 8]);
        assert!(q.is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reports_full_at_capacity() {
        let path = temp_path("full");
        let mut q = SharedMemoryQueue::create(&path, 2, 4).unwrap();
        q.push(&[0; 4]);
        q.push(&[0; 4]);
        assert!(q.is_full());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    #[should_panic(expected = "full queue")]
    fn push_past_capacity_panics() {
        let path = temp_path("overfull");
        let mut q = SharedMemoryQueue::create(&path, 1, 4).unwrap();
        q.push(&[0; 4]);
        q.push(&[0; 4]);
    }

    #[test]
    fn attach_sees_the_creating_side_header() {
        let path = temp_path("attach");
        {
            let _q = SharedMemoryQueue::create(&path, 8, 16).unwrap();
        }
        let q = SharedMemoryQueue::attach(&path).unwrap();
        assert_eq!(q.depth(), 8);
        assert_eq!(q.width(), 16);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn attach_rejects_garbage_header() {
        let path = temp_path("garbage");
        std::fs::write(&path, vec![0u8; HEADER_LEN]).unwrap();
        assert!(SharedMemoryQueue::attach(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn writer_and_reader_handles_see_the_same_data() {
        let path = temp_path("cross-handle");
        let mut writer = SharedMemoryQueue::create(&path, 4, 4).unwrap();
        writer.push(&[7, 7, 7, 7]);

        let mut reader = SharedMemoryQueue::attach(&path).unwrap();
        assert_eq!(reader.pop(), vec![7, 7, 7, 7]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn create_unique_derives_a_fresh_path_from_the_template() {
        let dir = std::env::temp_dir();
        let (mut q, path_a) = SharedMemoryQueue::create_unique(&dir, "shm-queue-test-unique-a-", 4, 4).unwrap();
        let (_q2, path_b) = SharedMemoryQueue::create_unique(&dir, "shm-queue-test-unique-b-", 4, 4).unwrap();
        assert_ne!(path_a, path_b);
        q.push(&[9, 9, 9, 9]);
        let mut attached = SharedMemoryQueue::attach(&path_a).unwrap();
        assert_eq!(attached.pop(), vec![9, 9, 9, 9]);
        let _ = std::fs::remove_file(&path_a);
        let _ = std::fs::remove_file(&path_b);
    }
}
