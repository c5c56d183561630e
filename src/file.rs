//! Temporary files of fixed-size records.
//!
//! Every record is a sequence of little-endian `u64` words. A [`RawFile`] owns
//! the temp path and deletes it on drop; writers append, streams read whole
//! blocks in either direction.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::TempPath;

use crate::error::{Error, Result};
use crate::ptr::Ptr;

/// Single field of a record.
pub trait Word: Copy {
    fn to_word(self) -> u64;
    fn from_word(word: u64) -> Self;
}

impl Word for u64 {
    fn to_word(self) -> u64 {
        self
    }
    fn from_word(word: u64) -> Self {
        word
    }
}

impl Word for bool {
    fn to_word(self) -> u64 {
        self as u64
    }
    fn from_word(word: u64) -> Self {
        word != 0
    }
}

impl Word for Ptr {
    fn to_word(self) -> u64 {
        self.raw()
    }
    fn from_word(word: u64) -> Self {
        Ptr::from_raw(word)
    }
}

/// Value with a fixed on-disk layout of `WORDS` words.
pub trait Record: Copy {
    const WORDS: usize;
    const SIZE: usize = Self::WORDS * 8;

    fn write_words(&self, out: &mut [u64]);
    fn read_words(words: &[u64]) -> Self;
}

/// Implements [`Record`] for a struct whose fields are all [`Word`]s, in declaration order.
macro_rules! impl_record {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl $crate::file::Record for $ty {
            const WORDS: usize = [$(stringify!($field)),+].len();

            fn write_words(&self, out: &mut [u64]) {
                let mut i = 0;
                $(
                    out[i] = $crate::file::Word::to_word(self.$field);
                    i += 1;
                )+
                debug_assert_eq!(i, Self::WORDS);
            }

            fn read_words(words: &[u64]) -> Self {
                let mut i = 0;
                $(
                    let $field = $crate::file::Word::from_word(words[i]);
                    i += 1;
                )+
                debug_assert_eq!(i, Self::WORDS);
                Self { $($field),+ }
            }
        }
    };
}
pub(crate) use impl_record;

impl Record for u64 {
    const WORDS: usize = 1;

    fn write_words(&self, out: &mut [u64]) {
        out[0] = *self;
    }

    fn read_words(words: &[u64]) -> Self {
        words[0]
    }
}

fn encode<T: Record>(record: &T, words: &mut [u64], bytes: &mut [u8]) {
    record.write_words(words);
    for (chunk, word) in bytes.chunks_exact_mut(8).zip(words.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}

fn decode<T: Record>(bytes: &[u8], words: &mut [u64]) -> T {
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut le = [0u8; 8];
        le.copy_from_slice(chunk);
        *word = u64::from_le_bytes(le);
    }
    T::read_words(words)
}

/// Reading order of a [`RecordStream`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    /// In the order records were written.
    Forward,
    /// Last written record first.
    Backward,
}

/// An append-only temporary file of `T` records.
#[derive(Debug)]
pub struct RawFile<T> {
    path: TempPath,
    len: AtomicU64,
    _marker: PhantomData<T>,
}

impl<T: Record> RawFile<T> {
    /// Creates an empty file in `dir`, or in the system temp directory.
    pub fn create(dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("extdd-");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(Self {
            path: file.into_temp_path(),
            len: AtomicU64::new(0),
            _marker: PhantomData,
        })
    }

    /// Number of committed records.
    pub fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a writer appending after the committed records.
    pub fn append(&self) -> Result<RecordWriter<T>> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(RecordWriter {
            out: BufWriter::new(file),
            written: self.len(),
            words: vec![0; T::WORDS],
            bytes: vec![0; T::SIZE],
            _marker: PhantomData,
        })
    }

    /// Flushes `writer` and makes its records visible to new streams.
    pub fn commit(&self, writer: RecordWriter<T>) -> Result<()> {
        let written = writer.finish()?;
        self.len.store(written, Ordering::Release);
        Ok(())
    }

    pub fn stream(&self, direction: Direction, block_size: usize) -> Result<RecordStream<T>> {
        let file = File::open(&self.path)?;
        Ok(RecordStream::new(file, self.len(), direction, block_size))
    }

    /// Writes all `records` at once. Used for small files and in tests.
    pub fn write_all(&self, records: impl IntoIterator<Item = T>) -> Result<()> {
        let mut writer = self.append()?;
        for r in records {
            writer.push(&r)?;
        }
        self.commit(writer)
    }

    pub fn read_all(&self, direction: Direction) -> Result<Vec<T>> {
        self.stream(direction, 1 << 16)?.collect()
    }
}

/// Buffered appender for a [`RawFile`]. Records become visible on [`RawFile::commit`].
pub struct RecordWriter<T> {
    out: BufWriter<File>,
    written: u64,
    words: Vec<u64>,
    bytes: Vec<u8>,
    _marker: PhantomData<T>,
}

impl<T: Record> RecordWriter<T> {
    pub fn push(&mut self, record: &T) -> Result<()> {
        encode(record, &mut self.words, &mut self.bytes);
        self.out.write_all(&self.bytes)?;
        self.written += 1;
        Ok(())
    }

    /// Total number of records in the file, including the ones pushed here.
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    fn finish(mut self) -> io::Result<u64> {
        self.out.flush()?;
        Ok(self.written)
    }
}

/// Block-buffered reader over the committed prefix of a [`RawFile`].
pub struct RecordStream<T> {
    file: File,
    len: u64,
    remaining: u64,
    direction: Direction,
    block: usize,
    // next record is at the end
    buffer: Vec<T>,
    words: Vec<u64>,
    bytes: Vec<u8>,
}

impl<T: Record> RecordStream<T> {
    fn new(file: File, len: u64, direction: Direction, block_size: usize) -> Self {
        Self {
            file,
            len,
            remaining: len,
            direction,
            block: (block_size / T::SIZE).max(1),
            buffer: Vec::new(),
            words: vec![0; T::WORDS],
            bytes: Vec::new(),
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn can_pull(&self) -> bool {
        !self.buffer.is_empty() || self.remaining > 0
    }

    pub fn peek(&mut self) -> Result<T> {
        self.fill()?;
        self.buffer.last().copied().ok_or_else(|| Error::exhausted("stream"))
    }

    pub fn pull(&mut self) -> Result<T> {
        self.fill()?;
        self.buffer.pop().ok_or_else(|| Error::exhausted("stream"))
    }

    /// Restarts the stream from its first record.
    pub fn reset(&mut self) {
        self.remaining = self.len;
        self.buffer.clear();
    }

    fn fill(&mut self) -> Result<()> {
        if !self.buffer.is_empty() || self.remaining == 0 {
            return Ok(());
        }
        let n = self.remaining.min(self.block as u64);
        let start = match self.direction {
            Direction::Forward => self.len - self.remaining,
            Direction::Backward => self.remaining - n,
        };
        self.file.seek(SeekFrom::Start(start * T::SIZE as u64))?;
        self.bytes.resize(n as usize * T::SIZE, 0);
        self.file.read_exact(&mut self.bytes)?;
        for chunk in self.bytes.chunks_exact(T::SIZE) {
            self.buffer.push(decode(chunk, &mut self.words));
        }
        if self.direction == Direction::Forward {
            self.buffer.reverse();
        }
        self.remaining -= n;
        Ok(())
    }
}

impl<T: Record> Iterator for RecordStream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.can_pull() {
            Some(self.pull())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::node::{Arc, Node};

    #[test]
    fn test_forward_and_backward() {
        let file = RawFile::<u64>::create(None).unwrap();
        file.write_all(0..100).unwrap();
        assert_eq!(file.len(), 100);

        // small blocks so that several refills happen
        let fwd: Vec<u64> = file.stream(Direction::Forward, 24).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(fwd, (0..100).collect::<Vec<_>>());

        let bwd: Vec<u64> = file.stream(Direction::Backward, 24).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(bwd, (0..100).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let file = RawFile::<u64>::create(None).unwrap();
        file.write_all([5, 6]).unwrap();
        let mut s = file.stream(Direction::Forward, 64).unwrap();
        assert_eq!(s.peek().unwrap(), 5);
        assert_eq!(s.peek().unwrap(), 5);
        assert_eq!(s.pull().unwrap(), 5);
        assert_eq!(s.pull().unwrap(), 6);
        assert!(!s.can_pull());
        assert!(s.pull().is_err());
        s.reset();
        assert_eq!(s.pull().unwrap(), 5);
    }

    #[test]
    fn test_uncommitted_records_are_invisible() {
        let file = RawFile::<u64>::create(None).unwrap();
        let mut w = file.append().unwrap();
        w.push(&1).unwrap();
        assert_eq!(file.len(), 0);
        assert!(!file.stream(Direction::Forward, 64).unwrap().can_pull());
        file.commit(w).unwrap();
        assert_eq!(file.read_all(Direction::Forward).unwrap(), vec![1]);
    }

    #[test]
    fn test_append_continues() {
        let file = RawFile::<u64>::create(None).unwrap();
        file.write_all([1, 2]).unwrap();
        file.write_all([3]).unwrap();
        assert_eq!(file.read_all(Direction::Backward).unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn test_record_layout() {
        let uid = Ptr::node(1, 2).unwrap();
        let n = Node::new(uid, Ptr::FALSE, Ptr::TRUE);
        let mut words = vec![0; Node::WORDS];
        let mut bytes = vec![0; Node::SIZE];
        encode(&n, &mut words, &mut bytes);
        assert_eq!(Node::SIZE, 24);
        assert_eq!(&bytes[0..8], &uid.raw().to_le_bytes());
        assert_eq!(&bytes[8..16], &Ptr::FALSE.raw().to_le_bytes());
        assert_eq!(&bytes[16..24], &Ptr::TRUE.raw().to_le_bytes());
        assert_eq!(decode::<Node>(&bytes, &mut words), n);
        assert_eq!(Arc::SIZE, 16);
    }

    #[test]
    fn test_file_deleted_on_drop() {
        let file = RawFile::<u64>::create(None).unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }
}
