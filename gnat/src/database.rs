//! Sample stores the index reads from.
//!
//! The index only needs two capabilities: enumerate every key in a stable order and fetch the
//! sample behind a key. [`MemoryDatabase`] keeps samples in a vector, [`DescriptorFile`] keeps
//! fixed-width descriptors on disk and reads them back one record at a time.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::data::Descriptor;
use crate::error::{Error, Result};
use crate::layout;

pub type SampleKey = u64;

pub trait SampleDatabase {

    type Sample;

    /// Every key in the store, always in the same order for an unchanged store
    fn sample_keys(&self) -> Result<Vec<SampleKey>>;

    fn get_sample(&self, key: SampleKey) -> Result<Self::Sample>;
}

impl<T: SampleDatabase + ?Sized> SampleDatabase for &T {

    type Sample = T::Sample;

    fn sample_keys(&self) -> Result<Vec<SampleKey>> {
        (**self).sample_keys()
    }

    fn get_sample(&self, key: SampleKey) -> Result<Self::Sample> {
        (**self).get_sample(key)
    }
}

/// Vector backed store, keys are insertion positions
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDatabase<S> {
    samples: Vec<S>,
}

impl<S> MemoryDatabase<S> {

    pub fn new() -> Self {
        return Self { samples: Vec::new() };
    }

    pub fn push(&mut self, sample: S) -> SampleKey {

        self.samples.push(sample);
        return (self.samples.len() - 1) as SampleKey;
    }

    pub fn len(&self) -> usize {
        return self.samples.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.samples.is_empty();
    }
}

impl<S> Default for MemoryDatabase<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> FromIterator<S> for MemoryDatabase<S> {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self { samples: iter.into_iter().collect() }
    }
}

impl<S: Clone> SampleDatabase for MemoryDatabase<S> {

    type Sample = S;

    fn sample_keys(&self) -> Result<Vec<SampleKey>> {
        Ok((0..self.samples.len() as SampleKey).collect())
    }

    fn get_sample(&self, key: SampleKey) -> Result<S> {

        let ret = match usize::try_from(key).ok().and_then(|idx| self.samples.get(idx)) {
            Some(sample) => Ok(sample.clone()),
            None => Err(Error::KeyNotFound(key)),
        };

        return ret;
    }
}

/// Fixed-width descriptor file.
///
/// Header is the number of entries and the descriptor length, both little endian u64. Each
/// record is `dim` big endian f32 values and its key is its position in the file.
#[derive(Debug)]
pub struct DescriptorFile {
    path: PathBuf,
    num_entries: u64,
    dim: usize,
}

impl DescriptorFile {

    /// Creates (or truncates) a descriptor file
    pub fn create<P: AsRef<Path>>(path: P, dim: usize) -> Result<Self> {

        record_offset(1, dim)?;

        let path = path.as_ref().to_path_buf();

        let mut fd = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .truncate(true)
                    .open(&path)?;

        fd.write_u64::<LittleEndian>(0)?;
        fd.write_u64::<LittleEndian>(dim as u64)?;

        return Ok(Self {
            path,
            num_entries: 0,
            dim,
        });
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {

        let path = path.as_ref().to_path_buf();

        let mut fd = File::open(&path)?;

        fd.seek(SeekFrom::Start(layout::ENTRIES_START as u64))?;
        let num_entries = fd.read_u64::<LittleEndian>()?;
        fd.seek(SeekFrom::Start(layout::DIM_START as u64))?;
        let dim = usize::try_from(fd.read_u64::<LittleEndian>()?)
            .map_err(|_| Error::CorruptDatabase("descriptor length does not fit in memory".to_string()))?;

        //the header must describe records that are actually in the file
        let expected_len = record_offset(num_entries, dim)?;
        let actual_len = fd.metadata()?.len();
        if actual_len < expected_len {
            return Err(Error::CorruptDatabase(format!("header claims {} entries of length {} but file has {} bytes",
                num_entries, dim, actual_len)));
        }

        return Ok(Self {
            path,
            num_entries,
            dim,
        });
    }

    pub fn num_entries(&self) -> usize {
        return self.num_entries as usize;
    }

    pub fn dim(&self) -> usize {
        return self.dim;
    }


    pub fn add_descriptor(&mut self, descriptor: &Descriptor) -> Result<SampleKey> {

        if descriptor.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: descriptor.len() });
        }

        let mut fd = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&self.path)?;

        let key = self.num_entries;

        fd.seek(SeekFrom::Start(record_offset(key, self.dim)?))?;
        fd.write_all(&descriptor.to_vec())?;

        self.num_entries += 1;

        //keep the entry count on disk current
        fd.seek(SeekFrom::Start(layout::ENTRIES_START as u64))?;
        fd.write_u64::<LittleEndian>(self.num_entries)?;

        return Ok(key);
    }
}

/// Byte offset of record `key`, which for `key == num_entries` is the expected file length
fn record_offset(key: SampleKey, dim: usize) -> Result<u64> {

    return (dim as u64).checked_mul(layout::F32_SIZE as u64)
        .and_then(|record_size| key.checked_mul(record_size))
        .and_then(|bytes| bytes.checked_add(layout::DATABASE_DATA_START as u64))
        .ok_or_else(|| Error::CorruptDatabase(format!("record {} of length {} is out of addressable range", key, dim)));
}

impl SampleDatabase for DescriptorFile {

    type Sample = Descriptor;

    fn sample_keys(&self) -> Result<Vec<SampleKey>> {
        Ok((0..self.num_entries).collect())
    }

    fn get_sample(&self, key: SampleKey) -> Result<Descriptor> {

        if key >= self.num_entries {
            return Err(Error::KeyNotFound(key));
        }

        let offset = record_offset(key, self.dim)?;
        let mut buf = vec![0u8; layout::descriptor_record_size(self.dim)];

        let mut fd = File::open(&self.path)?;
        fd.seek(SeekFrom::Start(offset))?;
        fd.read_exact(&mut buf)?;

        return Descriptor::from_slice(&buf, self.dim);
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gnat_database_{}_{}", name, std::process::id()))
    }

    #[test]
    fn memory_database_keys_are_positions() {

        let mut database: MemoryDatabase<Descriptor> = MemoryDatabase::new();
        assert!(database.is_empty());

        for i in 0..5 {
            let key = database.push(Descriptor::from_vec(vec![i as f32]));
            assert_eq!(key, i);
        }

        assert_eq!(database.sample_keys().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(database.get_sample(3).unwrap().data, vec![3.0]);
        assert!(matches!(database.get_sample(5), Err(Error::KeyNotFound(5))));

        let by_ref = &database;
        assert_eq!(by_ref.get_sample(1).unwrap().data, vec![1.0]);
    }

    #[test]
    fn small_random_descriptor_file() {

        let path = scratch_path("small_random");
        let dim = 8;

        let mut database = DescriptorFile::create(&path, dim).unwrap();

        let mut entries: Vec<(SampleKey, Descriptor)> = Vec::new();
        for _ in 0..1000 {
            let descriptor = Descriptor::random(dim);
            let key = database.add_descriptor(&descriptor).unwrap();
            entries.push((key, descriptor));
        }

        for (key, descriptor) in entries.iter() {
            assert_eq!(&database.get_sample(*key).unwrap(), descriptor);
        }

        let reopened = DescriptorFile::open(&path).unwrap();
        assert_eq!(reopened.num_entries(), 1000);
        assert_eq!(reopened.dim(), dim);
        assert_eq!(reopened.sample_keys().unwrap().len(), 1000);
        assert_eq!(&reopened.get_sample(999).unwrap(), &entries[999].1);
        assert!(matches!(reopened.get_sample(1000), Err(Error::KeyNotFound(1000))));

        std::fs::remove_file(&path).unwrap();
    }

    fn write_header(path: &Path, num_entries: u64, dim: u64, num_records: usize) {

        let mut bytes: Vec<u8> = Vec::new();
        bytes.write_u64::<LittleEndian>(num_entries).unwrap();
        bytes.write_u64::<LittleEndian>(dim).unwrap();
        bytes.resize(layout::DATABASE_DATA_START + num_records * dim as usize * layout::F32_SIZE, 0);

        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn corrupt_header_is_rejected() {

        let path = scratch_path("corrupt_header");

        write_header(&path, 3, 2, 3);
        assert_eq!(DescriptorFile::open(&path).unwrap().num_entries(), 3);

        //more entries than records
        write_header(&path, 4, 2, 3);
        assert!(matches!(DescriptorFile::open(&path), Err(Error::CorruptDatabase(_))));

        //offsets that overflow
        write_header(&path, u64::MAX, 2, 0);
        assert!(matches!(DescriptorFile::open(&path), Err(Error::CorruptDatabase(_))));

        write_header(&path, 2, u64::MAX / 2, 0);
        assert!(matches!(DescriptorFile::open(&path), Err(Error::CorruptDatabase(_))));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn descriptor_file_rejects_wrong_length() {

        let path = scratch_path("wrong_length");

        let mut database = DescriptorFile::create(&path, 4).unwrap();
        let result = database.add_descriptor(&Descriptor::from_vec(vec![1.0, 2.0]));
        assert!(matches!(result, Err(Error::DimensionMismatch { expected: 4, actual: 2 })));
        assert_eq!(database.num_entries(), 0);

        std::fs::remove_file(&path).unwrap();
    }
}
