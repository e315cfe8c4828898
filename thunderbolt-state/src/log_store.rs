//! Segmented append-only log files.
//!
//! Records are framed with a u32 length and appended to numbered
//! segment files. A segment rolls over when the next append would push
//! it past the configured size, so no segment grows without bound and
//! old segments are immutable once rolled.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thunderbolt_serde_derive::{TbDeserialize, TbSerialize};

use thunderbolt_chain::{SerializationError, ThunderboltDeserialize, ThunderboltSerialize};

use crate::StorageError;

/// The location of one record in a segmented log.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Hash, TbSerialize, TbDeserialize,
)]
pub struct LogPointer {
    /// Which segment file holds the record.
    pub segment: u32,
    /// The byte offset of the record's length prefix inside the segment.
    pub offset: u64,
}

/// An append-only log split across size-bounded segment files.
pub struct SegmentedLog {
    dir: PathBuf,
    segment_bytes: u64,
    current_id: u32,
    current_len: u64,
    current: File,
}

impl SegmentedLog {
    /// Open the log in `dir`, resuming the highest-numbered segment.
    pub fn open(dir: &Path, segment_bytes: u64) -> Result<SegmentedLog, StorageError> {
        fs::create_dir_all(dir)?;

        let mut current_id = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(id) = segment_id(&entry.path()) {
                current_id = current_id.max(id);
            }
        }

        let path = segment_path(dir, current_id);
        let current = OpenOptions::new().create(true).append(true).open(&path)?;
        let current_len = current.metadata()?.len();

        Ok(SegmentedLog {
            dir: dir.to_path_buf(),
            segment_bytes,
            current_id,
            current_len,
            current,
        })
    }

    /// Append one record, returning the pointer needed to read it back.
    pub fn append(&mut self, record: &[u8]) -> Result<LogPointer, StorageError> {
        let framed_len = 4 + record.len() as u64;

        if self.current_len > 0 && self.current_len + framed_len > self.segment_bytes {
            self.roll()?;
        }

        let pointer = LogPointer {
            segment: self.current_id,
            offset: self.current_len,
        };

        self.current.write_all(&(record.len() as u32).to_le_bytes())?;
        self.current.write_all(record)?;
        self.current.sync_data()?;
        self.current_len += framed_len;

        Ok(pointer)
    }

    /// Serialize `value` and append it.
    pub fn append_value<T: ThunderboltSerialize>(
        &mut self,
        value: &T,
    ) -> Result<LogPointer, StorageError> {
        let bytes = value
            .thunderbolt_serialize_to_vec()
            .map_err(StorageError::Io)?;
        self.append(&bytes)
    }

    /// Read the record at `pointer`.
    pub fn read(&self, pointer: LogPointer) -> Result<Vec<u8>, StorageError> {
        let mut file = File::open(segment_path(&self.dir, pointer.segment))?;
        file.seek(SeekFrom::Start(pointer.offset))?;

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as u64;
        if len > self.segment_bytes {
            return Err(StorageError::Corruption(SerializationError::Parse(
                "log record length exceeds segment size",
            )));
        }

        let mut record = vec![0u8; len as usize];
        file.read_exact(&mut record)?;
        Ok(record)
    }

    /// Read and deserialize the record at `pointer`.
    pub fn read_value<T: ThunderboltDeserialize>(
        &self,
        pointer: LogPointer,
    ) -> Result<T, StorageError> {
        let bytes = self.read(pointer)?;
        Ok(T::thunderbolt_deserialize(bytes.as_slice())?)
    }

    fn roll(&mut self) -> Result<(), StorageError> {
        self.current_id += 1;
        let path = segment_path(&self.dir, self.current_id);
        self.current = OpenOptions::new().create(true).append(true).open(&path)?;
        self.current_len = 0;
        Ok(())
    }
}

fn segment_path(dir: &Path, id: u32) -> PathBuf {
    dir.join(format!("{:05}.dat", id))
}

fn segment_id(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_suffix(".dat")?;
    id.parse().ok()
}
