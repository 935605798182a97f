//! Buffers carrying media data and attached analytics metadata.

use crate::error::Result;
use crate::metadata::{BatchMeta, MetaType};
use bytes::Bytes;

/// A metadata entry attached to a buffer.
#[derive(Debug)]
pub enum BufferMeta {
    /// Batch analytics metadata.
    Batch(BatchMeta),
    /// Opaque metadata owned by some other element.
    Opaque {
        /// Type tag of the entry.
        meta_type: MetaType,
        /// Serialized contents.
        data: Bytes,
    },
}

impl BufferMeta {
    /// Type tag used when scanning a buffer's metadata.
    pub fn meta_type(&self) -> MetaType {
        match self {
            BufferMeta::Batch(batch) => batch.base_meta.meta_type,
            BufferMeta::Opaque { meta_type, .. } => *meta_type,
        }
    }

    /// Deep copy of this entry.
    pub fn duplicate(&self) -> Result<BufferMeta> {
        Ok(match self {
            BufferMeta::Batch(batch) => BufferMeta::Batch(batch.duplicate()?),
            BufferMeta::Opaque { meta_type, data } => BufferMeta::Opaque {
                meta_type: *meta_type,
                data: data.clone(),
            },
        })
    }
}

/// A buffer containing data and metadata.
///
/// The data is immutable and reference counted, so elements that only add
/// metadata never touch the content. Metadata entries are owned by the
/// buffer; use [`Buffer::duplicate`] to copy a buffer together with its
/// metadata.
///
/// # Example
///
/// ```rust
/// use parallax_msgconv::buffer::Buffer;
/// use parallax_msgconv::metadata::{BatchMeta, FrameMeta};
///
/// let mut buffer = Buffer::from_static(b"frame");
/// buffer.add_meta_batch(BatchMeta::new(1).with_frame(FrameMeta::new(0, 0)));
///
/// assert_eq!(buffer.batch_meta().map(|b| b.frames.len()), Some(1));
/// ```
#[derive(Debug)]
pub struct Buffer {
    data: Bytes,
    sequence: u64,
    metas: Vec<BufferMeta>,
}

impl Buffer {
    /// Create a buffer over `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            sequence: 0,
            metas: Vec::new(),
        }
    }

    /// Create a buffer over static data.
    pub fn from_static(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }

    /// Set the sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Monotonic sequence number within a stream.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Buffer content.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Get the buffer data as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length of the content in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer has no content.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Attached metadata, in attachment order.
    pub fn metas(&self) -> &[BufferMeta] {
        &self.metas
    }

    /// Attach a metadata entry.
    pub fn add_meta(&mut self, meta: BufferMeta) {
        self.metas.push(meta);
    }

    /// Attach batch metadata.
    pub fn add_meta_batch(&mut self, batch: BatchMeta) {
        self.add_meta(BufferMeta::Batch(batch));
    }

    /// First batch metadata entry, if any.
    pub fn batch_meta(&self) -> Option<&BatchMeta> {
        self.metas.iter().find_map(|m| match m {
            BufferMeta::Batch(batch) if batch.base_meta.meta_type == MetaType::Batch => Some(batch),
            _ => None,
        })
    }

    /// First batch metadata entry, if any, for modification.
    pub fn batch_meta_mut(&mut self) -> Option<&mut BatchMeta> {
        self.metas.iter_mut().find_map(|m| match m {
            BufferMeta::Batch(batch) if batch.base_meta.meta_type == MetaType::Batch => {
                Some(batch)
            }
            _ => None,
        })
    }

    /// Copy the buffer for a second consumer.
    ///
    /// The content is shared; every metadata entry is deep-copied, running the
    /// copy callbacks of attached user metadata.
    pub fn duplicate(&self) -> Result<Buffer> {
        let metas = self
            .metas
            .iter()
            .map(BufferMeta::duplicate)
            .collect::<Result<Vec<_>>>()?;

        Ok(Buffer {
            data: self.data.clone(),
            sequence: self.sequence,
            metas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FrameMeta;

    #[test]
    fn test_buffer_without_metadata() {
        let buffer = Buffer::new(vec![1u8, 2, 3]).with_sequence(9);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.sequence(), 9);
        assert!(buffer.batch_meta().is_none());
    }

    #[test]
    fn test_first_batch_meta_wins() {
        let mut buffer = Buffer::from_static(b"x");
        buffer.add_meta(BufferMeta::Opaque {
            meta_type: MetaType::Custom(77),
            data: Bytes::from_static(b"other"),
        });
        buffer.add_meta_batch(BatchMeta::new(1).with_frame(FrameMeta::new(1, 0)));
        buffer.add_meta_batch(BatchMeta::new(1).with_frame(FrameMeta::new(2, 0)));

        let batch = buffer.batch_meta_mut().unwrap();
        assert_eq!(batch.frames[0].frame_num, 1);
    }

    #[test]
    fn test_duplicate_shares_content() {
        let mut buffer = Buffer::new(vec![0u8; 16]);
        buffer.add_meta_batch(BatchMeta::new(1).with_frame(FrameMeta::new(3, 0)));

        let copy = buffer.duplicate().unwrap();
        assert_eq!(copy.as_bytes().as_ptr(), buffer.as_bytes().as_ptr());
        assert_eq!(copy.metas().len(), 1);
        assert_eq!(copy.batch_meta().unwrap().frames[0].frame_num, 3);
    }
}
