//! The single-or-list unit stored under one cache key.

use tradecache_core::CodecError;

use super::traits::CacheRecord;

/// One record or a list of records, as stored under a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Records<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Records<T> {
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen to a list. A single record becomes a one-element list.
    pub fn into_many(self) -> Vec<T> {
        match self {
            Self::One(record) => vec![record],
            Self::Many(items) => items,
        }
    }
}

impl<T: CacheRecord> Records<T> {
    /// Narrow to a single record. A list never narrows, even with one element.
    pub fn into_one(self) -> Result<T, CodecError> {
        match self {
            Self::One(record) => Ok(record),
            Self::Many(items) => Err(CodecError::Decode {
                record_type: T::RECORD_TYPE.to_string(),
                reason: format!("expected a single record, found a list of {}", items.len()),
            }),
        }
    }
}
