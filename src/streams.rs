// Axel '0vercl0k' Souchet - October 3 2026
//! The minidump stream directory.
use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::error::ValidationWarning;
use crate::header::MinidumpFields;
use crate::structs::{Directory, LocationDescriptor32, STREAM_TYPE_UNUSED};
use crate::BinaryReader;

/// Directories claiming more streams than this are bogus.
const MAX_STREAMS: u32 = 0x1_000;

/// Where a stream lives in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLocation {
    pub rva: u32,
    pub size: u32,
}

impl From<LocationDescriptor32> for StreamLocation {
    fn from(value: LocationDescriptor32) -> Self {
        Self {
            rva: value.rva,
            size: value.data_size,
        }
    }
}

/// Maps a stream type to its location. If a type appears more than once, the
/// first entry wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamDirectory {
    streams: BTreeMap<u32, StreamLocation>,
}

impl StreamDirectory {
    /// Walk the directory. Entries that can't be read, or that point outside
    /// of the buffer, are dropped and reported as warnings.
    pub fn parse(
        reader: &BinaryReader,
        fields: &MinidumpFields,
        warnings: &mut Vec<ValidationWarning>,
    ) -> Self {
        let mut streams = BTreeMap::new();
        let count = if fields.number_of_streams > MAX_STREAMS {
            warnings.push(ValidationWarning::new(
                "streams",
                format!(
                    "{} streams claimed, only looking at the first {MAX_STREAMS}",
                    fields.number_of_streams
                ),
            ));
            MAX_STREAMS
        } else {
            fields.number_of_streams
        };

        for idx in 0..u64::from(count) {
            let offset = u64::from(fields.stream_directory_rva) + idx * Directory::SIZE;
            let Ok(directory) = Directory::parse(reader, offset) else {
                warnings.push(ValidationWarning::new(
                    "streams",
                    format!("stream directory is truncated after {idx} entries"),
                ));
                break;
            };

            if directory.stream_type == STREAM_TYPE_UNUSED {
                continue;
            }

            if !directory.location.fits(reader) {
                debug!(
                    "dropping stream {} at {:#x} ({:#x} bytes), past the end",
                    directory.stream_type, directory.location.rva, directory.location.data_size
                );
                warnings.push(ValidationWarning::new(
                    "streams",
                    format!(
                        "stream {} points past the end of the file",
                        directory.stream_type
                    ),
                ));
                continue;
            }

            trace!("stream {} at {:#x}", directory.stream_type, directory.location.rva);
            streams
                .entry(directory.stream_type)
                .or_insert_with(|| directory.location.into());
        }

        Self { streams }
    }

    /// Get the location of the stream of type `stream_type`.
    #[must_use]
    pub fn get(&self, stream_type: u32) -> Option<StreamLocation> {
        self.streams.get(&stream_type).copied()
    }

    #[must_use]
    pub fn contains(&self, stream_type: u32) -> bool {
        self.streams.contains_key(&stream_type)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (u32, StreamLocation)> + '_ {
        self.streams.iter().map(|(&k, &v)| (k, v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
