//! Snapshot file format
//!
//! # Layout
//!
//! ```text
//! +----------------+---------+--------+----------+----------------------+
//! | magic (8)      | ver (4) | crc(4) | len (8)  | body (len bytes)     |
//! +----------------+---------+--------+----------+----------------------+
//! ```
//!
//! All integers are little-endian. The CRC32 covers the body only. The body
//! is the bincode encoding of the commit sequence followed by every bucket
//! and its ordered pairs.
//!
//! Files are replaced atomically: written to a sibling `.tmp` file, fsynced,
//! then renamed over the target.

use crate::tx::{BucketData, Snapshot};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use slowdb_core::{Error, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Cursor, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Magic bytes at the start of every snapshot file
pub const SNAPSHOT_MAGIC: [u8; 8] = *b"SLOWDBSN";

/// Current snapshot format version
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Size of the fixed header in bytes
pub const SNAPSHOT_HEADER_SIZE: usize = 8 + 4 + 4 + 8;

#[derive(Serialize)]
struct BodyRef<'a> {
    sequence: u64,
    buckets: Vec<(&'a [u8], &'a BucketData)>,
}

#[derive(Deserialize)]
struct Body {
    sequence: u64,
    buckets: Vec<(Vec<u8>, BucketData)>,
}

/// Encode a snapshot into its on-disk bytes
pub(crate) fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let body = bincode::serialize(&BodyRef {
        sequence: snapshot.sequence,
        buckets: snapshot
            .buckets
            .iter()
            .map(|(name, data)| (name.as_slice(), data.as_ref()))
            .collect(),
    })?;

    let mut out = Vec::with_capacity(SNAPSHOT_HEADER_SIZE + body.len());
    out.extend_from_slice(&SNAPSHOT_MAGIC);
    out.write_u32::<LittleEndian>(SNAPSHOT_FORMAT_VERSION)?;
    out.write_u32::<LittleEndian>(crc32fast::hash(&body))?;
    out.write_u64::<LittleEndian>(body.len() as u64)?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode and validate on-disk bytes
pub(crate) fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot> {
    if bytes.len() < SNAPSHOT_HEADER_SIZE {
        return Err(Error::Corruption(format!(
            "snapshot too short: {} bytes, header needs {}",
            bytes.len(),
            SNAPSHOT_HEADER_SIZE
        )));
    }

    let mut cursor = Cursor::new(bytes);
    let mut magic = [0u8; 8];
    cursor.read_exact(&mut magic)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(Error::Corruption("bad snapshot magic".to_string()));
    }

    let version = cursor.read_u32::<LittleEndian>()?;
    if version != SNAPSHOT_FORMAT_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported snapshot version {}",
            version
        )));
    }

    let expected_crc = cursor.read_u32::<LittleEndian>()?;
    let len = cursor.read_u64::<LittleEndian>()? as usize;
    let body = &bytes[SNAPSHOT_HEADER_SIZE..];
    if body.len() != len {
        return Err(Error::Corruption(format!(
            "snapshot body length mismatch: header says {}, found {}",
            len,
            body.len()
        )));
    }

    let actual_crc = crc32fast::hash(body);
    if actual_crc != expected_crc {
        return Err(Error::Corruption(format!(
            "snapshot checksum mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }

    let decoded: Body = bincode::deserialize(body)?;
    Ok(Snapshot {
        sequence: decoded.sequence,
        buckets: decoded
            .buckets
            .into_iter()
            .map(|(name, data)| (name, Arc::new(data)))
            .collect::<BTreeMap<_, _>>(),
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Atomically replace the snapshot file at `path`
pub(crate) fn write_snapshot_file(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let bytes = encode_snapshot(snapshot)?;
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    debug!(
        path = %path.display(),
        sequence = snapshot.sequence,
        bytes = bytes.len(),
        "snapshot written"
    );
    Ok(())
}

/// Read the snapshot file at `path`, or `None` if it does not exist
pub(crate) fn read_snapshot_file(path: &Path) -> Result<Option<Snapshot>> {
    match fs::read(path) {
        Ok(bytes) => decode_snapshot(&bytes).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
