//! Binary codec for persisted index descriptors (§3 "Metadata record").
//!
//! ```text
//! offset 0..8    extractor_id       (u64, little-endian)
//! offset 8..12   flags              (u32; bit0=unique, bit1=sparse)
//! offset 12..16  user_data_len      (u32)
//! offset 16..    user_data          (N bytes, opaque to this codec)
//! ```

use std::convert::TryInto;

use crate::err_at;
use crate::error::Result;

const HEADER_LEN: usize = 16;
const FLAG_UNIQUE: u32 = 0x1;
const FLAG_SPARSE: u32 = 0x2;

/// Prefix under which all index metadata keys live in the metadata
/// sub-map; the sentinel bucket name for that sub-map itself.
pub const META_DBI_NAME: &str = "__meta__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub extractor_id: u64,
    pub unique: bool,
    pub sparse: bool,
    pub user_data: Vec<u8>,
}

impl IndexMeta {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.user_data.len());
        buf.extend_from_slice(&self.extractor_id.to_le_bytes());

        let mut flags = 0_u32;
        if self.unique {
            flags |= FLAG_UNIQUE;
        }
        if self.sparse {
            flags |= FLAG_SPARSE;
        }
        buf.extend_from_slice(&flags.to_le_bytes());
        buf.extend_from_slice(&(self.user_data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.user_data);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<IndexMeta> {
        if buf.len() < HEADER_LEN {
            return err_at!(
                DecodeFail,
                msg: "truncated index metadata: {} byte(s), need at least {}",
                buf.len(),
                HEADER_LEN
            );
        }

        let extractor_id = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let flags = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let user_data_len = u32::from_le_bytes(buf[12..16].try_into().unwrap()) as usize;

        if buf.len() < HEADER_LEN + user_data_len {
            return err_at!(
                DecodeFail,
                msg: "truncated index metadata: user_data {} byte(s), declared {}",
                buf.len() - HEADER_LEN,
                user_data_len
            );
        }

        Ok(IndexMeta {
            extractor_id,
            unique: (flags & FLAG_UNIQUE) != 0,
            sparse: (flags & FLAG_SPARSE) != 0,
            user_data: buf[HEADER_LEN..HEADER_LEN + user_data_len].to_vec(),
        })
    }
}

/// Metadata key under which an index's descriptor lives: `"<tree>:<index>"`.
pub fn meta_key(tree_name: &str, index_name: &str) -> Vec<u8> {
    format!("{}:{}", tree_name, index_name).into_bytes()
}

/// Prefix of every metadata key belonging to `tree_name`.
pub fn meta_prefix(tree_name: &str) -> Vec<u8> {
    format!("{}:", tree_name).into_bytes()
}

/// Physical sub-map name for a secondary index: `"idx:<tree>:<index>"`.
pub fn index_physical_name(tree_name: &str, index_name: &str) -> String {
    format!("idx:{}:{}", tree_name, index_name)
}

/// Prefix of every physical index sub-map name belonging to `tree_name`.
pub fn index_physical_prefix(tree_name: &str) -> String {
    format!("idx:{}:", tree_name)
}

#[cfg(test)]
#[path = "metadata_test.rs"]
mod metadata_test;
