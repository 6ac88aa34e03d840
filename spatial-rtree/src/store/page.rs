//! On-disk page layout.
//!
//! Every page starts with an 8-byte frame: the CRC-32 of the body followed
//! by the body length, both little-endian `u32`. The body is a bincode
//! (legacy configuration) encoding of either the [`FileHeader`] (page 0) or a
//! [`PageBody`]. The rest of the page is zero padding.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::card::CardPolicy;
use crate::config::{RTreeConfig, SplitStrategy};
use crate::constants::{MAGIC, PAGE_FRAME_SIZE, VERSION};
use crate::errors::{RTreeError, RTreeResult};
use crate::node::Node;
use crate::rect::CoverMetric;

/// Contents of a non-header page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) enum PageBody {
    Node(Node),
    Free { next_free: u64 },
}

/// Borrowing twin of [`PageBody`] used on the write path. Variant order must
/// match so both encode the same tag.
#[derive(Serialize)]
pub(crate) enum PageBodyRef<'a> {
    Node(&'a Node),
    Free { next_free: u64 },
}

/// Page 0 of a tree file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub ndims: u32,
    pub page_size: u32,
    pub height: u32,
    /// Offset of the root page, 0 until a root has been stored.
    pub root_offset: u64,
    /// Offset of the first free page, 0 when the free list is empty.
    pub free_list_head: u64,
    pub free_page_count: u64,
    /// Offset the next appended page will get.
    pub next_offset: u64,
    pub entry_count: u64,
    pub card: CardPolicy,
    pub min_fill_ratio: f64,
    pub split_strategy: SplitStrategy,
    pub cover_metric: CoverMetric,
}

impl FileHeader {
    pub fn new(config: &RTreeConfig) -> Self {
        FileHeader {
            magic: MAGIC,
            version: VERSION,
            ndims: config.ndims() as u32,
            page_size: config.page_size() as u32,
            height: 0,
            root_offset: 0,
            free_list_head: 0,
            free_page_count: 0,
            next_offset: config.page_size() as u64,
            entry_count: 0,
            card: *config.card(),
            min_fill_ratio: config.min_fill_ratio(),
            split_strategy: config.split_strategy(),
            cover_metric: config.cover_metric(),
        }
    }

    /// Checks the fields that identify the file format.
    pub fn validate(&self) -> RTreeResult<()> {
        if self.magic != MAGIC {
            return Err(RTreeError::CorruptStorage(format!(
                "bad magic number {:#010x}",
                self.magic
            )));
        }
        if self.version != VERSION {
            return Err(RTreeError::CorruptStorage(format!(
                "unsupported file version {} (expected {})",
                self.version, VERSION
            )));
        }
        Ok(())
    }
}

/// CRC-32 (MPEG-2 polynomial, final xor) over `data`.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0x04C1_1DB7;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }
    crc ^ 0xFFFF_FFFF
}

/// Encodes `body` into a zero-padded page of `page_size` bytes.
pub(crate) fn encode_page<T: Serialize>(body: &T, page_size: usize) -> RTreeResult<Vec<u8>> {
    let bytes = bincode::serde::encode_to_vec(body, bincode::config::legacy())
        .map_err(|e| RTreeError::Serialization(e.to_string()))?;
    if bytes.len() + PAGE_FRAME_SIZE > page_size {
        return Err(RTreeError::CapacityExceeded(format!(
            "page body is {} bytes, page holds {}",
            bytes.len(),
            page_size - PAGE_FRAME_SIZE
        )));
    }

    let mut page = vec![0u8; page_size];
    page[0..4].copy_from_slice(&crc32(&bytes).to_le_bytes());
    page[4..8].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
    page[PAGE_FRAME_SIZE..PAGE_FRAME_SIZE + bytes.len()].copy_from_slice(&bytes);
    Ok(page)
}

/// Verifies the frame of a page read from `offset` and decodes its body.
pub(crate) fn decode_page<T: DeserializeOwned>(page: &[u8], offset: u64) -> RTreeResult<T> {
    if page.len() < PAGE_FRAME_SIZE {
        return Err(RTreeError::CorruptStorage(format!(
            "truncated page at offset {}",
            offset
        )));
    }
    let checksum = read_u32(&page[0..4]);
    let len = read_u32(&page[4..8]) as usize;
    if len == 0 || len > page.len() - PAGE_FRAME_SIZE {
        return Err(RTreeError::CorruptStorage(format!(
            "page at offset {} declares body length {}",
            offset, len
        )));
    }

    let body = &page[PAGE_FRAME_SIZE..PAGE_FRAME_SIZE + len];
    let actual = crc32(body);
    if actual != checksum {
        return Err(RTreeError::CorruptStorage(format!(
            "checksum mismatch at offset {} (stored {:08x}, computed {:08x})",
            offset, checksum, actual
        )));
    }

    bincode::serde::decode_from_slice(body, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| {
            RTreeError::CorruptStorage(format!("undecodable page at offset {}: {}", offset, e))
        })
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Branch;
    use crate::rect::Rect;

    #[test]
    fn test_crc32_known_value() {
        // CRC-32/MPEG-2 check value with final xor applied.
        assert_eq!(crc32(b"123456789"), 0x0376_E6E7 ^ 0xFFFF_FFFF);
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_node_page_round_trip() {
        let rect = Rect::new(&[0.0, 1.0], &[2.0, 3.0]).unwrap();
        let node = Node::with_branches(0, vec![Branch::entry(rect, 7)]);
        let page = encode_page(&PageBodyRef::Node(&node), 256).unwrap();
        assert_eq!(page.len(), 256);

        let body: PageBody = decode_page(&page, 256).unwrap();
        assert_eq!(body, PageBody::Node(node));
    }

    #[test]
    fn test_free_page_round_trip() {
        let page = encode_page(&PageBodyRef::Free { next_free: 512 }, 256).unwrap();
        let body: PageBody = decode_page(&page, 0).unwrap();
        assert_eq!(body, PageBody::Free { next_free: 512 });
    }

    #[test]
    fn test_flipped_byte_detected() {
        let node = Node::new(3);
        let mut page = encode_page(&PageBodyRef::Node(&node), 256).unwrap();
        page[PAGE_FRAME_SIZE] ^= 0xFF;
        let result: RTreeResult<PageBody> = decode_page(&page, 4096);
        assert!(matches!(result, Err(RTreeError::CorruptStorage(_))));
    }

    #[test]
    fn test_zeroed_page_rejected() {
        let page = vec![0u8; 256];
        let result: RTreeResult<PageBody> = decode_page(&page, 256);
        assert!(matches!(result, Err(RTreeError::CorruptStorage(_))));
    }

    #[test]
    fn test_oversized_body_rejected() {
        let rect = Rect::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        let branches = (0..64).map(|i| Branch::entry(rect, i)).collect();
        let node = Node::with_branches(0, branches);
        assert!(matches!(
            encode_page(&PageBodyRef::Node(&node), 256),
            Err(RTreeError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_header_validate() {
        let config = RTreeConfig::new(2).unwrap();
        let mut header = FileHeader::new(&config);
        assert!(header.validate().is_ok());
        assert_eq!(header.next_offset, config.page_size() as u64);

        header.magic = 0xDEAD_BEEF;
        assert!(matches!(header.validate(), Err(RTreeError::CorruptStorage(_))));

        let mut header = FileHeader::new(&config);
        header.version = VERSION + 1;
        assert!(header.validate().is_err());
    }
}
