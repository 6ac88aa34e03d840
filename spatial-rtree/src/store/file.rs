//! Paged file backend.
//!
//! The file is a sequence of `page_size` pages. Page 0 holds the
//! [`FileHeader`]; every other page holds one node or one free-list link.
//! Node handles are byte offsets of their pages, so they are always
//! non-zero multiples of the page size.
//!
//! Reads go through an LRU cache of decoded nodes. Writes go straight to
//! the file and then refresh the cache. Each page is read or written with
//! one seek and one transfer; nothing is preloaded.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::config::RTreeConfig;
use crate::constants::{branches_per_page, MIN_PAGE_SIZE};
use crate::errors::{RTreeError, RTreeResult};
use crate::node::{Node, NodeId};

use super::cache::NodeCache;
use super::page::{decode_page, encode_page, FileHeader, PageBody, PageBodyRef};
use super::{NodeStore, StoreStats, TreeMeta};

#[derive(Default)]
struct IoCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

/// Node store backed by a single paged file.
pub struct FileStore {
    file: RwLock<File>,
    path: PathBuf,
    header: FileHeader,
    cache: Mutex<NodeCache>,
    counters: IoCounters,
}

impl FileStore {
    /// Creates (or truncates) `path` and writes a header for `config`. The
    /// new file holds no root until the first [`NodeStore::store_meta`].
    pub fn create(path: &Path, config: &RTreeConfig) -> RTreeResult<Self> {
        config.check_page_capacity()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let store = FileStore {
            file: RwLock::new(file),
            path: path.to_path_buf(),
            header: FileHeader::new(config),
            cache: Mutex::new(NodeCache::new(config.cache_pages())),
            counters: IoCounters::default(),
        };
        store.write_header()?;
        log::debug!(
            "Created tree file {:?} ({} dims, {} byte pages)",
            store.path,
            config.ndims(),
            config.page_size()
        );
        Ok(store)
    }

    /// Opens an existing file and rebuilds the configuration it was created
    /// with. `cache_pages` is a runtime setting and is not persisted.
    pub fn open(path: &Path, cache_pages: usize) -> RTreeResult<(Self, RTreeConfig)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < MIN_PAGE_SIZE as u64 {
            return Err(RTreeError::CorruptStorage(format!(
                "file is {} bytes, too short to hold a header",
                file_len
            )));
        }

        let mut buf = vec![0u8; MIN_PAGE_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)
            .map_err(|e| RTreeError::from_page_read(e, 0))?;
        let header: FileHeader = decode_page(&buf, 0)?;
        header.validate()?;

        let page_size = header.page_size as u64;
        if page_size < MIN_PAGE_SIZE as u64 || file_len % page_size != 0 {
            return Err(RTreeError::CorruptStorage(format!(
                "file length {} is not a whole number of {} byte pages",
                file_len, page_size
            )));
        }
        if header.next_offset < page_size
            || header.next_offset % page_size != 0
            || header.next_offset > file_len
        {
            return Err(RTreeError::CorruptStorage(format!(
                "header points past the end of the file (next page {}, file length {})",
                header.next_offset, file_len
            )));
        }

        let config = RTreeConfig::from_persisted(
            header.ndims as usize,
            header.card,
            header.min_fill_ratio,
            header.split_strategy,
            header.cover_metric,
            header.page_size as usize,
            cache_pages,
        )
        .and_then(|config| config.check_page_capacity().map(|_| config))
        .map_err(|e| {
            RTreeError::CorruptStorage(format!("header carries an unusable configuration: {}", e))
        })?;

        let store = FileStore {
            file: RwLock::new(file),
            path: path.to_path_buf(),
            header,
            cache: Mutex::new(NodeCache::new(cache_pages)),
            counters: IoCounters::default(),
        };

        if store.header.root_offset != 0 {
            store.check_offset(store.header.root_offset)?;
            if store.header.height == 0 {
                return Err(RTreeError::CorruptStorage(
                    "header has a root but zero height".to_string(),
                ));
            }
        }
        if store.header.free_list_head != 0 {
            store.check_offset(store.header.free_list_head)?;
        }

        log::debug!(
            "Opened tree file {:?}: {} entries, height {}, {} free pages",
            store.path,
            store.header.entry_count,
            store.header.height,
            store.header.free_page_count
        );
        Ok((store, config))
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    fn page_size(&self) -> u64 {
        self.header.page_size as u64
    }

    fn check_offset(&self, offset: u64) -> RTreeResult<()> {
        let page_size = self.page_size();
        if offset < page_size || offset >= self.header.next_offset || offset % page_size != 0 {
            return Err(RTreeError::CorruptStorage(format!(
                "node handle {} does not name a page",
                offset
            )));
        }
        Ok(())
    }

    fn read_raw(&self, offset: u64) -> RTreeResult<Vec<u8>> {
        let mut buf = vec![0u8; self.page_size() as usize];
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)
            .map_err(|e| RTreeError::from_page_read(e, offset))?;
        self.counters.disk_reads.fetch_add(1, Ordering::Relaxed);
        Ok(buf)
    }

    fn write_raw(&self, offset: u64, page: &[u8]) -> RTreeResult<()> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page)?;
        self.counters.disk_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read_body(&self, offset: u64) -> RTreeResult<PageBody> {
        let page = self.read_raw(offset)?;
        decode_page(&page, offset).inspect_err(|e| {
            log::error!("Failed to decode page at offset {} in {:?}: {}", offset, self.path, e)
        })
    }

    fn write_header(&self) -> RTreeResult<()> {
        let page = encode_page(&self.header, self.page_size() as usize)?;
        self.write_raw(0, &page)
    }
}

impl NodeStore for FileStore {
    fn allocate(&mut self, level: u32) -> RTreeResult<NodeId> {
        let offset = if self.header.free_list_head != 0 {
            let head = self.header.free_list_head;
            self.check_offset(head)?;
            match self.read_body(head)? {
                PageBody::Free { next_free } => {
                    self.header.free_list_head = next_free;
                    self.header.free_page_count = self.header.free_page_count.saturating_sub(1);
                    head
                }
                PageBody::Node(_) => {
                    return Err(RTreeError::CorruptStorage(format!(
                        "free list head {} holds a live node",
                        head
                    )));
                }
            }
        } else {
            let offset = self.header.next_offset;
            self.header.next_offset += self.page_size();
            offset
        };

        let id = NodeId::new(offset);
        self.write(id, &Node::new(level))?;
        Ok(id)
    }

    fn read(&self, id: NodeId) -> RTreeResult<Node> {
        let offset = id.get();
        self.check_offset(offset)?;
        if let Some(node) = self.cache.lock().get(offset) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(node);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        let node = match self.read_body(offset)? {
            PageBody::Node(node) => node,
            PageBody::Free { .. } => {
                log::error!("Node handle {} points at a free page in {:?}", offset, self.path);
                return Err(RTreeError::CorruptStorage(format!(
                    "page at offset {} is on the free list",
                    offset
                )));
            }
        };
        let max_branches = self.header.card.max_branches(node.level);
        if let Err(reason) = node.check_shape(self.header.ndims as usize, max_branches) {
            log::error!("Malformed node page at offset {} in {:?}: {}", offset, self.path, reason);
            return Err(RTreeError::CorruptStorage(format!(
                "node page at offset {}: {}",
                offset, reason
            )));
        }

        self.cache.lock().insert(offset, node.clone());
        Ok(node)
    }

    fn write(&mut self, id: NodeId, node: &Node) -> RTreeResult<()> {
        let offset = id.get();
        self.check_offset(offset)?;
        let page = encode_page(&PageBodyRef::Node(node), self.page_size() as usize)?;
        self.write_raw(offset, &page)?;
        self.cache.get_mut().insert(offset, node.clone());
        Ok(())
    }

    fn free(&mut self, id: NodeId) -> RTreeResult<()> {
        let offset = id.get();
        self.check_offset(offset)?;
        self.cache.get_mut().remove(offset);

        let link = PageBodyRef::Free {
            next_free: self.header.free_list_head,
        };
        let page = encode_page(&link, self.page_size() as usize)?;
        self.write_raw(offset, &page)?;
        self.header.free_list_head = offset;
        self.header.free_page_count += 1;
        Ok(())
    }

    fn contains(&self, id: NodeId) -> bool {
        let offset = id.get();
        if self.check_offset(offset).is_err() {
            return false;
        }
        if self.cache.lock().contains(offset) {
            return true;
        }
        matches!(self.read_body(offset), Ok(PageBody::Node(_)))
    }

    fn load_meta(&self) -> Option<TreeMeta> {
        if self.header.root_offset == 0 {
            return None;
        }
        Some(TreeMeta {
            root: NodeId::new(self.header.root_offset),
            height: self.header.height,
            entry_count: self.header.entry_count,
            card: self.header.card,
        })
    }

    fn store_meta(&mut self, meta: &TreeMeta) -> RTreeResult<()> {
        self.header.root_offset = meta.root.get();
        self.header.height = meta.height;
        self.header.entry_count = meta.entry_count;
        self.header.card = meta.card;
        self.write_header()
    }

    fn flush(&mut self) -> RTreeResult<()> {
        self.write_header()?;
        self.file.write().sync_all()?;
        log::debug!("Flushed tree file {:?}", self.path);
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        let pages = self.header.next_offset / self.page_size();
        StoreStats {
            live_nodes: pages.saturating_sub(1 + self.header.free_page_count),
            cached_nodes: self.cache.lock().len() as u64,
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            disk_reads: self.counters.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.counters.disk_writes.load(Ordering::Relaxed),
        }
    }

    fn page_capacity(&self) -> Option<usize> {
        Some(branches_per_page(
            self.header.page_size as usize,
            self.header.ndims as usize,
        ))
    }
}
