use spatial_rtree::{
    FileStore, RTree, RTreeConfig, RTreeError, SplitStrategy, StorageMode,
};
use spatial_rtree_int_test::test_util::{
    assert_tree_valid, full_extent, random_entries, small_config, sorted_hits, temp_tree_path,
};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_file_tree_matches_memory_tree_after_reopen() {
    let (_dir, path) = temp_tree_path("scenario_c.rtree");
    let entries = random_entries(42, 1000, 2);
    let config = RTreeConfig::builder(2)
        .node_max(16)
        .leaf_max(16)
        .build()
        .unwrap();

    let mut memory = RTree::in_memory(config.clone()).unwrap();
    let mut file = RTree::create(StorageMode::File(path.clone()), config).unwrap();
    for (rect, id) in &entries {
        memory.insert(rect, *id).unwrap();
        file.insert(rect, *id).unwrap();
    }
    file.close().unwrap();

    let reopened = RTree::open(&path).unwrap();
    assert_eq!(reopened.len(), 1000);
    assert_eq!(reopened.height(), memory.height());

    let everything = full_extent(2);
    let from_file = sorted_hits(&reopened, &everything).unwrap();
    assert_eq!(from_file.len(), 1000);
    assert_eq!(from_file, sorted_hits(&memory, &everything).unwrap());

    // Same insertion order gives the same shape, so traversal order agrees too.
    assert_eq!(
        reopened.find_intersecting(&everything).unwrap(),
        memory.find_intersecting(&everything).unwrap()
    );
    assert_tree_valid(&reopened);
}

#[test]
fn test_reopen_and_keep_mutating() {
    let (_dir, path) = temp_tree_path("mutate.rtree");
    let entries = random_entries(7, 300, 3);
    let config = small_config(3, 8, 3, SplitStrategy::ForcedReinsert { count: 2 });

    {
        let mut tree = RTree::create(StorageMode::File(path.clone()), config).unwrap();
        for (rect, id) in &entries[..200] {
            tree.insert(rect, *id).unwrap();
        }
        tree.close().unwrap();
    }
    {
        let mut tree = RTree::open_with_cache_size(&path, 4).unwrap();
        assert_eq!(
            tree.config().split_strategy(),
            SplitStrategy::ForcedReinsert { count: 2 }
        );
        for (rect, id) in &entries[200..] {
            tree.insert(rect, *id).unwrap();
        }
        for (rect, id) in entries.iter().step_by(3) {
            assert!(tree.delete(rect, *id).unwrap());
        }
        assert_tree_valid(&tree);
        tree.close().unwrap();
    }

    let tree = RTree::open(&path).unwrap();
    let expected: Vec<u64> = entries
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 3 != 0)
        .map(|(_, (_, id))| *id)
        .collect();
    assert_eq!(sorted_hits(&tree, &full_extent(3)).unwrap(), expected);
    assert_tree_valid(&tree);
}

#[test]
fn test_freed_pages_are_reused() {
    let (_dir, path) = temp_tree_path("reuse.rtree");
    let entries = random_entries(3, 400, 2);
    let mut tree = RTree::create(
        StorageMode::File(path.clone()),
        small_config(2, 6, 2, SplitStrategy::Quadratic),
    )
    .unwrap();

    for (rect, id) in &entries {
        tree.insert(rect, *id).unwrap();
    }
    tree.flush().unwrap();
    let grown = std::fs::metadata(&path).unwrap().len();

    for (rect, id) in &entries {
        assert!(tree.delete(rect, *id).unwrap());
    }
    for (rect, id) in &entries {
        tree.insert(rect, *id).unwrap();
    }
    tree.flush().unwrap();

    // Rebuilding the same content draws on the free list first, so the file
    // does not grow by more than a stray page.
    let page_size = tree.config().page_size() as u64;
    let regrown = std::fs::metadata(&path).unwrap().len();
    assert!(
        regrown <= grown + page_size,
        "file grew from {} to {}",
        grown,
        regrown
    );
    assert_eq!(tree.len(), 400);
    assert_tree_valid(&tree);
}

#[test]
fn test_clear_file_tree() {
    let (_dir, path) = temp_tree_path("clear.rtree");
    let entries = random_entries(11, 100, 2);
    {
        let mut tree = RTree::create(
            StorageMode::File(path.clone()),
            small_config(2, 4, 2, SplitStrategy::Quadratic),
        )
        .unwrap();
        for (rect, id) in &entries {
            tree.insert(rect, *id).unwrap();
        }
        tree.clear().unwrap();
        tree.close().unwrap();
    }

    let (store, _) = FileStore::open(&path, 8).unwrap();
    assert_eq!(store.header().height, 1);
    assert_eq!(store.header().entry_count, 0);
    assert!(store.header().free_page_count > 0);
    drop(store);

    let tree = RTree::open(&path).unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.stats().node_count, 1);
}

#[test]
fn test_corrupted_page_is_reported() {
    let (_dir, path) = temp_tree_path("corrupt.rtree");
    let page_size = 512u64;
    {
        let config = RTreeConfig::builder(2)
            .node_max(4)
            .leaf_max(4)
            .page_size(page_size as usize)
            .build()
            .unwrap();
        let mut tree = RTree::create(StorageMode::File(path.clone()), config).unwrap();
        for (rect, id) in random_entries(5, 50, 2) {
            tree.insert(&rect, id).unwrap();
        }
        tree.close().unwrap();
    }

    // Damage the body of every node page; any search must hit one of them.
    let len = std::fs::metadata(&path).unwrap().len();
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    let mut offset = page_size;
    while offset < len {
        file.seek(SeekFrom::Start(offset + 12)).unwrap();
        file.write_all(&[0xFF, 0x00, 0xFF]).unwrap();
        offset += page_size;
    }
    drop(file);

    let tree = RTree::open_with_cache_size(&path, 0);
    match tree {
        // The root itself is checked on open.
        Err(err) => assert!(matches!(err, RTreeError::CorruptStorage(_))),
        Ok(tree) => {
            assert!(matches!(
                tree.find_intersecting(&full_extent(2)),
                Err(RTreeError::CorruptStorage(_))
            ));
        }
    }
}

#[test]
fn test_damaged_header_is_rejected() {
    let (_dir, path) = temp_tree_path("header.rtree");
    {
        let tree = RTree::create(
            StorageMode::File(path.clone()),
            RTreeConfig::new(2).unwrap(),
        )
        .unwrap();
        tree.close().unwrap();
    }

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(10)).unwrap();
    file.write_all(&[0xAA; 4]).unwrap();
    drop(file);

    assert!(matches!(
        RTree::open(&path),
        Err(RTreeError::CorruptStorage(_))
    ));
}

#[test]
fn test_truncated_file_is_rejected() {
    let (_dir, path) = temp_tree_path("truncated.rtree");
    {
        let mut tree = RTree::create(
            StorageMode::File(path.clone()),
            small_config(2, 4, 2, SplitStrategy::Quadratic),
        )
        .unwrap();
        for (rect, id) in random_entries(9, 40, 2) {
            tree.insert(&rect, id).unwrap();
        }
        tree.close().unwrap();
    }

    let len = std::fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len / 2).unwrap();
    drop(file);

    assert!(matches!(
        RTree::open(&path),
        Err(RTreeError::CorruptStorage(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let (_dir, path) = temp_tree_path("absent.rtree");
    assert!(matches!(RTree::open(&path), Err(RTreeError::Io(_))));
}

#[test]
fn test_cache_serves_repeated_searches() {
    let (_dir, path) = temp_tree_path("cache.rtree");
    {
        let mut tree = RTree::create(
            StorageMode::File(path.clone()),
            small_config(2, 8, 3, SplitStrategy::Quadratic),
        )
        .unwrap();
        for (rect, id) in random_entries(21, 200, 2) {
            tree.insert(&rect, id).unwrap();
        }
        tree.close().unwrap();
    }

    let tree = RTree::open_with_cache_size(&path, 1024).unwrap();
    let everything = full_extent(2);
    tree.find_intersecting(&everything).unwrap();
    let cold = tree.stats();
    tree.find_intersecting(&everything).unwrap();
    let warm = tree.stats();

    assert_eq!(warm.disk_reads, cold.disk_reads);
    assert!(warm.cache_hits > cold.cache_hits);
    assert_eq!(warm.cached_nodes, warm.node_count);
}
