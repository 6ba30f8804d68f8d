//! Buffer pool manager scenario tests.
//!
//! These exercise the pin/guard protocol the way the surrounding system
//! (operators, index) drives it: guards as the only access path, eviction
//! under full pools, and latch behavior across threads.

use std::sync::Arc;

use pagepool::{BufferPoolManager, MemoryStorage};

const FRAMES: usize = 10;
const K: usize = 2;

fn create_bpm(pool_size: usize) -> BufferPoolManager {
    let _ = env_logger::builder().is_test(true).try_init();
    BufferPoolManager::new(pool_size, K, MemoryStorage::new())
}

/// Helper to write a null-terminated string to page data.
fn copy_string(data: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    data[..bytes.len()].copy_from_slice(bytes);
    data[bytes.len()] = 0;
}

/// Helper to read a null-terminated string from page data.
fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

#[test]
fn test_very_basic() {
    let bpm = create_bpm(FRAMES);
    let str_data = "Hello, world!";

    let pid = bpm.allocate_page_id();

    // Write guard basic functionality.
    {
        let mut guard = bpm.fetch_page_write(pid).unwrap();
        copy_string(guard.as_mut_slice(), str_data);
        assert_eq!(read_string(guard.as_slice()), str_data);
    }

    // Read guard basic functionality.
    {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(read_string(guard.as_slice()), str_data);
    }

    // And again.
    {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(read_string(guard.as_slice()), str_data);
    }

    assert!(bpm.delete_page(pid).is_ok());
}

#[test]
fn test_page_pin_easy() {
    let bpm = create_bpm(2);

    let pageid0 = bpm.allocate_page_id();
    let pageid1 = bpm.allocate_page_id();

    let str0 = "page0";
    let str1 = "page1";
    let str0_updated = "page0updated";
    let str1_updated = "page1updated";

    let temp_page_id1 = bpm.allocate_page_id();
    let temp_page_id2 = bpm.allocate_page_id();

    {
        let mut page0_write = bpm.checked_write_page(pageid0).unwrap();
        copy_string(page0_write.as_mut_slice(), str0);

        let mut page1_write = bpm.checked_write_page(pageid1).unwrap();
        copy_string(page1_write.as_mut_slice(), str1);

        assert_eq!(bpm.get_pin_count(pageid0), Some(1));
        assert_eq!(bpm.get_pin_count(pageid1), Some(1));

        // All frames pinned - no way to bring in another page.
        assert!(bpm.checked_read_page(temp_page_id1).is_none());
        assert!(bpm.checked_write_page(temp_page_id2).is_none());

        page0_write.drop_guard();
        assert_eq!(bpm.get_pin_count(pageid0), Some(0));

        page1_write.drop_guard();
        assert_eq!(bpm.get_pin_count(pageid1), Some(0));
    }

    {
        // Now the temp pages fit (evicting pageid0 and pageid1).
        assert!(bpm.checked_read_page(temp_page_id1).is_some());
        assert!(bpm.checked_write_page(temp_page_id2).is_some());

        // Both originals were evicted - not resident any more.
        assert!(bpm.get_pin_count(pageid0).is_none());
        assert!(bpm.get_pin_count(pageid1).is_none());
    }

    {
        // Fetch the originals back - reloaded from storage.
        let mut page0_write = bpm.checked_write_page(pageid0).unwrap();
        assert_eq!(read_string(page0_write.as_slice()), str0);
        copy_string(page0_write.as_mut_slice(), str0_updated);

        let mut page1_write = bpm.checked_write_page(pageid1).unwrap();
        assert_eq!(read_string(page1_write.as_slice()), str1);
        copy_string(page1_write.as_mut_slice(), str1_updated);

        assert_eq!(bpm.get_pin_count(pageid0), Some(1));
        assert_eq!(bpm.get_pin_count(pageid1), Some(1));
    }

    assert_eq!(bpm.get_pin_count(pageid0), Some(0));
    assert_eq!(bpm.get_pin_count(pageid1), Some(0));

    {
        // Verify the updates survived the guard drops.
        let page0_read = bpm.checked_read_page(pageid0).unwrap();
        assert_eq!(read_string(page0_read.as_slice()), str0_updated);

        let page1_read = bpm.checked_read_page(pageid1).unwrap();
        assert_eq!(read_string(page1_read.as_slice()), str1_updated);
    }
}

#[test]
fn test_page_pin_medium() {
    let bpm = create_bpm(FRAMES);

    // The pool is empty; creating a page must work.
    let pid0 = bpm.allocate_page_id();
    let mut page0 = bpm.fetch_page_write(pid0).unwrap();

    let hello = "Hello";
    copy_string(page0.as_mut_slice(), hello);
    assert_eq!(read_string(page0.as_slice()), hello);

    page0.drop_guard();

    // Fill the pool with pinned pages (the last one evicts pid0).
    let mut pages = Vec::new();
    for _ in 0..FRAMES {
        let pid = bpm.allocate_page_id();
        let page = bpm.fetch_page_write(pid).unwrap();
        pages.push(page);
    }

    for page in &pages {
        assert_eq!(bpm.get_pin_count(page.page_id()), Some(1));
    }

    // Full pool: no new page can be brought in.
    for _ in 0..FRAMES {
        let pid = bpm.allocate_page_id();
        assert!(bpm.checked_write_page(pid).is_none());
    }

    // Drop the first half to unpin them.
    for _ in 0..(FRAMES / 2) {
        let pid = pages[0].page_id();
        assert_eq!(bpm.get_pin_count(pid), Some(1));
        pages.remove(0);
        assert_eq!(bpm.get_pin_count(pid), Some(0));
    }

    for page in &pages {
        assert_eq!(bpm.get_pin_count(page.page_id()), Some(1));
    }

    // With unpinned frames available, new pages fit again.
    for _ in 0..((FRAMES / 2) - 1) {
        let pid = bpm.allocate_page_id();
        let page = bpm.fetch_page_write(pid).unwrap();
        pages.push(page);
    }

    // One evictable frame left; the data written a while ago survives the
    // round trip through storage.
    {
        let original_page = bpm.fetch_page_read(pid0).unwrap();
        assert_eq!(read_string(original_page.as_slice()), hello);
    }

    // pid0's guard is gone again; one more pinned page fills the pool and
    // pid0 can no longer be brought back.
    let last_pid = bpm.allocate_page_id();
    let _last_page = bpm.fetch_page_read(last_pid).unwrap();

    assert!(bpm.checked_read_page(pid0).is_none());
}

#[test]
fn test_drop() {
    let bpm = create_bpm(FRAMES);

    {
        let pid0 = bpm.allocate_page_id();
        let mut page0 = bpm.fetch_page_write(pid0).unwrap();

        assert_eq!(bpm.get_pin_count(pid0), Some(1));

        // An explicit drop unpins the page.
        page0.drop_guard();
        assert_eq!(bpm.get_pin_count(pid0), Some(0));

        // A second drop has no effect.
        page0.drop_guard();
        assert_eq!(bpm.get_pin_count(pid0), Some(0));
    } // Destructor runs here; useless but harmless.

    let pid1 = bpm.allocate_page_id();
    let pid2 = bpm.allocate_page_id();

    {
        let mut read_guarded_page = bpm.fetch_page_read(pid1).unwrap();
        let mut write_guarded_page = bpm.fetch_page_write(pid2).unwrap();

        assert_eq!(bpm.get_pin_count(pid1), Some(1));
        assert_eq!(bpm.get_pin_count(pid2), Some(1));

        read_guarded_page.drop_guard();
        write_guarded_page.drop_guard();
        assert_eq!(bpm.get_pin_count(pid1), Some(0));
        assert_eq!(bpm.get_pin_count(pid2), Some(0));

        read_guarded_page.drop_guard();
        write_guarded_page.drop_guard();
        assert_eq!(bpm.get_pin_count(pid1), Some(0));
        assert_eq!(bpm.get_pin_count(pid2), Some(0));
    }

    // This will hang if drop_guard failed to release the content locks.
    {
        let _write_test1 = bpm.fetch_page_write(pid1).unwrap();
        let _write_test2 = bpm.fetch_page_write(pid2).unwrap();
    }

    let mut page_ids = Vec::new();
    {
        // Fill up the pool.
        let mut guards = Vec::new();
        for _ in 0..FRAMES {
            let new_pid = bpm.allocate_page_id();
            let guard = bpm.fetch_page_write(new_pid).unwrap();
            assert_eq!(bpm.get_pin_count(new_pid), Some(1));
            page_ids.push(new_pid);
            guards.push(guard);
        }
    } // Drops every guard.

    for pid in &page_ids {
        assert_eq!(bpm.get_pin_count(*pid), Some(0));
    }

    // Edit a page, drop it, evict it by refilling the pool, retrieve it.
    let mutable_page_id = bpm.allocate_page_id();
    let mut mutable_guard = bpm.fetch_page_write(mutable_page_id).unwrap();
    copy_string(mutable_guard.as_mut_slice(), "data");
    mutable_guard.drop_guard();

    {
        let mut guards = Vec::new();
        for _ in 0..FRAMES {
            let new_pid = bpm.allocate_page_id();
            guards.push(bpm.fetch_page_write(new_pid).unwrap());
        }
    }

    {
        let guard = bpm.fetch_page_read(mutable_page_id).unwrap();
        assert_eq!(read_string(guard.as_slice()), "data");
    }
}

/// A pinned page can never be evicted, no matter how much pressure the
/// other threads apply.
#[test]
fn test_evictable() {
    use std::sync::{Condvar, Mutex};
    use std::thread;

    const ROUNDS: usize = 50;
    const NUM_READERS: usize = 4;

    let bpm = Arc::new(create_bpm(1)); // Only 1 frame.

    for round in 0..ROUNDS {
        // The "winner" occupies the only frame at the start of the round.
        let winner_pid = bpm.allocate_page_id();
        drop(bpm.fetch_page_write(winner_pid).unwrap());

        // Bringing in the "loser" evicts the winner.
        let loser_pid = bpm.allocate_page_id();
        drop(bpm.fetch_page_write(loser_pid).unwrap());

        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let mut readers = Vec::new();

        for _ in 0..NUM_READERS {
            let bpm_clone = Arc::clone(&bpm);
            let signal_clone = Arc::clone(&signal);

            readers.push(thread::spawn(move || {
                let (lock, cvar) = &*signal_clone;

                {
                    let mut started = lock.lock().unwrap();
                    while !*started {
                        started = cvar.wait(started).unwrap();
                    }
                }

                // Main holds the winner pinned; reading it is a cache hit
                // under a shared lock.
                let _read_guard = bpm_clone.fetch_page_read(winner_pid).unwrap();

                // The only frame is pinned, so the loser cannot come in.
                assert!(
                    bpm_clone.checked_read_page(loser_pid).is_none(),
                    "round {}: loser fetched while winner was pinned",
                    round
                );
            }));
        }

        // Fetch the winner back (evicting the loser) and hold it.
        let winner_guard = bpm.fetch_page_read(winner_pid).unwrap();

        {
            let (lock, cvar) = &*signal;
            let mut started = lock.lock().unwrap();
            *started = true;
            cvar.notify_all();
        }

        for reader in readers {
            reader.join().unwrap();
        }

        drop(winner_guard);
    }
}

/// Holding one page's latch must not block unrelated manager operations.
#[test]
fn test_page_access() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    let bpm = Arc::new(create_bpm(FRAMES));

    let pid0 = bpm.allocate_page_id();
    let pid1 = bpm.allocate_page_id();

    // Bring both pages into the pool.
    drop(bpm.fetch_page_write(pid0).unwrap());
    drop(bpm.fetch_page_write(pid1).unwrap());

    // Take the write latch on page 0.
    let mut guard0 = bpm.fetch_page_write(pid0).unwrap();

    let start = Arc::new(AtomicBool::new(false));
    let start_clone = Arc::clone(&start);
    let bpm_clone = Arc::clone(&bpm);

    let child = thread::spawn(move || {
        start_clone.store(true, Ordering::SeqCst);

        // Blocks until main releases page 0 - on the content lock only,
        // never on the manager's bookkeeping lock.
        let _guard0 = bpm_clone.fetch_page_write(pid0).unwrap();
    });

    while !start.load(Ordering::SeqCst) {
        thread::yield_now();
    }

    thread::sleep(Duration::from_millis(100));

    // While the child waits on page 0, page 1 must still be reachable.
    let _guard1 = bpm.fetch_page_write(pid1).unwrap();

    guard0.drop_guard();

    child.join().unwrap();
}
