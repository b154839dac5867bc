#![no_main]

use libfuzzer_sys::fuzz_target;
use perfcache::cache_store::CacheStore;
use std::io::Write;

fuzz_target!(|data: &[u8]| {
    let Ok(mut file) = tempfile::NamedTempFile::new() else {
        return;
    };
    if file.write_all(data).is_err() {
        return;
    }
    // Arbitrary bytes must load or fail with a StorageError, never panic
    let _ = CacheStore::load(file.path());
});
