#![no_main]

use libfuzzer_sys::fuzz_target;
use perfcache::call_records::CallRecordReader;

fuzz_target!(|data: &[u8]| {
    // Every line either parses into a valid record or yields an error; never a panic
    for record in CallRecordReader::new(data) {
        if let Ok(record) = record {
            assert!(record.inclusive_time >= record.exclusive_time);
        }
    }
});
