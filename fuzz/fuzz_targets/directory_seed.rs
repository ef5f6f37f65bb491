//! Fuzz target for directory seed parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaynet_backend::InMemoryStorer;

fuzz_target!(|data: &[u8]| {
    if let Ok(storer) = InMemoryStorer::from_json(data) {
        let _ = storer.relay_count();
    }
});
