//! Fuzz target for relay packet decoding
//!
//! Every relay packet decoder, binary and JSON, must return Ok or Err on
//! arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaynet_core::{
    Packet, RelayInitRequest, RelayInitResponse, RelayUpdateRequest, RelayUpdateResponse,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = RelayInitRequest::decode(data) {
        let _ = request.encode();
    }
    if let Ok(request) = RelayUpdateRequest::decode(data) {
        let _ = request.encode();
        let _ = request.to_json();
    }
    let _ = RelayInitResponse::decode(data);
    let _ = RelayUpdateResponse::decode(data);

    let _ = RelayInitRequest::from_json(data);
    let _ = RelayInitResponse::from_json(data);
    let _ = RelayUpdateRequest::from_json(data);
    let _ = RelayUpdateResponse::from_json(data);
});
