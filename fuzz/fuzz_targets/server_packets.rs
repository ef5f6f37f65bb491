//! Fuzz target for game server packet decoding
//!
//! The first byte selects the decoder, as on the wire.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaynet_core::packets::server::packet_type;
use relaynet_core::{
    Packet, ServerInitRequest, ServerInitResponse, ServerUpdate, SessionResponse, SessionUpdate,
    SignedPacket,
};

fuzz_target!(|data: &[u8]| {
    let Some((&kind, body)) = data.split_first() else {
        return;
    };

    match kind {
        packet_type::SERVER_INIT_REQUEST => {
            if let Ok(packet) = ServerInitRequest::decode(body) {
                let _ = packet.verify(&[0u8; 32]);
            }
        }
        packet_type::SERVER_INIT_RESPONSE => {
            let _ = ServerInitResponse::decode(body);
        }
        packet_type::SERVER_UPDATE => {
            if let Ok(packet) = ServerUpdate::decode(body) {
                let _ = packet.verify(&[0u8; 32]);
            }
        }
        packet_type::SESSION_UPDATE => {
            if let Ok(packet) = SessionUpdate::decode(body) {
                let _ = packet.encode();
            }
        }
        packet_type::SESSION_RESPONSE => {
            if let Ok(packet) = SessionResponse::decode(body) {
                let _ = packet.encode();
            }
        }
        _ => {}
    }
});
