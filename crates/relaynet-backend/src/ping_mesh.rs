//! Ping-mesh peer selection and session near-relay selection.

use crate::state::RelayState;
use crate::storer::Relay;
use relaynet_core::{MAX_RELAYS, NearRelay, RelayPingTarget};
use std::cmp::Ordering;

/// Mean Earth radius in kilometres
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Peers the requester should ping next.
///
/// Every enabled relay in `live` other than the requester, deduplicated and
/// ordered by ID, at most [`MAX_RELAYS`]. A peer sold by the same seller is
/// reached on its internal address when it has one.
#[must_use]
pub fn select_peers(requester: &Relay, live: &[Relay]) -> Vec<RelayPingTarget> {
    let mut peers: Vec<&Relay> = live
        .iter()
        .filter(|r| r.state == RelayState::Enabled)
        .filter(|r| r.id != requester.id && r.address != requester.address)
        .collect();
    peers.sort_by_key(|r| r.id);
    peers.dedup_by_key(|r| r.id);
    peers.truncate(MAX_RELAYS);

    peers
        .into_iter()
        .map(|peer| {
            let address = match peer.internal_address {
                Some(internal) if peer.seller.name == requester.seller.name => internal,
                _ => peer.address,
            };
            RelayPingTarget {
                id: peer.id,
                address,
            }
        })
        .collect()
}

/// Great-circle distance in kilometres between two points in degrees.
#[must_use]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// The `max` enabled relays closest to a location, nearest first.
///
/// Equidistant relays are ordered by ID.
#[must_use]
pub fn near_relays(latitude: f64, longitude: f64, live: &[Relay], max: usize) -> Vec<NearRelay> {
    let mut candidates: Vec<(f64, &Relay)> = live
        .iter()
        .filter(|r| r.state == RelayState::Enabled)
        .map(|r| {
            let distance = haversine_distance(
                latitude,
                longitude,
                r.datacenter.latitude,
                r.datacenter.longitude,
            );
            (distance, r)
        })
        .collect();
    candidates.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.id.cmp(&b.1.id))
    });
    candidates.dedup_by_key(|c| c.1.id);

    candidates
        .into_iter()
        .take(max)
        .map(|(_, r)| NearRelay {
            id: r.id,
            address: r.address,
        })
        .collect()
}
