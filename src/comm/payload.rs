// SPDX-License-Identifier: MIT

//! The two payloads exchanged over the channel.
//!
//! The request is one JSON object describing the rectangular prism the
//! simulation drops.  The response is opaque text of bounded size.

use serde::{Deserialize, Serialize};

/// Maximum number of response bytes read from the peer.
pub const MAX_RESPONSE_LEN: usize = 200;

/// Scale and rotation of the simulated prism.
///
/// Field order matters: it is the order of the keys on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrismTransform {
    pub x_scale: f64,
    pub y_scale: f64,
    pub z_scale: f64,
    /// Rotations are whole degrees.
    pub x_rot: i32,
    pub y_rot: i32,
    pub z_rot: i32,
}

impl Default for PrismTransform {
    fn default() -> Self {
        PrismTransform {
            x_scale: 1.0,
            y_scale: 1.0,
            z_scale: 0.05,
            x_rot: 0,
            y_rot: 45,
            z_rot: 0,
        }
    }
}

impl PrismTransform {
    /// The exact bytes written to the channel.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Text shown for a response: everything before the first NUL, decoded as
/// UTF-8 with invalid sequences replaced.
pub fn response_text(payload: &[u8]) -> String {
    let end = payload.iter().position(|b| *b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRE_REQUEST: &[u8] =
        br#"{"XScale":1.0,"YScale":1.0,"ZScale":0.05,"XRot":0,"YRot":45,"ZRot":0}"#;

    #[test]
    fn default_request_matches_wire_format() {
        let payload = PrismTransform::default().to_payload().expect("encode");
        assert_eq!(payload, WIRE_REQUEST, "got {}", String::from_utf8_lossy(&payload));
    }

    #[test]
    fn request_is_stable_across_encodes() {
        let req = PrismTransform::default();
        assert_eq!(req.to_payload().expect("encode"), req.to_payload().expect("encode"));
    }

    #[test]
    fn decode_wire_request() {
        let req = PrismTransform::from_payload(WIRE_REQUEST).expect("decode");
        assert_eq!(req, PrismTransform::default());
    }

    #[test]
    fn decode_rejects_missing_field() {
        assert!(PrismTransform::from_payload(br#"{"XScale":1.0}"#).is_err());
    }

    #[test]
    fn custom_values_encode_in_field_order() {
        let req = PrismTransform {
            x_scale: 0.5,
            y_scale: 2.0,
            z_scale: 0.25,
            x_rot: -10,
            y_rot: 0,
            z_rot: 90,
        };
        assert_eq!(
            req.to_payload().expect("encode"),
            br#"{"XScale":0.5,"YScale":2.0,"ZScale":0.25,"XRot":-10,"YRot":0,"ZRot":90}"#
        );
    }

    #[test]
    fn response_stops_at_nul() {
        assert_eq!(response_text(b"OK\0junk"), "OK");
        assert_eq!(response_text(b"\0"), "");
    }

    #[test]
    fn response_without_nul_is_whole() {
        assert_eq!(response_text(b"fitness 0.93"), "fitness 0.93");
    }

    #[test]
    fn response_invalid_utf8_is_replaced() {
        assert_eq!(response_text(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }
}
