//! Fuzz target for CBOR decoding of [`RegistrationBody`]
//!
//! Service responses are untrusted input. Decoding must reject garbage
//! without panicking, and anything it accepts must classify and re-encode.
//!
//! # Invariants
//!
//! - NEVER panic on arbitrary bytes
//! - A decoded body always re-encodes
//! - Classification is total and stable across a re-encode

#![no_main]

use libfuzzer_sys::fuzz_target;
use provision_proto::{RegistrationBody, cbor};

fuzz_target!(|data: &[u8]| {
    let Ok(body) = cbor::decode::<RegistrationBody>(data) else {
        return;
    };

    let status = body.classify();
    let encoded = cbor::encode(&body).expect("decoded body must re-encode");
    let decoded: RegistrationBody =
        cbor::decode(&encoded).expect("re-encoded body must decode");

    assert_eq!(decoded.classify(), status);
    assert_eq!(decoded.operation_id, body.operation_id);
});
