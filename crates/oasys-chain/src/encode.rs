// oasys-chain/src/encode.rs

//! RLP append helpers for the crate's wire types.
//!
//! Hashes and addresses encode as fixed-length byte strings; amounts encode
//! as minimal big-endian integers (empty string for zero), matching the
//! Ethereum header and transaction encodings byte for byte.

use crate::types::Amount;
use oasys_crypto::{Address, Hash};
use rlp::RlpStream;

pub fn append_bytes(s: &mut RlpStream, bytes: &[u8]) {
    s.append(&bytes.to_vec());
}

pub fn append_hash(s: &mut RlpStream, hash: &Hash) {
    append_bytes(s, hash.as_bytes());
}

pub fn append_address(s: &mut RlpStream, address: &Address) {
    append_bytes(s, address.as_bytes());
}

/// `None` encodes as the empty string (contract creation `to` field)
pub fn append_opt_address(s: &mut RlpStream, address: &Option<Address>) {
    match address {
        Some(address) => append_address(s, address),
        None => append_bytes(s, &[]),
    }
}

pub fn append_amount(s: &mut RlpStream, amount: &Amount) {
    append_bytes(s, &amount.to_be_bytes_trimmed());
}
