// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The opaque ciphertext value handled by the POPE server.

use std::fmt;
use subtle::ConstantTimeEq;

/// An encrypted key, opaque to the server.
///
/// The server never interprets the bytes: equality is (constant-time) byte
/// equality, and there is deliberately no `Ord`/`PartialOrd` implementation,
/// because the plaintext order of two ciphertexts is only knowable through a
/// comparison oracle.
#[derive(Clone, Default, Eq)]
pub struct Ciphertext(Vec<u8>);

impl Ciphertext {
    /// Wraps the given bytes as an opaque ciphertext.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw ciphertext bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The length of the ciphertext in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the ciphertext has no bytes. Empty ciphertexts are rejected by
    /// every tree operation.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the ciphertext, returning the underlying bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl PartialEq for Ciphertext {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl From<Vec<u8>> for Ciphertext {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Ciphertext {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ciphertext(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}
