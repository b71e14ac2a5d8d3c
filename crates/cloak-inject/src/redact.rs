// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exact-match redaction of secret values in child output.
//!
//! Matching is byte-level so output that is not valid UTF-8 passes through
//! untouched apart from the replaced spans. At each position the longest
//! secret that matches wins.
//!
//! [`StreamRedactor`] applies this chunk by chunk. By default every chunk is
//! redacted on its own, so a value split across two reads is NOT caught. The
//! opt-in boundary-safe mode holds back up to `longest_secret - 1` bytes
//! between chunks and flushes them at end of stream.

use cloak_core::REDACTION_MARKER;
use zeroize::Zeroizing;

/// A set of secret values to blank out.
#[derive(Default)]
pub struct Redactor {
    /// Non-empty, deduplicated, longest first.
    secrets: Vec<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

impl Redactor {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut secrets: Vec<Zeroizing<Vec<u8>>> = Vec::new();
        for value in values {
            let value = value.as_ref();
            if !value.is_empty() && !secrets.iter().any(|s| s.as_slice() == value) {
                secrets.push(Zeroizing::new(value.to_vec()));
            }
        }
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        Self { secrets }
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Length of the longest secret, 0 when empty.
    pub fn max_len(&self) -> usize {
        self.secrets.first().map_or(0, |s| s.len())
    }

    fn match_at(&self, input: &[u8], pos: usize) -> Option<usize> {
        let rest = &input[pos..];
        self.secrets
            .iter()
            .find(|s| rest.starts_with(s.as_slice()))
            .map(|s| s.len())
    }

    /// Scan `input` from the start, stopping before the first position with
    /// fewer than `lookahead` bytes left. Returns where scanning stopped.
    fn scan(&self, input: &[u8], lookahead: usize, out: &mut Vec<u8>) -> usize {
        let mut pos = 0;
        while pos < input.len() && input.len() - pos >= lookahead {
            match self.match_at(input, pos) {
                Some(len) => {
                    out.extend_from_slice(REDACTION_MARKER.as_bytes());
                    pos += len;
                }
                None => {
                    out.push(input[pos]);
                    pos += 1;
                }
            }
        }
        pos
    }

    /// Replace every occurrence of every secret in `input`.
    pub fn redact(&self, input: &[u8]) -> Vec<u8> {
        if self.is_empty() {
            return input.to_vec();
        }
        let mut out = Vec::with_capacity(input.len());
        self.scan(input, 1, &mut out);
        out
    }

    /// String convenience over [`Redactor::redact`].
    pub fn redact_str(&self, input: &str) -> String {
        String::from_utf8_lossy(&self.redact(input.as_bytes())).into_owned()
    }
}

/// Chunk-wise redaction for one output stream.
#[derive(Debug)]
pub struct StreamRedactor<'a> {
    redactor: &'a Redactor,
    boundary_safe: bool,
    carry: Vec<u8>,
}

impl<'a> StreamRedactor<'a> {
    pub fn new(redactor: &'a Redactor, boundary_safe: bool) -> Self {
        Self {
            redactor,
            boundary_safe,
            carry: Vec::new(),
        }
    }

    /// Redact one chunk and return the bytes ready to forward.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        if !self.boundary_safe || self.redactor.is_empty() {
            return self.redactor.redact(chunk);
        }

        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(chunk);
        let mut out = Vec::with_capacity(buf.len());
        // A decision at `pos` is final once the longest secret fits after it.
        let stopped = self.redactor.scan(&buf, self.redactor.max_len(), &mut out);
        self.carry = buf.split_off(stopped);
        out
    }

    /// Flush anything held back at end of stream.
    pub fn finish(&mut self) -> Vec<u8> {
        let tail = std::mem::take(&mut self.carry);
        self.redactor.redact(&tail)
    }
}
