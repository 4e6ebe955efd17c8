//! Ordered vendor credentials with an atomically advanced cursor.
//!
//! Concurrent submissions read the cursor without locking. When a
//! submission decides to rotate away from the credential it used, it
//! advances the cursor with a compare-and-swap from the slot it observed,
//! so several submissions failing on the same bad key move the cursor past
//! it exactly once.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::CoreError;

/// A single vendor API credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Display name used in logs. Never the key itself.
    pub label: String,
    pub api_key: String,
}

impl Credential {
    pub fn new(label: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Parse a comma-separated list of `label=key` or bare `key` entries.
    ///
    /// Bare keys are labelled `key-1`, `key-2`, ... by position.
    pub fn parse(list: &str) -> Result<Self, CoreError> {
        let mut credentials = Vec::new();
        for (i, entry) in list.split(',').map(str::trim).filter(|e| !e.is_empty()).enumerate() {
            let credential = match entry.split_once('=') {
                Some((label, key)) => {
                    let (label, key) = (label.trim(), key.trim());
                    if label.is_empty() || key.is_empty() {
                        return Err(CoreError::Validation(format!(
                            "credential entry {} must be 'label=key'",
                            i + 1
                        )));
                    }
                    Credential::new(label, key)
                }
                None => Credential::new(format!("key-{}", i + 1), entry),
            };
            credentials.push(credential);
        }
        Ok(Self::new(credentials))
    }

    pub fn into_credentials(self) -> Vec<Credential> {
        self.credentials
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// The slot the cursor currently points at, plus its credential.
    ///
    /// Returns `None` for an empty pool.
    pub fn snapshot(&self) -> Option<(usize, &Credential)> {
        if self.credentials.is_empty() {
            return None;
        }
        let slot = self.cursor.load(Ordering::Acquire) % self.credentials.len();
        Some((slot, &self.credentials[slot]))
    }

    /// Credential at `slot` (wrapping).
    pub fn get(&self, slot: usize) -> Option<&Credential> {
        if self.credentials.is_empty() {
            return None;
        }
        self.credentials.get(slot % self.credentials.len())
    }

    /// Move the cursor past `failed_slot`.
    ///
    /// If another submission already rotated away from `failed_slot`, the
    /// cursor is left where it is. Returns the slot the cursor points at
    /// afterwards.
    pub fn rotate_from(&self, failed_slot: usize) -> Option<usize> {
        let len = self.credentials.len();
        if len == 0 {
            return None;
        }
        let failed_slot = failed_slot % len;
        let next = (failed_slot + 1) % len;

        let current = self.cursor.load(Ordering::Acquire);
        let advanced = current % len == failed_slot
            && self
                .cursor
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();

        if advanced {
            tracing::info!(
                from = %self.credentials[failed_slot].label,
                to = %self.credentials[next].label,
                "Rotated vendor credential",
            );
        }
        Some(self.cursor.load(Ordering::Acquire) % len)
    }
}
