//! Adjustable security ceilings for the XML token stream.
//!
//! Each limit is an atomic scalar so decoders on many threads can read it
//! without locking while an operator adjusts it at runtime. Setters clamp to a
//! floor below which the limits would stop meaning anything.

use crate::config::LimitsConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 2 * 1024 * 1024;
pub const DEFAULT_MAX_DEPTH: usize = 32;
pub const DEFAULT_MAX_ELEMENT_COUNT: usize = 10_000;
pub const DEFAULT_MAX_TOKEN_LEN: usize = 1024;
pub const DEFAULT_MAX_VALUE_LEN: usize = 512 * 1024;
pub const DEFAULT_MAX_ATTRIBUTES: usize = 64;

pub const MIN_DOCUMENT_SIZE: usize = 4 * 1024;
/// event > detail > extension > child
pub const MIN_DEPTH: usize = 4;
pub const MIN_ELEMENT_COUNT: usize = 16;
/// Room for an `<event>` start tag with every standard attribute.
pub const MIN_TOKEN_LEN: usize = 256;
pub const MIN_VALUE_LEN: usize = 1024;
pub const MIN_ATTRIBUTES: usize = 16;

static GLOBAL_LIMITS: Lazy<Arc<Limits>> = Lazy::new(|| Arc::new(Limits::new()));

/// Which ceiling a document ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitKind {
    DocumentSize,
    Depth,
    ElementCount,
    TokenLength,
    ValueLength,
    AttributeCount,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::DocumentSize => write!(f, "document size"),
            LimitKind::Depth => write!(f, "nesting depth"),
            LimitKind::ElementCount => write!(f, "element count"),
            LimitKind::TokenLength => write!(f, "token length"),
            LimitKind::ValueLength => write!(f, "value length"),
            LimitKind::AttributeCount => write!(f, "attribute count"),
        }
    }
}

/// Runtime-adjustable decoder limits.
#[derive(Debug)]
pub struct Limits {
    max_document_size: AtomicUsize,
    max_depth: AtomicUsize,
    max_element_count: AtomicUsize,
    max_token_len: AtomicUsize,
    max_value_len: AtomicUsize,
    max_attributes: AtomicUsize,
}

impl Limits {
    /// Creates limits at their defaults.
    pub fn new() -> Self {
        Self {
            max_document_size: AtomicUsize::new(DEFAULT_MAX_DOCUMENT_SIZE),
            max_depth: AtomicUsize::new(DEFAULT_MAX_DEPTH),
            max_element_count: AtomicUsize::new(DEFAULT_MAX_ELEMENT_COUNT),
            max_token_len: AtomicUsize::new(DEFAULT_MAX_TOKEN_LEN),
            max_value_len: AtomicUsize::new(DEFAULT_MAX_VALUE_LEN),
            max_attributes: AtomicUsize::new(DEFAULT_MAX_ATTRIBUTES),
        }
    }

    /// The process-wide limits used when a codec is not given its own.
    pub fn global() -> &'static Limits {
        &GLOBAL_LIMITS
    }

    /// A handle to the process-wide limits, for codecs that should follow
    /// runtime adjustments made through [`Limits::global`].
    pub fn shared() -> Arc<Limits> {
        Arc::clone(&*GLOBAL_LIMITS)
    }

    /// Creates limits from configuration, clamping each value to its floor.
    pub fn from_config(config: &LimitsConfig) -> Self {
        let limits = Self::new();
        limits.set_max_document_size(config.max_document_size);
        limits.set_max_depth(config.max_depth);
        limits.set_max_element_count(config.max_element_count);
        limits.set_max_token_len(config.max_token_len);
        limits.set_max_value_len(config.max_value_len);
        limits.set_max_attributes(config.max_attributes);
        limits
    }

    pub fn max_document_size(&self) -> usize {
        self.max_document_size.load(Ordering::Relaxed)
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth.load(Ordering::Relaxed)
    }

    pub fn max_element_count(&self) -> usize {
        self.max_element_count.load(Ordering::Relaxed)
    }

    pub fn max_token_len(&self) -> usize {
        self.max_token_len.load(Ordering::Relaxed)
    }

    pub fn max_value_len(&self) -> usize {
        self.max_value_len.load(Ordering::Relaxed)
    }

    pub fn max_attributes(&self) -> usize {
        self.max_attributes.load(Ordering::Relaxed)
    }

    /// Sets the maximum document size in bytes. Returns the effective value.
    pub fn set_max_document_size(&self, bytes: usize) -> usize {
        store_clamped(&self.max_document_size, LimitKind::DocumentSize, bytes, MIN_DOCUMENT_SIZE)
    }

    /// Sets the maximum element nesting depth. Returns the effective value.
    pub fn set_max_depth(&self, depth: usize) -> usize {
        store_clamped(&self.max_depth, LimitKind::Depth, depth, MIN_DEPTH)
    }

    /// Sets the maximum number of elements per document. Returns the effective value.
    pub fn set_max_element_count(&self, count: usize) -> usize {
        store_clamped(&self.max_element_count, LimitKind::ElementCount, count, MIN_ELEMENT_COUNT)
    }

    /// Sets the maximum length of a tag's raw markup, attribute values
    /// excluded. Names are bounded by it too. Returns the effective value.
    pub fn set_max_token_len(&self, len: usize) -> usize {
        store_clamped(&self.max_token_len, LimitKind::TokenLength, len, MIN_TOKEN_LEN)
    }

    /// Sets the maximum attribute value or text length. Returns the effective value.
    pub fn set_max_value_len(&self, len: usize) -> usize {
        store_clamped(&self.max_value_len, LimitKind::ValueLength, len, MIN_VALUE_LEN)
    }

    /// Sets the maximum number of attributes on one element. Returns the effective value.
    pub fn set_max_attributes(&self, count: usize) -> usize {
        store_clamped(&self.max_attributes, LimitKind::AttributeCount, count, MIN_ATTRIBUTES)
    }

    /// A consistent copy of the current values for one decode.
    pub fn snapshot(&self) -> LimitsSnapshot {
        LimitsSnapshot {
            max_document_size: self.max_document_size(),
            max_depth: self.max_depth(),
            max_element_count: self.max_element_count(),
            max_token_len: self.max_token_len(),
            max_value_len: self.max_value_len(),
            max_attributes: self.max_attributes(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

/// Limit values captured at the start of a decode.
///
/// A decode uses one snapshot throughout so a concurrent setter cannot change
/// the rules halfway through a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitsSnapshot {
    pub max_document_size: usize,
    pub max_depth: usize,
    pub max_element_count: usize,
    pub max_token_len: usize,
    pub max_value_len: usize,
    pub max_attributes: usize,
}

impl Default for LimitsSnapshot {
    fn default() -> Self {
        Limits::new().snapshot()
    }
}

fn store_clamped(slot: &AtomicUsize, kind: LimitKind, requested: usize, floor: usize) -> usize {
    let effective = requested.max(floor);
    if effective != requested {
        debug!(limit = %kind, requested, floor, "limit clamped to floor");
    }
    slot.store(effective, Ordering::Relaxed);
    effective
}
