//! Utilities for indexed storage.
//!
//! This module provides low-level utilities used internally by the runtime.
//! In particular, it exposes a [`Slab`] used by the scheduler to keep
//! suspended tasks under small, reusable indices.

mod slab;

pub(crate) use slab::Slab;
