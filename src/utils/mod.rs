// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Utility modules
//!
//! Terminal output helpers for the promptflow CLI.

pub mod colors;
pub mod spinner;

pub use colors::*;
pub use spinner::*;
