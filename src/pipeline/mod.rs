//! Pipeline stages for formula rendering.
//!
//! Each submodule implements exactly one step, so every step can be tested
//! on its own (resolution in particular is a pure function over collected
//! state and needs no processes at all).
//!
//! ## Data Flow
//!
//! ```text
//! launch ──▶ collect ──▶ resolve
//! (spawn)    (drain/wait)  (precedence)
//! ```
//!
//! 1. [`launch`]  — spawn `tex2svg` and `rsvg-convert`, first stdout wired
//!    into second stdin
//! 2. [`collect`] — decode the PNG while waiting on both processes, capture
//!    stderr, kill everything when the scope ends
//! 3. [`resolve`] — pick the single outcome by fixed precedence

pub mod collect;
pub mod launch;
pub mod resolve;
