//! Cheaply clonable interned strings.
//!
//! `Strng` is the string type used throughout the workspace for labels that
//! are created once and copied many times (model names, provider names, map
//! keys). Cloning is a refcount bump, and `literal!` embeds static strings
//! with no allocation at all.

use std::fmt::Display;

pub use arcstr::{ArcStr, format, literal};

pub type Strng = ArcStr;

pub fn new<A: AsRef<str>>(s: A) -> Strng {
	ArcStr::from(s.as_ref())
}

pub fn from_display(s: impl Display) -> Strng {
	ArcStr::from(s.to_string())
}

pub const EMPTY: Strng = literal!("");
