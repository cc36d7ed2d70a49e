//! Reinhardt Markers - identity and slot markers in rendered markup
//!
//! Server-rendered islands are identified in plain HTML by a small marker
//! grammar:
//!
//! | Marker | Meaning |
//! |--------|---------|
//! | `nuxt-ssr-component-uid="<uid>"` | root element of an island instance |
//! | `nuxt-ssr-slot-name="<name>"` | a named insertion point |
//! | `nuxt-ssr-slot-data="<json>"` | entity-encoded slot props, right after the name |
//! | `<!--[-->` ... `<!--]-->` | a multi-root fragment |
//!
//! This crate reads that grammar with a real tokenizer ([`Fragment`]) and
//! rewrites it with a streaming rewriter ([`replace_uid`]) or by splicing at
//! fragment spans ([`insert_into_slots`]), never with regular expressions
//! over the text.

#![warn(missing_docs)]

pub mod error;
pub mod fragment;
pub mod rewrite;
pub mod scan;
pub mod tokenizer;
pub mod vfor;

pub use error::{MarkupError, MarkupResult};
pub use fragment::{Element, Fragment, Node, NodeData, NodeId};
pub use rewrite::{SlotInsertion, clear_slots, insert_into_slots, replace_uid, slot_selector};
pub use scan::{decode_entities, get_fragment_html, get_slot_names, get_slot_props, get_uid};
pub use vfor::{MAX_RANGE_COUNT, vfor_to_array};

/// Attribute carrying an island instance UID.
pub const UID_ATTR: &str = "nuxt-ssr-component-uid";

/// Attribute naming a slot insertion point.
pub const SLOT_NAME_ATTR: &str = "nuxt-ssr-slot-name";

/// Attribute carrying a slot's entity-encoded JSON props.
pub const SLOT_DATA_ATTR: &str = "nuxt-ssr-slot-data";

/// Text of the comment opening a multi-root fragment.
pub const FRAGMENT_START: &str = "[";

/// Text of the comment closing a multi-root fragment.
pub const FRAGMENT_END: &str = "]";
