//! Reinhardt Payload - state transfer between SSR and hydration
//!
//! The payload is the serialized application state a server render hands to
//! the client. It has to survive values JSON cannot express on its own:
//! `undefined`, `BigInt`, dates, maps and sets, reactive wrappers, errors and
//! self-referencing graphs.
//!
//! ## Wire formats
//!
//! - [`stringify`] / [`parse`]: a flat reference table encoded as JSON. Slot 0
//!   is the root, containers point at other slots by index, and every shared
//!   handle is written exactly once. This is what ends up in
//!   `<script type="application/json" id="__NUXT_DATA__">`.
//! - [`uneval`]: an executable JavaScript expression assigned to
//!   `window.__NUXT__`, for consumers that evaluate the payload directly.
//!
//! ## Reducers and revivers
//!
//! Non-plain values are written through a [`ReducerRegistry`]: an ordered list
//! of `(tag, reducer)` pairs where each reducer inspects a value and claims it
//! by returning its plain form. The consuming side looks the tag up in a
//! [`ReviverRegistry`] to rebuild the live value.
//!
//! ```
//! use reinhardt_payload::{ReducerRegistry, ReviverRegistry, Value, parse, stringify};
//!
//! let state = Value::object([("count", Value::new_ref(Value::Number(1.0)))]);
//! let text = stringify(&state, &ReducerRegistry::default()).unwrap();
//! assert_eq!(text, r#"[{"count":1},["Ref",2],1]"#);
//!
//! let revived = parse(&text, &ReviverRegistry::default()).unwrap();
//! assert_eq!(revived, state);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod parse;
pub mod payload;
pub mod registry;
pub mod stringify;
pub mod uneval;
pub mod value;

pub use error::{PayloadError, PayloadResult};
pub use parse::parse;
pub use payload::{Payload, PayloadCodec, PayloadFormat};
pub use registry::{Reducer, ReducerRegistry, Reviver, ReviverRegistry};
pub use stringify::stringify;
pub use uneval::uneval;
pub use value::{CustomValue, ErrorValue, ReactiveValue, RefValue, Shared, Value};
