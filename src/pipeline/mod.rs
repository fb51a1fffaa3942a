//! Pipeline stages shared by the four operations.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the operations in [`crate::operation`] stay a thin
//! layer of geometry on top.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ encode
//!   │                       ▲
//!   └────▶ render ──────────┘
//! (bytes)  (decode/draw)  (JPEG/PNG/…)
//!          (pdfium, PDF pages)
//! ```
//!
//! 1. [`input`]:     wrap bytes or a path as a `SourceFile`, sniff the MIME
//!    type and check it against the allow-list
//! 2. [`rasterize`]: decode raster or SVG input and draw it onto an RGBA
//!    surface at the target geometry
//! 3. [`render`]:    rasterise PDF pages at 2× via pdfium; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 4. [`encode`]:    serialise a surface to the output type at a quality
//!    fraction; also produces preview thumbnails

pub mod encode;
pub mod input;
pub mod rasterize;
pub mod render;
