//! Pipeline stages for résumé review.
//!
//! Each submodule implements exactly one step; [`crate::submit`] strings
//! them together and owns persistence.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ director ──▶ normalize
//! (path/URL) (pdfium)  (PNG)     (backends)   (JSON → FeedbackReport)
//! ```
//!
//! 1. [`input`]   : read the user-supplied path or download the URL
//! 2. [`render`]  : validate the document and rasterise page 1
//! 3. [`encode`]  : PNG-encode the page; base64-wrap stored images for
//!    multimodal requests
//! 4. [`backend`] : the two invocation methods of one vision model
//! 5. [`director`]: ordered fallback over backends with per-call deadlines;
//!    the only stage with network I/O
//! 6. [`normalize`]: extract the response text and parse it as feedback

pub mod backend;
pub mod director;
pub mod encode;
pub mod input;
pub mod normalize;
pub mod render;
