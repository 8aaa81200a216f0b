// ============================================================================
// SignStudio — NFT sign compositing engine
// ============================================================================
//
// Loads an NFT's artwork by collection + token id, places sign / text / image
// overlays over it, composites everything onto a fixed 2048×2048 surface and
// exports the result as a PNG (file download and/or gallery upload).
//
// The interactive overlay model (drag / rotate / resize) lives in `gesture`
// and is driven by typed pointer events; the load → apply → export pipeline
// is exposed through the headless CLI in `cli`.

#![allow(clippy::too_many_arguments)]

pub mod cli;
pub mod compositor;
pub mod error;
pub mod export;
pub mod geometry;
pub mod gesture;
pub mod logger;
pub mod nft;
pub mod overlay;
pub mod session;
pub mod signs;
pub mod surface;
pub mod text;

pub use error::{ChainError, NetworkError, SignError};
pub use geometry::{CANVAS_EDGE, Mapper};
pub use overlay::{Overlay, OverlayId, OverlayStack};
pub use session::EditorSession;
pub use signs::Collection;
