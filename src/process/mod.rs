//! Edge-extraction pipeline.
//!
//! This module turns an uploaded image into a set of transparent PNG layers,
//! each showing the edges found by one recipe in a single label color.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              EdgePipeline               │
//! │  ┌──────────┐ ┌────────┐ ┌───────────┐  │
//! │  │  codec   │ │ filter │ │   canny   │  │
//! │  │ (decode, │ │(blur,  │ │ (sobel,   │  │
//! │  │  png)    │ │ bilat.)│ │  nms, hys)│  │
//! │  └──────────┘ └────────┘ └───────────┘  │
//! │               ┌─────────┐               │
//! │               │ recolor │               │
//! │               └─────────┘               │
//! └────────────────────┬────────────────────┘
//!                      │ ArtifactSet
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            ArtifactCommitter            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use edge_layers::process::{ArtifactRole, EdgePipeline};
//!
//! let upload = Bytes::from(std::fs::read("photo.jpg").unwrap());
//! let set = EdgePipeline::default().run("photo.jpg", None, upload).unwrap();
//!
//! let blue = set.get(ArtifactRole::BlueEdges).unwrap();
//! println!("{}: {} bytes", blue.filename, blue.data.len());
//! ```

mod artifact;
mod canny;
mod codec;
mod filter;
mod pipeline;
mod recolor;

pub use artifact::{derived_filename, filename_stem, ArtifactRole, ArtifactSet, EncodedArtifact};
pub use canny::{canny, sobel_gradients, CannyParams, EdgeMap, EDGE};
pub use codec::{
    content_type_for_filename, decode_grayscale, encode_png, is_png, sniff_content_type,
    FALLBACK_CONTENT_TYPE, PNG_CONTENT_TYPE,
};
pub use filter::{bilateral_filter, gaussian_blur, gaussian_kernel, sigma_for_kernel, Denoise};
pub use pipeline::{EdgePipeline, VariantRecipe};
pub use recolor::{recolor, LabelColor, TRANSPARENT};
