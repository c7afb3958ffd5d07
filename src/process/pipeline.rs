//! The edge-extraction pipeline.
//!
//! ```text
//! upload bytes ──► decode (grayscale) ──┬──► denoise ► canny ► recolor ► PNG   (blue_edges)
//!      │                                └──► denoise ► canny ► recolor ► PNG   (yellow_edges)
//!      └──────────────────────────────────────────────────────────────────────► (original)
//! ```
//!
//! Every variant reads the same decoded source. The pipeline holds no state
//! between runs, so a single instance can be shared across requests.

use std::fmt;

use bytes::Bytes;
use image::{GrayImage, RgbaImage};
use tracing::debug;

use crate::error::PipelineError;

use super::artifact::{derived_filename, ArtifactRole, ArtifactSet, EncodedArtifact};
use super::canny::{canny, CannyParams};
use super::codec::{
    decode_grayscale, encode_png, sniff_content_type, FALLBACK_CONTENT_TYPE, PNG_CONTENT_TYPE,
};
use super::filter::Denoise;
use super::recolor::{recolor, LabelColor};

/// How one edge layer is derived from the grayscale source.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRecipe {
    pub role: ArtifactRole,
    pub denoise: Denoise,
    pub canny: CannyParams,
    pub color: LabelColor,
}

impl VariantRecipe {
    /// Fine-texture layer: bilateral smoothing, aperture-5 gradients.
    pub fn blue_edges() -> Self {
        Self {
            role: ArtifactRole::BlueEdges,
            denoise: Denoise::Bilateral {
                diameter: 9,
                sigma_color: 75.0,
                sigma_space: 75.0,
            },
            canny: CannyParams::new(100.0, 200.0, 5, true),
            color: LabelColor::BLUE,
        }
    }

    /// Dominant-contour layer: 5x5 Gaussian, aperture-3 gradients.
    pub fn yellow_edges() -> Self {
        Self {
            role: ArtifactRole::YellowEdges,
            denoise: Denoise::Gaussian {
                ksize: 5,
                sigma: 0.0,
            },
            canny: CannyParams::new(50.0, 150.0, 3, true),
            color: LabelColor::YELLOW,
        }
    }

    /// Denoise, detect edges and paint them onto a transparent canvas.
    pub fn render(&self, source: &GrayImage) -> Result<RgbaImage, PipelineError> {
        let smoothed = self.denoise.apply(source);
        let edges = canny(&smoothed, &self.canny)?;
        debug!(
            role = %self.role,
            edge_pixels = edges.edge_count(),
            "Detected edges"
        );
        Ok(recolor(&edges, self.color))
    }
}

/// Layer encoder: canvas to PNG bytes.
type EncodeFn = fn(&RgbaImage, ArtifactRole) -> Result<Bytes, PipelineError>;

/// Runs every configured variant over an uploaded image.
#[derive(Clone)]
pub struct EdgePipeline {
    recipes: Vec<VariantRecipe>,
    encode: EncodeFn,
}

impl EdgePipeline {
    /// Create a pipeline from explicit recipes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if a recipe claims the
    /// `original` role, two recipes share a role, or a Canny setting is
    /// unusable.
    pub fn new(recipes: Vec<VariantRecipe>) -> Result<Self, PipelineError> {
        let mut seen = Vec::with_capacity(recipes.len());
        for recipe in &recipes {
            if recipe.role == ArtifactRole::Original {
                return Err(PipelineError::InvalidConfig(
                    "the original role is reserved for the uploaded bytes".to_string(),
                ));
            }
            if seen.contains(&recipe.role) {
                return Err(PipelineError::InvalidConfig(format!(
                    "duplicate recipe for role {}",
                    recipe.role
                )));
            }
            recipe.canny.validate()?;
            seen.push(recipe.role);
        }

        let mut recipes = recipes;
        recipes.sort_by_key(|r| r.role);
        Ok(Self {
            recipes,
            encode: encode_png,
        })
    }

    /// Swap the layer encoder.
    #[cfg(test)]
    pub(crate) fn with_encoder(mut self, encode: EncodeFn) -> Self {
        self.encode = encode;
        self
    }

    pub fn recipes(&self) -> &[VariantRecipe] {
        &self.recipes
    }

    /// Produce the original plus one encoded layer per recipe.
    ///
    /// `content_type` is the client-declared type of the upload; when absent
    /// it is sniffed from the bytes.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Decode`] if `data` is not a decodable image; no
    ///   variant runs.
    /// - [`PipelineError::Encode`] if any layer fails to encode; nothing is
    ///   returned for the other layers.
    pub fn run(
        &self,
        filename: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<ArtifactSet, PipelineError> {
        let source = decode_grayscale(&data)?;
        debug!(
            filename = filename,
            width = source.width(),
            height = source.height(),
            "Decoded upload"
        );

        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .map(str::to_string)
            .or_else(|| sniff_content_type(&data).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

        let mut artifacts = Vec::with_capacity(self.recipes.len() + 1);
        artifacts.push(EncodedArtifact {
            role: ArtifactRole::Original,
            filename: filename.to_string(),
            content_type,
            data,
        });

        for recipe in &self.recipes {
            let canvas = recipe.render(&source)?;
            let encoded = (self.encode)(&canvas, recipe.role)?;
            artifacts.push(EncodedArtifact {
                role: recipe.role,
                filename: derived_filename(recipe.role, filename),
                content_type: PNG_CONTENT_TYPE.to_string(),
                data: encoded,
            });
        }

        Ok(ArtifactSet::new(artifacts))
    }
}

impl fmt::Debug for EdgePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgePipeline")
            .field("recipes", &self.recipes)
            .finish_non_exhaustive()
    }
}

impl Default for EdgePipeline {
    fn default() -> Self {
        Self {
            recipes: vec![VariantRecipe::blue_edges(), VariantRecipe::yellow_edges()],
            encode: encode_png,
        }
    }
}
