//! Video conditioning features and time-axis windowing.
//!
//! The video tower produces a 5-D feature tensor `[batch, channels, time,
//! height, width]` at a fixed frame rate. The generation controller only ever
//! manipulates the time axis; every other axis is opaque to it.

use std::path::Path;

use ndarray::{s, Array5};
use serde::Deserialize;

use crate::error::{EngineError, Result};

/// A temporally ordered video feature tensor, `[batch, channels, time, height, width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFeatures {
    data: Array5<f32>,
}

impl VideoFeatures {
    /// Wraps a raw feature tensor.
    pub fn new(data: Array5<f32>) -> Self {
        Self { data }
    }

    /// Returns the underlying tensor.
    pub fn as_array(&self) -> &Array5<f32> {
        &self.data
    }

    /// Batch size.
    pub fn batch(&self) -> usize {
        self.data.dim().0
    }

    /// Number of frames along the time axis.
    pub fn frames(&self) -> usize {
        self.data.dim().2
    }

    /// Returns the first `n` frames (or everything, if shorter).
    pub fn first_frames(&self, n: usize) -> Self {
        let n = n.min(self.frames());
        Self {
            data: self.data.slice(s![.., .., ..n, .., ..]).to_owned(),
        }
    }

    /// Drops the first `n` frames.
    pub fn drop_frames(&self, n: usize) -> Self {
        let n = n.min(self.frames());
        Self {
            data: self.data.slice(s![.., .., n.., .., ..]).to_owned(),
        }
    }

    /// Returns the last `n` frames (or everything, if shorter).
    pub fn last_frames(&self, n: usize) -> Self {
        let start = self.frames().saturating_sub(n);
        Self {
            data: self.data.slice(s![.., .., start.., .., ..]).to_owned(),
        }
    }

    /// Loads features from a JSON manifest next to a raw little-endian f32 file.
    ///
    /// The manifest names the tensor shape and the data file:
    ///
    /// ```json
    /// { "shape": [1, 3, 120, 16, 16], "data": "features.f32" }
    /// ```
    ///
    /// The data path is resolved relative to the manifest's directory.
    pub fn load(manifest_path: &Path) -> Result<Self> {
        let manifest_text = std::fs::read_to_string(manifest_path).map_err(|e| {
            EngineError::model_load_failed(format!(
                "Failed to read video manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })?;

        let manifest: VideoManifest = serde_json::from_str(&manifest_text).map_err(|e| {
            EngineError::model_load_failed(format!(
                "Failed to parse video manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })?;

        if manifest.shape.len() != 5 {
            return Err(EngineError::shape_mismatch(format!(
                "video features must be 5-D [B, C, T, H, W], manifest declares {} dims",
                manifest.shape.len()
            )));
        }

        let data_path = manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&manifest.data);
        let bytes = std::fs::read(&data_path).map_err(|e| {
            EngineError::model_load_failed(format!(
                "Failed to read video features {}: {}",
                data_path.display(),
                e
            ))
        })?;

        let expected: usize = manifest.shape.iter().product();
        if bytes.len() != expected * 4 {
            return Err(EngineError::shape_mismatch(format!(
                "video feature file holds {} bytes, shape {:?} needs {}",
                bytes.len(),
                manifest.shape,
                expected * 4
            )));
        }

        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let shape = (
            manifest.shape[0],
            manifest.shape[1],
            manifest.shape[2],
            manifest.shape[3],
            manifest.shape[4],
        );
        let data = Array5::from_shape_vec(shape, values)
            .map_err(|e| EngineError::shape_mismatch(format!("video feature layout: {}", e)))?;

        Ok(Self { data })
    }
}

/// Manifest format for feature files produced by the offline video frontend.
#[derive(Debug, Deserialize)]
struct VideoManifest {
    shape: Vec<usize>,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn features(frames: usize) -> VideoFeatures {
        // Stamp each frame's values with its index so slices are checkable.
        let mut data = Array5::<f32>::zeros((1, 2, frames, 2, 2));
        for t in 0..frames {
            data.slice_mut(s![.., .., t, .., ..]).fill(t as f32);
        }
        VideoFeatures::new(data)
    }

    #[test]
    fn first_frames_takes_prefix() {
        let v = features(10);
        let head = v.first_frames(4);
        assert_eq!(head.frames(), 4);
        assert_eq!(head.as_array()[[0, 0, 3, 0, 0]], 3.0);
    }

    #[test]
    fn drop_frames_advances_window() {
        let v = features(10);
        let rest = v.drop_frames(6);
        assert_eq!(rest.frames(), 4);
        assert_eq!(rest.as_array()[[0, 0, 0, 0, 0]], 6.0);
    }

    #[test]
    fn last_frames_takes_tail() {
        let v = features(10);
        let tail = v.last_frames(3);
        assert_eq!(tail.frames(), 3);
        assert_eq!(tail.as_array()[[0, 0, 0, 0, 0]], 7.0);
    }

    #[test]
    fn slicing_clamps_instead_of_panicking() {
        let v = features(3);
        assert_eq!(v.first_frames(10).frames(), 3);
        assert_eq!(v.drop_frames(10).frames(), 0);
        assert_eq!(v.last_frames(10).frames(), 3);
    }

    #[test]
    fn manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("features.f32");
        let manifest_path = dir.path().join("features.json");

        let values: Vec<f32> = (0..4).map(|i| i as f32).collect();
        let mut file = std::fs::File::create(&data_path).unwrap();
        for v in &values {
            file.write_all(&v.to_le_bytes()).unwrap();
        }
        std::fs::write(
            &manifest_path,
            r#"{ "shape": [1, 1, 2, 1, 2], "data": "features.f32" }"#,
        )
        .unwrap();

        let v = VideoFeatures::load(&manifest_path).unwrap();
        assert_eq!(v.frames(), 2);
        assert_eq!(v.as_array()[[0, 0, 1, 0, 1]], 3.0);
    }

    #[test]
    fn manifest_rejects_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("features.f32"), [0u8; 8]).unwrap();
        let manifest_path = dir.path().join("features.json");
        std::fs::write(
            &manifest_path,
            r#"{ "shape": [1, 1, 2, 1, 2], "data": "features.f32" }"#,
        )
        .unwrap();

        assert!(VideoFeatures::load(&manifest_path).is_err());
    }
}
