//! ONNX Runtime classifier
//!
//! Runs an exported image classification model (ultralytics `*-cls`
//! export or any model with a `[1, 3, S, S]` float input and a
//! `[1, num_classes]` output). Class labels come from the model's `names`
//! metadata unless a label table is supplied.

use std::path::Path;
use std::sync::Arc;

use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;
use ort::session::{RunOptions, Session, builder::GraphOptimizationLevel};
use ort::value::Value;
use parking_lot::Mutex;

use super::labels::select_labels;
use super::{lock_unless_cancelled, Cancellation, Classifier, InferenceError, LabelTable, Top1};

/// Custom metadata key holding the class names in ultralytics exports
const NAMES_METADATA_KEY: &str = "names";

/// Tolerance when deciding whether scores already form a distribution
const PROBABILITY_EPSILON: f32 = 1e-3;

pub struct OnnxClassifier {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    labels: LabelTable,
    image_size: u32,
    name: String,
}

impl OnnxClassifier {
    /// Load the model once at startup. `labels` overrides the class names
    /// embedded in the model.
    pub fn load(model_path: &Path, labels: Option<LabelTable>, image_size: u32) -> Result<Self, InferenceError> {
        tracing::info!("Loading ONNX model from: {}", model_path.display());

        if !model_path.exists() {
            return Err(InferenceError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()
            .map_err(|e| InferenceError::Load(format!("session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferenceError::Load(format!("optimization level: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| InferenceError::Load(e.to_string()))?;

        let embedded = if labels.is_some() { None } else { embedded_names(&session)? };
        let labels = select_labels(labels, embedded.as_deref())?;

        tracing::info!(
            "ONNX model loaded ({} labels, {}x{} input)",
            labels.len(),
            image_size,
            image_size
        );

        Ok(Self {
            session: Mutex::new(session),
            labels,
            image_size,
            name: model_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| model_path.display().to_string()),
        })
    }

    fn run(&self, input: Array4<f32>, cancel: &Cancellation) -> Result<Vec<f32>, InferenceError> {
        let mut session = lock_unless_cancelled(&self.session, cancel)?;

        let output_name = session.outputs.first()
            .map(|o| o.name.clone())
            .ok_or_else(|| InferenceError::Runtime("model defines no output".to_string()))?;

        let input_tensor = Value::from_array(input)
            .map_err(|e| InferenceError::Runtime(format!("tensor error: {}", e)))?;

        let run_options = Arc::new(RunOptions::new()
            .map_err(|e| InferenceError::Runtime(format!("run options: {}", e)))?);
        let terminate = run_options.clone();
        cancel.on_cancel(move || {
            if let Err(e) = terminate.terminate() {
                tracing::warn!("Failed to terminate inference run: {}", e);
            }
        });

        let outputs = session.run_with_options(ort::inputs![input_tensor], &run_options);
        cancel.clear();
        let outputs = outputs.map_err(|e| {
            if cancel.is_cancelled() {
                InferenceError::Cancelled
            } else {
                InferenceError::Runtime(e.to_string())
            }
        })?;

        let output = outputs.get(&output_name)
            .ok_or_else(|| InferenceError::Runtime("no output".to_string()))?;

        let (_, data) = output.try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Runtime(format!("extract error: {}", e)))?;

        Ok(data.to_vec())
    }
}

impl Classifier for OnnxClassifier {
    fn top1(&self, image: &Path, cancel: &Cancellation) -> Result<Option<Top1>, InferenceError> {
        let decoded = image::ImageReader::open(image)
            .map_err(|e| InferenceError::Decode(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| InferenceError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| InferenceError::Decode(e.to_string()))?;

        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }

        let input = preprocess(&decoded, self.image_size);
        let scores = self.run(input, cancel)?;

        Ok(top1_from_scores(&scores))
    }

    fn label(&self, class_index: usize) -> Option<&str> {
        self.labels.get(class_index)
    }

    fn label_count(&self) -> usize {
        self.labels.len()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Class names stored in the model's custom metadata, if any
fn embedded_names(session: &Session) -> Result<Option<String>, InferenceError> {
    let metadata = session.metadata()
        .map_err(|e| InferenceError::Load(format!("model metadata: {}", e)))?;
    metadata.custom(NAMES_METADATA_KEY)
        .map_err(|e| InferenceError::Load(format!("model metadata '{}': {}", NAMES_METADATA_KEY, e)))
}

/// Resize-to-fill (shorter side to `size`, centre crop) and lay out as
/// NCHW in [0, 1]
pub fn preprocess(image: &DynamicImage, size: u32) -> Array4<f32> {
    let rgb = image.resize_to_fill(size, size, FilterType::Triangle).to_rgb8();
    let side = size as usize;

    let mut input = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    input
}

/// Argmax over class scores. Raw logits go through softmax first.
/// Empty or non-finite output means no classification.
pub fn top1_from_scores(scores: &[f32]) -> Option<Top1> {
    if scores.is_empty() || scores.iter().any(|s| !s.is_finite()) {
        return None;
    }

    let sum: f32 = scores.iter().sum();
    let is_distribution = scores.iter().all(|s| (0.0..=1.0).contains(s))
        && (sum - 1.0).abs() <= PROBABILITY_EPSILON;

    let probabilities = if is_distribution { scores.to_vec() } else { softmax(scores) };

    probabilities
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(class_index, &p)| Top1 {
            class_index,
            confidence: p.clamp(0.0, 1.0),
        })
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_preprocess_shape_and_range() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 200, Rgb([255, 0, 51])));
        let input = preprocess(&img, 224);

        assert_eq!(input.shape(), &[1, 3, 224, 224]);
        assert!((input[[0, 0, 10, 10]] - 1.0).abs() < 0.01);
        assert!(input[[0, 1, 100, 100]].abs() < 0.01);
        assert!((input[[0, 2, 223, 223]] - 0.2).abs() < 0.01);
        assert!(input.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_top1_probabilities() {
        let top = top1_from_scores(&[0.1, 0.7, 0.2]).unwrap();
        assert_eq!(top.class_index, 1);
        assert!((top.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_top1_logits_softmaxed() {
        let top = top1_from_scores(&[1.0, 3.0, 0.5]).unwrap();
        assert_eq!(top.class_index, 1);
        assert!(top.confidence > 0.0 && top.confidence < 1.0);
        let expected = 3.0f32.exp() / (1.0f32.exp() + 3.0f32.exp() + 0.5f32.exp());
        assert!((top.confidence - expected).abs() < 1e-5);
    }

    #[test]
    fn test_top1_no_scores() {
        assert_eq!(top1_from_scores(&[]), None);
        assert_eq!(top1_from_scores(&[0.5, f32::NAN]), None);
    }

    #[test]
    fn test_load_missing_model() {
        let err = OnnxClassifier::load(Path::new("/nonexistent/best.onnx"), None, 224);
        assert!(matches!(err, Err(InferenceError::ModelNotFound(_))));
    }
}
