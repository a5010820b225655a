use crate::{
    config::{ModelConfig, Validatable},
    model_service::{InferenceError, ModelService},
};
use ndarray::{ArrayView, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrtServiceError {
    #[error("Invalid model configuration: {0}")]
    Config(String),
    #[error("Failed to create ONNX session: {0}")]
    Session(#[from] ort::Error),
    #[error("Model declares no outputs")]
    NoOutputs,
}

/// Round-robin pool of ONNX Runtime sessions over one model file.
#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
    num_classes: Option<usize>,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, OrtServiceError> {
        model_config.validate().map_err(OrtServiceError::Config)?;

        let num_instances = model_config.num_instances.max(1);
        let intra_threads = model_config.intra_threads_per_session();
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .with_intra_threads(intra_threads)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        let (output_name, num_classes) = {
            let session = sessions[0]
                .lock()
                .map_err(|e| OrtServiceError::Config(e.to_string()))?;
            let output = session.outputs.first().ok_or(OrtServiceError::NoOutputs)?;
            let num_classes = output
                .output_type
                .tensor_shape()
                .and_then(|shape| shape.last().copied())
                .and_then(static_dimension);
            (output.name.clone(), num_classes)
        };

        tracing::info!(
            "Created {} ONNX sessions ({} intra-op threads each) from {:?}, reading output {:?}",
            num_instances,
            intra_threads,
            model_config.get_path(),
            output_name
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name,
            num_classes,
        })
    }
}

/// ONNX marks symbolic dimensions with -1.
fn static_dimension(dim: i64) -> Option<usize> {
    usize::try_from(dim).ok().filter(|&d| d > 0)
}

impl ModelService for OrtModelService {
    fn forward(&self, input: ArrayView<'_, f32, Ix4>) -> Result<Vec<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| InferenceError::SessionPoisoned(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| InferenceError::Runtime(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let (_shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Runtime(format!("failed to extract tensor: {}", e)))?;

        Ok(data.to_vec())
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }
}
