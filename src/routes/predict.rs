use crate::{
    instructions::instructions_for,
    model_service::{classify, InferenceError},
    preprocess::{transform_image, PreprocessError},
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const IMAGE_FIELD: &str = "image";
const ROUTE: &str = "/predict";

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("No image file uploaded.")]
    MissingImage,
    #[error("Failed to read uploaded file: {0}")]
    Upload(String),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error("Preprocessing task failed: {0}")]
    PreprocessTask(String),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl PredictError {
    fn kind(&self) -> &'static str {
        match self {
            PredictError::MissingImage => "missing_image",
            PredictError::Upload(_) => "upload",
            PredictError::Preprocess(_) | PredictError::PreprocessTask(_) => "decode",
            PredictError::Inference(InferenceError::ModelNotLoaded) => "model_not_loaded",
            PredictError::Inference(_) => "inference",
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        match self {
            PredictError::MissingImage => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "An error occurred during prediction.",
                    "details": self.to_string(),
                })),
            )
                .into_response(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Prediction {
    pub disease: String,
    pub instructions: Vec<String>,
}

#[instrument(skip(state, multipart))]
pub async fn predict_image(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, PredictError> {
    state.metrics.record_request(ROUTE);
    let start = Instant::now();

    let result = run_prediction(&state, multipart).await;

    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, ROUTE);
    match &result {
        Ok(prediction) => state.metrics.record_prediction(&prediction.disease),
        Err(e) => {
            tracing::error!("Error during prediction: {}", e);
            state.metrics.record_error(e.kind());
        }
    }

    result.map(Json)
}

async fn run_prediction(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Prediction, PredictError> {
    let image_data = read_image_field(multipart).await?;
    tracing::debug!("Received image of {} bytes", image_data.len());

    let input = tokio::task::spawn_blocking(move || transform_image(&image_data))
        .await
        .map_err(|e| PredictError::PreprocessTask(e.to_string()))??;

    let model = state.model_store.model()?;
    let index = tokio::task::spawn_blocking(move || classify(model.as_ref(), input.view()))
        .await
        .map_err(|e| InferenceError::Join(e.to_string()))??;

    let disease = state.model_store.label_for(index).to_string();
    let instructions = instructions_for(&disease)
        .iter()
        .map(|step| step.to_string())
        .collect();
    tracing::info!(class_index = index, disease = %disease, "Prediction complete");

    Ok(Prediction {
        disease,
        instructions,
    })
}

/// Bytes of the first file part named `image`. Parts without a filename are
/// plain form values and do not count as an upload.
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Bytes, PredictError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Request is not a multipart upload: {}", e);
        PredictError::MissingImage
    })?;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(PredictError::MissingImage),
            Err(e) => {
                tracing::debug!("Malformed multipart body: {}", e);
                return Err(PredictError::MissingImage);
            }
        };

        if field.name() == Some(IMAGE_FIELD) && field.file_name().is_some() {
            return field
                .bytes()
                .await
                .map_err(|e| PredictError::Upload(e.to_string()));
        }
    }
}
