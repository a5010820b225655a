use ndarray::{ArrayView, Ix4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model is not loaded")]
    ModelNotLoaded,
    #[error("Model returned an empty output")]
    EmptyOutput,
    #[error("Model returned no finite scores")]
    NonFiniteOutput,
    #[error("Session mutex poisoned: {0}")]
    SessionPoisoned(String),
    #[error("Inference failed: {0}")]
    Runtime(String),
    #[error("Inference task failed: {0}")]
    Join(String),
}

/// A loaded classifier. Implementations are shared across request tasks and
/// called from the blocking pool.
pub trait ModelService: Send + Sync + 'static {
    /// Runs a forward pass and returns one score per class.
    fn forward(&self, input: ArrayView<'_, f32, Ix4>) -> Result<Vec<f32>, InferenceError>;

    /// Length of the score vector when the model declares it statically.
    fn num_classes(&self) -> Option<usize> {
        None
    }
}

/// Index of the highest score; ties resolve to the lowest index and NaN scores
/// never win.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (index, &value)| match best {
            _ if value.is_nan() => best,
            Some((_, best_value)) if value <= best_value => best,
            _ => Some((index, value)),
        })
        .map(|(index, _)| index)
}

/// Forward pass followed by argmax.
pub fn classify<M: ModelService + ?Sized>(
    model: &M,
    input: ArrayView<'_, f32, Ix4>,
) -> Result<usize, InferenceError> {
    let scores = model.forward(input)?;
    if scores.is_empty() {
        return Err(InferenceError::EmptyOutput);
    }
    argmax(&scores).ok_or(InferenceError::NonFiniteOutput)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    struct FixedScores(Vec<f32>);

    impl ModelService for FixedScores {
        fn forward(&self, _input: ArrayView<'_, f32, Ix4>) -> Result<Vec<f32>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.9]), Some(0));
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_ties_pick_lowest_index() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4, 0.0]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
    }

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(&[f32::NAN, 0.1, 0.3]), Some(2));
        assert_eq!(argmax(&[f32::NAN]), None);
    }

    #[test]
    fn test_classify() {
        let input = Array4::<f32>::zeros((1, 224, 224, 3));

        let model = FixedScores(vec![0.05, 0.05, 0.8, 0.1]);
        assert_eq!(classify(&model, input.view()).unwrap(), 2);

        let empty = FixedScores(vec![]);
        assert!(matches!(
            classify(&empty, input.view()),
            Err(InferenceError::EmptyOutput)
        ));
    }

    #[test]
    fn test_classify_all_nan_is_not_empty() {
        let input = Array4::<f32>::zeros((1, 224, 224, 3));

        let model = FixedScores(vec![f32::NAN, f32::NAN]);
        let err = classify(&model, input.view()).unwrap_err();
        assert!(matches!(err, InferenceError::NonFiniteOutput));
        assert_eq!(err.to_string(), "Model returned no finite scores");

        let mixed = FixedScores(vec![f32::NAN, 0.5]);
        assert_eq!(classify(&mixed, input.view()).unwrap(), 1);
    }
}
