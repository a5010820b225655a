use crate::{
    config::{LabelsConfig, ModelConfig, Validatable},
    instructions::missing_instructions,
    model_service::{InferenceError, ModelService},
    ort_service::{OrtModelService, OrtServiceError},
};
use serde::Serialize;
use std::{collections::HashMap, fs, path::Path, sync::Arc};
use thiserror::Error;

pub const UNKNOWN_DISEASE: &str = "Unknown Disease";

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("Failed to read labels file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse labels file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Index {index} is assigned to both {first:?} and {second:?}")]
    DuplicateIndex {
        index: usize,
        first: String,
        second: String,
    },
    #[error("Class indices are not contiguous: index {0} is missing")]
    MissingIndex(usize),
}

/// Class index to label, inverted from the label to index table written at
/// training time.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    labels: Vec<String>,
}

impl LabelIndex {
    pub fn from_class_indices(class_indices: HashMap<String, usize>) -> Result<Self, LabelsError> {
        let mut by_index: HashMap<usize, String> = HashMap::with_capacity(class_indices.len());
        for (label, index) in class_indices {
            let label = label.trim().to_string();
            if let Some(first) = by_index.insert(index, label.clone()) {
                let (first, second) = if first <= label {
                    (first, label)
                } else {
                    (label, first)
                };
                return Err(LabelsError::DuplicateIndex {
                    index,
                    first,
                    second,
                });
            }
        }

        let labels = (0..by_index.len())
            .map(|index| by_index.remove(&index).ok_or(LabelsError::MissingIndex(index)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

pub fn load_class_indices(path: &Path) -> Result<LabelIndex, LabelsError> {
    let content = fs::read_to_string(path)?;
    let class_indices: HashMap<String, usize> = serde_json::from_str(&content)?;
    LabelIndex::from_class_indices(class_indices)
}

#[derive(Error, Debug)]
pub enum ModelStoreError {
    #[error("Failed to load model: {0}")]
    Model(#[from] OrtServiceError),
    #[error("Invalid labels configuration: {0}")]
    LabelsConfig(String),
    #[error("Failed to load class indices: {0}")]
    Labels(#[from] LabelsError),
    #[error("Model outputs {model} classes but class indices list {labels}")]
    ClassCountMismatch { model: usize, labels: usize },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Readiness {
    pub ready: bool,
    pub model_loaded: bool,
    pub labels_loaded: bool,
    pub num_labels: usize,
    pub labels_without_instructions: Vec<String>,
    pub errors: Vec<String>,
}

/// Model and label table, built once at startup and read-only afterwards.
///
/// Either half may be missing when its file failed to load. The store still
/// builds so the process can answer health probes.
#[derive(Clone)]
pub struct ModelStore {
    model: Option<Arc<dyn ModelService>>,
    labels: LabelIndex,
    labels_loaded: bool,
    errors: Vec<String>,
}

impl ModelStore {
    pub fn new(
        model: Result<Arc<dyn ModelService>, ModelStoreError>,
        labels: Result<LabelIndex, ModelStoreError>,
    ) -> Self {
        let mut errors: Vec<ModelStoreError> = Vec::new();

        let model = match model {
            Ok(model) => {
                tracing::info!("Model loaded successfully");
                Some(model)
            }
            Err(e) => {
                tracing::error!("Error loading model: {}", e);
                errors.push(e);
                None
            }
        };

        let (labels, labels_loaded) = match labels {
            Ok(labels) => {
                tracing::info!("Class indices loaded successfully ({} classes)", labels.len());
                (labels, true)
            }
            Err(e) => {
                tracing::error!("Error loading class indices: {}", e);
                errors.push(e);
                (LabelIndex::default(), false)
            }
        };

        if labels_loaded && labels.is_empty() {
            tracing::warn!("Class indices file contains no labels");
        }
        if let (Some(model), true) = (&model, labels_loaded) {
            match model.num_classes() {
                Some(classes) if classes != labels.len() => {
                    let e = ModelStoreError::ClassCountMismatch {
                        model: classes,
                        labels: labels.len(),
                    };
                    tracing::error!("{}", e);
                    errors.push(e);
                }
                Some(_) => {}
                None => tracing::warn!("Model output size is dynamic, class count not checked"),
            }
        }
        for label in missing_instructions(labels.iter()) {
            tracing::warn!("No first-aid instructions for trained label {:?}", label);
        }

        Self {
            model,
            labels,
            labels_loaded,
            errors: errors.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn load(model_config: &ModelConfig, labels_config: &LabelsConfig) -> Self {
        let model = OrtModelService::new(model_config)
            .map(|service| Arc::new(service) as Arc<dyn ModelService>)
            .map_err(ModelStoreError::from);

        let labels = labels_config
            .validate()
            .map_err(ModelStoreError::LabelsConfig)
            .and_then(|_| Ok(load_class_indices(&labels_config.get_path())?));

        Self::new(model, labels)
    }

    pub fn model(&self) -> Result<Arc<dyn ModelService>, InferenceError> {
        self.model.clone().ok_or(InferenceError::ModelNotLoaded)
    }

    /// Trimmed label for `index`, or `Unknown Disease`.
    pub fn label_for(&self, index: usize) -> &str {
        self.labels.get(index).unwrap_or(UNKNOWN_DISEASE).trim()
    }

    pub fn readiness(&self) -> Readiness {
        let model_loaded = self.model.is_some();
        Readiness {
            ready: model_loaded && self.labels_loaded && self.errors.is_empty(),
            model_loaded,
            labels_loaded: self.labels_loaded,
            num_labels: self.labels.len(),
            labels_without_instructions: missing_instructions(self.labels.iter()),
            errors: self.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn class_indices(entries: &[(&str, usize)]) -> HashMap<String, usize> {
        entries
            .iter()
            .map(|(label, index)| (label.to_string(), *index))
            .collect()
    }

    #[test]
    fn test_invert_class_indices() {
        let labels = LabelIndex::from_class_indices(class_indices(&[
            ("VI-shingles ", 2),
            (" BA-cellulitis", 0),
            ("FU-ringworm", 1),
        ]))
        .unwrap();

        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get(0), Some("BA-cellulitis"));
        assert_eq!(labels.get(1), Some("FU-ringworm"));
        assert_eq!(labels.get(2), Some("VI-shingles"));
        assert_eq!(labels.get(3), None);
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let result =
            LabelIndex::from_class_indices(class_indices(&[("FU-ringworm", 0), ("VI-shingles", 0)]));
        match result {
            Err(LabelsError::DuplicateIndex { index, first, second }) => {
                assert_eq!(index, 0);
                assert_eq!(first, "FU-ringworm");
                assert_eq!(second, "VI-shingles");
            }
            other => panic!("expected duplicate index error, got {:?}", other),
        }
    }

    #[test]
    fn test_gap_in_indices_rejected() {
        let result =
            LabelIndex::from_class_indices(class_indices(&[("FU-ringworm", 0), ("VI-shingles", 2)]));
        assert!(matches!(result, Err(LabelsError::MissingIndex(1))));
    }

    #[test]
    fn test_load_class_indices_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class_indices.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{"BA-impetigo": 1, "BA-cellulitis": 0}}"#).unwrap();

        let labels = load_class_indices(&path).unwrap();
        assert_eq!(labels.iter().collect::<Vec<_>>(), ["BA-cellulitis", "BA-impetigo"]);

        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_class_indices(&path), Err(LabelsError::Parse(_))));

        let missing = dir.path().join("missing.json");
        assert!(matches!(load_class_indices(&missing), Err(LabelsError::Io(_))));
    }

    #[test]
    fn test_store_degrades_when_files_missing() {
        let dir = tempfile::tempdir().unwrap();
        let model_config = ModelConfig {
            model_dir: dir.path().to_path_buf(),
            onnx_file: "missing.onnx".into(),
            num_instances: 1,
            intra_threads: None,
        };
        let labels_config = LabelsConfig {
            labels_dir: dir.path().to_path_buf(),
            labels_file: "missing.json".into(),
        };

        let store = ModelStore::load(&model_config, &labels_config);

        assert!(matches!(store.model(), Err(InferenceError::ModelNotLoaded)));
        assert_eq!(store.label_for(0), UNKNOWN_DISEASE);

        let readiness = store.readiness();
        assert!(!readiness.ready);
        assert!(!readiness.model_loaded);
        assert!(!readiness.labels_loaded);
        assert_eq!(readiness.num_labels, 0);
        assert_eq!(readiness.errors.len(), 2);
    }

    #[test]
    fn test_readiness_reports_labels_without_instructions() {
        let labels =
            LabelIndex::from_class_indices(class_indices(&[("FU-ringworm", 0), ("AC-acne", 1)]))
                .unwrap();
        let no_model = ModelStoreError::Model(OrtServiceError::Config("no model".into()));
        let store = ModelStore::new(Err(no_model), Ok(labels));

        let readiness = store.readiness();
        assert!(!readiness.ready);
        assert!(readiness.labels_loaded);
        assert_eq!(readiness.num_labels, 2);
        assert_eq!(readiness.labels_without_instructions, vec!["AC-acne".to_string()]);
        assert_eq!(
            readiness.errors,
            vec!["Failed to load model: Invalid model configuration: no model".to_string()]
        );
        assert_eq!(store.label_for(1), "AC-acne");
        assert_eq!(store.label_for(7), UNKNOWN_DISEASE);
    }

    struct DeclaredClasses(Option<usize>);

    impl ModelService for DeclaredClasses {
        fn forward(
            &self,
            _input: ndarray::ArrayView<'_, f32, ndarray::Ix4>,
        ) -> Result<Vec<f32>, InferenceError> {
            Ok(vec![0.0; self.0.unwrap_or(2)])
        }

        fn num_classes(&self) -> Option<usize> {
            self.0
        }
    }

    fn two_labels() -> LabelIndex {
        LabelIndex::from_class_indices(class_indices(&[("FU-ringworm", 0), ("VI-shingles", 1)]))
            .unwrap()
    }

    #[test]
    fn test_class_count_mismatch_is_not_ready() {
        let store = ModelStore::new(Ok(Arc::new(DeclaredClasses(Some(5)))), Ok(two_labels()));

        let readiness = store.readiness();
        assert!(!readiness.ready);
        assert!(readiness.model_loaded);
        assert!(readiness.labels_loaded);
        assert_eq!(
            readiness.errors,
            vec!["Model outputs 5 classes but class indices list 2".to_string()]
        );
        assert!(store.model().is_ok());
        assert_eq!(store.label_for(4), UNKNOWN_DISEASE);
    }

    #[test]
    fn test_matching_or_dynamic_class_count_is_ready() {
        let store = ModelStore::new(Ok(Arc::new(DeclaredClasses(Some(2)))), Ok(two_labels()));
        assert!(store.readiness().ready);

        let store = ModelStore::new(Ok(Arc::new(DeclaredClasses(None))), Ok(two_labels()));
        assert!(store.readiness().ready);
    }
}
