use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Locates a detection model on disk together with its class names.
///
/// `labels[i]` names class `i` of the model output. Classes past the end of
/// the list are reported as `class<i>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    pub path: PathBuf,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl ModelRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn label_for(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{class_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_for_known_and_unknown_class() {
        let model = ModelRef::new("m.onnx").with_labels(["person", "car"]);
        assert_eq!(model.label_for(1), "car");
        assert_eq!(model.label_for(7), "class7");
    }

    #[test]
    fn test_deserialize_without_labels() {
        let model: ModelRef = serde_json::from_str(r#"{ "path": "models/farm.onnx" }"#).unwrap();
        assert_eq!(model, ModelRef::new("models/farm.onnx"));
    }
}
