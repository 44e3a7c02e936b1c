//! Batch inference boundary: metadata query and batch inference call.
//!
//! The service starts uninitialized; `load` builds the forecaster. Requests
//! carry exactly three equal-length series in metadata order, with `null`
//! marking a missing sample. Responses carry the five output series, one
//! value per input tick.

use chrono::{DateTime, Utc};
use kestrel_core::config::Config;
use kestrel_core::error::KestrelError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::features::{self, FeatureAdapter};
use crate::metadata::{ModelMetadata, TensorMetadata, FP64};
use crate::signal::OUTPUT_NAMES;
use crate::CpuForecaster;

const EXPECTED_INPUTS: usize = 3;

/// One named input series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInput {
    pub name: String,
    #[serde(default)]
    pub data: Vec<Option<f64>>,
}

impl RequestInput {
    pub fn new(name: &str, data: &[f64]) -> Self {
        Self {
            name: name.to_string(),
            data: data.iter().map(|&v| Some(v)).collect(),
        }
    }

    /// Samples with gaps as NaN.
    fn values(&self) -> Vec<f64> {
        self.data.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub inputs: Vec<RequestInput>,
}

/// One named output series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseOutput {
    pub name: String,
    pub datatype: String,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub id: String,
    pub model_name: String,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
    pub outputs: Vec<ResponseOutput>,
}

impl InferenceResponse {
    /// Output series by name.
    pub fn output(&self, name: &str) -> Option<&[f64]> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.data.as_slice())
    }
}

/// Serving-side owner of one estimator.
pub struct InferenceService {
    config: Config,
    adapter: Box<dyn FeatureAdapter>,
    forecaster: Option<CpuForecaster>,
}

impl InferenceService {
    pub fn new(config: Config) -> Self {
        let adapter = features::from_config(&config.features);
        Self {
            config,
            adapter,
            forecaster: None,
        }
    }

    /// Build and initialize the estimator. Loading again starts over.
    pub fn load(&mut self) -> Result<(), KestrelError> {
        self.forecaster = Some(CpuForecaster::new(&self.config)?);
        info!(
            "model {} {} loaded | features: {}",
            self.config.service.name,
            self.config.service.version,
            self.adapter.name()
        );
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.forecaster.is_some()
    }

    pub fn forecaster(&self) -> Option<&CpuForecaster> {
        self.forecaster.as_ref()
    }

    pub fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: self.config.service.name.clone(),
            versions: vec![self.config.service.version.clone()],
            platform: "rust".to_string(),
            inputs: self
                .adapter
                .input_names()
                .iter()
                .map(|n| TensorMetadata::fp64_series(n))
                .collect(),
            outputs: OUTPUT_NAMES
                .iter()
                .map(|n| TensorMetadata::fp64_series(n))
                .collect(),
        }
    }

    /// Run every tick of the request through the estimator, in order.
    pub fn infer(&mut self, request: &InferenceRequest) -> Result<InferenceResponse, KestrelError> {
        let forecaster = self
            .forecaster
            .as_mut()
            .ok_or(KestrelError::UninitializedEstimator)?;

        let [a, b, c] = match request.inputs.as_slice() {
            [a, b, c] => [a, b, c],
            other => {
                return Err(KestrelError::InputArity {
                    expected: EXPECTED_INPUTS,
                    got: other.len(),
                })
            }
        };
        let n = a.data.len();
        if b.data.len() != n || c.data.len() != n {
            return Err(KestrelError::InputShape(format!(
                "input lengths differ: {} / {} / {}",
                n,
                b.data.len(),
                c.data.len()
            )));
        }

        let expected = self.adapter.input_names();
        for (input, name) in [a, b, c].iter().zip(expected) {
            if input.name != name {
                debug!("input '{}' in the slot of '{name}', using position", input.name);
            }
        }

        let batch = self.adapter.adapt([a.values(), b.values(), c.values()]);
        let series = forecaster.process_batch(batch)?;

        let outputs = OUTPUT_NAMES
            .iter()
            .zip(series.into_columns())
            .map(|(name, data)| ResponseOutput {
                name: name.to_string(),
                datatype: FP64.to_string(),
                shape: vec![data.len()],
                data,
            })
            .collect();

        Ok(InferenceResponse {
            id: request
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            model_name: self.config.service.name.clone(),
            model_version: self.config.service.version.clone(),
            generated_at: Utc::now(),
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::config::FeatureMode;

    fn loaded(mode: FeatureMode) -> InferenceService {
        let mut config = Config::default();
        config.features.mode = mode;
        let mut service = InferenceService::new(config);
        service.load().unwrap();
        service
    }

    fn request(n: usize) -> InferenceRequest {
        InferenceRequest {
            id: Some("req-1".into()),
            inputs: vec![
                RequestInput::new("memory_utilization", &vec![0.6; n]),
                RequestInput::new("load_average_15m", &vec![2.0; n]),
                RequestInput::new("load_average_1m", &vec![3.2; n]),
            ],
        }
    }

    #[test]
    fn test_metadata_lists_inputs_and_outputs() {
        let service = InferenceService::new(Config::default());
        let meta = service.metadata();
        assert_eq!(meta.name, "kalman-filter");
        assert_eq!(meta.versions, vec!["v1".to_string()]);
        let inputs: Vec<&str> = meta.inputs.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            inputs,
            ["memory_utilization", "load_average_15m", "load_average_1m"]
        );
        let outputs: Vec<&str> = meta.outputs.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(outputs, OUTPUT_NAMES);
        assert!(meta
            .outputs
            .iter()
            .all(|t| t.datatype == "FP64" && t.shape == vec![-1]));
    }

    #[test]
    fn test_metadata_follows_direct_adapter() {
        let service = loaded(FeatureMode::Direct);
        assert_eq!(service.metadata().inputs[0].name, "cpu_utilization");
    }

    #[test]
    fn test_infer_before_load_fails() {
        let mut service = InferenceService::new(Config::default());
        assert!(!service.is_loaded());
        assert!(matches!(
            service.infer(&request(3)),
            Err(KestrelError::UninitializedEstimator)
        ));
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let mut config = Config::default();
        config.adaptation.window_capacity = 0;
        let mut service = InferenceService::new(config);
        assert!(matches!(service.load(), Err(KestrelError::Configuration(_))));
        assert!(!service.is_loaded());
    }

    #[test]
    fn test_infer_rejects_wrong_arity() {
        let mut service = loaded(FeatureMode::LoadDerived);
        let mut req = request(3);
        req.inputs.pop();
        match service.infer(&req) {
            Err(KestrelError::InputArity { expected, got }) => {
                assert_eq!(expected, 3);
                assert_eq!(got, 2);
            }
            other => panic!("expected InputArity, got {other:?}"),
        }
    }

    #[test]
    fn test_infer_rejects_ragged_inputs() {
        let mut service = loaded(FeatureMode::LoadDerived);
        let mut req = request(3);
        req.inputs[2].data.pop();
        assert!(matches!(
            service.infer(&req),
            Err(KestrelError::InputShape(_))
        ));
    }

    #[test]
    fn test_infer_returns_one_value_per_tick() {
        let mut service = loaded(FeatureMode::LoadDerived);
        let response = service.infer(&request(12)).unwrap();
        assert_eq!(response.id, "req-1");
        assert_eq!(response.model_name, "kalman-filter");
        assert_eq!(response.outputs.len(), 5);
        for (output, name) in response.outputs.iter().zip(OUTPUT_NAMES) {
            assert_eq!(output.name, name);
            assert_eq!(output.data.len(), 12);
            assert_eq!(output.shape, vec![12]);
        }
        let cpu = response.output("cpu_prediction").unwrap();
        assert!(cpu.iter().all(|v| (0.0..=1.0).contains(v)));
        let conf = response.output("model_confidence").unwrap();
        assert!(conf.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_infer_handles_missing_samples() {
        let mut service = loaded(FeatureMode::LoadDerived);
        let mut req = request(20);
        req.inputs[0].data[5] = None;
        req.inputs[2].data[0] = None;
        let response = service.infer(&req).unwrap();
        for output in &response.outputs {
            assert!(output.data.iter().all(|v| v.is_finite()), "{}", output.name);
        }
    }

    #[test]
    fn test_state_carries_across_requests() {
        let mut service = loaded(FeatureMode::LoadDerived);
        service.infer(&request(15)).unwrap();
        service.infer(&request(15)).unwrap();
        let forecaster = service.forecaster().unwrap();
        assert_eq!(forecaster.estimator().observation_count(), 30);
    }

    #[test]
    fn test_generated_id_when_missing() {
        let mut service = loaded(FeatureMode::LoadDerived);
        let mut req = request(1);
        req.id = None;
        let response = service.infer(&req).unwrap();
        assert!(Uuid::parse_str(&response.id).is_ok());
    }

    #[test]
    fn test_request_json_with_nulls() {
        let json = r#"{"inputs": [
            {"name": "memory_utilization", "data": [0.5, null, 0.5]},
            {"name": "load_average_15m", "data": [1.0, 1.0, 1.0]},
            {"name": "load_average_1m", "data": [2.0, 2.0, null]}
        ]}"#;
        let req: InferenceRequest = serde_json::from_str(json).unwrap();
        assert!(req.id.is_none());
        assert_eq!(req.inputs[0].data[1], None);

        let mut service = loaded(FeatureMode::LoadDerived);
        let response = service.infer(&req).unwrap();
        let encoded = serde_json::to_string(&response).unwrap();
        assert!(encoded.contains("\"prediction_variance\""));
        let decoded: InferenceResponse = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.outputs.len(), 5);
    }
}
