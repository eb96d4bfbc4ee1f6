//! Operation selectors and their per-item parameters.
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::host::NodeParameters;

pub const DEFAULT_MODEL_TYPE: &str = "checkpoints";

/// Model folders offered for `getModelsByType`. Any other key is accepted and
/// simply filters to nothing when the server does not know it.
pub const KNOWN_MODEL_TYPES: &[&str] = &[
    "checkpoints",
    "vae",
    "loras",
    "controlnet",
    "clip",
    "clip_vision",
    "diffusers",
    "regularization",
    "upscale_models",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCategory {
    Queue,
    Models,
}

impl FromStr for OperationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue" => Ok(OperationCategory::Queue),
            "models" => Ok(OperationCategory::Models),
            other => Err(format!("unknown operation category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOperation {
    GetRecentHistory,
    GetQueueStatus,
    ClearQueue,
    InterruptExecution,
    ClearHistory,
    DeleteHistoryItem { prompt_id: String },
    GetSystemInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelsOperation {
    GetAllModels,
    GetModelsByType { model_type: String },
    GetSamplers,
    GetSchedulers,
    GetExtensions,
    GetEmbeddings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Queue(QueueOperation),
    Models(ModelsOperation),
}

impl Operation {
    pub fn category(&self) -> OperationCategory {
        match self {
            Operation::Queue(_) => OperationCategory::Queue,
            Operation::Models(_) => OperationCategory::Models,
        }
    }

    /// Decode the selected operation for input item `item`.
    pub fn from_parameters(params: &dyn NodeParameters, item: usize) -> AppResult<Self> {
        let category = params.string("operationCategory", item, "queue")?;
        let category = category
            .parse::<OperationCategory>()
            .map_err(|reason| AppError::parameter("operationCategory", reason))?;

        match category {
            OperationCategory::Queue => {
                let name = params.string("queueOperation", item, "getQueueStatus")?;
                let op = match name.as_str() {
                    "getRecentHistory" => QueueOperation::GetRecentHistory,
                    "getQueueStatus" => QueueOperation::GetQueueStatus,
                    "clearQueue" => QueueOperation::ClearQueue,
                    "interruptExecution" => QueueOperation::InterruptExecution,
                    "clearHistory" => QueueOperation::ClearHistory,
                    "deleteHistoryItem" => QueueOperation::DeleteHistoryItem {
                        prompt_id: params.required_string("promptId", item)?,
                    },
                    "getSystemInfo" => QueueOperation::GetSystemInfo,
                    other => {
                        return Err(AppError::parameter(
                            "queueOperation",
                            format!("unknown queue operation '{}'", other),
                        ))
                    }
                };
                Ok(Operation::Queue(op))
            }
            OperationCategory::Models => {
                let name = params.string("modelsOperation", item, "getAllModels")?;
                let op = match name.as_str() {
                    "getAllModels" => ModelsOperation::GetAllModels,
                    "getModelsByType" => {
                        let model_type = params.string("modelType", item, DEFAULT_MODEL_TYPE)?;
                        let model_type = match model_type.trim() {
                            "" => DEFAULT_MODEL_TYPE.to_string(),
                            t => t.to_string(),
                        };
                        ModelsOperation::GetModelsByType { model_type }
                    }
                    "getSamplers" => ModelsOperation::GetSamplers,
                    "getSchedulers" => ModelsOperation::GetSchedulers,
                    "getExtensions" => ModelsOperation::GetExtensions,
                    "getEmbeddings" => ModelsOperation::GetEmbeddings,
                    other => {
                        return Err(AppError::parameter(
                            "modelsOperation",
                            format!("unknown models operation '{}'", other),
                        ))
                    }
                };
                Ok(Operation::Models(op))
            }
        }
    }
}
