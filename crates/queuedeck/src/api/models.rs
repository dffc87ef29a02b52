use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQueuesQuery {
    pub group_id: String,
}

#[derive(Debug, Deserialize)]
pub struct QueueIdsRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub state: String,
    pub page: Option<u64>,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobIdsRequest {
    pub job_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddJobRequest {
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddJobResponse {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetryAllResponse {
    pub retried: u64,
}
