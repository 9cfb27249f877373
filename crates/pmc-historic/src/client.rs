use crate::{HistoricError, PageQuery, TaskSource};
use async_trait::async_trait;
use pmc_core::historic_contracts::Folder;
use serde_json::Value;
use std::time::Duration;

// The full-year pagination is the heaviest call this system makes;
// folder lookups are small and stable.
const PAGE_TIMEOUT: Duration = Duration::from_secs(25);
const FOLDERS_TIMEOUT: Duration = Duration::from_secs(10);
const TASK_FIELDS: &str = "folder,priority,added,repeat";

/// `TaskSource` over the real task API. The access token travels as a
/// query parameter.
pub struct HttpTaskSource {
    base_url: String,
    access_token: String,
    client: reqwest::Client,
}

impl HttpTaskSource {
    pub fn new(base_url: String, access_token: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Value>, HistoricError> {
        let url = format!("{}/tasks", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("fields", TASK_FIELDS),
                ("comp", "1"),
            ])
            .query(&[("after", query.after), ("before", query.before)])
            .query(&[("start", query.start), ("num", query.num)])
            .timeout(PAGE_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(HistoricError::Status { status, body });
        }
        Ok(response.json::<Vec<Value>>().await?)
    }

    async fn fetch_folders(&self) -> Result<Vec<Folder>, HistoricError> {
        let url = format!("{}/folders", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("access_token", self.access_token.as_str())])
            .timeout(FOLDERS_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(HistoricError::Status { status, body });
        }
        Ok(response.json::<Vec<Folder>>().await?)
    }
}
