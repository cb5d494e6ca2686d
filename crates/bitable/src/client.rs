//! Thin REST client for the tabular backend's bitable and doc-search
//! surfaces. Implements only the interface surface CaseWire's tool
//! registry names — the backend itself is an external collaborator.

use std::sync::Arc;
use std::time::Duration;

use cw_domain::error::{Error, ErrorCode, Result};
use cw_domain::record::{Fields, Locator, Record};
use serde_json::json;

use crate::auth::TokenCache;
use crate::util::from_reqwest;
use crate::wire::{fields_to_wire, wire_to_fields};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TableInfo {
    pub table_id: String,
    pub name: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DocResult {
    pub doc_id: String,
    pub title: String,
    pub url: String,
}

pub struct BitableClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenCache>,
}

impl BitableClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenCache>, timeout_seconds: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            tokens,
        })
    }

    async fn authed(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        let token = self.tokens.get().await?;
        Ok(builder.bearer_auth(token))
    }

    async fn send_json(&self, builder: reqwest::RequestBuilder) -> Result<serde_json::Value> {
        let builder = self.authed(builder).await?;
        let resp = builder.send().await.map_err(from_reqwest)?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.map_err(from_reqwest)?;

        let code = body["code"].as_i64().unwrap_or(0);
        if !status.is_success() || code != 0 {
            let message = body["msg"].as_str().unwrap_or("upstream error").to_string();
            let error_code = match status.as_u16() {
                404 => ErrorCode::Mcp002,
                401 | 403 => ErrorCode::Mcp003,
                _ => ErrorCode::Mcp001,
            };
            return Err(Error::coded_with_detail(error_code, message, body));
        }
        Ok(body)
    }

    pub async fn list_tables(&self, app_token: &str) -> Result<Vec<TableInfo>> {
        let url = format!("{}/bitable/v1/apps/{app_token}/tables", self.base_url);
        let body = self.send_json(self.http.get(&url)).await?;
        let items = body["data"]["items"].as_array().cloned().unwrap_or_default();
        Ok(items
            .into_iter()
            .map(|item| TableInfo {
                table_id: item["table_id"].as_str().unwrap_or_default().to_string(),
                name: item["name"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    /// Generic filtered search; `filter` is passed through verbatim as
    /// the backend's query-builder payload.
    pub async fn search_with_filter(
        &self,
        app_token: &str,
        table_id: &str,
        filter: serde_json::Value,
    ) -> Result<Vec<Record>> {
        let url = format!("{}/bitable/v1/apps/{app_token}/tables/{table_id}/records/search", self.base_url);
        let body = self.send_json(self.http.post(&url).json(&json!({"filter": filter}))).await?;
        let items = body["data"]["items"].as_array().cloned().unwrap_or_default();
        Ok(items
            .into_iter()
            .map(|item| parse_record(app_token, table_id, &item))
            .collect())
    }

    pub async fn search_exact(&self, app_token: &str, table_id: &str, field: &str, value: &str) -> Result<Vec<Record>> {
        let filter = json!({"conjunction": "and", "conditions": [{"field_name": field, "operator": "is", "value": [value]}]});
        self.search_with_filter(app_token, table_id, filter).await
    }

    pub async fn search_keyword(&self, app_token: &str, table_id: &str, field: &str, keyword: &str) -> Result<Vec<Record>> {
        let filter = json!({"conjunction": "and", "conditions": [{"field_name": field, "operator": "contains", "value": [keyword]}]});
        self.search_with_filter(app_token, table_id, filter).await
    }

    pub async fn search_person(&self, app_token: &str, table_id: &str, field: &str, open_id: &str) -> Result<Vec<Record>> {
        let filter = json!({"conjunction": "and", "conditions": [{"field_name": field, "operator": "contains", "value": [open_id]}]});
        self.search_with_filter(app_token, table_id, filter).await
    }

    pub async fn search_date_range(
        &self,
        app_token: &str,
        table_id: &str,
        field: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Record>> {
        let filter = json!({
            "conjunction": "and",
            "conditions": [{"field_name": field, "operator": "isBetween", "value": [from_ms.to_string(), to_ms.to_string()]}],
        });
        self.search_with_filter(app_token, table_id, filter).await
    }

    pub async fn get_record(&self, locator: &Locator) -> Result<Record> {
        let url = format!(
            "{}/bitable/v1/apps/{}/tables/{}/records/{}",
            self.base_url, locator.app_token, locator.table_id, locator.record_id
        );
        let body = self.send_json(self.http.get(&url)).await?;
        Ok(parse_record(&locator.app_token, &locator.table_id, &body["data"]["record"]))
    }

    pub async fn create_record(&self, app_token: &str, table_id: &str, fields: &Fields) -> Result<Record> {
        let url = format!("{}/bitable/v1/apps/{app_token}/tables/{table_id}/records", self.base_url);
        let body = self
            .send_json(self.http.post(&url).json(&json!({"fields": fields_to_wire(fields)})))
            .await?;
        Ok(parse_record(app_token, table_id, &body["data"]["record"]))
    }

    pub async fn update_record(&self, locator: &Locator, fields: &Fields) -> Result<Record> {
        let url = format!(
            "{}/bitable/v1/apps/{}/tables/{}/records/{}",
            self.base_url, locator.app_token, locator.table_id, locator.record_id
        );
        let body = self
            .send_json(self.http.put(&url).json(&json!({"fields": fields_to_wire(fields)})))
            .await?;
        Ok(parse_record(&locator.app_token, &locator.table_id, &body["data"]["record"]))
    }

    pub async fn delete_record(&self, locator: &Locator) -> Result<()> {
        let url = format!(
            "{}/bitable/v1/apps/{}/tables/{}/records/{}",
            self.base_url, locator.app_token, locator.table_id, locator.record_id
        );
        self.send_json(self.http.delete(&url)).await?;
        Ok(())
    }

    /// Creates a calendar event on the primary calendar. `start_ms`/
    /// `end_ms` are epoch-ms UTC.
    pub async fn create_calendar_event(&self, title: &str, start_ms: i64, end_ms: i64) -> Result<String> {
        let url = format!("{}/calendar/v4/calendars/primary/events", self.base_url);
        let body = self
            .send_json(self.http.post(&url).json(&json!({
                "summary": title,
                "start_time": {"timestamp": (start_ms / 1000).to_string()},
                "end_time": {"timestamp": (end_ms / 1000).to_string()},
            })))
            .await?;
        Ok(body["data"]["event"]["event_id"].as_str().unwrap_or_default().to_string())
    }

    pub async fn doc_search(&self, query: &str) -> Result<Vec<DocResult>> {
        let url = format!("{}/suite/docs-api/search/object", self.base_url);
        let body = self.send_json(self.http.post(&url).json(&json!({"search_key": query}))).await?;
        let items = body["data"]["docs_entities"].as_array().cloned().unwrap_or_default();
        Ok(items
            .into_iter()
            .map(|item| DocResult {
                doc_id: item["docs_token"].as_str().unwrap_or_default().to_string(),
                title: item["title"].as_str().unwrap_or_default().to_string(),
                url: item["url"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }
}

fn parse_record(app_token: &str, table_id: &str, raw: &serde_json::Value) -> Record {
    let record_id = raw["record_id"].as_str().unwrap_or_default().to_string();
    let fields = wire_to_fields(&raw["fields"]);
    Record {
        locator: Locator::new(app_token, table_id, record_id),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_record_extracts_id_and_fields() {
        let raw = json!({"record_id": "rec1", "fields": {"name": "a"}});
        let record = parse_record("app1", "tbl1", &raw);
        assert_eq!(record.locator.record_id, "rec1");
        assert!(record.fields.contains_key("name"));
    }
}
