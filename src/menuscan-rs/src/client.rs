use crate::{ClientError, Result};
use menuscan_core::{InstallRequest, Lookup, RestaurantResponse, StatusResponse};
use reqwest::{Client as HttpClient, Response};
use serde::Serialize;

/// Query-string parameters accepted by the scan and search endpoints
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub explain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_index: Option<String>,
}

impl RestaurantQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn owner(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }

    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Ask the server to log the execution plan
    pub fn explain(mut self) -> Self {
        self.explain = true;
        self
    }

    pub fn search_index(mut self, index: impl Into<String>) -> Self {
        self.search_index = Some(index.into());
        self
    }
}

/// menuscan REST API Client
pub struct Client {
    base_url: String,
    client: HttpClient,
}

impl Client {
    /// Create a new client connected to the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: HttpClient::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Health check
    pub async fn ping(&self) -> Result<StatusResponse> {
        let url = format!("{}/ping", self.base_url);
        let response = check(self.client.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Start an install; the server answers before the install finishes
    pub async fn run_install(&self, request: &InstallRequest) -> Result<StatusResponse> {
        let url = format!("{}/run-install", self.base_url);
        let response = check(self.client.post(&url).json(request).send().await?).await?;

        let status: StatusResponse = response.json().await?;
        if status.code != 202 {
            return Err(ClientError::InvalidResponse);
        }
        Ok(status)
    }

    /// Conventional filter query under `/scan`
    pub async fn scan(&self, lookup: Lookup, query: &RestaurantQuery) -> Result<RestaurantResponse> {
        self.query("scan", lookup, query).await
    }

    /// Managed search query under `/atlas-search`
    pub async fn search(
        &self,
        lookup: Lookup,
        query: &RestaurantQuery,
    ) -> Result<RestaurantResponse> {
        self.query("atlas-search", lookup, query).await
    }

    async fn query(
        &self,
        scope: &str,
        lookup: Lookup,
        query: &RestaurantQuery,
    ) -> Result<RestaurantResponse> {
        let url = format!("{}/{}/{}", self.base_url, scope, lookup.endpoint());
        let response = check(self.client.get(&url).query(query).send().await?).await?;
        Ok(response.json().await?)
    }
}

async fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(ClientError::Server {
        status: response.status().as_u16(),
        message: response.text().await.unwrap_or_default(),
    })
}
