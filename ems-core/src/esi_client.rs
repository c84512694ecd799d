use anyhow::{Context, Result};
use async_trait::async_trait;
use ems_domain::{
    ConstellationId, ConstellationInfo, MarketOrder, NameEntry, OrderSide, RegionId, SearchResponse, StargateId, StargateLink, SystemId, SystemNode,
    TypeId, TypeInfo,
};
use mockall::automock;
use reqwest::header::HeaderMap;
use reqwest::Method;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// `POST /universe/names/` accepts at most this many ids per call.
pub const NAMES_CHUNK_SIZE: usize = 1000;

/// One page of a paginated ESI listing. `total_pages` comes from the `X-Pages` header.
#[derive(Debug, Clone, PartialEq)]
pub struct EsiPage<T> {
    pub data: Vec<T>,
    pub total_pages: Option<u32>,
}

#[automock]
#[async_trait]
pub trait EsiClientTrait: Send + Sync + Debug {
    async fn get_system(&self, system_id: SystemId) -> Result<SystemNode>;

    async fn get_constellation(&self, constellation_id: ConstellationId) -> Result<ConstellationInfo>;

    async fn get_stargate(&self, stargate_id: StargateId) -> Result<StargateLink>;

    async fn get_type(&self, type_id: TypeId) -> Result<TypeInfo>;

    async fn search_system(&self, name: &str) -> Result<SearchResponse>;

    async fn resolve_names(&self, ids: Vec<u64>) -> Result<Vec<NameEntry>>;

    async fn list_market_types_page(&self, region_id: RegionId, page: u32) -> Result<EsiPage<TypeId>>;

    async fn list_region_orders_page(&self, region_id: RegionId, side: OrderSide, type_id: TypeId, page: u32) -> Result<EsiPage<MarketOrder>>;
}

#[derive(Debug, Clone)]
pub struct EsiClient {
    pub client: ClientWithMiddleware,
    pub base_url: String,
}

impl EsiClient {
    pub fn new(client: ClientWithMiddleware, base_url: String) -> Self {
        EsiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Sends one request and decodes the json body. Retries and pacing happen in the middleware
    /// stack; an error here means the retries are exhausted.
    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<(T, HeaderMap)> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.clone(), &url).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to send request {} {}", method, url))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await.context("Failed to get response body")?;

        if !status.is_success() {
            anyhow::bail!("ESI request {} {} failed. Status: {}, Body: {}", method, url, status, body);
        }

        let decoded = serde_json::from_str(&body).map_err(|e| anyhow::anyhow!("Error decoding response of {}: '{:?}'. Response body was: '{}'", url, e, body))?;
        Ok((decoded, headers))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let (data, _) = self.fetch(Method::GET, path, query, None).await?;
        Ok(data)
    }

    async fn get_page<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<EsiPage<T>> {
        let (data, headers) = self.fetch(Method::GET, path, query, None).await?;
        Ok(EsiPage {
            data,
            total_pages: total_pages(&headers),
        })
    }
}

pub fn total_pages(headers: &HeaderMap) -> Option<u32> {
    headers
        .get("x-pages")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

#[async_trait]
impl EsiClientTrait for EsiClient {
    async fn get_system(&self, system_id: SystemId) -> Result<SystemNode> {
        self.get_json(&format!("/universe/systems/{}/", system_id.0), &[]).await
    }

    async fn get_constellation(&self, constellation_id: ConstellationId) -> Result<ConstellationInfo> {
        self.get_json(&format!("/universe/constellations/{}/", constellation_id.0), &[])
            .await
    }

    async fn get_stargate(&self, stargate_id: StargateId) -> Result<StargateLink> {
        self.get_json(&format!("/universe/stargates/{}/", stargate_id.0), &[]).await
    }

    async fn get_type(&self, type_id: TypeId) -> Result<TypeInfo> {
        self.get_json(&format!("/universe/types/{}/", type_id.0), &[]).await
    }

    async fn search_system(&self, name: &str) -> Result<SearchResponse> {
        self.get_json(
            "/search/",
            &[
                ("categories", "solar_system".to_string()),
                ("search", name.to_string()),
                ("strict", "true".to_string()),
            ],
        )
        .await
    }

    async fn resolve_names(&self, ids: Vec<u64>) -> Result<Vec<NameEntry>> {
        let mut entries = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(NAMES_CHUNK_SIZE) {
            let body = serde_json::to_value(chunk)?;
            let (resolved, _): (Vec<NameEntry>, _) = self
                .fetch(Method::POST, "/universe/names/", &[], Some(&body))
                .await?;
            entries.extend(resolved);
        }
        Ok(entries)
    }

    async fn list_market_types_page(&self, region_id: RegionId, page: u32) -> Result<EsiPage<TypeId>> {
        self.get_page(&format!("/markets/{}/types/", region_id.0), &[("page", page.to_string())])
            .await
    }

    async fn list_region_orders_page(&self, region_id: RegionId, side: OrderSide, type_id: TypeId, page: u32) -> Result<EsiPage<MarketOrder>> {
        self.get_page(
            &format!("/markets/{}/orders/", region_id.0),
            &[
                ("order_type", side.to_string()),
                ("type_id", type_id.0.to_string()),
                ("page", page.to_string()),
            ],
        )
        .await
    }
}
