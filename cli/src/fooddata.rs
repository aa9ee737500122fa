use anyhow::{Context, Result};
use reqwest::StatusCode;
use tracing::debug;

use vitals_core::catalog::{CatalogFood, FdcFood, SearchResponse, fdc_to_food};
use vitals_core::service::FoodLookupProvider;

const BASE_URL: &str = "https://api.nal.usda.gov/fdc/v1";
/// Generic foods only; branded entries rarely carry micronutrients.
const DATA_TYPES: &str = "Foundation,SR Legacy,Survey (FNDDS)";

pub struct FoodDataClient {
    client: reqwest::Client,
    api_key: String,
    rt: tokio::runtime::Handle,
}

impl FoodDataClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "vitals-cli/{} (nutrition tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            rt: tokio::runtime::Handle::current(),
        })
    }

    pub async fn search_async(&self, query: &str) -> Result<Vec<CatalogFood>> {
        let resp = self
            .client
            .get(format!("{BASE_URL}/foods/search"))
            .query(&[
                ("query", query),
                ("api_key", self.api_key.as_str()),
                ("dataType", DATA_TYPES),
                ("pageSize", "10"),
            ])
            .send()
            .await
            .context("Failed to reach FoodData Central")?
            .error_for_status()
            .context("FoodData Central search failed")?;

        let data: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse FoodData Central search response")?;

        let total = data.foods.len();
        let foods: Vec<CatalogFood> = data.foods.into_iter().filter_map(fdc_to_food).collect();
        debug!(query, total, usable = foods.len(), "catalog search");
        Ok(foods)
    }

    pub async fn lookup_async(&self, fdc_id: i64) -> Result<Option<CatalogFood>> {
        let resp = self
            .client
            .get(format!("{BASE_URL}/food/{fdc_id}"))
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .context("Failed to reach FoodData Central")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let data: FdcFood = resp
            .error_for_status()
            .context("FoodData Central lookup failed")?
            .json()
            .await
            .context("Failed to parse FoodData Central food response")?;

        Ok(fdc_to_food(data))
    }
}

impl FoodLookupProvider for FoodDataClient {
    fn search(&self, query: &str) -> Result<Vec<CatalogFood>> {
        self.rt.block_on(self.search_async(query))
    }

    fn lookup(&self, fdc_id: i64) -> Result<Option<CatalogFood>> {
        self.rt.block_on(self.lookup_async(fdc_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Integration tests (hit the real FoodData Central API) ---

    #[tokio::test]
    #[ignore = "hits FoodData Central API"]
    async fn test_lookup_known_food() {
        let client = FoodDataClient::new("DEMO_KEY").unwrap();
        let result = client.lookup_async(171_688).await.unwrap();
        let food = result.expect("Apples, raw should exist in FoodData Central");
        assert!(food.food.name.to_lowercase().contains("apple"));
        assert!(food.food.nutrients.calories.unwrap() > 0.0);
        assert_eq!(food.food.fdc_id, Some(171_688));
    }

    #[tokio::test]
    #[ignore = "hits FoodData Central API"]
    async fn test_lookup_not_found() {
        let client = FoodDataClient::new("DEMO_KEY").unwrap();
        let result = client.lookup_async(1).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    #[ignore = "hits FoodData Central API"]
    async fn test_search_returns_results() {
        let client = FoodDataClient::new("DEMO_KEY").unwrap();
        let results = client.search_async("banana").await.unwrap();
        assert!(!results.is_empty());
        for food in &results {
            assert!(!food.food.name.is_empty());
            assert!(food.food.nutrients.calories.is_some());
        }
    }
}
