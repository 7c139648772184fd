use anyhow::{Context, Result};

pub struct RecipePageClient {
    client: reqwest::Client,
}

impl RecipePageClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "Mozilla/5.0 (compatible; Hearthboard/{})",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }

    /// Fetches the page body. Non-2xx responses are errors.
    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?
            .error_for_status()
            .with_context(|| format!("{url} returned an error status"))?;

        resp.text().await.context("Failed to read page body")
    }
}
