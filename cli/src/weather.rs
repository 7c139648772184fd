use anyhow::{Context, Result, anyhow};
use reqwest::Url;

use hearth_core::weather::{DEFAULT_LOCATION, Weather, WttrResponse};

const WTTR_URL: &str = "https://wttr.in/";

pub struct WeatherClient {
    client: reqwest::Client,
    base_url: Url,
}

impl WeatherClient {
    pub fn new() -> Self {
        Self::with_base_url(WTTR_URL).expect("default wttr.in URL is valid")
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("hearthboard/{}", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = Url::parse(base_url).context("Invalid weather service URL")?;
        Ok(Self { client, base_url })
    }

    /// `None` or `auto` lets wttr.in geolocate the caller.
    pub fn forecast_url(&self, location: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        let location = location.map(str::trim).filter(|l| !l.is_empty());
        if let Some(place) = location.filter(|l| *l != DEFAULT_LOCATION) {
            url.path_segments_mut()
                .map_err(|()| anyhow!("weather service URL cannot take a path"))?
                .pop_if_empty()
                .push(place);
        }
        url.query_pairs_mut().append_pair("format", "j1");
        Ok(url)
    }

    pub async fn current(&self, location: Option<&str>) -> Result<Weather> {
        let url = self.forecast_url(location)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach wttr.in")?
            .error_for_status()
            .context("wttr.in returned an error status")?;

        let data: WttrResponse = resp
            .json()
            .await
            .context("Failed to parse wttr.in response")?;

        let fallback = location.unwrap_or(DEFAULT_LOCATION);
        Ok(data.summarize(fallback)?)
    }
}
