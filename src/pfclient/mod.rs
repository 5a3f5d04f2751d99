// src/pfclient/mod.rs
pub mod oauth;
pub mod types;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::criteria::Criteria;
use crate::error::ClientError;
use oauth::{CredentialsSource, TokenSession};
use types::{AnimalPage, AnimalType, Breed, BreedsResponse, TypeResponse, TypesResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.petfinder.com/v2";

/// What the polling loop needs from the listing service.
#[async_trait]
pub trait AnimalSource: Send + Sync {
    /// One page of animals matching `criteria`.
    async fn search_animals(&self, criteria: &Criteria) -> Result<AnimalPage, ClientError>;
    /// Supported animal types with their coat/color/gender vocabularies.
    async fn animal_types(&self) -> Result<Vec<AnimalType>, ClientError>;
}

/// Petfinder API client authenticated with OAuth2 client credentials.
pub struct PfClient {
    http: Client,
    base_url: String,
    timeout: Duration,
    session: TokenSession,
}

impl PfClient {
    /// Build a client for `base_url`. No request is made until first use.
    pub fn new(api_key: &str, api_secret: &str, base_url: &str) -> Result<Self, ClientError> {
        check_credential("api key", api_key)?;
        check_credential("api secret", api_secret)?;

        let parsed = Url::parse(base_url)
            .map_err(|e| ClientError::AuthConfiguration(format!("base url `{base_url}`: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::AuthConfiguration(format!(
                "base url `{base_url}` must be http or https"
            )));
        }
        let base_url = base_url.trim_end_matches('/').to_string();

        let http = Client::builder()
            .user_agent(concat!("pet-fetcher/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .build()
            .map_err(|e| ClientError::AuthConfiguration(format!("http client: {e}")))?;

        let session = TokenSession::new(CredentialsSource::new(
            http.clone(),
            format!("{base_url}/oauth2/token"),
            api_key.to_string(),
            api_secret.to_string(),
        ));

        Ok(Self {
            http,
            base_url,
            timeout: Duration::from_secs(10),
            session,
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self.session = self.session.with_timeout(self.timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attribute vocabulary for one type, e.g. `"dog"`.
    pub async fn animal_type(&self, name: &str) -> Result<AnimalType, ClientError> {
        let resp: TypeResponse = self.get_json(&format!("/types/{name}"), &[]).await?;
        Ok(resp.animal_type)
    }

    /// Breeds known for one type.
    pub async fn animal_breeds(&self, type_name: &str) -> Result<Vec<Breed>, ClientError> {
        let resp: BreedsResponse = self
            .get_json(&format!("/types/{type_name}/breeds"), &[])
            .await?;
        Ok(resp.breeds)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ClientError> {
        let token = self.session.bearer().await?;
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            tracing::warn!(target: "pfclient", path, status = status.as_u16(), "remote request failed");
            return Err(ClientError::RemoteRequest {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ClientError::Decode(format!("{path}: {e}")))
    }
}

#[async_trait]
impl AnimalSource for PfClient {
    async fn search_animals(&self, criteria: &Criteria) -> Result<AnimalPage, ClientError> {
        self.get_json("/animals", &criteria.to_query()).await
    }

    async fn animal_types(&self) -> Result<Vec<AnimalType>, ClientError> {
        let resp: TypesResponse = self.get_json("/types", &[]).await?;
        Ok(resp.types)
    }
}

fn check_credential(what: &str, value: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::AuthConfiguration(format!("{what} is empty")));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ClientError::AuthConfiguration(format!(
            "{what} contains whitespace or control characters"
        )));
    }
    Ok(())
}
