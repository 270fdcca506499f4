use chrono::Utc;
use log::{debug, error, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::fmt::Display;
use tokio::sync::Mutex;

use crate::auth::{AccessToken, RefreshTokenRequest, SignInRequest, TokenResponse};
use crate::error::{Error, Result};
use crate::types::{Credentials, DatapointRequest, Property, PropertyEnvelope};

pub const DEFAULT_AUTH_HOST: &str = "https://user-field-eu.aylanetworks.com";
pub const DEFAULT_API_HOST: &str = "https://ads-eu.aylanetworks.com";

/// Authenticated session against the Ayla cloud.
///
/// The token sits behind an async mutex that is held for the whole
/// login/refresh exchange, so concurrent callers share one sign-in instead of
/// racing each other.
pub struct AylaService {
    client: reqwest::Client,
    credentials: Credentials,
    auth_host: String,
    api_host: String,
    token: Mutex<Option<AccessToken>>,
}

impl AylaService {
    pub fn new(credentials: Credentials) -> Self {
        Self::new_with_hosts(
            credentials,
            DEFAULT_AUTH_HOST.to_string(),
            DEFAULT_API_HOST.to_string(),
        )
    }

    pub fn new_with_hosts(credentials: Credentials, auth_host: String, api_host: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            auth_host: auth_host.trim_end_matches('/').to_string(),
            api_host: api_host.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    pub fn auth_host(&self) -> &str {
        &self.auth_host
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Copy of the token currently held, if any.
    pub async fn access_token(&self) -> Option<AccessToken> {
        self.token.lock().await.clone()
    }

    pub async fn login(&self) -> Result<()> {
        let mut slot = self.token.lock().await;
        self.login_into(&mut slot).await?;
        Ok(())
    }

    /// Trades the refresh token for a new token. A rejected refresh is not an
    /// error: it returns `false` and leaves the current token in place.
    pub async fn refresh_token(&self) -> Result<bool> {
        let mut slot = self.token.lock().await;
        Ok(self.refresh_into(&mut slot).await?.is_some())
    }

    /// Returns a usable access token, signing in or refreshing first when
    /// needed. A rejected refresh falls back to a full sign-in.
    pub async fn get_token(&self) -> Result<String> {
        let mut slot = self.token.lock().await;

        if let Some(token) = slot.as_ref().filter(|token| !token.is_expired(Utc::now())) {
            return Ok(token.access_token.clone());
        }

        if slot.is_none() {
            debug!("No token yet, signing in");
            return self.login_into(&mut slot).await;
        }

        debug!("Token expired, refreshing");
        match self.refresh_into(&mut slot).await? {
            Some(access_token) => Ok(access_token),
            None => {
                warn!("Token refresh rejected, signing in again");
                self.login_into(&mut slot).await
            }
        }
    }

    async fn login_into(&self, slot: &mut Option<AccessToken>) -> Result<String> {
        debug!("Signing in as {}", self.credentials.email);

        let response = self
            .client
            .post(format!("{}/users/sign_in.json", self.auth_host))
            .json(&SignInRequest::from(&self.credentials))
            .send()
            .await
            .map_err(Error::from_auth_transport)?;

        let status = response.status();
        let response_text = response.text().await?;

        if status.as_u16() != 200 {
            debug!("Sign-in failed with status: {}", status);
            return Err(Error::LoginFailed {
                status: status.as_u16(),
                body: response_text,
            });
        }

        let token_response = serde_json::from_str::<TokenResponse>(&response_text).map_err(|e| {
            debug!("Failed to parse sign-in response: {}", e);
            e
        })?;
        let token = AccessToken::activate(token_response, Utc::now())?;
        info!(
            "Signed in as {}, token valid until {}",
            self.credentials.email, token.expires_at
        );

        let access_token = token.access_token.clone();
        *slot = Some(token);
        Ok(access_token)
    }

    async fn refresh_into(&self, slot: &mut Option<AccessToken>) -> Result<Option<String>> {
        let Some(current) = slot.as_ref() else {
            debug!("No token to refresh");
            return Ok(None);
        };

        let response = self
            .client
            .post(format!("{}/users/refresh_token.json", self.auth_host))
            .headers(self.headers(&current.access_token)?)
            .json(&RefreshTokenRequest::new(&current.refresh_token))
            .send()
            .await
            .map_err(Error::from_auth_transport)?;

        let status = response.status();
        if status.as_u16() != 200 {
            warn!("Token refresh failed with status: {}", status);
            return Ok(None);
        }

        let response_text = response.text().await?;
        let token_response = serde_json::from_str::<TokenResponse>(&response_text).map_err(|e| {
            debug!("Failed to parse refresh response: {}", e);
            e
        })?;
        let token = AccessToken::activate(token_response, Utc::now())?;
        info!("Token refreshed, valid until {}", token.expires_at);

        let access_token = token.access_token.clone();
        *slot = Some(token);
        Ok(Some(access_token))
    }

    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("auth_token {}", token))?,
        );
        Ok(headers)
    }

    async fn authorized_headers(&self) -> Result<HeaderMap> {
        let token = self.get_token().await?;
        self.headers(&token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let headers = self.authorized_headers().await?;
        let response = self.client.get(url).headers(headers).send().await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Request to {} failed with status {}", url, status);
            return Err(Error::Api {
                status: status.as_u16(),
                body: response_text,
            });
        }

        serde_json::from_str::<T>(&response_text).map_err(|e| {
            error!("Failed to parse response from {}: {}", url, e);
            debug!("Raw response: {}", response_text);
            Error::Json(e)
        })
    }

    /// Devices registered to the account, as the cloud returns them.
    pub async fn get_devices(&self) -> Result<serde_json::Value> {
        debug!("Fetching device list");
        self.get_json(&format!("{}/apiv1/devices", self.api_host))
            .await
    }

    pub async fn get_properties(&self, dsn: &str) -> Result<Vec<Property>> {
        debug!("Fetching properties for device: {}", dsn);

        let url = format!("{}/apiv1/dsns/{}/properties", self.api_host, dsn);
        let envelopes: Vec<PropertyEnvelope> = self.get_json(&url).await?;
        let properties: Vec<Property> = envelopes
            .into_iter()
            .map(|envelope| Property::from(envelope.property))
            .collect();

        debug!("Device {} reported {} properties", dsn, properties.len());
        Ok(properties)
    }

    /// Posts a datapoint for a property. Only a 2xx answer counts as success.
    pub async fn update_property(&self, property_id: &str, value: impl Display) -> Result<bool> {
        let url = format!(
            "{}/apiv1/properties/{}/datapoints",
            self.api_host, property_id
        );
        let request = DatapointRequest::new(value);
        let headers = self.authorized_headers().await?;

        debug!("Updating property {}: {:?}", property_id, request);

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Property {} updated", property_id);
            Ok(true)
        } else {
            let error_text = response.text().await?;
            error!(
                "Failed to update property {} ({}): {}",
                property_id, status, error_text
            );
            Ok(false)
        }
    }

    pub async fn update_property_by_name(
        &self,
        properties: &[Property],
        name: &str,
        value: impl Display,
    ) -> Result<bool> {
        let property = Self::get_property_by_name(properties, name)?;
        self.update_property(&property.key, value).await
    }

    pub fn get_property_by_name<'a>(properties: &'a [Property], name: &str) -> Result<&'a Property> {
        properties
            .iter()
            .find(|property| property.name == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }
}
