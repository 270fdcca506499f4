use chrono::{DateTime, Duration, Utc};
use log::{debug, error};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::client::AylaService;
use crate::error::{Error, Result};
use crate::types::{Property, PropertyCode};

/// Minimum time between two property fetches.
pub const UPDATE_INTERVAL_SECS: i64 = 5 * 60;

#[derive(Debug, Default)]
struct Snapshot {
    properties: Vec<Property>,
    last_update: Option<DateTime<Utc>>,
}

impl Snapshot {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_update {
            Some(last_update) => now - last_update >= Duration::seconds(UPDATE_INTERVAL_SECS),
            None => true,
        }
    }

    fn find(&self, code: PropertyCode) -> Result<&Property> {
        AylaService::get_property_by_name(&self.properties, code.code())
    }
}

/// An Oekoboiler water heater registered in the Ayla cloud.
///
/// Property values are served from the last fetched snapshot; call
/// [`Oekoboiler::async_update`] to refresh it.
pub struct Oekoboiler {
    device_id: String,
    service: Arc<AylaService>,
    snapshot: RwLock<Snapshot>,
}

impl Oekoboiler {
    pub fn new(service: Arc<AylaService>, device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            service,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn service(&self) -> &AylaService {
        &self.service
    }

    pub async fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.snapshot.read().await.is_stale(now)
    }

    /// Fetches the property list unless the last fetch is less than five
    /// minutes old. Returns whether a fetch happened.
    ///
    /// The write lock is held across the request, so concurrent callers wait
    /// for the running fetch and then see a fresh snapshot.
    pub async fn async_update(&self) -> Result<bool> {
        let mut snapshot = self.snapshot.write().await;

        if !snapshot.is_stale(Utc::now()) {
            debug!("Properties of {} are fresh, skipping update", self.device_id);
            return Ok(false);
        }

        let properties = self
            .service
            .get_properties(&self.device_id)
            .await
            .map_err(|e| {
                error!("Failed to update device {}: {}", self.device_id, e);
                e
            })?;

        *snapshot = Snapshot {
            properties,
            last_update: Some(Utc::now()),
        };
        Ok(true)
    }

    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.last_update
    }

    pub async fn properties(&self) -> Vec<Property> {
        self.snapshot.read().await.properties.clone()
    }

    pub async fn property(&self, code: PropertyCode) -> Result<Property> {
        self.snapshot.read().await.find(code).cloned()
    }

    /// Raw value of a property as the cloud reported it.
    pub async fn value(&self, code: PropertyCode) -> Result<String> {
        Ok(self.property(code).await?.value)
    }

    /// Water temperature in °C.
    pub async fn current_temp(&self) -> Result<i64> {
        self.int_value(PropertyCode::CurrentTemp).await
    }

    /// Target water temperature in °C.
    pub async fn target_temp(&self) -> Result<i64> {
        self.int_value(PropertyCode::TargetTemp).await
    }

    /// Temperature delta in K.
    pub async fn temp_delta(&self) -> Result<i64> {
        self.int_value(PropertyCode::TempDelta).await
    }

    pub async fn is_on(&self) -> Result<bool> {
        let property = self.property(PropertyCode::OnState).await?;
        match property.value.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => other
                .parse::<i64>()
                .map(|v| v != 0)
                .map_err(|_| invalid_value(&property)),
        }
    }

    /// Sets the target temperature through the cloud. Needs a prior
    /// successful update so the property key is known.
    pub async fn set_target_temp(&self, value: i64) -> Result<bool> {
        let key = self.property(PropertyCode::TargetTemp).await?.key;
        debug!("Setting target temperature of {} to {}", self.device_id, value);
        self.service.update_property(&key, value).await
    }

    async fn int_value(&self, code: PropertyCode) -> Result<i64> {
        let property = self.property(code).await?;
        property
            .value
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid_value(&property))
    }
}

fn invalid_value(property: &Property) -> Error {
    Error::InvalidValue {
        name: property.name.clone(),
        value: property.value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Credentials;

    fn property(name: &str, value: &str) -> Property {
        Property {
            name: name.to_string(),
            key: format!("key-{}", name),
            value: value.to_string(),
            data_updated_at: None,
        }
    }

    fn boiler_with(properties: Vec<Property>) -> Oekoboiler {
        let service = Arc::new(AylaService::new(Credentials::new("a@b.c", "pw", "secret")));
        Oekoboiler {
            device_id: "AC000W000000001".to_string(),
            service,
            snapshot: RwLock::new(Snapshot {
                properties,
                last_update: Some(Utc::now()),
            }),
        }
    }

    #[test]
    fn test_snapshot_staleness() {
        let now = Utc::now();
        assert!(Snapshot::default().is_stale(now));

        let snapshot = Snapshot {
            properties: vec![],
            last_update: Some(now),
        };
        assert!(!snapshot.is_stale(now));
        assert!(!snapshot.is_stale(now + Duration::seconds(299)));
        assert!(snapshot.is_stale(now + Duration::seconds(300)));
    }

    #[tokio::test]
    async fn test_accessors_before_update() {
        let service = Arc::new(AylaService::new(Credentials::new("a@b.c", "pw", "secret")));
        let boiler = Oekoboiler::new(service, "AC000W000000001");

        assert!(boiler.is_stale(Utc::now()).await);
        assert!(boiler.last_update().await.is_none());
        assert!(matches!(boiler.current_temp().await, Err(Error::NotFound(name)) if name == "F103"));
        assert!(matches!(boiler.set_target_temp(60).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_typed_accessors() {
        let boiler = boiler_with(vec![
            property("F103", "22"),
            property("F11", "100"),
            property("F12", "4"),
            property("F104", "0"),
        ]);

        assert_eq!(boiler.current_temp().await.unwrap(), 22);
        assert_eq!(boiler.target_temp().await.unwrap(), 100);
        assert_eq!(boiler.temp_delta().await.unwrap(), 4);
        assert!(!boiler.is_on().await.unwrap());
        assert_eq!(boiler.value(PropertyCode::TargetTemp).await.unwrap(), "100");
        assert!(!boiler.is_stale(Utc::now()).await);
    }

    #[tokio::test]
    async fn test_on_state_values() {
        let boiler = boiler_with(vec![property("F104", "1")]);
        assert!(boiler.is_on().await.unwrap());

        let boiler = boiler_with(vec![property("F104", "true")]);
        assert!(boiler.is_on().await.unwrap());

        let boiler = boiler_with(vec![property("F104", "maybe")]);
        assert!(matches!(boiler.is_on().await, Err(Error::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_update_refetches_after_interval() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/sign_in.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(include_str!(
                "../tests/fixtures/sign_in_success.json"
            )))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apiv1/dsns/AC000W000000001/properties"))
            .respond_with(ResponseTemplate::new(200).set_body_string(include_str!(
                "../tests/fixtures/properties.json"
            )))
            .expect(2)
            .mount(&mock_server)
            .await;

        let service = Arc::new(AylaService::new_with_hosts(
            Credentials::new("a@b.c", "pw", "secret"),
            mock_server.uri(),
            mock_server.uri(),
        ));
        let boiler = Oekoboiler::new(service, "AC000W000000001");

        assert!(boiler.async_update().await.unwrap());
        assert!(!boiler.async_update().await.unwrap());

        let first_update = Utc::now() - Duration::seconds(UPDATE_INTERVAL_SECS + 1);
        boiler.snapshot.write().await.last_update = Some(first_update);

        assert!(boiler.async_update().await.unwrap());
        assert!(boiler.last_update().await.unwrap() > first_update);
        assert!(!boiler.async_update().await.unwrap());
        assert_eq!(boiler.current_temp().await.unwrap(), 22);
    }

    #[tokio::test]
    async fn test_invalid_and_missing_values() {
        let boiler = boiler_with(vec![property("F103", "warm")]);

        assert!(matches!(
            boiler.current_temp().await,
            Err(Error::InvalidValue { name, value }) if name == "F103" && value == "warm"
        ));
        assert!(matches!(boiler.temp_delta().await, Err(Error::NotFound(_))));
    }
}
