use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api::{
    Credentials, DriverDecision, ProfileUpdate, Registration, RideAPI, RideRequest, UserAPI, API,
};
use crate::config::Config;
use crate::entities::{EarningsSummary, Ride, RideDetail, Status, User, Vehicle};
use crate::error::{
    conflict_error, forbidden_error, not_found_error, unauthorized_error, upstream_error,
    validation_error, Error, Kind,
};

/// The remote ride/user service, reached over HTTP with a bearer session
/// token. Every response arrives in a `{ success, message, data }` envelope.
pub struct RemoteService {
    http: reqwest::Client,
    base: String,
    session: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Session {
    token: String,
}

pub(crate) fn map_status(status: u16) -> Result<(), Error> {
    match status {
        200..=299 => Ok(()),
        401 => Err(unauthorized_error()),
        403 => Err(forbidden_error()),
        404 => Err(not_found_error()),
        409 => Err(conflict_error()),
        400..=499 => Err(validation_error("request rejected by the service")),
        _ => Err(upstream_error()),
    }
}

fn envelope_error(message: Option<String>) -> Error {
    match message {
        Some(message) => Error { code: 502, message },
        None => upstream_error(),
    }
}

impl RemoteService {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base: config.api_base.trim_end_matches('/').to_string(),
            session: RwLock::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.read().await.clone() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    #[tracing::instrument(skip(self, builder))]
    async fn fetch<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let res = self.authorized(builder).await.send().await?;

        map_status(res.status().as_u16())?;

        let envelope: Envelope<T> = res.json().await?;

        if !envelope.success {
            return Err(envelope_error(envelope.message));
        }

        envelope.data.ok_or_else(upstream_error)
    }

    #[tracing::instrument(skip(self, builder))]
    async fn fetch_empty(&self, builder: reqwest::RequestBuilder) -> Result<(), Error> {
        let res = self.authorized(builder).await.send().await?;

        map_status(res.status().as_u16())?;

        let envelope: Envelope<serde_json::Value> = res.json().await?;

        if !envelope.success {
            return Err(envelope_error(envelope.message));
        }

        Ok(())
    }
}

#[async_trait]
impl UserAPI for RemoteService {
    async fn register(&self, registration: Registration) -> Result<(), Error> {
        self.fetch_empty(self.http.post(self.url("/auth/register")).json(&registration))
            .await
    }

    async fn login(&self, credentials: Credentials) -> Result<(), Error> {
        let session: Session = self
            .fetch(self.http.post(self.url("/auth/login")).json(&credentials))
            .await?;

        *self.session.write().await = Some(session.token);

        Ok(())
    }

    async fn logout(&self) -> Result<(), Error> {
        let result = self.fetch_empty(self.http.post(self.url("/auth/logout"))).await;

        // the local session is gone either way
        *self.session.write().await = None;

        result
    }

    async fn me(&self) -> Result<Option<User>, Error> {
        match self.fetch(self.http.get(self.url("/users/me"))).await {
            Ok(user) => Ok(Some(user)),
            Err(err) if err.kind() == Kind::Unauthorized => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<User, Error> {
        self.fetch(self.http.patch(self.url("/users/me")).json(&update))
            .await
    }

    async fn change_password(&self, old: String, new: String) -> Result<(), Error> {
        self.fetch_empty(
            self.http
                .patch(self.url("/users/me/password"))
                .json(&json!({ "old_password": old, "new_password": new })),
        )
        .await
    }

    async fn toggle_availability(&self) -> Result<User, Error> {
        self.fetch(self.http.patch(self.url("/users/me/availability")))
            .await
    }

    async fn become_driver(&self, vehicle: Vehicle) -> Result<User, Error> {
        self.fetch(
            self.http
                .patch(self.url("/users/me/driver-request"))
                .json(&vehicle),
        )
        .await
    }

    async fn approve_driver(&self, user_id: Uuid, decision: DriverDecision) -> Result<User, Error> {
        self.fetch(
            self.http
                .patch(self.url(&format!("/users/{}/driver-request", user_id)))
                .json(&json!({ "decision": decision })),
        )
        .await
    }

    async fn toggle_block(&self, user_id: Uuid) -> Result<User, Error> {
        self.fetch(
            self.http
                .patch(self.url(&format!("/users/{}/block", user_id))),
        )
        .await
    }

    async fn all_users(&self) -> Result<Vec<User>, Error> {
        self.fetch(self.http.get(self.url("/users"))).await
    }
}

#[async_trait]
impl RideAPI for RemoteService {
    async fn request_ride(&self, request: RideRequest) -> Result<Ride, Error> {
        self.fetch(self.http.post(self.url("/rides")).json(&request))
            .await
    }

    async fn my_rides(&self) -> Result<Vec<Ride>, Error> {
        self.fetch(self.http.get(self.url("/rides/mine"))).await
    }

    async fn available_rides(&self) -> Result<Vec<Ride>, Error> {
        self.fetch(self.http.get(self.url("/rides/available"))).await
    }

    async fn driver_rides(&self) -> Result<Vec<Ride>, Error> {
        self.fetch(self.http.get(self.url("/rides/driver"))).await
    }

    async fn all_rides(&self) -> Result<Vec<Ride>, Error> {
        self.fetch(self.http.get(self.url("/rides"))).await
    }

    async fn find_ride(&self, id: Uuid) -> Result<RideDetail, Error> {
        self.fetch(self.http.get(self.url(&format!("/rides/{}", id))))
            .await
    }

    async fn accept_ride(&self, id: Uuid) -> Result<Ride, Error> {
        self.fetch(
            self.http
                .patch(self.url(&format!("/rides/{}/accept", id))),
        )
        .await
    }

    async fn update_status(&self, id: Uuid, status: Status) -> Result<Ride, Error> {
        self.fetch(
            self.http
                .patch(self.url(&format!("/rides/{}/status", id)))
                .json(&json!({ "status": status })),
        )
        .await
    }

    async fn earnings(&self) -> Result<EarningsSummary, Error> {
        self.fetch(self.http.get(self.url("/rides/earnings"))).await
    }
}

impl API for RemoteService {}

#[test]
fn the_base_url_join_tolerates_a_trailing_slash() {
    use crate::config::Theme;

    let config = Config {
        api_base: "https://api.example.com/".into(),
        theme: Theme::System,
    };

    let service = RemoteService::new(&config);
    assert_eq!(service.url("/rides"), "https://api.example.com/rides");
}

#[test]
fn status_codes_map_onto_the_error_taxonomy() {
    assert!(map_status(200).is_ok());
    assert!(map_status(204).is_ok());
    assert_eq!(map_status(401).unwrap_err().kind(), Kind::Unauthorized);
    assert_eq!(map_status(403).unwrap_err().kind(), Kind::Unauthorized);
    assert_eq!(map_status(404).unwrap_err().kind(), Kind::NotFound);
    assert_eq!(map_status(409).unwrap_err().kind(), Kind::Conflict);
    assert_eq!(map_status(422).unwrap_err().kind(), Kind::Validation);
    assert_eq!(map_status(500).unwrap_err().kind(), Kind::Transport);
    assert_eq!(map_status(503).unwrap_err().kind(), Kind::Transport);
}

#[test]
fn envelopes_unwrap_their_data() {
    let raw = r#"{ "success": true, "message": null, "data": { "token": "abc123" } }"#;
    let envelope: Envelope<Session> = serde_json::from_str(raw).unwrap();

    assert!(envelope.success);
    assert_eq!(envelope.data.unwrap().token, "abc123");

    let raw = r#"{ "success": false, "message": "ride already taken" }"#;
    let envelope: Envelope<Session> = serde_json::from_str(raw).unwrap();

    assert!(!envelope.success);
    let err = envelope_error(envelope.message);
    assert_eq!(err.message, "ride already taken");
    assert_eq!(err.kind(), Kind::Transport);
}
