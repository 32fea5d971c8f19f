//! Raw snapshot sources
//!
//! A snapshot source returns one complete exposition-format document per call.
//! The pipeline treats it as an opaque collaborator; [`HttpSnapshotSource`] is
//! the HTTP implementation used for plain metrics URLs and Artifactory.

use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Capability to fetch one raw metrics snapshot
#[async_trait]
pub trait SnapshotSource: Send + Sync + fmt::Display {
    async fn get(&self) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    async fn get(&self) -> Result<Vec<u8>> {
        (**self).get().await
    }
}

#[async_trait]
impl<T: SnapshotSource + ?Sized> SnapshotSource for Box<T> {
    async fn get(&self) -> Result<Vec<u8>> {
        (**self).get().await
    }
}

/// Request authorization
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Auth {
    #[default]
    None,
    Basic {
        user: String,
        password: String,
    },
    Bearer(String),
}

impl Auth {
    /// Build the authorization from optional CLI/config credentials
    ///
    /// # Errors
    /// Returns a configuration error when both a user and a token are given.
    pub fn from_credentials(
        user: Option<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let user = user.filter(|u| !u.is_empty());
        let token = token.filter(|t| !t.is_empty());
        match (user, token) {
            (Some(_), Some(_)) => Err(Error::Config(
                "basic credentials and an access token are mutually exclusive".to_string(),
            )),
            (Some(user), None) => Ok(Self::Basic {
                user,
                password: password.unwrap_or_default(),
            }),
            (None, Some(token)) => Ok(Self::Bearer(token)),
            (None, None) => Ok(Self::None),
        }
    }

    /// User shown in log lines; never the secret
    pub fn user(&self) -> &str {
        match self {
            Self::Basic { user, .. } => user,
            Self::None | Self::Bearer(_) => "",
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { user, .. } => write!(f, "Basic({}:***)", user),
            Self::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

/// HTTP GET snapshot source
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: Client,
    url: String,
    auth: Auth,
    reject_empty_body: bool,
}

impl HttpSnapshotSource {
    pub fn new(url: impl Into<String>, auth: Auth) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            auth,
            reject_empty_body: false,
        }
    }

    /// Source for the metrics endpoint of an Artifactory instance
    ///
    /// # Arguments
    /// * `base_url` - Artifactory base URL, e.g. `http://localhost:8082/artifactory`
    pub fn artifactory(base_url: &str, auth: Auth) -> Self {
        let url = format!("{}/api/v1/metrics", base_url.trim_end_matches('/'));
        Self {
            reject_empty_body: true,
            ..Self::new(url, auth)
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    /// Fetch the snapshot
    ///
    /// # Errors
    /// Returns an error if:
    /// - The request fails
    /// - Response status is not successful (2xx)
    /// - The body is empty and the source requires one
    async fn get(&self) -> Result<Vec<u8>> {
        let request = self.client.get(&self.url);
        let request = match &self.auth {
            Auth::None => request,
            Auth::Basic { user, password } => request.basic_auth(user, Some(password)),
            Auth::Bearer(token) => request.bearer_auth(token),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        if self.reject_empty_body && body.is_empty() {
            return Err(Error::EmptyBody);
        }
        Ok(body.to_vec())
    }
}

impl fmt::Display for HttpSnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "url: {}, user: {}", self.url, self.auth.user())
    }
}
