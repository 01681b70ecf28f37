use std::future::Future;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use parley_types::api::{
    ErrorResponse, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
    SendMessageRequest, UnreadCountResponse,
};
use parley_types::models::{Conversation, Message};

use crate::error::ClientError;

/// Server operations the poller depends on.
pub trait ChatApi: Clone + Send + Sync + 'static {
    fn conversations(
        &self,
        stub_partner_id: Option<Uuid>,
    ) -> impl Future<Output = Result<Vec<Conversation>, ClientError>> + Send;

    /// Fetching a thread also marks the partner's messages as read server-side.
    fn messages(&self, partner_id: Uuid) -> impl Future<Output = Result<Vec<Message>, ClientError>> + Send;

    fn send(
        &self,
        partner_id: Uuid,
        content: String,
    ) -> impl Future<Output = Result<Message, ClientError>> + Send;

    fn unread_count(&self, partner_id: Option<Uuid>) -> impl Future<Output = Result<u64, ClientError>> + Send;
}

/// [`ChatApi`] over HTTP with a bearer token.
#[derive(Clone)]
pub struct HttpChatApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub async fn login(base_url: &str, username: &str, password: &str) -> Result<(Self, LoginResponse), ClientError> {
        let http = reqwest::Client::new();
        let resp = http
            .post(format!("{}/auth/login", base_url.trim_end_matches('/')))
            .json(&LoginRequest { username: username.into(), password: password.into() })
            .send()
            .await?;
        let login: LoginResponse = decode(resp).await?;
        Ok((Self::new(base_url, login.token.clone()), login))
    }

    pub async fn register(base_url: &str, req: &RegisterRequest) -> Result<(Self, RegisterResponse), ClientError> {
        let http = reqwest::Client::new();
        let resp = http
            .post(format!("{}/auth/register", base_url.trim_end_matches('/')))
            .json(req)
            .send()
            .await?;
        let registered: RegisterResponse = decode(resp).await?;
        Ok((Self::new(base_url, registered.token.clone()), registered))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl ChatApi for HttpChatApi {
    async fn conversations(&self, stub_partner_id: Option<Uuid>) -> Result<Vec<Conversation>, ClientError> {
        let mut req = self.http.get(self.url("/conversations")).bearer_auth(&self.token);
        if let Some(id) = stub_partner_id {
            req = req.query(&[("stubPartnerId", id.to_string())]);
        }
        decode(req.send().await?).await
    }

    async fn messages(&self, partner_id: Uuid) -> Result<Vec<Message>, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/conversations/{}/messages", partner_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        decode(resp).await
    }

    async fn send(&self, partner_id: Uuid, content: String) -> Result<Message, ClientError> {
        let resp = self
            .http
            .post(self.url(&format!("/conversations/{}/messages", partner_id)))
            .bearer_auth(&self.token)
            .json(&SendMessageRequest { content })
            .send()
            .await?;
        decode(resp).await
    }

    async fn unread_count(&self, partner_id: Option<Uuid>) -> Result<u64, ClientError> {
        let mut req = self.http.get(self.url("/unread/count")).bearer_auth(&self.token);
        if let Some(id) = partner_id {
            req = req.query(&[("partnerId", id.to_string())]);
        }
        let body: UnreadCountResponse = decode(req.send().await?).await?;
        Ok(body.count)
    }
}

/// Map a response to its JSON body or to the matching [`ClientError`].
async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }

    let detail = resp
        .json::<ErrorResponse>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::NOT_FOUND => ClientError::NotFound(detail),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            ClientError::InvalidArgument(detail)
        }
        _ => ClientError::Unavailable(detail),
    })
}
