//! A client that serves canned responses instead of talking to a server.
//!
//! Responses are consumed in the order they were pushed, and every call is
//! recorded so tests can assert on what the stores actually requested.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use reqwest::StatusCode;
use tokio::sync::Notify;

use crate::client::ClientTrait;
use crate::error::{ApiError, AuthError, ClientError, FetchError};
use crate::token::{TokenStorage, TokenStore};
use crate::types::{
    AuthToken,
    ListRequest,
    LoginCredentials,
    PokemonDetails,
    PokemonListResponse,
    User,
};

type MockField<T> = Arc<Mutex<T>>;

/// A canned response returned by [MockClient].
#[derive(Debug, Clone)]
pub enum Response {
    Token(AuthToken),
    User(User),
    List(PokemonListResponse),
    Details(PokemonDetails),
    Error(GenericResponse),
}

/// An error response as the backend would send it.
#[derive(Debug, Clone)]
pub struct GenericResponse {
    pub status: u16,
    pub detail: Option<String>,
}

impl From<GenericResponse> for ApiError {
    fn from(response: GenericResponse) -> Self {
        let status =
            StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({ "detail": response.detail });
        ApiError::from_body(status, body.to_string().as_bytes())
    }
}

/// A call received by [MockClient], together with the token it would have sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Login {
        username: String,
    },
    CurrentUser {
        token: Option<String>,
    },
    ListPokemon {
        request: ListRequest,
        token: Option<String>,
    },
    PokemonDetails {
        name_or_id: String,
        token: Option<String>,
    },
}

#[derive(Debug)]
struct QueuedResponse {
    response: Response,
    gate: Option<Arc<Notify>>,
}

/// Clones share their response queue and request log.
#[derive(Debug, Clone, Default)]
pub struct MockClient {
    mock_responses: MockField<VecDeque<QueuedResponse>>,
    requests: MockField<Vec<Request>>,
    tokens: Option<Arc<TokenStore>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read tokens from `tokens` like the real client does.
    ///
    /// Without a token store every call is answered and recorded with no token.
    pub fn with_token_store(tokens: Arc<TokenStore>) -> Self {
        Self {
            tokens: Some(tokens),
            ..Self::default()
        }
    }

    /// Push a new response to the end of the queue.
    pub fn push_response(&self, response: Response) {
        self.queue(response, None);
    }

    /// Push a response that is only returned once the returned [Notify] fires.
    ///
    /// The call is recorded and its response dequeued immediately,
    /// so later calls get later responses while this one is pending.
    pub fn push_gated_response(&self, response: Response) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.queue(response, Some(gate.clone()));
        gate
    }

    pub fn push_token_response(&self, access_token: &str) {
        self.push_response(Response::Token(AuthToken {
            access_token: access_token.to_string(),
            token_type: "bearer".to_string(),
        }));
    }

    pub fn push_user_response(&self, user: User) {
        self.push_response(Response::User(user));
    }

    pub fn push_list_response(&self, page: PokemonListResponse) {
        self.push_response(Response::List(page));
    }

    pub fn push_details_response(&self, details: PokemonDetails) {
        self.push_response(Response::Details(details));
    }

    pub fn push_error_response(&self, status: u16, detail: Option<&str>) {
        self.push_response(Response::Error(GenericResponse {
            status,
            detail: detail.map(str::to_string),
        }));
    }

    /// All calls received so far, oldest first.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().expect("couldn't acquire mock lock").clone()
    }

    /// Number of responses not yet consumed.
    pub fn pending_responses(&self) -> usize {
        self.mock_responses
            .lock()
            .expect("couldn't acquire mock lock")
            .len()
    }

    fn queue(&self, response: Response, gate: Option<Arc<Notify>>) {
        self.mock_responses
            .lock()
            .expect("couldn't acquire mock lock")
            .push_back(QueuedResponse { response, gate });
    }

    fn token(&self) -> Option<String> {
        self.tokens
            .as_ref()
            .and_then(|tokens| tokens.read().expect("couldn't read mock token store"))
    }

    /// Record `request` and return the next queued response.
    ///
    /// No lock is held while waiting on a gate.
    async fn respond(&self, request: Request) -> Response {
        let description = format!("{request:?}");
        self.requests
            .lock()
            .expect("couldn't acquire mock lock")
            .push(request);
        let queued = self
            .mock_responses
            .lock()
            .expect("couldn't acquire mock lock")
            .pop_front()
            .unwrap_or_else(|| panic!("no mock response queued for {description}"));

        if let Some(gate) = queued.gate {
            gate.notified().await;
        }
        queued.response
    }
}

fn error_for(response: Response) -> Option<ClientError> {
    match response {
        Response::Error(generic) => Some(ClientError::Api(generic.into())),
        _ => None,
    }
}

impl ClientTrait for MockClient {
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthToken, AuthError> {
        let response = self
            .respond(Request::Login {
                username: credentials.username.clone(),
            })
            .await;
        match response {
            Response::Token(token) => Ok(token),
            other => match error_for(other.clone()) {
                Some(err) => Err(err.into()),
                None => panic!("expected token response, found {other:?}"),
            },
        }
    }

    async fn current_user(&self) -> Result<User, AuthError> {
        let token = self.token();
        if self.tokens.is_some() && token.is_none() {
            return Err(AuthError::NotAuthenticated);
        }
        match self.respond(Request::CurrentUser { token }).await {
            Response::User(user) => Ok(user),
            other => match error_for(other.clone()) {
                Some(err) => Err(err.into()),
                None => panic!("expected user response, found {other:?}"),
            },
        }
    }

    async fn list_pokemon(&self, request: &ListRequest) -> Result<PokemonListResponse, FetchError> {
        let response = self
            .respond(Request::ListPokemon {
                request: request.clone(),
                token: self.token(),
            })
            .await;
        match response {
            Response::List(page) => Ok(page),
            other => match error_for(other.clone()) {
                Some(err) => Err(err.into()),
                None => panic!("expected list response, found {other:?}"),
            },
        }
    }

    async fn pokemon_details(&self, name_or_id: &str) -> Result<PokemonDetails, FetchError> {
        let response = self
            .respond(Request::PokemonDetails {
                name_or_id: name_or_id.to_string(),
                token: self.token(),
            })
            .await;
        match response {
            Response::Details(details) => Ok(details),
            other => match error_for(other.clone()) {
                Some(err) => Err(FetchError::from_detail_error(err)),
                None => panic!("expected details response, found {other:?}"),
            },
        }
    }
}
