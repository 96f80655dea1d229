//! HTTP client for the Pokédex API.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

use enum_dispatch::enum_dispatch;
use reqwest::RequestBuilder;
use reqwest::header::{self, HeaderMap};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ApiError, AuthError, ClientError, FetchError};
use crate::mock::MockClient;
use crate::token::{TokenStorage, TokenStore};
use crate::types::{
    AuthToken,
    ListRequest,
    LoginCredentials,
    PokemonDetails,
    PokemonListResponse,
    User,
};

const DEFAULT_USER_AGENT: &str = concat!("pokedex-api/", env!("CARGO_PKG_VERSION"));

/// Either a client for the actual Pokédex API,
/// or a mock client for testing.
#[derive(Debug)]
#[enum_dispatch(ClientTrait)]
pub enum Client {
    Pokedex(PokedexClient),
    Mock(MockClient),
}

/// The complete backend interface the stores depend on.
#[enum_dispatch]
#[allow(async_fn_in_trait)]
pub trait ClientTrait {
    /// Exchange credentials for a session token.
    ///
    /// The token is returned, never persisted.
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthToken, AuthError>;

    /// Fetch the user the stored token belongs to.
    async fn current_user(&self) -> Result<User, AuthError>;

    /// Fetch one page of the creature list.
    async fn list_pokemon(&self, request: &ListRequest) -> Result<PokemonListResponse, FetchError>;

    /// Fetch the full record of a creature by name or dex number.
    async fn pokemon_details(&self, name_or_id: &str) -> Result<PokemonDetails, FetchError>;
}

/// A client for the Pokédex API.
///
/// Every authenticated request reads the token from the shared [TokenStore]
/// at call time, so a login or logout takes effect without rebuilding the
/// client.
pub struct PokedexClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<TokenStore>,
    config: ClientConfig,
}

impl Debug for PokedexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PokedexClient")
            .field("api_url", &self.config.api_url)
            .finish_non_exhaustive()
    }
}

impl PokedexClient {
    /// Create a new client from configuration.
    pub fn new(config: ClientConfig, tokens: Arc<TokenStore>) -> Result<Self, ClientError> {
        let base_url = parse_base_url(&config.api_url)?;
        let http = build_http_client(&config)?;

        Ok(Self {
            http,
            base_url,
            tokens,
            config,
        })
    }

    /// Get the configured API URL.
    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    /// Append path segments to the base URL, escaping each of them.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(self.config.api_url.clone()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn stored_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.tokens.read()?)
    }

    /// Attach the stored token, if there is one.
    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        Ok(match self.stored_token()? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }
}

impl ClientTrait for PokedexClient {
    #[instrument(skip_all, fields(username = %credentials.username))]
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthToken, AuthError> {
        debug!("requesting session token");
        let url = self.endpoint(&["auth", "login", "json"])?;
        let token = send(self.http.post(url).json(credentials)).await?;
        Ok(token)
    }

    #[instrument(skip_all)]
    async fn current_user(&self) -> Result<User, AuthError> {
        let Some(token) = self.stored_token()? else {
            debug!("no stored token, not requesting current user");
            return Err(AuthError::NotAuthenticated);
        };
        let url = self.endpoint(&["auth", "me"])?;
        let user: User = send(self.http.get(url).bearer_auth(token)).await?;
        debug!(user_id = user.id, "received current user");
        Ok(user)
    }

    #[instrument(skip_all, fields(offset = request.offset, limit = request.limit))]
    async fn list_pokemon(&self, request: &ListRequest) -> Result<PokemonListResponse, FetchError> {
        debug!(query = ?request.query, sort_by = ?request.sort_by, "sending list request");
        let url = self.endpoint(&["pokemon"])?;
        let page: PokemonListResponse = send(self.authorize(self.http.get(url).query(request))?).await?;
        debug!(
            n_results = page.results.len(),
            has_next = page.has_next(),
            "received list page"
        );
        Ok(page)
    }

    #[instrument(skip_all, fields(name_or_id = %name_or_id))]
    async fn pokemon_details(&self, name_or_id: &str) -> Result<PokemonDetails, FetchError> {
        let url = self.endpoint(&["pokemon", name_or_id])?;
        let details = send(self.authorize(self.http.get(url))?)
            .await
            .map_err(FetchError::from_detail_error)?;
        Ok(details)
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Send a request and decode a successful JSON response.
///
/// Non-success responses become an [ApiError] regardless of the endpoint.
async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
    let response = request.send().await.map_err(ClientError::Request)?;
    let status = response.status();

    if !status.is_success() {
        // An unreadable body is treated like an unparseable one.
        let body = response.bytes().await.unwrap_or_default();
        let api_error = ApiError::from_body(status, &body);
        debug!(%status, message = %api_error.message, "request failed");
        return Err(api_error.into());
    }

    response.json::<T>().await.map_err(ClientError::Decode)
}

fn parse_base_url(api_url: &str) -> Result<Url, ClientError> {
    let url = Url::parse(api_url).map_err(|_| ClientError::InvalidUrl(api_url.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidUrl(api_url.to_string()));
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// HTTP client builder
// ---------------------------------------------------------------------------

fn build_header_map(extra_headers: &BTreeMap<String, String>) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    for (key, value) in extra_headers {
        headers.insert(
            header::HeaderName::from_str(key).map_err(
                |e: reqwest::header::InvalidHeaderName| ClientError::Other(e.to_string()),
            )?,
            header::HeaderValue::from_str(value).map_err(
                |e: reqwest::header::InvalidHeaderValue| ClientError::Other(e.to_string()),
            )?,
        );
    }
    Ok(headers)
}

/// Build the HTTP client shared by all requests.
///
/// Credentials are not part of the default headers,
/// they are attached per request from the token store.
fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
    let headers = build_header_map(&config.extra_headers)?;

    debug!(
        api_url = %config.api_url,
        extra_headers = config.extra_headers.len(),
        "building Pokédex HTTP client"
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
        .build()
        .map_err(|e| ClientError::Other(e.to_string()))
}

#[cfg(test)]
pub mod tests {
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::types::SortKey;

    fn client_config(url: &str) -> ClientConfig {
        ClientConfig {
            api_url: url.to_string(),
            ..Default::default()
        }
    }

    fn client_with_token(url: &str, token: Option<&str>) -> (PokedexClient, Arc<TokenStore>) {
        let tokens = Arc::new(TokenStore::memory(token));
        let client = PokedexClient::new(client_config(url), tokens.clone()).unwrap();
        (client, tokens)
    }

    fn user_json() -> serde_json::Value {
        json!({
            "id": 1,
            "username": "admin",
            "email": "admin@example.com",
            "is_active": true,
            "is_admin": true,
            "created_at": "2024-01-01T00:00:00",
            "updated_at": "2024-01-01T00:00:00"
        })
    }

    #[tokio::test]
    async fn login_posts_json_credentials() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/login/json")
                .json_body(json!({ "username": "admin", "password": "admin123" }));
            then.status(200)
                .json_body(json!({ "access_token": "tok1", "token_type": "bearer" }));
        });

        let (client, tokens) = client_with_token(&server.base_url(), None);
        let token = client
            .login(&LoginCredentials::new("admin", "admin123"))
            .await
            .unwrap();

        assert_eq!(token.access_token, "tok1");
        // the adapter never persists credentials itself
        assert_eq!(tokens.read().unwrap(), None);
        mock.assert();
    }

    #[tokio::test]
    async fn login_rejection_carries_detail_message() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/auth/login/json");
            then.status(401)
                .json_body(json!({ "detail": "Incorrect username or password" }));
        });

        let (client, _tokens) = client_with_token(&server.base_url(), None);
        let err = client
            .login(&LoginCredentials::new("admin", "wrong"))
            .await
            .unwrap_err();

        assert!(err.is_unauthorized(), "{err:?}");
        assert_eq!(err.to_string(), "Incorrect username or password");
        mock.assert();
    }

    #[tokio::test]
    async fn current_user_attaches_stored_token() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/auth/me")
                .header("authorization", "Bearer tok1");
            then.status(200).json_body(user_json());
        });

        let (client, _tokens) = client_with_token(&server.base_url(), Some("tok1"));
        let user = client.current_user().await.unwrap();

        assert_eq!(user.username, "admin");
        assert!(user.is_admin);
        mock.assert();
    }

    #[tokio::test]
    async fn current_user_without_token_sends_no_request() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|_when, then| {
            then.status(200).json_body(user_json());
        });

        let (client, _tokens) = client_with_token(&server.base_url(), None);
        let result = client.current_user().await;

        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn rejected_token_is_left_in_place() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/auth/me");
            then.status(401)
                .json_body(json!({ "detail": "Could not validate credentials" }));
        });

        let (client, tokens) = client_with_token(&server.base_url(), Some("expired"));
        let err = client.current_user().await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(tokens.read().unwrap(), Some("expired".to_string()));
        mock.assert();
    }

    #[tokio::test]
    async fn list_pokemon_sends_paging_and_query() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/pokemon")
                .query_param("offset", "20")
                .query_param("limit", "20")
                .query_param("query", "pika")
                .query_param("sort_by", "name")
                .header("authorization", "Bearer tok1");
            then.status(200).json_body(json!({
                "count": 21,
                "next": null,
                "previous": "http://localhost:8000/pokemon?offset=0&limit=20",
                "results": [
                    { "id": 25, "name": "pikachu", "url": "/pokemon/25", "sprite": null, "types": ["electric"] }
                ]
            }));
        });

        let (client, _tokens) = client_with_token(&server.base_url(), Some("tok1"));
        let page = client
            .list_pokemon(&ListRequest {
                offset: 20,
                limit: 20,
                query: Some("pika".to_string()),
                sort_by: Some(SortKey::Name),
            })
            .await
            .unwrap();

        assert!(!page.has_next());
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].name, "pikachu");
        mock.assert();
    }

    #[tokio::test]
    async fn details_respect_base_path() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/pokemon/25");
            then.status(200).json_body(json!({
                "id": 25,
                "name": "pikachu",
                "height": 4,
                "weight": 60
            }));
        });

        let (client, _tokens) = client_with_token(&server.url("/api/"), None);
        let details = client.pokemon_details("25").await.unwrap();

        assert_eq!(details.name, "pikachu");
        assert!(details.stats.is_empty());
        mock.assert();
    }

    // region: Error response handling
    //
    // All non-success responses are mapped to a single `ApiError` with a
    // displayable message. 404s on the detail endpoint are lifted to
    // `FetchError::NotFound` so consumers don't need to inspect the status.

    #[tokio::test]
    async fn details_not_found() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/pokemon/missingno");
            then.status(404)
                .header("content-type", "application/json")
                .json_body(json!({ "detail": "Pokemon 'missingno' not found" }));
        });

        let (client, _tokens) = client_with_token(&server.base_url(), None);
        let result = client.pokemon_details("missingno").await;

        match result {
            Err(FetchError::NotFound(err)) => {
                assert_eq!(err.message, "Pokemon 'missingno' not found")
            },
            other => panic!("expected FetchError::NotFound, found: {other:?}"),
        }
        mock.assert();
    }

    #[tokio::test]
    async fn unparseable_error_body_uses_generic_message() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/pokemon");
            then.status(502).body("<html>Bad Gateway</html>");
        });

        let (client, _tokens) = client_with_token(&server.base_url(), None);
        let err = client
            .list_pokemon(&ListRequest {
                offset: 0,
                limit: 20,
                query: None,
                sort_by: None,
            })
            .await
            .unwrap_err();

        assert!(
            matches!(&err, FetchError::Client(ClientError::Api(api)) if api.status == 502),
            "expected ApiError, found: {err:?}"
        );
        assert_eq!(err.to_string(), "An error occurred");
        mock.assert();
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_decode_error() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/auth/login/json");
            then.status(200).json_body(json!({ "token": "tok1" }));
        });

        let (client, _tokens) = client_with_token(&server.base_url(), None);
        let result = client.login(&LoginCredentials::new("admin", "admin123")).await;

        assert!(
            matches!(result, Err(AuthError::Client(ClientError::Decode(_)))),
            "expected decode error, found: {result:?}"
        );
        mock.assert();
    }

    // endregion

    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        // nothing listens on the discard port
        let (client, _tokens) = client_with_token("http://127.0.0.1:9", None);
        let result = client.pokemon_details("1").await;

        assert!(
            matches!(result, Err(FetchError::Client(ClientError::Request(_)))),
            "expected request error, found: {result:?}"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        let tokens = Arc::new(TokenStore::memory(None));
        let result = PokedexClient::new(client_config("not a url"), tokens.clone());
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));

        let result = PokedexClient::new(client_config("mailto:ash@example.com"), tokens);
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn extra_headers_and_user_agent_set_on_all_requests() {
        let mut extra_headers: BTreeMap<String, String> = BTreeMap::new();
        extra_headers.insert("pokedex-test".to_string(), "test-value".to_string());

        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.header("pokedex-test", "test-value")
                .header("user-agent", "my-custom-user-agent");
            then.status(200).json_body(json!({
                "id": 1,
                "name": "bulbasaur",
                "height": 7,
                "weight": 69
            }));
        });

        let config = ClientConfig {
            extra_headers,
            user_agent: Some("my-custom-user-agent".to_string()),
            ..client_config(&server.base_url())
        };
        let client = PokedexClient::new(config, Arc::new(TokenStore::memory(None))).unwrap();
        let _ = client.pokemon_details("bulbasaur").await;
        mock.assert();
    }

    #[tokio::test]
    async fn token_changes_apply_without_rebuilding_client() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/auth/me")
                .header("authorization", "Bearer tok2");
            then.status(200).json_body(user_json());
        });

        let (client, tokens) = client_with_token(&server.base_url(), Some("tok1"));
        tokens.write("tok2").unwrap();
        client.current_user().await.unwrap();
        mock.assert();
    }
}
