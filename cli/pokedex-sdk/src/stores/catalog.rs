//! State of the creature list and the currently opened detail record.
//!
//! The list is paginated by offset. Changing the search text or sort order
//! starts a new *epoch*: the accumulated entries are dropped and any list
//! response requested under an older epoch is discarded when it arrives,
//! so the list never mixes results of two queries.
//!
//! Detail fetches are independent of the list. Every fetch supersedes the
//! previous one, only the response to the latest request is applied.

use std::sync::Arc;

use pokedex_api::types::{ListRequest, PokemonDetails, PokemonListItem, SortKey};
use pokedex_api::{Client, ClientTrait};
use tokio::sync::watch;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub search_query: String,
    pub sort_key: SortKey,
    /// Offset of the next page to request
    pub offset: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListState {
    pub items: Vec<PokemonListItem>,
    /// Whether the backend reported another page
    pub has_more: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    epoch: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailState {
    pub current: Option<PokemonDetails>,
    pub is_loading: bool,
    pub error: Option<String>,
    request: u64,
}

/// A snapshot of the catalog store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogState {
    pub query: CatalogQuery,
    pub list: ListState,
    pub detail: DetailState,
}

impl CatalogState {
    fn new(page_size: u32) -> Self {
        Self {
            query: CatalogQuery {
                search_query: String::new(),
                sort_key: SortKey::default(),
                offset: 0,
                page_size,
            },
            list: ListState {
                items: Vec::new(),
                has_more: true,
                is_loading: false,
                error: None,
                epoch: 0,
            },
            detail: DetailState::default(),
        }
    }

    /// Drop all accumulated entries and release the in-flight guard.
    ///
    /// A list request still pending belongs to the old epoch
    /// and won't be applied.
    fn start_new_epoch(&mut self) {
        self.query.offset = 0;
        self.list.items.clear();
        self.list.has_more = true;
        self.list.is_loading = false;
        self.list.error = None;
        self.list.epoch = self.list.epoch.wrapping_add(1);
    }

    fn list_request(&self, reset: bool) -> ListRequest {
        let offset = if reset { 0 } else { self.query.offset };
        let query = Some(self.query.search_query.trim())
            .filter(|query| !query.is_empty())
            .map(str::to_string);

        ListRequest {
            offset,
            limit: self.query.page_size,
            query,
            sort_by: Some(self.query.sort_key),
        }
    }
}

/// Result of [CatalogStore::fetch_list].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOutcome {
    Loaded,
    /// The error was recorded in [ListState::error].
    Failed,
    /// Another list fetch was in flight, nothing was requested.
    AlreadyLoading,
    /// The query changed while the request was in flight.
    Discarded,
}

/// Result of [CatalogStore::fetch_details].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailOutcome {
    Loaded,
    /// The error was recorded in [DetailState::error].
    Failed,
    /// A later detail fetch was started while the request was in flight.
    Superseded,
}

#[derive(Debug)]
pub struct CatalogStore {
    client: Arc<Client>,
    state: watch::Sender<CatalogState>,
}

impl CatalogStore {
    pub fn new(client: Arc<Client>, page_size: u32) -> Self {
        let (state, _) = watch::channel(CatalogState::new(page_size));
        Self { client, state }
    }

    pub fn state(&self) -> CatalogState {
        self.state.borrow().clone()
    }

    /// Receive a notification for every change of the catalog state.
    pub fn subscribe(&self) -> watch::Receiver<CatalogState> {
        self.state.subscribe()
    }

    /// Fetch the first page (`reset`) or the page following the loaded entries.
    ///
    /// Calls made while a list fetch is in flight are dropped.
    /// Failures are recorded in the state and leave the loaded entries intact.
    #[instrument(skip(self))]
    pub async fn fetch_list(&self, reset: bool) -> ListOutcome {
        let mut claimed = None;
        self.state.send_if_modified(|state| {
            if state.list.is_loading {
                return false;
            }
            state.list.is_loading = true;
            state.list.error = None;
            claimed = Some((state.list.epoch, state.list_request(reset)));
            true
        });
        let Some((epoch, request)) = claimed else {
            debug!("list fetch already in flight, dropping request");
            return ListOutcome::AlreadyLoading;
        };

        debug!(offset = request.offset, query = ?request.query, "fetching list page");
        let result = self.client.list_pokemon(&request).await;

        let mut outcome = ListOutcome::Discarded;
        self.state.send_if_modified(|state| {
            if state.list.epoch != epoch {
                return false;
            }
            state.list.is_loading = false;
            match result {
                Ok(page) => {
                    let returned = u32::try_from(page.results.len()).unwrap_or(u32::MAX);
                    state.query.offset = request.offset.saturating_add(returned);
                    state.list.has_more = page.has_next();
                    if reset {
                        state.list.items = page.results;
                    } else {
                        state.list.items.extend(page.results);
                    }
                    outcome = ListOutcome::Loaded;
                },
                Err(err) => {
                    state.list.error = Some(err.to_string());
                    outcome = ListOutcome::Failed;
                },
            }
            true
        });

        debug!(?outcome, "list fetch finished");
        outcome
    }

    /// Change the search text and start over with an empty list.
    ///
    /// Doesn't fetch; see [crate::utils::debounce::SearchDebouncer].
    pub fn set_search_query(&self, search_query: impl Into<String>) {
        let search_query = search_query.into();
        self.state.send_modify(|state| {
            state.query.search_query = search_query;
            state.start_new_epoch();
        });
    }

    /// Change the sort order and start over with an empty list.
    pub fn set_sort_key(&self, sort_key: SortKey) {
        self.state.send_modify(|state| {
            state.query.sort_key = sort_key;
            state.start_new_epoch();
        });
    }

    /// Fetch a detail record, replacing the current one.
    #[instrument(skip(self))]
    pub async fn fetch_details(&self, name_or_id: &str) -> DetailOutcome {
        let mut request = 0;
        self.state.send_modify(|state| {
            state.detail.request = state.detail.request.wrapping_add(1);
            state.detail.current = None;
            state.detail.is_loading = true;
            state.detail.error = None;
            request = state.detail.request;
        });

        let result = self.client.pokemon_details(name_or_id).await;

        let mut outcome = DetailOutcome::Superseded;
        self.state.send_if_modified(|state| {
            if state.detail.request != request {
                return false;
            }
            state.detail.is_loading = false;
            match result {
                Ok(details) => {
                    state.detail.current = Some(details);
                    outcome = DetailOutcome::Loaded;
                },
                Err(err) => {
                    state.detail.error = Some(err.to_string());
                    outcome = DetailOutcome::Failed;
                },
            }
            true
        });

        debug!(?outcome, "detail fetch finished");
        outcome
    }

    /// Return to the initial state, keeping the sort order.
    pub fn reset(&self) {
        self.state.send_modify(|state| {
            state.query.search_query.clear();
            state.start_new_epoch();
            state.detail = DetailState {
                request: state.detail.request.wrapping_add(1),
                ..DetailState::default()
            };
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pokedex_api::types::{NamedResource, PokemonListResponse, PokemonStat};
    use pokedex_api::{MockClient, MockRequest, MockResponse};
    use pretty_assertions::assert_eq;

    use super::*;

    pub(crate) fn item(id: u32, name: &str) -> PokemonListItem {
        PokemonListItem {
            id,
            name: name.to_string(),
            url: format!("/pokemon/{id}"),
            sprite: None,
            types: vec!["normal".to_string()],
        }
    }

    pub(crate) fn page(results: Vec<PokemonListItem>, more: bool) -> PokemonListResponse {
        PokemonListResponse {
            count: 151,
            next: more.then(|| "http://localhost:8000/pokemon?offset=20&limit=20".to_string()),
            previous: None,
            results,
        }
    }

    pub(crate) fn details(id: u32, name: &str) -> PokemonDetails {
        PokemonDetails {
            id,
            name: name.to_string(),
            description: None,
            sprite: None,
            sprites: Default::default(),
            types: vec![],
            height: 7,
            weight: 69,
            abilities: vec![],
            stats: vec![PokemonStat {
                base_stat: 45,
                effort: 0,
                stat: NamedResource {
                    name: "hp".to_string(),
                    url: None,
                },
            }],
        }
    }

    fn names(state: &CatalogState) -> Vec<&str> {
        state.list.items.iter().map(|item| item.name.as_str()).collect()
    }

    fn list_requests(mock: &MockClient) -> Vec<ListRequest> {
        mock.requests()
            .into_iter()
            .filter_map(|request| match request {
                MockRequest::ListPokemon { request, .. } => Some(request),
                _ => None,
            })
            .collect()
    }

    fn store() -> (CatalogStore, MockClient) {
        let mock = MockClient::new();
        let store = CatalogStore::new(Arc::new(Client::Mock(mock.clone())), 2);
        (store, mock)
    }

    #[test]
    fn initial_state() {
        let (store, _mock) = store();
        let state = store.state();
        assert!(state.list.items.is_empty());
        assert!(state.list.has_more);
        assert!(!state.list.is_loading);
        assert_eq!(state.query.offset, 0);
        assert_eq!(state.query.sort_key, SortKey::Id);
        assert_eq!(state.detail.current, None);
    }

    #[tokio::test]
    async fn pages_accumulate_in_order() {
        let (store, mock) = store();
        mock.push_list_response(page(vec![item(1, "a"), item(2, "b")], true));
        mock.push_list_response(page(vec![item(3, "c")], false));

        assert_eq!(store.fetch_list(true).await, ListOutcome::Loaded);
        assert_eq!(store.fetch_list(false).await, ListOutcome::Loaded);

        let state = store.state();
        assert_eq!(names(&state), vec!["a", "b", "c"]);
        assert!(!state.list.has_more);
        assert_eq!(state.query.offset, 3);
        assert_eq!(
            list_requests(&mock)
                .iter()
                .map(|request| request.offset)
                .collect::<Vec<_>>(),
            vec![0, 2]
        );
    }

    #[tokio::test]
    async fn reset_fetch_replaces_entries() {
        let (store, mock) = store();
        mock.push_list_response(page(vec![item(1, "a"), item(2, "b")], true));
        mock.push_list_response(page(vec![item(3, "c")], true));
        mock.push_list_response(page(vec![item(1, "a")], true));

        store.fetch_list(true).await;
        store.fetch_list(false).await;
        store.fetch_list(true).await;

        let state = store.state();
        assert_eq!(names(&state), vec!["a"]);
        assert_eq!(state.query.offset, 1);
        assert_eq!(list_requests(&mock)[2].offset, 0);
    }

    #[tokio::test]
    async fn has_more_follows_next_link_only() {
        let (store, mock) = store();
        // a short page with a next link still has more
        mock.push_list_response(page(vec![item(1, "a")], true));
        store.fetch_list(true).await;
        assert!(store.state().list.has_more);

        // a full page without a next link is the last one
        mock.push_list_response(page(vec![item(2, "b"), item(3, "c")], false));
        store.fetch_list(false).await;
        assert!(!store.state().list.has_more);
    }

    #[tokio::test]
    async fn concurrent_fetch_is_dropped() {
        let (store, mock) = store();
        let gate = mock.push_gated_response(MockResponse::List(page(vec![item(1, "a")], true)));

        let (first, second) = tokio::join!(store.fetch_list(true), async {
            let outcome = store.fetch_list(false).await;
            gate.notify_one();
            outcome
        });

        assert_eq!(first, ListOutcome::Loaded);
        assert_eq!(second, ListOutcome::AlreadyLoading);
        assert_eq!(list_requests(&mock).len(), 1);
        assert_eq!(names(&store.state()), vec!["a"]);
    }

    #[tokio::test]
    async fn loading_flag_is_visible_to_subscribers() {
        let (store, mock) = store();
        let gate = mock.push_gated_response(MockResponse::List(page(vec![], false)));
        let mut receiver = store.subscribe();

        let (outcome, ()) = tokio::join!(store.fetch_list(true), async {
            receiver
                .wait_for(|state| state.list.is_loading)
                .await
                .unwrap();
            gate.notify_one();
        });

        assert_eq!(outcome, ListOutcome::Loaded);
        assert!(!store.state().list.is_loading);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_entries() {
        let (store, mock) = store();
        mock.push_list_response(page(vec![item(1, "a"), item(2, "b")], true));
        mock.push_error_response(503, Some("Service unavailable"));

        store.fetch_list(true).await;
        assert_eq!(store.fetch_list(false).await, ListOutcome::Failed);

        let state = store.state();
        assert_eq!(names(&state), vec!["a", "b"]);
        assert_eq!(state.list.error.as_deref(), Some("Service unavailable"));
        assert!(!state.list.is_loading);
        assert_eq!(state.query.offset, 2);
        assert!(state.list.has_more);
    }

    #[tokio::test]
    async fn error_clears_on_next_fetch() {
        let (store, mock) = store();
        mock.push_error_response(500, None);
        mock.push_list_response(page(vec![item(1, "a")], false));

        store.fetch_list(true).await;
        assert_eq!(store.state().list.error.as_deref(), Some("HTTP error 500"));

        store.fetch_list(true).await;
        assert_eq!(store.state().list.error, None);
    }

    #[tokio::test]
    async fn query_changes_empty_the_list_before_fetching() {
        let (store, mock) = store();
        mock.push_list_response(page(vec![item(1, "a"), item(2, "b")], true));
        store.fetch_list(true).await;

        store.set_search_query("pika");
        let state = store.state();
        assert!(state.list.items.is_empty());
        assert_eq!(state.query.offset, 0);

        mock.push_list_response(page(vec![item(3, "c")], true));
        store.fetch_list(false).await;

        store.set_sort_key(SortKey::Name);
        let state = store.state();
        assert!(state.list.items.is_empty());
        assert_eq!(state.query.offset, 0);
        assert_eq!(state.query.sort_key, SortKey::Name);
        assert_eq!(state.query.search_query, "pika");

        // no fetch was triggered by either change
        assert_eq!(list_requests(&mock).len(), 2);
    }

    #[tokio::test]
    async fn request_carries_query_and_sort() {
        let (store, mock) = store();
        mock.push_list_response(page(vec![], false));
        mock.push_list_response(page(vec![], false));

        store.set_search_query("  ");
        store.fetch_list(true).await;
        store.set_search_query("Pika");
        store.set_sort_key(SortKey::Name);
        store.fetch_list(true).await;

        assert_eq!(list_requests(&mock), vec![
            ListRequest {
                offset: 0,
                limit: 2,
                query: None,
                sort_by: Some(SortKey::Id),
            },
            ListRequest {
                offset: 0,
                limit: 2,
                query: Some("Pika".to_string()),
                sort_by: Some(SortKey::Name),
            },
        ]);
    }

    #[tokio::test]
    async fn response_for_previous_query_is_discarded() {
        let (store, mock) = store();
        let gate = mock.push_gated_response(MockResponse::List(page(
            vec![item(1, "bulbasaur"), item(2, "ivysaur")],
            true,
        )));
        mock.push_list_response(page(vec![item(25, "pikachu")], false));

        let (stale, fresh) = tokio::join!(store.fetch_list(true), async {
            store.set_search_query("pika");
            let outcome = store.fetch_list(true).await;
            gate.notify_one();
            outcome
        });

        assert_eq!(stale, ListOutcome::Discarded);
        assert_eq!(fresh, ListOutcome::Loaded);
        let state = store.state();
        assert_eq!(names(&state), vec!["pikachu"]);
        assert!(!state.list.has_more);
        assert!(!state.list.is_loading);
        assert_eq!(state.query.offset, 1);
    }

    #[tokio::test]
    async fn detail_fetch_replaces_current() {
        let (store, mock) = store();
        mock.push_details_response(details(1, "bulbasaur"));
        mock.push_details_response(details(25, "pikachu"));

        assert_eq!(store.fetch_details("1").await, DetailOutcome::Loaded);
        assert_eq!(store.fetch_details("pikachu").await, DetailOutcome::Loaded);

        let state = store.state();
        assert_eq!(state.detail.current.map(|d| d.name).as_deref(), Some("pikachu"));
        assert!(!state.detail.is_loading);
    }

    #[tokio::test]
    async fn detail_failure_leaves_list_alone() {
        let (store, mock) = store();
        mock.push_list_response(page(vec![item(1, "a")], true));
        mock.push_details_response(details(1, "a"));
        mock.push_error_response(404, Some("Pokemon 'missingno' not found"));

        store.fetch_list(true).await;
        store.fetch_details("1").await;
        assert_eq!(store.fetch_details("missingno").await, DetailOutcome::Failed);

        let state = store.state();
        assert_eq!(state.detail.current, None);
        assert_eq!(
            state.detail.error.as_deref(),
            Some("Pokemon 'missingno' not found")
        );
        assert_eq!(names(&state), vec!["a"]);
        assert_eq!(state.list.error, None);
    }

    #[tokio::test]
    async fn detail_is_cleared_while_loading() {
        let (store, mock) = store();
        mock.push_details_response(details(1, "bulbasaur"));
        store.fetch_details("1").await;

        let gate = mock.push_gated_response(MockResponse::Details(details(4, "charmander")));
        let mut receiver = store.subscribe();
        let (outcome, ()) = tokio::join!(store.fetch_details("4"), async {
            let state = receiver
                .wait_for(|state| state.detail.is_loading)
                .await
                .unwrap()
                .clone();
            assert_eq!(state.detail.current, None);
            gate.notify_one();
        });
        assert_eq!(outcome, DetailOutcome::Loaded);
    }

    #[tokio::test]
    async fn superseded_detail_response_is_ignored() {
        let (store, mock) = store();
        let gate = mock.push_gated_response(MockResponse::Details(details(1, "bulbasaur")));
        mock.push_details_response(details(25, "pikachu"));

        let (first, second) = tokio::join!(store.fetch_details("1"), async {
            let outcome = store.fetch_details("25").await;
            gate.notify_one();
            outcome
        });

        assert_eq!(first, DetailOutcome::Superseded);
        assert_eq!(second, DetailOutcome::Loaded);
        let state = store.state();
        assert_eq!(state.detail.current.map(|d| d.id), Some(25));
        assert!(!state.detail.is_loading);
    }

    #[tokio::test]
    async fn reset_returns_to_initial_state_but_keeps_sort() {
        let (store, mock) = store();
        mock.push_list_response(page(vec![item(1, "a")], false));
        mock.push_details_response(details(1, "a"));

        store.set_sort_key(SortKey::Name);
        store.set_search_query("a");
        store.fetch_list(true).await;
        store.fetch_details("1").await;

        store.reset();

        let expected = CatalogState {
            query: CatalogQuery {
                sort_key: SortKey::Name,
                ..CatalogState::new(2).query
            },
            ..CatalogState::new(2)
        };
        let state = store.state();
        assert_eq!(state.query, expected.query);
        assert_eq!(state.list.items, expected.list.items);
        assert!(state.list.has_more);
        assert_eq!(state.list.error, None);
        assert_eq!(state.detail.current, None);
        assert!(!state.detail.is_loading);
    }
}
