use super::session_store::{PersistedHint, SessionStore};
use crate::domain::session::Session;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound on redirects followed for one navigation.
const MAX_REDIRECTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Route {
    Home,
    Login,
    Register,
    Dashboard,
    Other(String),
}

impl Route {
    /// Query strings and fragments are not part of the route.
    pub fn parse(path: &str) -> Self {
        let path = path
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim();
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Self::Home,
            "/login" => Self::Login,
            "/register" => Self::Register,
            "/dashboard" => Self::Dashboard,
            other if other.starts_with('/') => Self::Other(other.to_string()),
            other => Self::Other(format!("/{other}")),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Home => "/",
            Self::Login => "/login",
            Self::Register => "/register",
            Self::Dashboard => "/dashboard",
            Self::Other(path) => path,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        route.path().to_string()
    }
}

/// What ends up on screen once the guard lets a navigation through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Screen {
    Home,
    Login,
    Registration,
    Dashboard,
    Page(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GuardState {
    /// No session anywhere.
    Anonymous,
    PendingRegistration,
    Active,
}

impl GuardState {
    /// The in-memory session wins; storage is only consulted when memory is empty.
    pub fn of(memory: Option<&Session>, hint: Option<PersistedHint>) -> Self {
        let registered = match (memory, hint) {
            (Some(session), _) => session.registration_completed,
            (None, Some(hint)) => hint.registration_completed,
            (None, None) => return Self::Anonymous,
        };
        if registered {
            Self::Active
        } else {
            Self::PendingRegistration
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardAction {
    Render(Screen),
    Redirect(Route),
    /// Adopt the persisted session into memory, then render; go to
    /// `on_failure` if nothing can be restored.
    RestoreThenRender { screen: Screen, on_failure: Route },
}

/// The routing table. Pure: storage is summarized by `hint`, which callers
/// only need to compute when `memory` is empty.
pub fn decide(route: &Route, memory: Option<&Session>, hint: Option<PersistedHint>) -> GuardAction {
    let state = GuardState::of(memory, hint);
    match route {
        Route::Home => GuardAction::Render(Screen::Home),
        Route::Login => GuardAction::Render(Screen::Login),
        Route::Other(path) => GuardAction::Render(Screen::Page(path.clone())),
        Route::Register => match (state, memory) {
            (GuardState::Anonymous, _) => GuardAction::Redirect(Route::Home),
            (_, Some(_)) => GuardAction::Render(Screen::Registration),
            (_, None) => GuardAction::RestoreThenRender {
                screen: Screen::Registration,
                on_failure: Route::Home,
            },
        },
        Route::Dashboard => match (state, memory) {
            (GuardState::Anonymous, _) => GuardAction::Redirect(Route::Login),
            (_, Some(_)) => GuardAction::Render(Screen::Dashboard),
            // Only a record that finished registration may be restored straight
            // into the dashboard.
            (GuardState::Active, None) => GuardAction::RestoreThenRender {
                screen: Screen::Dashboard,
                on_failure: Route::Login,
            },
            (GuardState::PendingRegistration, None) => GuardAction::Redirect(Route::Login),
        },
    }
}

/// Outcome of one navigation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub requested: Route,
    /// Every route redirected to, in order; empty when the request rendered.
    pub redirects: Vec<Route>,
    pub screen: Screen,
    pub restored: bool,
}

impl Resolution {
    pub fn final_route(&self) -> &Route {
        self.redirects.last().unwrap_or(&self.requested)
    }
}

/// Runs [`decide`] against a live store on every navigation.
#[derive(Clone)]
pub struct RoutingGuard {
    store: Arc<SessionStore>,
}

impl RoutingGuard {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub async fn navigate(&self, path: &str) -> Resolution {
        let requested = Route::parse(path);
        let mut route = requested.clone();
        let mut redirects = Vec::new();
        let mut restored = false;

        loop {
            let action = self.evaluate(&route).await;
            debug!(route = %route, ?action, "Guard decision");
            let next = match action {
                GuardAction::Render(screen) => {
                    return Resolution {
                        requested,
                        redirects,
                        screen,
                        restored,
                    };
                }
                GuardAction::Redirect(next) => next,
                GuardAction::RestoreThenRender { screen, on_failure } => {
                    if self.store.load().await.is_some() {
                        restored = true;
                        return Resolution {
                            requested,
                            redirects,
                            screen,
                            restored,
                        };
                    }
                    on_failure
                }
            };

            info!(from = %route, to = %next, "Guard redirect");
            redirects.push(next.clone());
            route = next;
            if redirects.len() >= MAX_REDIRECTS {
                return Resolution {
                    requested,
                    redirects,
                    screen: Screen::Login,
                    restored,
                };
            }
        }
    }

    async fn evaluate(&self, route: &Route) -> GuardAction {
        let memory = self.store.current().await;
        let hint = match memory {
            Some(_) => None,
            None => self.store.persisted_hint().await,
        };
        decide(route, memory.as_ref(), hint)
    }
}
