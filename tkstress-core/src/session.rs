use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::RwLock;

pub type AuthFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Login/refresh collaborator. Both calls are blocking network
/// operations the harness treats as atomic: there is no partial-success
/// state, only the returned bool.
pub trait Authenticator: Send + Sync {
    fn login<'a>(&'a self, session: &'a Session) -> AuthFuture<'a>;

    /// Refresh the credential lease. The default performs a full
    /// re-login; implementations with a cheaper refresh path override it.
    fn refresh<'a>(&'a self, session: &'a Session) -> AuthFuture<'a> {
        self.login(session)
    }
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    token: Option<Arc<str>>,
    user_id: Option<Arc<str>>,
}

/// Shared authenticated-session handle.
///
/// Read-mostly after login: workers read the token concurrently, and
/// mutation (login, invalidation) is serialized behind the write lock.
/// The load harness never re-authenticates mid-run; only the
/// single-threaded cycle runner mutates a session that is in use.
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> Option<Arc<str>> {
        self.read().token.clone()
    }

    pub fn user_id(&self) -> Option<Arc<str>> {
        self.read().user_id.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().token.is_some()
    }

    pub fn authenticate(&self, token: &str, user_id: &str) {
        let mut state = self.write();
        state.token = Some(Arc::from(token));
        state.user_id = Some(Arc::from(user_id));
    }

    /// Clears the credentials so the next login starts from scratch.
    pub fn invalidate(&self) {
        let mut state = self.write();
        state.token = None;
        state.user_id = None;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
