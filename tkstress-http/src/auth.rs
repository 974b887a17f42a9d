use tkstress_core::{AuthFuture, Authenticator, Session};

use crate::api::ApiClient;

/// Logs in through the user service and stores the bearer token and
/// user id on the shared session.
#[derive(Clone)]
pub struct ApiAuthenticator {
    api: ApiClient,
}

impl ApiAuthenticator {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl Authenticator for ApiAuthenticator {
    fn login<'a>(&'a self, session: &'a Session) -> AuthFuture<'a> {
        Box::pin(async move {
            match self.api.login().await {
                Ok(credentials) => {
                    session.authenticate(&credentials.token, &credentials.user_id);
                    tracing::info!(user_id = %credentials.user_id, "login succeeded");
                    true
                }
                Err(err) => {
                    tracing::warn!(%err, "login failed");
                    false
                }
            }
        })
    }
}
